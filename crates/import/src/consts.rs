use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Entry names skipped during folder discovery (glob patterns, case-sensitive).
pub(crate) const IGNORED_NAMES: [&str; 4] = [".*", "ehthumbs.db", "Thumbs.db", "Icon\r"];

pub(crate) const PACKFILE_GROUP: &str = "packfile";
pub(crate) const UPLOAD_GROUP: &str = "upload";

/// Expression for group ids.
pub(crate) const STRING_ID_EXPR: &str = r"[0-9a-z][0-9a-z.@_-]{0,30}[0-9a-z]";
pub(crate) const DEFAULT_EXPR: &str = r".+";

// A `{...}` block with this content becomes a named capture.
regex!(PROPERTY_NAME, r"^[a-z][-_a-zA-Z0-9.]+[a-zA-Z0-9]$");
regex!(ENCODED_CHAR, r"__([0-9a-f]{2,})__");
regex!(REPEATED_UNDERSCORES, r"_{2,}");
