//! Template strings to regular expressions.
//!
//! `{name}` blocks become named captures using an expression chosen by the
//! property name; everything else is passed through as regex syntax, with
//! backslash escapes kept verbatim. Regex group names can't hold dots, so
//! every capture name is hex-encoded on the way in and decoded after a
//! match.

use crate::consts::{DEFAULT_EXPR, ENCODED_CHAR, PROPERTY_NAME, STRING_ID_EXPR};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::Regex;
use std::fmt::Write;

const ALIASES: [(&str, &str); 5] = [
    ("group", "group._id"),
    ("project", "project.label"),
    ("subject", "subject.label"),
    ("session", "session.label"),
    ("acquisition", "acquisition.label"),
];

const NAMED_GROUP: &str = "(?P<";

/// The context key a bare level name stands for.
///
/// ```
/// use hoist_import::template::alias;
/// assert_eq!(alias("group"), "group._id");
/// assert_eq!(alias("session"), "session.label");
/// assert_eq!(alias("session.uid"), "session.uid");
/// ```
pub fn alias(key: &str) -> &str {
    ALIASES.iter().find(|(bare, _)| *bare == key).map_or(key, |(_, full)| full)
}

fn expression_for(property: &str) -> &'static str {
    match property {
        "group" | "group._id" => STRING_ID_EXPR,
        _ => DEFAULT_EXPR,
    }
}

/// Make `name` usable as a regex group name.
///
/// ASCII letters and `_` are kept; any other character becomes
/// `__<hex>__`.
pub fn encode_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        match c.is_ascii_alphabetic() || c == '_' {
            true => encoded.push(c),
            false => {
                let _ = write!(encoded, "__{:02x}__", u32::from(c));
            },
        }
    }
    encoded
}

/// Reverse [`encode_name`].
pub fn decode_name(name: &str) -> String {
    ENCODED_CHAR
        .replace_all(name, |caps: &regex::Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Translate a template string into (unanchored) regex source.
///
/// ```
/// use hoist_import::template::compile_pattern;
/// assert_eq!(compile_pattern("{project}"), "(?P<project>.+)");
/// assert_eq!(compile_pattern(r"\d{3}"), r"\d{3}");
/// assert_eq!(compile_pattern("{session.uid}"), "(?P<session__2e__uid>.+)");
/// ```
pub fn compile_pattern(template: &str) -> String {
    let mut regex = String::with_capacity(template.len());
    let mut block = String::new();
    let mut escape = false;
    let mut in_block = false;
    for c in template.chars() {
        if escape {
            regex.push('\\');
            regex.push(c);
            escape = false;
            continue;
        }
        match c {
            '\\' => escape = true,
            '{' => in_block = true,
            '}' => {
                in_block = false;
                match PROPERTY_NAME.is_match(&block) {
                    true => {
                        let _ = write!(regex, "{NAMED_GROUP}{block}>{})", expression_for(&block));
                    },
                    false => {
                        let _ = write!(regex, "{{{block}}}");
                    },
                }
                block.clear();
            },
            c if in_block => block.push(c),
            c => regex.push(c),
        }
    }
    encode_group_names(&regex)
}

/// Encode the name of every unescaped `(?P<name>` in `regex`.
fn encode_group_names(regex: &str) -> String {
    let mut out = String::with_capacity(regex.len());
    let mut rest = regex;
    let mut escaped = false;
    while let Some(c) = rest.chars().next() {
        if !escaped
            && let Some(after) = rest.strip_prefix(NAMED_GROUP)
            && let Some((name, tail)) = after.split_once('>')
        {
            out.push_str(NAMED_GROUP);
            out.push_str(&encode_name(name));
            out.push('>');
            rest = tail;
            continue;
        }
        escaped = !escaped && c == '\\';
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Compile a template string into a regex matching a whole path segment.
pub fn compile_regex(template: &str) -> Result<Regex> {
    let pattern = compile_pattern(template);
    Regex::new(&format!("^(?:{pattern})$")).or_raise(|| ErrorKind::Template(format!("bad pattern {template:?}")))
}

/// The `(key, value)` pairs captured by `regex` on `name`, keys decoded and
/// aliased. Empty captures are skipped. `None` if there's no match.
pub(crate) fn captures(regex: &Regex, name: &str) -> Option<Vec<(String, String)>> {
    let caps = regex.captures(name)?;
    let values = regex
        .capture_names()
        .flatten()
        .filter_map(|group| {
            let value = caps.name(group)?.as_str();
            if value.is_empty() {
                return None;
            }
            let key = decode_name(group);
            Some((alias(&key).to_string(), value.to_string()))
        })
        .collect();
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("group")]
    #[case("project._id")]
    #[case("session.uid")]
    #[case("acquisition.meta-data.v2")]
    #[case("subject.naïve")]
    fn test_name_encoding(#[case] name: &str) {
        let encoded = encode_name(name);
        assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'), "{encoded}");
        assert_eq!(decode_name(&encoded), name);
    }

    #[test]
    fn test_underscores_survive() {
        assert_eq!(encode_name("project._id"), "project__2e___id");
        assert_eq!(decode_name("project__2e___id"), "project._id");
    }

    #[rstest]
    #[case("{group}", "(?P<group>[0-9a-z][0-9a-z.@_-]{0,30}[0-9a-z])")]
    #[case("{group._id}", "(?P<group__2e___id>[0-9a-z][0-9a-z.@_-]{0,30}[0-9a-z])")]
    #[case("{subject}-{session}", "(?P<subject>.+)-(?P<session>.+)")]
    #[case(r"\{subject\}", r"\{subject\}")]
    #[case(r"a\:b", r"a\:b")]
    #[case("[0-9]{2,3}", "[0-9]{2,3}")]
    #[case("(?P<subject.label>sub-\\d+)", "(?P<subject__2e__label>sub-\\d+)")]
    #[case(r"\(?P<x>", r"\(?P<x>")]
    fn test_compile_pattern(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(compile_pattern(template), expected);
    }

    #[test]
    fn test_whole_segment_only() {
        let regex = compile_regex("sub-{subject}").unwrap();
        assert!(regex.is_match("sub-01"));
        assert!(!regex.is_match("xsub-01"));
        let regex = compile_regex("{group}").unwrap();
        assert!(!regex.is_match("Scitran"));
    }

    #[test]
    fn test_captures_are_aliased() {
        let regex = compile_regex("{subject}_{session.uid}").unwrap();
        let values = captures(&regex, "anx_s1_1234").unwrap();
        assert!(values.contains(&("subject.label".to_string(), "anx_s1".to_string())));
        assert!(values.contains(&("session.uid".to_string(), "1234".to_string())));
        assert!(captures(&regex, "nounderscore").is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = compile_regex("(unclosed").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template(_)));
    }

    /// Substituting values into a template and matching the result gives
    /// the same values back under their original names.
    #[rstest]
    #[case("{group}", &[("group._id", "scitran")])]
    #[case("{project}", &[("project.label", "Anxiety Study")])]
    #[case("sub-{subject.label}", &[("subject.label", "01")])]
    #[case("{session.label}_{session.uid}", &[("session.label", "ses1"), ("session.uid", "1234")])]
    #[case("scan-{acquisition}.raw", &[("acquisition.label", "fMRI")])]
    fn test_template_round_trip(#[case] template: &str, #[case] values: &[(&str, &str)]) {
        let mut segment = template.to_string();
        for (key, value) in values {
            let bare = ALIASES.iter().find(|(_, full)| full == key).map(|(bare, _)| *bare);
            let placeholder = match template.contains(&format!("{{{key}}}")) {
                true => format!("{{{key}}}"),
                false => format!("{{{}}}", bare.unwrap()),
            };
            segment = segment.replace(&placeholder, value);
        }
        let regex = compile_regex(template).unwrap();
        let mut found = captures(&regex, &segment).unwrap();
        found.sort();
        let mut expected: Vec<(String, String)> =
            values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        expected.sort();
        assert_eq!(found, expected);
    }
}
