use derive_more::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    #[display("info")]
    Info,
    #[display("warn")]
    Warn,
    #[display("error")]
    Error,
}

/// A diagnostic collected during discovery or verification.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display("{} - {text}", severity.to_string().to_uppercase())]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

impl Message {
    pub fn warn(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            text: text.into(),
        }
    }
}
