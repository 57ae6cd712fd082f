use derive_more::Display;
use std::str::FromStr;

/// One level of the container hierarchy, in resolution order.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerKind {
    #[display("group")]
    Group,
    #[display("project")]
    Project,
    #[display("subject")]
    Subject,
    #[display("session")]
    Session,
    #[display("acquisition")]
    Acquisition,
}

impl ContainerKind {
    /// Every level, from the top of the hierarchy down.
    pub const ALL: [ContainerKind; 5] = [Self::Group, Self::Project, Self::Subject, Self::Session, Self::Acquisition];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Project => "project",
            Self::Subject => "subject",
            Self::Session => "session",
            Self::Acquisition => "acquisition",
        }
    }

    /// Sessions and acquisitions carry DICOM-derived UIDs that must be
    /// unique across the remote store.
    pub fn has_unique_uid(&self) -> bool {
        matches!(self, Self::Session | Self::Acquisition)
    }

    /// Whether files may be attached directly to this level.
    pub fn holds_files(&self) -> bool {
        !matches!(self, Self::Group | Self::Subject)
    }
}

impl FromStr for ContainerKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("group", Some(ContainerKind::Group))]
    #[case("acquisition", Some(ContainerKind::Acquisition))]
    #[case("Group", None)]
    #[case("file", None)]
    fn test_from_str(#[case] input: &str, #[case] expected: Option<ContainerKind>) {
        assert_eq!(input.parse().ok(), expected);
    }

    #[test]
    fn test_order() {
        assert!(ContainerKind::Group < ContainerKind::Acquisition);
        assert_eq!(ContainerKind::Session.to_string(), "session");
    }
}
