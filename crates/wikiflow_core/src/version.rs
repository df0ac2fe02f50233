use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

// variants are declared oldest first; `Unknown` sorts below every dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Version {
    Unknown,
    Mw1_19,
    Mw1_20,
    Mw1_21,
    Mw1_22,
    Mw1_23,
    Mw1_24,
    Mw1_25,
    Mw1_26,
    Mw1_27,
    Mw1_28,
    Development,
}

impl Version {
    pub const KNOWN: [Version; 11] = [
        Version::Mw1_19,
        Version::Mw1_20,
        Version::Mw1_21,
        Version::Mw1_22,
        Version::Mw1_23,
        Version::Mw1_24,
        Version::Mw1_25,
        Version::Mw1_26,
        Version::Mw1_27,
        Version::Mw1_28,
        Version::Development,
    ];

    pub fn latest() -> Self {
        Version::Mw1_28
    }

    fn minor(self) -> Option<u32> {
        match self {
            Version::Mw1_19 => Some(19),
            Version::Mw1_20 => Some(20),
            Version::Mw1_21 => Some(21),
            Version::Mw1_22 => Some(22),
            Version::Mw1_23 => Some(23),
            Version::Mw1_24 => Some(24),
            Version::Mw1_25 => Some(25),
            Version::Mw1_26 => Some(26),
            Version::Mw1_27 => Some(27),
            Version::Mw1_28 => Some(28),
            Version::Unknown | Version::Development => None,
        }
    }

    fn from_minor(minor: u32) -> Self {
        Version::KNOWN
            .iter()
            .copied()
            .find(|version| version.minor() == Some(minor))
            .unwrap_or(if minor > 28 {
                Version::Development
            } else {
                Version::Unknown
            })
    }

    pub fn parse_generator(generator: &str) -> Self {
        let numeric = generator
            .trim()
            .strip_prefix("MediaWiki")
            .unwrap_or(generator)
            .trim();
        let mut parts = numeric.split(|ch: char| !ch.is_ascii_digit());
        let major = parts.next().and_then(|part| part.parse::<u32>().ok());
        let minor = parts.next().and_then(|part| part.parse::<u32>().ok());
        match (major, minor) {
            (Some(1), Some(minor)) => Version::from_minor(minor),
            (Some(major), Some(_)) if major > 1 => Version::Development,
            _ => Version::Unknown,
        }
    }

    pub fn and_newer(self) -> Vec<Version> {
        Version::KNOWN
            .iter()
            .copied()
            .filter(|version| *version >= self)
            .collect()
    }

    pub fn is_known(self) -> bool {
        self != Version::Unknown
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.minor()) {
            (_, Some(minor)) => write!(f, "MW1.{minor}"),
            (Version::Development, None) => f.write_str("DEVELOPMENT"),
            _ => f.write_str("UNKNOWN"),
        }
    }
}

impl FromStr for Version {
    type Err = ActionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "development" | "dev" => return Ok(Version::Development),
            "latest" => return Ok(Version::latest()),
            _ => {}
        }
        let digits = normalized
            .trim_start_matches("mw")
            .trim_start_matches(['_', ' ']);
        let parsed = Version::parse_generator(&digits.replace('_', "."));
        if parsed.is_known() {
            Ok(parsed)
        } else {
            Err(ActionError::precondition(format!(
                "unrecognized MediaWiki version: {value}"
            )))
        }
    }
}

impl TryFrom<String> for Version {
    type Error = ActionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    GetVersion,
    GetUserinfo,
    Login,
    Token,
    Delete,
    Edit,
    CategoryMembers,
    Backlinks,
    ImageUsage,
    RecentChanges,
    AllPages,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::GetVersion => "siteinfo",
            ActionKind::GetUserinfo => "userinfo",
            ActionKind::Login => "login",
            ActionKind::Token => "token",
            ActionKind::Delete => "delete",
            ActionKind::Edit => "edit",
            ActionKind::CategoryMembers => "categorymembers",
            ActionKind::Backlinks => "backlinks",
            ActionKind::ImageUsage => "imageusage",
            ActionKind::RecentChanges => "recentchanges",
            ActionKind::AllPages => "allpages",
        }
    }

    pub fn supported_versions(self) -> Vec<Version> {
        match self {
            // both can run before the wiki reveals its dialect
            ActionKind::GetVersion | ActionKind::Login => {
                let mut all = vec![Version::Unknown];
                all.extend(Version::KNOWN);
                all
            }
            ActionKind::GetUserinfo
            | ActionKind::Token
            | ActionKind::Delete
            | ActionKind::Edit
            | ActionKind::CategoryMembers
            | ActionKind::Backlinks
            | ActionKind::ImageUsage
            | ActionKind::RecentChanges
            | ActionKind::AllPages => Version::Mw1_19.and_newer(),
        }
    }

    pub fn gate(self) -> VersionGate {
        VersionGate::new(self, self.supported_versions())
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGate {
    kind: ActionKind,
    supported: Vec<Version>,
}

impl VersionGate {
    pub fn new(kind: ActionKind, supported: impl IntoIterator<Item = Version>) -> Self {
        let mut supported = supported.into_iter().collect::<Vec<_>>();
        supported.sort();
        supported.dedup();
        Self { kind, supported }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn supported(&self) -> &[Version] {
        &self.supported
    }

    pub fn is_supported(&self, version: Version) -> bool {
        self.supported.contains(&version)
    }

    pub fn check(&self, version: Version) -> Result<(), ActionError> {
        if self.is_supported(version) {
            return Ok(());
        }
        Err(ActionError::UnsupportedVersion {
            kind: self.kind,
            requested: version,
            supported: self.supported.clone(),
        })
    }
}

pub fn is_supported(kind: ActionKind, version: Version) -> bool {
    kind.gate().is_supported(version)
}

pub fn ensure_supported(kind: ActionKind, version: Version) -> Result<(), ActionError> {
    kind.gate().check(version)
}

#[cfg(test)]
mod tests {
    use super::{ActionKind, Version, VersionGate, ensure_supported, is_supported};
    use crate::error::ActionError;

    #[test]
    fn generator_strings_map_to_dialects() {
        assert_eq!(Version::parse_generator("MediaWiki 1.23.4"), Version::Mw1_23);
        assert_eq!(Version::parse_generator("MediaWiki 1.19"), Version::Mw1_19);
        assert_eq!(
            Version::parse_generator("MediaWiki 1.41.0-wmf.3"),
            Version::Development
        );
        assert_eq!(Version::parse_generator("MediaWiki 1.16.5"), Version::Unknown);
        assert_eq!(Version::parse_generator(""), Version::Unknown);
        assert_eq!(Version::parse_generator("garbage"), Version::Unknown);
    }

    #[test]
    fn unknown_is_least_capable() {
        for version in Version::KNOWN {
            assert!(Version::Unknown < version);
        }
        assert!(Version::Mw1_28 < Version::Development);
        assert!(!is_supported(ActionKind::Delete, Version::Unknown));
        assert!(is_supported(ActionKind::GetVersion, Version::Unknown));
    }

    #[test]
    fn gate_rejects_version_outside_declared_set() {
        let gate = VersionGate::new(ActionKind::Delete, [Version::Mw1_20, Version::Mw1_19]);
        let error = gate.check(Version::Mw1_21).expect_err("must reject");
        assert_eq!(
            error,
            ActionError::UnsupportedVersion {
                kind: ActionKind::Delete,
                requested: Version::Mw1_21,
                supported: vec![Version::Mw1_19, Version::Mw1_20],
            }
        );
        gate.check(Version::Mw1_20).expect("declared version");
    }

    #[test]
    fn ensure_supported_uses_capability_table() {
        ensure_supported(ActionKind::CategoryMembers, Version::Development).expect("supported");
        let error = ensure_supported(ActionKind::Edit, Version::Unknown).expect_err("unknown");
        assert!(matches!(error, ActionError::UnsupportedVersion { .. }));
    }

    #[test]
    fn version_names_parse_from_config() {
        assert_eq!("MW1_24".parse::<Version>().expect("parse"), Version::Mw1_24);
        assert_eq!("1.27".parse::<Version>().expect("parse"), Version::Mw1_27);
        assert_eq!("latest".parse::<Version>().expect("parse"), Version::latest());
        assert!("1.2".parse::<Version>().is_err());
        assert_eq!(Version::Mw1_24.to_string(), "MW1.24");
    }

    #[test]
    fn display_form_parses_back() {
        for version in Version::KNOWN {
            assert_eq!(Version::try_from(String::from(version)).expect("parse"), version);
        }
        assert!(Version::try_from(String::from(Version::Unknown)).is_err());
    }
}
