use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// The level to which a domain is blocked, ordered from least to most severe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// No-op: the entry only carries flags or comments.
    #[default]
    None,
    Silence,
    Suspend,
}

impl Severity {
    pub fn rank(self) -> u8 {
        match self {
            Severity::None => 0,
            Severity::Silence => 1,
            Severity::Suspend => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "noop",
            Severity::Silence => "silence",
            Severity::Suspend => "suspend",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "noop" | "none" => Ok(Severity::None),
            "silence" => Ok(Severity::Silence),
            "suspend" => Ok(Severity::Suspend),
            _ => Err(Error::UnknownSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        match value {
            Some(value) => value.parse().map_err(serde::de::Error::custom),
            None => Ok(Severity::None),
        }
    }
}

/// Lowercases and trims a hostname so it can be used as a merge key.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

/// One moderation directive against one remote peer.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct DomainBlock {
    pub domain: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub public_comment: Option<String>,
    #[serde(default)]
    pub private_comment: Option<String>,
    #[serde(default)]
    pub reject_media: bool,
    #[serde(default)]
    pub reject_reports: bool,
    #[serde(default)]
    pub obfuscate: bool,
}

impl DomainBlock {
    pub fn new(domain: &str, severity: Severity) -> Self {
        Self {
            domain: normalize_domain(domain),
            severity,
            ..Default::default()
        }
    }

    pub fn with_public_comment(mut self, comment: impl Into<String>) -> Self {
        self.public_comment = Some(comment.into());
        self
    }

    pub fn with_private_comment(mut self, comment: impl Into<String>) -> Self {
        self.private_comment = Some(comment.into());
        self
    }

    pub fn with_flags(mut self, reject_media: bool, reject_reports: bool, obfuscate: bool) -> Self {
        self.reject_media = reject_media;
        self.reject_reports = reject_reports;
        self.obfuscate = obfuscate;
        self
    }
}

/// The fields of a [`DomainBlock`], used to select what gets imported from a
/// source and what gets written on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Domain,
    Severity,
    PublicComment,
    PrivateComment,
    RejectMedia,
    RejectReports,
    Obfuscate,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Domain,
        Field::Severity,
        Field::PublicComment,
        Field::PrivateComment,
        Field::RejectMedia,
        Field::RejectReports,
        Field::Obfuscate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Domain => "domain",
            Field::Severity => "severity",
            Field::PublicComment => "public_comment",
            Field::PrivateComment => "private_comment",
            Field::RejectMedia => "reject_media",
            Field::RejectReports => "reject_reports",
            Field::Obfuscate => "obfuscate",
        }
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Mastodon's admin CSV export prefixes its headers with '#'
        let name = s.trim().trim_start_matches('#').to_ascii_lowercase();
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| Error::UnknownField(s.to_string()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order() {
        assert!(Severity::None < Severity::Silence);
        assert!(Severity::Silence < Severity::Suspend);
        assert_eq!(Severity::Suspend.max(Severity::None), Severity::Suspend);
        assert_eq!(Severity::Suspend.min(Severity::Silence), Severity::Silence);
        assert_eq!(
            [Severity::None, Severity::Silence, Severity::Suspend].map(Severity::rank),
            [0, 1, 2]
        );
    }

    #[test]
    fn severity_tokens() {
        assert_eq!("noop".parse::<Severity>().unwrap(), Severity::None);
        assert_eq!("None".parse::<Severity>().unwrap(), Severity::None);
        assert_eq!("".parse::<Severity>().unwrap(), Severity::None);
        assert_eq!(" SUSPEND ".parse::<Severity>().unwrap(), Severity::Suspend);
        assert!(matches!(
            "ban".parse::<Severity>(),
            Err(Error::UnknownSeverity(s)) if s == "ban"
        ));
    }

    #[test]
    fn new_normalizes_domain() {
        let block = DomainBlock::new("  Example.ORG\n", Severity::Silence);
        assert_eq!(block.domain, "example.org");
        assert!(!block.reject_media && !block.reject_reports && !block.obfuscate);
        assert_eq!(block.public_comment, None);
    }

    #[test]
    fn deserialize_with_defaults() {
        let block: DomainBlock = serde_json::from_str(r#"{"domain": "example.org"}"#).unwrap();
        assert_eq!(block, DomainBlock::new("example.org", Severity::None));

        let block: DomainBlock =
            serde_json::from_str(r#"{"domain": "example.org", "severity": null}"#).unwrap();
        assert_eq!(block.severity, Severity::None);
    }

    #[test]
    fn field_names() {
        assert_eq!("#domain".parse::<Field>().unwrap(), Field::Domain);
        assert_eq!("Reject_Media".parse::<Field>().unwrap(), Field::RejectMedia);
        assert!("digest".parse::<Field>().is_err());
    }
}
