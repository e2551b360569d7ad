use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A USE flag with its polarity, written `+name` or `-name`.
///
/// Two flags are equal only when both the name and the polarity match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UseFlag {
    pub name: String,
    pub enabled: bool,
}

impl UseFlag {
    pub fn enabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
        }
    }
}

/// An error that occurs when parsing an invalid USE flag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid USE flag `{0}`: expected `+name` or `-name`")]
pub struct UseFlagParseError(String);

impl FromStr for UseFlag {
    type Err = UseFlagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (polarity, name) = s
            .split_at_checked(1)
            .ok_or_else(|| UseFlagParseError(s.to_string()))?;
        let enabled = match polarity {
            "+" => true,
            "-" => false,
            _ => return Err(UseFlagParseError(s.to_string())),
        };
        if name.is_empty() {
            return Err(UseFlagParseError(s.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            enabled,
        })
    }
}

impl fmt::Display for UseFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let polarity = if self.enabled { '+' } else { '-' };
        write!(f, "{polarity}{}", self.name)
    }
}

impl Serialize for UseFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UseFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
