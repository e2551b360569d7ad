use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A semantic version: a `major.minor.patch` triple with an optional
/// pre-release tag.
///
/// The total order is numeric-lexicographic on the triple; a version carrying
/// a pre-release tag sorts strictly below the same triple without one, and
/// pre-release tags compare by their dot-separated identifiers (numeric
/// identifiers numerically and below alphanumeric ones, a shorter identifier
/// list below a longer one with an equal prefix).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<Prerelease>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    #[must_use]
    pub fn with_pre(mut self, pre: Prerelease) -> Self {
        self.pre = Some(pre);
        self
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn pre(&self) -> Option<&Prerelease> {
        self.pre.as_ref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// The next major version: `major + 1` with minor and patch zeroed.
    ///
    /// This is the exclusive upper bound of a caret requirement.
    #[must_use]
    pub fn next_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    /// The smallest version that is strictly greater than `self`.
    ///
    /// Used to encode an inclusive upper bound as a half-open one: `<= v`
    /// becomes `< v.order_successor()`. For a release version the successor
    /// is the first pre-release of the next patch (`1.2.3` -> `1.2.4-0`);
    /// for a pre-release it extends the tag (`1.2.3-a` -> `1.2.3-a.0`).
    #[must_use]
    pub(crate) fn order_successor(&self) -> Self {
        match &self.pre {
            None => Self::new(self.major, self.minor, self.patch + 1)
                .with_pre(Prerelease(vec![Identifier::Numeric(0)])),
            Some(pre) => {
                let mut identifiers = pre.0.clone();
                identifiers.push(Identifier::Numeric(0));
                Self::new(self.major, self.minor, self.patch).with_pre(Prerelease(identifiers))
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

/// A pre-release tag: a non-empty list of dot-separated identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prerelease(Vec<Identifier>);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::AlphaNumeric(_)) => Ordering::Less,
            (Self::AlphaNumeric(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::AlphaNumeric(a), Self::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Prerelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, identifier) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match identifier {
                Identifier::Numeric(n) => write!(f, "{n}")?,
                Identifier::AlphaNumeric(s) => f.write_str(s)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Prerelease {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionParseError::new(s, "empty pre-release tag"));
        }
        let mut identifiers = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(VersionParseError::new(s, "empty pre-release identifier"));
            }
            if !part
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            {
                return Err(VersionParseError::new(s, "invalid pre-release identifier"));
            }
            // An all-digit identifier compares numerically; leading zeros are
            // normalized away by the conversion.
            if part.bytes().all(|b| b.is_ascii_digit()) {
                let value = part
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::new(s, "pre-release number out of range"))?;
                identifiers.push(Identifier::Numeric(value));
            } else {
                identifiers.push(Identifier::AlphaNumeric(part.to_string()));
            }
        }
        Ok(Self(identifiers))
    }
}

/// An error that occurs when parsing an invalid version.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed version `{input}`: {reason}")]
pub struct VersionParseError {
    input: String,
    reason: &'static str,
}

impl VersionParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::new(s, "empty version"));
        }

        let (release, pre) = match s.split_once('-') {
            Some((release, pre)) => (release, Some(pre.parse::<Prerelease>().map_err(
                |err| VersionParseError::new(s, err.reason),
            )?)),
            None => (s, None),
        };

        let mut numbers = [0u64; 3];
        let mut count = 0;
        for part in release.split('.') {
            if count == 3 {
                return Err(VersionParseError::new(s, "too many version components"));
            }
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionParseError::new(s, "non-numeric version component"));
            }
            numbers[count] = part
                .parse::<u64>()
                .map_err(|_| VersionParseError::new(s, "version component out of range"))?;
            count += 1;
        }

        let mut version = Self::new(numbers[0], numbers[1], numbers[2]);
        version.pre = pre;
        Ok(version)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
