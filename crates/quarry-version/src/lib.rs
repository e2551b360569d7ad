//! Semantic versions and version ranges.
//!
//! A [`Version`] is a `major.minor.patch` triple with an optional pre-release
//! tag. A [`Range`] is a canonical union of half-open version intervals,
//! closed under intersection and complement, and is what requirement
//! expressions such as `>=1.2.0,<2.0.0` or `^1.4.1` parse into.

pub use crate::range::{Range, RangeParseError};
pub use crate::version::{Prerelease, Version, VersionParseError};

mod range;
mod version;
