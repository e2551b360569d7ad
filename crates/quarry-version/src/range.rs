use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::{Version, VersionParseError};

/// A set of versions: a sorted list of disjoint, non-empty, non-adjacent
/// half-open intervals `[lo, hi)`, either endpoint optionally unbounded.
///
/// The canonical form is maintained by every operation, so two ranges are
/// equal iff they contain the same versions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    segments: Vec<Segment>,
}

/// `[lo, hi)`; `None` means unbounded on that side.
type Segment = (Option<Version>, Option<Version>);

impl Range {
    /// The set containing every version.
    pub fn full() -> Self {
        Self {
            segments: vec![(None, None)],
        }
    }

    /// The empty set.
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// The set containing exactly `v`.
    pub fn singleton(v: Version) -> Self {
        let upper = v.order_successor();
        Self {
            segments: vec![(Some(v), Some(upper))],
        }
    }

    /// `>= v`
    pub fn higher_than(v: Version) -> Self {
        Self {
            segments: vec![(Some(v), None)],
        }
    }

    /// `> v`
    pub fn strictly_higher_than(v: Version) -> Self {
        Self {
            segments: vec![(Some(v.order_successor()), None)],
        }
    }

    /// `<= v`
    pub fn lower_than(v: Version) -> Self {
        Self {
            segments: vec![(None, Some(v.order_successor()))],
        }
    }

    /// `< v`
    pub fn strictly_lower_than(v: Version) -> Self {
        Self {
            segments: vec![(None, Some(v))],
        }
    }

    /// `[lo, hi)`; empty when `hi <= lo`.
    pub fn between(lo: Version, hi: Version) -> Self {
        if hi <= lo {
            Self::empty()
        } else {
            Self {
                segments: vec![(Some(lo), Some(hi))],
            }
        }
    }

    /// `^v`: `[v, next_major(v))`.
    pub fn compatible_with(v: Version) -> Self {
        let upper = v.next_major();
        Self::between(v, upper)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.segments == [(None, None)]
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.segments.iter().any(|(lo, hi)| {
            lo.as_ref().is_none_or(|lo| lo <= version)
                && hi.as_ref().is_none_or(|hi| version < hi)
        })
    }

    /// The set of versions contained in both `self` and `other`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut segments = Vec::new();
        let mut left = self.segments.iter();
        let mut right = other.segments.iter();
        let mut a = left.next();
        let mut b = right.next();
        while let (Some((a_lo, a_hi)), Some((b_lo, b_hi))) = (a, b) {
            let lo = match (a_lo, b_lo) {
                (None, bound) | (bound, None) => bound.clone(),
                (Some(x), Some(y)) => Some(x.max(y).clone()),
            };
            let hi = match (a_hi, b_hi) {
                (None, bound) | (bound, None) => bound.clone(),
                (Some(x), Some(y)) => Some(x.min(y).clone()),
            };
            if match (&lo, &hi) {
                (Some(lo), Some(hi)) => lo < hi,
                _ => true,
            } {
                segments.push((lo, hi));
            }
            // Advance whichever segment ends first; on a tie both end.
            match (a_hi, b_hi) {
                (None, None) => break,
                (Some(_), None) => a = left.next(),
                (None, Some(_)) => b = right.next(),
                (Some(x), Some(y)) => {
                    if x <= y {
                        a = left.next();
                    }
                    if y <= x {
                        b = right.next();
                    }
                }
            }
        }
        Self { segments }
    }

    /// The set of versions not contained in `self`.
    #[must_use]
    pub fn complement(&self) -> Self {
        let mut segments = Vec::new();
        let mut lower: Option<Option<Version>> = Some(None);
        for (lo, hi) in &self.segments {
            if let Some(lower) = lower.take() {
                if lower != *lo {
                    segments.push((lower, lo.clone()));
                }
            }
            lower = hi.clone().map(Some);
        }
        if let Some(lower) = lower {
            segments.push((lower, None));
        }
        Self { segments }
    }

    /// The set of versions contained in either `self` or `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.complement()
            .intersection(&other.complement())
            .complement()
    }
}

/// An error that occurs when parsing an invalid range expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    #[error(transparent)]
    MalformedVersion(#[from] VersionParseError),
    #[error("unknown operator in `{0}`")]
    UnknownOperator(String),
}

/// Splits a term into its operator and version parts.
fn split_operator(term: &str) -> Result<(Operator, &str), RangeParseError> {
    let bytes = term.as_bytes();
    match bytes {
        [b'>', b'=', ..] => Ok((Operator::GreaterEqual, &term[2..])),
        [b'>', ..] => Ok((Operator::Greater, &term[1..])),
        [b'<', b'=', ..] => Ok((Operator::LessEqual, &term[2..])),
        [b'<', ..] => Ok((Operator::Less, &term[1..])),
        [b'=', b'=', ..] => Ok((Operator::Equal, &term[2..])),
        [b'=', ..] => Ok((Operator::Equal, &term[1..])),
        [b'^', ..] => Ok((Operator::Caret, &term[1..])),
        [b'~' | b'!' | b'*', ..] => Err(RangeParseError::UnknownOperator(term.to_string())),
        _ => Ok((Operator::Equal, term)),
    }
}

#[derive(Clone, Copy)]
enum Operator {
    GreaterEqual,
    Greater,
    LessEqual,
    Less,
    Equal,
    Caret,
}

impl FromStr for Range {
    type Err = RangeParseError;

    /// Parses `alt ("|" alt)*` where `alt := term ("," term)*`,
    /// `term := op? version`, and `op ∈ {>=, >, <=, <, =, ==, ^}`. A bare
    /// version means `==`; an empty expression (or `*`) is the full set.
    ///
    /// Requirement expressions only ever use the `,`-conjunction; the `|`
    /// union arm exists so the canonical display of any range, including the
    /// multi-segment result of `complement` or `union`, parses back to an
    /// equal range.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::full());
        }
        let mut result = Self::empty();
        for alternative in s.split('|') {
            let alternative = alternative.trim();
            if alternative == "*" {
                result = Self::full();
                continue;
            }
            let mut range = Self::full();
            for term in alternative.split(',') {
                let term = term.trim();
                let (op, rest) = split_operator(term)?;
                let version: Version = rest.trim().parse()?;
                let term_range = match op {
                    Operator::GreaterEqual => Self::higher_than(version),
                    Operator::Greater => Self::strictly_higher_than(version),
                    Operator::LessEqual => Self::lower_than(version),
                    Operator::Less => Self::strictly_lower_than(version),
                    Operator::Equal => Self::singleton(version),
                    Operator::Caret => Self::compatible_with(version),
                };
                range = range.intersection(&term_range);
            }
            result = result.union(&range);
        }
        Ok(result)
    }
}

impl fmt::Display for Range {
    /// The canonical form: comma-joined comparators per interval, intervals
    /// joined with `|`. The output parses back to an equal range.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<empty>");
        }
        for (i, (lo, hi)) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            match (lo, hi) {
                (None, None) => f.write_str("*")?,
                (Some(lo), None) => write!(f, ">={lo}")?,
                (None, Some(hi)) => write!(f, "<{hi}")?,
                (Some(lo), Some(hi)) => {
                    if *hi == lo.order_successor() {
                        write!(f, "=={lo}")?;
                    } else {
                        write!(f, ">={lo},<{hi}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Serialize for Range {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Range {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn r(s: &str) -> Range {
        s.parse().unwrap()
    }

    #[test]
    fn intersection_identities() {
        for range in [r(">=1.0.0"), r("<2.0.0"), r("^1.2.3"), r("==1.0.0"), Range::full()] {
            assert_eq!(range.intersection(&Range::full()), range);
            assert_eq!(range.intersection(&Range::empty()), Range::empty());
            assert_eq!(range.intersection(&range.complement()), Range::empty());
            assert_eq!(range.union(&range.complement()), Range::full());
        }
    }

    #[test]
    fn double_complement_is_identity() {
        for range in [r(">=1.0.0,<4.0.0"), r("^0.3.0"), Range::full(), Range::empty()] {
            assert_eq!(range.complement().complement(), range);
            for version in ["0.0.0", "0.3.1", "1.0.0", "3.9.9", "4.0.0"] {
                assert_eq!(
                    range.contains(&v(version)),
                    range.complement().complement().contains(&v(version))
                );
            }
        }
    }

    #[test]
    fn contains_respects_bounds() {
        let range = r(">=1.0.0,<4.0.0");
        assert!(range.contains(&v("1.0.0")));
        assert!(range.contains(&v("3.9.9")));
        assert!(!range.contains(&v("0.9.9")));
        assert!(!range.contains(&v("4.0.0")));
    }

    #[test]
    fn inclusive_operators() {
        assert!(r("<=1.2.3").contains(&v("1.2.3")));
        assert!(!r("<=1.2.3").contains(&v("1.2.4-alpha")));
        assert!(!r("<1.2.3").contains(&v("1.2.3")));
        assert!(r(">1.2.3").contains(&v("1.2.4-alpha")));
        assert!(!r(">1.2.3").contains(&v("1.2.3")));
    }

    #[test]
    fn caret_is_compatible_within_major() {
        let range = r("^1.2.3");
        assert!(range.contains(&v("1.2.3")));
        assert!(range.contains(&v("1.99.0")));
        assert!(!range.contains(&v("1.2.2")));
        assert!(!range.contains(&v("2.0.0")));
    }

    #[test]
    fn bare_version_means_exact() {
        assert_eq!(r("1.2.3"), r("==1.2.3"));
        assert_eq!(r("=1.2.3"), r("==1.2.3"));
        assert!(r("1.2.3").contains(&v("1.2.3")));
        assert!(!r("1.2.3").contains(&v("1.2.4")));
    }

    #[test]
    fn empty_expression_is_full() {
        assert!(r("").is_full());
        assert!(r("*").is_full());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(matches!(
            "~1.2.3".parse::<Range>(),
            Err(RangeParseError::UnknownOperator(_))
        ));
    }

    #[test]
    fn malformed_version_is_rejected() {
        assert!(matches!(
            ">=banana".parse::<Range>(),
            Err(RangeParseError::MalformedVersion(_))
        ));
    }

    #[test]
    fn display_is_canonical_and_reparses_equal() {
        for input in [">=1.0.0,<4.0.0", "^1.2.3", "==1.0.0", "<=2.5.0", ">0.1.0", "*", ">=1.0.0"] {
            let range = r(input);
            let displayed = range.to_string();
            assert_eq!(displayed.parse::<Range>().unwrap(), range, "via {displayed}");
            // Displaying the reparsed form is a fixed point.
            assert_eq!(displayed.parse::<Range>().unwrap().to_string(), displayed);
        }
    }

    #[test]
    fn multi_segment_display_reparses_equal() {
        // Complements and unions produce disjoint segments; their canonical
        // form must survive a display/parse round trip too.
        let two = r(">=1.0.0,<2.0.0").complement();
        let three = r("<1.0.0")
            .union(&r(">=2.0.0,<3.0.0"))
            .union(&r("==5.0.0"));
        for range in [two, three] {
            let displayed = range.to_string();
            let reparsed: Range = displayed.parse().unwrap();
            assert_eq!(reparsed, range, "via {displayed}");
            assert_eq!(reparsed.to_string(), displayed);
        }
    }

    #[test]
    fn parses_union_separator() {
        let range = r("<1.0.0 | >=2.0.0,<3.0.0");
        assert!(range.contains(&v("0.5.0")));
        assert!(!range.contains(&v("1.5.0")));
        assert!(range.contains(&v("2.0.0")));
        assert!(!range.contains(&v("3.0.0")));
        assert_eq!(range, r("<1.0.0").union(&r(">=2.0.0,<3.0.0")));
    }

    #[test]
    fn empty_union_alternative_is_rejected() {
        assert!("<1.0.0 | ".parse::<Range>().is_err());
        assert!("|".parse::<Range>().is_err());
    }

    #[test]
    fn conjunction_narrows() {
        let range = r(">=1.0.0,<4.0.0,>=2.0.0");
        assert!(!range.contains(&v("1.5.0")));
        assert!(range.contains(&v("2.0.0")));
        assert!(range.contains(&v("3.9.9")));
        assert!(!range.contains(&v("4.0.0")));
    }

    #[test]
    fn contradictory_conjunction_is_empty() {
        assert!(r(">=4.0.0,<1.0.0").is_empty());
    }

    #[test]
    fn complement_of_interval_has_two_segments() {
        let range = r(">=1.0.0,<2.0.0");
        let complement = range.complement();
        assert!(complement.contains(&v("0.9.0")));
        assert!(complement.contains(&v("2.0.0")));
        assert!(!complement.contains(&v("1.5.0")));
    }

    #[test]
    fn union_merges_overlap() {
        let a = r(">=1.0.0,<2.0.0");
        let b = r(">=1.5.0,<3.0.0");
        let union = a.union(&b);
        assert_eq!(union, r(">=1.0.0,<3.0.0"));
    }
}
