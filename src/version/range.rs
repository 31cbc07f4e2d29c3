// src/version/range.rs

//! Version range parsing and satisfaction.
//!
//! Ranges use the bracket grammar: `1.0` is an inclusive floating minimum,
//! `[1.0]` pins a single version, `[1.0,2.0)` mixes inclusive and exclusive
//! bounds, and `*` accepts everything.

use crate::error::{Error, Result};
use crate::version::PackageVersion;
use std::fmt;

/// An interval of acceptable versions with optional bounds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub min: Option<PackageVersion>,
    pub min_inclusive: bool,
    pub max: Option<PackageVersion>,
    pub max_inclusive: bool,
    /// Whether prerelease versions satisfy this range regardless of bounds.
    pub include_prerelease: bool,
}

impl VersionRange {
    /// The unbounded range: every release version satisfies it.
    pub fn all() -> Self {
        Self {
            min: None,
            min_inclusive: true,
            max: None,
            max_inclusive: false,
            include_prerelease: false,
        }
    }

    /// An inclusive floating minimum: any version ≥ `min`.
    pub fn at_least(min: PackageVersion) -> Self {
        Self {
            min: Some(min),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
            include_prerelease: false,
        }
    }

    /// The single-point range `[v,v]`.
    pub fn exact(v: PackageVersion) -> Self {
        Self {
            min: Some(v.clone()),
            min_inclusive: true,
            max: Some(v),
            max_inclusive: true,
            include_prerelease: false,
        }
    }

    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    /// Parse a range string
    ///
    /// Examples:
    /// - "1.0" → ≥ 1.0
    /// - "[1.0]" → exactly 1.0
    /// - "[1.0,2.0)" → 1.0 ≤ v < 2.0
    /// - "(,1.0]" → v ≤ 1.0
    /// - "*" → everything
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |detail: &str| Error::RangeParse {
            input: s.to_string(),
            detail: detail.to_string(),
        };

        if s.is_empty() || s == "*" {
            return Ok(Self::all());
        }

        let first = s.chars().next().unwrap_or(' ');
        if first != '[' && first != '(' {
            // Bare version: inclusive floating minimum.
            return Ok(Self::at_least(PackageVersion::parse(s)?));
        }

        let last = s.chars().last().unwrap_or(' ');
        if last != ']' && last != ')' {
            return Err(invalid("unterminated bracket"));
        }

        let min_inclusive = first == '[';
        let max_inclusive = last == ']';
        let body = &s[1..s.len() - 1];

        let (min_str, max_str) = match body.split_once(',') {
            Some((lo, hi)) => (lo.trim(), hi.trim()),
            None => {
                // Single-point form "[1.0]".
                if !min_inclusive || !max_inclusive {
                    return Err(invalid("single-version range must use [v]"));
                }
                let v = PackageVersion::parse(body.trim())?;
                return Ok(Self::exact(v));
            }
        };

        let min = if min_str.is_empty() {
            None
        } else {
            Some(PackageVersion::parse(min_str)?)
        };
        let max = if max_str.is_empty() {
            None
        } else {
            Some(PackageVersion::parse(max_str)?)
        };

        if min.is_none() && max.is_none() {
            return Err(invalid("range has no bounds"));
        }
        if let (Some(lo), Some(hi)) = (&min, &max) {
            if lo > hi {
                return Err(invalid("lower bound exceeds upper bound"));
            }
        }

        Ok(Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
            include_prerelease: false,
        })
    }

    /// Whether this is a single-point range `[v,v]`.
    pub fn is_exact(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(lo), Some(hi)) => lo == hi && self.min_inclusive && self.max_inclusive,
            _ => false,
        }
    }

    /// The pinned version of a single-point range.
    pub fn exact_version(&self) -> Option<&PackageVersion> {
        if self.is_exact() {
            self.min.as_ref()
        } else {
            None
        }
    }

    /// Check whether a version falls inside the range
    ///
    /// A prerelease version satisfies only when the range explicitly admits
    /// prereleases or a bound is itself a prerelease of the same numeric
    /// tuple as the candidate.
    pub fn satisfies(&self, v: &PackageVersion) -> bool {
        if let Some(ref min) = self.min {
            match v.cmp(min) {
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal if !self.min_inclusive => return false,
                _ => {}
            }
        }
        if let Some(ref max) = self.max {
            match v.cmp(max) {
                std::cmp::Ordering::Greater => return false,
                std::cmp::Ordering::Equal if !self.max_inclusive => return false,
                _ => {}
            }
        }

        if v.is_prerelease() && !self.include_prerelease {
            return self.bound_admits_prerelease(v);
        }

        true
    }

    fn bound_admits_prerelease(&self, v: &PackageVersion) -> bool {
        let bound_matches = |b: &Option<PackageVersion>| {
            b.as_ref()
                .map(|bv| bv.is_prerelease() && bv.same_release_tuple(v))
                .unwrap_or(false)
        };
        bound_matches(&self.min) || bound_matches(&self.max)
    }

    /// Intersect with another range, returning the tightest common interval
    /// or `None` when the two are disjoint.
    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let (min, min_inclusive) = tighter_bound(
            self.min.as_ref(),
            self.min_inclusive,
            other.min.as_ref(),
            other.min_inclusive,
            true,
        );
        let (max, max_inclusive) = tighter_bound(
            self.max.as_ref(),
            self.max_inclusive,
            other.max.as_ref(),
            other.max_inclusive,
            false,
        );

        if let (Some(lo), Some(hi)) = (&min, &max) {
            match lo.cmp(hi) {
                std::cmp::Ordering::Greater => return None,
                std::cmp::Ordering::Equal if !(min_inclusive && max_inclusive) => return None,
                _ => {}
            }
        }

        Some(VersionRange {
            min: min.cloned(),
            min_inclusive,
            max: max.cloned(),
            max_inclusive,
            include_prerelease: self.include_prerelease || other.include_prerelease,
        })
    }
}

/// Pick the tighter of two optional bounds. For lower bounds the greater
/// value wins; for upper bounds the lesser. Equal bounds keep the stricter
/// (exclusive) flag.
fn tighter_bound<'a>(
    a: Option<&'a PackageVersion>,
    a_inclusive: bool,
    b: Option<&'a PackageVersion>,
    b_inclusive: bool,
    lower: bool,
) -> (Option<&'a PackageVersion>, bool) {
    match (a, b) {
        (None, None) => (None, lower),
        (Some(_), None) => (a, a_inclusive),
        (None, Some(_)) => (b, b_inclusive),
        (Some(av), Some(bv)) => match av.cmp(bv) {
            std::cmp::Ordering::Equal => (a, a_inclusive && b_inclusive),
            std::cmp::Ordering::Greater => {
                if lower {
                    (a, a_inclusive)
                } else {
                    (b, b_inclusive)
                }
            }
            std::cmp::Ordering::Less => {
                if lower {
                    (b, b_inclusive)
                } else {
                    (a, a_inclusive)
                }
            }
        },
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            // min is present by is_exact's definition
            return write!(f, "[{}]", self.min.as_ref().unwrap());
        }
        match (&self.min, &self.max) {
            (None, None) => write!(f, "*"),
            (Some(min), None) if self.min_inclusive => write!(f, "{min}"),
            _ => {
                write!(f, "{}", if self.min_inclusive { '[' } else { '(' })?;
                if let Some(ref min) = self.min {
                    write!(f, "{min}")?;
                }
                write!(f, ",")?;
                if let Some(ref max) = self.max {
                    write!(f, "{max}")?;
                }
                write!(f, "{}", if self.max_inclusive { ']' } else { ')' })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    fn r(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn test_parse_floating_minimum() {
        let range = r("1.4.4");
        assert!(range.satisfies(&v("1.4.4")));
        assert!(range.satisfies(&v("99.0")));
        assert!(!range.satisfies(&v("1.4.3")));
    }

    #[test]
    fn test_parse_exact() {
        let range = r("[1.4.4]");
        assert!(range.is_exact());
        assert!(range.satisfies(&v("1.4.4")));
        assert!(!range.satisfies(&v("1.4.5")));
        assert_eq!(range.exact_version(), Some(&v("1.4.4")));
    }

    #[test]
    fn test_parse_half_open() {
        let range = r("[1.0,2.0)");
        assert!(range.satisfies(&v("1.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0")));
    }

    #[test]
    fn test_parse_upper_only() {
        let range = r("(,1.0]");
        assert!(range.satisfies(&v("0.5")));
        assert!(range.satisfies(&v("1.0")));
        assert!(!range.satisfies(&v("1.0.1")));
    }

    #[test]
    fn test_parse_rejects_inverted_bounds() {
        assert!(VersionRange::parse("[2.0,1.0]").is_err());
        assert!(VersionRange::parse("[1.0,2.0").is_err());
        assert!(VersionRange::parse("(,)").is_err());
    }

    #[test]
    fn test_prerelease_needs_admission() {
        let range = r("[1.0,2.0)");
        assert!(!range.satisfies(&v("1.5.0-beta")));
        assert!(range
            .clone()
            .with_prerelease(true)
            .satisfies(&v("1.5.0-beta")));
    }

    #[test]
    fn test_prerelease_bound_admits_same_tuple() {
        let range = r("[1.5.0-alpha,2.0)");
        assert!(range.satisfies(&v("1.5.0-beta")));
        assert!(!range.satisfies(&v("1.6.0-beta")));
    }

    #[test]
    fn test_intersect_overlapping() {
        let a = r("[1.0,3.0)");
        let b = r("[2.0,4.0)");
        let both = a.intersect(&b).unwrap();
        assert!(both.satisfies(&v("2.5")));
        assert!(!both.satisfies(&v("1.5")));
        assert!(!both.satisfies(&v("3.0")));
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = r("[1.0,2.0)");
        let b = r("[2.0,3.0)");
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn test_intersect_touching_bounds_keep_strictness() {
        let a = r("[1.0,2.0]");
        let b = r("[2.0,3.0)");
        let both = a.intersect(&b).unwrap();
        assert!(both.satisfies(&v("2.0")));
        assert!(!both.satisfies(&v("2.1")));
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["1.4.4", "[1.4.4]", "[1.0.0,2.0.0)", "(,1.0.0]", "*"] {
            let range = r(s);
            assert_eq!(VersionRange::parse(&range.to_string()).unwrap(), range);
        }
    }
}
