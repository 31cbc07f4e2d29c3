// src/framework.rs

//! Target framework identifiers and compatibility.
//!
//! Frameworks are parsed from folder-name monikers such as `net45`,
//! `net472`, or `netstandard2.0`. A package folder is compatible with a
//! project when the identifiers match and the folder's version does not
//! exceed the project's; the best match is the greatest compatible version.

use crate::error::{Error, Result};
use std::fmt;

/// A parsed target framework moniker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Framework {
    /// Matches every project framework; the moniker `any`.
    Any,
    Known {
        identifier: FrameworkIdentifier,
        version: (u16, u16),
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameworkIdentifier {
    /// `netNN` monikers, e.g. net40, net45, net472.
    NetFramework,
    /// `netstandardX.Y` monikers.
    NetStandard,
}

impl Framework {
    pub fn any() -> Self {
        Framework::Any
    }

    /// Parse a framework moniker
    ///
    /// Examples: "net45" → .NET Framework 4.5, "net472" → 4.7.2 (extra
    /// digits fold into the minor part), "netstandard2.0", "any".
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        let invalid = || Error::FrameworkParse {
            input: s.to_string(),
        };

        if lower.is_empty() || lower == "any" {
            return Ok(Framework::Any);
        }

        if let Some(rest) = lower.strip_prefix("netstandard") {
            let (major, minor) = rest.split_once('.').ok_or_else(invalid)?;
            return Ok(Framework::Known {
                identifier: FrameworkIdentifier::NetStandard,
                version: (
                    major.parse().map_err(|_| invalid())?,
                    minor.parse().map_err(|_| invalid())?,
                ),
            });
        }

        if let Some(digits) = lower.strip_prefix("net") {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            // "45" → (4, 5); "472" → (4, 72): first digit is the major,
            // the remainder is the minor.
            let major: u16 = digits[..1].parse().map_err(|_| invalid())?;
            let minor: u16 = digits[1..].parse().unwrap_or(0);
            return Ok(Framework::Known {
                identifier: FrameworkIdentifier::NetFramework,
                version: (major, minor),
            });
        }

        Err(invalid())
    }

    /// Whether content targeting `self` can be consumed by a project
    /// targeting `project`.
    pub fn compatible_with(&self, project: &Framework) -> bool {
        match (self, project) {
            (Framework::Any, _) | (_, Framework::Any) => true,
            (
                Framework::Known {
                    identifier: a,
                    version: av,
                },
                Framework::Known {
                    identifier: b,
                    version: bv,
                },
            ) => a == b && av <= bv,
        }
    }

    /// Rank for best-match selection among compatible candidates: a later
    /// (greater) framework version wins, and any concrete framework beats
    /// the `any` placeholder.
    fn precedence(&self) -> (u8, (u16, u16)) {
        match self {
            Framework::Any => (0, (0, 0)),
            Framework::Known { version, .. } => (1, *version),
        }
    }

    /// Pick the best match for `project` among `candidates`, the
    /// longest-compatible rule: highest compatible framework version.
    pub fn best_match<'a>(
        project: &Framework,
        candidates: impl IntoIterator<Item = &'a Framework>,
    ) -> Option<&'a Framework> {
        candidates
            .into_iter()
            .filter(|c| c.compatible_with(project))
            .max_by_key(|c| c.precedence())
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framework::Any => write!(f, "any"),
            Framework::Known {
                identifier: FrameworkIdentifier::NetFramework,
                version: (major, minor),
            } => write!(f, "net{major}{minor}"),
            Framework::Known {
                identifier: FrameworkIdentifier::NetStandard,
                version: (major, minor),
            } => write!(f, "netstandard{major}.{minor}"),
        }
    }
}

impl std::str::FromStr for Framework {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fw(s: &str) -> Framework {
        Framework::parse(s).unwrap()
    }

    #[test]
    fn test_parse_net_monikers() {
        assert_eq!(
            fw("net45"),
            Framework::Known {
                identifier: FrameworkIdentifier::NetFramework,
                version: (4, 5)
            }
        );
        assert_eq!(
            fw("net472"),
            Framework::Known {
                identifier: FrameworkIdentifier::NetFramework,
                version: (4, 72)
            }
        );
    }

    #[test]
    fn test_parse_netstandard() {
        assert_eq!(
            fw("netstandard2.0"),
            Framework::Known {
                identifier: FrameworkIdentifier::NetStandard,
                version: (2, 0)
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(Framework::parse("silverlight5").is_err());
        assert!(Framework::parse("netstandard").is_err());
        assert!(Framework::parse("netx").is_err());
    }

    #[test]
    fn test_compatibility_is_upward() {
        assert!(fw("net40").compatible_with(&fw("net45")));
        assert!(!fw("net46").compatible_with(&fw("net45")));
        assert!(fw("net45").compatible_with(&fw("net45")));
    }

    #[test]
    fn test_any_is_always_compatible() {
        assert!(Framework::Any.compatible_with(&fw("net45")));
        assert!(fw("net45").compatible_with(&Framework::Any));
    }

    #[test]
    fn test_identifiers_do_not_mix() {
        assert!(!fw("netstandard2.0").compatible_with(&fw("net45")));
    }

    #[test]
    fn test_best_match_prefers_highest_compatible() {
        let candidates = vec![fw("net20"), fw("net40"), fw("net45"), fw("net46")];
        let best = Framework::best_match(&fw("net45"), &candidates);
        assert_eq!(best, Some(&fw("net45")));
    }

    #[test]
    fn test_best_match_prefers_concrete_over_any() {
        let candidates = vec![Framework::Any, fw("net40")];
        let best = Framework::best_match(&fw("net45"), &candidates);
        assert_eq!(best, Some(&fw("net40")));
    }

    #[test]
    fn test_best_match_none_when_incompatible() {
        let candidates = vec![fw("net46"), fw("net47")];
        assert_eq!(Framework::best_match(&fw("net45"), &candidates), None);
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["net45", "net472", "netstandard2.0", "any"] {
            assert_eq!(fw(s).to_string(), s);
        }
    }
}
