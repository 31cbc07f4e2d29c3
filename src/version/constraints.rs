// src/version/constraints.rs

//! Exact-segment constraints and dependency selection behavior.

use crate::version::PackageVersion;
use std::fmt;
use std::ops::BitOr;

/// A bitset forcing chosen versions to keep segments equal to the
/// currently installed version. Reinstall sets every bit, which pins the
/// candidate to the installed version exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VersionConstraints(u8);

impl VersionConstraints {
    pub const NONE: Self = Self(0);
    pub const EXACT_MAJOR: Self = Self(1);
    pub const EXACT_MINOR: Self = Self(1 << 1);
    pub const EXACT_PATCH: Self = Self(1 << 2);
    pub const EXACT_RELEASE: Self = Self(1 << 3);
    /// All four bits: the reinstall pin.
    pub const EXACT_ALL: Self =
        Self(Self::EXACT_MAJOR.0 | Self::EXACT_MINOR.0 | Self::EXACT_PATCH.0 | Self::EXACT_RELEASE.0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether `candidate` keeps every constrained segment equal to
    /// `installed`. With no installed version there is nothing to pin.
    pub fn permits(self, installed: Option<&PackageVersion>, candidate: &PackageVersion) -> bool {
        let Some(installed) = installed else {
            return true;
        };
        if self.contains(Self::EXACT_MAJOR) && candidate.major != installed.major {
            return false;
        }
        if self.contains(Self::EXACT_MINOR) && candidate.minor != installed.minor {
            return false;
        }
        if self.contains(Self::EXACT_PATCH)
            && (candidate.patch != installed.patch || candidate.revision != installed.revision)
        {
            return false;
        }
        if self.contains(Self::EXACT_RELEASE) && candidate.prerelease != installed.prerelease {
            return false;
        }
        true
    }
}

impl BitOr for VersionConstraints {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for VersionConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let mut parts = Vec::new();
        if self.contains(Self::EXACT_MAJOR) {
            parts.push("major");
        }
        if self.contains(Self::EXACT_MINOR) {
            parts.push("minor");
        }
        if self.contains(Self::EXACT_PATCH) {
            parts.push("patch");
        }
        if self.contains(Self::EXACT_RELEASE) {
            parts.push("release");
        }
        write!(f, "exact({})", parts.join("|"))
    }
}

/// Governs which in-range candidate the resolver prefers for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyBehavior {
    /// Install only the direct targets; do not expand dependencies.
    Ignore,
    /// Pick the smallest candidate satisfying the requirements.
    #[default]
    Lowest,
    /// Pick the greatest candidate sharing the installed major and minor.
    HighestPatch,
    /// Pick the greatest candidate sharing the installed major.
    HighestMinor,
    /// Pick the greatest candidate in range.
    Highest,
}

impl DependencyBehavior {
    /// Select from `candidates` (sorted ascending). The anchored behaviors
    /// fall back to the greatest candidate when nothing matches the
    /// installed anchor, or when no version is installed.
    pub fn choose<'a>(
        self,
        candidates: &'a [PackageVersion],
        installed: Option<&PackageVersion>,
    ) -> Option<&'a PackageVersion> {
        if candidates.is_empty() {
            return None;
        }
        match self {
            DependencyBehavior::Ignore | DependencyBehavior::Lowest => candidates.first(),
            DependencyBehavior::Highest => candidates.last(),
            DependencyBehavior::HighestPatch => {
                let anchored = installed.and_then(|inst| {
                    candidates
                        .iter()
                        .filter(|c| c.major == inst.major && c.minor == inst.minor)
                        .next_back()
                });
                anchored.or_else(|| candidates.last())
            }
            DependencyBehavior::HighestMinor => {
                let anchored = installed.and_then(|inst| {
                    candidates.iter().filter(|c| c.major == inst.major).next_back()
                });
                anchored.or_else(|| candidates.last())
            }
        }
    }
}

impl fmt::Display for DependencyBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DependencyBehavior::Ignore => "ignore",
            DependencyBehavior::Lowest => "lowest",
            DependencyBehavior::HighestPatch => "highest-patch",
            DependencyBehavior::HighestMinor => "highest-minor",
            DependencyBehavior::Highest => "highest",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    fn sorted(list: &[&str]) -> Vec<PackageVersion> {
        let mut versions: Vec<PackageVersion> = list.iter().map(|s| v(s)).collect();
        versions.sort();
        versions
    }

    #[test]
    fn test_constraints_union() {
        let c = VersionConstraints::EXACT_MAJOR | VersionConstraints::EXACT_MINOR;
        assert!(c.contains(VersionConstraints::EXACT_MAJOR));
        assert!(c.contains(VersionConstraints::EXACT_MINOR));
        assert!(!c.contains(VersionConstraints::EXACT_PATCH));
    }

    #[test]
    fn test_exact_all_pins_to_installed() {
        let installed = v("2.2.22");
        let c = VersionConstraints::EXACT_ALL;
        assert!(c.permits(Some(&installed), &v("2.2.22")));
        assert!(!c.permits(Some(&installed), &v("2.2.23")));
        assert!(!c.permits(Some(&installed), &v("2.3.22")));
        assert!(!c.permits(Some(&installed), &v("3.2.22")));
    }

    #[test]
    fn test_exact_major_allows_minor_drift() {
        let installed = v("1.4.4");
        let c = VersionConstraints::EXACT_MAJOR;
        assert!(c.permits(Some(&installed), &v("1.6.4")));
        assert!(!c.permits(Some(&installed), &v("2.0.0")));
    }

    #[test]
    fn test_exact_release_pins_prerelease_label() {
        let installed = v("1.0.0-beta");
        let c = VersionConstraints::EXACT_RELEASE;
        assert!(c.permits(Some(&installed), &v("2.0.0-beta")));
        assert!(!c.permits(Some(&installed), &v("2.0.0")));
    }

    #[test]
    fn test_no_installed_version_permits_anything() {
        assert!(VersionConstraints::EXACT_ALL.permits(None, &v("9.9.9")));
    }

    #[test]
    fn test_behavior_lowest_and_highest() {
        let c = sorted(&["1.0.0", "1.5.0", "2.0.0"]);
        assert_eq!(DependencyBehavior::Lowest.choose(&c, None), Some(&v("1.0.0")));
        assert_eq!(DependencyBehavior::Highest.choose(&c, None), Some(&v("2.0.0")));
    }

    #[test]
    fn test_behavior_highest_patch_anchors_to_installed() {
        let c = sorted(&["1.2.1", "1.2.9", "1.3.0", "2.0.0"]);
        let installed = v("1.2.0");
        assert_eq!(
            DependencyBehavior::HighestPatch.choose(&c, Some(&installed)),
            Some(&v("1.2.9"))
        );
    }

    #[test]
    fn test_behavior_highest_minor_anchors_to_installed() {
        let c = sorted(&["1.2.1", "1.9.0", "2.0.0"]);
        let installed = v("1.2.0");
        assert_eq!(
            DependencyBehavior::HighestMinor.choose(&c, Some(&installed)),
            Some(&v("1.9.0"))
        );
    }

    #[test]
    fn test_behavior_anchored_falls_back_to_highest() {
        let c = sorted(&["3.0.0", "4.0.0"]);
        let installed = v("1.2.0");
        assert_eq!(
            DependencyBehavior::HighestPatch.choose(&c, Some(&installed)),
            Some(&v("4.0.0"))
        );
    }
}
