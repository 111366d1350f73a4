//! Semantic version bookkeeping for automatic releases.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::improvement::ImprovementType;

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `1.2.3` or `v1.2.3`. Anything else is `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    /// Next version for an improvement: features bump minor, everything
    /// else bumps patch.
    ///
    /// ```
    /// use autodev::github::{ImprovementType, SemVer};
    ///
    /// let v = SemVer::new(1, 0, 0).bump(ImprovementType::Feature);
    /// assert_eq!(v.to_string(), "1.1.0");
    /// assert_eq!(v.bump(ImprovementType::BugFix).to_string(), "1.1.1");
    /// ```
    #[must_use]
    pub fn bump(self, kind: ImprovementType) -> Self {
        match kind {
            ImprovementType::Feature => Self::new(self.major, self.minor + 1, 0),
            _ => Self::new(self.major, self.minor, self.patch + 1),
        }
    }

    /// Tag name, `v{version}`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("v{}", self)
    }
}

impl Default for SemVer {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
