//! Agent versioning: `major.minor.patch` with patch bumps on strong cycles.

use std::fmt;
use std::str::FromStr;

use crate::error::RuntimeError;

pub const DEFAULT_EVOLVE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AgentVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl AgentVersion {
    pub fn bump_patch(self) -> Self {
        Self {
            patch: self.patch + 1,
            ..self
        }
    }
}

impl FromStr for AgentVersion {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(RuntimeError::InvalidVersion(s.to_string()));
        };
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| RuntimeError::InvalidVersion(s.to_string()))
        };
        Ok(Self {
            major: parse(*major)?,
            minor: parse(*minor)?,
            patch: parse(*patch)?,
        })
    }
}

impl fmt::Display for AgentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Next version after a cycle scoring `overall_score`.
///
/// Bumps the patch only when the score strictly exceeds `threshold`.
pub fn evolve(current: &str, overall_score: f64, threshold: f64) -> Result<String, RuntimeError> {
    let version: AgentVersion = current.parse()?;
    if overall_score > threshold {
        Ok(version.bump_patch().to_string())
    } else {
        Ok(version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_versions() {
        let version: AgentVersion = "1.2.3".parse().expect("version");
        assert_eq!(
            version,
            AgentVersion {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
        assert_eq!(version.to_string(), "1.2.3");
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["1.2", "1.2.3.4", "1.x.3", "", "v1.0.0"] {
            let err = bad.parse::<AgentVersion>().expect_err("malformed");
            assert!(matches!(err, RuntimeError::InvalidVersion(_)), "{bad}");
        }
    }

    /// Only scores strictly above the threshold bump the patch.
    #[test]
    fn evolve_bumps_patch_above_threshold() {
        assert_eq!(evolve("1.0.0", 0.85, 0.8).expect("evolve"), "1.0.1");
        assert_eq!(evolve("1.0.9", 0.81, 0.8).expect("evolve"), "1.0.10");
        assert_eq!(evolve("1.0.0", 0.8, 0.8).expect("evolve"), "1.0.0");
        assert_eq!(evolve("2.3.4", 0.1, 0.8).expect("evolve"), "2.3.4");
    }
}
