//! Parse and compare dot-separated firmware version strings
//!
//! Devices report the running firmware version and the minimum version the
//! SDK recommends for them. The gate compares component by component over
//! the length of the recommended version; the first differing component
//! decides and everything after it is ignored.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Empty string or a component that is not a plain decimal integer
    Malformed(String),
    /// The device-reported version is shorter than the version it is
    /// compared against
    MissingComponent { version: String, index: usize },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Malformed(s) => write!(f, "Malformed version string: '{}'", s),
            VersionError::MissingComponent { version, index } => write!(
                f,
                "Version '{}' has no component at position {}",
                version, index
            ),
        }
    }
}

/// Firmware version as reported by the device, e.g. "5.12.7.100".
/// Component count is arbitrary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    components: Vec<u32>,
}

impl FirmwareVersion {
    pub fn components(&self) -> &[u32] {
        &self.components
    }
}

impl FromStr for FirmwareVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionError::Malformed(s.to_string()));
        }
        let components = s
            .split('.')
            .map(|c| {
                c.parse::<u32>()
                    .map_err(|_| VersionError::Malformed(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FirmwareVersion { components })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components: Vec<String> = self.components.iter().map(u32::to_string).collect();
        write!(f, "{}", components.join("."))
    }
}

/// Whether `current` has to be updated to meet `recommended`.
///
/// A version that is newer at some position wins regardless of later
/// positions. A current version with fewer components than compared is an
/// error (malformed device-reported version), never treated as zero.
pub fn is_update_required(
    current: &FirmwareVersion,
    recommended: &FirmwareVersion,
) -> Result<bool, VersionError> {
    for (index, rec) in recommended.components.iter().enumerate() {
        let cur = current
            .components
            .get(index)
            .ok_or(VersionError::MissingComponent {
                version: current.to_string(),
                index,
            })?;
        if cur > rec {
            return Ok(false);
        }
        if cur < rec {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ver(s: &str) -> FirmwareVersion {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_displays() {
        let v = ver("5.12.7.100");
        assert_eq!(v.components(), &[5, 12, 7, 100]);
        assert_eq!(v.to_string(), "5.12.7.100");
    }

    #[test]
    fn rejects_non_numeric_components() {
        assert_eq!(
            "1.a.3".parse::<FirmwareVersion>(),
            Err(VersionError::Malformed("1.a.3".to_string()))
        );
        assert_eq!(
            "".parse::<FirmwareVersion>(),
            Err(VersionError::Malformed(String::new()))
        );
        assert_eq!(
            "1..2".parse::<FirmwareVersion>(),
            Err(VersionError::Malformed("1..2".to_string()))
        );
        assert_eq!(
            "1.-2".parse::<FirmwareVersion>(),
            Err(VersionError::Malformed("1.-2".to_string()))
        );
    }

    #[test]
    fn newer_component_wins_regardless_of_later_digits() {
        // 10 > 9 at position 1, the trailing 0 < 5 must not matter
        assert_eq!(is_update_required(&ver("2.10.0"), &ver("2.9.5")), Ok(false));
        // Mirror case
        assert_eq!(is_update_required(&ver("2.9.5"), &ver("2.10.0")), Ok(true));
    }

    #[test]
    fn exact_match_never_requires_update() {
        assert_eq!(is_update_required(&ver("1.2.3"), &ver("1.2.3")), Ok(false));
    }

    #[test]
    fn older_version_requires_update() {
        assert_eq!(
            is_update_required(&ver("5.11.1.0"), &ver("5.12.7.100")),
            Ok(true)
        );
    }

    #[test]
    fn longer_current_version_is_compared_by_prefix() {
        assert_eq!(
            is_update_required(&ver("1.2.3.4"), &ver("1.2.3")),
            Ok(false)
        );
    }

    #[test]
    fn short_current_version_is_an_error_not_a_pass() {
        assert_eq!(
            is_update_required(&ver("1.2"), &ver("1.2.5")),
            Err(VersionError::MissingComponent {
                version: "1.2".to_string(),
                index: 2,
            })
        );
    }
}
