//! Small shared helpers: clocks and version handling.

use semver::Version;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Version of this build, used when matching killswitch ranges.
pub fn app_version() -> Version {
    // CARGO_PKG_VERSION is always valid semver.
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Parse a version leniently.
///
/// Strict semver is tried first. Failing that, up to three leading numeric
/// components are read and missing ones are zero-filled, so `"5.6"` becomes
/// `5.6.0` and `"5.6.1.2"` becomes `5.6.1`.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let core = raw.split(['-', '+']).next().unwrap_or_default();
    let mut parts = [0u64; 3];
    let mut seen = 0;
    for (slot, piece) in parts.iter_mut().zip(core.split('.')) {
        *slot = piece.parse().ok()?;
        seen += 1;
    }
    if seen == 0 {
        return None;
    }

    Some(Version::new(parts[0], parts[1], parts[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_strict_and_coerced() {
        assert_eq!(parse_version("5.6.1"), Some(Version::new(5, 6, 1)));
        assert_eq!(parse_version("5.6"), Some(Version::new(5, 6, 0)));
        assert_eq!(parse_version("v5"), Some(Version::new(5, 0, 0)));
        assert_eq!(parse_version("5.6.1.2"), Some(Version::new(5, 6, 1)));
        assert_eq!(
            parse_version("5.7.0-beta1"),
            Some(Version::parse("5.7.0-beta1").unwrap())
        );
        assert_eq!(parse_version("banana"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_app_version_matches_package() {
        assert_eq!(app_version().to_string(), env!("CARGO_PKG_VERSION"));
    }
}
