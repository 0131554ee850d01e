//! Dotted numeric version ordering.
//!
//! Versions compare component-by-component as integers after padding the
//! shorter one with zeros, so `1.0.10 > 1.0.7` and `1.2 == 1.2.0`.
//!
//! Qualifiers follow a fixed policy: a leading `v` is ignored, anything
//! after `+` is build metadata and ignored, and anything after the first
//! `-` is a pre-release tag. When the numeric parts are equal, a version
//! with a pre-release tag orders before the same version without one, and
//! two tags compare by semver pre-release precedence.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use semver::Prerelease;

use crate::error::{CoreError, CoreResult};

/// A parsed version string.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
    pre: Option<Prerelease>,
    raw: String,
}

impl Version {
    pub fn parse(input: &str) -> CoreResult<Self> {
        let raw = input.trim();
        let body = raw
            .strip_prefix('v')
            .or_else(|| raw.strip_prefix('V'))
            .unwrap_or(raw);
        let body = body.split_once('+').map_or(body, |(core, _build)| core);

        let (core, pre) = match body.split_once('-') {
            Some((core, tag)) => {
                let pre = Prerelease::new(tag).map_err(|e| {
                    CoreError::Parse(format!("invalid pre-release tag in {raw:?}: {e}"))
                })?;
                (core, (!pre.is_empty()).then_some(pre))
            }
            None => (body, None),
        };

        if core.is_empty() {
            return Err(CoreError::Parse(format!("empty version string {raw:?}")));
        }

        let components = core
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| {
                    CoreError::Parse(format!("non-numeric component {part:?} in {raw:?}"))
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            components,
            pre,
            raw: raw.to_string(),
        })
    }

    /// Numeric components as parsed.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// The string this version was parsed from (trimmed).
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows ordering, so "1.2" == "1.2.0".
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Reads the version label embedded in artifact content, using the
/// first capture group of a configured pattern.
#[derive(Debug, Clone, Default)]
pub struct VersionPattern(Option<Regex>);

impl VersionPattern {
    pub fn new(pattern: Option<Regex>) -> Self {
        Self(pattern)
    }

    pub fn extract(&self, bytes: &[u8]) -> Option<String> {
        let re = self.0.as_ref()?;
        let text = String::from_utf8_lossy(bytes);
        let label = re.captures(&text)?.get(1)?.as_str().trim();
        (!label.is_empty()).then(|| label.to_string())
    }
}

/// Compare two version strings numerically.
pub fn compare(a: &str, b: &str) -> CoreResult<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_not_lexical() {
        assert_eq!(compare("1.0.7", "1.0.10").unwrap(), Ordering::Less);
        assert_eq!(compare("1.0.10", "1.0.7").unwrap(), Ordering::Greater);
        assert_eq!(compare("2.0", "10.0").unwrap(), Ordering::Less);
    }

    #[test]
    fn shorter_version_is_zero_padded() {
        assert_eq!(compare("1.2", "1.2.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.2", "1.2.0.1").unwrap(), Ordering::Less);
        assert_eq!(compare("3", "2.9.9").unwrap(), Ordering::Greater);
    }

    #[test]
    fn equal_to_itself() {
        for v in ["0", "1.0.0", "10.20.30", "v2.1", "1.0.0-rc.1"] {
            assert_eq!(compare(v, v).unwrap(), Ordering::Equal, "{v}");
        }
    }

    #[test]
    fn antisymmetric_over_sample() {
        let samples = [
            "0.1", "0.9.9", "1", "1.0.1", "1.0.7", "1.0.10", "1.1", "1.10", "2.0.0-beta",
            "2.0.0-rc.1", "2.0.0", "v2.0.1", "10.0",
        ];
        for a in samples {
            for b in samples {
                let ab = compare(a, b).unwrap();
                let ba = compare(b, a).unwrap();
                assert_eq!(ab, ba.reverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn leading_v_and_build_metadata_ignored() {
        assert_eq!(compare("v1.4.2", "1.4.2").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.4.2+build.7", "1.4.2").unwrap(), Ordering::Equal);
    }

    #[test]
    fn prerelease_orders_before_release() {
        assert_eq!(compare("1.2.0-rc.1", "1.2.0").unwrap(), Ordering::Less);
        assert_eq!(compare("1.2.0-alpha", "1.2.0-beta").unwrap(), Ordering::Less);
        assert_eq!(compare("1.2.1-rc.1", "1.2.0").unwrap(), Ordering::Greater);
        assert!(Version::parse("1.2.0-rc.1").unwrap().is_prerelease());
    }

    #[test]
    fn pattern_extracts_first_capture() {
        let pattern = VersionPattern::new(Some(Regex::new(r"VERSION = '([^']+)'").unwrap()));
        let source = b"package Plugin;\nour $VERSION = '1.4.2';\n1;\n";
        assert_eq!(pattern.extract(source).as_deref(), Some("1.4.2"));
        assert_eq!(pattern.extract(b"no marker here"), None);
        assert_eq!(VersionPattern::default().extract(source), None);
    }

    #[test]
    fn rejects_non_numeric_components() {
        assert!(matches!(Version::parse("1.x.3"), Err(CoreError::Parse(_))));
        assert!(matches!(Version::parse(""), Err(CoreError::Parse(_))));
        assert!(matches!(Version::parse("1..2"), Err(CoreError::Parse(_))));
        assert!(compare("1.0", "abc").is_err());
    }
}
