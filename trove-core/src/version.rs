//! Version comparison and install-action resolution
//!
//! Versions are compared segment by segment: numeric dot-segments compare
//! numerically and missing trailing segments count as zero, so `2.0` equals
//! `2.0.0` and `1.2.0` sorts before `1.10.0`. Anything after the numeric
//! prefix is a suffix; a suffixed version sorts after the numeric-only
//! version with the same prefix, and two suffixes compare lexically.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A version string ordered by [`compare`]
#[derive(Debug, Clone)]
pub struct Version(String);

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric segments and suffix
    fn parts(&self) -> (Vec<u64>, &str) {
        split_version(&self.0)
    }

    /// Lossy conversion used for range matching: first three numeric
    /// segments, suffix dropped
    pub fn to_semver(&self) -> semver::Version {
        let (numbers, _) = self.parts();
        let segment = |i: usize| numbers.get(i).copied().unwrap_or(0);
        semver::Version::new(segment(0), segment(1), segment(2))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Version::new(value)
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Version::new(value)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        compare(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(VersionVisitor)
    }
}

/// Accepts strings and integers; floats are rejected because `1.10` has
/// already become `1.1` by the time it gets here
struct VersionVisitor;

impl<'de> Visitor<'de> for VersionVisitor {
    type Value = Version;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a quoted version string such as \"1.10.0\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Version, E> {
        Ok(Version::new(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Version, E> {
        Ok(Version::new(value.to_string()))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Version, E> {
        Ok(Version::new(value.to_string()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Version, E> {
        Err(E::custom(format!(
            "version {value} is a number; quote it (e.g. version: \"{value}\") so segments like 1.10 are kept"
        )))
    }
}

fn split_version(version: &str) -> (Vec<u64>, &str) {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let prefix_len = version
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(version.len());
    let (numeric, suffix) = version.split_at(prefix_len);

    let numbers = numeric
        .trim_end_matches('.')
        .split('.')
        .filter(|segment| !numeric.is_empty() || !segment.is_empty())
        .map(|segment| segment.parse::<u64>().unwrap_or(0))
        .collect();

    (numbers, suffix.trim_start_matches(['-', '+', '.', '_']))
}

/// Compare two version strings
pub fn compare(a: &str, b: &str) -> Ordering {
    let (a_numbers, a_suffix) = split_version(a);
    let (b_numbers, b_suffix) = split_version(b);

    let len = a_numbers.len().max(b_numbers.len());
    for i in 0..len {
        let left = a_numbers.get(i).copied().unwrap_or(0);
        let right = b_numbers.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            unequal => return unequal,
        }
    }

    match (a_suffix.is_empty(), b_suffix.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a_suffix.cmp(b_suffix),
    }
}

/// What an install request has to do given the installed, requested and
/// repository versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Not installed yet
    Install,
    /// A different version was explicitly requested; overwriting needs confirmation
    Reinstall,
    /// The repository has something newer
    UpdateTo(Version),
    /// Already at the requested or latest version
    NoOp,
}

/// Decide the install action
pub fn needs_action(
    installed: Option<&Version>,
    requested: Option<&Version>,
    remote: &Version,
) -> Action {
    let Some(installed) = installed else {
        return Action::Install;
    };

    match requested {
        Some(requested) if requested != installed => Action::Reinstall,
        Some(_) => Action::NoOp,
        None if remote > installed => Action::UpdateTo(remote.clone()),
        None => Action::NoOp,
    }
}

/// A parsed version specifier (`latest`, `1.2.0`, `^1.2`, `~1.2`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Latest,
    Exact(Version),
    Caret(semver::Version),
    Tilde(semver::Version),
}

impl VersionSpec {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() || spec.eq_ignore_ascii_case("latest") {
            return VersionSpec::Latest;
        }

        if let Some(range) = spec.strip_prefix('^') {
            return VersionSpec::Caret(Version::new(range).to_semver());
        }

        if let Some(range) = spec.strip_prefix('~') {
            return VersionSpec::Tilde(Version::new(range).to_semver());
        }

        VersionSpec::Exact(Version::new(spec))
    }

    /// Whether `version` satisfies this specifier
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionSpec::Latest => true,
            VersionSpec::Exact(exact) => exact == version,
            VersionSpec::Caret(min) => {
                // ^1.2 means >=1.2.0 <2.0.0, ^0.2 means >=0.2.0 <0.3.0
                let max = if min.major == 0 {
                    semver::Version::new(0, min.minor + 1, 0)
                } else {
                    semver::Version::new(min.major + 1, 0, 0)
                };
                let v = version.to_semver();
                v >= *min && v < max
            }
            VersionSpec::Tilde(min) => {
                // ~1.2 means >=1.2.0 <1.3.0
                let max = semver::Version::new(min.major, min.minor + 1, 0);
                let v = version.to_semver();
                v >= *min && v < max
            }
        }
    }

    /// Pick the newest version satisfying this specifier
    pub fn select<'a, T>(&self, candidates: &'a [T], version_of: impl Fn(&T) -> &Version) -> Option<&'a T> {
        candidates
            .iter()
            .filter(|candidate| self.matches(version_of(candidate)))
            .max_by(|a, b| version_of(a).cmp(version_of(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::new(s)
    }

    #[test]
    fn test_numeric_segments_compare_numerically() {
        assert_eq!(compare("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare("1.10.0", "1.2.0"), Ordering::Greater);
        assert_eq!(compare("10", "9.9.9"), Ordering::Greater);
    }

    #[test]
    fn test_missing_segments_are_zero() {
        assert_eq!(compare("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare("2", "2.0.0.0"), Ordering::Equal);
        assert_eq!(v("2.0"), v("2.0.0"));
    }

    #[test]
    fn test_suffix_sorts_after_numeric_only() {
        assert_eq!(compare("1.0", "1.0-beta"), Ordering::Less);
        assert_eq!(compare("1.0-beta", "1.0-rc1"), Ordering::Less);
        assert_eq!(compare("1.0-beta", "1.0.0-beta"), Ordering::Equal);
        assert_eq!(compare("1.0-beta", "1.1"), Ordering::Less);
    }

    #[test]
    fn test_order_is_total_over_a_sample() {
        let mut versions: Vec<Version> = ["1.10.0", "1.2", "1.2.0-beta", "0.9", "v1.3", "1.2.1"]
            .iter()
            .map(|s| v(s))
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(Version::as_str).collect();
        assert_eq!(sorted, vec!["0.9", "1.2", "1.2.0-beta", "1.2.1", "v1.3", "1.10.0"]);
    }

    #[test]
    fn test_needs_action() {
        assert_eq!(needs_action(None, None, &v("1.0")), Action::Install);
        assert_eq!(
            needs_action(None, Some(&v("0.9")), &v("1.0")),
            Action::Install
        );
        assert_eq!(
            needs_action(Some(&v("1.0")), Some(&v("0.9")), &v("1.0")),
            Action::Reinstall
        );
        assert_eq!(
            needs_action(Some(&v("1.0")), Some(&v("1.0.0")), &v("1.1")),
            Action::NoOp
        );
        assert_eq!(
            needs_action(Some(&v("1.0")), None, &v("1.1")),
            Action::UpdateTo(v("1.1"))
        );
        assert_eq!(needs_action(Some(&v("1.1")), None, &v("1.1")), Action::NoOp);
        assert_eq!(needs_action(Some(&v("1.2")), None, &v("1.1")), Action::NoOp);
    }

    #[test]
    fn test_version_spec_ranges() {
        let versions: Vec<Version> = ["2.0.0", "1.5.0", "1.4.2", "1.4.0", "0.9.0"]
            .iter()
            .map(|s| v(s))
            .collect();
        let pick = |spec: &str| {
            VersionSpec::parse(spec)
                .select(&versions, |version| version)
                .map(|version| version.to_string())
        };

        assert_eq!(pick(""), Some("2.0.0".to_string()));
        assert_eq!(pick("latest"), Some("2.0.0".to_string()));
        assert_eq!(pick("1.4.2"), Some("1.4.2".to_string()));
        assert_eq!(pick("^1.4"), Some("1.5.0".to_string()));
        assert_eq!(pick("^0.9"), Some("0.9.0".to_string()));
        assert_eq!(pick("~1.4"), Some("1.4.2".to_string()));
        assert_eq!(pick("~2.0"), Some("2.0.0".to_string()));
        assert_eq!(pick("3.0.0"), None);
    }

    #[test]
    fn test_deserialize_yaml_versions() {
        let version: Version = serde_yaml_ng::from_str("\"1.10\"").unwrap();
        assert_eq!(version.as_str(), "1.10");
        let version: Version = serde_yaml_ng::from_str("3").unwrap();
        assert_eq!(version.as_str(), "3");
    }

    #[test]
    fn test_unquoted_decimal_versions_are_rejected() {
        // Read as floats these would collapse to 1.1 and 2.1
        for yaml in ["1.10", "2.10", "1.0"] {
            let err = serde_yaml_ng::from_str::<Version>(yaml).unwrap_err();
            assert!(err.to_string().contains("quote it"), "{yaml}: {err}");
        }
    }
}
