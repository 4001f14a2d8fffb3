use std::fmt;
use std::str::FromStr;

use semver::{Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::error::CumulusError;

/// A managed package version such as `1.10`, `1.10.2`, or `1.10 (Beta 3)`.
///
/// Ordering follows semantic versioning: betas of a version sort before the
/// version itself, and beta numbers compare numerically.
///
/// # Examples
///
/// ```
/// use cumulus_core::ReleaseVersion;
///
/// let beta: ReleaseVersion = "1.10 (Beta 3)".parse().unwrap();
/// let release: ReleaseVersion = "1.10".parse().unwrap();
/// assert!(beta.is_beta());
/// assert!(beta < release);
/// assert_eq!(release.to_string(), "1.10");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseVersion {
    inner: Version,
}

impl ReleaseVersion {
    /// Parse a version in any of the spellings used by releases and tags.
    ///
    /// Accepts `1.10`, `1.10.2`, `1.10 (Beta 3)`, `1.10-Beta_3` and
    /// `1.10 Beta 3`.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Parse`] when the number parts are missing or
    /// not numeric.
    pub fn parse(input: &str) -> Result<Self, CumulusError> {
        let text = input.trim();
        let (number, beta) = split_beta(text)?;

        let parts: Vec<&str> = number.split('.').collect();
        if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(CumulusError::Parse(format!("invalid version '{input}'")));
        }
        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| CumulusError::Parse(format!("invalid version '{input}'")))?;
        }

        let mut inner = Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(n) = beta {
            inner.pre = Prerelease::new(&format!("beta.{n}"))
                .map_err(|e| CumulusError::Parse(format!("invalid version '{input}': {e}")))?;
        }
        Ok(Self { inner })
    }

    /// Parse the version out of a release or beta tag name.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Parse`] if the tag carries neither prefix or the
    /// remainder is not a version.
    ///
    /// # Examples
    ///
    /// ```
    /// use cumulus_core::{ReleaseVersion, TagPrefixes};
    ///
    /// let prefixes = TagPrefixes::default();
    /// let v = ReleaseVersion::from_tag("beta/1.4-Beta_2", &prefixes).unwrap();
    /// assert_eq!(v.beta_number(), Some(2));
    /// ```
    pub fn from_tag(tag: &str, prefixes: &TagPrefixes) -> Result<Self, CumulusError> {
        let rest = tag
            .strip_prefix(prefixes.beta.as_str())
            .or_else(|| tag.strip_prefix(prefixes.release.as_str()))
            .ok_or_else(|| {
                CumulusError::Parse(format!(
                    "tag '{tag}' does not start with '{}' or '{}'",
                    prefixes.release, prefixes.beta
                ))
            })?;
        Self::parse(rest)
    }

    /// Whether this is a beta version.
    pub fn is_beta(&self) -> bool {
        !self.inner.pre.is_empty()
    }

    /// The beta number, for beta versions.
    pub fn beta_number(&self) -> Option<u64> {
        self.inner
            .pre
            .as_str()
            .strip_prefix("beta.")
            .and_then(|n| n.parse().ok())
    }

    /// Major version number.
    pub fn major(&self) -> u64 {
        self.inner.major
    }

    /// Minor version number.
    pub fn minor(&self) -> u64 {
        self.inner.minor
    }

    /// Patch version number (zero when absent).
    pub fn patch(&self) -> u64 {
        self.inner.patch
    }

    /// The version number without any beta suffix, e.g. `1.10` or `1.10.2`.
    pub fn number(&self) -> String {
        if self.inner.patch == 0 {
            format!("{}.{}", self.inner.major, self.inner.minor)
        } else {
            format!(
                "{}.{}.{}",
                self.inner.major, self.inner.minor, self.inner.patch
            )
        }
    }

    /// The git tag name for this version.
    ///
    /// # Examples
    ///
    /// ```
    /// use cumulus_core::{ReleaseVersion, TagPrefixes};
    ///
    /// let prefixes = TagPrefixes::default();
    /// let beta = ReleaseVersion::parse("1.10 (Beta 3)").unwrap();
    /// assert_eq!(beta.tag_name(&prefixes), "beta/1.10-Beta_3");
    /// let release = ReleaseVersion::parse("1.10").unwrap();
    /// assert_eq!(release.tag_name(&prefixes), "release/1.10");
    /// ```
    pub fn tag_name(&self, prefixes: &TagPrefixes) -> String {
        match self.beta_number() {
            Some(n) => format!("{}{}-Beta_{n}", prefixes.beta, self.number()),
            None => format!("{}{}", prefixes.release, self.number()),
        }
    }
}

fn split_beta(text: &str) -> Result<(&str, Option<u64>), CumulusError> {
    let lower = text.to_ascii_lowercase();
    let Some(idx) = lower.find("beta") else {
        return Ok((text, None));
    };

    let number = text[..idx].trim_end_matches([' ', '(', '-', '_']);
    let beta = text[idx + 4..].trim_matches([' ', '_', '(', ')']);
    let beta = beta
        .parse()
        .map_err(|_| CumulusError::Parse(format!("invalid beta number in '{text}'")))?;
    Ok((number, Some(beta)))
}

impl FromStr for ReleaseVersion {
    type Err = CumulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.beta_number() {
            Some(n) => write!(f, "{} (Beta {n})", self.number()),
            None => write!(f, "{}", self.number()),
        }
    }
}

/// Tag name prefixes distinguishing production releases from betas.
///
/// # Examples
///
/// ```
/// use cumulus_core::TagPrefixes;
///
/// let prefixes = TagPrefixes::default();
/// assert_eq!(prefixes.release, "release/");
/// assert_eq!(prefixes.beta, "beta/");
/// assert!(prefixes.version_of("release/2.0").is_some());
/// assert!(prefixes.version_of("v2.0").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPrefixes {
    /// Prefix of production release tags.
    #[serde(default = "default_release_prefix")]
    pub release: String,
    /// Prefix of beta tags.
    #[serde(default = "default_beta_prefix")]
    pub beta: String,
}

fn default_release_prefix() -> String {
    "release/".into()
}

fn default_beta_prefix() -> String {
    "beta/".into()
}

impl Default for TagPrefixes {
    fn default() -> Self {
        Self {
            release: default_release_prefix(),
            beta: default_beta_prefix(),
        }
    }
}

impl TagPrefixes {
    /// The version encoded in `tag`, or `None` for unrelated or malformed tags.
    pub fn version_of(&self, tag: &str) -> Option<ReleaseVersion> {
        ReleaseVersion::from_tag(tag, self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_part_version() {
        let v = ReleaseVersion::parse("1.10").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 10, 0));
        assert!(!v.is_beta());
    }

    #[test]
    fn parses_patch_version() {
        let v = ReleaseVersion::parse("2.3.4").unwrap();
        assert_eq!(v.number(), "2.3.4");
    }

    #[test]
    fn parses_beta_spellings() {
        for text in ["1.10 (Beta 3)", "1.10-Beta_3", "1.10 Beta 3", "1.10 (beta 3)"] {
            let v = ReleaseVersion::parse(text).unwrap();
            assert_eq!(v.beta_number(), Some(3), "{text}");
            assert_eq!(v.number(), "1.10", "{text}");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(ReleaseVersion::parse("abc").is_err());
        assert!(ReleaseVersion::parse("1..2").is_err());
        assert!(ReleaseVersion::parse("1.2.3.4").is_err());
        assert!(ReleaseVersion::parse("1.2 (Beta x)").is_err());
    }

    #[test]
    fn numeric_ordering_not_lexical() {
        let a = ReleaseVersion::parse("1.9").unwrap();
        let b = ReleaseVersion::parse("1.10").unwrap();
        assert!(a < b);

        let beta2 = ReleaseVersion::parse("1.10 (Beta 2)").unwrap();
        let beta10 = ReleaseVersion::parse("1.10 (Beta 10)").unwrap();
        assert!(beta2 < beta10);
        assert!(beta10 < b);
    }

    #[test]
    fn tag_round_trip_with_custom_prefixes() {
        let prefixes = TagPrefixes {
            release: "rel-".into(),
            beta: "uat-".into(),
        };
        let v = ReleaseVersion::from_tag("uat-3.1-Beta_7", &prefixes).unwrap();
        assert_eq!(v.to_string(), "3.1 (Beta 7)");
        assert_eq!(v.tag_name(&prefixes), "uat-3.1-Beta_7");
    }

    #[test]
    fn from_tag_requires_prefix() {
        let err = ReleaseVersion::from_tag("v1.0", &TagPrefixes::default()).unwrap_err();
        assert!(err.to_string().contains("does not start with"));
    }
}
