use core::{cmp::Ordering, str::FromStr};
use serde::Deserialize;
use snafu::prelude::*;

use crate::ErrorKind;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("malformed version {text:?}: empty"))]
    VersionEmpty { text: String },
    #[snafu(display("malformed version {text:?}: component {component:?} is not numeric"))]
    VersionComponentNotNumeric { text: String, component: String },
    #[snafu(display("malformed version {text:?}: component {component:?} out of range"))]
    VersionComponentOverflow {
        text: String,
        component: String,
        source: core::num::ParseIntError,
    },
    #[snafu(display("malformed version {text:?}: unknown pre-release tag {tag:?}"))]
    VersionPreReleaseTag { text: String, tag: String },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedVersion
    }
}

/// Pre-release tag carried by the last component, as in `go1.22rc1` or `go1.5beta2`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PreRelease {
    Beta(u64),
    Rc(u64),
}

impl PreRelease {
    fn parse(tag: &str) -> Option<Self> {
        let (make, number): (fn(u64) -> Self, &str) = if let Some(number) = tag.strip_prefix("beta") {
            (Self::Beta, number)
        } else if let Some(number) = tag.strip_prefix("rc") {
            (Self::Rc, number)
        } else {
            return None;
        };
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        number.parse().ok().map(make)
    }
}

impl core::fmt::Display for PreRelease {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Beta(number) => write!(f, "beta{number}"),
            Self::Rc(number) => write!(f, "rc{number}"),
        }
    }
}

/// A dotted toolchain version such as `go1.21.0`.
///
/// Ordering is numeric per component. A shorter version is padded with zeros, so
/// `go1.21` and `go1.21.0` are equal. A pre-release sorts before the release it
/// precedes. The original spelling is kept for display only.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct Version {
    text: String,
    components: Vec<u64>,
    pre: Option<PreRelease>,
}

impl Version {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    #[must_use]
    pub fn pre_release(&self) -> Option<PreRelease> {
        self.pre
    }

    fn significant_components(&self) -> &[u64] {
        let end = self
            .components
            .iter()
            .rposition(|&component| component != 0)
            .map_or(0, |index| index + 1);
        &self.components[..end]
    }
}

impl FromStr for Version {
    type Err = self::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let body = trimmed.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        ensure!(!body.is_empty(), VersionEmptySnafu { text });

        let mut components = vec![];
        let mut pre = None;
        let mut parts = body.split('.').peekable();
        while let Some(part) = parts.next() {
            let mut number = part;
            if parts.peek().is_none() {
                if let Some(index) = part.find(|c: char| c.is_ascii_alphabetic()) {
                    let tag = &part[index..];
                    pre = Some(PreRelease::parse(tag).context(VersionPreReleaseTagSnafu { text, tag })?);
                    number = &part[..index];
                }
            }
            ensure!(
                !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()),
                VersionComponentNotNumericSnafu { text, component: part }
            );
            let component = number
                .parse()
                .context(VersionComponentOverflowSnafu { text, component: part })?;
            components.push(component);
        }

        Ok(Self {
            text: trimmed.to_owned(),
            components,
            pre,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = self::Error;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.text)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for index in 0..len {
            let lhs = self.components.get(index).copied().unwrap_or(0);
            let rhs = other.components.get(index).copied().unwrap_or(0);
            match lhs.cmp(&rhs) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(lhs), Some(rhs)) => lhs.cmp(rhs),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {
}

impl core::hash::Hash for Version {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        // NOTE: trailing zeros are dropped so hashing agrees with the padded equality
        self.significant_components().hash(state);
        self.pre.hash(state);
    }
}

#[must_use]
pub fn compare(lhs: &Version, rhs: &Version) -> Ordering {
    lhs.cmp(rhs)
}

pub fn compare_str(lhs: &str, rhs: &str) -> Result<Ordering, self::Error> {
    let lhs = lhs.parse::<Version>()?;
    let rhs = rhs.parse::<Version>()?;
    Ok(compare(&lhs, &rhs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(text: &str) -> Version {
        text.parse().unwrap()
    }

    #[test]
    fn components_compare_numerically() {
        assert_eq!(compare_str("go1.9.0", "go1.10.0").unwrap(), Ordering::Less);
        assert_eq!(compare_str("go1.10.0", "go1.9.0").unwrap(), Ordering::Greater);
        assert_eq!(compare_str("go1.21.3", "go1.21.10").unwrap(), Ordering::Less);
        assert_eq!(compare_str("go2.0.0", "go1.99.99").unwrap(), Ordering::Greater);
    }

    #[test]
    fn compare_is_reflexive() {
        for text in ["go1", "go1.21", "go1.21.0", "go1.22rc1", "v0.0.1", "1.4beta1"] {
            let v = version(text);
            assert_eq!(compare(&v, &v), Ordering::Equal, "{text}");
        }
    }

    #[test]
    fn missing_components_are_zero() {
        assert_eq!(version("go1.21"), version("go1.21.0"));
        assert_eq!(version("go1"), version("go1.0.0"));
        assert!(version("go1.21") < version("go1.21.1"));
    }

    #[test]
    fn prefix_is_stripped() {
        assert_eq!(version("go1.21.0"), version("1.21.0"));
        assert_eq!(version("v1.21.0"), version("go1.21.0"));
        assert_eq!(version("go1.21.0").components(), &[1, 21, 0]);
        assert_eq!(version("go1.21.0").to_string(), "go1.21.0");
    }

    #[test]
    fn pre_releases_sort_before_release() {
        assert!(version("go1.22rc1") < version("go1.22.0"));
        assert!(version("go1.22beta1") < version("go1.22rc1"));
        assert!(version("go1.22rc1") < version("go1.22rc2"));
        assert!(version("go1.21.5") < version("go1.22rc1"));
        assert_eq!(version("go1.9.2rc2").pre_release(), Some(PreRelease::Rc(2)));
    }

    #[test]
    fn non_numeric_components_are_rejected() {
        assert!(matches!(
            "go1.x.0".parse::<Version>(),
            Err(Error::VersionComponentNotNumeric { .. })
        ));
        assert!(matches!(
            "go1.21.0-dev".parse::<Version>(),
            Err(Error::VersionPreReleaseTag { .. })
        ));
        assert!(matches!("go".parse::<Version>(), Err(Error::VersionEmpty { .. })));
        assert!(matches!("go1..2".parse::<Version>(), Err(Error::VersionComponentNotNumeric { .. })));
        let error = compare_str("go1.21.0", "go1.a").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedVersion);
    }

    #[test]
    fn equal_versions_hash_equal() {
        use std::collections::HashSet;
        let set = [version("go1.21"), version("go1.21.0"), version("1.21.0.0")]
            .into_iter()
            .collect::<HashSet<_>>();
        assert_eq!(set.len(), 1);
    }
}
