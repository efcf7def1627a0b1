use serde::Deserialize;

use crate::{Platform, Version};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    #[default]
    Archive,
    Installer,
    Source,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ReleaseFile {
    pub filename: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    pub version: Version,
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub kind: ReleaseKind,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Release {
    pub version: Version,
    pub stable: bool,
    #[serde(default)]
    pub files: Vec<ReleaseFile>,
}

impl Release {
    /// The downloadable archive for `platform`, if this release publishes one.
    #[must_use]
    pub fn archive_for(&self, platform: &Platform) -> Option<&ReleaseFile> {
        self.files
            .iter()
            .find(|file| file.kind == ReleaseKind::Archive && platform.matches(file))
    }
}

/// Picks the greatest stable release strictly newer than `current`.
///
/// Every stable entry is considered, so the result does not depend on the order
/// the index lists releases in. With no `current` the greatest stable release wins.
#[must_use]
pub fn newest_stable_after<'a>(releases: &'a [Release], current: Option<&Version>) -> Option<&'a Release> {
    releases
        .iter()
        .filter(|release| release.stable)
        .filter(|release| current.map_or(true, |current| release.version > *current))
        .max_by(|lhs, rhs| lhs.version.cmp(&rhs.version))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{GoArch, GoOs};

    pub(crate) fn release(version: &str, stable: bool) -> Release {
        let version = version.parse::<Version>().unwrap();
        let files = [("linux", "amd64"), ("darwin", "arm64")]
            .into_iter()
            .map(|(os, arch)| ReleaseFile {
                filename: format!("{version}.{os}-{arch}.tar.gz"),
                os: os.into(),
                arch: arch.into(),
                version: version.clone(),
                sha256: "0".repeat(64),
                size: 1024,
                kind: ReleaseKind::Archive,
            })
            .collect();
        Release { version, stable, files }
    }

    fn version(text: &str) -> Version {
        text.parse().unwrap()
    }

    #[test]
    fn newer_stable_skips_unstable_entries() {
        let releases = [
            release("go1.21.0", true),
            release("go1.20.5", true),
            release("go1.22.1", false),
        ];
        let newer = newest_stable_after(&releases, Some(&version("go1.20.5"))).unwrap();
        assert_eq!(newer.version, version("go1.21.0"));
    }

    #[test]
    fn newer_stable_ignores_index_order() {
        let releases = [
            release("go1.20.6", true),
            release("go1.22.0", true),
            release("go1.21.4", true),
        ];
        let newer = newest_stable_after(&releases, Some(&version("go1.20.5"))).unwrap();
        assert_eq!(newer.version, version("go1.22.0"));
    }

    #[test]
    fn newer_stable_is_none_when_current() {
        let releases = [release("go1.21.0", true), release("go1.22rc1", false)];
        assert!(newest_stable_after(&releases, Some(&version("go1.21.0"))).is_none());
        assert!(newest_stable_after(&releases, Some(&version("go1.21"))).is_none());
    }

    #[test]
    fn newest_stable_without_current() {
        let releases = [release("go1.21.0", true), release("go1.20.5", true)];
        let newest = newest_stable_after(&releases, None).unwrap();
        assert_eq!(newest.version, version("go1.21.0"));
    }

    #[test]
    fn archive_for_requires_matching_platform_and_kind() {
        let mut release = release("go1.21.0", true);
        let linux = Platform::new(GoOs::Linux, GoArch::Amd64);
        assert!(release.archive_for(&linux).is_some());
        assert!(release.archive_for(&Platform::new(GoOs::Windows, GoArch::Amd64)).is_none());
        for file in &mut release.files {
            file.kind = ReleaseKind::Installer;
        }
        assert!(release.archive_for(&linux).is_none());
    }

    #[test]
    fn index_json_deserializes() {
        let text = r#"[{
            "version": "go1.21.0",
            "stable": true,
            "files": [
                {"filename": "go1.21.0.src.tar.gz", "os": "", "arch": "", "version": "go1.21.0",
                 "sha256": "aa", "size": 10, "kind": "source"},
                {"filename": "go1.21.0.linux-amd64.tar.gz", "os": "linux", "arch": "amd64",
                 "version": "go1.21.0", "sha256": "bb", "size": 20, "kind": "archive"},
                {"filename": "go1.21.0.linux-amd64.msi", "os": "linux", "arch": "amd64",
                 "version": "go1.21.0", "sha256": "cc", "size": 30, "kind": "weird"}
            ]
        }]"#;
        let releases = serde_json::from_str::<Vec<Release>>(text).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].files[0].kind, ReleaseKind::Source);
        assert_eq!(releases[0].files[2].kind, ReleaseKind::Other);
        let file = releases[0]
            .archive_for(&Platform::new(GoOs::Linux, GoArch::Amd64))
            .unwrap();
        assert_eq!(file.sha256, "bb");
    }
}
