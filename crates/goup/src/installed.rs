use camino::{Utf8Path, Utf8PathBuf};
use snafu::prelude::*;

use crate::{directories::binary_path, Directories, ErrorKind, Version};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read {path}"))]
    TokioFsReadToString { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to run {path}"))]
    TokioProcessCommandOutput { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("cannot make sense of installed version {text:?}"))]
    InstalledVersionParse {
        text: String,
        source: crate::version::Error,
    },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TokioFsReadToString { .. } | Error::TokioProcessCommandOutput { .. } => ErrorKind::Io,
            Error::InstalledVersionParse { source, .. } => source.kind(),
        }
    }
}

/// The toolchain currently living in the install directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstalledToolchain {
    pub version: Version,
    pub install_dir: Utf8PathBuf,
}

impl InstalledToolchain {
    /// Reads the `VERSION` file of the install directory, falling back to asking
    /// `bin/go version`. Returns `None` when the directory holds no toolchain.
    #[cfg_attr(feature = "tracing", tracing::instrument)]
    pub async fn detect(dirs: &Directories) -> Result<Option<Self>, self::Error> {
        let install_dir = dirs.install_dir();
        let text = match version_from_file(&dirs.version_file()).await? {
            Some(text) => text,
            None => match version_from_binary(install_dir).await? {
                Some(text) => text,
                None => return Ok(None),
            },
        };
        let version = text.parse().context(InstalledVersionParseSnafu { text })?;
        Ok(Some(Self {
            version,
            install_dir: install_dir.to_path_buf(),
        }))
    }
}

async fn version_from_file(path: &Utf8Path) -> Result<Option<String>, self::Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(source).context(TokioFsReadToStringSnafu { path }),
    }
}

async fn version_from_binary(install_dir: &Utf8Path) -> Result<Option<String>, self::Error> {
    let path = binary_path(install_dir, "go");
    if !path.is_file() {
        return Ok(None);
    }
    let output = tokio::process::Command::new(&path)
        .arg("version")
        .output()
        .await
        .context(TokioProcessCommandOutputSnafu { path: &path })?;
    if !output.status.success() {
        return Ok(None);
    }
    // `go version go1.21.0 linux/amd64`
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.split_whitespace().nth(2).map(ToOwned::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;

    fn dirs(root: &std::path::Path) -> Directories {
        let root = Utf8PathBuf::try_from(root.to_path_buf()).unwrap();
        let settings = Settings {
            install_dir: root.join("go"),
            bin_dir: root.join("bin"),
            work_dir: root.clone(),
            ..Settings::default()
        };
        Directories::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn version_file_first_line_wins() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        tokio::fs::create_dir_all(dirs.install_dir()).await.unwrap();
        tokio::fs::write(dirs.version_file(), "go1.21.0\ntime 2023-08-08T19:22:36Z\n")
            .await
            .unwrap();
        let installed = InstalledToolchain::detect(&dirs).await.unwrap().unwrap();
        assert_eq!(installed.version.as_str(), "go1.21.0");
        assert_eq!(installed.install_dir, dirs.install_dir());
    }

    #[tokio::test]
    async fn empty_install_dir_is_none() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        assert!(InstalledToolchain::detect(&dirs).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_version_file_is_malformed() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        tokio::fs::create_dir_all(dirs.install_dir()).await.unwrap();
        tokio::fs::write(dirs.version_file(), "devel +abcdef\n").await.unwrap();
        let error = InstalledToolchain::detect(&dirs).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedVersion);
    }
}
