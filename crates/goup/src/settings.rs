use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use snafu::prelude::*;

use crate::ErrorKind;

pub const DEFAULT_INDEX_URL: &str = "https://go.dev/dl/";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://go.dev/dl/";
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/go";
pub const DEFAULT_BIN_DIR: &str = "/usr/bin";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read config file {path}"))]
    TokioFsReadToString { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("invalid config file {path}"))]
    TomlFromStr { path: Utf8PathBuf, source: toml::de::Error },
    #[snafu(display("config directory {} is not valid UTF-8", path.display()))]
    ConfigDirInvalidUtf8 {
        path: std::path::PathBuf,
        source: camino::FromPathError,
    },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// Everything a run needs to know about where things live.
///
/// Values come from the built-in defaults, then the config file, then whatever the
/// caller overrides on the struct.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Settings {
    pub index_url: String,
    pub download_url: String,
    pub install_dir: Utf8PathBuf,
    pub bin_dir: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,
    pub binaries: Vec<String>,
    /// Force (or forbid) running destructive steps through `sudo`.
    pub use_sudo: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.into(),
            download_url: DEFAULT_DOWNLOAD_URL.into(),
            install_dir: DEFAULT_INSTALL_DIR.into(),
            bin_dir: DEFAULT_BIN_DIR.into(),
            work_dir: ".".into(),
            binaries: vec!["go".into(), "gofmt".into()],
            use_sudo: None,
        }
    }
}

impl Settings {
    pub fn default_path() -> Result<Option<Utf8PathBuf>, self::Error> {
        let Some(dirs) = ::directories::ProjectDirs::from("", "", "goup") else {
            return Ok(None);
        };
        let config_dir = dirs.config_dir();
        let config_dir = <&Utf8Path>::try_from(config_dir).with_context(|_| ConfigDirInvalidUtf8Snafu {
            path: config_dir.to_path_buf(),
        })?;
        Ok(Some(config_dir.join("config.toml")))
    }

    /// Loads `path`, or the default config file when it exists, or the defaults.
    #[cfg_attr(feature = "tracing", tracing::instrument)]
    pub async fn load(path: Option<&Utf8Path>) -> Result<Self, self::Error> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path()? {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };
        let text = tokio::fs::read_to_string(&path)
            .await
            .context(TokioFsReadToStringSnafu { path: &path })?;
        Self::from_toml_str(&path, &text)
    }

    pub fn from_toml_str(path: &Utf8Path, text: &str) -> Result<Self, self::Error> {
        toml::from_str(text).context(TomlFromStrSnafu { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = Settings::from_toml_str(Utf8Path::new("config.toml"), "").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.binaries, ["go", "gofmt"]);
    }

    #[test]
    fn file_overrides_selected_keys() {
        let text = r#"
            install-dir = "/opt/go"
            binaries = ["go"]
            use-sudo = false
        "#;
        let settings = Settings::from_toml_str(Utf8Path::new("config.toml"), text).unwrap();
        assert_eq!(settings.install_dir, "/opt/go");
        assert_eq!(settings.binaries, ["go"]);
        assert_eq!(settings.use_sudo, Some(false));
        assert_eq!(settings.bin_dir, DEFAULT_BIN_DIR);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = Settings::from_toml_str(Utf8Path::new("config.toml"), "instal-dir = \"/opt/go\"").unwrap_err();
        assert!(matches!(error, Error::TomlFromStr { .. }));
    }

    #[tokio::test]
    async fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("nope.toml")).unwrap();
        let error = Settings::load(Some(&path)).await.unwrap_err();
        assert!(matches!(error, Error::TokioFsReadToString { .. }));
    }
}
