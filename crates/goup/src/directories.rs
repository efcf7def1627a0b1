use camino::{Utf8Path, Utf8PathBuf};
use snafu::prelude::*;

use crate::{ErrorKind, Settings};

/// Top-level directory every Go release archive unpacks into.
pub const ARCHIVE_ROOT: &str = "go";

const STAGING_DIR: &str = "goup-staging";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read the current directory"))]
    StdEnvCurrentDir { source: std::io::Error },
    #[snafu(display("work directory is not valid UTF-8"))]
    CaminoUtf8PathBufTryFrom { source: camino::FromPathBufError },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StdEnvCurrentDir { .. } => ErrorKind::Io,
            Error::CaminoUtf8PathBufTryFrom { .. } => ErrorKind::Config,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Directories {
    install: Utf8PathBuf,
    bin: Utf8PathBuf,
    work: Utf8PathBuf,
    staging: Utf8PathBuf,
}

impl Directories {
    #[cfg_attr(feature = "tracing", tracing::instrument)]
    pub fn new(settings: &Settings) -> Result<Self, self::Error> {
        let work = if settings.work_dir.is_absolute() {
            settings.work_dir.clone()
        } else {
            let current = std::env::current_dir().context(StdEnvCurrentDirSnafu)?;
            let current = Utf8PathBuf::try_from(current).context(CaminoUtf8PathBufTryFromSnafu)?;
            current.join(&settings.work_dir)
        };
        let work = match dunce::canonicalize(&work) {
            Ok(canonical) => Utf8PathBuf::try_from(canonical).context(CaminoUtf8PathBufTryFromSnafu)?,
            Err(_) => work,
        };
        let staging = work.join(STAGING_DIR);
        Ok(Self {
            install: settings.install_dir.clone(),
            bin: settings.bin_dir.clone(),
            work,
            staging,
        })
    }

    #[must_use]
    pub fn install_dir(&self) -> &Utf8Path {
        &self.install
    }

    #[must_use]
    pub fn bin_dir(&self) -> &Utf8Path {
        &self.bin
    }

    #[must_use]
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work
    }

    #[must_use]
    pub fn staging(&self) -> &Utf8Path {
        &self.staging
    }

    #[must_use]
    pub fn staged_root(&self) -> Utf8PathBuf {
        self.staging.join(ARCHIVE_ROOT)
    }

    #[must_use]
    pub fn archive_path(&self, filename: &str) -> Utf8PathBuf {
        self.work.join(filename)
    }

    #[must_use]
    pub fn version_file(&self) -> Utf8PathBuf {
        self.install.join("VERSION")
    }

    #[must_use]
    pub fn link_path(&self, binary: &str) -> Utf8PathBuf {
        self.bin.join(binary)
    }
}

#[must_use]
pub fn binary_path(install_dir: &Utf8Path, binary: &str) -> Utf8PathBuf {
    install_dir.join("bin").join(binary)
}
