use camino::{Utf8Path, Utf8PathBuf};
use snafu::prelude::*;
use url::Url;

use crate::{Directories, ErrorKind, GoupLogger, Platform, Release, ReleaseFile, Version};

pub mod checksum;
pub mod download;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("no release {version} in the index"))]
    ReleaseNotFound { version: Version },
    #[snafu(display("release {version} has no archive for {platform}"))]
    ReleaseFileNotFound { version: Version, platform: Platform },
    #[snafu(display("cannot build a download url for {filename}"))]
    UrlJoin {
        filename: String,
        source: url::ParseError,
    },
    #[snafu(display("failed to download archive"))]
    ArchiveDownload {
        source: crate::archive::download::Error,
    },
    #[snafu(display("failed to verify archive"))]
    ArchiveChecksum {
        source: crate::archive::checksum::Error,
    },
    #[snafu(display("failed to inspect {path}"))]
    StdIoTryExists { path: Utf8PathBuf, source: std::io::Error },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ReleaseNotFound { .. } | Error::ReleaseFileNotFound { .. } => ErrorKind::NotFound,
            Error::UrlJoin { .. } => ErrorKind::Config,
            Error::ArchiveDownload { source } => source.kind(),
            Error::ArchiveChecksum { source } => source.kind(),
            Error::StdIoTryExists { .. } => ErrorKind::Io,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    base: Url,
}

impl ArchiveFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client, mut base: Url) -> Self {
        // NOTE: `Url::join` drops the last segment unless the base ends with a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { client, base }
    }

    /// Looks up the archive published for exactly `version` on `platform`.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(releases)))]
    pub fn resolve<'r>(
        releases: &'r [Release],
        version: &Version,
        platform: &Platform,
    ) -> Result<&'r ReleaseFile, self::Error> {
        let release = releases
            .iter()
            .find(|release| release.version == *version)
            .with_context(|| ReleaseNotFoundSnafu {
                version: version.clone(),
            })?;
        release.archive_for(platform).with_context(|| ReleaseFileNotFoundSnafu {
            version: release.version.clone(),
            platform: *platform,
        })
    }

    pub fn file_url(&self, file: &ReleaseFile) -> Result<Url, self::Error> {
        self.base.join(&file.filename).with_context(|_| UrlJoinSnafu {
            filename: file.filename.clone(),
        })
    }

    /// Downloads `file` into the work directory and returns where it landed.
    ///
    /// An archive already present with the advertised size is reused; callers still
    /// have to [`verify`](Self::verify) it.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, dirs, logger)))]
    pub async fn download(
        &self,
        dirs: &Directories,
        logger: &GoupLogger,
        file: &ReleaseFile,
    ) -> Result<Utf8PathBuf, self::Error> {
        let url = self.file_url(file)?;
        let path = dirs.archive_path(&file.filename);
        let mut feedback = logger.report_archive_download(file);

        if path.try_exists().context(StdIoTryExistsSnafu { path: &path })? {
            if let Ok(metadata) = tokio::fs::metadata(&path).await {
                if file.size > 0 && metadata.len() == file.size {
                    feedback.report_already_downloaded(metadata.len());
                    return Ok(path);
                }
            }
        }

        crate::archive::download::download_url_to_path(feedback, &self.client, &url, &path)
            .await
            .context(ArchiveDownloadSnafu)?;

        Ok(path)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, logger)))]
    pub async fn verify(&self, logger: &GoupLogger, path: &Utf8Path, expected: &str) -> Result<(), self::Error> {
        let feedback = logger.report_archive_verify(path);
        crate::archive::checksum::verify_checksum_of_path(feedback, path, expected)
            .await
            .context(ArchiveChecksumSnafu)
    }
}
