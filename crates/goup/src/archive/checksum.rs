use camino::{Utf8Path, Utf8PathBuf};
use sha2::Digest;
use snafu::prelude::*;
use tokio::io::AsyncReadExt;

use crate::{logging::GoupLoggerFeedback, verification::parse_sha256_digest, ErrorKind};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("checksum mismatch for {path}: expected {expected}, got {actual}"))]
    ChecksumMismatch {
        path: Utf8PathBuf,
        expected: String,
        actual: String,
    },
    #[snafu(display("unusable expected checksum for {path}"))]
    ChecksumParse {
        path: Utf8PathBuf,
        source: crate::verification::Error,
    },
    #[snafu(display("failed to open {path}"))]
    TokioFsFileOpen { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to read {path}"))]
    TokioAsyncReadExtRead { path: Utf8PathBuf, source: std::io::Error },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ChecksumMismatch { .. } => ErrorKind::Integrity,
            Error::ChecksumParse { source, .. } => source.kind(),
            Error::TokioFsFileOpen { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            },
            Error::TokioFsFileOpen { .. } | Error::TokioAsyncReadExtRead { .. } => ErrorKind::Io,
        }
    }
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip(feedback)))]
pub async fn verify_checksum_of_path(
    mut feedback: GoupLoggerFeedback<'_>,
    path: &Utf8Path,
    expected: &str,
) -> Result<(), self::Error> {
    let expected = parse_sha256_digest(expected).context(ChecksumParseSnafu { path })?;

    let mut file = tokio::fs::File::open(path)
        .await
        .context(TokioFsFileOpenSnafu { path })?;
    let mut hasher = sha2::Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .context(TokioAsyncReadExtReadSnafu { path })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let actual = hasher.finalize();
    if actual != expected {
        return Err(self::Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }

    feedback.report_checksum_verified();

    Ok(())
}
