use camino::{Utf8Path, Utf8PathBuf};
use futures::TryStreamExt;
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{logging::GoupLoggerFeedback, ErrorKind};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to request {url}"))]
    ReqwestGet { url: Url, source: reqwest::Error },
    #[snafu(display("download of {url} answered with an error status"))]
    ReqwestGetErrorForStatus { url: Url, source: reqwest::Error },
    #[snafu(display("download of {url} was interrupted"))]
    ReqwestBytesStreamNext { url: Url, source: reqwest::Error },
    #[snafu(display("failed to create {path}"))]
    TokioFsFileCreate { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to write {path}"))]
    TokioAsyncWriteExtWriteAll { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to flush {path}"))]
    TokioAsyncWriteExtFlush { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to move {from} to {path}"))]
    TokioFsRename {
        from: Utf8PathBuf,
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ReqwestGet { .. } | Error::ReqwestGetErrorForStatus { .. } | Error::ReqwestBytesStreamNext { .. } => {
                ErrorKind::Network
            },
            Error::TokioFsFileCreate { .. }
            | Error::TokioAsyncWriteExtWriteAll { .. }
            | Error::TokioAsyncWriteExtFlush { .. }
            | Error::TokioFsRename { .. } => ErrorKind::Io,
        }
    }
}

/// Streams `url` into `path`, returning the number of bytes written.
///
/// The body lands in a `.part` sibling first and is renamed into place once the
/// stream ends, so `path` never holds a truncated archive.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(feedback, client)))]
pub async fn download_url_to_path(
    mut feedback: GoupLoggerFeedback<'_>,
    client: &reqwest::Client,
    url: &Url,
    path: &Utf8Path,
) -> Result<u64, self::Error> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .context(ReqwestGetSnafu { url: url.clone() })?
        .error_for_status()
        .context(ReqwestGetErrorForStatusSnafu { url: url.clone() })?;

    if let Some(content_length) = response.content_length() {
        feedback.report_content_length(content_length);
    }

    let partial = Utf8PathBuf::from(format!("{path}.part"));
    let total_bytes = match stream_to_file(&mut feedback, response, url, &partial).await {
        Ok(total_bytes) => total_bytes,
        Err(error) => {
            if let Err(remove) = tokio::fs::remove_file(&partial).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(%partial, error = %remove, "failed to remove partial download");
                #[cfg(not(feature = "tracing"))]
                let _ = remove;
            }
            return Err(error);
        },
    };

    tokio::fs::rename(&partial, path)
        .await
        .context(TokioFsRenameSnafu { from: &partial, path })?;

    feedback.report_finished_downloading(total_bytes);

    Ok(total_bytes)
}

async fn stream_to_file(
    feedback: &mut GoupLoggerFeedback<'_>,
    response: reqwest::Response,
    url: &Url,
    partial: &Utf8Path,
) -> Result<u64, self::Error> {
    let mut reader = response.bytes_stream();
    let mut writer = tokio::fs::File::create(partial)
        .await
        .context(TokioFsFileCreateSnafu { path: partial })?;

    let mut total_bytes = 0u64;
    while let Some(bytes) = reader
        .try_next()
        .await
        .context(ReqwestBytesStreamNextSnafu { url: url.clone() })?
    {
        writer
            .write_all(&bytes)
            .await
            .context(TokioAsyncWriteExtWriteAllSnafu { path: partial })?;
        total_bytes += bytes.len() as u64;
        feedback.report_bytes_downloaded(bytes.len() as u64);
    }
    writer
        .flush()
        .await
        .context(TokioAsyncWriteExtFlushSnafu { path: partial })?;

    Ok(total_bytes)
}
