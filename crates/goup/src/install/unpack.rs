use camino::{Utf8Path, Utf8PathBuf};
use futures::TryStreamExt;
use snafu::prelude::*;
use std::ffi::OsStr;

use crate::{directories::ARCHIVE_ROOT, logging::GoupLoggerFeedback, ErrorKind};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to open {path}"))]
    TokioFsFileOpen { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to clear {path}"))]
    TokioFsRemoveDirAll { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to create {path}"))]
    TokioFsCreateDirAll { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("{path} is not a readable gzip tar archive"))]
    TokioTarArchiveEntries { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("{path} is truncated or corrupt"))]
    TokioTarEntriesNext { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("{path} has a member with an unreadable name"))]
    TokioTarEntryPath { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to unpack {member} from {path}"))]
    TokioTarEntryUnpackIn {
        path: Utf8PathBuf,
        member: String,
        source: std::io::Error,
    },
    #[snafu(display("{path} has member {member} outside the destination"))]
    MemberEscapesDestination { path: Utf8PathBuf, member: String },
    #[snafu(display("{path} does not contain a top-level `{ARCHIVE_ROOT}` directory"))]
    ArchiveRootMissing { path: Utf8PathBuf },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TokioFsFileOpen { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            },
            Error::TokioFsFileOpen { .. } | Error::TokioFsRemoveDirAll { .. } | Error::TokioFsCreateDirAll { .. } => {
                ErrorKind::Io
            },
            Error::TokioTarEntryUnpackIn { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::Privilege
            },
            Error::TokioTarArchiveEntries { .. }
            | Error::TokioTarEntriesNext { .. }
            | Error::TokioTarEntryPath { .. }
            | Error::TokioTarEntryUnpackIn { .. }
            | Error::MemberEscapesDestination { .. }
            | Error::ArchiveRootMissing { .. } => ErrorKind::CorruptArchive,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnpackSummary {
    /// The unpacked `go` directory inside the destination.
    pub root: Utf8PathBuf,
    pub members: u64,
}

/// Unpacks the gzip tarball at `path` into a freshly emptied `dest`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(feedback)))]
pub async fn unpack_archive(
    mut feedback: GoupLoggerFeedback<'_>,
    path: &Utf8Path,
    dest: &Utf8Path,
) -> Result<UnpackSummary, self::Error> {
    let file = tokio::fs::File::open(path)
        .await
        .context(TokioFsFileOpenSnafu { path })?;

    if tokio::fs::symlink_metadata(dest).await.is_ok() {
        tokio::fs::remove_dir_all(dest)
            .await
            .context(TokioFsRemoveDirAllSnafu { path: dest })?;
    }
    tokio::fs::create_dir_all(dest)
        .await
        .context(TokioFsCreateDirAllSnafu { path: dest })?;

    let reader = tokio::io::BufReader::new(file);
    let decoder = async_compression::tokio::bufread::GzipDecoder::new(reader);
    let mut archive = tokio_tar::Archive::new(decoder);
    let mut entries = archive.entries().context(TokioTarArchiveEntriesSnafu { path })?;

    let mut members = 0u64;
    let mut saw_root = false;
    while let Some(mut entry) = entries.try_next().await.context(TokioTarEntriesNextSnafu { path })? {
        let member = entry.path().context(TokioTarEntryPathSnafu { path })?.into_owned();
        let display = member.display().to_string();
        saw_root |= member.components().next().map(|first| first.as_os_str()) == Some(OsStr::new(ARCHIVE_ROOT));
        let unpacked = entry
            .unpack_in(dest)
            .await
            .context(TokioTarEntryUnpackInSnafu { path, member: &display })?;
        ensure!(unpacked, MemberEscapesDestinationSnafu { path, member: display });
        members += 1;
        feedback.report_member_unpacked(&member);
    }

    let root = dest.join(ARCHIVE_ROOT);
    ensure!(saw_root && root.is_dir(), ArchiveRootMissingSnafu { path });

    feedback.report_finished_unpacking(members);

    Ok(UnpackSummary { root, members })
}
