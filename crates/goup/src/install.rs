use camino::{Utf8Path, Utf8PathBuf};
use snafu::prelude::*;

use crate::{executor::PrivilegedExecutor, Directories, ErrorKind, GoupLogger};

pub mod link;
pub mod unpack;

pub use self::unpack::UnpackSummary;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("no toolchain installed at {path}"))]
    InstallDirNotFound { path: Utf8PathBuf },
    #[snafu(display("{path} already exists"))]
    InstallDirOccupied { path: Utf8PathBuf },
    #[snafu(display("failed to remove {path}"))]
    RemoveExisting {
        path: Utf8PathBuf,
        source: crate::executor::Error,
    },
    #[snafu(display("failed to move {from} into {path}"))]
    PlaceTree {
        from: Utf8PathBuf,
        path: Utf8PathBuf,
        source: crate::executor::Error,
    },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InstallDirNotFound { .. } => ErrorKind::NotFound,
            Error::InstallDirOccupied { .. } => ErrorKind::Io,
            Error::RemoveExisting { source, .. } | Error::PlaceTree { source, .. } => source.kind(),
        }
    }
}

/// Performs the filesystem side of an install, routing every change outside the
/// work directory through the executor.
#[derive(Debug)]
pub struct InstallationManager<'a, E> {
    dirs: &'a Directories,
    executor: &'a E,
    logger: &'a GoupLogger,
}

impl<'a, E> InstallationManager<'a, E>
where
    E: PrivilegedExecutor,
{
    #[must_use]
    pub fn new(dirs: &'a Directories, executor: &'a E, logger: &'a GoupLogger) -> Self {
        Self { dirs, executor, logger }
    }

    #[must_use]
    pub fn install_dir_exists(&self) -> bool {
        self.dirs.install_dir().symlink_metadata().is_ok()
    }

    /// Deletes the installed toolchain tree. Fails with [`ErrorKind::NotFound`]
    /// when there is nothing to delete.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn remove_existing(&self) -> Result<(), self::Error> {
        let path = self.dirs.install_dir();
        ensure!(self.install_dir_exists(), InstallDirNotFoundSnafu { path });
        self.logger.report_step(format_args!("removing {path}"));
        self.executor
            .remove_dir_all(path)
            .await
            .context(RemoveExistingSnafu { path })
    }

    /// Unpacks `archive` into `dest`, which is emptied first.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn unpack(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<UnpackSummary, self::unpack::Error> {
        let feedback = self.logger.report_archive_unpack(archive);
        self::unpack::unpack_archive(feedback, archive, dest).await
    }

    /// Moves the unpacked `go` tree into the install directory, which must be gone.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn place(&self, staged_root: &Utf8Path) -> Result<(), self::Error> {
        let path = self.dirs.install_dir();
        ensure!(!self.install_dir_exists(), InstallDirOccupiedSnafu { path });
        self.logger.report_step(format_args!("installing into {path}"));
        self.executor
            .move_tree(staged_root, path)
            .await
            .context(PlaceTreeSnafu { from: staged_root, path })
    }

    pub async fn relink(&self, binaries: &[String]) -> Result<Vec<Utf8PathBuf>, self::link::Error> {
        let links = self::link::relink(self.executor, self.dirs, binaries).await?;
        for link in &links {
            self.logger.report_step(format_args!("linked {link}"));
        }
        Ok(links)
    }

    pub async fn unlink(&self, binaries: &[String]) -> Result<Vec<Utf8PathBuf>, self::link::Error> {
        let links = self::link::unlink(self.executor, self.dirs, binaries).await?;
        for link in &links {
            self.logger.report_step(format_args!("unlinked {link}"));
        }
        Ok(links)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{executor::DirectExecutor, Settings};
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::AsyncWriteExt;

    fn dirs(root: &std::path::Path) -> Directories {
        let root = Utf8PathBuf::try_from(root.to_path_buf()).unwrap();
        let settings = Settings {
            install_dir: root.join("usr").join("local").join("go"),
            bin_dir: root.join("usr").join("bin"),
            work_dir: root.join("work"),
            ..Settings::default()
        };
        std::fs::create_dir_all(&settings.bin_dir).unwrap();
        std::fs::create_dir_all(&settings.work_dir).unwrap();
        Directories::new(&settings).unwrap()
    }

    async fn tarball(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tokio_tar::Builder::new(vec![]);
        for (path, data) in members {
            let mut header = tokio_tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).await.unwrap();
        }
        let tar = builder.into_inner().await.unwrap();
        let mut encoder = GzipEncoder::new(vec![]);
        encoder.write_all(&tar).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    #[tokio::test]
    async fn unpack_then_place_then_relink() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        let archive = dirs.archive_path("go.tar.gz");
        let bytes = tarball(&[
            ("go/VERSION", b"go1.21.0\n"),
            ("go/bin/go", b"#!/bin/sh\n"),
            ("go/bin/gofmt", b"#!/bin/sh\n"),
        ])
        .await;
        tokio::fs::write(&archive, bytes).await.unwrap();

        let logger = GoupLogger::Silent;
        let manager = InstallationManager::new(&dirs, &DirectExecutor, &logger);
        let summary = manager.unpack(&archive, dirs.staging()).await.unwrap();
        assert_eq!(summary.members, 3);
        assert_eq!(summary.root, dirs.staged_root());

        manager.place(&summary.root).await.unwrap();
        assert_eq!(std::fs::read_to_string(dirs.version_file()).unwrap(), "go1.21.0\n");

        let binaries = vec!["go".to_owned(), "gofmt".to_owned()];
        manager.relink(&binaries).await.unwrap();
        manager.relink(&binaries).await.unwrap();
        for binary in &binaries {
            let target = std::fs::read_link(dirs.link_path(binary)).unwrap();
            assert_eq!(target, dirs.install_dir().join("bin").join(binary).as_std_path());
        }

        let removed = manager.unlink(&binaries).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(dirs.link_path("go").symlink_metadata().is_err());
    }

    #[tokio::test]
    async fn unpack_clears_previous_staging() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        std::fs::create_dir_all(dirs.staged_root().join("stale")).unwrap();
        let archive = dirs.archive_path("go.tar.gz");
        tokio::fs::write(&archive, tarball(&[("go/VERSION", b"go1.22.0\n")]).await)
            .await
            .unwrap();

        let logger = GoupLogger::Silent;
        let manager = InstallationManager::new(&dirs, &DirectExecutor, &logger);
        manager.unpack(&archive, dirs.staging()).await.unwrap();
        assert!(!dirs.staged_root().join("stale").exists());
    }

    #[tokio::test]
    async fn unpack_without_go_root_is_corrupt() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        let archive = dirs.archive_path("other.tar.gz");
        tokio::fs::write(&archive, tarball(&[("other/VERSION", b"x")]).await)
            .await
            .unwrap();

        let logger = GoupLogger::Silent;
        let manager = InstallationManager::new(&dirs, &DirectExecutor, &logger);
        let error = manager.unpack(&archive, dirs.staging()).await.unwrap_err();
        assert!(matches!(error, unpack::Error::ArchiveRootMissing { .. }));
        assert_eq!(error.kind(), ErrorKind::CorruptArchive);
    }

    #[tokio::test]
    async fn unpack_truncated_archive_is_corrupt() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        let archive = dirs.archive_path("go.tar.gz");
        let bytes = tarball(&[("go/VERSION", &[b'x'; 4096])]).await;
        tokio::fs::write(&archive, &bytes[..bytes.len() / 2]).await.unwrap();

        let logger = GoupLogger::Silent;
        let manager = InstallationManager::new(&dirs, &DirectExecutor, &logger);
        let error = manager.unpack(&archive, dirs.staging()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CorruptArchive);
    }

    #[tokio::test]
    async fn remove_missing_install_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        let logger = GoupLogger::Silent;
        let manager = InstallationManager::new(&dirs, &DirectExecutor, &logger);
        let error = manager.remove_existing().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn relink_reports_missing_binary_after_partial_success() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        std::fs::create_dir_all(dirs.install_dir().join("bin")).unwrap();
        std::fs::write(dirs.install_dir().join("bin").join("go"), "bin").unwrap();

        let logger = GoupLogger::Silent;
        let manager = InstallationManager::new(&dirs, &DirectExecutor, &logger);
        let binaries = vec!["go".to_owned(), "gofmt".to_owned()];
        let error = manager.relink(&binaries).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.linked(), ["go".to_owned()]);
    }

    #[tokio::test]
    async fn unlink_leaves_foreign_links() {
        let root = tempfile::tempdir().unwrap();
        let dirs = dirs(root.path());
        let elsewhere = root.path().join("elsewhere");
        std::fs::write(&elsewhere, "bin").unwrap();
        std::os::unix::fs::symlink(&elsewhere, dirs.link_path("go")).unwrap();

        let logger = GoupLogger::Silent;
        let manager = InstallationManager::new(&dirs, &DirectExecutor, &logger);
        let removed = manager.unlink(&["go".to_owned()]).await.unwrap();
        assert!(removed.is_empty());
        assert!(dirs.link_path("go").symlink_metadata().is_ok());
    }
}
