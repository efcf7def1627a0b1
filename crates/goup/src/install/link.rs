use camino::{Utf8Path, Utf8PathBuf};
use snafu::prelude::*;

use crate::{directories::binary_path, executor::PrivilegedExecutor, Directories, ErrorKind};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{path} is missing from the installed toolchain (linked so far: {linked:?})"))]
    BinaryMissing {
        binary: String,
        path: Utf8PathBuf,
        linked: Vec<String>,
    },
    #[snafu(display("failed to link {binary} (linked so far: {linked:?})"))]
    RelinkPartial {
        binary: String,
        linked: Vec<String>,
        source: crate::executor::Error,
    },
    #[snafu(display("failed to remove link {path}"))]
    Unlink {
        path: Utf8PathBuf,
        source: crate::executor::Error,
    },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BinaryMissing { .. } => ErrorKind::NotFound,
            Error::RelinkPartial { source, .. } | Error::Unlink { source, .. } => source.kind(),
        }
    }

    /// Binaries whose links were already updated when the failure happened.
    #[must_use]
    pub fn linked(&self) -> &[String] {
        match self {
            Error::BinaryMissing { linked, .. } | Error::RelinkPartial { linked, .. } => linked,
            Error::Unlink { .. } => &[],
        }
    }
}

/// Points `bin_dir/<binary>` at `install_dir/bin/<binary>` for every binary.
///
/// Links are replaced in order; the first failure stops the run and reports which
/// binaries were already switched over.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(executor, dirs)))]
pub async fn relink<E>(executor: &E, dirs: &Directories, binaries: &[String]) -> Result<Vec<Utf8PathBuf>, self::Error>
where
    E: PrivilegedExecutor,
{
    let mut linked = vec![];
    let mut links = vec![];
    for binary in binaries {
        let target = binary_path(dirs.install_dir(), binary);
        ensure!(
            target.is_file(),
            BinaryMissingSnafu {
                binary,
                path: target,
                linked: linked.clone(),
            }
        );
        let link = dirs.link_path(binary);
        if let Err(source) = executor.replace_symlink(&target, &link).await {
            return Err(source).context(RelinkPartialSnafu { binary, linked });
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(%link, %target, "linked");
        linked.push(binary.clone());
        links.push(link);
    }
    Ok(links)
}

/// Removes the links in the bin directory that point into `install_dir`.
///
/// Links pointing elsewhere, and regular files, are left alone.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(executor, dirs)))]
pub async fn unlink<E>(executor: &E, dirs: &Directories, binaries: &[String]) -> Result<Vec<Utf8PathBuf>, self::Error>
where
    E: PrivilegedExecutor,
{
    let mut removed = vec![];
    for binary in binaries {
        let link = dirs.link_path(binary);
        if !points_into(&link, dirs.install_dir()).await {
            continue;
        }
        executor
            .remove_file(&link)
            .await
            .context(UnlinkSnafu { path: &link })?;
        removed.push(link);
    }
    Ok(removed)
}

async fn points_into(link: &Utf8Path, install_dir: &Utf8Path) -> bool {
    match tokio::fs::read_link(link).await {
        Ok(target) => target.starts_with(install_dir),
        Err(_) => false,
    }
}
