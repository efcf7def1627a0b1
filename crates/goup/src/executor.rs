use camino::{Utf8Path, Utf8PathBuf};
use snafu::prelude::*;

use crate::ErrorKind;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to run `{command}`"))]
    SudoCommandSpawn { command: String, source: std::io::Error },
    #[snafu(display("`{command}` exited with {}", code.map_or_else(|| "a signal".to_owned(), |code| format!("status {code}"))))]
    SudoCommandFailed { command: String, code: Option<i32> },
    #[snafu(display("failed to remove {path}"))]
    TokioFsRemoveDirAll { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to remove {path}"))]
    TokioFsRemoveFile { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to create {path}"))]
    TokioFsCreateDirAll { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("failed to move {from} to {to}"))]
    TokioFsRename {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to link {link} to {target}"))]
    TokioFsSymlink {
        target: Utf8PathBuf,
        link: Utf8PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to copy {from} to {to}"))]
    CopyTree {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
        source: std::io::Error,
    },
    TokioTaskSpawnBlocking { source: tokio::task::JoinError },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SudoCommandSpawn { .. } | Error::SudoCommandFailed { .. } => ErrorKind::Privilege,
            Error::TokioFsRemoveDirAll { source, .. }
            | Error::TokioFsRemoveFile { source, .. }
            | Error::TokioFsCreateDirAll { source, .. }
            | Error::TokioFsRename { source, .. }
            | Error::TokioFsSymlink { source, .. }
            | Error::CopyTree { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => ErrorKind::Privilege,
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                _ => ErrorKind::Io,
            },
            Error::TokioTaskSpawnBlocking { .. } => ErrorKind::Io,
        }
    }
}

/// The capability through which every destructive filesystem step runs.
///
/// [`acquire`](Self::acquire) is called once before the first destructive step and
/// [`release`](Self::release) once at the end of the run.
#[allow(async_fn_in_trait)]
pub trait PrivilegedExecutor {
    async fn acquire(&self) -> Result<(), self::Error>;

    async fn release(&self) -> Result<(), self::Error>;

    async fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), self::Error>;

    async fn remove_file(&self, path: &Utf8Path) -> Result<(), self::Error>;

    /// Moves the tree at `from` to `to`; `to` must not exist yet.
    async fn move_tree(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), self::Error>;

    /// Points `link` at `target`, replacing whatever `link` was in one rename.
    async fn replace_symlink(&self, target: &Utf8Path, link: &Utf8Path) -> Result<(), self::Error>;
}

fn temporary_link(link: &Utf8Path) -> Utf8PathBuf {
    let name = link.file_name().unwrap_or("link");
    link.with_file_name(format!(".{name}.goup-tmp"))
}

/// Runs every operation with the privileges of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectExecutor;

impl PrivilegedExecutor for DirectExecutor {
    async fn acquire(&self) -> Result<(), self::Error> {
        Ok(())
    }

    async fn release(&self) -> Result<(), self::Error> {
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), self::Error> {
        tokio::fs::remove_dir_all(path)
            .await
            .context(TokioFsRemoveDirAllSnafu { path })
    }

    async fn remove_file(&self, path: &Utf8Path) -> Result<(), self::Error> {
        tokio::fs::remove_file(path)
            .await
            .context(TokioFsRemoveFileSnafu { path })
    }

    async fn move_tree(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), self::Error> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(TokioFsCreateDirAllSnafu { path: parent })?;
        }
        if tokio::fs::rename(from, to).await.is_ok() {
            return Ok(());
        }
        // NOTE: rename fails across filesystems, fall back to copy + remove
        let (source, destination) = (from.to_path_buf(), to.to_path_buf());
        tokio::task::spawn_blocking(move || copy_tree(&source, &destination))
            .await
            .context(TokioTaskSpawnBlockingSnafu)?
            .context(CopyTreeSnafu { from, to })?;
        self.remove_dir_all(from).await
    }

    async fn replace_symlink(&self, target: &Utf8Path, link: &Utf8Path) -> Result<(), self::Error> {
        let temporary = temporary_link(link);
        if tokio::fs::symlink_metadata(&temporary).await.is_ok() {
            self.remove_file(&temporary).await?;
        }
        #[cfg(unix)]
        tokio::fs::symlink(target, &temporary)
            .await
            .context(TokioFsSymlinkSnafu { target, link })?;
        #[cfg(windows)]
        tokio::fs::symlink_file(target, &temporary)
            .await
            .context(TokioFsSymlinkSnafu { target, link })?;
        tokio::fs::rename(&temporary, link)
            .await
            .context(TokioFsRenameSnafu { from: &temporary, to: link })
    }
}

fn copy_tree(from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error))?;
        let destination = to.as_std_path().join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(target, &destination)?;
            #[cfg(windows)]
            std::os::windows::fs::symlink_file(target, &destination)?;
        } else {
            std::fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

/// Runs every operation through `sudo`, for callers that are not root.
#[derive(Clone, Debug)]
pub struct SudoExecutor {
    program: String,
}

impl Default for SudoExecutor {
    fn default() -> Self {
        Self { program: "sudo".into() }
    }
}

impl SudoExecutor {
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn run(&self, args: &[&str]) -> Result<(), self::Error> {
        let command = core::iter::once(self.program.as_str())
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let status = tokio::process::Command::new(&self.program)
            .args(args)
            .status()
            .await
            .context(SudoCommandSpawnSnafu { command: &command })?;
        ensure!(
            status.success(),
            SudoCommandFailedSnafu {
                command,
                code: status.code()
            }
        );
        Ok(())
    }
}

impl PrivilegedExecutor for SudoExecutor {
    async fn acquire(&self) -> Result<(), self::Error> {
        self.run(&["-v"]).await
    }

    async fn release(&self) -> Result<(), self::Error> {
        self.run(&["-k"]).await
    }

    async fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), self::Error> {
        self.run(&["rm", "-rf", "--", path.as_str()]).await
    }

    async fn remove_file(&self, path: &Utf8Path) -> Result<(), self::Error> {
        self.run(&["rm", "-f", "--", path.as_str()]).await
    }

    async fn move_tree(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), self::Error> {
        if let Some(parent) = to.parent() {
            self.run(&["mkdir", "-p", "--", parent.as_str()]).await?;
        }
        self.run(&["mv", "--", from.as_str(), to.as_str()]).await?;
        // NOTE: the staged tree belongs to the invoking user until handed to root
        self.run(&["chown", "-R", "0:0", "--", to.as_str()]).await
    }

    async fn replace_symlink(&self, target: &Utf8Path, link: &Utf8Path) -> Result<(), self::Error> {
        let temporary = temporary_link(link);
        self.remove_file(&temporary).await?;
        self.run(&["ln", "-s", "--", target.as_str(), temporary.as_str()])
            .await?;
        // NOTE: `-T` keeps GNU mv from moving into a directory the old link points at
        #[cfg(target_os = "linux")]
        let args = ["mv", "-f", "-T", "--", temporary.as_str(), link.as_str()];
        #[cfg(not(target_os = "linux"))]
        let args = ["mv", "-f", "--", temporary.as_str(), link.as_str()];
        self.run(&args).await
    }
}

/// The executor picked at startup for the current identity.
#[derive(Clone, Debug)]
pub enum Executor {
    Direct(DirectExecutor),
    Sudo(SudoExecutor),
}

impl Executor {
    /// `use_sudo` overrides the choice; otherwise `sudo` is used unless the process
    /// already runs as root.
    #[must_use]
    pub fn detect(use_sudo: Option<bool>) -> Self {
        if use_sudo.unwrap_or_else(|| !is_elevated()) {
            Executor::Sudo(SudoExecutor::default())
        } else {
            Executor::Direct(DirectExecutor)
        }
    }
}

#[cfg(unix)]
#[must_use]
pub fn is_elevated() -> bool {
    // SAFETY: `geteuid` has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_elevated() -> bool {
    true
}

impl PrivilegedExecutor for Executor {
    async fn acquire(&self) -> Result<(), self::Error> {
        match self {
            Executor::Direct(executor) => executor.acquire().await,
            Executor::Sudo(executor) => executor.acquire().await,
        }
    }

    async fn release(&self) -> Result<(), self::Error> {
        match self {
            Executor::Direct(executor) => executor.release().await,
            Executor::Sudo(executor) => executor.release().await,
        }
    }

    async fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), self::Error> {
        match self {
            Executor::Direct(executor) => executor.remove_dir_all(path).await,
            Executor::Sudo(executor) => executor.remove_dir_all(path).await,
        }
    }

    async fn remove_file(&self, path: &Utf8Path) -> Result<(), self::Error> {
        match self {
            Executor::Direct(executor) => executor.remove_file(path).await,
            Executor::Sudo(executor) => executor.remove_file(path).await,
        }
    }

    async fn move_tree(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), self::Error> {
        match self {
            Executor::Direct(executor) => executor.move_tree(from, to).await,
            Executor::Sudo(executor) => executor.move_tree(from, to).await,
        }
    }

    async fn replace_symlink(&self, target: &Utf8Path, link: &Utf8Path) -> Result<(), self::Error> {
        match self {
            Executor::Direct(executor) => executor.replace_symlink(target, link).await,
            Executor::Sudo(executor) => executor.replace_symlink(target, link).await,
        }
    }
}
