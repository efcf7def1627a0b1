#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::result_large_err)]

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use camino::{Utf8Path, Utf8PathBuf};
use snafu::prelude::*;
use url::Url;

pub use crate::{
    archive::ArchiveFetcher,
    confirm::{AssumeYes, Confirm},
    directories::Directories,
    executor::{DirectExecutor, Executor, PrivilegedExecutor, SudoExecutor},
    index::{IndexClient, IndexMode},
    install::{InstallationManager, UnpackSummary},
    installed::InstalledToolchain,
    logging::GoupLogger,
    platform::{GoArch, GoOs, Platform},
    release::{Release, ReleaseFile, ReleaseKind},
    settings::Settings,
    version::{PreRelease, Version},
};

pub mod archive;
pub mod confirm;
pub mod directories;
pub mod executor;
pub mod index;
pub mod install;
pub mod installed;
pub mod logging;
pub mod platform;
pub mod release;
pub mod settings;
pub mod verification;
pub mod version;

/// Broad classification of everything that can go wrong in a run.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    Network,
    Parse,
    MalformedVersion,
    NotFound,
    Integrity,
    CorruptArchive,
    Privilege,
    UserAborted,
    Io,
    Config,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            ErrorKind::Network => "network error",
            ErrorKind::Parse => "parse error",
            ErrorKind::MalformedVersion => "malformed version",
            ErrorKind::NotFound => "not found",
            ErrorKind::Integrity => "integrity error",
            ErrorKind::CorruptArchive => "corrupt archive",
            ErrorKind::Privilege => "privilege error",
            ErrorKind::UserAborted => "aborted by user",
            ErrorKind::Io => "i/o error",
            ErrorKind::Config => "configuration error",
        };
        f.write_str(text)
    }
}

/// Steps of an update run, in the order they happen.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Stage {
    Idle,
    CheckingVersion,
    ShowVersions,
    CheckUpdate,
    Downloading,
    Verifying,
    Removing,
    Unpacking,
    Relinking,
    CleaningUp,
    Done,
    Failed,
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Stage::Idle => "idle",
            Stage::CheckingVersion => "checking version",
            Stage::ShowVersions => "listing versions",
            Stage::CheckUpdate => "checking for updates",
            Stage::Downloading => "downloading",
            Stage::Verifying => "verifying",
            Stage::Removing => "removing",
            Stage::Unpacking => "unpacking",
            Stage::Relinking => "relinking",
            Stage::CleaningUp => "cleaning up",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve directories"))]
    GoupDirectoriesNew { source: crate::directories::Error },
    #[snafu(display("invalid url {url:?}"))]
    GoupUrlParse { url: String, source: url::ParseError },
    #[snafu(display("failed to set up the http client"))]
    ReqwestClientBuild { source: reqwest::Error },
    #[snafu(display("failed to detect the installed toolchain"))]
    GoupInstalledDetect { source: crate::installed::Error },
    #[snafu(display("failed to fetch the release index"))]
    GoupIndexFetch { source: crate::index::Error },
    #[snafu(display("failed to list versions"))]
    GoupIndexList { source: crate::index::Error },
    #[snafu(display("failed to check for updates"))]
    GoupIndexCheck { source: crate::index::Error },
    #[snafu(display("the release index has no stable release"))]
    GoupNoStableRelease,
    #[snafu(display("no archive to install"))]
    GoupArchiveResolve { source: crate::archive::Error },
    #[snafu(display("failed to download archive"))]
    GoupArchiveDownload { source: crate::archive::Error },
    #[snafu(display("failed to verify archive"))]
    GoupArchiveVerify { source: crate::archive::Error },
    #[snafu(display("cannot read archive {path}"))]
    TokioFsMetadata { path: Utf8PathBuf, source: std::io::Error },
    #[snafu(display("{path} is not a file"))]
    GoupArchiveNotAFile { path: Utf8PathBuf },
    #[snafu(display("declined: {prompt}"))]
    GoupUserAborted { prompt: String },
    #[snafu(display("failed to acquire privileges"))]
    GoupPrivilegeAcquire { source: crate::executor::Error },
    #[snafu(display("failed to remove the installed toolchain"))]
    GoupRemove { source: crate::install::Error },
    #[snafu(display("failed to unpack archive"))]
    GoupUnpack { source: crate::install::unpack::Error },
    #[snafu(display("failed to install the unpacked toolchain"))]
    GoupInstallTree { source: crate::install::Error },
    #[snafu(display("failed to relink binaries"))]
    GoupRelink { source: crate::install::link::Error },
    #[snafu(display("failed to remove binary links"))]
    GoupUnlink { source: crate::install::link::Error },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::GoupDirectoriesNew { source } => source.kind(),
            Error::GoupUrlParse { .. } => ErrorKind::Config,
            Error::ReqwestClientBuild { .. } => ErrorKind::Network,
            Error::GoupInstalledDetect { source } => source.kind(),
            Error::GoupIndexFetch { source } | Error::GoupIndexList { source } | Error::GoupIndexCheck { source } => {
                source.kind()
            },
            Error::GoupNoStableRelease => ErrorKind::NotFound,
            Error::GoupArchiveResolve { source }
            | Error::GoupArchiveDownload { source }
            | Error::GoupArchiveVerify { source } => source.kind(),
            Error::TokioFsMetadata { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            },
            Error::TokioFsMetadata { .. } | Error::GoupArchiveNotAFile { .. } => ErrorKind::Io,
            Error::GoupUserAborted { .. } => ErrorKind::UserAborted,
            Error::GoupPrivilegeAcquire { .. } => ErrorKind::Privilege,
            Error::GoupRemove { source } | Error::GoupInstallTree { source } => source.kind(),
            Error::GoupUnpack { source } => source.kind(),
            Error::GoupRelink { source } | Error::GoupUnlink { source } => source.kind(),
        }
    }

    /// The stage the run was in when it failed, if it got that far.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::GoupDirectoriesNew { .. }
            | Error::GoupUrlParse { .. }
            | Error::ReqwestClientBuild { .. }
            | Error::TokioFsMetadata { .. }
            | Error::GoupArchiveNotAFile { .. }
            | Error::GoupPrivilegeAcquire { .. } => None,
            Error::GoupInstalledDetect { .. }
            | Error::GoupIndexFetch { .. }
            | Error::GoupNoStableRelease
            | Error::GoupArchiveResolve { .. } => Some(Stage::CheckingVersion),
            Error::GoupIndexList { .. } => Some(Stage::ShowVersions),
            Error::GoupIndexCheck { .. } => Some(Stage::CheckUpdate),
            Error::GoupArchiveDownload { .. } => Some(Stage::Downloading),
            Error::GoupArchiveVerify { .. } | Error::GoupUserAborted { .. } => Some(Stage::Verifying),
            Error::GoupRemove { .. } | Error::GoupUnlink { .. } => Some(Stage::Removing),
            Error::GoupUnpack { .. } | Error::GoupInstallTree { .. } => Some(Stage::Unpacking),
            Error::GoupRelink { .. } => Some(Stage::Relinking),
        }
    }
}

/// What to install.
#[derive(Clone, Debug)]
pub struct UpdateRequest {
    /// Exact version to install; the newest stable release when `None`.
    pub version: Option<Version>,
    pub platform: Platform,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpdateOutcome {
    AlreadyCurrent(Version),
    Installed {
        version: Version,
        previous: Option<Version>,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateCheck {
    pub installed: Option<Version>,
    /// The newest stable release, when it is newer than what is installed.
    pub available: Option<Version>,
}

pub struct Goup<E = Executor, C = AssumeYes> {
    settings: Settings,
    directories: Directories,
    index: IndexClient,
    fetcher: ArchiveFetcher,
    executor: E,
    confirm: C,
    logger: GoupLogger,
}

impl Goup {
    #[must_use]
    pub fn builder(settings: Settings) -> GoupBuilder<Executor, AssumeYes> {
        let executor = Executor::detect(settings.use_sudo);
        GoupBuilder {
            settings,
            executor,
            confirm: AssumeYes,
            logger: GoupLogger::default(),
            client: None,
        }
    }
}

impl<E, C> Goup<E, C>
where
    E: PrivilegedExecutor,
    C: Confirm,
{
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn manager(&self) -> InstallationManager<'_, E> {
        InstallationManager::new(&self.directories, &self.executor, &self.logger)
    }

    #[allow(clippy::unused_self)]
    fn enter(&self, stage: Stage) {
        #[cfg(feature = "tracing")]
        tracing::info!(%stage, "entering stage");
        #[cfg(not(feature = "tracing"))]
        let _ = stage;
    }

    fn finish<T>(&self, result: Result<T, self::Error>) -> Result<T, self::Error> {
        match &result {
            Ok(_) => self.enter(Stage::Done),
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(stage = ?error.stage(), kind = %error.kind(), "{error}");
                #[cfg(not(feature = "tracing"))]
                let _ = error;
                self.enter(Stage::Failed);
            },
        }
        result
    }

    /// The toolchain currently in the install directory.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn installed(&self) -> Result<Option<InstalledToolchain>, self::Error> {
        InstalledToolchain::detect(&self.directories)
            .await
            .context(GoupInstalledDetectSnafu)
    }

    /// Every published release, unstable ones included.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn list_versions(&self) -> Result<Vec<Release>, self::Error> {
        self.enter(Stage::ShowVersions);
        let result = self.index.fetch_all().await.context(GoupIndexListSnafu);
        self.finish(result)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn check_update(&self) -> Result<UpdateCheck, self::Error> {
        self.enter(Stage::CheckingVersion);
        let result = self.find_update().await;
        self.finish(result)
    }

    async fn find_update(&self) -> Result<UpdateCheck, self::Error> {
        let installed = self.installed().await?.map(|installed| installed.version);
        self.enter(Stage::CheckUpdate);
        let available = self
            .index
            .find_newer_stable(installed.as_ref())
            .await
            .context(GoupIndexCheckSnafu)?
            .map(|release| release.version);
        Ok(UpdateCheck { installed, available })
    }

    /// Picks the release to install. `Ok(None)` means `installed` already is it.
    ///
    /// An explicit version equal to the installed one returns before any request.
    async fn target(
        &self,
        request: &UpdateRequest,
        installed: Option<&Version>,
    ) -> Result<Option<ReleaseFile>, self::Error> {
        if let (Some(wanted), Some(installed)) = (&request.version, installed) {
            if wanted == installed {
                return Ok(None);
            }
        }
        let (releases, version) = match &request.version {
            Some(version) => {
                let releases = self.index.fetch(IndexMode::All).await.context(GoupIndexFetchSnafu)?;
                (releases, version.clone())
            },
            None => {
                let releases = self.index.fetch(IndexMode::Latest).await.context(GoupIndexFetchSnafu)?;
                let newest = crate::release::newest_stable_after(&releases, None)
                    .context(GoupNoStableReleaseSnafu)?
                    .version
                    .clone();
                if installed == Some(&newest) {
                    return Ok(None);
                }
                (releases, newest)
            },
        };
        let file = ArchiveFetcher::resolve(&releases, &version, &request.platform).context(GoupArchiveResolveSnafu)?;
        Ok(Some(file.clone()))
    }

    async fn fetch_verified(&self, file: &ReleaseFile) -> Result<Utf8PathBuf, self::Error> {
        self.enter(Stage::Downloading);
        let archive = self
            .fetcher
            .download(&self.directories, &self.logger, file)
            .await
            .context(GoupArchiveDownloadSnafu)?;
        self.enter(Stage::Verifying);
        self.fetcher
            .verify(&self.logger, &archive, &file.sha256)
            .await
            .context(GoupArchiveVerifySnafu)?;
        Ok(archive)
    }

    fn confirm(&self, prompt: String) -> Result<(), self::Error> {
        ensure!(self.confirm.confirm(&prompt), GoupUserAbortedSnafu { prompt });
        Ok(())
    }

    /// Removes what is installed, unpacks `archive` in its place and relinks.
    async fn replace_installation(&self, archive: &Utf8Path, installed: bool) -> Result<(), self::Error> {
        let manager = self.manager();
        if installed {
            self.enter(Stage::Removing);
            manager.remove_existing().await.context(GoupRemoveSnafu)?;
        }
        self.enter(Stage::Unpacking);
        let summary = manager
            .unpack(archive, self.directories.staging())
            .await
            .context(GoupUnpackSnafu)?;
        manager.place(&summary.root).await.context(GoupInstallTreeSnafu)?;
        self.enter(Stage::Relinking);
        manager
            .relink(&self.settings.binaries)
            .await
            .context(GoupRelinkSnafu)?;
        Ok(())
    }

    /// Runs `body` between acquiring and releasing privilege.
    async fn privileged<T>(&self, body: impl core::future::Future<Output = Result<T, self::Error>>) -> Result<T, self::Error> {
        self.executor.acquire().await.context(GoupPrivilegeAcquireSnafu)?;
        let result = body.await;
        if let Err(error) = self.executor.release().await {
            #[cfg(feature = "tracing")]
            tracing::warn!(%error, "failed to release privileges");
            #[cfg(not(feature = "tracing"))]
            let _ = error;
        }
        result
    }

    async fn clean_up(&self, archive: Option<&Utf8Path>) {
        self.enter(Stage::CleaningUp);
        let staging = self.directories.staging();
        if staging.symlink_metadata().is_ok() {
            if let Err(error) = tokio::fs::remove_dir_all(staging).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(%staging, %error, "failed to remove staging directory");
                #[cfg(not(feature = "tracing"))]
                let _ = error;
            }
        }
        if let Some(archive) = archive {
            if let Err(error) = tokio::fs::remove_file(archive).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(%archive, %error, "failed to remove archive");
                #[cfg(not(feature = "tracing"))]
                let _ = error;
            }
        }
    }

    /// Installs the requested version unless it already is the installed one.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn update(&self, request: &UpdateRequest) -> Result<UpdateOutcome, self::Error> {
        self.enter(Stage::CheckingVersion);
        let installed = match self.installed().await {
            Ok(installed) => installed.map(|installed| installed.version),
            Err(error) => return self.finish(Err(error)),
        };
        let file = match self.target(request, installed.as_ref()).await {
            Ok(Some(file)) => file,
            Ok(None) => {
                let version = request
                    .version
                    .clone()
                    .or_else(|| installed.clone())
                    .context(GoupNoStableReleaseSnafu);
                return self.finish(version.map(UpdateOutcome::AlreadyCurrent));
            },
            Err(error) => return self.finish(Err(error)),
        };

        let result = self.install_release(&file, installed.as_ref()).await;
        self.clean_up(Some(&self.directories.archive_path(&file.filename)))
            .await;
        self.finish(result.map(|()| UpdateOutcome::Installed {
            version: file.version,
            previous: installed,
        }))
    }

    async fn install_release(&self, file: &ReleaseFile, installed: Option<&Version>) -> Result<(), self::Error> {
        let archive = self.fetch_verified(file).await?;
        let install_dir = self.directories.install_dir();
        let prompt = match installed {
            Some(installed) => format!("replace {installed} in {install_dir} with {}?", file.version),
            None => format!("install {} into {install_dir}?", file.version),
        };
        self.confirm(prompt)?;
        let exists = self.manager().install_dir_exists();
        self.privileged(self.replace_installation(&archive, exists)).await
    }

    /// Downloads and verifies the requested archive into the work directory,
    /// leaving it there.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn download(&self, request: &UpdateRequest) -> Result<Utf8PathBuf, self::Error> {
        self.enter(Stage::CheckingVersion);
        let result = self.download_release(request).await;
        self.finish(result)
    }

    async fn download_release(&self, request: &UpdateRequest) -> Result<Utf8PathBuf, self::Error> {
        let file = self
            .target(request, None)
            .await?
            .context(GoupNoStableReleaseSnafu)?;
        let result = self.fetch_verified(&file).await;
        if let Err(Error::GoupArchiveVerify { .. }) = &result {
            // NOTE: a bad archive of the advertised size would be reused by the next run
            let archive = self.directories.archive_path(&file.filename);
            if let Err(error) = tokio::fs::remove_file(&archive).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(%archive, %error, "failed to remove archive");
                #[cfg(not(feature = "tracing"))]
                let _ = error;
            }
        }
        result
    }

    /// Installs a local archive without contacting the index.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn unpack(&self, archive: &Utf8Path) -> Result<(), self::Error> {
        let result = self.install_local(archive).await;
        self.clean_up(None).await;
        self.finish(result)
    }

    async fn install_local(&self, archive: &Utf8Path) -> Result<(), self::Error> {
        let metadata = tokio::fs::metadata(archive)
            .await
            .context(TokioFsMetadataSnafu { path: archive })?;
        ensure!(metadata.is_file(), GoupArchiveNotAFileSnafu { path: archive });
        let exists = self.manager().install_dir_exists();
        self.confirm(format!("install {archive} into {}?", self.directories.install_dir()))?;
        self.privileged(self.replace_installation(archive, exists)).await
    }

    /// Deletes the installed toolchain and the links pointing into it.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn remove(&self) -> Result<(), self::Error> {
        self.enter(Stage::Removing);
        let result = self.remove_installation().await;
        self.finish(result)
    }

    async fn remove_installation(&self) -> Result<(), self::Error> {
        let manager = self.manager();
        if !manager.install_dir_exists() {
            // NOTE: surfaces the not-found error without prompting
            return manager.remove_existing().await.context(GoupRemoveSnafu);
        }
        self.confirm(format!("remove {}?", self.directories.install_dir()))?;
        self.privileged(self.unlink_and_remove(&manager)).await
    }

    async fn unlink_and_remove(&self, manager: &InstallationManager<'_, E>) -> Result<(), self::Error> {
        manager
            .unlink(&self.settings.binaries)
            .await
            .context(GoupUnlinkSnafu)?;
        manager.remove_existing().await.context(GoupRemoveSnafu)
    }
}

pub struct GoupBuilder<E, C> {
    settings: Settings,
    executor: E,
    confirm: C,
    logger: GoupLogger,
    client: Option<reqwest::Client>,
}

impl<E, C> GoupBuilder<E, C>
where
    E: PrivilegedExecutor,
    C: Confirm,
{
    #[must_use]
    pub fn executor<E2>(self, executor: E2) -> GoupBuilder<E2, C>
    where
        E2: PrivilegedExecutor,
    {
        GoupBuilder {
            settings: self.settings,
            executor,
            confirm: self.confirm,
            logger: self.logger,
            client: self.client,
        }
    }

    #[must_use]
    pub fn confirm<C2>(self, confirm: C2) -> GoupBuilder<E, C2>
    where
        C2: Confirm,
    {
        GoupBuilder {
            settings: self.settings,
            executor: self.executor,
            confirm,
            logger: self.logger,
            client: self.client,
        }
    }

    #[must_use]
    pub fn logger(mut self, logger: GoupLogger) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<Goup<E, C>, crate::Error> {
        let directories = Directories::new(&self.settings).context(GoupDirectoriesNewSnafu)?;
        let index_url = Url::parse(&self.settings.index_url).context(GoupUrlParseSnafu {
            url: &self.settings.index_url,
        })?;
        let download_url = Url::parse(&self.settings.download_url).context(GoupUrlParseSnafu {
            url: &self.settings.download_url,
        })?;
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .user_agent(concat!("goup/", env!("CARGO_PKG_VERSION")))
                .build()
                .context(ReqwestClientBuildSnafu)?,
        };
        Ok(Goup {
            index: IndexClient::new(client.clone(), index_url),
            fetcher: ArchiveFetcher::new(client, download_url),
            directories,
            executor: self.executor,
            confirm: self.confirm,
            logger: self.logger,
            settings: self.settings,
        })
    }
}
