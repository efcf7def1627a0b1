#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::result_large_err)]

use camino::Utf8PathBuf;
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use goup::{Confirm, GoArch, GoOs, Goup, GoupLogger, Platform, Settings, Stage, UpdateOutcome, UpdateRequest, Version};
use snafu::prelude::*;
use std::{io::Write, process::ExitCode};

#[cfg(feature = "tracing")]
use tracing_subscriber::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
    #[cfg(feature = "tracing")]
    #[snafu(display("failed to set up logging"))]
    TracingSubscriberTryInit {
        source: tracing_subscriber::util::TryInitError,
    },
    #[snafu(display("failed to load settings"))]
    GoupSettingsLoad { source: goup::settings::Error },
    #[snafu(display("invalid --version"))]
    GoupVersionParse { source: goup::version::Error },
    #[snafu(display("invalid platform"))]
    GoupPlatform { source: goup::platform::Error },
    #[snafu(display("{source}"))]
    Goup { source: goup::Error },
}

/// Prompts on the terminal unless `--yes` was given.
struct TerminalConfirm {
    assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{prompt} [y/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes" | "Yes" | "YES")
    }
}

fn command() -> Command {
    Command::new("goup")
        .about("Install and update the Go toolchain from the official release index")
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .value_name("VERSION")
                .help("Install this version instead of the newest stable release"),
        )
        .arg(
            Arg::new("os")
                .short('o')
                .long("os")
                .value_name("OS")
                .help("Target operating system [default: this system]"),
        )
        .arg(
            Arg::new("arch")
                .short('a')
                .long("arch")
                .value_name("ARCH")
                .help("Target architecture [default: this machine]"),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .action(ArgAction::SetTrue)
                .help("Do not ask before replacing or removing the installation"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Read settings from FILE"),
        )
        .arg(
            Arg::new("install-dir")
                .long("install-dir")
                .value_name("DIR")
                .help("Where the toolchain lives [default: /usr/local/go]"),
        )
        .arg(
            Arg::new("bin-dir")
                .long("bin-dir")
                .value_name("DIR")
                .help("Where the binary links live [default: /usr/bin]"),
        )
        .arg(
            Arg::new("work-dir")
                .long("work-dir")
                .value_name("DIR")
                .help("Where archives are downloaded and unpacked [default: .]"),
        )
        .arg(
            Arg::new("index-url")
                .long("index-url")
                .value_name("URL")
                .help("Release index to query [default: https://go.dev/dl/]"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log every step"),
        )
        .arg(
            Arg::new("download-only")
                .long("download-only")
                .action(ArgAction::SetTrue)
                .help("Download and verify the archive, then stop"),
        )
        .arg(
            Arg::new("unpack")
                .long("unpack")
                .value_name("ARCHIVE")
                .conflicts_with_all(["version", "os", "arch"])
                .help("Install from a local archive"),
        )
        .arg(
            Arg::new("remove")
                .long("remove")
                .action(ArgAction::SetTrue)
                .help("Remove the installed toolchain"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List every published version"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Report whether a newer stable release exists"),
        )
        .arg(
            Arg::new("current")
                .long("current")
                .action(ArgAction::SetTrue)
                .help("Print the installed version"),
        )
        .group(
            ArgGroup::new("mode")
                .args(["download-only", "unpack", "remove", "list", "check", "current"])
                .multiple(false),
        )
}

async fn settings(matches: &ArgMatches) -> Result<Settings, self::Error> {
    let config = matches.get_one::<String>("config").map(Utf8PathBuf::from);
    let mut settings = Settings::load(config.as_deref())
        .await
        .context(GoupSettingsLoadSnafu)?;
    if let Some(dir) = matches.get_one::<String>("install-dir") {
        settings.install_dir = dir.into();
    }
    if let Some(dir) = matches.get_one::<String>("bin-dir") {
        settings.bin_dir = dir.into();
    }
    if let Some(dir) = matches.get_one::<String>("work-dir") {
        settings.work_dir = dir.into();
    }
    if let Some(url) = matches.get_one::<String>("index-url") {
        settings.index_url = url.clone();
    }
    Ok(settings)
}

fn platform(matches: &ArgMatches) -> Result<Platform, self::Error> {
    let os = matches
        .get_one::<String>("os")
        .map(|os| os.parse::<GoOs>())
        .transpose()
        .context(GoupPlatformSnafu)?;
    let arch = matches
        .get_one::<String>("arch")
        .map(|arch| arch.parse::<GoArch>())
        .transpose()
        .context(GoupPlatformSnafu)?;
    match (os, arch) {
        (Some(os), Some(arch)) => Ok(Platform::new(os, arch)),
        (os, arch) => {
            let detected = Platform::detect().context(GoupPlatformSnafu)?;
            Ok(Platform::new(
                os.unwrap_or(detected.os),
                arch.unwrap_or(detected.arch),
            ))
        },
    }
}

async fn run(matches: &ArgMatches) -> Result<(), self::Error> {
    let settings = settings(matches).await?;

    #[cfg(feature = "console")]
    let logger = GoupLogger::Console;
    #[cfg(not(feature = "console"))]
    let logger = GoupLogger::Plain;

    let confirm = TerminalConfirm {
        assume_yes: matches.get_flag("yes"),
    };
    let goup = Goup::builder(settings)
        .confirm(confirm)
        .logger(logger)
        .build()
        .context(GoupSnafu)?;

    if matches.get_flag("current") {
        match goup.installed().await.context(GoupSnafu)? {
            Some(installed) => println!("{} ({})", installed.version, installed.install_dir),
            None => println!("no toolchain installed in {}", goup.directories().install_dir()),
        }
        return Ok(());
    }

    if matches.get_flag("list") {
        for release in goup.list_versions().await.context(GoupSnafu)? {
            if release.stable {
                println!("{}", release.version);
            } else {
                println!("{} (unstable)", release.version);
            }
        }
        return Ok(());
    }

    if matches.get_flag("check") {
        let check = goup.check_update().await.context(GoupSnafu)?;
        match (check.installed, check.available) {
            (Some(installed), Some(available)) => println!("update available: {installed} -> {available}"),
            (None, Some(available)) => println!("not installed, newest stable is {available}"),
            (Some(installed), None) => println!("Already on version {installed}"),
            (None, None) => println!("not installed, no stable release found"),
        }
        return Ok(());
    }

    if matches.get_flag("remove") {
        goup.remove().await.context(GoupSnafu)?;
        println!("removed {}", goup.directories().install_dir());
        return Ok(());
    }

    if let Some(archive) = matches.get_one::<String>("unpack") {
        goup.unpack(&Utf8PathBuf::from(archive)).await.context(GoupSnafu)?;
        println!("installed {archive} into {}", goup.directories().install_dir());
        return Ok(());
    }

    let version = matches
        .get_one::<String>("version")
        .map(|version| version.parse::<Version>())
        .transpose()
        .context(GoupVersionParseSnafu)?;
    let request = UpdateRequest {
        version,
        platform: platform(matches)?,
    };

    if matches.get_flag("download-only") {
        let archive = goup.download(&request).await.context(GoupSnafu)?;
        println!("downloaded {archive}");
        return Ok(());
    }

    match goup.update(&request).await.context(GoupSnafu)? {
        UpdateOutcome::AlreadyCurrent(version) => println!("Already on version {version}"),
        UpdateOutcome::Installed {
            version,
            previous: Some(previous),
        } => println!("updated {previous} -> {version}"),
        UpdateOutcome::Installed { version, previous: None } => println!("installed {version}"),
    }
    Ok(())
}

fn report(error: &Error) {
    eprintln!("error: {error}");
    let mut source = std::error::Error::source(error);
    if let Error::Goup { source: inner } = error {
        // NOTE: the wrapper already printed the inner message
        source = std::error::Error::source(inner);
    }
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
    if let Error::Goup { source } = error {
        if let Some(stage) = source.stage() {
            if (Stage::Removing..=Stage::Relinking).contains(&stage) {
                eprintln!("warning: failed while {stage}; the previous installation may be gone");
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = command().get_matches();

    #[cfg(feature = "tracing")]
    {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directive = if matches.get_flag("verbose") { "goup=debug" } else { "warn" };
            tracing_subscriber::EnvFilter::new(directive)
        });
        let init = tracing_subscriber::registry()
            .with(tracing_forest::ForestLayer::default())
            .with(filter)
            .try_init()
            .context(TracingSubscriberTryInitSnafu);
        if let Err(error) = init {
            report(&error);
            return ExitCode::FAILURE;
        }
    }

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn modes_are_exclusive() {
        let result = command().try_get_matches_from(["goup", "--list", "--remove"]);
        assert!(result.is_err());
    }

    #[test]
    fn unpack_rejects_release_selection() {
        for flag in ["-v", "-o", "-a"] {
            let result = command().try_get_matches_from(["goup", "--unpack", "go.tar.gz", flag, "x"]);
            assert!(result.is_err(), "{flag}");
        }
        assert!(command().try_get_matches_from(["goup", "--unpack", "go.tar.gz", "-y"]).is_ok());
    }

    #[test]
    fn short_flags_parse() {
        let matches = command()
            .try_get_matches_from(["goup", "-v", "go1.21.0", "-o", "linux", "-a", "arm64", "-y"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("version").unwrap(), "go1.21.0");
        assert!(matches.get_flag("yes"));
        let platform = platform(&matches).unwrap();
        assert_eq!(platform, Platform::new(GoOs::Linux, GoArch::Arm64));
    }
}
