use core::str::FromStr;
use snafu::prelude::*;

pub use self::{architecture::GoArch, system::GoOs};

use crate::{ErrorKind, ReleaseFile};

mod architecture;
mod system;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unknown operating system {value:?}"))]
    PlatformUnknownOs { value: String },
    #[snafu(display("unknown architecture {value:?}"))]
    PlatformUnknownArch { value: String },
    #[snafu(display("platform {value:?} is not of the form <os>-<arch>"))]
    PlatformMalformed { value: String },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// An `os`/`arch` pair spelled the way the Go download index spells it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Platform {
    pub os: GoOs,
    pub arch: GoArch,
}

impl Platform {
    #[must_use]
    pub fn new(os: GoOs, arch: GoArch) -> Self {
        Self { os, arch }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument)]
    pub fn detect() -> Result<Self, self::Error> {
        let os = std::env::consts::OS.parse()?;
        let arch = if cfg!(all(target_arch = "powerpc64", target_endian = "little")) {
            GoArch::Ppc64le
        } else {
            std::env::consts::ARCH.parse()?
        };
        Ok(Self { os, arch })
    }

    #[must_use]
    pub fn matches(&self, file: &ReleaseFile) -> bool {
        file.os == self.os.to_string() && file.arch == self.arch.to_string()
    }
}

impl core::fmt::Display for Platform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = self::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (os, arch) = value
            .split_once('-')
            .context(PlatformMalformedSnafu { value })?;
        Ok(Self {
            os: os.parse()?,
            arch: arch.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_go_names() {
        assert_eq!("x86_64".parse::<GoArch>().unwrap(), GoArch::Amd64);
        assert_eq!("aarch64".parse::<GoArch>().unwrap(), GoArch::Arm64);
        assert_eq!("i686".parse::<GoArch>().unwrap(), GoArch::I386);
        assert_eq!("macos".parse::<GoOs>().unwrap(), GoOs::Darwin);
        assert_eq!(GoArch::I386.to_string(), "386");
    }

    #[test]
    fn platform_round_trips_through_display() {
        let platform = "linux-amd64".parse::<Platform>().unwrap();
        assert_eq!(platform, Platform::new(GoOs::Linux, GoArch::Amd64));
        assert_eq!(platform.to_string(), "linux-amd64");
        assert_eq!("Darwin-AARCH64".parse::<Platform>().unwrap().to_string(), "darwin-arm64");
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert!(matches!("plan9".parse::<GoOs>(), Err(Error::PlatformUnknownOs { .. })));
        assert!(matches!("sparc".parse::<GoArch>(), Err(Error::PlatformUnknownArch { .. })));
        assert!(matches!("linux".parse::<Platform>(), Err(Error::PlatformMalformed { .. })));
    }
}
