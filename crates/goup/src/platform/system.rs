use core::str::FromStr;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GoOs {
    Darwin,
    Freebsd,
    Linux,
    Windows,
}

impl core::fmt::Display for GoOs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let os = match self {
            GoOs::Darwin => "darwin",
            GoOs::Freebsd => "freebsd",
            GoOs::Linux => "linux",
            GoOs::Windows => "windows",
        };
        write!(f, "{os}")
    }
}

impl FromStr for GoOs {
    type Err = super::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "darwin" | "macos" | "osx" => Ok(GoOs::Darwin),
            "freebsd" => Ok(GoOs::Freebsd),
            "linux" => Ok(GoOs::Linux),
            "windows" | "win" => Ok(GoOs::Windows),
            _ => Err(super::Error::PlatformUnknownOs { value: value.to_owned() }),
        }
    }
}
