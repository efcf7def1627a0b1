use core::str::FromStr;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GoArch {
    Amd64,
    Arm64,
    Armv6l,
    I386,
    Loong64,
    Ppc64le,
    Riscv64,
    S390x,
}

impl core::fmt::Display for GoArch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let arch = match self {
            GoArch::Amd64 => "amd64",
            GoArch::Arm64 => "arm64",
            GoArch::Armv6l => "armv6l",
            GoArch::I386 => "386",
            GoArch::Loong64 => "loong64",
            GoArch::Ppc64le => "ppc64le",
            GoArch::Riscv64 => "riscv64",
            GoArch::S390x => "s390x",
        };
        write!(f, "{arch}")
    }
}

impl FromStr for GoArch {
    type Err = super::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" | "x64" => Ok(GoArch::Amd64),
            "arm64" | "aarch64" => Ok(GoArch::Arm64),
            "armv6l" | "arm" | "armv7" | "armv7l" => Ok(GoArch::Armv6l),
            "386" | "i386" | "i686" | "x86" => Ok(GoArch::I386),
            "loong64" | "loongarch64" => Ok(GoArch::Loong64),
            "ppc64le" | "powerpc64le" => Ok(GoArch::Ppc64le),
            "riscv64" => Ok(GoArch::Riscv64),
            "s390x" => Ok(GoArch::S390x),
            _ => Err(super::Error::PlatformUnknownArch { value: value.to_owned() }),
        }
    }
}
