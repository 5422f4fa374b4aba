//! Target architectures.

/// Architectures served by Alpine and Wolfi repositories.
///
/// The string forms are the directory names used in repository URLs
/// (`{repo}/{arch}/APKINDEX.tar.gz`) and the keys of the releases manifest.
///
/// # Example
///
/// ```
/// use apkroot_schema::Arch;
///
/// let arch: Arch = "amd64".parse().unwrap();
/// assert_eq!(arch.as_str(), "x86_64");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit x86.
    #[default]
    X86_64,
    /// 32-bit x86.
    X86,
    /// 64-bit ARM.
    Aarch64,
    /// 32-bit ARMv7 (hard float, Thumb-2).
    Armv7,
    /// 32-bit ARMv6 hard float.
    Armhf,
    /// Little-endian POWER.
    Ppc64le,
    /// IBM Z.
    S390x,
    /// 64-bit RISC-V.
    Riscv64,
}

impl Arch {
    /// The APK architecture of the running host.
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => Self::X86,
            "aarch64" => Self::Aarch64,
            "arm" => Self::Armv7,
            "powerpc64" => Self::Ppc64le,
            "s390x" => Self::S390x,
            "riscv64" => Self::Riscv64,
            _ => Self::X86_64,
        }
    }

    /// APK string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::X86 => "x86",
            Self::Aarch64 => "aarch64",
            Self::Armv7 => "armv7",
            Self::Armhf => "armhf",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
            Self::Riscv64 => "riscv64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    /// Accepts APK names as well as the Go/Docker spellings (`amd64`, `arm64`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "x86" | "386" | "i386" => Ok(Self::X86),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "armv7" | "arm" => Ok(Self::Armv7),
            "armhf" | "armv6" => Ok(Self::Armhf),
            "ppc64le" => Ok(Self::Ppc64le),
            "s390x" => Ok(Self::S390x),
            "riscv64" => Ok(Self::Riscv64),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}
