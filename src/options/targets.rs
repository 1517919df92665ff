//! Target platforms and architectures.
//!
//! A [`Target`] is one (platform, arch) pair. Only the official combinations
//! returned by [`Platform::official_arches`] are packaged; everything else is
//! skipped with a warning by the packager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system family a bundle is produced for.
///
/// `Mas` is the Mac App Store flavor of `Darwin`: it shares the mac
/// customizer and differs only in the platform passed to the signer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// macOS, distributed outside the App Store.
    Darwin,
    /// macOS, Mac App Store build.
    Mas,
    /// Linux.
    Linux,
    /// Windows.
    Win32,
}

impl Platform {
    /// Every supported platform, in packaging order.
    pub const ALL: [Platform; 4] = [
        Platform::Darwin,
        Platform::Linux,
        Platform::Mas,
        Platform::Win32,
    ];

    /// Returns the canonical lowercase name used in output directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Darwin => "darwin",
            Platform::Mas => "mas",
            Platform::Linux => "linux",
            Platform::Win32 => "win32",
        }
    }

    /// Returns whether this platform produces a mac `.app` bundle.
    pub fn is_mac(&self) -> bool {
        matches!(self, Platform::Darwin | Platform::Mas)
    }

    /// Architectures the runtime is officially distributed for on this platform.
    pub fn official_arches(&self) -> &'static [Arch] {
        match self {
            Platform::Darwin | Platform::Mas => &[Arch::X64, Arch::Arm64],
            Platform::Linux => &[
                Arch::Ia32,
                Arch::X64,
                Arch::Armv7l,
                Arch::Arm64,
                Arch::Mips64el,
            ],
            Platform::Win32 => &[Arch::Ia32, Arch::X64, Arch::Arm64],
        }
    }

    /// Returns the platform of the running host, if it is a supported one.
    pub fn host() -> Option<Platform> {
        match std::env::consts::OS {
            "macos" => Some(Platform::Darwin),
            "linux" => Some(Platform::Linux),
            "windows" => Some(Platform::Win32),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "darwin" | "mac" | "macos" | "osx" => Ok(Platform::Darwin),
            "mas" => Ok(Platform::Mas),
            "linux" => Ok(Platform::Linux),
            "win32" | "windows" | "win" => Ok(Platform::Win32),
            other => Err(format!("unsupported platform '{other}'")),
        }
    }
}

/// CPU architecture of the runtime template.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 32-bit x86.
    Ia32,
    /// 64-bit x86.
    X64,
    /// 32-bit ARM (hard float).
    Armv7l,
    /// 64-bit ARM.
    Arm64,
    /// 64-bit little-endian MIPS.
    Mips64el,
}

impl Arch {
    /// Every supported architecture.
    pub const ALL: [Arch; 5] = [Arch::Ia32, Arch::X64, Arch::Armv7l, Arch::Arm64, Arch::Mips64el];

    /// Returns the canonical lowercase name used in output directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Ia32 => "ia32",
            Arch::X64 => "x64",
            Arch::Armv7l => "armv7l",
            Arch::Arm64 => "arm64",
            Arch::Mips64el => "mips64el",
        }
    }

    /// Returns the architecture of the running host, if it is a supported one.
    pub fn host() -> Option<Arch> {
        std::env::consts::ARCH.parse().ok()
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ia32" | "x86" | "i686" | "i386" => Ok(Arch::Ia32),
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            "armv7l" | "arm" | "armhf" => Ok(Arch::Armv7l),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            "mips64el" | "mips64" => Ok(Arch::Mips64el),
            other => Err(format!("unsupported architecture '{other}'")),
        }
    }
}

/// One (platform, arch) pair to package.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Target {
    /// Target platform.
    pub platform: Platform,
    /// Target architecture.
    pub arch: Arch,
}

impl Target {
    /// Creates a target.
    pub fn new(platform: Platform, arch: Arch) -> Self {
        Self { platform, arch }
    }

    /// Returns whether this pair is an official runtime distribution.
    pub fn is_official(&self) -> bool {
        self.platform.official_arches().contains(&self.arch)
    }

    /// Deterministic bundle directory name: `<name>-<platform>-<arch>`.
    pub fn basename(&self, name: &str) -> String {
        format!("{}-{}-{}", name, self.platform, self.arch)
    }

    /// Every official (platform, arch) pair.
    pub fn official() -> Vec<Target> {
        Platform::ALL
            .iter()
            .flat_map(|platform| {
                platform
                    .official_arches()
                    .iter()
                    .map(|arch| Target::new(*platform, *arch))
            })
            .collect()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform, self.arch)
    }
}

/// Expands platform and arch lists into targets.
///
/// Returns `(official, skipped)`: the cross product split into the pairs that
/// will be packaged and the pairs that have no official runtime distribution.
/// Duplicates are removed; order follows the input lists.
pub fn expand_targets(platforms: &[Platform], arches: &[Arch]) -> (Vec<Target>, Vec<Target>) {
    let mut official = Vec::new();
    let mut skipped = Vec::new();

    for platform in platforms {
        for arch in arches {
            let target = Target::new(*platform, *arch);
            let bucket = if target.is_official() {
                &mut official
            } else {
                &mut skipped
            };
            if !bucket.contains(&target) {
                bucket.push(target);
            }
        }
    }

    (official, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        let target = Target::new(Platform::Win32, Arch::X64);
        assert_eq!(target.basename("Foo"), "Foo-win32-x64");
    }

    #[test]
    fn test_expand_skips_unofficial_pairs() {
        let (official, skipped) = expand_targets(
            &[Platform::Darwin, Platform::Win32],
            &[Arch::X64, Arch::Mips64el],
        );
        assert_eq!(
            official,
            vec![
                Target::new(Platform::Darwin, Arch::X64),
                Target::new(Platform::Win32, Arch::X64)
            ]
        );
        assert_eq!(skipped.len(), 2);
    }

    #[test]
    fn test_aliases() {
        assert_eq!("macos".parse::<Platform>(), Ok(Platform::Darwin));
        assert_eq!("aarch64".parse::<Arch>(), Ok(Arch::Arm64));
        assert!("plan9".parse::<Platform>().is_err());
    }

    #[test]
    fn test_official_count() {
        assert_eq!(Target::official().len(), 2 + 5 + 2 + 3);
    }
}
