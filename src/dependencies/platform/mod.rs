// Platform detection for the native LanceDB driver packages

#[cfg(test)]
mod tests;

use crate::{CodeIndexError, Result};

/// C library flavor, only meaningful on Linux
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Libc {
    Gnu,
    Musl,
}

impl Libc {
    #[inline]
    pub fn current() -> Self {
        if cfg!(target_env = "musl") {
            Self::Musl
        } else {
            Self::Gnu
        }
    }
}

/// Every platform a prebuilt driver package exists for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    DarwinX64,
    DarwinArm64,
    LinuxX64Gnu,
    LinuxX64Musl,
    LinuxArm64Gnu,
    LinuxArm64Musl,
    Win32X64Msvc,
    Win32Arm64Msvc,
}

impl Target {
    /// Target of the running process
    #[inline]
    pub fn current() -> Result<Self> {
        Self::detect(std::env::consts::OS, std::env::consts::ARCH, Libc::current())
    }

    /// Map an `(os, arch, libc)` triple as reported by `std::env::consts`
    #[inline]
    pub fn detect(os: &str, arch: &str, libc: Libc) -> Result<Self> {
        let target = match (os, arch, libc) {
            ("macos", "x86_64", _) => Self::DarwinX64,
            ("macos", "aarch64", _) => Self::DarwinArm64,
            ("linux", "x86_64", Libc::Gnu) => Self::LinuxX64Gnu,
            ("linux", "x86_64", Libc::Musl) => Self::LinuxX64Musl,
            ("linux", "aarch64", Libc::Gnu) => Self::LinuxArm64Gnu,
            ("linux", "aarch64", Libc::Musl) => Self::LinuxArm64Musl,
            ("windows", "x86_64", _) => Self::Win32X64Msvc,
            ("windows", "aarch64", _) => Self::Win32Arm64Msvc,
            _ => {
                return Err(CodeIndexError::Platform(format!(
                    "no LanceDB driver build for {}/{} ({:?})",
                    os, arch, libc
                )));
            }
        };
        Ok(target)
    }

    /// Platform suffix shared by the package and binary names
    #[inline]
    pub fn triple(self) -> &'static str {
        match self {
            Self::DarwinX64 => "darwin-x64",
            Self::DarwinArm64 => "darwin-arm64",
            Self::LinuxX64Gnu => "linux-x64-gnu",
            Self::LinuxX64Musl => "linux-x64-musl",
            Self::LinuxArm64Gnu => "linux-arm64-gnu",
            Self::LinuxArm64Musl => "linux-arm64-musl",
            Self::Win32X64Msvc => "win32-x64-msvc",
            Self::Win32Arm64Msvc => "win32-arm64-msvc",
        }
    }

    /// e.g. `@lancedb/lancedb-linux-x64-gnu`
    #[inline]
    pub fn package_name(self) -> String {
        format!("@lancedb/lancedb-{}", self.triple())
    }

    /// e.g. `lancedb.linux-x64-gnu.node`
    #[inline]
    pub fn binary_name(self) -> String {
        format!("lancedb.{}.node", self.triple())
    }
}
