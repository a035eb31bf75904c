//! Platform descriptors.
//!
//! One immutable descriptor per supported operating system. Descriptors are
//! static data: `Os::descriptor` always hands out the same `&'static`
//! instance for a given platform.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};

/// Operating-system family a platform belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OsFamily {
    Linux,
    Darwin,
    /// Embedded game-console OS without a local launch path.
    Horizon,
}

/// Binary container produced by the platform's linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryFormat {
    Elf,
    MachO,
}

/// Immutable facts about one operating system.
#[derive(Debug, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// Stable symbolic name (e.g., "linux", "switch").
    pub id: &'static str,
    /// Name used in the native toolchain target triple (e.g., "macosx10.9.0").
    pub toolchain_name: &'static str,
    /// Minimum supported OS version.
    pub minimum_version: &'static str,
    pub family: OsFamily,
    pub binary_format: BinaryFormat,
}

static LINUX: PlatformDescriptor = PlatformDescriptor {
    id: "linux",
    toolchain_name: "linux",
    minimum_version: "linux",
    family: OsFamily::Linux,
    binary_format: BinaryFormat::Elf,
};

static MACOSX: PlatformDescriptor = PlatformDescriptor {
    id: "macosx",
    toolchain_name: "macosx10.9.0",
    minimum_version: "10.9",
    family: OsFamily::Darwin,
    binary_format: BinaryFormat::MachO,
};

static IOS: PlatformDescriptor = PlatformDescriptor {
    id: "ios",
    toolchain_name: "ios7.0.0",
    minimum_version: "7.0",
    family: OsFamily::Darwin,
    binary_format: BinaryFormat::MachO,
};

static HORIZON: PlatformDescriptor = PlatformDescriptor {
    id: "switch",
    toolchain_name: "horizon",
    minimum_version: "horizon",
    family: OsFamily::Horizon,
    binary_format: BinaryFormat::Elf,
};

/// A supported operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    #[serde(rename = "linux")]
    Linux,
    #[serde(rename = "macosx")]
    MacOsX,
    #[serde(rename = "ios")]
    Ios,
    #[serde(rename = "switch", alias = "horizon")]
    Horizon,
}

impl Os {
    /// All known platforms, in declaration order.
    pub const ALL: [Os; 4] = [Os::Linux, Os::MacOsX, Os::Ios, Os::Horizon];

    /// The static descriptor for this platform.
    pub fn descriptor(self) -> &'static PlatformDescriptor {
        match self {
            Os::Linux => &LINUX,
            Os::MacOsX => &MACOSX,
            Os::Ios => &IOS,
            Os::Horizon => &HORIZON,
        }
    }

    pub fn id(self) -> &'static str {
        self.descriptor().id
    }

    pub fn toolchain_name(self) -> &'static str {
        self.descriptor().toolchain_name
    }

    pub fn minimum_version(self) -> &'static str {
        self.descriptor().minimum_version
    }

    pub fn family(self) -> OsFamily {
        self.descriptor().family
    }

    /// Look up a platform by id. `horizon` is accepted as an alias of `switch`.
    pub fn from_id(id: &str) -> Result<Self> {
        match id {
            "linux" => Ok(Os::Linux),
            "macosx" => Ok(Os::MacOsX),
            "ios" => Ok(Os::Ios),
            "switch" | "horizon" => Ok(Os::Horizon),
            other => Err(TargetError::UnknownPlatform { id: other.into() }),
        }
    }

    /// Pick the platform matching a host toolchain triple.
    ///
    /// There is no sane fallback for an unrecognized host, so anything other
    /// than a Linux or Apple triple is an error.
    pub fn resolve_default(host_triple: &str) -> Result<Self> {
        if host_triple.contains("linux") {
            return Ok(Os::Linux);
        }
        if host_triple.contains("darwin") || host_triple.contains("apple") {
            return Ok(Os::MacOsX);
        }
        Err(TargetError::UnsupportedHost {
            triple: host_triple.into(),
        })
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Os {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self> {
        Os::from_id(s)
    }
}
