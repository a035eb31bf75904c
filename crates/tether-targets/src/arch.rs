//! Architecture descriptors.
//!
//! ABI-relevant facts about each supported CPU architecture: word size,
//! byte order, calling convention, and the names the toolchain uses for it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};

/// Byte ordering of the target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endianness {
    Little,
    Big,
}

/// Immutable facts about one CPU architecture.
#[derive(Debug, PartialEq, Eq)]
pub struct ArchDescriptor {
    /// Stable symbolic name (e.g., "x86_64", "thumbv7").
    pub id: &'static str,
    /// Architecture component of the LLVM target triple.
    pub toolchain_name: &'static str,
    /// Value passed to `clang -arch` on Darwin.
    pub clang_arch: &'static str,
    /// Native word size in bits.
    pub word_size: u32,
    pub endianness: Endianness,
    /// Calling convention used for native calls (e.g., "AAPCS64").
    pub abi: &'static str,
}

impl ArchDescriptor {
    /// Word size in bytes.
    pub fn word_bytes(&self) -> u32 {
        self.word_size / 8
    }
}

static X86: ArchDescriptor = ArchDescriptor {
    id: "x86",
    toolchain_name: "i386",
    clang_arch: "i386",
    word_size: 32,
    endianness: Endianness::Little,
    abi: "System V i386",
};

static X86_64: ArchDescriptor = ArchDescriptor {
    id: "x86_64",
    toolchain_name: "x86_64",
    clang_arch: "x86_64",
    word_size: 64,
    endianness: Endianness::Little,
    abi: "System V AMD64",
};

static THUMBV7: ArchDescriptor = ArchDescriptor {
    id: "thumbv7",
    toolchain_name: "thumbv7",
    clang_arch: "armv7",
    word_size: 32,
    endianness: Endianness::Little,
    abi: "AAPCS",
};

static ARM64: ArchDescriptor = ArchDescriptor {
    id: "arm64",
    toolchain_name: "arm64",
    clang_arch: "arm64",
    word_size: 64,
    endianness: Endianness::Little,
    abi: "AAPCS64",
};

/// A supported CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "thumbv7")]
    Thumbv7,
    #[serde(rename = "arm64", alias = "aarch64")]
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::X86, Arch::X86_64, Arch::Thumbv7, Arch::Arm64];

    /// The static descriptor for this architecture.
    pub fn descriptor(self) -> &'static ArchDescriptor {
        match self {
            Arch::X86 => &X86,
            Arch::X86_64 => &X86_64,
            Arch::Thumbv7 => &THUMBV7,
            Arch::Arm64 => &ARM64,
        }
    }

    pub fn id(self) -> &'static str {
        self.descriptor().id
    }

    pub fn toolchain_name(self) -> &'static str {
        self.descriptor().toolchain_name
    }

    pub fn clang_arch(self) -> &'static str {
        self.descriptor().clang_arch
    }

    pub fn is_64_bit(self) -> bool {
        self.descriptor().word_size == 64
    }

    /// Look up an architecture by id. `aarch64` is accepted for `arm64`.
    pub fn from_id(id: &str) -> Result<Self> {
        match id {
            "x86" | "i386" => Ok(Arch::X86),
            "x86_64" => Ok(Arch::X86_64),
            "thumbv7" => Ok(Arch::Thumbv7),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(TargetError::UnknownArch { id: other.into() }),
        }
    }

    /// The architecture of the machine running this process, if supported.
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86" => Some(Arch::X86),
            "x86_64" => Some(Arch::X86_64),
            "arm" => Some(Arch::Thumbv7),
            "aarch64" => Some(Arch::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Arch {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self> {
        Arch::from_id(s)
    }
}
