//! Build configuration (`build.toml`).
//!
//! Every field is optional. Platform and architecture defaults belong to the
//! target, not to the configuration, so they stay `None` until a target
//! fills them in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::arch::Arch;
use crate::error::{Result, TargetError};
use crate::os::Os;

/// Default devkitPro installation root used by console builds.
pub const DEFAULT_VENDOR_SDK: &str = "/opt/devkitpro";

/// Environment variable that overrides the vendor SDK location.
pub const VENDOR_SDK_ENV: &str = "DEVKITPRO";

/// Configuration for one build invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Target type id (e.g., "linux", "darwin", "console"). Derived from the
    /// host when absent.
    #[serde(default)]
    pub target: Option<String>,
    /// Platform to build for.
    #[serde(default)]
    pub platform: Option<Os>,
    /// Architecture to build for.
    #[serde(default)]
    pub arch: Option<Arch>,
    /// Library search paths, in order.
    #[serde(default)]
    pub library_paths: Vec<PathBuf>,
    /// Libraries to link against.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Linker driver.
    #[serde(default = "default_cc")]
    pub cc: PathBuf,
    /// Extra arguments passed to the linker driver.
    #[serde(default)]
    pub cc_args: Vec<String>,
    /// Directory the archive step copies artifacts into.
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    /// File name of the linked executable.
    #[serde(default = "default_executable_name")]
    pub executable_name: String,
    /// Vendor SDK root for console builds.
    #[serde(default)]
    pub vendor_sdk: Option<PathBuf>,
}

fn default_cc() -> PathBuf {
    PathBuf::from("cc")
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("install")
}

fn default_executable_name() -> String {
    "a.out".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            target: None,
            platform: None,
            arch: None,
            library_paths: Vec::new(),
            libraries: Vec::new(),
            cc: default_cc(),
            cc_args: Vec::new(),
            install_dir: default_install_dir(),
            executable_name: default_executable_name(),
            vendor_sdk: None,
        }
    }
}

impl BuildConfig {
    /// Parse a configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self> {
        let config: BuildConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Load a configuration file. Relative paths inside it are resolved
    /// against the directory containing the file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TargetError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for lib_path in &mut self.library_paths {
            if lib_path.is_relative() {
                *lib_path = base.join(&*lib_path);
            }
        }
        if self.install_dir.is_relative() {
            self.install_dir = base.join(&self.install_dir);
        }
        if let Some(sdk) = &mut self.vendor_sdk {
            if sdk.is_relative() {
                *sdk = base.join(&*sdk);
            }
        }
    }

    /// Vendor SDK root: configuration first, then `$DEVKITPRO`, then the
    /// conventional install location.
    pub fn vendor_sdk_root(&self) -> PathBuf {
        if let Some(sdk) = &self.vendor_sdk {
            return sdk.clone();
        }
        match std::env::var_os(VENDOR_SDK_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(DEFAULT_VENDOR_SDK),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml = r#"
target = "console"
platform = "switch"
arch = "arm64"
library-paths = ["/opt/mylibs"]
libraries = ["m", "pthread"]
cc = "clang"
cc-args = ["-O2"]
install-dir = "out"
executable-name = "game"
vendor-sdk = "/sdk"
"#;
        let config = BuildConfig::parse(toml).unwrap();
        assert_eq!(config.target.as_deref(), Some("console"));
        assert_eq!(config.platform, Some(Os::Horizon));
        assert_eq!(config.arch, Some(Arch::Arm64));
        assert_eq!(config.library_paths, vec![PathBuf::from("/opt/mylibs")]);
        assert_eq!(config.libraries, vec!["m", "pthread"]);
        assert_eq!(config.cc, PathBuf::from("clang"));
        assert_eq!(config.executable_name, "game");
        assert_eq!(config.vendor_sdk_root(), PathBuf::from("/sdk"));
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = BuildConfig::parse("").unwrap();
        assert_eq!(config, BuildConfig::default());
        assert!(config.platform.is_none());
        assert!(config.arch.is_none());
        assert_eq!(config.cc, PathBuf::from("cc"));
    }

    #[test]
    fn unknown_platform_is_rejected() {
        assert!(BuildConfig::parse("platform = \"beos\"").is_err());
    }

    #[test]
    fn load_rebases_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.toml");
        std::fs::write(
            &path,
            "library-paths = [\"lib\", \"/abs\"]\ninstall-dir = \"dist\"\n",
        )
        .unwrap();
        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.library_paths[0], dir.path().join("lib"));
        assert_eq!(config.library_paths[1], PathBuf::from("/abs"));
        assert_eq!(config.install_dir, dir.path().join("dist"));
    }

    #[test]
    fn load_missing_file() {
        let err = BuildConfig::load(Path::new("/nonexistent/build.toml")).unwrap_err();
        assert!(matches!(err, TargetError::NotFound { .. }));
    }
}
