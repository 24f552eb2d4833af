//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// The top-level runtime configuration parsed from `kiln.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// In-memory and persistent cache settings.
    pub cache: CacheConfig,
    /// Compile-mode flags.
    pub compile: CompileConfig,
    /// Installer selection and rotation policy.
    pub installer: InstallerConfig,
}

impl RuntimeConfig {
    /// Returns `true` if the persistent code store is enabled.
    pub fn persistence_enabled(&self) -> bool {
        self.cache.persistent
    }
}

/// Cache tier settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of artifacts held by the in-memory cache. `0` disables it.
    pub memory_capacity: usize,
    /// Whether compiled artifacts are persisted to disk.
    pub persistent: bool,
    /// Root directory of the persistent store.
    pub directory: PathBuf,
    /// Sources shorter than this many bytes are never persisted.
    pub min_persist_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 50,
            persistent: false,
            directory: PathBuf::from(".kiln-cache"),
            min_persist_size: 1000,
        }
    }
}

/// Flags that change how sources are compiled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Compile nested functions lazily, on first invocation.
    pub lazy: bool,
    /// Generate code with optimistic type assumptions.
    pub optimistic_types: bool,
    /// Compile every source in strict mode.
    pub strict: bool,
    /// Run the verifier over generated code before installing it.
    pub verify_code: bool,
    /// Use a fresh loader for every compile instead of rotating a shared one.
    pub loader_per_compile: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            lazy: true,
            optimistic_types: false,
            strict: false,
            verify_code: false,
            loader_per_compile: false,
        }
    }
}

/// When the lightweight isolated installer may be used.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Isolate sources up to [`InstallerConfig::isolation_threshold`] bytes (default).
    #[default]
    Auto,
    /// Isolate whenever the other policy rules allow it.
    Always,
    /// Never isolate.
    Never,
}

/// Installer selection and reuse bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Isolation policy.
    pub isolation: IsolationMode,
    /// Largest source (in bytes) isolated under [`IsolationMode::Auto`].
    pub isolation_threshold: usize,
    /// Units a reusable installer may define before it is replaced.
    pub max_uses: u32,
    /// Code bytes a reusable installer may define before it is replaced.
    pub max_bytes: usize,
}

impl InstallerConfig {
    /// Returns `true` if a source of `length` bytes may be isolated.
    pub fn allows_isolation(&self, length: usize) -> bool {
        match self.isolation {
            IsolationMode::Always => true,
            IsolationMode::Never => false,
            IsolationMode::Auto => length <= self.isolation_threshold,
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::Auto,
            isolation_threshold: 512,
            max_uses: 10,
            max_bytes: 200_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_calibration() {
        let config = RuntimeConfig::default();
        assert_eq!(config.cache.memory_capacity, 50);
        assert_eq!(config.cache.min_persist_size, 1000);
        assert!(!config.persistence_enabled());
        assert!(config.compile.lazy);
        assert_eq!(config.installer.max_uses, 10);
        assert_eq!(config.installer.max_bytes, 200_000);
        assert_eq!(config.installer.isolation, IsolationMode::Auto);
    }

    #[test]
    fn auto_isolation_respects_threshold() {
        let installer = InstallerConfig::default();
        assert!(installer.allows_isolation(512));
        assert!(!installer.allows_isolation(513));
    }

    #[test]
    fn forced_isolation_modes() {
        let always = InstallerConfig {
            isolation: IsolationMode::Always,
            ..InstallerConfig::default()
        };
        let never = InstallerConfig {
            isolation: IsolationMode::Never,
            ..InstallerConfig::default()
        };
        assert!(always.allows_isolation(usize::MAX));
        assert!(!never.allows_isolation(0));
    }
}
