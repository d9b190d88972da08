//! dynimport Configuration
//!
//! Handles parsing and management of `dynimport.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ffi::{default_dlopen_flags, parse_dlopen_flag};
use crate::interpreter::InterpreterConfig;
use crate::runtime::RuntimeConfig;

/// Name of the configuration file searched for.
pub const CONFIG_FILE_NAME: &str = "dynimport.toml";

/// Environment variable overriding `frozen.use_frozen_modules`.
pub const FROZEN_MODULES_ENV: &str = "DYNIMPORT_FROZEN_MODULES";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching dynimport.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DynImportConfig {
    /// Process-wide runtime settings
    #[serde(default)]
    pub runtime: RuntimeSection,

    /// Frozen module settings
    #[serde(default)]
    pub frozen: FrozenSection,

    /// Defaults for new interpreters
    #[serde(default)]
    pub interpreters: InterpretersSection,

    /// Where dynamic extensions are looked for
    #[serde(default)]
    pub extensions: ExtensionsSection,
}

impl DynImportConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: DynImportConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Ok(value) = std::env::var(FROZEN_MODULES_ENV) {
            self.apply_frozen_override(&value)?;
        }
        Ok(())
    }

    /// Apply a `DYNIMPORT_FROZEN_MODULES` value (`on` or `off`).
    pub fn apply_frozen_override(&mut self, value: &str) -> ConfigResult<()> {
        self.frozen.use_frozen_modules = match value.trim().to_ascii_lowercase().as_str() {
            "on" | "1" | "true" => true,
            "off" | "0" | "false" => false,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: FROZEN_MODULES_ENV.to_string(),
                    value: value.to_string(),
                })
            }
        };
        Ok(())
    }

    /// Combined `dlopen` flags for new interpreters.
    pub fn dlopen_flags(&self) -> ConfigResult<i32> {
        if self.interpreters.dlopen_flags.is_empty() {
            return Ok(default_dlopen_flags());
        }
        self.interpreters
            .dlopen_flags
            .iter()
            .try_fold(0, |flags, name| {
                parse_dlopen_flag(name)
                    .map(|flag| flags | flag)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "interpreters.dlopen_flags".to_string(),
                        value: name.clone(),
                    })
            })
    }

    /// Settings the runtime is built from.
    pub fn runtime_config(&self) -> ConfigResult<RuntimeConfig> {
        let dlopen_flags = self.dlopen_flags()?;
        let main = InterpreterConfig {
            use_frozen_modules: self.frozen.use_frozen_modules,
            dlopen_flags,
            verbose: self.runtime.verbose,
            ..InterpreterConfig::main()
        };
        let subinterpreter = InterpreterConfig {
            use_frozen_modules: self.frozen.use_frozen_modules,
            check_multi_interp_extensions: self.interpreters.check_multi_interp_extensions,
            own_gil: self.interpreters.own_gil,
            dlopen_flags,
            verbose: self.runtime.verbose,
        };
        Ok(RuntimeConfig {
            free_threaded: self.runtime.free_threaded,
            warnings_as_errors: self.runtime.warnings_as_errors,
            search_paths: self.extensions.search_paths.clone(),
            main,
            subinterpreter,
        })
    }
}

/// `[runtime]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeSection {
    /// Model a runtime whose GIL can be disabled
    #[serde(default = "default_free_threaded")]
    pub free_threaded: bool,

    /// Log cache reuse and GIL decisions at info level
    #[serde(default)]
    pub verbose: bool,

    /// Turn runtime warnings into errors
    #[serde(default)]
    pub warnings_as_errors: bool,
}

fn default_free_threaded() -> bool {
    cfg!(feature = "free-threaded")
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            free_threaded: default_free_threaded(),
            verbose: false,
            warnings_as_errors: false,
        }
    }
}

/// `[frozen]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrozenSection {
    /// Enable the standard and test frozen sets
    #[serde(default = "default_true")]
    pub use_frozen_modules: bool,
}

impl Default for FrozenSection {
    fn default() -> Self {
        Self {
            use_frozen_modules: true,
        }
    }
}

/// `[interpreters]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterpretersSection {
    /// Refuse legacy single-phase extensions in subinterpreters
    #[serde(default = "default_true")]
    pub check_multi_interp_extensions: bool,

    /// Subinterpreters get their own GIL
    #[serde(default = "default_true")]
    pub own_gil: bool,

    /// `dlopen` flag names (`"now"`, `"global"`, ...); empty means the default
    #[serde(default)]
    pub dlopen_flags: Vec<String>,
}

impl Default for InterpretersSection {
    fn default() -> Self {
        Self {
            check_multi_interp_extensions: true,
            own_gil: true,
            dlopen_flags: Vec::new(),
        }
    }
}

/// `[extensions]`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExtensionsSection {
    /// Directories searched for extension files, in order
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DynImportConfig::default();
        assert!(config.frozen.use_frozen_modules);
        assert!(config.interpreters.check_multi_interp_extensions);
        assert!(config.extensions.search_paths.is_empty());
        assert_eq!(config.dlopen_flags().unwrap(), default_dlopen_flags());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[runtime]
verbose = true

[frozen]
use_frozen_modules = false

[interpreters]
check_multi_interp_extensions = false

[extensions]
search_paths = ["/opt/ext", "lib"]
"#;
        let config: DynImportConfig = toml::from_str(toml_str).unwrap();
        assert!(config.runtime.verbose);
        assert!(!config.frozen.use_frozen_modules);
        assert!(!config.interpreters.check_multi_interp_extensions);
        assert!(config.interpreters.own_gil);
        assert_eq!(
            config.extensions.search_paths,
            vec![PathBuf::from("/opt/ext"), PathBuf::from("lib")]
        );

        let runtime = config.runtime_config().unwrap();
        assert!(!runtime.main.use_frozen_modules);
        assert!(!runtime.subinterpreter.check_multi_interp_extensions);
        assert!(runtime.main.verbose);
    }

    #[test]
    fn test_frozen_override() {
        let mut config = DynImportConfig::default();
        config.apply_frozen_override("off").unwrap();
        assert!(!config.frozen.use_frozen_modules);
        config.apply_frozen_override("ON").unwrap();
        assert!(config.frozen.use_frozen_modules);
        assert!(matches!(
            config.apply_frozen_override("maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_dlopen_flags() {
        let mut config = DynImportConfig::default();
        config.interpreters.dlopen_flags = vec!["now".into(), "RTLD_GLOBAL".into()];
        assert_eq!(
            config.dlopen_flags().unwrap(),
            libc::RTLD_NOW | libc::RTLD_GLOBAL
        );

        config.interpreters.dlopen_flags = vec!["eager".into()];
        assert!(config.dlopen_flags().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("dynimport-config-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        let mut config = DynImportConfig::default();
        config.runtime.verbose = true;
        config.save(&dir.join(CONFIG_FILE_NAME)).unwrap();

        let found = DynImportConfig::find_and_load(&dir.join("nested")).unwrap();
        assert_eq!(found, config);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
