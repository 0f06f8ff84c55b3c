use crate::error::{Result, SddError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// ValidationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Warnings fail validation.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_true")]
    pub require_scenarios: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            require_scenarios: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<String>,
    #[serde(default = "default_test_dirs")]
    pub test_dirs: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory names skipped anywhere below the scanned roots.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_source_dirs() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_test_dirs() -> Vec<String> {
    vec!["tests".to_string()]
}

fn default_extensions() -> Vec<String> {
    [
        "rs", "ts", "tsx", "js", "jsx", "mjs", "py", "go", "java", "kt", "rb", "cs", "c", "cc",
        "cpp", "h", "hpp", "swift", "php", "scala",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude() -> Vec<String> {
    ["node_modules", "target", "dist", "build", ".git", "vendor", "__pycache__"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_dirs: default_source_dirs(),
            test_dirs: default_test_dirs(),
            extensions: default_extensions(),
            exclude: default_exclude(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExportConfig / WatchConfig / ReverseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_format")]
    pub default_format: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_export_format() -> String {
    "html".to_string()
}

fn default_output_dir() -> String {
    paths::EXPORTS_DIR.to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: default_export_format(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseConfig {
    #[serde(default = "default_exclude")]
    pub ignore_dirs: Vec<String>,
}

impl Default for ReverseConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: default_exclude(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub reverse: ReverseConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new("")
    }
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            validation: ValidationConfig::default(),
            sync: SyncConfig::default(),
            export: ExportConfig::default(),
            watch: WatchConfig::default(),
            reverse: ReverseConfig::default(),
        }
    }

    /// Load `.sdd/config.yaml`. An initialized project without a config
    /// file gets the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        paths::ensure_initialized(root)?;
        let path = paths::config_path(root);
        let Some(data) = crate::io::read_optional(&path)? else {
            tracing::debug!("no config.yaml, using defaults");
            return Ok(Self::default());
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`] but never fails on a missing project.
    pub fn load_or_default(root: &Path) -> Self {
        match Self::load(root) {
            Ok(cfg) => cfg,
            Err(SddError::NotInitialized) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring unreadable config: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if crate::export::ExportFormat::parse(&self.export.default_format).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "unknown export.default_format '{}'",
                    self.export.default_format
                ),
            });
        }

        if self.sync.source_dirs.is_empty() && self.sync.test_dirs.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "sync has no source_dirs or test_dirs: nothing will be scanned"
                    .to_string(),
            });
        }

        if self.sync.extensions.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "sync.extensions is empty: no files will match".to_string(),
            });
        }

        if self.watch.debounce_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "watch.debounce_ms is 0: every write triggers a run".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("test-project");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.project.name, "test-project");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.sync.source_dirs, vec!["src"]);
        assert!(parsed.validation.require_scenarios);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("sync:\n  source_dirs: [lib]\n").unwrap();
        assert_eq!(cfg.sync.source_dirs, vec!["lib"]);
        assert_eq!(cfg.sync.test_dirs, vec!["tests"]);
        assert_eq!(cfg.watch.debounce_ms, 500);
        assert_eq!(cfg.export.default_format, "html");
    }

    #[test]
    fn load_requires_init() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(SddError::NotInitialized)
        ));
        std::fs::create_dir_all(paths::sdd_dir(dir.path())).unwrap();
        assert_eq!(Config::load(dir.path()).unwrap().version, 1);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::sdd_dir(dir.path())).unwrap();
        let mut cfg = Config::new("demo");
        cfg.validation.strict = true;
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert!(loaded.validation.strict);
        assert_eq!(loaded.project.name, "demo");
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = Config::new("x");
        assert!(cfg.validate().is_empty());
        cfg.export.default_format = "pdf".to_string();
        cfg.watch.debounce_ms = 0;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }
}
