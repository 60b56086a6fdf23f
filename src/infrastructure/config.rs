use crate::domain::{config::BusProbeConfig, error::{BusProbeError, BusProbeResult}};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR: &str = ".busprobe";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> BusProbeResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = Self::find_project_config_path();

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Create a manager over explicit file locations
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration: defaults, then the global file, then the project
    /// file. Later files override individual keys of earlier ones.
    pub fn load_config(&self) -> BusProbeResult<BusProbeConfig> {
        let mut merged = toml::Table::new();

        if self.global_config_path.exists() {
            debug!("Loading global config {}", self.global_config_path.display());
            merge_tables(&mut merged, self.read_table(&self.global_config_path)?);
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                debug!("Loading project config {}", project_path.display());
                merge_tables(&mut merged, self.read_table(project_path)?);
            }
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| BusProbeError::Config {
                message: format!("Failed to parse configuration: {}", e),
            })
    }

    /// Get global configuration path
    fn get_global_config_path() -> BusProbeResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| BusProbeError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("busprobe").join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    fn read_table(&self, path: &Path) -> BusProbeResult<toml::Table> {
        let content = fs::read_to_string(path).map_err(|e| BusProbeError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        content.parse::<toml::Table>().map_err(|e| BusProbeError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> BusProbeResult<BusProbeConfig> {
        let content = fs::read_to_string(path).map_err(|e| BusProbeError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| BusProbeError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &BusProbeConfig) -> BusProbeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BusProbeError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| BusProbeError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| BusProbeError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Create default project configuration under `path/.busprobe`
    pub fn init_project_config(&self, path: &Path) -> BusProbeResult<PathBuf> {
        let config_file = path.join(CONFIG_DIR).join(CONFIG_FILE);
        self.init_config_at(&config_file)?;
        Ok(config_file)
    }

    /// Create default global configuration
    pub fn init_global_config(&self) -> BusProbeResult<PathBuf> {
        let config_file = self.global_config_path.clone();
        self.init_config_at(&config_file)?;
        Ok(config_file)
    }

    fn init_config_at(&self, config_file: &Path) -> BusProbeResult<()> {
        if config_file.exists() {
            return Err(BusProbeError::Config {
                message: format!("Configuration already exists at {}", config_file.display()),
            });
        }

        self.save_config_to_path(config_file, &BusProbeConfig::default())
    }
}

/// Recursively overlay `overlay` onto `base`; tables merge, everything else
/// (arrays included) is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
