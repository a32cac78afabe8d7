//! Configuration Vault – reads/writes `~/.platewise/config.toml`.
//!
//! The API key is never stored in the file; it comes from the environment
//! (optionally populated from a `.env` file).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use platewise_runtime::Settings;
use zeroize::Zeroizing;

/// Persisted user configuration stored in `~/.platewise/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible reasoning endpoint.
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    /// Chat model name (e.g. "gpt-4o-mini").
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP port for the web UI.
    #[serde(default = "default_webui_port")]
    pub webui_port: u16,

    /// Dish catalog CSV.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Directory holding per-user memory files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// User the REPL acts as.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Bound on each reasoning call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_webui_port() -> u16 {
    platewise_web::DEFAULT_PORT
}
fn default_catalog_path() -> PathBuf {
    platewise_dir_for_home(&home_dir()).join("dishes.csv")
}
fn default_data_dir() -> PathBuf {
    platewise_dir_for_home(&home_dir()).join("memory")
}
fn default_user_id() -> String {
    "guest".to_string()
}
fn default_timeout_secs() -> u64 {
    platewise_runtime::DEFAULT_CALL_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_url: default_llm_url(),
            model: default_model(),
            webui_port: default_webui_port(),
            catalog_path: default_catalog_path(),
            data_dir: default_data_dir(),
            user_id: default_user_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Resolve the runtime [`Settings`], pulling the API key from the
    /// environment.
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings::new(&self.catalog_path, &self.data_dir);
        settings.llm_url = self.llm_url.clone();
        settings.model = self.model.clone();
        settings.api_key = api_key_from_env();
        settings.call_timeout = Duration::from_secs(self.timeout_secs.max(1));
        settings
    }
}

/// `PLATEWISE_API_KEY`, falling back to `OPENAI_API_KEY`.  Blank values count
/// as unset.
pub fn api_key_from_env() -> Option<Zeroizing<String>> {
    ["PLATEWISE_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
        .map(|v| Zeroizing::new(v.trim().to_string()))
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn platewise_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".platewise")
}

/// Return the path to `~/.platewise/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    platewise_dir_for_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PLATEWISE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PLATEWISE_LLM_URL` | `llm_url` |
/// | `PLATEWISE_MODEL` | `model` |
/// | `PLATEWISE_WEBUI_PORT` | `webui_port` |
/// | `PLATEWISE_CATALOG` | `catalog_path` |
/// | `PLATEWISE_DATA_DIR` | `data_dir` |
/// | `PLATEWISE_USER` | `user_id` |
/// | `PLATEWISE_TIMEOUT_SECS` | `timeout_secs` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PLATEWISE_LLM_URL") {
        cfg.llm_url = v;
    }
    if let Ok(v) = std::env::var("PLATEWISE_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("PLATEWISE_WEBUI_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.webui_port = port;
    }
    if let Ok(v) = std::env::var("PLATEWISE_CATALOG") {
        cfg.catalog_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PLATEWISE_DATA_DIR") {
        cfg.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PLATEWISE_USER")
        && !v.trim().is_empty()
    {
        cfg.user_id = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("PLATEWISE_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
        && secs > 0
    {
        cfg.timeout_secs = secs;
    }
}

/// Save the config to disk, creating `~/.platewise/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
