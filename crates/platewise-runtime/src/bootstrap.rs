//! Explicit, once-per-process startup.
//!
//! Nothing in platewise configures itself at load time.  The entry point
//! gathers [`Settings`] (config file, environment, `.env`), installs tracing,
//! and then calls [`initialize`] exactly once.  After that the settings are
//! read-only and every component is built from them with
//! [`build_orchestrator`].

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use platewise_catalog::Catalog;
use platewise_memory::MemoryStore;
use platewise_types::PlateError;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::llm_driver::LlmDriver;
use crate::orchestrator::{DEFAULT_CALL_TIMEOUT, Orchestrator};
use crate::reasoner::{LlmReasoner, Reasoner};

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Everything the runtime needs, resolved by the entry point.
#[derive(Clone)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible endpoint.
    pub llm_url: String,
    pub model: String,
    /// Reasoning-service credential.  Without one the reasoning calls fail
    /// and every recommendation uses the fallback paths.
    pub api_key: Option<Zeroizing<String>>,
    /// CSV catalog loaded at startup.
    pub catalog_path: PathBuf,
    /// Directory holding per-user memory files.
    pub memory_dir: PathBuf,
    /// Bound on each reasoning call.
    pub call_timeout: Duration,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("llm_url", &self.llm_url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_some() { &"<redacted>" } else { &"<not set>" },
            )
            .field("catalog_path", &self.catalog_path)
            .field("memory_dir", &self.memory_dir)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Settings {
    pub fn new(catalog_path: impl Into<PathBuf>, memory_dir: impl Into<PathBuf>) -> Self {
        Self {
            llm_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            catalog_path: catalog_path.into(),
            memory_dir: memory_dir.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Record the process-wide settings.  Must be called once, by the entry
/// point, before any component is built.
///
/// # Errors
///
/// [`PlateError::Initialization`] on a second call.
pub fn initialize(settings: Settings) -> Result<&'static Settings, PlateError> {
    if settings.api_key.is_none() {
        warn!("no reasoning API key configured; recommendations will use fallbacks");
    }
    SETTINGS
        .set(settings)
        .map_err(|_| PlateError::Initialization("platewise is already initialized".into()))?;
    let settings = SETTINGS
        .get()
        .ok_or_else(|| PlateError::Initialization("settings were not stored".into()))?;
    info!(?settings, "platewise initialized");
    Ok(settings)
}

/// Settings recorded by [`initialize`], if it has run.
pub fn settings() -> Option<&'static Settings> {
    SETTINGS.get()
}

/// The reasoning client described by `settings`.
pub fn llm_reasoner(settings: &Settings) -> LlmReasoner {
    let mut driver =
        LlmDriver::new(&settings.llm_url, &settings.model).with_timeout(settings.call_timeout);
    if let Some(key) = &settings.api_key {
        driver = driver.with_api_key(key.as_str());
    }
    LlmReasoner::new(driver)
}

/// Load the catalog, open the memory store and wire up an [`Orchestrator`]
/// around `reasoner`.
///
/// # Errors
///
/// [`PlateError::DataLoad`] when the catalog cannot be loaded.  An unusable
/// memory directory is not an error: the store runs session-only.
pub fn build_orchestrator(
    settings: &Settings,
    reasoner: Box<dyn Reasoner>,
) -> Result<Orchestrator, PlateError> {
    let catalog = Catalog::load(&settings.catalog_path)?;
    let store = MemoryStore::open(&settings.memory_dir);
    Ok(Orchestrator::new(catalog, store, reasoner).with_call_timeout(settings.call_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_runs_once() {
        let first = initialize(Settings::new("dishes.csv", "memory")).unwrap();
        assert_eq!(first.model, "gpt-4o-mini");
        assert!(settings().is_some());
        let again = initialize(Settings::new("other.csv", "memory"));
        assert!(matches!(again, Err(PlateError::Initialization(_))));
        assert_eq!(settings().unwrap().catalog_path, PathBuf::from("dishes.csv"));
    }

    #[test]
    fn debug_redacts_key() {
        let mut s = Settings::new("a.csv", "mem");
        s.api_key = Some(Zeroizing::new("sk-top-secret".into()));
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("sk-top-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn missing_catalog_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::new(dir.path().join("missing.csv"), dir.path().join("mem"));
        let err = build_orchestrator(&s, Box::new(llm_reasoner(&s))).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn builds_from_written_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("dishes.csv");
        platewise_catalog::ensure_catalog_file(&csv).unwrap();
        let s = Settings::new(&csv, dir.path().join("mem"));
        let orchestrator = build_orchestrator(&s, Box::new(llm_reasoner(&s))).unwrap();
        assert_eq!(orchestrator.catalog().len(), 20);
        assert!(orchestrator.store().is_durable());
    }
}
