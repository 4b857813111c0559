//! Type-safe builder for [`AppConfig`](super::types::AppConfig) using the
//! typestate pattern: an output directory and at least one LLM backend must
//! be supplied before `build()` becomes callable.

use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::{AppConfig, BackendConfig, LlmConfig, ScrapingConfig, StorageConfig};
use crate::error::AppError;

pub struct WithOutputDir;
pub struct WithBackend;

pub struct AppConfigBuilder<State = ()> {
    output_dir: Option<PathBuf>,
    backends: Vec<BackendConfig>,
    llm: LlmConfig,
    scraping: ScrapingConfig,
    export_formats: Option<Vec<super::types::ExportFormat>>,
    _phantom: PhantomData<State>,
}

impl Default for AppConfigBuilder<()> {
    fn default() -> Self {
        Self {
            output_dir: None,
            backends: Vec::new(),
            llm: LlmConfig::default(),
            scraping: ScrapingConfig::default(),
            export_formats: None,
            _phantom: PhantomData,
        }
    }
}

impl AppConfigBuilder<()> {
    /// Set the directory pipeline exports are written to.
    #[must_use]
    pub fn output_dir(self, dir: impl Into<PathBuf>) -> AppConfigBuilder<WithOutputDir> {
        AppConfigBuilder {
            output_dir: Some(dir.into()),
            backends: self.backends,
            llm: self.llm,
            scraping: self.scraping,
            export_formats: self.export_formats,
            _phantom: PhantomData,
        }
    }
}

impl AppConfigBuilder<WithOutputDir> {
    /// Register an LLM backend in the priority fan-out list. Must be called
    /// at least once before `build()`.
    #[must_use]
    pub fn llm_backend(self, backend: BackendConfig) -> AppConfigBuilder<WithBackend> {
        let mut backends = self.backends;
        backends.push(backend);
        AppConfigBuilder {
            output_dir: self.output_dir,
            backends,
            llm: self.llm,
            scraping: self.scraping,
            export_formats: self.export_formats,
            _phantom: PhantomData,
        }
    }
}

impl AppConfigBuilder<WithBackend> {
    /// Register an additional LLM backend.
    #[must_use]
    pub fn llm_backend(mut self, backend: BackendConfig) -> Self {
        self.backends.push(backend);
        self
    }

    /// Build the final, validated [`AppConfig`].
    ///
    /// # Errors
    /// Returns [`AppError::Config`] if no backend was registered or the
    /// output directory cannot be canonicalized into an absolute path.
    pub fn build(self) -> Result<AppConfig, AppError> {
        if self.backends.is_empty() {
            return Err(AppError::Config(
                "at least one llm backend must be configured".into(),
            ));
        }

        let output_dir = self
            .output_dir
            .ok_or_else(|| AppError::Config("output_dir is required".into()))?;

        let mut llm = self.llm;
        llm.backends = self.backends;

        let mut storage = StorageConfig::new_for_builder(output_dir);
        if let Some(formats) = self.export_formats {
            storage.export_formats = formats;
        }

        Ok(AppConfig {
            llm,
            scraping: self.scraping,
            storage,
        })
    }
}

/// Methods available regardless of builder state, for fields that are
/// optional either way.
impl<State> AppConfigBuilder<State> {
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.scraping.headless = headless;
        self
    }

    #[must_use]
    pub fn pacing_profile(mut self, profile: super::types::PacingProfile) -> Self {
        self.scraping.pacing_profile = profile;
        self
    }

    #[must_use]
    pub fn max_concurrent_browsers(mut self, max: usize) -> Self {
        self.scraping.max_concurrent_browsers = max;
        self
    }

    #[must_use]
    pub fn browser_pool_size(mut self, min: usize, max: usize) -> Self {
        self.scraping.min_pool_size = min;
        self.scraping.max_pool_size = max;
        self
    }

    #[must_use]
    pub fn export_formats(mut self, formats: Vec<super::types::ExportFormat>) -> Self {
        self.export_formats = Some(formats);
        self
    }

    #[must_use]
    pub fn local_mock_mode(mut self, enabled: bool) -> Self {
        self.llm.local_mock_mode = enabled;
        self
    }

    #[must_use]
    pub fn strategy_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.llm.strategy_cache_ttl_secs = secs;
        self
    }
}
