//! Configuration for the agent: a type-safe builder producing an
//! [`AppConfig`], plus environment/YAML overlays layered on top of it.

pub mod builder;
pub mod env;
pub mod types;

pub use builder::{AppConfigBuilder, WithBackend, WithOutputDir};
pub use env::{apply_env_overlay, load_yaml_config};
pub use types::{
    AppConfig, BackendConfig, BackendKind, ExportFormat, LlmConfig, PacingProfile, ScrapingConfig,
    StorageConfig,
};
