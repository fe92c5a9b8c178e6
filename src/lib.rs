pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::CampaignConfig};

pub use adapters::{MemoryStore, OpenAiClient, SendGridClient};
pub use core::{etl::EtlEngine, pipeline::ImportPipeline};
pub use utils::error::{EtlError, Result};
