pub mod config;
pub mod types;

pub use config::{load_scout_config, BrowserSettings, HarvestSettings, ScoutConfig};
