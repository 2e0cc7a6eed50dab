pub mod browser;
pub mod core;
pub mod harvest;
pub mod report;

// --- Primary core exports ---
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::{BrowserSettings, HarvestSettings, ScoutConfig};

pub use browser::{BrowserDriver, DriverError, ScrollOffsets, ScrollTarget, TranscriptEntry};
pub use harvest::{content_id_from_url, CommentTreeParser, Harvester};
