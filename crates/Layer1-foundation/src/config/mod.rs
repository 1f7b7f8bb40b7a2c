//! Config - settings management
//!
//! - `store.rs` - JSON/TOML file store (global + project dirs)
//! - `hub.rs` - HubConfig supervisor settings

mod hub;
mod store;

pub use hub::{
    HubConfig, DEFAULT_DRAIN_GRACE_MS, DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_MAX_CHILDREN,
    DEFAULT_SHUTDOWN_TIMEOUT_MS, HUB_CONFIG_FILES,
};
pub use store::{load_file, ConfigStore, CONFIG_DIR_NAME};
