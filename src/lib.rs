//! Fixture helpers for end-to-end browser tests against MediaWiki/Wikibase.
//!
//! Browser-driven UI tests use these commands to set up server-side state through
//! the Action API (accounts, blocks, items, properties) instead of clicking
//! through the UI.
//!
//! ```no_run
//! use mwapi_fixtures::{CommandRegistry, FixtureContext};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), mwapi_fixtures::FixtureError> {
//! let ctx = Arc::new(FixtureContext::from_env()?);
//! let commands = CommandRegistry::new(ctx);
//! let item_id = commands
//!     .invoke("MwApi:CreateItem", json!({ "label": "Test item" }))
//!     .await?;
//! println!("created {item_id}");
//! # Ok(())
//! # }
//! ```

pub mod api_client;
pub mod commands;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod util;

pub use api_client::{ActionClient, ApiParams, ApiResponse};
pub use commands::{COMMAND_PREFIX, CommandRegistry, FixtureCommand};
pub use config::FixtureConfig;
pub use context::{CreatedUser, FixtureContext, SessionKind};
pub use entity::Label;
pub use error::FixtureError;

/// Helpers for generating unique test strings
pub struct Util;

impl Util {
    /// `prefix` followed by a random number and a non-ASCII suffix
    pub fn test_string(prefix: &str) -> String {
        util::test_string(prefix)
    }
}
