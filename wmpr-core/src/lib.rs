//! # WMPR Core Library
//!
//! Shared types and decision logic for the WMPR feed adapter: the per-project
//! query settings, query resolution, feed record mapping and the contracts of
//! the external collaborators (search engine, settings store, project
//! directory).
//!
//! ## Architecture
//!
//! The HTTP service in `wmpr-feed` wires concrete collaborators into the
//! types defined here:
//! - [`settings::SettingsStore`] persists the two per-project settings
//! - [`query::QueryEngine`] parses and executes queries against the host
//! - [`resolver::QueryResolver`] picks the effective query for a project
//! - [`feed::FeedRecord`] is the display model built from raw search entries

pub mod diagnostics;
pub mod error;
pub mod feed;
pub mod mock_engine;
pub mod query;
pub mod resolver;
pub mod settings;

// Re-export commonly used types
pub use diagnostics::{Diagnostics, RequestIdGenerator};
pub use error::{WmprError, WmprResult};
pub use feed::{FeedRecord, RawEntry};
pub use query::{ProjectDirectory, QueryEngine, StaticProjectDirectory, UserId, ValidatedQuery};
pub use resolver::{QueryResolver, QuerySource, ResolvedQuery};
pub use settings::{
    MemorySettingsStore, ProjectQuerySettings, QueryDefaults, SettingValue, SettingsKeys,
    SettingsStore,
};

/// Version information reported in feed diagnostics
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Query used whenever a project has no usable custom query
pub const DEFAULT_QUERY: &str = "project = WMPR ORDER BY created DESC";

/// Namespace prefix for persisted settings keys
pub const SETTINGS_KEY_PREFIX: &str = "wmpr.settings";

/// Number of records returned by the feed (offset is always 0)
pub const FEED_PAGE_SIZE: usize = 10;
