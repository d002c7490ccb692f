//! Skyshare - share published content on Bluesky
//!
//! This library keeps a Bluesky session alive for a content host and turns
//! publish events into `app.bsky.feed.post` records with a link card. The
//! host-facing entry point is `service::SkyshareService`; the worker daemon
//! drains the task queue it fills.

pub mod config;
pub mod content;
pub mod credentials;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod excerpt;
pub mod logging;
pub mod platforms;
pub mod service;
pub mod session;
pub mod settings;
pub mod tasks;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{ConnectionStatus, Credentials, ServiceDomain};
pub use db::Database;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{Result, SkyshareError};
pub use service::{SettingsUpdate, SkyshareService};
pub use session::SessionManager;
pub use types::{Content, OutboundPost};
pub use worker::{RunSummary, Worker};
