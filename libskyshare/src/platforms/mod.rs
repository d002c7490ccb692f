//! Remote API abstraction
//!
//! `BlueskyApi` covers the three XRPC procedures the bridge needs. The real
//! implementation is `bluesky::XrpcClient`; `mock::MockApi` records calls and
//! returns scripted responses for tests.
//!
//! # Examples
//!
//! ```no_run
//! use libskyshare::config::BlueskyConfig;
//! use libskyshare::credentials::ServiceDomain;
//! use libskyshare::platforms::{bluesky::XrpcClient, BlueskyApi};
//! use secrecy::SecretString;
//!
//! # async fn example() -> libskyshare::Result<()> {
//! let client = XrpcClient::from_config(&BlueskyConfig::default())?;
//! let domain = ServiceDomain::parse("https://bsky.social")?;
//! let password = SecretString::from("app-password".to_string());
//!
//! let session = client
//!     .create_session(&domain, "alice.bsky.social", &password)
//!     .await?;
//! println!("Logged in as {}", session.did);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;

use crate::credentials::ServiceDomain;
use crate::error::Result;
use crate::types::{CreateRecordRequest, CreatedRecord, RefreshedTokens, SessionTokens};

pub mod bluesky;

// Mock API is available for all builds (not just tests) to support integration tests
pub mod mock;

pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";

#[async_trait]
pub trait BlueskyApi: Send + Sync {
    /// Exchange identifier and password for a session
    ///
    /// # Errors
    ///
    /// - `ApiError::Authentication` when the service rejects the login
    /// - `ApiError::Transport` on network failure or other HTTP errors
    /// - `ApiError::MalformedResponse` when `accessJwt`, `refreshJwt` or
    ///   `did` is missing
    async fn create_session(
        &self,
        domain: &ServiceDomain,
        identifier: &str,
        password: &SecretString,
    ) -> Result<SessionTokens>;

    /// Mint a new token pair from the refresh token
    async fn refresh_session(
        &self,
        domain: &ServiceDomain,
        refresh_token: &SecretString,
    ) -> Result<RefreshedTokens>;

    /// Create a post record in the account's repository
    async fn create_record(
        &self,
        domain: &ServiceDomain,
        access_token: &SecretString,
        request: &CreateRecordRequest,
    ) -> Result<CreatedRecord>;
}
