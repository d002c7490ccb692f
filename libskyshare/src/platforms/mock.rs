//! Mock Bluesky API for testing
//!
//! Returns scripted results for the three XRPC calls and records what it was
//! asked to do, so session and dispatch logic can be tested without a network.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::credentials::ServiceDomain;
use crate::error::{ApiError, Result};
use crate::platforms::BlueskyApi;
use crate::types::{CreateRecordRequest, CreatedRecord, RefreshedTokens, SessionTokens};

/// A createRecord call as the mock saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPost {
    pub domain: String,
    pub access_token: String,
    pub request: CreateRecordRequest,
}

/// Configuration for mock API behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// DID returned by a successful login
    pub did: String,

    /// Error returned by createSession instead of a session
    pub login_error: Option<ApiError>,

    /// Error returned by refreshSession instead of new tokens
    pub refresh_error: Option<ApiError>,

    /// Error returned by createRecord instead of a record
    pub post_error: Option<ApiError>,

    /// Delay before completing any call
    pub delay: Duration,

    pub login_calls: Arc<Mutex<usize>>,
    pub refresh_calls: Arc<Mutex<usize>>,
    pub post_calls: Arc<Mutex<usize>>,

    /// Identifiers passed to createSession
    pub logins: Arc<Mutex<Vec<String>>>,

    /// Every createRecord request, in order
    pub posts: Arc<Mutex<Vec<RecordedPost>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            did: "did:plc:mock".to_string(),
            login_error: None,
            refresh_error: None,
            post_error: None,
            delay: Duration::from_millis(0),
            login_calls: Arc::new(Mutex::new(0)),
            refresh_calls: Arc::new(Mutex::new(0)),
            post_calls: Arc::new(Mutex::new(0)),
            logins: Arc::new(Mutex::new(Vec::new())),
            posts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock API for testing
///
/// Tokens are numbered by call: the n-th login returns `access-n` and
/// `refresh-n`, the n-th refresh returns `refreshed-access-n` and
/// `refreshed-refresh-n`.
#[derive(Debug, Clone, Default)]
pub struct MockApi {
    config: MockConfig,
}

fn bump(counter: &Mutex<usize>) -> usize {
    let mut count = counter.lock().unwrap_or_else(|e| e.into_inner());
    *count += 1;
    *count
}

fn read(counter: &Mutex<usize>) -> usize {
    *counter.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockApi {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A mock where every call succeeds
    pub fn success() -> Self {
        Self::default()
    }

    pub fn login_failure(error: ApiError) -> Self {
        Self::new(MockConfig {
            login_error: Some(error),
            ..Default::default()
        })
    }

    pub fn refresh_failure(error: ApiError) -> Self {
        Self::new(MockConfig {
            refresh_error: Some(error),
            ..Default::default()
        })
    }

    pub fn post_failure(error: ApiError) -> Self {
        Self::new(MockConfig {
            post_error: Some(error),
            ..Default::default()
        })
    }

    pub fn login_calls(&self) -> usize {
        read(&self.config.login_calls)
    }

    pub fn refresh_calls(&self) -> usize {
        read(&self.config.refresh_calls)
    }

    pub fn post_calls(&self) -> usize {
        read(&self.config.post_calls)
    }

    pub fn logins(&self) -> Vec<String> {
        self.config
            .logins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.config
            .posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn simulate_delay(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

#[async_trait]
impl BlueskyApi for MockApi {
    async fn create_session(
        &self,
        _domain: &ServiceDomain,
        identifier: &str,
        _password: &SecretString,
    ) -> Result<SessionTokens> {
        self.simulate_delay().await;
        let n = bump(&self.config.login_calls);
        self.config
            .logins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(identifier.to_string());

        if let Some(err) = &self.config.login_error {
            return Err(err.clone().into());
        }

        Ok(SessionTokens {
            access_jwt: SecretString::from(format!("access-{}", n)),
            refresh_jwt: SecretString::from(format!("refresh-{}", n)),
            did: self.config.did.clone(),
            handle: Some(identifier.to_string()),
        })
    }

    async fn refresh_session(
        &self,
        _domain: &ServiceDomain,
        _refresh_token: &SecretString,
    ) -> Result<RefreshedTokens> {
        self.simulate_delay().await;
        let n = bump(&self.config.refresh_calls);

        if let Some(err) = &self.config.refresh_error {
            return Err(err.clone().into());
        }

        Ok(RefreshedTokens {
            access_jwt: SecretString::from(format!("refreshed-access-{}", n)),
            refresh_jwt: SecretString::from(format!("refreshed-refresh-{}", n)),
        })
    }

    async fn create_record(
        &self,
        domain: &ServiceDomain,
        access_token: &SecretString,
        request: &CreateRecordRequest,
    ) -> Result<CreatedRecord> {
        self.simulate_delay().await;
        let n = bump(&self.config.post_calls);
        self.config
            .posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedPost {
                domain: domain.to_string(),
                access_token: access_token.expose_secret().to_string(),
                request: request.clone(),
            });

        if let Some(err) = &self.config.post_error {
            return Err(err.clone().into());
        }

        Ok(CreatedRecord {
            uri: Some(format!("at://{}/app.bsky.feed.post/mock{}", request.repo, n)),
            cid: Some(format!("mockcid{}", n)),
        })
    }
}
