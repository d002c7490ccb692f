//! Service facade for Skyshare
//!
//! `SkyshareService` wires the settings store, content source, task queue
//! and Bluesky client into the session manager, dispatcher and worker, and
//! exposes the host lifecycle hooks:
//!
//! - `install` / `uninstall` manage the recurring session refresh
//! - `publish` stores a content item and schedules its crosspost
//! - `save_settings` validates and stores the connection settings, then logs
//!   in when a password was provided
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use libskyshare::service::SkyshareService;
//! use libskyshare::types::Content;
//!
//! # async fn example() -> libskyshare::Result<()> {
//! let service = SkyshareService::new().await?;
//! service.install().await?;
//!
//! let content = Content {
//!     id: "1".to_string(),
//!     title: "Hello World".to_string(),
//!     excerpt: Some("A short post about testing.".to_string()),
//!     body: String::new(),
//!     permalink: "https://x.test/?p=1".to_string(),
//!     shortlink: None,
//!     published_at: Utc::now(),
//! };
//! service.publish(&content).await?;
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{resolve_db_path, Config};
use crate::content::ContentSource;
use crate::credentials::{ConnectionStatus, ServiceDomain};
use crate::db::Database;
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, Result, SkyshareError};
use crate::platforms::bluesky::XrpcClient;
use crate::platforms::BlueskyApi;
use crate::session::SessionManager;
use crate::settings::{SettingChange, SettingKey, SettingsStore};
use crate::tasks::{Task, TaskQueue, REFRESH_TASK_NAME};
use crate::types::Content;
use crate::worker::Worker;

/// Settings submitted from a settings form; `None` leaves a field unchanged
#[derive(Debug, Default)]
pub struct SettingsUpdate {
    pub domain: Option<String>,
    pub identifier: Option<String>,
    pub password: Option<SecretString>,
}

/// Collaborators the service is built from
pub struct ServiceParts {
    pub settings: Arc<dyn SettingsStore>,
    pub content: Arc<dyn ContentSource>,
    pub queue: Arc<dyn TaskQueue>,
    pub api: Arc<dyn BlueskyApi>,
}

pub struct SkyshareService {
    settings: Arc<dyn SettingsStore>,
    content: Arc<dyn ContentSource>,
    queue: Arc<dyn TaskQueue>,
    session: Arc<SessionManager>,
    dispatcher: Arc<Dispatcher>,
    worker: Worker,
    refresh_interval: Duration,
}

impl SkyshareService {
    /// Create a service from the default configuration file
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service backed by the configured SQLite database and the
    /// real XRPC client
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated, the
    /// HTTP client cannot be built, or the configuration is invalid.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db_path = resolve_db_path(&config.database.path)?;
        let db_path_str = db_path.to_str().ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "database.path".to_string(),
                reason: "path is not valid UTF-8".to_string(),
            }
        })?;
        let db = Arc::new(Database::new(db_path_str).await?);
        let api = Arc::new(XrpcClient::from_config(&config.bluesky)?);

        Self::with_parts(
            &config,
            ServiceParts {
                settings: db.clone(),
                content: db.clone(),
                queue: db,
                api,
            },
        )
    }

    /// Create a service from explicit collaborators
    pub fn with_parts(config: &Config, parts: ServiceParts) -> Result<Self> {
        let default_domain = ServiceDomain::parse(&config.bluesky.default_domain).map_err(|e| {
            ConfigError::InvalidValue {
                field: "bluesky.default_domain".to_string(),
                reason: e.to_string(),
            }
        })?;
        let refresh_interval = config.scheduling.refresh_interval()?;

        let session = Arc::new(SessionManager::new(
            parts.settings.clone(),
            parts.api.clone(),
            default_domain,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            session.clone(),
            parts.content.clone(),
            parts.queue.clone(),
            parts.api,
            config.excerpt.clone(),
        ));
        let worker = Worker::new(parts.queue.clone(), dispatcher.clone(), session.clone());

        Ok(Self {
            settings: parts.settings,
            content: parts.content,
            queue: parts.queue,
            session,
            dispatcher,
            worker,
            refresh_interval,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn queue(&self) -> &dyn TaskQueue {
        self.queue.as_ref()
    }

    /// Schedule the recurring session refresh, first run now
    ///
    /// Returns `false` when it was already scheduled.
    pub async fn install(&self) -> Result<bool> {
        let scheduled = self
            .queue
            .schedule_recurring(
                REFRESH_TASK_NAME,
                Task::RefreshSession,
                self.refresh_interval,
                Utc::now(),
            )
            .await?;

        if scheduled {
            tracing::info!(
                interval = %humantime::format_duration(self.refresh_interval),
                "scheduled recurring session refresh"
            );
        } else {
            tracing::debug!("recurring session refresh already scheduled");
        }
        Ok(scheduled)
    }

    /// Cancel the recurring session refresh
    pub async fn uninstall(&self) -> Result<bool> {
        let removed = self.queue.cancel_recurring(REFRESH_TASK_NAME).await?;
        tracing::info!(removed, "cancelled recurring session refresh");
        Ok(removed)
    }

    /// Store a published content item and schedule its crosspost
    ///
    /// Returns whether a crosspost was scheduled. Only storing the content
    /// can fail; crossposting problems are logged.
    pub async fn publish(&self, content: &Content) -> Result<bool> {
        self.content.put_content(content).await?;
        Ok(self.dispatcher.on_publish(&content.id).await)
    }

    /// Validate and store connection settings, then log in if needed
    ///
    /// The domain is checked before anything is written. The settings stay
    /// saved even if the login that follows fails; the login error is
    /// returned. Returns `true` when a login happened.
    pub async fn save_settings(&self, update: SettingsUpdate) -> Result<bool> {
        let domain = update
            .domain
            .as_deref()
            .map(ServiceDomain::parse)
            .transpose()?;

        let identifier = update.identifier.as_deref().map(str::trim);
        if identifier.is_some_and(str::is_empty) {
            return Err(SkyshareError::InvalidInput(
                "Identifier cannot be empty".to_string(),
            ));
        }

        let mut changes = Vec::new();
        if let Some(domain) = &domain {
            changes.push(SettingChange::Set(SettingKey::Domain, domain.as_str()));
        }
        if let Some(identifier) = identifier {
            changes.push(SettingChange::Set(SettingKey::Identifier, identifier));
        }
        if let Some(password) = &update.password {
            if !password.expose_secret().is_empty() {
                changes.push(SettingChange::Set(SettingKey::Password, password.expose_secret()));
            }
        }

        if !changes.is_empty() {
            self.settings.write(&changes).await?;
            tracing::info!(fields = changes.len(), "saved Bluesky settings");
        }

        self.session.ensure_logged_in().await
    }

    /// Connection status, logging in first if a password is waiting
    pub async fn status(&self) -> Result<ConnectionStatus> {
        if let Err(e) = self.session.ensure_logged_in().await {
            tracing::warn!(error = %e, "login attempt from status view failed");
        }
        self.session.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContent;
    use crate::error::ApiError;
    use crate::platforms::mock::MockApi;
    use crate::settings::MemorySettings;
    use crate::tasks::MemoryQueue;

    struct Fixture {
        settings: Arc<MemorySettings>,
        queue: Arc<MemoryQueue>,
        api: MockApi,
        service: SkyshareService,
    }

    fn fixture(api: MockApi) -> Fixture {
        let settings = Arc::new(MemorySettings::new());
        let queue = Arc::new(MemoryQueue::new());
        let service = SkyshareService::with_parts(
            &Config::default(),
            ServiceParts {
                settings: settings.clone(),
                content: Arc::new(MemoryContent::new()),
                queue: queue.clone(),
                api: Arc::new(api.clone()),
            },
        )
        .unwrap();

        Fixture {
            settings,
            queue,
            api,
            service,
        }
    }

    fn password(s: &str) -> Option<SecretString> {
        Some(SecretString::from(s.to_string()))
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let f = fixture(MockApi::success());
        assert!(f.service.install().await.unwrap());
        assert!(!f.service.install().await.unwrap());
        assert_eq!(f.queue.list().await.unwrap().len(), 1);

        assert!(f.service.uninstall().await.unwrap());
        assert!(f.queue.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_settings_rejects_bare_domain() {
        let f = fixture(MockApi::success());
        let err = f
            .service
            .save_settings(SettingsUpdate {
                domain: Some("bsky.social".to_string()),
                identifier: Some("alice.bsky.social".to_string()),
                password: password("app-pass"),
            })
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(f.settings.get(SettingKey::Identifier).await.unwrap(), None);
        assert_eq!(f.api.login_calls(), 0);
    }

    #[tokio::test]
    async fn test_save_settings_logs_in() {
        let f = fixture(MockApi::success());
        let logged_in = f
            .service
            .save_settings(SettingsUpdate {
                domain: Some("https://bsky.social".to_string()),
                identifier: Some("alice.bsky.social".to_string()),
                password: password("app-pass"),
            })
            .await
            .unwrap();

        assert!(logged_in);
        let status = f.service.status().await.unwrap();
        assert!(status.connected);
        assert!(!status.password_pending);
        assert_eq!(f.api.login_calls(), 1);
    }

    #[tokio::test]
    async fn test_save_settings_keeps_fields_when_login_fails() {
        let f = fixture(MockApi::login_failure(ApiError::Authentication("nope".into())));
        let err = f
            .service
            .save_settings(SettingsUpdate {
                domain: None,
                identifier: Some("alice.bsky.social".to_string()),
                password: password("wrong"),
            })
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            f.settings.get(SettingKey::Identifier).await.unwrap().as_deref(),
            Some("alice.bsky.social")
        );
        assert_eq!(
            f.settings.get(SettingKey::Password).await.unwrap().as_deref(),
            Some("wrong")
        );
    }

    #[tokio::test]
    async fn test_publish_without_connection_stores_content_only() {
        let f = fixture(MockApi::success());
        let content = Content {
            id: "7".to_string(),
            title: "Title".to_string(),
            excerpt: None,
            body: "Body".to_string(),
            permalink: "https://x.test/?p=7".to_string(),
            shortlink: None,
            published_at: Utc::now(),
        };

        assert!(!f.service.publish(&content).await.unwrap());
        assert!(f.queue.list().await.unwrap().is_empty());
    }
}
