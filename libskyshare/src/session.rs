//! Session lifecycle against the Bluesky service
//!
//! `SessionManager` owns every write to the credential record:
//!
//! - `login` exchanges identifier and password for a token triple and clears
//!   the password once the triple is stored
//! - `refresh` rotates the access and refresh tokens, leaving the DID alone
//! - `ensure_logged_in` logs in when a password is waiting and no session
//!   exists yet
//!
//! A failed call never touches stored credentials. In-process writers are
//! serialized by an async mutex; a refresh additionally commits only if the
//! refresh token it started from is still the stored one, so a concurrent
//! login in another process wins.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::credentials::{ConnectionStatus, Credentials, ServiceDomain};
use crate::error::{Result, SkyshareError};
use crate::platforms::BlueskyApi;
use crate::settings::{SettingChange, SettingKey, SettingsStore};

/// Account established by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub did: String,
    pub handle: Option<String>,
}

/// Result of a refresh that reached the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New tokens were stored
    Refreshed,
    /// The stored refresh token changed while the call was in flight; the
    /// newer credentials were kept
    Superseded,
}

pub struct SessionManager {
    settings: Arc<dyn SettingsStore>,
    api: Arc<dyn BlueskyApi>,
    default_domain: ServiceDomain,
    write_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        api: Arc<dyn BlueskyApi>,
        default_domain: ServiceDomain,
    ) -> Self {
        Self {
            settings,
            api,
            default_domain,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn credentials(&self) -> Result<Credentials> {
        Credentials::load(self.settings.as_ref()).await
    }

    /// Stored domain, or the configured default when none is stored
    pub async fn domain(&self) -> Result<ServiceDomain> {
        Ok(self
            .credentials()
            .await?
            .domain
            .unwrap_or_else(|| self.default_domain.clone()))
    }

    /// Log in and persist the resulting session
    ///
    /// On success the domain, identifier, access token, refresh token and
    /// DID are written in one transaction and the stored password is
    /// cleared. On failure nothing is written.
    pub async fn login(
        &self,
        domain: &ServiceDomain,
        identifier: &str,
        password: &SecretString,
    ) -> Result<Session> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(SkyshareError::NotConfigured(
                "No identifier configured".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        let tokens = match self.api.create_session(domain, identifier, password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    domain = %domain,
                    identifier,
                    error = %e,
                    "Bluesky login failed; stored credentials left unchanged"
                );
                return Err(e);
            }
        };

        self.settings
            .write(&[
                SettingChange::Set(SettingKey::Domain, domain.as_str()),
                SettingChange::Set(SettingKey::Identifier, identifier),
                SettingChange::Set(SettingKey::AccessToken, tokens.access_jwt.expose_secret()),
                SettingChange::Set(SettingKey::RefreshToken, tokens.refresh_jwt.expose_secret()),
                SettingChange::Set(SettingKey::Did, &tokens.did),
                SettingChange::Clear(SettingKey::Password),
            ])
            .await?;

        tracing::info!(domain = %domain, did = %tokens.did, "logged in to Bluesky");

        Ok(Session {
            did: tokens.did,
            handle: tokens.handle,
        })
    }

    /// Log in with the stored identifier and password
    pub async fn login_with_stored(&self) -> Result<Session> {
        let creds = self.credentials().await?;
        let identifier = creds
            .identifier
            .ok_or_else(|| SkyshareError::NotConfigured("No identifier configured".to_string()))?;
        let password = creds
            .password
            .ok_or_else(|| SkyshareError::NotConfigured("No password saved".to_string()))?;
        let domain = creds.domain.unwrap_or_else(|| self.default_domain.clone());

        self.login(&domain, &identifier, &password).await
    }

    /// Log in if a password is waiting and there is no session yet
    ///
    /// Returns `true` when a login happened and succeeded.
    pub async fn ensure_logged_in(&self) -> Result<bool> {
        let creds = self.credentials().await?;
        if !creds.awaiting_login() {
            tracing::debug!(connected = creds.is_connected(), "no login needed");
            return Ok(false);
        }

        self.login_with_stored().await?;
        Ok(true)
    }

    /// Rotate the access and refresh tokens
    ///
    /// # Errors
    ///
    /// `NotConfigured` without a network call when no refresh token is
    /// stored; the API error when the service refuses or is unreachable, in
    /// which case both stored tokens are kept.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let _guard = self.write_lock.lock().await;

        let creds = self.credentials().await?;
        let refresh_token = creds.refresh_token.ok_or_else(|| {
            SkyshareError::NotConfigured("No refresh token stored".to_string())
        })?;
        let domain = creds.domain.unwrap_or_else(|| self.default_domain.clone());

        let tokens = match self.api.refresh_session(&domain, &refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    domain = %domain,
                    error = %e,
                    "Bluesky session refresh failed; keeping stored tokens"
                );
                return Err(e);
            }
        };

        let applied = self
            .settings
            .write_if(
                SettingKey::RefreshToken,
                Some(refresh_token.expose_secret()),
                &[
                    SettingChange::Set(SettingKey::AccessToken, tokens.access_jwt.expose_secret()),
                    SettingChange::Set(
                        SettingKey::RefreshToken,
                        tokens.refresh_jwt.expose_secret(),
                    ),
                ],
            )
            .await?;

        if applied {
            tracing::debug!(domain = %domain, "Bluesky session refreshed");
            Ok(RefreshOutcome::Refreshed)
        } else {
            tracing::warn!(
                domain = %domain,
                "refresh token changed during refresh; keeping newer credentials"
            );
            Ok(RefreshOutcome::Superseded)
        }
    }

    pub async fn status(&self) -> Result<ConnectionStatus> {
        let mut status = self.credentials().await?.status();
        if status.domain.is_none() {
            status.domain = Some(self.default_domain.to_string());
        }
        Ok(status)
    }
}
