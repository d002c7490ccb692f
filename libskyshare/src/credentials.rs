//! Stored Bluesky credentials
//!
//! The credential record lives in the settings store under six keys. It is
//! "connected" only when the access token, refresh token and DID are all
//! present; any partial state is treated as not connected.
//!
//! Secrets (password and both tokens) are held as `SecretString` so they
//! never show up in `Debug` output or log events.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use url::Url;

use crate::error::{Result, SkyshareError};
use crate::settings::{SettingKey, SettingsStore};

/// Base URL of a PDS, normalized to end with exactly one slash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDomain(Url);

impl ServiceDomain {
    /// Validate and normalize a configured domain
    ///
    /// Only absolute `http`/`https` URLs with a host are accepted. Query and
    /// fragment are dropped and the path is coerced to a single trailing
    /// slash, so `https://bsky.social` becomes `https://bsky.social/`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SkyshareError::InvalidInput(
                "Domain cannot be empty".to_string(),
            ));
        }

        let mut url = Url::parse(trimmed).map_err(|e| {
            SkyshareError::InvalidInput(format!(
                "Domain '{}' is not a valid absolute URL including http(s): {}",
                trimmed, e
            ))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SkyshareError::InvalidInput(format!(
                "Domain '{}' must use http or https",
                trimmed
            )));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(SkyshareError::InvalidInput(format!(
                "Domain '{}' has no host",
                trimmed
            )));
        }

        let path = format!("{}/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// URL of an XRPC method on this service
    pub fn xrpc(&self, nsid: &str) -> Result<Url> {
        self.0.join(&format!("xrpc/{}", nsid)).map_err(|e| {
            SkyshareError::InvalidInput(format!("Cannot build XRPC URL for {}: {}", nsid, e))
        })
    }
}

impl fmt::Display for ServiceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the credential record
#[derive(Debug, Default)]
pub struct Credentials {
    pub domain: Option<ServiceDomain>,
    pub identifier: Option<String>,
    pub password: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub did: Option<String>,
}

impl Credentials {
    /// Read the credential record from the store
    ///
    /// A stored domain that no longer parses is reported and treated as absent.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let domain = match store.get(SettingKey::Domain).await? {
            Some(raw) => match ServiceDomain::parse(&raw) {
                Ok(domain) => Some(domain),
                Err(e) => {
                    tracing::warn!(domain = %raw, error = %e, "ignoring invalid stored domain");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            domain,
            identifier: store.get(SettingKey::Identifier).await?,
            password: store.get(SettingKey::Password).await?.map(SecretString::from),
            access_token: store.get(SettingKey::AccessToken).await?.map(SecretString::from),
            refresh_token: store.get(SettingKey::RefreshToken).await?.map(SecretString::from),
            did: store.get(SettingKey::Did).await?,
        })
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// All three of access token, refresh token and DID are present
    pub fn is_connected(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some() && self.did.is_some()
    }

    /// Identifier and password saved, but no session yet
    pub fn awaiting_login(&self) -> bool {
        self.identifier.is_some() && self.password.is_some() && self.access_token.is_none()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            domain: self.domain.as_ref().map(|d| d.to_string()),
            identifier: self.identifier.clone(),
            did: self.did.clone(),
            connected: self.is_connected(),
            access_token: self
                .access_token
                .as_ref()
                .map(|t| mask_token(t.expose_secret())),
            password_pending: self.password.is_some(),
        }
    }
}

/// Read-only view of the connection for a settings screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub domain: Option<String>,
    pub identifier: Option<String>,
    pub did: Option<String>,
    pub connected: bool,
    /// Masked access token
    pub access_token: Option<String>,
    pub password_pending: bool,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unset = "(not set)";
        writeln!(f, "Domain:       {}", self.domain.as_deref().unwrap_or(unset))?;
        writeln!(f, "Identifier:   {}", self.identifier.as_deref().unwrap_or(unset))?;
        writeln!(f, "DID:          {}", self.did.as_deref().unwrap_or(unset))?;
        writeln!(f, "Access token: {}", self.access_token.as_deref().unwrap_or(unset))?;
        if self.password_pending {
            writeln!(f, "Password:     saved, login pending")?;
        }
        write!(
            f,
            "Status:       {}",
            if self.connected { "connected" } else { "not connected" }
        )
    }
}

fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        "…".to_string()
    }
}
