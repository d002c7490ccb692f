//! Core types for Skyshare
//!
//! Content read from the host, the ephemeral outbound post, and the JSON
//! shapes exchanged with the XRPC endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Collection and record type of a Bluesky post
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Embed type of an external link card
pub const EXTERNAL_EMBED_TYPE: &str = "app.bsky.embed.external";

/// A published content item as the host CMS exposes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub title: String,
    /// Author-provided excerpt, preferred over the body when present
    pub excerpt: Option<String>,
    /// Body, HTML allowed
    pub body: String,
    pub permalink: String,
    pub shortlink: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl Content {
    /// Canonical short link: the shortlink when set, otherwise the permalink
    pub fn short_link(&self) -> &str {
        match self.shortlink.as_deref().map(str::trim) {
            Some(link) if !link.is_empty() => link,
            _ => &self.permalink,
        }
    }
}

/// Link-preview card attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct External {
    pub uri: String,
    pub title: String,
    pub description: String,
}

/// The post record built for one dispatch; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPost {
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub embed: External,
}

impl OutboundPost {
    /// Wrap the post in a `createRecord` request for the given repository
    pub fn into_request(self, did: &str) -> CreateRecordRequest {
        CreateRecordRequest {
            collection: POST_COLLECTION.to_string(),
            repo: did.to_string(),
            did: did.to_string(),
            record: FeedPostRecord {
                record_type: POST_COLLECTION.to_string(),
                text: self.text,
                created_at: format_timestamp(&self.created_at),
                embed: ExternalEmbed {
                    embed_type: EXTERNAL_EMBED_TYPE.to_string(),
                    external: self.embed,
                },
            },
        }
    }
}

/// ISO-8601 UTC with a `Z` suffix, second precision
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// XRPC wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub collection: String,
    pub repo: String,
    pub did: String,
    pub record: FeedPostRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPostRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub embed: ExternalEmbed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEmbed {
    #[serde(rename = "$type")]
    pub embed_type: String,
    pub external: External,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionBody<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// createSession / refreshSession response; every field is optional so a
/// missing one can be reported instead of failing to decode
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionBody {
    pub access_jwt: Option<String>,
    pub refresh_jwt: Option<String>,
    pub did: Option<String>,
    pub handle: Option<String>,
}

/// Error body returned by XRPC endpoints
#[derive(Debug, Default, Deserialize)]
pub(crate) struct XrpcErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Tokens and account id from a successful login
#[derive(Debug)]
pub struct SessionTokens {
    pub access_jwt: SecretString,
    pub refresh_jwt: SecretString,
    pub did: String,
    pub handle: Option<String>,
}

/// Tokens from a successful refresh
#[derive(Debug)]
pub struct RefreshedTokens {
    pub access_jwt: SecretString,
    pub refresh_jwt: SecretString,
}

/// Reference to a created record
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatedRecord {
    pub uri: Option<String>,
    pub cid: Option<String>,
}
