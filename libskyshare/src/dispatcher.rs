//! Post dispatcher
//!
//! Publishing a content item only enqueues a `SendPost` task, and only while
//! an access token is stored. The worker later calls `send`, which refreshes
//! the session, builds the post record and creates it on Bluesky. A send is
//! attempted at most once per publish event.

use chrono::Utc;
use std::sync::Arc;

use crate::config::ExcerptConfig;
use crate::content::ContentSource;
use crate::error::Result;
use crate::excerpt::{strip_html, summary_source, trim_chars, trim_words};
use crate::platforms::BlueskyApi;
use crate::session::SessionManager;
use crate::tasks::{Task, TaskQueue};
use crate::types::{Content, External, OutboundPost};

/// What a `send` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The record was created
    Posted {
        uri: Option<String>,
        cid: Option<String>,
    },
    /// No usable session; nothing was sent
    NotConfigured,
    /// The content item no longer exists
    ContentMissing,
}

/// Build the post record for a content item
///
/// The post text is the summary cut to `body_chars` characters; the link
/// card carries the short link, the title and a summary cut to
/// `description_words` words. `createdAt` is the publish time.
pub fn build_post(content: &Content, options: &ExcerptConfig) -> OutboundPost {
    let summary = summary_source(content);

    OutboundPost {
        text: trim_chars(&summary, options.body_chars, &options.more),
        created_at: content.published_at,
        embed: External {
            uri: content.short_link().to_string(),
            title: strip_html(&content.title),
            description: trim_words(&summary, options.description_words, &options.more),
        },
    }
}

pub struct Dispatcher {
    session: Arc<SessionManager>,
    content: Arc<dyn ContentSource>,
    queue: Arc<dyn TaskQueue>,
    api: Arc<dyn BlueskyApi>,
    excerpt: ExcerptConfig,
}

impl Dispatcher {
    pub fn new(
        session: Arc<SessionManager>,
        content: Arc<dyn ContentSource>,
        queue: Arc<dyn TaskQueue>,
        api: Arc<dyn BlueskyApi>,
        excerpt: ExcerptConfig,
    ) -> Self {
        Self {
            session,
            content,
            queue,
            api,
            excerpt,
        }
    }

    /// React to a content item being published
    ///
    /// Enqueues one `SendPost` task due now when an access token is stored.
    /// Returns whether a task was enqueued; failures are logged, never
    /// returned, so publishing is never blocked on crossposting.
    pub async fn on_publish(&self, content_id: &str) -> bool {
        let has_token = match self.session.credentials().await {
            Ok(creds) => creds.has_access_token(),
            Err(e) => {
                tracing::warn!(content_id, error = %e, "cannot read credentials; not crossposting");
                return false;
            }
        };

        if !has_token {
            tracing::debug!(content_id, "no access token stored; not crossposting");
            return false;
        }

        let task = Task::SendPost {
            content_id: content_id.to_string(),
        };
        match self.queue.schedule_once(task, Utc::now()).await {
            Ok(task_id) => {
                tracing::info!(content_id, task_id = %task_id, "crosspost scheduled");
                true
            }
            Err(e) => {
                tracing::warn!(content_id, error = %e, "failed to schedule crosspost");
                false
            }
        }
    }

    /// Create the Bluesky post for a content item
    ///
    /// # Errors
    ///
    /// Store failures, and the API error when createRecord fails. Missing
    /// credentials or content are outcomes, not errors.
    pub async fn send(&self, content_id: &str) -> Result<DispatchOutcome> {
        if let Err(e) = self.session.refresh().await {
            if e.is_not_configured() {
                tracing::debug!(content_id, "no refresh token; skipping refresh");
            } else {
                tracing::warn!(content_id, error = %e, "refresh before send failed; continuing");
            }
        }

        let creds = self.session.credentials().await?;
        let (Some(access_token), Some(did), Some(domain)) =
            (creds.access_token, creds.did, creds.domain)
        else {
            tracing::info!(content_id, "Bluesky is not configured; skipping crosspost");
            return Ok(DispatchOutcome::NotConfigured);
        };

        let Some(content) = self.content.get_content(content_id).await? else {
            tracing::warn!(content_id, "content no longer exists; skipping crosspost");
            return Ok(DispatchOutcome::ContentMissing);
        };

        let request = build_post(&content, &self.excerpt).into_request(&did);

        match self.api.create_record(&domain, &access_token, &request).await {
            Ok(created) => {
                tracing::info!(
                    content_id,
                    uri = created.uri.as_deref().unwrap_or(""),
                    "crossposted to Bluesky"
                );
                Ok(DispatchOutcome::Posted {
                    uri: created.uri,
                    cid: created.cid,
                })
            }
            Err(e) => {
                tracing::warn!(content_id, domain = %domain, error = %e, "crosspost failed");
                Err(e)
            }
        }
    }
}
