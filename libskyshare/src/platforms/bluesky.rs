//! Bluesky XRPC client over reqwest

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::config::BlueskyConfig;
use crate::credentials::ServiceDomain;
use crate::error::{ApiError, Result, SkyshareError};
use crate::platforms::{BlueskyApi, CREATE_RECORD, CREATE_SESSION, REFRESH_SESSION};
use crate::types::{
    CreateRecordRequest, CreateSessionBody, CreatedRecord, RefreshedTokens, SessionBody,
    SessionTokens, XrpcErrorBody,
};

/// AT Protocol error codes that mean the credentials or token were refused
const AUTH_ERROR_CODES: &[&str] = &[
    "AuthenticationRequired",
    "AuthFactorTokenRequired",
    "AccountTakedown",
    "ExpiredToken",
    "InvalidToken",
];

fn is_session_call(nsid: &str) -> bool {
    nsid == CREATE_SESSION || nsid == REFRESH_SESSION
}

/// Classify a non-2xx XRPC response
///
/// 401/403 and token/credential error codes are authentication failures. A
/// 400 from createSession or refreshSession is the service rejecting the
/// login or refresh, so it is classified the same way. Everything else,
/// rate limiting included, is a transport failure.
fn map_status(nsid: &str, status: StatusCode, body: &str) -> ApiError {
    let parsed: XrpcErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error.unwrap_or_default();
    let message = parsed.message.unwrap_or_default();

    let detail = match (code.is_empty(), message.is_empty()) {
        (false, false) => format!("{} returned {}: {}: {}", nsid, status, code, message),
        (false, true) => format!("{} returned {}: {}", nsid, status, code),
        (true, false) => format!("{} returned {}: {}", nsid, status, message),
        (true, true) => format!("{} returned {}", nsid, status),
    };

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || AUTH_ERROR_CODES.contains(&code.as_str())
        || (is_session_call(nsid) && status == StatusCode::BAD_REQUEST)
    {
        return ApiError::Authentication(detail);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || code == "RateLimitExceeded" {
        return ApiError::Transport(format!("rate limited: {}", detail));
    }

    ApiError::Transport(detail)
}

fn map_transport(nsid: &str, error: reqwest::Error) -> ApiError {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    ApiError::Transport(format!("{} {}: {}", nsid, kind, error))
}

fn required(field: Option<String>, name: &str, nsid: &str) -> Result<String> {
    field.filter(|v| !v.is_empty()).ok_or_else(|| {
        SkyshareError::from(ApiError::MalformedResponse(format!(
            "{} response is missing {}",
            nsid, name
        )))
    })
}

pub struct XrpcClient {
    http: reqwest::Client,
}

impl XrpcClient {
    /// Create a client sending `user_agent` on every request
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    pub fn from_config(config: &BlueskyConfig) -> Result<Self> {
        Self::new(&config.user_agent(), Duration::from_secs(config.timeout_secs.max(1)))
    }

    /// POST to an XRPC procedure and return the raw success body
    async fn post<B>(
        &self,
        domain: &ServiceDomain,
        nsid: &str,
        bearer: Option<&SecretString>,
        body: Option<&B>,
    ) -> Result<String>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = domain.xrpc(nsid)?;
        tracing::debug!(%url, "sending XRPC request");

        let mut request = self.http.post(url).header(CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| map_transport(nsid, e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| map_transport(nsid, e))?;
        tracing::debug!(nsid, %status, "received XRPC response");

        if status.as_u16() >= 300 {
            return Err(map_status(nsid, status, &text).into());
        }

        Ok(text)
    }

    async fn post_json<B, T>(
        &self,
        domain: &ServiceDomain,
        nsid: &str,
        bearer: Option<&SecretString>,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let text = self.post(domain, nsid, bearer, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::MalformedResponse(format!("{} returned invalid JSON: {}", nsid, e)).into()
        })
    }
}

#[async_trait]
impl BlueskyApi for XrpcClient {
    async fn create_session(
        &self,
        domain: &ServiceDomain,
        identifier: &str,
        password: &SecretString,
    ) -> Result<SessionTokens> {
        let body = CreateSessionBody {
            identifier,
            password: password.expose_secret(),
        };
        let session: SessionBody = self
            .post_json(domain, CREATE_SESSION, None, Some(&body))
            .await?;

        Ok(SessionTokens {
            access_jwt: SecretString::from(required(session.access_jwt, "accessJwt", CREATE_SESSION)?),
            refresh_jwt: SecretString::from(required(session.refresh_jwt, "refreshJwt", CREATE_SESSION)?),
            did: required(session.did, "did", CREATE_SESSION)?,
            handle: session.handle,
        })
    }

    async fn refresh_session(
        &self,
        domain: &ServiceDomain,
        refresh_token: &SecretString,
    ) -> Result<RefreshedTokens> {
        let session: SessionBody = self
            .post_json::<(), _>(domain, REFRESH_SESSION, Some(refresh_token), None)
            .await?;

        Ok(RefreshedTokens {
            access_jwt: SecretString::from(required(session.access_jwt, "accessJwt", REFRESH_SESSION)?),
            refresh_jwt: SecretString::from(required(session.refresh_jwt, "refreshJwt", REFRESH_SESSION)?),
        })
    }

    async fn create_record(
        &self,
        domain: &ServiceDomain,
        access_token: &SecretString,
        request: &CreateRecordRequest,
    ) -> Result<CreatedRecord> {
        let text = self
            .post(domain, CREATE_RECORD, Some(access_token), Some(request))
            .await?;

        // The record exists at this point; an odd body is not worth failing over
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "createRecord response had no record reference");
            CreatedRecord::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{External, OutboundPost};
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> XrpcClient {
        XrpcClient::new("Skyshare/test; Share on Bluesky", Duration::from_secs(5)).unwrap()
    }

    fn domain(server: &MockServer) -> ServiceDomain {
        ServiceDomain::parse(&server.uri()).unwrap()
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_map_status_classification() {
        let err = map_status(
            CREATE_SESSION,
            StatusCode::UNAUTHORIZED,
            r#"{"error":"AuthenticationRequired","message":"Invalid identifier or password"}"#,
        );
        assert_eq!(
            err,
            ApiError::Authentication(
                "com.atproto.server.createSession returned 401 Unauthorized: AuthenticationRequired: Invalid identifier or password".to_string()
            )
        );

        let err = map_status(REFRESH_SESSION, StatusCode::BAD_REQUEST, r#"{"error":"ExpiredToken"}"#);
        assert!(matches!(err, ApiError::Authentication(_)));

        let err = map_status(CREATE_RECORD, StatusCode::BAD_REQUEST, r#"{"error":"InvalidRequest"}"#);
        assert!(matches!(err, ApiError::Transport(_)));

        let err = map_status(CREATE_RECORD, StatusCode::BAD_REQUEST, r#"{"error":"ExpiredToken"}"#);
        assert!(matches!(err, ApiError::Authentication(_)));

        let err = map_status(CREATE_RECORD, StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, ApiError::Transport(ref m) if m.starts_with("rate limited")));

        let err = map_status(CREATE_RECORD, StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(
            err,
            ApiError::Transport("com.atproto.repo.createRecord returned 502 Bad Gateway".to_string())
        );
    }

    #[tokio::test]
    async fn test_create_session_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .and(header("content-type", "application/json"))
            .and(header("user-agent", "Skyshare/test; Share on Bluesky"))
            .and(body_json(json!({"identifier": "alice.bsky.social", "password": "app-pass"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessJwt": "access-1",
                "refreshJwt": "refresh-1",
                "did": "did:plc:alice",
                "handle": "alice.bsky.social"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = client()
            .create_session(&domain(&server), "alice.bsky.social", &secret("app-pass"))
            .await
            .unwrap();

        assert_eq!(session.access_jwt.expose_secret(), "access-1");
        assert_eq!(session.refresh_jwt.expose_secret(), "refresh-1");
        assert_eq!(session.did, "did:plc:alice");
        assert_eq!(session.handle.as_deref(), Some("alice.bsky.social"));
    }

    #[tokio::test]
    async fn test_create_session_missing_did_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessJwt": "access-1",
                "refreshJwt": "refresh-1"
            })))
            .mount(&server)
            .await;

        let err = client()
            .create_session(&domain(&server), "alice", &secret("pw"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SkyshareError::Api(ApiError::MalformedResponse(ref m)) if m.contains("did")
        ));
    }

    #[tokio::test]
    async fn test_create_session_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "AuthenticationRequired",
                "message": "Invalid identifier or password"
            })))
            .mount(&server)
            .await;

        let err = client()
            .create_session(&domain(&server), "alice", &secret("wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_refresh_session_sends_bearer_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.refreshSession"))
            .and(header("authorization", "Bearer refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessJwt": "access-2",
                "refreshJwt": "refresh-2",
                "did": "did:plc:alice"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client()
            .refresh_session(&domain(&server), &secret("refresh-1"))
            .await
            .unwrap();
        assert_eq!(tokens.access_jwt.expose_secret(), "access-2");
        assert_eq!(tokens.refresh_jwt.expose_secret(), "refresh-2");
    }

    #[tokio::test]
    async fn test_create_record_request() {
        let server = MockServer::start().await;
        let request = OutboundPost {
            text: "A short post about testing.".to_string(),
            created_at: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            embed: External {
                uri: "https://x.test/?p=1".to_string(),
                title: "Hello World".to_string(),
                description: "A short post about testing.".to_string(),
            },
        }
        .into_request("did:plc:alice");

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .and(header("authorization", "Bearer access-1"))
            .and(body_json(serde_json::to_value(&request).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uri": "at://did:plc:alice/app.bsky.feed.post/3k",
                "cid": "bafyrei"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client()
            .create_record(&domain(&server), &secret("access-1"), &request)
            .await
            .unwrap();
        assert_eq!(created.uri.as_deref(), Some("at://did:plc:alice/app.bsky.feed.post/3k"));
        assert_eq!(created.cid.as_deref(), Some("bafyrei"));
    }

    #[tokio::test]
    async fn test_create_record_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let request = OutboundPost {
            text: "t".to_string(),
            created_at: chrono::Utc::now(),
            embed: External {
                uri: "https://x.test/".to_string(),
                title: "t".to_string(),
                description: "d".to_string(),
            },
        }
        .into_request("did:plc:alice");

        let err = client()
            .create_record(&domain(&server), &secret("access-1"), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, SkyshareError::Api(ApiError::Transport(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        // Nothing listens on port 9 locally
        let domain = ServiceDomain::parse("http://127.0.0.1:9").unwrap();
        let err = client()
            .refresh_session(&domain, &secret("refresh-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SkyshareError::Api(ApiError::Transport(_))));
    }
}
