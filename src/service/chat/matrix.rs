//! Matrix client-server API implementation of the chat client.

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, trace, warn};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{ChatClient, ChatError, GenericChatClient, Room};

// Constants.

/// Pause between failed sync attempts.
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Keep sync responses as small as the server allows.
const SYNC_FILTER: &str = r#"{"presence":{"not_types":["*"]},"account_data":{"not_types":["*"]},"room":{"timeline":{"limit":1},"state":{"lazy_load_members":true}}}"#;

// Extra methods on `ChatClient` applied by the matrix implementation.

impl ChatClient {
    /// Creates a new Matrix chat client.
    pub fn matrix(config: &Config) -> Res<Self> {
        let client = MatrixChatClient::new(&config.host, Duration::from_secs(config.sync_timeout_secs))?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<MatrixChatClient> for ChatClient {
    fn from(client: MatrixChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Wire types.

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    room_id: String,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    next_batch: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    errcode: String,
    #[serde(default)]
    error: String,
}

// Structs.

/// Matrix client implementation.
///
/// `reqwest::Client` is safe to share between the listener and the relay
/// loop, so sends and syncs run concurrently without a lock.
pub struct MatrixChatClient {
    http: reqwest::Client,
    base: Url,
    token: OnceLock<String>,
    txn_counter: AtomicU64,
    sync_timeout: Duration,
    tag_pattern: Regex,
}

impl MatrixChatClient {
    /// Create a new Matrix chat client for the homeserver at `host`.
    pub fn new(host: &str, sync_timeout: Duration) -> Res<Self> {
        let mut base = Url::parse(host)?;

        base.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Matrix host `{}` cannot be used as a base URL.", host))?
            .pop_if_empty()
            .extend(["_matrix", "client", "v3"]);

        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: OnceLock::new(),
            txn_counter: AtomicU64::new(0),
            sync_timeout,
            tag_pattern: Regex::new("<[^<]+?>")?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Res<Url> {
        let mut url = self.base.clone();

        url.path_segments_mut().map_err(|_| anyhow::anyhow!("Matrix base URL cannot take path segments."))?.extend(segments);

        Ok(url)
    }

    fn access_token(&self) -> Result<&str, ChatError> {
        self.token.get().map(String::as_str).ok_or(ChatError::NotLoggedIn)
    }

    fn next_txn_id(&self) -> String {
        let n = self.txn_counter.fetch_add(1, Ordering::Relaxed);

        format!("mirk-{}-{}", chrono::Utc::now().timestamp_millis(), n)
    }

    /// Plain-text fallback body for clients that do not render HTML.
    fn strip_tags(&self, html: &str) -> String {
        let text = self.tag_pattern.replace_all(html, "");

        // `&amp;` goes last so that `&amp;lt;` decodes to `&lt;`.
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    async fn sync_once(&self, since: Option<&str>) -> Res<String> {
        let token = self.access_token()?;
        let timeout_ms = self.sync_timeout.as_millis().to_string();

        let mut query = vec![("timeout", timeout_ms.as_str()), ("filter", SYNC_FILTER)];
        if let Some(since) = since {
            query.push(("since", since));
        }

        let response = self
            .http
            .get(self.endpoint(&["sync"])?)
            .bearer_auth(token)
            .query(&query)
            .timeout(self.sync_timeout + Duration::from_secs(15))
            .send()
            .await?
            .error_for_status()?;

        // Only the batch token matters; the rest of the response is dropped unread.
        let sync: SyncResponse = response.json().await?;

        Ok(sync.next_batch)
    }
}

#[async_trait]
impl GenericChatClient for MatrixChatClient {
    #[instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Void {
        let body = json!({
            "type": "m.login.password",
            "identifier": { "type": "m.id.user", "user": username },
            "password": password,
            "initial_device_display_name": "mirk",
        });

        let response = self
            .http
            .post(self.endpoint(&["login"])?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::LoginFailed { message: e.to_string() })?;

        match response.status() {
            StatusCode::FORBIDDEN => return Err(ChatError::BadCredentials { message: error_message(response).await }.into()),
            status if !status.is_success() => return Err(ChatError::LoginFailed { message: error_message(response).await }.into()),
            _ => {}
        }

        let login: LoginResponse = response.json().await.map_err(|e| ChatError::LoginFailed { message: e.to_string() })?;

        debug!("Logged in as {}.", login.user_id);

        self.token.set(login.access_token).map_err(|_| anyhow::anyhow!("Matrix client is already logged in."))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn join_room(&self, room: &str) -> Res<Room> {
        let token = self.access_token()?;

        let response = self
            .http
            .post(self.endpoint(&["join", room])?)
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ChatError::RoomUnavailable {
                room: room.to_string(),
                message: e.to_string(),
            })?;

        match response.status() {
            StatusCode::BAD_REQUEST => {
                return Err(ChatError::MalformedRoom {
                    room: room.to_string(),
                    message: error_message(response).await,
                }
                .into());
            }
            status if !status.is_success() => {
                return Err(ChatError::RoomUnavailable {
                    room: room.to_string(),
                    message: error_message(response).await,
                }
                .into());
            }
            _ => {}
        }

        let joined: JoinResponse = response.json().await.map_err(|e| ChatError::RoomUnavailable {
            room: room.to_string(),
            message: e.to_string(),
        })?;

        Ok(Room {
            alias: room.to_string(),
            id: joined.room_id,
        })
    }

    #[instrument(skip(self, html), fields(room = %room.alias))]
    async fn send_html(&self, room: &Room, html: &str) -> Void {
        let token = self.access_token()?;
        let txn_id = self.next_txn_id();

        let content = json!({
            "msgtype": "m.text",
            "body": self.strip_tags(html),
            "format": "org.matrix.custom.html",
            "formatted_body": html,
        });

        let send_failed = |message: String| ChatError::SendFailed {
            room: room.alias.clone(),
            message,
        };

        let response = self
            .http
            .put(self.endpoint(&["rooms", room.id.as_str(), "send", "m.room.message", txn_id.as_str()])?)
            .bearer_auth(token)
            .json(&content)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(send_failed(error_message(response).await).into());
        }

        Ok(())
    }

    async fn listen(&self) -> Void {
        let mut since: Option<String> = None;

        loop {
            match self.sync_once(since.as_deref()).await {
                Ok(next_batch) => {
                    trace!("Discarded sync batch up to {}.", next_batch);
                    since = Some(next_batch);
                }
                Err(err) => {
                    warn!("Matrix sync failed, retrying in {}s: {}", SYNC_RETRY_DELAY.as_secs(), err);
                    tokio::time::sleep(SYNC_RETRY_DELAY).await;
                }
            }
        }
    }
}

// Helpers.

/// Describe a failed response using the Matrix error body when there is one.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();

    match response.json::<ErrorResponse>().await {
        Ok(body) if body.error.is_empty() => format!("{} ({})", body.errcode, status),
        Ok(body) => format!("{} ({}): {}", body.errcode, status, body.error),
        Err(_) => status.to_string(),
    }
}

// Tests.
