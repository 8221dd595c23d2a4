use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use shared::{
    domain::{record_id, EntityId, EntityKind},
    error::{ApiError, ApiException},
    protocol::{ChangeNotification, ListOptions, ListPage, MutationResponse},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

use crate::{data_client::DataClient, images::ObjectStore};

/// Data API client speaking to the `server` binary over HTTP, with change
/// notifications delivered over its websocket.
pub struct HttpDataClient {
    http: Client,
    server_url: String,
    changes: broadcast::Sender<ChangeNotification>,
}

impl HttpDataClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            http: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            changes,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/collections/{}", self.server_url, kind.collection_name())
    }

    /// Opens the change feed and forwards every notification to
    /// [`DataClient::subscribe`] receivers until the socket closes.
    pub async fn connect_changes(&self) -> Result<JoinHandle<()>> {
        let ws_url = websocket_url(&self.server_url)?;
        let (mut stream, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect change feed at {ws_url}"))?;
        info!(%ws_url, "subscription: change feed connected");

        let changes = self.changes.clone();
        Ok(tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ChangeNotification>(&text) {
                            Ok(change) => {
                                let _ = changes.send(change);
                            }
                            Err(error) => {
                                warn!(%error, "subscription: undecodable change notification")
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "subscription: change feed failed");
                        break;
                    }
                }
            }
            info!("subscription: change feed closed");
        }))
    }
}

pub(crate) fn websocket_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url).with_context(|| format!("invalid server url '{server_url}'"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(anyhow!("unsupported server url scheme '{other}'")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch '{server_url}' to {scheme}"))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

/// Turns a non-success response into an error, preferring the server's
/// `ApiError` body when it sent one.
async fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(ApiException::from(api_error))
            .with_context(|| format!("data API request failed with {status}")),
        Err(_) => Err(anyhow!("data API request failed with {status}: {body}")),
    }
}

#[async_trait]
impl DataClient for HttpDataClient {
    async fn list(&self, kind: EntityKind, options: ListOptions) -> Result<ListPage> {
        let res = self
            .http
            .get(self.collection_url(kind))
            .query(&options)
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }

    async fn create(&self, kind: EntityKind, record: Value) -> Result<MutationResponse> {
        let res = self
            .http
            .post(self.collection_url(kind))
            .json(&record)
            .send()
            .await?;
        let status = res.status();
        if status.is_success() || status.is_client_error() {
            let body = res.bytes().await?;
            if let Ok(response) = serde_json::from_slice::<MutationResponse>(&body) {
                return Ok(response);
            }
            return Err(anyhow!(
                "unexpected {kind} create response ({status}): {}",
                String::from_utf8_lossy(&body)
            ));
        }
        Err(check_status(res).await.err().unwrap_or_else(|| {
            anyhow!("unexpected {kind} create response ({status})")
        }))
    }

    async fn update(&self, kind: EntityKind, record: Value) -> Result<Value> {
        let id = record_id(&record).ok_or_else(|| anyhow!("{kind} record is missing an id"))?;
        let res = self
            .http
            .put(format!("{}/{}", self.collection_url(kind), id))
            .json(&record)
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<()> {
        let res = self
            .http
            .delete(format!("{}/{}", self.collection_url(kind), id))
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl ObjectStore for HttpDataClient {
    async fn get_object(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let res = self
            .http
            .get(format!("{}/storage/{}", self.server_url, path))
            .send()
            .await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check_status(res).await?.bytes().await?.to_vec()))
    }

    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let res = self
            .http
            .put(format!("{}/storage/{}", self.server_url, path))
            .body(bytes)
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
