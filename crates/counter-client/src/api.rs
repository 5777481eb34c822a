//! Counter server HTTP client.

use async_trait::async_trait;
use counter_core::{
    ColorRequest, Counter, CounterListResponse, CounterPatch, CounterResponse, DeltaRequest,
    ErrorBody, NewCounter, UserColor,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// The mutations the offline queue replays.
///
/// [`CounterApi`] is the real implementation; the seam exists so replay
/// ordering can be checked without a server.
#[async_trait]
pub trait RemoteCounters: Send + Sync {
    async fn list(&self) -> Result<Vec<Counter>>;

    /// Create, or upsert when `input.id` already exists on the server.
    async fn create(&self, input: &NewCounter) -> Result<Counter>;

    async fn update(&self, id: &str, patch: &CounterPatch) -> Result<Counter>;

    async fn delete(&self, id: &str) -> Result<Counter>;

    /// Apply a non-zero delta.
    async fn apply_delta(&self, id: &str, delta: i64) -> Result<Counter>;
}

/// Client for the counter server's request/response endpoints.
#[derive(Clone)]
pub struct CounterApi {
    http: Client,
    config: ClientConfig,
}

impl CounterApi {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Check whether the server answers its health endpoint.
    pub async fn health_check(&self) -> bool {
        let url = self.config.health_url();
        debug!("Health check: {}", url);

        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Counter> {
        let resp = self.http.get(self.config.counter_url(id)).send().await?;
        Ok(read::<CounterResponse>(resp).await?.counter)
    }

    pub async fn increment(&self, id: &str) -> Result<Counter> {
        self.post_action(id, "increment").await
    }

    pub async fn decrement(&self, id: &str) -> Result<Counter> {
        self.post_action(id, "decrement").await
    }

    /// Set the value back to zero.
    pub async fn reset(&self, id: &str) -> Result<Counter> {
        self.post_action(id, "reset").await
    }

    /// Upload an image, replacing the current one.
    pub async fn put_image(&self, id: &str, content_type: &str, data: Vec<u8>) -> Result<Counter> {
        let resp = self
            .http
            .put(self.config.action_url(id, "image"))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;
        Ok(read::<CounterResponse>(resp).await?.counter)
    }

    pub async fn delete_image(&self, id: &str) -> Result<Counter> {
        let resp = self
            .http
            .delete(self.config.action_url(id, "image"))
            .send()
            .await?;
        Ok(read::<CounterResponse>(resp).await?.counter)
    }

    pub async fn list_colors(&self) -> Result<Vec<UserColor>> {
        let resp = self.http.get(self.config.colors_url()).send().await?;
        read(resp).await
    }

    pub async fn get_color(&self, username: &str) -> Result<UserColor> {
        let resp = self.http.get(self.config.color_url(username)).send().await?;
        read(resp).await
    }

    /// Assign a color. A color held by another user comes back as a 409.
    pub async fn set_color(&self, username: &str, color: &str) -> Result<UserColor> {
        let resp = self
            .http
            .put(self.config.color_url(username))
            .json(&ColorRequest {
                color: color.to_string(),
            })
            .send()
            .await?;
        read(resp).await
    }

    pub async fn delete_color(&self, username: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.config.color_url(username))
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    async fn post_action(&self, id: &str, action: &str) -> Result<Counter> {
        let resp = self.http.post(self.config.action_url(id, action)).send().await?;
        Ok(read::<CounterResponse>(resp).await?.counter)
    }
}

#[async_trait]
impl RemoteCounters for CounterApi {
    async fn list(&self) -> Result<Vec<Counter>> {
        let resp = self.http.get(self.config.counters_url()).send().await?;
        Ok(read::<CounterListResponse>(resp).await?.counters)
    }

    async fn create(&self, input: &NewCounter) -> Result<Counter> {
        let resp = self
            .http
            .post(self.config.counters_url())
            .json(input)
            .send()
            .await?;
        Ok(read::<CounterResponse>(resp).await?.counter)
    }

    async fn update(&self, id: &str, patch: &CounterPatch) -> Result<Counter> {
        let resp = self
            .http
            .put(self.config.counter_url(id))
            .json(patch)
            .send()
            .await?;
        Ok(read::<CounterResponse>(resp).await?.counter)
    }

    async fn delete(&self, id: &str) -> Result<Counter> {
        let resp = self.http.delete(self.config.counter_url(id)).send().await?;
        Ok(read::<CounterResponse>(resp).await?.counter)
    }

    async fn apply_delta(&self, id: &str, delta: i64) -> Result<Counter> {
        match delta {
            1 => self.increment(id).await,
            -1 => self.decrement(id).await,
            _ => {
                let resp = self
                    .http
                    .post(self.config.action_url(id, "delta"))
                    .json(&DeltaRequest { delta })
                    .send()
                    .await?;
                Ok(read::<CounterResponse>(resp).await?.counter)
            }
        }
    }
}

/// Turn a non-success status into [`ClientError::Api`].
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = check(resp).await?;
    Ok(resp.json::<T>().await?)
}
