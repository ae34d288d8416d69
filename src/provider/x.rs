use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::{Config, HTTP_TIMEOUT};
use crate::error::{AppError, DeliveryError};
use crate::provider::Announcer;

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    data: CreatedPost,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

/// Posts announcements through the X API v2 with an OAuth 2.0 user token.
#[derive(Debug, Clone)]
pub struct XClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl XClient {
    pub fn new(base_url: &str, access_token: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Token is optional when announcements are disabled; posting then always
    /// fails, but the dispatcher never calls it.
    pub fn from_config(cfg: &Config) -> Result<Self, AppError> {
        Self::new(&cfg.x_api_url, cfg.x_access_token.as_deref().unwrap_or_default())
    }
}

#[async_trait]
impl Announcer for XClient {
    async fn post(&self, text: &str) -> Result<String, DeliveryError> {
        let resp = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await?;
        let created: CreatePostResponse =
            serde_json::from_slice(&body).map_err(|e| DeliveryError::Decode(e.to_string()))?;
        Ok(created.data.id)
    }
}
