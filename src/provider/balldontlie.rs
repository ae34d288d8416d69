use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT, PROVIDER_PAGE_SIZE};
use crate::error::{AppError, ProviderError};
use crate::provider::{GameProvider, ProviderGame, ProviderTeam};

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Debug, Deserialize)]
struct ListMeta {
    #[serde(default)]
    next_cursor: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse<T> {
    data: T,
}

/// Client for the balldontlie MLB API.
#[derive(Debug, Clone)]
pub struct BalldontlieClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BalldontlieClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, AppError> {
        Self::new(&cfg.balldontlie_api_url, &cfg.balldontlie_api_key)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => ProviderError::NotFound,
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
                _ => ProviderError::Status {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GameProvider for BalldontlieClient {
    async fn list_games(&self, dates: &[NaiveDate]) -> Result<Vec<ProviderGame>, ProviderError> {
        let mut games = Vec::new();
        let mut cursor: Option<i64> = None;

        loop {
            let mut query: Vec<(String, String)> = dates
                .iter()
                .map(|d| ("dates[]".to_string(), d.format("%Y-%m-%d").to_string()))
                .collect();
            query.push(("per_page".to_string(), PROVIDER_PAGE_SIZE.to_string()));
            if let Some(c) = cursor {
                query.push(("cursor".to_string(), c.to_string()));
            }

            let page: ListResponse<ProviderGame> = self.get_json("/mlb/v1/games", &query).await?;
            debug!(count = page.data.len(), cursor = ?cursor, "fetched games page");
            games.extend(page.data);

            cursor = page.meta.and_then(|m| m.next_cursor);
            if cursor.is_none() {
                return Ok(games);
            }
        }
    }

    async fn get_game(&self, id: i64) -> Result<ProviderGame, ProviderError> {
        let resp: ItemResponse<ProviderGame> =
            self.get_json(&format!("/mlb/v1/games/{id}"), &[]).await?;
        Ok(resp.data)
    }

    async fn list_teams(&self) -> Result<Vec<ProviderTeam>, ProviderError> {
        let resp: ListResponse<ProviderTeam> = self.get_json("/mlb/v1/teams", &[]).await?;
        Ok(resp.data)
    }
}
