use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{validate_page_size, CatalogRemote, ListQuery, MetadataKind, RawDetail, RawPage};
use crate::config::ApiConfig;
use crate::error::SyncError;

const USER_AGENT: &str = concat!("gamevault/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct NamedListResponse {
    #[serde(default)]
    results: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: Option<String>,
}

/// HTTP client for the RAWG catalog API.
pub struct RawgClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl RawgClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<T, SyncError> {
        let url = self.endpoint(path);
        tracing::debug!(%url, ?params, "catalog request");

        let response = self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Catalog request {} failed with status: {}", path, status);
            return Err(SyncError::protocol(status.as_u16()));
        }

        response.json::<T>().await.map_err(SyncError::from)
    }
}

#[async_trait]
impl CatalogRemote for RawgClient {
    async fn list_games(&self, query: &ListQuery) -> Result<RawPage, SyncError> {
        query.validate()?;
        self.get_json("games", &query.params()).await
    }

    async fn search_games(&self, query: &str, page_size: u32) -> Result<RawPage, SyncError> {
        validate_page_size(page_size)?;
        let params = [
            ("search", query.trim().to_string()),
            ("page_size", page_size.to_string()),
        ];
        self.get_json("games", &params).await
    }

    async fn get_game_detail(&self, id: &str) -> Result<RawDetail, SyncError> {
        let id = id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(SyncError::InvalidRequest(format!("Invalid game id: {:?}", id)));
        }
        self.get_json(&format!("games/{}", id), &[]).await
    }

    async fn list_names(&self, kind: MetadataKind) -> Result<Vec<String>, SyncError> {
        let params = match kind {
            MetadataKind::Genres => vec![],
            MetadataKind::Platforms | MetadataKind::Stores => vec![("ordering", "name".to_string())],
        };
        let response: NamedListResponse = self.get_json(kind.endpoint(), &params).await?;
        Ok(response
            .results
            .into_iter()
            .filter_map(|entry| entry.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}
