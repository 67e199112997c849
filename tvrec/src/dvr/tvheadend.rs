use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::models::{CreateEntry, DvrEntry, EntryGrid, EntryIdResponse};
use super::{DvrClient, DvrError};
use crate::catalog::{Credentials, parse_base_url};

const CREATE_PATH: &str = "api/dvr/entry/create";
const STOP_PATH: &str = "api/dvr/entry/stop";
const GRID_PATH: &str = "api/dvr/entry/grid";

/// TVHeadend HTTP API client.
#[derive(Debug, Clone)]
pub struct TvheadendClient {
    client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
    request_timeout: Duration,
}

impl TvheadendClient {
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        request_timeout: Duration,
    ) -> Result<Self, DvrError> {
        let base_url = parse_base_url(base_url).map_err(|e| DvrError::Unreachable(e.to_string()))?;
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(DvrError::from_transport)?;

        Ok(Self {
            client,
            base_url,
            credentials,
            request_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DvrError> {
        let base = if self.base_url.path().ends_with('/') {
            self.base_url.clone()
        } else {
            let mut base = self.base_url.clone();
            base.set_path(&format!("{}/", self.base_url.path()));
            base
        };
        base.join(path)
            .map_err(|e| DvrError::Unreachable(format!("invalid endpoint {path}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, entry_id: Option<&str>) -> Result<Response, DvrError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(DvrError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND
            && let Some(id) = entry_id
        {
            return Err(DvrError::NotFound(id.to_string()));
        }

        let message = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), %message, "Backend rejected DVR request");
        Err(DvrError::BackendRejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DvrClient for TvheadendClient {
    async fn create_entry(&self, entry: &CreateEntry) -> Result<String, DvrError> {
        let conf = serde_json::to_string(entry).map_err(|e| DvrError::BackendRejected {
            status: 0,
            message: format!("unserializable entry: {e}"),
        })?;

        let request = self
            .client
            .post(self.endpoint(CREATE_PATH)?)
            .timeout(self.request_timeout)
            .form(&[("conf", conf)]);
        let response = self.send(request, None).await?;

        let body: EntryIdResponse = response.json().await.map_err(DvrError::from_transport)?;
        let uuid = body
            .uuid
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DvrError::BackendRejected {
                status: 200,
                message: "response carried no entry uuid".to_string(),
            })?;

        debug!(entry_id = %uuid, channel = %entry.channel, "Created DVR entry");
        Ok(uuid)
    }

    async fn stop_entry(&self, entry_id: &str, timeout: Duration) -> Result<(), DvrError> {
        let request = self
            .client
            .post(self.endpoint(STOP_PATH)?)
            .timeout(timeout)
            .form(&[("uuid", entry_id)]);
        self.send(request, Some(entry_id)).await?;

        debug!(entry_id, "Stopped DVR entry");
        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<DvrEntry>, DvrError> {
        let request = self
            .client
            .get(self.endpoint(GRID_PATH)?)
            .timeout(self.request_timeout)
            .query(&[("limit", "999999")]);
        let response = self.send(request, None).await?;

        let grid: EntryGrid = response.json().await.map_err(DvrError::from_transport)?;
        Ok(grid.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_base_path() {
        let client = TvheadendClient::new("http://host:9981/tvh", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint(STOP_PATH).unwrap().as_str(),
            "http://host:9981/tvh/api/dvr/entry/stop"
        );

        let root = TvheadendClient::new("host:9981", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            root.endpoint(GRID_PATH).unwrap().as_str(),
            "http://host:9981/api/dvr/entry/grid"
        );
    }

    #[test]
    fn transient_errors() {
        assert!(DvrError::Timeout.is_transient());
        assert!(DvrError::Unreachable("refused".into()).is_transient());
        assert!(!DvrError::NotFound("e1".into()).is_transient());
    }
}
