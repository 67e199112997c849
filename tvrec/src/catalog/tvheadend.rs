use async_trait::async_trait;
use url::Url;

use super::{Channel, ChannelCatalog, CatalogError, Credentials, parse_base_url};

/// Stream URLs served by a TVHeadend backend: `{base}/stream/channel/{uuid}`.
#[derive(Debug, Clone)]
pub struct TvheadendCatalog {
    base_url: Url,
    credentials: Option<Credentials>,
}

impl TvheadendCatalog {
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> Result<Self, CatalogError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            credentials,
        })
    }

    pub fn stream_url(&self, channel: &Channel, profile: Option<&str>) -> Result<Url, CatalogError> {
        let id = channel
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CatalogError::MissingChannelId(channel.name.clone()))?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::invalid_url(self.base_url.as_str(), "cannot be a base"))?
            .pop_if_empty()
            .extend(["stream", "channel", id]);

        if let Some(profile) = profile.filter(|p| !p.is_empty()) {
            url.query_pairs_mut().append_pair("profile", profile);
        }

        if let Some(credentials) = &self.credentials {
            credentials.embed(&mut url)?;
        }

        Ok(url)
    }
}

#[async_trait]
impl ChannelCatalog for TvheadendCatalog {
    async fn resolve_stream_url(
        &self,
        channel: &Channel,
        profile: Option<&str>,
    ) -> Result<Url, CatalogError> {
        self.stream_url(channel, profile)
    }
}
