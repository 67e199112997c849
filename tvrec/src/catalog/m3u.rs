use std::path::Path;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{Channel, ChannelCatalog, CatalogError, Credentials};

/// Parse an extended M3U playlist into channels.
///
/// Each `#EXTINF` line names the channel for the next URI line; optional
/// `tvg-chno` attributes become channel numbers. URIs without a preceding
/// `#EXTINF` are named after the URI itself.
pub fn parse_m3u(text: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<(String, Option<u32>)> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            pending = Some(parse_extinf(info));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let (name, number) = pending.take().unwrap_or_else(|| (line.to_string(), None));
        channels.push(Channel {
            name,
            id: None,
            uri: Some(line.to_string()),
            number,
        });
    }

    channels
}

/// Split `-1 tvg-chno="5" group-title="A, B",Channel Name` into name and number.
fn parse_extinf(info: &str) -> (String, Option<u32>) {
    let mut in_quotes = false;
    let mut split_at = None;
    for (idx, ch) in info.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(idx);
                break;
            }
            _ => {}
        }
    }

    let (attrs, name) = match split_at {
        Some(idx) => (&info[..idx], info[idx + 1..].trim()),
        None => (info, ""),
    };
    let number = attribute(attrs, "tvg-chno").and_then(|n| n.parse().ok());

    (name.to_string(), number)
}

fn attribute<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    let start = attrs.find(&format!("{key}=\""))? + key.len() + 2;
    let len = attrs[start..].find('"')?;
    Some(&attrs[start..start + len])
}

/// Channels from an M3U playlist; streams are played straight from their URI.
#[derive(Debug, Clone, Default)]
pub struct PlaylistCatalog {
    channels: Vec<Channel>,
    credentials: Option<Credentials>,
}

impl PlaylistCatalog {
    pub fn new(channels: Vec<Channel>, credentials: Option<Credentials>) -> Self {
        Self {
            channels,
            credentials,
        }
    }

    /// Load a playlist from a local file or an `http(s)` URL.
    pub async fn load(
        location: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self, CatalogError> {
        let text = if location.starts_with("http://") || location.starts_with("https://") {
            let response = reqwest::get(location)
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| CatalogError::Playlist(e.to_string()))?;
            response
                .text()
                .await
                .map_err(|e| CatalogError::Playlist(e.to_string()))?
        } else {
            tokio::fs::read_to_string(Path::new(location))
                .await
                .map_err(|e| CatalogError::Playlist(format!("{location}: {e}")))?
        };

        let channels = parse_m3u(&text);
        debug!(count = channels.len(), location, "Loaded playlist");
        Ok(Self::new(channels, credentials))
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn find(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }
}

#[async_trait]
impl ChannelCatalog for PlaylistCatalog {
    async fn resolve_stream_url(
        &self,
        channel: &Channel,
        _profile: Option<&str>,
    ) -> Result<Url, CatalogError> {
        let uri = channel
            .uri
            .as_deref()
            .or_else(|| self.find(&channel.name).and_then(|c| c.uri.as_deref()))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CatalogError::MissingStreamUri(channel.name.clone()))?;

        let mut url = Url::parse(uri).map_err(|e| CatalogError::invalid_url(uri, e))?;
        if let Some(credentials) = &self.credentials {
            credentials.embed(&mut url)?;
        }
        Ok(url)
    }
}
