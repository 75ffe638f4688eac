//! Generic REST connector.
//!
//! Speaks the common wire shape (`/items`, `/items/{id}/reply`, `/updates`)
//! against a marketplace gateway. Marketplace-specific payload shapes are
//! handled upstream of this crate; this client only maps transport and
//! status-code semantics.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use unibox_core::domain::interaction::{Channel, Marketplace};

use crate::error::ConnectorError;
use crate::retry::AuthMode;
use crate::types::{
    Capability, CapabilitySet, ChannelConnector, ItemPage, ListFilters, RawItem, ReplyAck,
    UpdateBatch,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RestConnector {
    marketplace: Marketplace,
    channel: Channel,
    base_url: String,
    token: SecretString,
    capabilities: CapabilitySet,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    items: Vec<serde_json::Value>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    items: Vec<serde_json::Value>,
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    message_id: Option<String>,
}

impl RestConnector {
    pub fn new(
        marketplace: Marketplace,
        channel: Channel,
        base_url: impl Into<String>,
        token: SecretString,
        capabilities: CapabilitySet,
    ) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ConnectorError::Protocol {
                message: format!("failed to build http client: {error}"),
            })?;

        Ok(Self {
            marketplace,
            channel,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            capabilities,
            client,
        })
    }

    fn authorize(&self, request: RequestBuilder, auth: AuthMode) -> RequestBuilder {
        match auth {
            AuthMode::Primary => request.bearer_auth(self.token.expose_secret()),
            AuthMode::Alternate => request.header("X-Api-Key", self.token.expose_secret()),
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ConnectorError> {
        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                ConnectorError::timeout(error.to_string())
            } else {
                ConnectorError::Transport { message: error.to_string(), retryable: false }
            }
        })?;
        map_status(response)
    }
}

fn map_status(response: Response) -> Result<Response, ConnectorError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ConnectorError::Auth {
            message: format!("marketplace rejected credentials ({})", response.status()),
        }),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(ConnectorError::RateLimited { retry_after })
        }
        StatusCode::REQUEST_TIMEOUT => Err(ConnectorError::timeout("gateway request timeout")),
        status => {
            Err(ConnectorError::Protocol { message: format!("unexpected status {status}") })
        }
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ConnectorError> {
    response
        .json::<T>()
        .await
        .map_err(|error| ConnectorError::Protocol { message: format!("bad payload: {error}") })
}

#[async_trait]
impl ChannelConnector for RestConnector {
    fn marketplace(&self) -> &Marketplace {
        &self.marketplace
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    #[instrument(skip_all, fields(marketplace = %self.marketplace.0, channel = self.channel.as_str()))]
    async fn list_items(
        &self,
        filters: &ListFilters,
        auth: AuthMode,
    ) -> Result<ItemPage, ConnectorError> {
        let mut request = self
            .client
            .get(format!("{}/items", self.base_url))
            .query(&[("channel", self.channel.as_str())])
            .query(&[("page_size", filters.page_size)]);
        if let Some(page) = &filters.page {
            request = request.query(&[("page", page.as_str())]);
        }
        if let Some(updated_since) = filters.updated_since {
            request = request.query(&[("updated_since", updated_since.to_rfc3339())]);
        }

        let response = self.execute(self.authorize(request, auth)).await?;
        let decoded: ListResponse = decode(response).await?;
        Ok(ItemPage {
            items: decoded.items.into_iter().map(RawItem::new).collect(),
            next_page: decoded.next_page,
        })
    }

    #[instrument(skip_all, fields(marketplace = %self.marketplace.0, external_id))]
    async fn send_reply(
        &self,
        external_id: &str,
        text: &str,
        auth: AuthMode,
    ) -> Result<ReplyAck, ConnectorError> {
        let request = self
            .client
            .post(format!("{}/items/{}/reply", self.base_url, external_id))
            .json(&serde_json::json!({ "text": text }));

        let response = self.execute(self.authorize(request, auth)).await?;
        let decoded: ReplyResponse = decode(response).await?;
        Ok(ReplyAck {
            external_id: external_id.to_string(),
            marketplace_message_id: decoded.message_id,
        })
    }

    async fn get_updates(
        &self,
        cursor: Option<&str>,
        auth: AuthMode,
    ) -> Result<UpdateBatch, ConnectorError> {
        if !self.capabilities.supports(Capability::GetUpdates) {
            return Err(ConnectorError::NotSupported { operation: "get_updates" });
        }

        let mut request = self.client.get(format!("{}/updates", self.base_url));
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = self.execute(self.authorize(request, auth)).await?;
        let decoded: UpdatesResponse = decode(response).await?;
        Ok(UpdateBatch {
            items: decoded.items.into_iter().map(RawItem::new).collect(),
            next_cursor: decoded.next_cursor,
            has_more: decoded.has_more,
        })
    }

    async fn mark_read(
        &self,
        external_id: &str,
        auth: AuthMode,
    ) -> Result<(), ConnectorError> {
        if !self.capabilities.supports(Capability::MarkRead) {
            return Err(ConnectorError::NotSupported { operation: "mark_read" });
        }

        let request = self.client.post(format!("{}/items/{}/read", self.base_url, external_id));
        self.execute(self.authorize(request, auth)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::RestConnector;
    use crate::error::ConnectorError;
    use crate::retry::AuthMode;
    use crate::types::{CapabilitySet, ChannelConnector};
    use unibox_core::domain::interaction::{Channel, Marketplace};

    fn connector(capabilities: CapabilitySet) -> RestConnector {
        RestConnector::new(
            Marketplace("testmart".to_string()),
            Channel::Question,
            "http://localhost:9/api/",
            SecretString::from("tok-1"),
            capabilities,
        )
        .expect("client builds")
    }

    #[test]
    fn base_url_is_stored_without_trailing_slash() {
        let connector = connector(CapabilitySet::base());
        assert_eq!(connector.base_url, "http://localhost:9/api");
    }

    #[tokio::test]
    async fn unadvertised_optional_operations_report_not_supported() {
        let connector = connector(CapabilitySet::base());

        let updates = connector.get_updates(None, AuthMode::Primary).await;
        assert!(matches!(
            updates,
            Err(ConnectorError::NotSupported { operation: "get_updates" })
        ));

        let mark = connector.mark_read("X-1", AuthMode::Primary).await;
        assert!(matches!(mark, Err(ConnectorError::NotSupported { operation: "mark_read" })));
    }
}
