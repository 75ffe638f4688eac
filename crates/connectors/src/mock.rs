//! Scripted connector for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use unibox_core::domain::interaction::{Channel, Marketplace};

use crate::error::ConnectorError;
use crate::retry::AuthMode;
use crate::types::{
    CapabilitySet, ChannelConnector, ItemPage, ListFilters, RawItem, ReplyAck, UpdateBatch,
};

/// A connector that replays a scripted sequence of page results. Each call
/// to `list_items` pops the next script entry; an exhausted script returns
/// an empty final page.
pub struct MockConnector {
    marketplace: Marketplace,
    channel: Channel,
    capabilities: CapabilitySet,
    pages: Mutex<VecDeque<Result<ItemPage, ConnectorError>>>,
    replies: Mutex<Vec<(String, String)>>,
    reject_primary_auth: bool,
}

impl MockConnector {
    pub fn new(marketplace: impl Into<String>, channel: Channel) -> Self {
        Self {
            marketplace: Marketplace(marketplace.into()),
            channel,
            capabilities: CapabilitySet::base(),
            pages: Mutex::new(VecDeque::new()),
            replies: Mutex::new(Vec::new()),
            reject_primary_auth: false,
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make every call fail with `Auth` while the primary credential
    /// encoding is presented. Alternate encoding succeeds.
    pub fn rejecting_primary_auth(mut self) -> Self {
        self.reject_primary_auth = true;
        self
    }

    pub fn push_page(&self, page: ItemPage) {
        self.pages.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_error(&self, error: ConnectorError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    pub fn push_items(&self, items: Vec<RawItem>, next_page: Option<&str>) {
        self.push_page(ItemPage { items, next_page: next_page.map(str::to_string) });
    }

    /// Replies recorded by `send_reply`, as `(external_id, text)` pairs.
    pub fn sent_replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    fn check_auth(&self, auth: AuthMode) -> Result<(), ConnectorError> {
        if self.reject_primary_auth && auth == AuthMode::Primary {
            return Err(ConnectorError::Auth {
                message: "primary encoding rejected".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    fn marketplace(&self) -> &Marketplace {
        &self.marketplace
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    async fn list_items(
        &self,
        _filters: &ListFilters,
        auth: AuthMode,
    ) -> Result<ItemPage, ConnectorError> {
        self.check_auth(auth)?;
        self.pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(ItemPage::default()))
    }

    async fn send_reply(
        &self,
        external_id: &str,
        text: &str,
        auth: AuthMode,
    ) -> Result<ReplyAck, ConnectorError> {
        self.check_auth(auth)?;
        self.replies.lock().unwrap().push((external_id.to_string(), text.to_string()));
        Ok(ReplyAck {
            external_id: external_id.to_string(),
            marketplace_message_id: Some(format!("mock-{external_id}")),
        })
    }

    async fn get_updates(
        &self,
        _cursor: Option<&str>,
        auth: AuthMode,
    ) -> Result<UpdateBatch, ConnectorError> {
        self.check_auth(auth)?;
        Ok(UpdateBatch::default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::MockConnector;
    use crate::error::ConnectorError;
    use crate::retry::{execute_with_retry, AuthMode, RetrySchedule};
    use crate::types::{ChannelConnector, ListFilters, RawItem};
    use unibox_core::domain::interaction::Channel;

    #[tokio::test]
    async fn scripted_pages_replay_in_order_then_run_dry() {
        let connector = MockConnector::new("testmart", Channel::Question);
        connector.push_items(vec![RawItem::new(json!({"id": "Q-1"}))], Some("2"));
        connector.push_items(vec![RawItem::new(json!({"id": "Q-2"}))], None);

        let filters = ListFilters::default();
        let first = connector.list_items(&filters, AuthMode::Primary).await.unwrap();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.next_page.as_deref(), Some("2"));

        let second = connector.list_items(&filters, AuthMode::Primary).await.unwrap();
        assert_eq!(second.next_page, None);

        let dry = connector.list_items(&filters, AuthMode::Primary).await.unwrap();
        assert!(dry.items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn primary_auth_rejection_recovers_through_the_retry_layer() {
        let connector = MockConnector::new("testmart", Channel::Review).rejecting_primary_auth();
        connector.push_items(vec![RawItem::new(json!({"id": "R-1"}))], None);

        let filters = ListFilters::default();
        let (page, stats) =
            execute_with_retry("list_items", &RetrySchedule::default(), |auth| {
                connector.list_items(&filters, auth)
            })
            .await
            .expect("alternate encoding succeeds");

        assert_eq!(page.items.len(), 1);
        assert_eq!(stats.attempts, 2);
    }

    #[tokio::test]
    async fn replies_are_recorded() {
        let connector = MockConnector::new("testmart", Channel::Chat);
        connector.send_reply("M-9", "On its way.", AuthMode::Primary).await.unwrap();
        assert_eq!(
            connector.sent_replies(),
            vec![("M-9".to_string(), "On its way.".to_string())]
        );
    }

    #[tokio::test]
    async fn scripted_errors_surface_to_the_caller() {
        let connector = MockConnector::new("testmart", Channel::Question);
        connector.push_error(ConnectorError::RateLimited { retry_after: None });

        let result = connector.list_items(&ListFilters::default(), AuthMode::Primary).await;
        assert!(matches!(result, Err(ConnectorError::RateLimited { .. })));
    }
}
