use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use unibox_core::domain::interaction::{Channel, Marketplace};

use crate::error::ConnectorError;
use crate::retry::AuthMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    ListItems,
    SendReply,
    GetUpdates,
    MarkRead,
}

/// The set of operations a connector actually implements. `list_items` and
/// `send_reply` are mandatory for every connector; `get_updates` and
/// `mark_read` are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn base() -> Self {
        let mut set = Self::default();
        set.capabilities.insert(Capability::ListItems);
        set.capabilities.insert(Capability::SendReply);
        set
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// A raw record as the marketplace returned it, before normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub payload: serde_json::Value,
}

impl RawItem {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListFilters {
    pub updated_since: Option<DateTime<Utc>>,
    pub page: Option<String>,
    pub page_size: u32,
}

#[derive(Clone, Debug, Default)]
pub struct ItemPage {
    pub items: Vec<RawItem>,
    pub next_page: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateBatch {
    pub items: Vec<RawItem>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyAck {
    pub external_id: String,
    pub marketplace_message_id: Option<String>,
}

/// One marketplace×channel API client.
///
/// Methods take a single attempt; retry policy is composed around them with
/// `retry::execute_with_retry`, which also drives the `AuthMode` switch on
/// an auth rejection.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    fn marketplace(&self) -> &Marketplace;

    fn channel(&self) -> Channel;

    fn capabilities(&self) -> CapabilitySet;

    async fn list_items(
        &self,
        filters: &ListFilters,
        auth: AuthMode,
    ) -> Result<ItemPage, ConnectorError>;

    async fn send_reply(
        &self,
        external_id: &str,
        text: &str,
        auth: AuthMode,
    ) -> Result<ReplyAck, ConnectorError>;

    async fn get_updates(
        &self,
        _cursor: Option<&str>,
        _auth: AuthMode,
    ) -> Result<UpdateBatch, ConnectorError> {
        Err(ConnectorError::NotSupported { operation: "get_updates" })
    }

    async fn mark_read(
        &self,
        _external_id: &str,
        _auth: AuthMode,
    ) -> Result<(), ConnectorError> {
        Err(ConnectorError::NotSupported { operation: "mark_read" })
    }
}
