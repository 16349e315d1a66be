// ABOUTME: Boundary between the copy engine and the key-value store
// ABOUTME: The engine only ever talks to a table through the TableStore trait

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::error::Result;
use crate::schema::TableDescriptor;

pub mod dynamo;
#[cfg(test)]
pub(crate) mod mock;

pub use dynamo::DynamoStore;

/// One record, keyed by attribute name.
pub type Item = HashMap<String, AttributeValue>;

/// Opaque scan position: the last key the store evaluated.
pub type Cursor = Item;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// `None` once the table has been read to the end.
    pub next_cursor: Option<Cursor>,
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn describe_table(&self, table: &str) -> Result<TableDescriptor>;

    /// Create a table from an already sanitized descriptor.
    async fn create_table(&self, request: &TableDescriptor) -> Result<()>;

    async fn scan(&self, table: &str, limit: i32, cursor: Option<Cursor>) -> Result<ScanPage>;

    /// Write every item as a put request in one call and hand back the ones
    /// the store did not process.
    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<Vec<Item>>;

    async fn update_continuous_backups(&self, table: &str, enabled: bool) -> Result<()>;

    /// Whether point-in-time recovery is enabled on `table`.
    async fn describe_continuous_backups(&self, table: &str) -> Result<bool>;
}
