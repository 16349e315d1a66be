// ABOUTME: Immutable description of one copy run, derived from validated configuration
// ABOUTME: Holds the per-record transform and the optional resume point

use std::fmt;
use std::sync::Arc;

use crate::config::{BackupPolicy, CopyConfig, RetryLimits};
use crate::cursor;
use crate::error::{CopyError, Result};
use crate::store::{Cursor, Item};

type TransformFn = dyn Fn(Item, usize) -> Item + Send + Sync;

/// Per-record rewrite applied between scan and write.
///
/// Receives the record and its position within the scanned page.
#[derive(Clone)]
pub struct Transform(Arc<TransformFn>);

impl Transform {
    pub fn new(f: impl Fn(Item, usize) -> Item + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn identity() -> Self {
        Self::new(|item, _| item)
    }

    pub fn apply(&self, item: Item, index: usize) -> Item {
        (self.0)(item, index)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub cursor: Cursor,
    pub copied: u64,
}

#[derive(Debug, Clone)]
pub struct CopyPlan {
    pub source_table: String,
    pub destination_table: String,
    pub log: bool,
    pub create_if_missing: bool,
    pub schema_only: bool,
    pub continuous_backups: BackupPolicy,
    pub retry: RetryLimits,
    pub resume: Option<ResumePoint>,
    pub transform: Transform,
}

impl CopyPlan {
    /// Validate `config` and freeze it. Nothing here touches the network.
    pub fn from_config(config: &CopyConfig) -> Result<Self> {
        config.validate()?;

        let resume = config
            .resume
            .as_ref()
            .map(|resume| {
                cursor::decode(&resume.cursor)
                    .map(|cursor| ResumePoint {
                        cursor,
                        copied: resume.copied,
                    })
                    .map_err(|e| CopyError::configuration("resume.cursor", e))
            })
            .transpose()?;

        Ok(Self {
            source_table: config.source.table_name.clone(),
            destination_table: config.destination.table_name.clone(),
            log: config.log,
            create_if_missing: config.create_if_missing,
            schema_only: config.schema_only,
            continuous_backups: config.continuous_backups,
            retry: config.retry.clone(),
            resume,
            transform: config.transform.clone(),
        })
    }
}
