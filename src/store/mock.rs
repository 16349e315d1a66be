// ABOUTME: Scripted in-memory TableStore used by the engine tests
// ABOUTME: Records every call with the (virtual) time it was made

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use tokio::time::Instant;

use super::{Cursor, Item, ScanPage, TableStore};
use crate::error::{CopyError, Result};
use crate::schema::TableDescriptor;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    DescribeTable(String),
    CreateTable(TableDescriptor),
    Scan {
        table: String,
        limit: i32,
        cursor: Option<Cursor>,
    },
    BatchWrite {
        table: String,
        items: Vec<Item>,
    },
    UpdateBackups {
        table: String,
        enabled: bool,
    },
    DescribeBackups(String),
}

#[derive(Default)]
struct State {
    tables: HashMap<String, TableDescriptor>,
    statuses: HashMap<String, VecDeque<String>>,
    pages: Vec<Vec<Item>>,
    unprocessed: VecDeque<usize>,
    backups_enabled: bool,
    failing: Option<&'static str>,
    written: Vec<Item>,
    calls: Vec<(Instant, Call)>,
}

#[derive(Default)]
pub(crate) struct MockStore {
    state: Mutex<State>,
}

pub(crate) fn item(id: usize) -> Item {
    HashMap::from([
        ("id".to_string(), AttributeValue::S(format!("item-{id}"))),
        ("n".to_string(), AttributeValue::N(id.to_string())),
    ])
}

/// `total` items split into pages of `page_size`.
pub(crate) fn pages(total: usize, page_size: usize) -> Vec<Vec<Item>> {
    (0..total)
        .map(item)
        .collect::<Vec<_>>()
        .chunks(page_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

fn page_cursor(page: usize) -> Cursor {
    HashMap::from([("page".to_string(), AttributeValue::N(page.to_string()))])
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn with_table(self, descriptor: TableDescriptor) -> Self {
        self.state()
            .tables
            .insert(descriptor.table_name.clone(), descriptor);
        self
    }

    pub(crate) fn with_active_table(self, name: &str) -> Self {
        self.with_table(TableDescriptor {
            table_name: name.to_string(),
            table_status: Some("ACTIVE".to_string()),
            ..Default::default()
        })
    }

    /// Statuses returned by successive describes; the last one sticks.
    pub(crate) fn with_statuses(self, name: &str, statuses: &[&str]) -> Self {
        self.state().statuses.insert(
            name.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub(crate) fn with_pages(self, pages: Vec<Vec<Item>>) -> Self {
        self.state().pages = pages;
        self
    }

    /// How many items each successive batch write leaves unprocessed.
    pub(crate) fn with_unprocessed(self, counts: &[usize]) -> Self {
        self.state().unprocessed = counts.iter().copied().collect();
        self
    }

    pub(crate) fn with_backups(self, enabled: bool) -> Self {
        self.state().backups_enabled = enabled;
        self
    }

    /// Make every call to `operation` fail with a service error.
    pub(crate) fn failing(self, operation: &'static str) -> Self {
        self.state().failing = Some(operation);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    pub(crate) fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.state().calls.clone()
    }

    pub(crate) fn written(&self) -> Vec<Item> {
        self.state().written.clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub(crate) fn scans(&self) -> usize {
        self.count(|c| matches!(c, Call::Scan { .. }))
    }

    pub(crate) fn writes(&self) -> usize {
        self.count(|c| matches!(c, Call::BatchWrite { .. }))
    }

    pub(crate) fn backup_updates(&self) -> usize {
        self.count(|c| matches!(c, Call::UpdateBackups { .. }))
    }

    fn record(&self, operation: &'static str, table: &str, call: Call) -> Result<()> {
        let mut state = self.state();
        state.calls.push((Instant::now(), call));
        if state.failing == Some(operation) {
            return Err(CopyError::service(operation, table, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for MockStore {
    async fn describe_table(&self, table: &str) -> Result<TableDescriptor> {
        self.record("describe_table", table, Call::DescribeTable(table.to_string()))?;
        let mut state = self.state();

        let scripted = state.statuses.get_mut(table).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });

        let mut descriptor = state.tables.get(table).cloned().ok_or_else(|| {
            CopyError::service("describe_table", table, "ResourceNotFoundException")
        })?;
        if let Some(status) = scripted {
            descriptor.table_status = Some(status);
        }
        Ok(descriptor)
    }

    async fn create_table(&self, request: &TableDescriptor) -> Result<()> {
        let table = request.table_name.as_str();
        self.record("create_table", table, Call::CreateTable(request.clone()))?;
        let mut state = self.state();
        if state.tables.contains_key(table) {
            return Err(CopyError::service(
                "create_table",
                table,
                "ResourceInUseException",
            ));
        }
        // Scripted statuses (see `with_statuses`) override this on describe.
        let mut created = request.clone();
        created.table_status = Some("ACTIVE".to_string());
        state.tables.insert(table.to_string(), created);
        Ok(())
    }

    async fn scan(&self, table: &str, limit: i32, cursor: Option<Cursor>) -> Result<ScanPage> {
        self.record(
            "scan",
            table,
            Call::Scan {
                table: table.to_string(),
                limit,
                cursor: cursor.clone(),
            },
        )?;
        let state = self.state();

        let page = match cursor.as_ref().and_then(|c| c.get("page")) {
            Some(AttributeValue::N(n)) => n.parse::<usize>().unwrap_or(0),
            _ => 0,
        };
        let items = state.pages.get(page).cloned().unwrap_or_default();
        assert!(items.len() <= limit as usize, "page larger than scan limit");

        let next_cursor = (page + 1 < state.pages.len()).then(|| page_cursor(page + 1));
        Ok(ScanPage { items, next_cursor })
    }

    async fn batch_write(&self, table: &str, mut items: Vec<Item>) -> Result<Vec<Item>> {
        self.record(
            "batch_write",
            table,
            Call::BatchWrite {
                table: table.to_string(),
                items: items.clone(),
            },
        )?;
        let mut state = self.state();

        let rejected = state.unprocessed.pop_front().unwrap_or(0).min(items.len());
        let unprocessed = items.split_off(items.len() - rejected);
        state.written.extend(items);
        Ok(unprocessed)
    }

    async fn update_continuous_backups(&self, table: &str, enabled: bool) -> Result<()> {
        self.record(
            "update_continuous_backups",
            table,
            Call::UpdateBackups {
                table: table.to_string(),
                enabled,
            },
        )?;
        self.state().backups_enabled = enabled;
        Ok(())
    }

    async fn describe_continuous_backups(&self, table: &str) -> Result<bool> {
        self.record(
            "describe_continuous_backups",
            table,
            Call::DescribeBackups(table.to_string()),
        )?;
        Ok(self.state().backups_enabled)
    }
}
