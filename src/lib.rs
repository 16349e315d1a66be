// ABOUTME: Library root for the DynamoDB table copier
// ABOUTME: Re-exports the configuration, entry points and store boundary

pub mod config;
pub mod cursor;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod replication;
pub mod retry;
pub mod schema;
pub mod store;

pub use config::{BackupPolicy, ClientConfig, CopyConfig, RetryLimits, TableConfig};
pub use error::{CopyError, Result, Side};
pub use orchestrator::{copy, run_copy, CopyReport};
pub use plan::{CopyPlan, Transform};
pub use progress::{NoProgress, ProgressEvent, ProgressReporter, SpinnerReporter};
pub use store::{DynamoStore, Item, TableStore};
