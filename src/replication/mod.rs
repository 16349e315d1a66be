// ABOUTME: Table replication steps
// ABOUTME: Destination provisioning, the pre-flight check and the data copy loop

pub mod copy;
pub mod provision;

pub use copy::{CopyEngine, CopyProgress, PAGE_SIZE};
pub use provision::{check_tables, provision, reconcile_backups, wait_for_active, ProvisionOutcome};
