// ABOUTME: Entry point that sequences a whole copy run
// ABOUTME: Validate, connect, provision if asked, check both tables, then copy the data

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CopyConfig;
use crate::error::Result;
use crate::plan::CopyPlan;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::replication::{check_tables, provision, CopyEngine, CopyProgress, ProvisionOutcome};
use crate::store::{DynamoStore, TableStore};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyReport {
    /// Present when the destination was created by this run.
    pub provisioned: Option<ProvisionOutcome>,
    /// Absent in schema-only runs.
    pub progress: Option<CopyProgress>,
}

impl CopyReport {
    pub fn copied(&self) -> u64 {
        self.progress.as_ref().map_or(0, |p| p.copied)
    }
}

/// Copy between two DynamoDB tables as described by `config`.
///
/// Table names are validated before any client is built.
pub async fn copy(
    config: &CopyConfig,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<CopyReport> {
    let plan = CopyPlan::from_config(config)?;
    info!("Validation passed");

    let source = DynamoStore::connect(&config.source.client_config(&config.default_client)).await;
    let destination =
        DynamoStore::connect(&config.destination.client_config(&config.default_client)).await;

    run_copy(&plan, &source, &destination, reporter, cancel).await
}

/// Run `plan` against already constructed stores.
pub async fn run_copy(
    plan: &CopyPlan,
    source: &dyn TableStore,
    destination: &dyn TableStore,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<CopyReport> {
    let reporter: &dyn ProgressReporter = if plan.log { reporter } else { &NoProgress };

    let provisioned = if plan.create_if_missing {
        Some(provision(plan, source, destination, reporter, cancel).await?)
    } else {
        None
    };

    check_tables(plan, source, destination).await?;

    if plan.schema_only {
        info!(table = %plan.destination_table, "Schema only; skipping data copy");
        reporter.report(&ProgressEvent::SchemaReady {
            table: plan.destination_table.clone(),
        });
        return Ok(CopyReport {
            provisioned,
            progress: None,
        });
    }

    let progress = CopyEngine::new(plan, source, destination, reporter, cancel)
        .run(CopyProgress::starting_at(plan.resume.as_ref()))
        .await?;

    Ok(CopyReport {
        provisioned,
        progress: Some(progress),
    })
}
