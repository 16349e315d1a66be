// ABOUTME: Creates the destination table from the source schema and waits for it
// ABOUTME: Also reconciles point-in-time recovery and runs the pre-flight status check

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BackupPolicy;
use crate::error::{CopyError, Result, Side};
use crate::plan::CopyPlan;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::retry::{pause, ACTIVATION_POLL_INTERVAL};
use crate::schema::sanitize;
use crate::store::TableStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// Source status at describe time. Reported, never enforced here.
    pub source_active: bool,
    pub activation_polls: u32,
    pub backups_enabled: bool,
}

pub async fn provision(
    plan: &CopyPlan,
    source: &dyn TableStore,
    destination: &dyn TableStore,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<ProvisionOutcome> {
    info!(
        source = %plan.source_table,
        destination = %plan.destination_table,
        "Creating destination table from source schema"
    );

    let mut descriptor = source.describe_table(&plan.source_table).await?;
    let source_active = descriptor.is_active();
    if !source_active {
        warn!(
            table = %plan.source_table,
            status = descriptor.status(),
            "Source table is not active; creating destination anyway"
        );
    }

    descriptor.table_name = plan.destination_table.clone();
    let request = sanitize(descriptor);
    destination.create_table(&request).await?;

    let activation_polls = wait_for_active(
        destination,
        &plan.destination_table,
        plan.retry.activation_timeout(),
        reporter,
        cancel,
    )
    .await?;

    let backups_enabled = reconcile_backups(plan, source, destination).await?;

    Ok(ProvisionOutcome {
        source_active,
        activation_polls,
        backups_enabled,
    })
}

/// Poll `table` once a second until it reports ACTIVE.
///
/// Returns the number of describe calls made. Describe failures are fatal;
/// only "not active yet" is retried.
pub async fn wait_for_active(
    store: &dyn TableStore,
    table: &str,
    timeout: Option<Duration>,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<u32> {
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled {
                operation: "wait_for_active",
                table: table.to_string(),
            });
        }

        let descriptor = store.describe_table(table).await?;
        polls += 1;
        reporter.report(&ProgressEvent::WaitingForTable {
            table: table.to_string(),
            polls,
        });

        if descriptor.is_active() {
            info!(table, polls, "Destination table is active");
            reporter.report(&ProgressEvent::TableActive {
                table: table.to_string(),
            });
            return Ok(polls);
        }
        debug!(table, status = descriptor.status(), polls, "Waiting for table");

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                return Err(CopyError::Timeout {
                    operation: "wait_for_active",
                    table: table.to_string(),
                    attempts: polls,
                });
            }
        }

        pause(ACTIVATION_POLL_INTERVAL, cancel, "wait_for_active", table).await?;
    }
}

/// Apply the backup policy to the destination. Returns whether it was enabled.
///
/// Never disables point-in-time recovery.
pub async fn reconcile_backups(
    plan: &CopyPlan,
    source: &dyn TableStore,
    destination: &dyn TableStore,
) -> Result<bool> {
    let enable = match plan.continuous_backups {
        BackupPolicy::Never => false,
        BackupPolicy::AlwaysEnable => true,
        BackupPolicy::Copy => {
            source
                .describe_continuous_backups(&plan.source_table)
                .await?
        }
    };

    if !enable {
        debug!(policy = %plan.continuous_backups, "Leaving continuous backups untouched");
        return Ok(false);
    }

    info!(table = %plan.destination_table, "Enabling continuous backups");
    destination
        .update_continuous_backups(&plan.destination_table, true)
        .await?;
    Ok(true)
}

/// Both tables must be ACTIVE before any data moves.
pub async fn check_tables(
    plan: &CopyPlan,
    source: &dyn TableStore,
    destination: &dyn TableStore,
) -> Result<()> {
    let sides: [(Side, &dyn TableStore, &str); 2] = [
        (Side::Source, source, &plan.source_table),
        (Side::Destination, destination, &plan.destination_table),
    ];

    for (side, store, table) in sides {
        let descriptor = store.describe_table(table).await?;
        if !descriptor.is_active() {
            return Err(CopyError::Precondition {
                side,
                table: table.to_string(),
                status: descriptor.status().to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CopyConfig;
    use crate::progress::recording::RecordingReporter;
    use crate::progress::NoProgress;
    use crate::schema::TableDescriptor;
    use crate::store::mock::{Call, MockStore};
    use serde_json::json;

    fn plan(policy: BackupPolicy) -> CopyPlan {
        let mut config = CopyConfig::new("Orders", "OrdersCopy");
        config.create_if_missing = true;
        config.continuous_backups = policy;
        CopyPlan::from_config(&config).unwrap()
    }

    fn orders() -> TableDescriptor {
        serde_json::from_value(json!({
            "TableName": "Orders",
            "TableStatus": "ACTIVE",
            "TableArn": "arn:aws:dynamodb:eu-west-1:123456789012:table/Orders",
            "ItemCount": 10,
            "KeySchema": [{ "AttributeName": "id", "KeyType": "HASH" }],
            "AttributeDefinitions": [{ "AttributeName": "id", "AttributeType": "S" }],
            "ProvisionedThroughput": { "ReadCapacityUnits": 0, "WriteCapacityUnits": 0 },
            "BillingModeSummary": { "BillingMode": "PAY_PER_REQUEST" }
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_creates_sanitized_copy_and_waits() {
        let source = MockStore::new().with_table(orders());
        let destination =
            MockStore::new().with_statuses("OrdersCopy", &["CREATING", "CREATING", "ACTIVE"]);
        let reporter = RecordingReporter::default();

        let outcome = provision(
            &plan(BackupPolicy::Never),
            &source,
            &destination,
            &reporter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.source_active);
        assert_eq!(outcome.activation_polls, 3);
        assert!(!outcome.backups_enabled);

        let created = destination
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::CreateTable(request) => Some(request),
                _ => None,
            })
            .unwrap();
        assert_eq!(created.table_name, "OrdersCopy");
        assert!(created.table_status.is_none());
        assert!(created.table_arn.is_none());
        assert!(created.item_count.is_none());
        assert!(created.provisioned_throughput.is_none());
        assert_eq!(created.billing_mode.as_deref(), Some("PAY_PER_REQUEST"));

        let waiting: Vec<u32> = reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::WaitingForTable { polls, .. } => Some(polls),
                _ => None,
            })
            .collect();
        assert_eq!(waiting, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_polls_once_a_second() {
        let store = MockStore::new()
            .with_active_table("OrdersCopy")
            .with_statuses("OrdersCopy", &["CREATING", "CREATING", "CREATING", "ACTIVE"]);

        let polls = wait_for_active(
            &store,
            "OrdersCopy",
            None,
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(polls, 4);

        let times: Vec<Instant> = store.timed_calls().into_iter().map(|(t, _)| t).collect();
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], ACTIVATION_POLL_INTERVAL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_deadline_becomes_timeout() {
        let store = MockStore::new()
            .with_active_table("OrdersCopy")
            .with_statuses("OrdersCopy", &["CREATING"]);

        let err = wait_for_active(
            &store,
            "OrdersCopy",
            Some(Duration::from_secs(3)),
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            CopyError::Timeout {
                operation, attempts, ..
            } => {
                assert_eq!(operation, "wait_for_active");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_poll_honours_cancellation() {
        let store = MockStore::new()
            .with_active_table("OrdersCopy")
            .with_statuses("OrdersCopy", &["CREATING"]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = wait_for_active(&store, "OrdersCopy", None, &NoProgress, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::Cancelled { .. }));
        assert_eq!(store.count(|c| matches!(c, Call::DescribeTable(_))), 3);
    }

    #[tokio::test]
    async fn test_describe_failure_during_poll_is_fatal() {
        let store = MockStore::new().failing("describe_table");
        let err = wait_for_active(
            &store,
            "OrdersCopy",
            None,
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CopyError::Service { .. }));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_aborts_provisioning() {
        let source = MockStore::new().with_table(orders());
        let destination = MockStore::new().with_active_table("OrdersCopy");

        let err = provision(
            &plan(BackupPolicy::Copy),
            &source,
            &destination,
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CopyError::Service {
                operation: "create_table",
                ..
            }
        ));
        assert_eq!(destination.backup_updates(), 0);
    }

    #[tokio::test]
    async fn test_inactive_source_is_reported_not_enforced() {
        let mut updating = orders();
        updating.table_status = Some("UPDATING".to_string());
        let source = MockStore::new().with_table(updating);
        let destination = MockStore::new();

        let outcome = provision(
            &plan(BackupPolicy::Never),
            &source,
            &destination,
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!outcome.source_active);
        assert_eq!(outcome.activation_polls, 1);
    }

    #[tokio::test]
    async fn test_copy_policy_with_source_disabled_leaves_destination() {
        let source = MockStore::new().with_backups(false);
        let destination = MockStore::new();

        let enabled = reconcile_backups(&plan(BackupPolicy::Copy), &source, &destination)
            .await
            .unwrap();
        assert!(!enabled);
        assert_eq!(destination.backup_updates(), 0);
        assert_eq!(source.count(|c| matches!(c, Call::DescribeBackups(_))), 1);
    }

    #[tokio::test]
    async fn test_copy_policy_with_source_enabled_enables_once() {
        let source = MockStore::new().with_backups(true);
        let destination = MockStore::new();

        let enabled = reconcile_backups(&plan(BackupPolicy::Copy), &source, &destination)
            .await
            .unwrap();
        assert!(enabled);
        assert_eq!(
            destination.calls(),
            vec![Call::UpdateBackups {
                table: "OrdersCopy".to_string(),
                enabled: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_always_and_never_policies_skip_source() {
        let source = MockStore::new().with_backups(false);
        let destination = MockStore::new();

        assert!(
            reconcile_backups(&plan(BackupPolicy::AlwaysEnable), &source, &destination)
                .await
                .unwrap()
        );
        assert!(
            !reconcile_backups(&plan(BackupPolicy::Never), &source, &destination)
                .await
                .unwrap()
        );
        assert!(source.calls().is_empty());
        assert_eq!(destination.backup_updates(), 1);
    }

    #[tokio::test]
    async fn test_check_tables_requires_both_active() {
        let plan = plan(BackupPolicy::Never);
        let active_source = MockStore::new().with_active_table("Orders");
        let creating_destination = MockStore::new()
            .with_active_table("OrdersCopy")
            .with_statuses("OrdersCopy", &["CREATING"]);

        let err = check_tables(&plan, &active_source, &creating_destination)
            .await
            .unwrap_err();
        match err {
            CopyError::Precondition { side, status, .. } => {
                assert_eq!(side, Side::Destination);
                assert_eq!(status, "CREATING");
            }
            other => panic!("unexpected error: {other}"),
        }

        let deleting_source = MockStore::new()
            .with_active_table("Orders")
            .with_statuses("Orders", &["DELETING"]);
        let active_destination = MockStore::new().with_active_table("OrdersCopy");
        let err = check_tables(&plan, &deleting_source, &active_destination)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CopyError::Precondition {
                side: Side::Source,
                ..
            }
        ));
        assert!(active_destination.calls().is_empty());

        assert!(check_tables(&plan, &active_source, &active_destination)
            .await
            .is_ok());
    }
}
