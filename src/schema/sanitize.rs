// ABOUTME: Turns a described table into a creation request
// ABOUTME: Strips server-assigned fields, telemetry and status reports; idempotent

use super::models::{
    SecondaryIndex, SseSpecification, TableDescriptor, Throughput, SSE_ENABLED, SSE_ENABLING,
};

/// Strip everything from `table` that only makes sense for an existing table.
///
/// The result can be handed to `create_table` as-is. Running it again on its
/// own output changes nothing.
pub fn sanitize(mut table: TableDescriptor) -> TableDescriptor {
    table.table_status = None;
    table.creation_date_time = None;
    table.table_size_bytes = None;
    table.item_count = None;
    table.table_arn = None;
    table.table_id = None;
    table.latest_stream_label = None;
    table.latest_stream_arn = None;

    table.provisioned_throughput = table.provisioned_throughput.and_then(strip_throughput);

    for index in &mut table.local_secondary_indexes {
        strip_index(index);
        index.provisioned_throughput = None;
    }
    for index in &mut table.global_secondary_indexes {
        strip_index(index);
        index.provisioned_throughput = index
            .provisioned_throughput
            .take()
            .and_then(strip_throughput);
    }

    // Key ARNs are bound to the source's region and account, so only the
    // on/off state is requested.
    if let Some(description) = table.sse_description.take() {
        table.sse_specification = Some(SseSpecification {
            enabled: matches!(
                description.status.as_deref(),
                Some(SSE_ENABLED) | Some(SSE_ENABLING)
            ),
            ..Default::default()
        });
    }

    if let Some(summary) = table.billing_mode_summary.take() {
        table.billing_mode = summary.billing_mode;
    }

    table
}

/// Zero capacity means on-demand: the block must be omitted entirely.
fn strip_throughput(throughput: Throughput) -> Option<Throughput> {
    if throughput.is_on_demand() {
        return None;
    }
    Some(Throughput {
        last_increase_date_time: None,
        last_decrease_date_time: None,
        number_of_decreases_today: None,
        ..throughput
    })
}

fn strip_index(index: &mut SecondaryIndex) {
    index.index_status = None;
    index.backfilling = None;
    index.index_size_bytes = None;
    index.item_count = None;
    index.index_arn = None;
}
