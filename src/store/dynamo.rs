// ABOUTME: DynamoDB implementation of the TableStore boundary
// ABOUTME: Builds SDK clients from client config and converts between SDK and descriptor types

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::error::BuildError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemOutput;
use aws_sdk_dynamodb::operation::scan::ScanOutput;
use aws_sdk_dynamodb::primitives::DateTime as SdkDateTime;
use aws_sdk_dynamodb::types as ddb;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Cursor, Item, ScanPage, TableStore};
use crate::config::ClientConfig;
use crate::error::{CopyError, Result};
use crate::schema::models::{
    AttributeDefinition, BillingModeSummary, KeySchemaElement, Projection, SecondaryIndex,
    SseDescription, SseSpecification, StreamSpecification, TableDescriptor, Throughput,
};

#[derive(Clone, Debug)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Build a client for one side of the copy.
    ///
    /// Unset fields fall back to the SDK's default provider chain.
    pub async fn connect(config: &ClientConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        debug!(
            region = ?sdk_config.region(),
            endpoint = ?config.endpoint_url,
            "Created DynamoDB client"
        );

        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableStore for DynamoStore {
    async fn describe_table(&self, table: &str) -> Result<TableDescriptor> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| CopyError::service("describe_table", table, e))?;

        let description = output
            .table()
            .ok_or_else(|| CopyError::service("describe_table", table, "response had no table"))?;

        Ok(descriptor_from(description))
    }

    async fn create_table(&self, request: &TableDescriptor) -> Result<()> {
        let table = request.table_name.as_str();
        let to_service = |e: BuildError| CopyError::service("create_table", table, e);

        let mut create = self
            .client
            .create_table()
            .table_name(table)
            .set_attribute_definitions(Some(
                attribute_definitions(&request.attribute_definitions).map_err(to_service)?,
            ))
            .set_key_schema(Some(key_schema(&request.key_schema).map_err(to_service)?))
            .set_billing_mode(request.billing_mode.as_deref().map(ddb::BillingMode::from))
            .set_sse_specification(request.sse_specification.as_ref().map(sse_specification));

        if let Some(throughput) = &request.provisioned_throughput {
            create = create
                .provisioned_throughput(provisioned_throughput(throughput).map_err(to_service)?);
        }
        if !request.local_secondary_indexes.is_empty() {
            create = create.set_local_secondary_indexes(Some(
                local_indexes(&request.local_secondary_indexes).map_err(to_service)?,
            ));
        }
        if !request.global_secondary_indexes.is_empty() {
            create = create.set_global_secondary_indexes(Some(
                global_indexes(&request.global_secondary_indexes).map_err(to_service)?,
            ));
        }
        if let Some(stream) = request.stream_specification.as_ref().filter(|s| s.stream_enabled) {
            create = create.stream_specification(stream_specification(stream).map_err(to_service)?);
        }

        create
            .send()
            .await
            .map_err(|e| CopyError::service("create_table", table, e))?;

        Ok(())
    }

    async fn scan(&self, table: &str, limit: i32, cursor: Option<Cursor>) -> Result<ScanPage> {
        let output = self
            .client
            .scan()
            .table_name(table)
            .limit(limit)
            .set_exclusive_start_key(cursor)
            .send()
            .await
            .map_err(|e| CopyError::service("scan", table, e))?;

        Ok(scan_page_from(output))
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<Vec<Item>> {
        let requests = items
            .into_iter()
            .map(|item| {
                let put = ddb::PutRequest::builder().set_item(Some(item)).build()?;
                Ok(ddb::WriteRequest::builder().put_request(put).build())
            })
            .collect::<std::result::Result<Vec<_>, BuildError>>()
            .map_err(|e| CopyError::service("batch_write", table, e))?;

        let output = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|e| CopyError::service("batch_write", table, e))?;

        Ok(unprocessed_from(output, table))
    }

    async fn update_continuous_backups(&self, table: &str, enabled: bool) -> Result<()> {
        let specification = ddb::PointInTimeRecoverySpecification::builder()
            .point_in_time_recovery_enabled(enabled)
            .build()
            .map_err(|e| CopyError::service("update_continuous_backups", table, e))?;

        self.client
            .update_continuous_backups()
            .table_name(table)
            .point_in_time_recovery_specification(specification)
            .send()
            .await
            .map_err(|e| CopyError::service("update_continuous_backups", table, e))?;

        Ok(())
    }

    async fn describe_continuous_backups(&self, table: &str) -> Result<bool> {
        let output = self
            .client
            .describe_continuous_backups()
            .table_name(table)
            .send()
            .await
            .map_err(|e| CopyError::service("describe_continuous_backups", table, e))?;

        let status = output
            .continuous_backups_description()
            .and_then(|d| d.point_in_time_recovery_description())
            .and_then(|p| p.point_in_time_recovery_status());

        Ok(status == Some(&ddb::PointInTimeRecoveryStatus::Enabled))
    }
}

/// An empty `LastEvaluatedKey` means the scan is finished, same as a missing one.
fn scan_page_from(output: ScanOutput) -> ScanPage {
    ScanPage {
        items: output.items.unwrap_or_default(),
        next_cursor: output.last_evaluated_key.filter(|key| !key.is_empty()),
    }
}

/// The put items the service left unprocessed for `table`.
fn unprocessed_from(output: BatchWriteItemOutput, table: &str) -> Vec<Item> {
    output
        .unprocessed_items
        .and_then(|mut by_table| by_table.remove(table))
        .unwrap_or_default()
        .into_iter()
        .filter_map(|request| request.put_request.map(|put| put.item))
        .collect()
}

fn timestamp(value: Option<&SdkDateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
}

fn throughput_from(t: &ddb::ProvisionedThroughputDescription) -> Throughput {
    Throughput {
        read_capacity_units: t.read_capacity_units().unwrap_or_default(),
        write_capacity_units: t.write_capacity_units().unwrap_or_default(),
        last_increase_date_time: timestamp(t.last_increase_date_time()),
        last_decrease_date_time: timestamp(t.last_decrease_date_time()),
        number_of_decreases_today: t.number_of_decreases_today(),
    }
}

fn key_schema_from(keys: &[ddb::KeySchemaElement]) -> Vec<KeySchemaElement> {
    keys.iter()
        .map(|k| KeySchemaElement {
            attribute_name: k.attribute_name().to_string(),
            key_type: k.key_type().as_str().to_string(),
        })
        .collect()
}

fn projection_from(p: &ddb::Projection) -> Projection {
    Projection {
        projection_type: p.projection_type().map(|t| t.as_str().to_string()),
        non_key_attributes: p.non_key_attributes().to_vec(),
    }
}

pub(crate) fn descriptor_from(table: &ddb::TableDescription) -> TableDescriptor {
    TableDescriptor {
        table_name: table.table_name().unwrap_or_default().to_string(),
        attribute_definitions: table
            .attribute_definitions()
            .iter()
            .map(|a| AttributeDefinition {
                attribute_name: a.attribute_name().to_string(),
                attribute_type: a.attribute_type().as_str().to_string(),
            })
            .collect(),
        key_schema: key_schema_from(table.key_schema()),
        table_status: table.table_status().map(|s| s.as_str().to_string()),
        creation_date_time: timestamp(table.creation_date_time()),
        provisioned_throughput: table.provisioned_throughput().map(throughput_from),
        table_size_bytes: table.table_size_bytes(),
        item_count: table.item_count(),
        table_arn: table.table_arn().map(str::to_string),
        table_id: table.table_id().map(str::to_string),
        billing_mode_summary: table.billing_mode_summary().map(|b| BillingModeSummary {
            billing_mode: b.billing_mode().map(|m| m.as_str().to_string()),
        }),
        billing_mode: None,
        local_secondary_indexes: table
            .local_secondary_indexes()
            .iter()
            .map(|i| SecondaryIndex {
                index_name: i.index_name().unwrap_or_default().to_string(),
                key_schema: key_schema_from(i.key_schema()),
                projection: i.projection().map(projection_from),
                index_size_bytes: i.index_size_bytes(),
                item_count: i.item_count(),
                index_arn: i.index_arn().map(str::to_string),
                ..Default::default()
            })
            .collect(),
        global_secondary_indexes: table
            .global_secondary_indexes()
            .iter()
            .map(|i| SecondaryIndex {
                index_name: i.index_name().unwrap_or_default().to_string(),
                key_schema: key_schema_from(i.key_schema()),
                projection: i.projection().map(projection_from),
                provisioned_throughput: i.provisioned_throughput().map(throughput_from),
                index_status: i.index_status().map(|s| s.as_str().to_string()),
                backfilling: i.backfilling(),
                index_size_bytes: i.index_size_bytes(),
                item_count: i.item_count(),
                index_arn: i.index_arn().map(str::to_string),
            })
            .collect(),
        stream_specification: table.stream_specification().map(|s| StreamSpecification {
            stream_enabled: s.stream_enabled(),
            stream_view_type: s.stream_view_type().map(|v| v.as_str().to_string()),
        }),
        latest_stream_label: table.latest_stream_label().map(str::to_string),
        latest_stream_arn: table.latest_stream_arn().map(str::to_string),
        sse_description: table.sse_description().map(|s| SseDescription {
            status: s.status().map(|v| v.as_str().to_string()),
            sse_type: s.sse_type().map(|v| v.as_str().to_string()),
            kms_master_key_arn: s.kms_master_key_arn().map(str::to_string),
        }),
        sse_specification: None,
    }
}

fn attribute_definitions(
    definitions: &[AttributeDefinition],
) -> std::result::Result<Vec<ddb::AttributeDefinition>, BuildError> {
    definitions
        .iter()
        .map(|a| {
            ddb::AttributeDefinition::builder()
                .attribute_name(&a.attribute_name)
                .attribute_type(ddb::ScalarAttributeType::from(a.attribute_type.as_str()))
                .build()
        })
        .collect()
}

fn key_schema(
    keys: &[KeySchemaElement],
) -> std::result::Result<Vec<ddb::KeySchemaElement>, BuildError> {
    keys.iter()
        .map(|k| {
            ddb::KeySchemaElement::builder()
                .attribute_name(&k.attribute_name)
                .key_type(ddb::KeyType::from(k.key_type.as_str()))
                .build()
        })
        .collect()
}

fn projection(p: Option<&Projection>) -> ddb::Projection {
    let Some(p) = p else {
        return ddb::Projection::builder().build();
    };
    ddb::Projection::builder()
        .set_projection_type(p.projection_type.as_deref().map(ddb::ProjectionType::from))
        .set_non_key_attributes(if p.non_key_attributes.is_empty() {
            None
        } else {
            Some(p.non_key_attributes.clone())
        })
        .build()
}

fn provisioned_throughput(
    t: &Throughput,
) -> std::result::Result<ddb::ProvisionedThroughput, BuildError> {
    ddb::ProvisionedThroughput::builder()
        .read_capacity_units(t.read_capacity_units)
        .write_capacity_units(t.write_capacity_units)
        .build()
}

fn local_indexes(
    indexes: &[SecondaryIndex],
) -> std::result::Result<Vec<ddb::LocalSecondaryIndex>, BuildError> {
    indexes
        .iter()
        .map(|i| {
            ddb::LocalSecondaryIndex::builder()
                .index_name(&i.index_name)
                .set_key_schema(Some(key_schema(&i.key_schema)?))
                .projection(projection(i.projection.as_ref()))
                .build()
        })
        .collect()
}

fn global_indexes(
    indexes: &[SecondaryIndex],
) -> std::result::Result<Vec<ddb::GlobalSecondaryIndex>, BuildError> {
    indexes
        .iter()
        .map(|i| {
            ddb::GlobalSecondaryIndex::builder()
                .index_name(&i.index_name)
                .set_key_schema(Some(key_schema(&i.key_schema)?))
                .projection(projection(i.projection.as_ref()))
                .set_provisioned_throughput(
                    i.provisioned_throughput
                        .as_ref()
                        .map(provisioned_throughput)
                        .transpose()?,
                )
                .build()
        })
        .collect()
}

fn stream_specification(
    s: &StreamSpecification,
) -> std::result::Result<ddb::StreamSpecification, BuildError> {
    ddb::StreamSpecification::builder()
        .stream_enabled(s.stream_enabled)
        .set_stream_view_type(s.stream_view_type.as_deref().map(ddb::StreamViewType::from))
        .build()
}

fn sse_specification(s: &SseSpecification) -> ddb::SseSpecification {
    ddb::SseSpecification::builder()
        .enabled(s.enabled)
        .set_sse_type(s.sse_type.as_deref().map(ddb::SseType::from))
        .set_kms_master_key_id(s.kms_master_key_id.clone())
        .build()
}
