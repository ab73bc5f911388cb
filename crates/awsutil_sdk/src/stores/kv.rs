use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    KeysAndAttributes, ProvisionedThroughput, Put, PutRequest, ReturnValue, ScalarAttributeType,
    TableStatus, TransactWriteItem, WriteRequest,
};

/// DynamoDB caps batch writes at 25 items per request.
const BATCH_WRITE_LIMIT: usize = 25;
/// DynamoDB caps batch gets at 100 keys per request.
const BATCH_GET_LIMIT: usize = 100;
/// DynamoDB caps transactions at 25 items.
const TRANSACT_WRITE_LIMIT: usize = 25;
const TABLE_ACTIVE_ATTEMPTS: usize = 30;
const TABLE_ACTIVE_POLL: Duration = Duration::from_secs(2);

pub type Item = HashMap<String, AttributeValue>;

/// One key attribute of a table schema.
#[derive(Debug, Clone)]
pub struct KeyAttribute {
    pub name: String,
    pub attribute_type: ScalarAttributeType,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, attribute_type: ScalarAttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Billing {
    OnDemand,
    Provisioned {
        read_capacity: i64,
        write_capacity: i64,
    },
}

/// Parameters for creating a table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub billing: Billing,
}

impl TableSpec {
    /// On-demand table with a single string partition key.
    pub fn on_demand(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: KeyAttribute::new(partition_key, ScalarAttributeType::S),
            sort_key: None,
            billing: Billing::OnDemand,
        }
    }
}

/// Parameters for a key-condition query.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub key_condition: String,
    pub values: Item,
    pub index_name: Option<String>,
    /// Ascending sort order when true.
    pub scan_forward: bool,
    pub limit: Option<i32>,
}

impl QuerySpec {
    /// Ascending, unlimited query against the table's own key schema.
    pub fn new(key_condition: impl Into<String>, values: Item) -> Self {
        Self {
            key_condition: key_condition.into(),
            values,
            index_name: None,
            scan_forward: true,
            limit: None,
        }
    }
}

/// High-level key-value table operations over one owned DynamoDB client.
#[derive(Debug, Clone)]
pub struct TableStore {
    client: aws_sdk_dynamodb::Client,
}

impl TableStore {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &aws_sdk_dynamodb::Client {
        &self.client
    }

    /// Create a table from the spec and wait until it is active.
    pub async fn create_table(&self, spec: &TableSpec) -> Result<(), String> {
        let (key_schema, attribute_definitions) = key_schema(spec)?;

        let mut request = self
            .client
            .create_table()
            .table_name(&spec.name)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(attribute_definitions));

        request = match spec.billing {
            Billing::OnDemand => request.billing_mode(BillingMode::PayPerRequest),
            Billing::Provisioned {
                read_capacity,
                write_capacity,
            } => request
                .billing_mode(BillingMode::Provisioned)
                .provisioned_throughput(
                    ProvisionedThroughput::builder()
                        .read_capacity_units(read_capacity)
                        .write_capacity_units(write_capacity)
                        .build()
                        .map_err(|error| format!("invalid provisioned throughput: {error}"))?,
                ),
        };

        request
            .send()
            .await
            .map_err(|error| format!("failed to create table {}: {error}", spec.name))?;
        self.wait_until_active(&spec.name).await
    }

    async fn wait_until_active(&self, table_name: &str) -> Result<(), String> {
        for _ in 0..TABLE_ACTIVE_ATTEMPTS {
            let response = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|error| format!("failed to describe table {table_name}: {error}"))?;

            let status = response.table().and_then(|table| table.table_status());
            if status == Some(&TableStatus::Active) {
                return Ok(());
            }
            tokio::time::sleep(TABLE_ACTIVE_POLL).await;
        }
        Err(format!(
            "table {table_name} did not become active within {TABLE_ACTIVE_ATTEMPTS} checks"
        ))
    }

    pub async fn put_item(&self, table_name: &str, item: Item) -> Result<(), String> {
        self.client
            .put_item()
            .table_name(table_name)
            .set_item(Some(item))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| format!("failed to put item into {table_name}: {error}"))
    }

    pub async fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, String> {
        let response = self
            .client
            .get_item()
            .table_name(table_name)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|error| format!("failed to get item from {table_name}: {error}"))?;
        Ok(response.item().cloned())
    }

    pub async fn delete_item(&self, table_name: &str, key: Item) -> Result<(), String> {
        self.client
            .delete_item()
            .table_name(table_name)
            .set_key(Some(key))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| format!("failed to delete item from {table_name}: {error}"))
    }

    /// Query by key condition, following pagination until the optional limit
    /// is satisfied.
    pub async fn query(&self, table_name: &str, spec: &QuerySpec) -> Result<Vec<Item>, String> {
        let mut items = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;

        loop {
            let response = self
                .client
                .query()
                .table_name(table_name)
                .key_condition_expression(&spec.key_condition)
                .set_expression_attribute_values(
                    (!spec.values.is_empty()).then(|| spec.values.clone()),
                )
                .set_index_name(spec.index_name.clone())
                .scan_index_forward(spec.scan_forward)
                .set_limit(spec.limit)
                .set_exclusive_start_key(exclusive_start_key)
                .send()
                .await
                .map_err(|error| format!("failed to query table {table_name}: {error}"))?;

            items.extend(response.items().to_vec());
            let reached_limit = spec
                .limit
                .is_some_and(|limit| items.len() >= limit as usize);
            match response.last_evaluated_key() {
                Some(key) if !reached_limit => exclusive_start_key = Some(key.clone()),
                _ => {
                    if let Some(limit) = spec.limit {
                        items.truncate(limit as usize);
                    }
                    return Ok(items);
                }
            }
        }
    }

    /// Apply an update expression to one item, optionally guarded by a
    /// condition expression. Returns the item's new image.
    pub async fn update_item(
        &self,
        table_name: &str,
        key: Item,
        update_expression: &str,
        values: Item,
        condition: Option<&str>,
    ) -> Result<Option<Item>, String> {
        let response = self
            .client
            .update_item()
            .table_name(table_name)
            .set_key(Some(key))
            .update_expression(update_expression)
            .set_expression_attribute_values((!values.is_empty()).then_some(values))
            .set_condition_expression(condition.map(str::to_string))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|error| format!("failed to update item in {table_name}: {error}"))?;
        Ok(response.attributes().cloned())
    }

    /// Fetch the items for the given keys in batches of 100 (the service
    /// limit).
    pub async fn batch_get(&self, table_name: &str, keys: Vec<Item>) -> Result<Vec<Item>, String> {
        let mut items = Vec::new();
        for batch in keys.chunks(BATCH_GET_LIMIT) {
            let request_keys = KeysAndAttributes::builder()
                .set_keys(Some(batch.to_vec()))
                .build()
                .map_err(|error| format!("invalid batch get keys: {error}"))?;

            let response = self
                .client
                .batch_get_item()
                .request_items(table_name, request_keys)
                .send()
                .await
                .map_err(|error| format!("failed to batch get from {table_name}: {error}"))?;

            if let Some(found) = response
                .responses()
                .and_then(|responses| responses.get(table_name))
            {
                items.extend(found.clone());
            }
        }
        Ok(items)
    }

    /// Put the items in one atomic transaction. The service caps transactions
    /// at 25 items, so larger inputs are rejected before any write.
    pub async fn transact_put(&self, table_name: &str, items: Vec<Item>) -> Result<(), String> {
        if items.len() > TRANSACT_WRITE_LIMIT {
            return Err(format!(
                "transaction can contain at most {TRANSACT_WRITE_LIMIT} items, got {}",
                items.len()
            ));
        }

        let mut writes = Vec::with_capacity(items.len());
        for item in items {
            writes.push(
                TransactWriteItem::builder()
                    .put(
                        Put::builder()
                            .table_name(table_name)
                            .set_item(Some(item))
                            .build()
                            .map_err(|error| format!("invalid transaction item: {error}"))?,
                    )
                    .build(),
            );
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(writes))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| format!("failed to write transaction to {table_name}: {error}"))
    }

    /// Write items in batches of 25 (the service limit). Returns the number
    /// of items submitted.
    pub async fn put_items(&self, table_name: &str, items: Vec<Item>) -> Result<usize, String> {
        let total = items.len();
        for batch in items.chunks(BATCH_WRITE_LIMIT) {
            let mut writes = Vec::with_capacity(batch.len());
            for item in batch {
                writes.push(
                    WriteRequest::builder()
                        .put_request(
                            PutRequest::builder()
                                .set_item(Some(item.clone()))
                                .build()
                                .map_err(|error| format!("invalid batch item: {error}"))?,
                        )
                        .build(),
                );
            }

            self.client
                .batch_write_item()
                .request_items(table_name, writes)
                .send()
                .await
                .map_err(|error| format!("failed to batch write to {table_name}: {error}"))?;
        }
        Ok(total)
    }

    /// Read the whole table, following pagination.
    pub async fn scan_all(&self, table_name: &str) -> Result<Vec<Item>, String> {
        let mut items = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;

        loop {
            let response = self
                .client
                .scan()
                .table_name(table_name)
                .set_exclusive_start_key(exclusive_start_key)
                .send()
                .await
                .map_err(|error| format!("failed to scan table {table_name}: {error}"))?;

            items.extend(response.items().to_vec());
            match response.last_evaluated_key() {
                Some(key) => exclusive_start_key = Some(key.clone()),
                None => return Ok(items),
            }
        }
    }

    pub async fn delete_table(&self, table_name: &str) -> Result<(), String> {
        self.client
            .delete_table()
            .table_name(table_name)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| format!("failed to delete table {table_name}: {error}"))
    }
}

/// Key schema and matching attribute definitions for a table spec.
fn key_schema(
    spec: &TableSpec,
) -> Result<(Vec<KeySchemaElement>, Vec<AttributeDefinition>), String> {
    let mut schema = Vec::with_capacity(2);
    let mut definitions = Vec::with_capacity(2);

    let mut push_key = |attribute: &KeyAttribute, key_type: KeyType| -> Result<(), String> {
        schema.push(
            KeySchemaElement::builder()
                .attribute_name(&attribute.name)
                .key_type(key_type)
                .build()
                .map_err(|error| format!("invalid key schema element: {error}"))?,
        );
        definitions.push(
            AttributeDefinition::builder()
                .attribute_name(&attribute.name)
                .attribute_type(attribute.attribute_type.clone())
                .build()
                .map_err(|error| format!("invalid attribute definition: {error}"))?,
        );
        Ok(())
    };

    push_key(&spec.partition_key, KeyType::Hash)?;
    if let Some(sort_key) = &spec.sort_key {
        push_key(sort_key, KeyType::Range)?;
    }

    Ok((schema, definitions))
}
