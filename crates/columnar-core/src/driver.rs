//! Storage driver.
//!
//! Orchestrates compiled statements against the store session and
//! implements the read-modify-write retry protocol that keeps the emulated
//! local secondary indexes consistent under concurrent conditional writes.
//!
//! Writes against tables without indexes and without old-value
//! requirements take a fast path: a single unconditional statement, no
//! read-before-write, no retry loop. Indexed or old-value-returning writes
//! run the protocol:
//!
//! 1. Read the current row (consistent read) to learn the old attribute
//!    values.
//! 2. If the row is absent, insert with `IF NOT EXISTS`; a concurrent
//!    creation between read and write reports not-applied and loops.
//! 3. If the row exists, write `UPDATE ... IF <snapshot of every non-key
//!    attribute>` plus shadow-row maintenance, submitted as one batch.
//! 4. A not-applied outcome means either a concurrent writer or a partial
//!    index batch; both loop back to step 1. Attempts are bounded by
//!    configuration.
//! 5. Caller-supplied expected conditions are evaluated against the row
//!    read in step 1 and surface as a conditional-check failure without
//!    retrying.
//!
//! Select and scan never retry; they are read-only.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use columnar_model::attribute::DecodedValue;
use columnar_model::{
    AttributeValue, Condition, ConditionContext, ConditionMap, DeleteItemRequest, Item, OrderType,
    PutItemRequest, ReturnValues, ScanResult, SelectResult, SelectType, TableSchema, UpdateAction,
    UpdateActionKind, WriteRequest,
};

use crate::config::StorageConfig;
use crate::context::RequestContext;
use crate::encoding::{decode_predefined_attr, decode_row};
use crate::error::{CoreError, CoreResult};
use crate::filter::conditions_satisfied;
use crate::session::{Row, Session, StoreValue};
use crate::statement::{self, SelectParams, TableRef, USER_PREFIX, UpdateMap};
use crate::statistics::{SUPPORTED_METRICS, StoreTelemetry};
use crate::table_info::TableInfoRepository;

/// The item-level storage operations, as the manager consumes them.
///
/// All methods are blocking; the manager runs them on worker threads.
pub trait StorageDriver: Send + Sync {
    /// Creates the physical table for an already-registered logical table.
    fn create_table(&self, context: &RequestContext, table_name: &str) -> CoreResult<()>;

    /// Drops the physical table of a logical table.
    fn delete_table(&self, context: &RequestContext, table_name: &str) -> CoreResult<()>;

    /// Puts an item. Returns whether the write applied and, when
    /// requested, the previous item.
    fn put_item(
        &self,
        context: &RequestContext,
        request: &PutItemRequest,
        if_not_exist: bool,
        expected: Option<&ConditionMap>,
    ) -> CoreResult<(bool, Option<Item>)>;

    /// Deletes an item. Deleting an absent item succeeds.
    fn delete_item(
        &self,
        context: &RequestContext,
        request: &DeleteItemRequest,
        expected: Option<&ConditionMap>,
    ) -> CoreResult<bool>;

    /// Applies per-attribute update actions to an item. Returns whether
    /// the update applied and the previous item when one was read.
    fn update_item(
        &self,
        context: &RequestContext,
        table_name: &str,
        key_attribute_map: &Item,
        attribute_action_map: &BTreeMap<String, UpdateAction>,
        expected: Option<&ConditionMap>,
    ) -> CoreResult<(bool, Option<Item>)>;

    /// Queries items by key conditions, optionally through an index.
    #[allow(clippy::too_many_arguments)]
    fn select_item(
        &self,
        context: &RequestContext,
        table_name: &str,
        indexed_condition_map: &ConditionMap,
        select_type: &SelectType,
        index_name: Option<&str>,
        limit: Option<usize>,
        exclusive_start_key: Option<&Item>,
        consistent: bool,
        order_type: Option<OrderType>,
    ) -> CoreResult<SelectResult>;

    /// Scans the table, filtering rows client-side.
    #[allow(clippy::too_many_arguments)]
    fn scan(
        &self,
        context: &RequestContext,
        table_name: &str,
        condition_map: &ConditionMap,
        attributes_to_get: Option<&[String]>,
        limit: Option<usize>,
        exclusive_start_key: Option<&Item>,
        consistent: bool,
    ) -> CoreResult<ScanResult>;

    /// Executes writes one by one, returning the requests that failed.
    fn execute_write_batch(
        &self,
        context: &RequestContext,
        requests: Vec<WriteRequest>,
    ) -> Vec<WriteRequest>;

    /// Reads table metrics from the store's management telemetry.
    fn get_table_statistics(
        &self,
        context: &RequestContext,
        table_name: &str,
        metric_keys: &[String],
    ) -> CoreResult<BTreeMap<String, u64>>;
}

/// Storage driver over a wide-column store session.
pub struct ColumnStoreDriver {
    session: Arc<Session>,
    table_info_repo: Arc<TableInfoRepository>,
    telemetry: Option<Arc<dyn StoreTelemetry>>,
    write_retry_limit: u32,
}

impl ColumnStoreDriver {
    /// Creates a driver over the given session and table-info repository.
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        table_info_repo: Arc<TableInfoRepository>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            session,
            table_info_repo,
            telemetry: None,
            write_retry_limit: config.write_retry_limit,
        }
    }

    /// Attaches a telemetry endpoint for table statistics.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn StoreTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Consistent read of the current base row.
    fn read_current_row(&self, t: &TableRef<'_>, key_source: &Item) -> CoreResult<Option<Item>> {
        let stmt = statement::select_current_row_statement(t, key_source);
        let rows = self.session.execute(stmt, true)?;
        rows.first().map(|row| decode_row(t.schema, row)).transpose()
    }

    /// Logs whether a failed compare-and-set lost to another writer or to
    /// a partial index batch. Either way the caller loops back to the
    /// read.
    fn note_conflict(t: &TableRef<'_>, old_item: &Item, rows: &[Row], attempt: u32) {
        let changed = rows
            .first()
            .is_some_and(|row| snapshot_changed(t, old_item, row));
        if changed {
            debug!(attempt, "concurrent writer changed the row, retrying");
        } else {
            debug!(attempt, "conditional write rejected with unchanged row, retrying");
        }
    }

    fn run_select(
        &self,
        t: &TableRef<'_>,
        params: &SelectParams<'_>,
        consistent: bool,
    ) -> CoreResult<SelectResult> {
        let Some(stmt) = statement::select_statement(t, params)? else {
            // The conditions can never match; skip the round trip.
            return Ok(SelectResult::default());
        };
        let rows = self.session.execute(stmt, consistent)?;

        if params.select_type.is_count() {
            let count = rows
                .first()
                .and_then(|row| row.get("count"))
                .and_then(StoreValue::as_int)
                .unwrap_or(0);
            return Ok(SelectResult {
                items: Vec::new(),
                count: usize::try_from(count).unwrap_or(0),
                last_evaluated_key: None,
            });
        }

        let mut items: Vec<Item> = rows
            .iter()
            .map(|row| decode_row(t.schema, row))
            .collect::<CoreResult<_>>()?;

        let last_evaluated_key = if params.limit.is_some_and(|limit| items.len() == limit) {
            items
                .last()
                .map(|item| last_key_of(t.schema, params.index_name, item))
        } else {
            None
        };

        apply_projection(&mut items, t.schema, params.select_type, params.index_name);

        Ok(SelectResult {
            count: items.len(),
            items,
            last_evaluated_key,
        })
    }
}

impl StorageDriver for ColumnStoreDriver {
    fn create_table(&self, context: &RequestContext, table_name: &str) -> CoreResult<()> {
        let info = self.table_info_repo.get(context, table_name)?;
        // The physical name is the opaque table id, so the logical table
        // can be dropped and recreated without touching old physical
        // tables.
        let internal_name = format!("t_{}", info.id.simple());
        let stmt =
            statement::create_table_statement(&info.internal_keyspace, &internal_name, &info.schema);
        self.session.execute(stmt, false)?;
        debug!(table = table_name, "create table executed, waiting for schema agreement");
        self.session
            .schema_settled(&info.internal_keyspace, &internal_name, true)?;

        let mut updated = (*info).clone();
        updated.internal_name = Some(internal_name);
        self.table_info_repo
            .update(context, &updated, &["internal_name"])?;
        Ok(())
    }

    fn delete_table(&self, context: &RequestContext, table_name: &str) -> CoreResult<()> {
        let info = self.table_info_repo.get(context, table_name)?;
        let Some(internal_name) = info.internal_name.clone() else {
            // The physical table was never created.
            return Ok(());
        };
        let stmt = statement::drop_table_statement(&info.internal_keyspace, &internal_name);
        self.session.execute(stmt, false)?;
        debug!(table = table_name, "drop table executed, waiting for schema agreement");
        self.session
            .schema_settled(&info.internal_keyspace, &internal_name, false)?;
        Ok(())
    }

    fn put_item(
        &self,
        context: &RequestContext,
        request: &PutItemRequest,
        if_not_exist: bool,
        expected: Option<&ConditionMap>,
    ) -> CoreResult<(bool, Option<Item>)> {
        let info = self.table_info_repo.get(context, &request.table_name)?;
        let t = info.table_ref()?;
        validate_item(t.schema, &request.attribute_map)?;
        if let Some(expected) = expected {
            validate_condition_map(expected, ConditionContext::Expected)?;
        }
        let return_old = request.return_values == ReturnValues::AllOld;

        if if_not_exist {
            if expected.is_some() {
                return Err(CoreError::Validation(
                    "if_not_exist and expected conditions are mutually exclusive".to_owned(),
                ));
            }
            let stmt = statement::put_statement(&t, &request.attribute_map, None, true, None);
            let rows = self.session.execute(stmt, true)?;
            if applied(&rows) {
                return Ok((true, None));
            }
            return Err(CoreError::ConditionalCheckFailed);
        }

        if !t.schema.has_indexes() && !return_old {
            let stmt =
                statement::put_statement(&t, &request.attribute_map, None, false, expected);
            let rows = self.session.execute(stmt, true)?;
            if expected.is_some() && !applied(&rows) {
                return Err(CoreError::ConditionalCheckFailed);
            }
            return Ok((true, None));
        }

        for attempt in 0..self.write_retry_limit {
            let old_item = self.read_current_row(&t, &request.attribute_map)?;
            if let Some(expected) = expected {
                if !conditions_satisfied(old_item.as_ref(), expected) {
                    return Err(CoreError::ConditionalCheckFailed);
                }
            }
            match old_item {
                None => {
                    let stmt =
                        statement::put_statement(&t, &request.attribute_map, None, true, None);
                    let rows = self.session.execute(stmt, true)?;
                    if applied(&rows) {
                        return Ok((true, None));
                    }
                    debug!(attempt, "row created concurrently, retrying put");
                }
                Some(old_item) => {
                    let stmt = statement::put_statement(
                        &t,
                        &request.attribute_map,
                        Some(&old_item),
                        false,
                        expected,
                    );
                    let rows = self.session.execute(stmt, true)?;
                    if applied(&rows) {
                        return Ok((true, return_old.then_some(old_item)));
                    }
                    Self::note_conflict(&t, &old_item, &rows, attempt);
                }
            }
        }
        Err(retry_limit_error(&request.table_name))
    }

    fn delete_item(
        &self,
        context: &RequestContext,
        request: &DeleteItemRequest,
        expected: Option<&ConditionMap>,
    ) -> CoreResult<bool> {
        let info = self.table_info_repo.get(context, &request.table_name)?;
        let t = info.table_ref()?;
        validate_key_map(t.schema, &request.key_attribute_map)?;
        if let Some(expected) = expected {
            validate_condition_map(expected, ConditionContext::Expected)?;
        }

        if !t.schema.has_indexes() {
            let stmt =
                statement::delete_statement(&t, &request.key_attribute_map, None, expected);
            let rows = self.session.execute(stmt, true)?;
            if !applied(&rows) {
                return Err(CoreError::ConditionalCheckFailed);
            }
            return Ok(true);
        }

        for attempt in 0..self.write_retry_limit {
            let old_item = self.read_current_row(&t, &request.key_attribute_map)?;
            if let Some(expected) = expected {
                if !conditions_satisfied(old_item.as_ref(), expected) {
                    return Err(CoreError::ConditionalCheckFailed);
                }
            }
            let Some(old_item) = old_item else {
                // Nothing to delete.
                return Ok(true);
            };
            let stmt = statement::delete_statement(
                &t,
                &request.key_attribute_map,
                Some(&old_item),
                expected,
            );
            let rows = self.session.execute(stmt, true)?;
            if applied(&rows) {
                return Ok(true);
            }
            Self::note_conflict(&t, &old_item, &rows, attempt);
        }
        Err(retry_limit_error(&request.table_name))
    }

    fn update_item(
        &self,
        context: &RequestContext,
        table_name: &str,
        key_attribute_map: &Item,
        attribute_action_map: &BTreeMap<String, UpdateAction>,
        expected: Option<&ConditionMap>,
    ) -> CoreResult<(bool, Option<Item>)> {
        let info = self.table_info_repo.get(context, table_name)?;
        let t = info.table_ref()?;
        validate_key_map(t.schema, key_attribute_map)?;
        if let Some(expected) = expected {
            validate_condition_map(expected, ConditionContext::Expected)?;
        }
        if let Some(key) = attribute_action_map
            .keys()
            .find(|name| t.schema.is_key_attribute(name))
        {
            return Err(CoreError::Validation(format!(
                "key attribute '{key}' cannot be updated"
            )));
        }

        let needs_read = t.schema.has_indexes()
            || expected.is_some()
            || attribute_action_map
                .values()
                .any(|action| action.kind != UpdateActionKind::Put);

        if !needs_read {
            let changes: UpdateMap = attribute_action_map
                .iter()
                .map(|(name, action)| (name.clone(), action.value.clone()))
                .collect();
            let stmt = statement::update_statement(&t, key_attribute_map, &changes, None, None);
            self.session.execute(stmt, true)?;
            return Ok((true, None));
        }

        for attempt in 0..self.write_retry_limit {
            let old_item = self.read_current_row(&t, key_attribute_map)?;
            if let Some(expected) = expected {
                if !conditions_satisfied(old_item.as_ref(), expected) {
                    return Err(CoreError::ConditionalCheckFailed);
                }
            }
            match old_item {
                None => {
                    if attribute_action_map
                        .values()
                        .all(|action| action.kind == UpdateActionKind::Delete)
                    {
                        // Removing attributes of an absent item is a no-op.
                        return Ok((true, None));
                    }
                    let mut item = key_attribute_map.clone();
                    for (name, action) in attribute_action_map {
                        if let (UpdateActionKind::Put | UpdateActionKind::Add, Some(value)) =
                            (action.kind, action.value.as_ref())
                        {
                            item.insert(name.clone(), value.clone());
                        }
                    }
                    validate_item(t.schema, &item)?;
                    let stmt = statement::put_statement(&t, &item, None, true, None);
                    let rows = self.session.execute(stmt, true)?;
                    if applied(&rows) {
                        return Ok((true, None));
                    }
                    debug!(attempt, "row created concurrently, retrying update");
                }
                Some(old_item) => {
                    let changes = materialize_actions(attribute_action_map, &old_item)?;
                    let stmt = statement::update_statement(
                        &t,
                        key_attribute_map,
                        &changes,
                        Some(&old_item),
                        expected,
                    );
                    let rows = self.session.execute(stmt, true)?;
                    if applied(&rows) {
                        return Ok((true, Some(old_item)));
                    }
                    Self::note_conflict(&t, &old_item, &rows, attempt);
                }
            }
        }
        Err(retry_limit_error(table_name))
    }

    fn select_item(
        &self,
        context: &RequestContext,
        table_name: &str,
        indexed_condition_map: &ConditionMap,
        select_type: &SelectType,
        index_name: Option<&str>,
        limit: Option<usize>,
        exclusive_start_key: Option<&Item>,
        consistent: bool,
        order_type: Option<OrderType>,
    ) -> CoreResult<SelectResult> {
        let info = self.table_info_repo.get(context, table_name)?;
        let t = info.table_ref()?;
        validate_condition_map(indexed_condition_map, ConditionContext::Key)?;

        let params = SelectParams {
            conditions: indexed_condition_map,
            select_type,
            index_name,
            limit,
            exclusive_start_key,
            order_type,
        };
        self.run_select(&t, &params, consistent)
    }

    fn scan(
        &self,
        context: &RequestContext,
        table_name: &str,
        condition_map: &ConditionMap,
        attributes_to_get: Option<&[String]>,
        limit: Option<usize>,
        exclusive_start_key: Option<&Item>,
        consistent: bool,
    ) -> CoreResult<ScanResult> {
        let info = self.table_info_repo.get(context, table_name)?;
        let t = info.table_ref()?;
        validate_condition_map(condition_map, ConditionContext::Scan)?;

        let hash_name = t.schema.hash_key_name().to_owned();
        let range_name = t.schema.range_key_name().map(str::to_owned);

        // Key conditions the store can evaluate are pushed down; every
        // condition is re-checked client-side anyway.
        let mut base_conditions = ConditionMap::new();
        if let Some(conditions) = condition_map.get(&hash_name) {
            let pushdown: Vec<Condition> = conditions
                .iter()
                .filter(|c| c.check_allowed(ConditionContext::Key).is_ok())
                .cloned()
                .collect();
            if !pushdown.is_empty() {
                base_conditions.insert(hash_name.clone(), pushdown);
                if let Some(range_name) = &range_name {
                    if let Some(conditions) = condition_map.get(range_name) {
                        let pushdown: Vec<Condition> = conditions
                            .iter()
                            .filter(|c| c.check_allowed(ConditionContext::Key).is_ok())
                            .cloned()
                            .collect();
                        if !pushdown.is_empty() {
                            base_conditions.insert(range_name.clone(), pushdown);
                        }
                    }
                }
            }
        }

        // The pagination cursor pins the partition and continues after the
        // sort position within it; the remainder of the scan continues in
        // the following partitions.
        let start_hash = exclusive_start_key.and_then(|key| key.get(&hash_name)).cloned();
        let start_range = match (&range_name, exclusive_start_key) {
            (Some(range_name), Some(key)) => key.get(range_name).cloned(),
            _ => None,
        };

        let mut first_conditions = base_conditions.clone();
        let split_partition = start_hash.is_some() && start_range.is_some();
        if let Some(start_hash) = &start_hash {
            if let Some(start_range) = &start_range {
                first_conditions
                    .entry(hash_name.clone())
                    .or_default()
                    .push(Condition::eq(start_hash.clone()));
                if let Some(range_name) = &range_name {
                    first_conditions
                        .entry(range_name.clone())
                        .or_default()
                        .push(Condition::gt(start_range.clone()));
                }
            } else {
                first_conditions
                    .entry(hash_name.clone())
                    .or_default()
                    .push(Condition::gt(start_hash.clone()));
            }
        }

        let select_type = SelectType::All;
        let mut selected = self.run_select(
            &t,
            &SelectParams {
                conditions: &first_conditions,
                select_type: &select_type,
                index_name: None,
                limit,
                exclusive_start_key: None,
                order_type: None,
            },
            consistent,
        )?;

        if split_partition && limit.is_none_or(|limit| selected.items.len() < limit) {
            let mut continuation = base_conditions.clone();
            if let Some(start_hash) = &start_hash {
                continuation
                    .entry(hash_name.clone())
                    .or_default()
                    .push(Condition::gt(start_hash.clone()));
            }
            let remaining = limit.map(|limit| limit - selected.items.len());
            let more = self.run_select(
                &t,
                &SelectParams {
                    conditions: &continuation,
                    select_type: &select_type,
                    index_name: None,
                    limit: remaining,
                    exclusive_start_key: None,
                    order_type: None,
                },
                consistent,
            )?;
            selected.items.extend(more.items);
            selected.count = selected.items.len();
            selected.last_evaluated_key = more.last_evaluated_key;
        }

        let scanned_count = selected.items.len();
        let mut items: Vec<Item> = selected
            .items
            .into_iter()
            .filter(|item| conditions_satisfied(Some(item), condition_map))
            .collect();

        if let Some(attributes_to_get) = attributes_to_get {
            for item in &mut items {
                item.retain(|name, _| attributes_to_get.iter().any(|a| a == name));
            }
        }

        Ok(ScanResult {
            count: items.len(),
            scanned_count,
            last_evaluated_key: selected.last_evaluated_key,
            items,
        })
    }

    fn execute_write_batch(
        &self,
        context: &RequestContext,
        requests: Vec<WriteRequest>,
    ) -> Vec<WriteRequest> {
        let mut unprocessed = Vec::new();
        for request in requests {
            let result = match &request {
                WriteRequest::Put(put) => self.put_item(context, put, false, None).map(|_| ()),
                WriteRequest::Delete(delete) => {
                    self.delete_item(context, delete, None).map(|_| ())
                }
            };
            if let Err(error) = result {
                warn!(
                    table = request.table_name(),
                    %error,
                    "write batch sub-request failed"
                );
                unprocessed.push(request);
            }
        }
        unprocessed
    }

    fn get_table_statistics(
        &self,
        context: &RequestContext,
        table_name: &str,
        metric_keys: &[String],
    ) -> CoreResult<BTreeMap<String, u64>> {
        let info = self.table_info_repo.get(context, table_name)?;
        let t = info.table_ref()?;
        let telemetry = self.telemetry.as_ref().ok_or_else(|| {
            CoreError::Backend("store telemetry is not configured".to_owned())
        })?;

        let mut metrics = BTreeMap::new();
        for key in metric_keys {
            if !SUPPORTED_METRICS.contains(&key.as_str()) {
                return Err(CoreError::Validation(format!("unknown metric key: {key}")));
            }
            metrics.insert(key.clone(), telemetry.table_metric(t.keyspace, t.table, key)?);
        }
        Ok(metrics)
    }
}

impl fmt::Debug for ColumnStoreDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnStoreDriver")
            .field("write_retry_limit", &self.write_retry_limit)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn applied(rows: &[Row]) -> bool {
    rows.first().is_none_or(Row::applied)
}

fn retry_limit_error(table_name: &str) -> CoreError {
    CoreError::Backend(format!(
        "conditional write on table '{table_name}' exceeded the retry limit"
    ))
}

fn validate_key_map(schema: &TableSchema, key_map: &Item) -> CoreResult<()> {
    for key_attr in schema.key_attributes() {
        let value = key_map.get(key_attr).ok_or_else(|| {
            CoreError::Validation(format!("missing key attribute '{key_attr}'"))
        })?;
        let declared = schema
            .attribute_type(key_attr)
            .unwrap_or_else(|| unreachable!("key attributes are always declared"));
        if value.attr_type() != declared {
            return Err(CoreError::Validation(format!(
                "key attribute '{key_attr}' must be of type {declared}, got {}",
                value.attr_type()
            )));
        }
    }
    Ok(())
}

fn validate_item(schema: &TableSchema, item: &Item) -> CoreResult<()> {
    validate_key_map(schema, item)?;
    for (name, value) in item {
        if let Some(declared) = schema.attribute_type(name) {
            if value.attr_type() != declared {
                return Err(CoreError::Validation(format!(
                    "attribute '{name}' must be of type {declared}, got {}",
                    value.attr_type()
                )));
            }
        }
    }
    Ok(())
}

fn validate_condition_map(
    condition_map: &ConditionMap,
    context: ConditionContext,
) -> CoreResult<()> {
    for conditions in condition_map.values() {
        for condition in conditions {
            condition.check_allowed(context)?;
        }
    }
    Ok(())
}

/// Whether the returned current values of a failed compare-and-set differ
/// from the snapshot the write was conditioned on.
fn snapshot_changed(t: &TableRef<'_>, old_item: &Item, row: &Row) -> bool {
    for (name, attr_type) in t.schema.attribute_type_map() {
        if t.schema.is_key_attribute(name) {
            continue;
        }
        let Some(cell) = row.get(&format!("{USER_PREFIX}{name}")) else {
            continue;
        };
        let current = if cell.is_null() {
            None
        } else {
            decode_predefined_attr(*attr_type, cell).ok()
        };
        if current.as_ref() != old_item.get(name) {
            return true;
        }
    }
    false
}

fn last_key_of(schema: &TableSchema, index_name: Option<&str>, item: &Item) -> Item {
    let mut key = Item::new();
    let mut names: Vec<&str> = vec![schema.hash_key_name()];
    if let Some(range) = schema.range_key_name() {
        names.push(range);
    }
    if let Some(index_def) = index_name.and_then(|name| schema.index_def_map().get(name)) {
        names.push(&index_def.attribute_to_index);
    }
    for name in names {
        if let Some(value) = item.get(name) {
            key.insert(name.to_owned(), value.clone());
        }
    }
    key
}

fn apply_projection(
    items: &mut [Item],
    schema: &TableSchema,
    select_type: &SelectType,
    index_name: Option<&str>,
) {
    match select_type {
        SelectType::All | SelectType::Count => {}
        SelectType::SpecificAttributes(names) => {
            for item in items {
                item.retain(|name, _| names.iter().any(|n| n == name));
            }
        }
        SelectType::AllProjected => {
            let Some(index_def) = index_name.and_then(|name| schema.index_def_map().get(name))
            else {
                return;
            };
            let Some(projected) = &index_def.projected_attributes else {
                // Absent projection list projects everything.
                return;
            };
            for item in items {
                item.retain(|name, _| {
                    schema.is_key_attribute(name)
                        || name == &index_def.attribute_to_index
                        || projected.contains(name)
                });
            }
        }
    }
}

/// Materializes update actions against the old row into concrete attribute
/// changes.
fn materialize_actions(
    actions: &BTreeMap<String, UpdateAction>,
    old_item: &Item,
) -> CoreResult<UpdateMap> {
    let mut changes = UpdateMap::new();
    for (name, action) in actions {
        let change = match action.kind {
            UpdateActionKind::Put => Some(
                action
                    .value
                    .clone()
                    .ok_or_else(|| {
                        CoreError::Validation(format!("PUT action on '{name}' requires a value"))
                    })?,
            ),
            UpdateActionKind::Add => {
                let operand = action.value.as_ref().ok_or_else(|| {
                    CoreError::Validation(format!("ADD action on '{name}' requires a value"))
                })?;
                Some(add_values(name, operand, old_item.get(name))?)
            }
            UpdateActionKind::Delete => {
                delete_values(name, action.value.as_ref(), old_item.get(name))?
            }
        };
        changes.insert(name.clone(), change);
    }
    Ok(changes)
}

fn add_values(
    name: &str,
    operand: &AttributeValue,
    old_value: Option<&AttributeValue>,
) -> CoreResult<AttributeValue> {
    let Some(old_value) = old_value else {
        return Ok(operand.clone());
    };
    if old_value.attr_type() != operand.attr_type() {
        return Err(CoreError::Validation(format!(
            "ADD on '{name}': operand type {} does not match existing type {}",
            operand.attr_type(),
            old_value.attr_type()
        )));
    }
    match (old_value.value(), operand.value()) {
        (
            DecodedValue::Scalar(columnar_model::ScalarValue::Number(a)),
            DecodedValue::Scalar(columnar_model::ScalarValue::Number(b)),
        ) => Ok(AttributeValue::number(a + b)),
        (DecodedValue::Set(a), DecodedValue::Set(b)) => {
            let union = a.union(b).cloned().collect();
            AttributeValue::new(old_value.attr_type(), DecodedValue::Set(union))
                .map_err(|e| CoreError::Validation(e.to_string()))
        }
        (DecodedValue::Map(a), DecodedValue::Map(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                merged.insert(key.clone(), value.clone());
            }
            AttributeValue::new(old_value.attr_type(), DecodedValue::Map(merged))
                .map_err(|e| CoreError::Validation(e.to_string()))
        }
        _ => Err(CoreError::Validation(format!(
            "ADD on '{name}' allows numbers and collections only"
        ))),
    }
}

fn delete_values(
    name: &str,
    operand: Option<&AttributeValue>,
    old_value: Option<&AttributeValue>,
) -> CoreResult<Option<AttributeValue>> {
    let (Some(operand), Some(old_value)) = (operand, old_value) else {
        // No operand, or nothing to subtract from: remove the attribute.
        return Ok(None);
    };
    match old_value.value() {
        DecodedValue::Set(elements) => {
            if operand.attr_type() != old_value.attr_type() {
                return Err(CoreError::Validation(format!(
                    "DELETE on '{name}': operand type {} does not match existing type {}",
                    operand.attr_type(),
                    old_value.attr_type()
                )));
            }
            let Some(to_remove) = operand.as_set() else {
                return Err(CoreError::Validation(format!(
                    "DELETE on '{name}' requires a set operand"
                )));
            };
            let remaining = elements.difference(to_remove).cloned().collect();
            AttributeValue::new(old_value.attr_type(), DecodedValue::Set(remaining))
                .map(Some)
                .map_err(|e| CoreError::Validation(e.to_string()))
        }
        DecodedValue::Map(entries) => {
            let Some(keys) = operand.as_set() else {
                return Err(CoreError::Validation(format!(
                    "DELETE on '{name}' requires a set of keys for a map attribute"
                )));
            };
            let mut remaining = entries.clone();
            for key in keys {
                remaining.remove(key);
            }
            AttributeValue::new(old_value.attr_type(), DecodedValue::Map(remaining))
                .map(Some)
                .map_err(|e| CoreError::Validation(e.to_string()))
        }
        DecodedValue::Scalar(_) => Err(CoreError::Validation(format!(
            "DELETE with an operand requires a collection attribute, '{name}' is a scalar"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
