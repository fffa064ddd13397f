//! Storage manager.
//!
//! Adds table lifecycle orchestration, notification hooks and bounded
//! asynchronous execution on top of the storage driver. Driver calls are
//! blocking network round trips; the manager runs them on worker threads
//! so callers' tasks are never blocked, and caps in-flight operations with
//! a counting semaphore to bound connection usage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

use columnar_model::{
    Condition, ConditionMap, DeleteItemRequest, GetItemRequest, Item, OrderType, PutItemRequest,
    ScanResult, SelectResult, SelectType, TableMeta, TableSchema, TableStatus, UpdateAction,
    WriteRequest,
};

use crate::config::StorageConfig;
use crate::context::RequestContext;
use crate::driver::StorageDriver;
use crate::error::{CoreError, CoreResult};
use crate::notifier::{Event, Notifier};
use crate::table_info::{TableInfo, TableInfoRepository};

/// Storage manager over a driver and the table-info repository.
pub struct SimpleStorageManager<D> {
    driver: Arc<D>,
    table_info_repo: Arc<TableInfoRepository>,
    notifier: Arc<dyn Notifier>,
    semaphore: Arc<Semaphore>,
}

impl<D: StorageDriver + 'static> SimpleStorageManager<D> {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        driver: Arc<D>,
        table_info_repo: Arc<TableInfoRepository>,
        notifier: Arc<dyn Notifier>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            driver,
            table_info_repo,
            notifier,
            semaphore: Arc::new(Semaphore::new(config.concurrent_tasks)),
        }
    }

    /// Runs a blocking storage task on a worker thread, holding a
    /// semaphore permit for its duration.
    async fn run_blocking<T, F>(&self, task: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> CoreResult<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CoreError::Backend("storage task pool is shut down".to_owned()))?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .map_err(|e| CoreError::Backend(format!("storage task failed: {e}")))?
    }

    /// Spawns a blocking storage task and returns its handle.
    fn spawn_blocking_task<T, F>(&self, task: F) -> JoinHandle<CoreResult<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> CoreResult<T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| CoreError::Backend("storage task pool is shut down".to_owned()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                task()
            })
            .await
            .map_err(|e| CoreError::Backend(format!("storage task failed: {e}")))?
        })
    }

    async fn set_table_status(
        &self,
        context: &RequestContext,
        table_name: &str,
        status: TableStatus,
    ) -> CoreResult<TableInfo> {
        let repo = Arc::clone(&self.table_info_repo);
        let context = context.clone();
        let table_name = table_name.to_owned();
        self.run_blocking(move || {
            let info = repo.get(&context, &table_name)?;
            let mut updated = (*info).clone();
            updated.status = status;
            repo.update(&context, &updated, &["status"])?;
            Ok(updated)
        })
        .await
    }

    // -----------------------------------------------------------------
    // Table lifecycle
    // -----------------------------------------------------------------

    /// Creates a table: registers it as `CREATING`, creates the physical
    /// table, then activates it.
    pub async fn create_table(
        &self,
        context: &RequestContext,
        table_name: &str,
        table_schema: TableSchema,
    ) -> CoreResult<TableMeta> {
        self.notifier.notify(
            context,
            Event::TableCreateStart {
                table: table_name.to_owned(),
            },
        );

        let info = TableInfo::new(context, table_name, table_schema);
        let save_result = {
            let repo = Arc::clone(&self.table_info_repo);
            let context_clone = context.clone();
            let info = info.clone();
            self.run_blocking(move || repo.save(&context_clone, &info)).await
        };
        if let Err(error) = save_result {
            self.notifier.notify(
                context,
                Event::TableCreateError {
                    table: table_name.to_owned(),
                    message: error.to_string(),
                },
            );
            return Err(error);
        }

        let ddl_result = {
            let driver = Arc::clone(&self.driver);
            let context_clone = context.clone();
            let table = table_name.to_owned();
            self.run_blocking(move || driver.create_table(&context_clone, &table))
                .await
        };
        match ddl_result {
            Ok(()) => {
                let updated = self
                    .set_table_status(context, table_name, TableStatus::Active)
                    .await?;
                self.notifier.notify(
                    context,
                    Event::TableCreateEnd {
                        table: table_name.to_owned(),
                    },
                );
                Ok(TableMeta {
                    schema: updated.schema,
                    status: updated.status,
                })
            }
            Err(error) => {
                if let Err(status_error) = self
                    .set_table_status(context, table_name, TableStatus::CreateFailed)
                    .await
                {
                    warn!(table = table_name, error = %status_error, "failed to mark table CREATE_FAILED");
                }
                self.notifier.notify(
                    context,
                    Event::TableCreateError {
                        table: table_name.to_owned(),
                        message: error.to_string(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Deletes a table: marks it `DELETING`, drops the physical table,
    /// then removes its descriptor. Deleting a table already being
    /// deleted is a no-op.
    pub async fn delete_table(
        &self,
        context: &RequestContext,
        table_name: &str,
    ) -> CoreResult<TableMeta> {
        self.notifier.notify(
            context,
            Event::TableDeleteStart {
                table: table_name.to_owned(),
            },
        );

        let info = {
            let repo = Arc::clone(&self.table_info_repo);
            let context_clone = context.clone();
            let table = table_name.to_owned();
            self.run_blocking(move || repo.get(&context_clone, &table)).await
        };
        let info = match info {
            Ok(info) => info,
            Err(error) => {
                self.notifier.notify(
                    context,
                    Event::TableDeleteError {
                        table: table_name.to_owned(),
                        message: error.to_string(),
                    },
                );
                return Err(error);
            }
        };

        if info.status == TableStatus::Deleting {
            self.notifier.notify(
                context,
                Event::TableDeleteEnd {
                    table: table_name.to_owned(),
                },
            );
            return Ok(TableMeta {
                schema: info.schema.clone(),
                status: info.status,
            });
        }
        if info.status != TableStatus::Active {
            let error = CoreError::ResourceInUse(format!(
                "table '{table_name}' is {}",
                info.status
            ));
            self.notifier.notify(
                context,
                Event::TableDeleteError {
                    table: table_name.to_owned(),
                    message: error.to_string(),
                },
            );
            return Err(error);
        }

        self.set_table_status(context, table_name, TableStatus::Deleting)
            .await?;

        let drop_result = {
            let driver = Arc::clone(&self.driver);
            let context_clone = context.clone();
            let table = table_name.to_owned();
            self.run_blocking(move || driver.delete_table(&context_clone, &table))
                .await
        };
        match drop_result {
            Ok(()) => {
                let repo = Arc::clone(&self.table_info_repo);
                let context_clone = context.clone();
                let table = table_name.to_owned();
                self.run_blocking(move || repo.delete(&context_clone, &table))
                    .await?;
                self.notifier.notify(
                    context,
                    Event::TableDeleteEnd {
                        table: table_name.to_owned(),
                    },
                );
                Ok(TableMeta {
                    schema: info.schema.clone(),
                    status: TableStatus::Deleting,
                })
            }
            Err(error) => {
                if let Err(status_error) = self
                    .set_table_status(context, table_name, TableStatus::DeleteFailed)
                    .await
                {
                    warn!(table = table_name, error = %status_error, "failed to mark table DELETE_FAILED");
                }
                self.notifier.notify(
                    context,
                    Event::TableDeleteError {
                        table: table_name.to_owned(),
                        message: error.to_string(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Describes a table.
    pub async fn describe_table(
        &self,
        context: &RequestContext,
        table_name: &str,
    ) -> CoreResult<TableMeta> {
        let repo = Arc::clone(&self.table_info_repo);
        let context = context.clone();
        let table_name = table_name.to_owned();
        let info = self
            .run_blocking(move || repo.get(&context, &table_name))
            .await?;
        Ok(TableMeta {
            schema: info.schema.clone(),
            status: info.status,
        })
    }

    /// Lists the tenant's table names.
    pub async fn list_tables(
        &self,
        context: &RequestContext,
        exclusive_start_table_name: Option<String>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<String>> {
        let repo = Arc::clone(&self.table_info_repo);
        let context = context.clone();
        self.run_blocking(move || {
            repo.list_tenant_table_names(&context, exclusive_start_table_name.as_deref(), limit)
        })
        .await
    }

    // -----------------------------------------------------------------
    // Item operations
    // -----------------------------------------------------------------

    /// Puts an item.
    pub async fn put_item(
        &self,
        context: &RequestContext,
        request: PutItemRequest,
        if_not_exist: bool,
        expected: Option<ConditionMap>,
    ) -> CoreResult<(bool, Option<Item>)> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.run_blocking(move || {
            driver.put_item(&context, &request, if_not_exist, expected.as_ref())
        })
        .await
    }

    /// Puts an item on a worker thread, returning the task handle.
    pub fn put_item_async(
        &self,
        context: &RequestContext,
        request: PutItemRequest,
        if_not_exist: bool,
        expected: Option<ConditionMap>,
    ) -> JoinHandle<CoreResult<(bool, Option<Item>)>> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.spawn_blocking_task(move || {
            driver.put_item(&context, &request, if_not_exist, expected.as_ref())
        })
    }

    /// Deletes an item.
    pub async fn delete_item(
        &self,
        context: &RequestContext,
        request: DeleteItemRequest,
        expected: Option<ConditionMap>,
    ) -> CoreResult<bool> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.run_blocking(move || driver.delete_item(&context, &request, expected.as_ref()))
            .await
    }

    /// Deletes an item on a worker thread, returning the task handle.
    pub fn delete_item_async(
        &self,
        context: &RequestContext,
        request: DeleteItemRequest,
        expected: Option<ConditionMap>,
    ) -> JoinHandle<CoreResult<bool>> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.spawn_blocking_task(move || driver.delete_item(&context, &request, expected.as_ref()))
    }

    /// Applies update actions to an item.
    pub async fn update_item(
        &self,
        context: &RequestContext,
        table_name: String,
        key_attribute_map: Item,
        attribute_action_map: BTreeMap<String, UpdateAction>,
        expected: Option<ConditionMap>,
    ) -> CoreResult<(bool, Option<Item>)> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.run_blocking(move || {
            driver.update_item(
                &context,
                &table_name,
                &key_attribute_map,
                &attribute_action_map,
                expected.as_ref(),
            )
        })
        .await
    }

    /// Queries items by key conditions.
    #[allow(clippy::too_many_arguments)]
    pub async fn select_item(
        &self,
        context: &RequestContext,
        table_name: String,
        indexed_condition_map: ConditionMap,
        select_type: SelectType,
        index_name: Option<String>,
        limit: Option<usize>,
        exclusive_start_key: Option<Item>,
        consistent: bool,
        order_type: Option<OrderType>,
    ) -> CoreResult<SelectResult> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.run_blocking(move || {
            driver.select_item(
                &context,
                &table_name,
                &indexed_condition_map,
                &select_type,
                index_name.as_deref(),
                limit,
                exclusive_start_key.as_ref(),
                consistent,
                order_type,
            )
        })
        .await
    }

    /// Scans a table with client-side filtering.
    #[allow(clippy::too_many_arguments)]
    pub async fn scan(
        &self,
        context: &RequestContext,
        table_name: String,
        condition_map: ConditionMap,
        attributes_to_get: Option<Vec<String>>,
        limit: Option<usize>,
        exclusive_start_key: Option<Item>,
        consistent: bool,
    ) -> CoreResult<ScanResult> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.run_blocking(move || {
            driver.scan(
                &context,
                &table_name,
                &condition_map,
                attributes_to_get.as_deref(),
                limit,
                exclusive_start_key.as_ref(),
                consistent,
            )
        })
        .await
    }

    /// Reads table statistics.
    pub async fn get_table_statistics(
        &self,
        context: &RequestContext,
        table_name: String,
        metric_keys: Vec<String>,
    ) -> CoreResult<BTreeMap<String, u64>> {
        let driver = Arc::clone(&self.driver);
        let context = context.clone();
        self.run_blocking(move || {
            driver.get_table_statistics(&context, &table_name, &metric_keys)
        })
        .await
    }

    // -----------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------

    /// Executes a write batch. Each sub-request runs as its own task;
    /// failed sub-requests are returned for resubmission, never dropped.
    pub async fn execute_write_batch(
        &self,
        context: &RequestContext,
        requests: Vec<WriteRequest>,
    ) -> CoreResult<Vec<WriteRequest>> {
        let request_count = requests.len();
        self.notifier.notify(
            context,
            Event::BatchWriteStart { request_count },
        );

        let mut handles: Vec<JoinHandle<CoreResult<()>>> = Vec::with_capacity(requests.len());
        for request in &requests {
            let driver = Arc::clone(&self.driver);
            let context_clone = context.clone();
            let request = request.clone();
            handles.push(self.spawn_blocking_task(move || match &request {
                WriteRequest::Put(put) => driver
                    .put_item(&context_clone, put, false, None)
                    .map(|_| ()),
                WriteRequest::Delete(delete) => driver
                    .delete_item(&context_clone, delete, None)
                    .map(|_| ()),
            }));
        }

        let outcomes = futures::future::join_all(handles).await;
        let mut unprocessed = Vec::new();
        for (request, outcome) in requests.into_iter().zip(outcomes) {
            let failed = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(error.to_string()),
                Err(join_error) => Some(join_error.to_string()),
            };
            if let Some(error) = failed {
                warn!(table = request.table_name(), %error, "write batch sub-request failed");
                unprocessed.push(request);
            }
        }

        self.notifier.notify(
            context,
            Event::BatchWriteEnd {
                request_count,
                unprocessed_count: unprocessed.len(),
            },
        );
        Ok(unprocessed)
    }

    /// Executes a read batch: each get runs as its own task. Returns the
    /// found items and the sub-requests that failed.
    pub async fn execute_get_batch(
        &self,
        context: &RequestContext,
        requests: Vec<GetItemRequest>,
    ) -> CoreResult<(Vec<Item>, Vec<GetItemRequest>)> {
        let mut handles: Vec<JoinHandle<CoreResult<Option<Item>>>> =
            Vec::with_capacity(requests.len());
        for request in &requests {
            let driver = Arc::clone(&self.driver);
            let context_clone = context.clone();
            let request = request.clone();
            handles.push(self.spawn_blocking_task(move || {
                let mut conditions = ConditionMap::new();
                for (name, value) in &request.key_attribute_map {
                    conditions.insert(name.clone(), vec![Condition::eq(value.clone())]);
                }
                let result = driver.select_item(
                    &context_clone,
                    &request.table_name,
                    &conditions,
                    &SelectType::All,
                    None,
                    None,
                    None,
                    request.consistent,
                    None,
                )?;
                let mut item = result.items.into_iter().next();
                if let (Some(item), Some(attributes)) = (&mut item, &request.attributes_to_get) {
                    item.retain(|name, _| attributes.iter().any(|a| a == name));
                }
                Ok(item)
            }));
        }

        let outcomes = futures::future::join_all(handles).await;
        let mut items = Vec::new();
        let mut unprocessed = Vec::new();
        for (request, outcome) in requests.into_iter().zip(outcomes) {
            match outcome {
                Ok(Ok(Some(item))) => items.push(item),
                Ok(Ok(None)) => {}
                Ok(Err(error)) => {
                    warn!(table = %request.table_name, %error, "get batch sub-request failed");
                    unprocessed.push(request);
                }
                Err(join_error) => {
                    warn!(table = %request.table_name, error = %join_error, "get batch sub-request failed");
                    unprocessed.push(request);
                }
            }
        }
        Ok((items, unprocessed))
    }
}

impl<D> fmt::Debug for SimpleStorageManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleStorageManager").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use columnar_model::{AttributeType, AttributeValue, ScanResult, SelectResult};
    use parking_lot::Mutex;

    use super::*;
    use crate::notifier::testing::RecordingNotifier;
    use crate::session::Session;
    use crate::testing::ScriptedConnection;

    #[derive(Default)]
    struct FakeDriver {
        calls: Mutex<Vec<String>>,
        fail_ddl: bool,
        select_items: Vec<Item>,
    }

    impl FakeDriver {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl StorageDriver for FakeDriver {
        fn create_table(&self, _context: &RequestContext, table_name: &str) -> CoreResult<()> {
            self.calls.lock().push(format!("create:{table_name}"));
            if self.fail_ddl {
                return Err(CoreError::Backend("schema disagreement".to_owned()));
            }
            Ok(())
        }

        fn delete_table(&self, _context: &RequestContext, table_name: &str) -> CoreResult<()> {
            self.calls.lock().push(format!("drop:{table_name}"));
            if self.fail_ddl {
                return Err(CoreError::Backend("schema disagreement".to_owned()));
            }
            Ok(())
        }

        fn put_item(
            &self,
            _context: &RequestContext,
            request: &columnar_model::PutItemRequest,
            _if_not_exist: bool,
            _expected: Option<&ConditionMap>,
        ) -> CoreResult<(bool, Option<Item>)> {
            self.calls.lock().push(format!("put:{}", request.table_name));
            if request
                .attribute_map
                .get("id")
                .and_then(AttributeValue::as_str)
                == Some("boom")
            {
                return Err(CoreError::Backend("write failed".to_owned()));
            }
            Ok((true, None))
        }

        fn delete_item(
            &self,
            _context: &RequestContext,
            request: &columnar_model::DeleteItemRequest,
            _expected: Option<&ConditionMap>,
        ) -> CoreResult<bool> {
            self.calls.lock().push(format!("delete:{}", request.table_name));
            Ok(true)
        }

        fn update_item(
            &self,
            _context: &RequestContext,
            table_name: &str,
            _key_attribute_map: &Item,
            _attribute_action_map: &BTreeMap<String, UpdateAction>,
            _expected: Option<&ConditionMap>,
        ) -> CoreResult<(bool, Option<Item>)> {
            self.calls.lock().push(format!("update:{table_name}"));
            Ok((true, None))
        }

        #[allow(clippy::too_many_arguments)]
        fn select_item(
            &self,
            _context: &RequestContext,
            table_name: &str,
            _indexed_condition_map: &ConditionMap,
            _select_type: &SelectType,
            _index_name: Option<&str>,
            _limit: Option<usize>,
            _exclusive_start_key: Option<&Item>,
            _consistent: bool,
            _order_type: Option<OrderType>,
        ) -> CoreResult<SelectResult> {
            self.calls.lock().push(format!("select:{table_name}"));
            Ok(SelectResult::with_items(self.select_items.clone()))
        }

        #[allow(clippy::too_many_arguments)]
        fn scan(
            &self,
            _context: &RequestContext,
            table_name: &str,
            _condition_map: &ConditionMap,
            _attributes_to_get: Option<&[String]>,
            _limit: Option<usize>,
            _exclusive_start_key: Option<&Item>,
            _consistent: bool,
        ) -> CoreResult<ScanResult> {
            self.calls.lock().push(format!("scan:{table_name}"));
            Ok(ScanResult::default())
        }

        fn execute_write_batch(
            &self,
            _context: &RequestContext,
            _requests: Vec<WriteRequest>,
        ) -> Vec<WriteRequest> {
            Vec::new()
        }

        fn get_table_statistics(
            &self,
            _context: &RequestContext,
            _table_name: &str,
            metric_keys: &[String],
        ) -> CoreResult<BTreeMap<String, u64>> {
            Ok(metric_keys.iter().map(|k| (k.clone(), 1)).collect())
        }
    }

    struct Fixture {
        connection: Arc<ScriptedConnection>,
        driver: Arc<FakeDriver>,
        notifier: Arc<RecordingNotifier>,
        manager: SimpleStorageManager<FakeDriver>,
        repo: Arc<TableInfoRepository>,
        context: RequestContext,
    }

    fn fixture(driver: FakeDriver) -> Fixture {
        let config = StorageConfig::default();
        let connection = Arc::new(ScriptedConnection::new());
        let session = Arc::new(Session::new(
            Arc::clone(&connection) as Arc<dyn crate::session::StoreConnection>,
            &config,
        ));
        let repo = Arc::new(TableInfoRepository::new(session, &config));
        let driver = Arc::new(driver);
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = SimpleStorageManager::new(
            Arc::clone(&driver),
            Arc::clone(&repo),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            &config,
        );
        Fixture {
            connection,
            driver,
            notifier,
            manager,
            repo,
            context: RequestContext::new("acme"),
        }
    }

    fn simple_schema() -> TableSchema {
        TableSchema::new(
            BTreeMap::from([("id".to_owned(), AttributeType::STRING)]),
            vec!["id".to_owned()],
            BTreeMap::new(),
        )
        .unwrap()
    }

    fn seeded_info(fixture: &Fixture, status: TableStatus) -> TableInfo {
        let mut info = TableInfo::new(&fixture.context, "things", simple_schema());
        info.status = status;
        info.internal_name = Some("t_1".to_owned());
        fixture.repo.seed_cache(&fixture.context, info.clone());
        info
    }

    #[tokio::test]
    async fn test_should_create_table_through_lifecycle() {
        let f = fixture(FakeDriver::default());
        f.connection.push_applied(true); // save CREATING
        f.connection.push_applied(true); // update -> ACTIVE

        let meta = f
            .manager
            .create_table(&f.context, "things", simple_schema())
            .await
            .unwrap();

        assert_eq!(meta.status, TableStatus::Active);
        assert_eq!(f.driver.calls(), vec!["create:things".to_owned()]);
        assert_eq!(
            f.notifier.events(),
            vec![
                Event::TableCreateStart {
                    table: "things".to_owned()
                },
                Event::TableCreateEnd {
                    table: "things".to_owned()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_should_mark_table_failed_when_ddl_fails() {
        let f = fixture(FakeDriver {
            fail_ddl: true,
            ..FakeDriver::default()
        });
        f.connection.push_applied(true); // save CREATING
        f.connection.push_applied(true); // update -> CREATE_FAILED

        let result = f
            .manager
            .create_table(&f.context, "things", simple_schema())
            .await;

        assert!(matches!(result, Err(CoreError::Backend(_))));
        let statements = f.connection.executed();
        assert!(statements[1].contains("'CREATE_FAILED'"));
        assert!(matches!(
            f.notifier.events().last(),
            Some(Event::TableCreateError { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_create() {
        let f = fixture(FakeDriver::default());
        f.connection.push_applied(false); // save rejected

        let result = f
            .manager
            .create_table(&f.context, "things", simple_schema())
            .await;

        assert!(matches!(result, Err(CoreError::TableAlreadyExists(_))));
        assert!(f.driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_delete_active_table() {
        let f = fixture(FakeDriver::default());
        seeded_info(&f, TableStatus::Active);
        f.connection.push_applied(true); // update -> DELETING
        f.connection.push_rows(Vec::new()); // descriptor delete

        let meta = f.manager.delete_table(&f.context, "things").await.unwrap();

        assert_eq!(meta.status, TableStatus::Deleting);
        assert_eq!(f.driver.calls(), vec!["drop:things".to_owned()]);
        assert_eq!(
            f.notifier.events(),
            vec![
                Event::TableDeleteStart {
                    table: "things".to_owned()
                },
                Event::TableDeleteEnd {
                    table: "things".to_owned()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_should_treat_delete_of_deleting_table_as_noop() {
        let f = fixture(FakeDriver::default());
        seeded_info(&f, TableStatus::Deleting);

        let meta = f.manager.delete_table(&f.context, "things").await.unwrap();
        assert_eq!(meta.status, TableStatus::Deleting);
        assert!(f.driver.calls().is_empty());
        assert!(f.connection.executed().is_empty());
    }

    #[tokio::test]
    async fn test_should_refuse_delete_of_table_in_transition() {
        let f = fixture(FakeDriver::default());
        seeded_info(&f, TableStatus::Creating);

        let result = f.manager.delete_table(&f.context, "things").await;
        assert!(matches!(result, Err(CoreError::ResourceInUse(_))));
        assert!(matches!(
            f.notifier.events().last(),
            Some(Event::TableDeleteError { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_describe_table() {
        let f = fixture(FakeDriver::default());
        seeded_info(&f, TableStatus::Active);

        let meta = f.manager.describe_table(&f.context, "things").await.unwrap();
        assert_eq!(meta.status, TableStatus::Active);
    }

    #[tokio::test]
    async fn test_should_pass_item_operations_to_driver() {
        let f = fixture(FakeDriver::default());
        let item: Item = [("id".to_owned(), AttributeValue::str("a"))]
            .into_iter()
            .collect();

        let (applied, old) = f
            .manager
            .put_item(
                &f.context,
                PutItemRequest::new("things", item.clone()),
                false,
                None,
            )
            .await
            .unwrap();
        assert!(applied);
        assert!(old.is_none());

        let deleted = f
            .manager
            .delete_item(
                &f.context,
                DeleteItemRequest::new("things", item.clone()),
                None,
            )
            .await
            .unwrap();
        assert!(deleted);

        assert_eq!(
            f.driver.calls(),
            vec!["put:things".to_owned(), "delete:things".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_should_return_unprocessed_requests_from_write_batch() {
        let f = fixture(FakeDriver::default());
        let good: Item = [("id".to_owned(), AttributeValue::str("a"))]
            .into_iter()
            .collect();
        let bad: Item = [("id".to_owned(), AttributeValue::str("boom"))]
            .into_iter()
            .collect();

        let requests = vec![
            WriteRequest::Put(PutItemRequest::new("things", good)),
            WriteRequest::Put(PutItemRequest::new("things", bad)),
            WriteRequest::Delete(DeleteItemRequest::new(
                "things",
                [("id".to_owned(), AttributeValue::str("c"))]
                    .into_iter()
                    .collect(),
            )),
        ];
        let unprocessed = f
            .manager
            .execute_write_batch(&f.context, requests)
            .await
            .unwrap();

        assert_eq!(unprocessed.len(), 1);
        assert!(matches!(&unprocessed[0], WriteRequest::Put(put)
            if put.attribute_map.get("id").and_then(AttributeValue::as_str) == Some("boom")));
        assert_eq!(
            f.notifier.events(),
            vec![
                Event::BatchWriteStart { request_count: 3 },
                Event::BatchWriteEnd {
                    request_count: 3,
                    unprocessed_count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_should_collect_items_from_get_batch() {
        let found: Item = [
            ("id".to_owned(), AttributeValue::str("a")),
            ("note".to_owned(), AttributeValue::str("x")),
        ]
        .into_iter()
        .collect();
        let f = fixture(FakeDriver {
            select_items: vec![found],
            ..FakeDriver::default()
        });

        let request = GetItemRequest {
            table_name: "things".to_owned(),
            key_attribute_map: [("id".to_owned(), AttributeValue::str("a"))]
                .into_iter()
                .collect(),
            attributes_to_get: Some(vec!["note".to_owned()]),
            consistent: true,
        };
        let (items, unprocessed) = f
            .manager
            .execute_get_batch(&f.context, vec![request])
            .await
            .unwrap();

        assert!(unprocessed.is_empty());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("note"), Some(&AttributeValue::str("x")));
        assert!(!items[0].contains_key("id"));
    }
}
