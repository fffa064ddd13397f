//! Table metadata repository.
//!
//! A system-wide `table_info` table maps `(tenant, logical name)` to the
//! table's id, schema (as JSON), lifecycle status and physical table name.
//! The physical name is an opaque id, not the user-facing name, so a table
//! can be recreated without migrating the old physical table first.
//!
//! Loaded descriptors are cached per `(tenant, name)` behind a single
//! mutex. Mutations invalidate the entry and re-seed it with the written
//! value; descriptors themselves are immutable once published.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use columnar_model::{TableSchema, TableStatus};

use crate::config::StorageConfig;
use crate::context::RequestContext;
use crate::encoding::cql_quote;
use crate::error::{CoreError, CoreResult};
use crate::session::{Row, Session, StoreValue};
use crate::statement::{TableRef, USER_PREFIX};

/// Name of the system table holding table descriptors.
pub const SYSTEM_TABLE_TABLE_INFO: &str = "table_info";

const FIELD_LIST: [&str; 5] = ["id", "schema", "status", "internal_name", "created_at"];

/// Runtime descriptor of a table.
///
/// Owned by the repository; other components receive it behind an `Arc`
/// and must not mutate it. Updates go through the repository, which
/// replaces the cached descriptor wholesale.
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// User-facing table name.
    pub name: String,
    /// Stable id, assigned at creation.
    pub id: Uuid,
    /// The table's schema.
    pub schema: TableSchema,
    /// Lifecycle status.
    pub status: TableStatus,
    /// Physical store table, once created.
    pub internal_name: Option<String>,
    /// Physical keyspace of the owning tenant.
    pub internal_keyspace: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TableInfo {
    /// Creates a fresh descriptor for a table being created.
    #[must_use]
    pub fn new(context: &RequestContext, name: impl Into<String>, schema: TableSchema) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
            schema,
            status: TableStatus::Creating,
            internal_name: None,
            internal_keyspace: internal_keyspace(&context.tenant),
            created_at: Utc::now(),
        }
    }

    /// The physical coordinates of the table, available once the physical
    /// table exists.
    pub fn table_ref(&self) -> CoreResult<TableRef<'_>> {
        let table = self.internal_name.as_deref().ok_or_else(|| {
            CoreError::Backend(format!("table '{}' has no physical table yet", self.name))
        })?;
        Ok(TableRef {
            keyspace: &self.internal_keyspace,
            table,
            schema: &self.schema,
        })
    }
}

/// The physical keyspace a tenant's tables live in.
#[must_use]
pub fn internal_keyspace(tenant: &str) -> String {
    format!("{USER_PREFIX}{tenant}")
}

/// Repository over the system table-info table, with a per-tenant cache.
pub struct TableInfoRepository {
    session: Arc<Session>,
    system_keyspace: String,
    cache: Mutex<HashMap<(String, String), Arc<TableInfo>>>,
}

impl TableInfoRepository {
    /// Creates a repository over the given session.
    #[must_use]
    pub fn new(session: Arc<Session>, config: &StorageConfig) -> Self {
        Self {
            session,
            system_keyspace: config.system_keyspace.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn system_table(&self) -> String {
        format!("\"{}\".\"{SYSTEM_TABLE_TABLE_INFO}\"", self.system_keyspace)
    }

    fn cache_key(context: &RequestContext, table_name: &str) -> (String, String) {
        (context.tenant.clone(), table_name.to_owned())
    }

    /// Fetches a table descriptor, from cache when possible.
    pub fn get(&self, context: &RequestContext, table_name: &str) -> CoreResult<Arc<TableInfo>> {
        if let Some(info) = self.cache.lock().get(&Self::cache_key(context, table_name)) {
            return Ok(Arc::clone(info));
        }

        let info = Arc::new(self.load(context, table_name)?);
        self.cache
            .lock()
            .insert(Self::cache_key(context, table_name), Arc::clone(&info));
        Ok(info)
    }

    fn load(&self, context: &RequestContext, table_name: &str) -> CoreResult<TableInfo> {
        let fields: Vec<String> = FIELD_LIST.iter().map(|f| format!("\"{f}\"")).collect();
        let statement = format!(
            "SELECT {} FROM {} WHERE tenant={} AND name={}",
            fields.join(","),
            self.system_table(),
            cql_quote(&context.tenant),
            cql_quote(table_name),
        );
        let rows = self.session.execute(statement, true)?;
        let Some(row) = rows.first() else {
            return Err(CoreError::TableNotFound(table_name.to_owned()));
        };
        parse_table_info(context, table_name, row)
    }

    /// Persists a new descriptor. Fails when the table already exists.
    pub fn save(&self, context: &RequestContext, info: &TableInfo) -> CoreResult<()> {
        let statement = format!(
            "INSERT INTO {} (tenant,name,\"id\",\"schema\",\"status\",\"internal_name\",\
             \"created_at\") VALUES({},{},{},{},{},{},{}) IF NOT EXISTS",
            self.system_table(),
            cql_quote(&context.tenant),
            cql_quote(&info.name),
            cql_quote(&info.id.to_string()),
            cql_quote(&schema_json(&info.schema)?),
            cql_quote(info.status.as_str()),
            info.internal_name
                .as_deref()
                .map_or_else(|| "null".to_owned(), cql_quote),
            cql_quote(&info.created_at.to_rfc3339()),
        );
        let rows = self.session.execute(statement, true)?;
        if !rows.first().is_none_or(Row::applied) {
            return Err(CoreError::TableAlreadyExists(info.name.clone()));
        }
        self.cache
            .lock()
            .insert(Self::cache_key(context, &info.name), Arc::new(info.clone()));
        debug!(table = %info.name, status = %info.status, "saved table info");
        Ok(())
    }

    /// Persists the listed fields of an updated descriptor and replaces
    /// the cached entry. Fails when the table no longer exists.
    pub fn update(
        &self,
        context: &RequestContext,
        info: &TableInfo,
        field_list: &[&str],
    ) -> CoreResult<()> {
        let mut assignments: Vec<String> = Vec::new();
        for field in field_list {
            let value = match *field {
                "schema" => cql_quote(&schema_json(&info.schema)?),
                "status" => cql_quote(info.status.as_str()),
                "internal_name" => info
                    .internal_name
                    .as_deref()
                    .map_or_else(|| "null".to_owned(), cql_quote),
                other => {
                    return Err(CoreError::Validation(format!(
                        "table info field '{other}' is not updatable"
                    )));
                }
            };
            assignments.push(format!("\"{field}\"={value}"));
        }
        let statement = format!(
            "UPDATE {} SET {} WHERE tenant={} AND name={} IF \"id\"={}",
            self.system_table(),
            assignments.join(","),
            cql_quote(&context.tenant),
            cql_quote(&info.name),
            cql_quote(&info.id.to_string()),
        );
        let rows = self.session.execute(statement, true)?;
        if !rows.first().is_none_or(Row::applied) {
            self.invalidate(context, &info.name);
            return Err(CoreError::TableNotFound(info.name.clone()));
        }
        // Invalidate-on-write: the cached descriptor is replaced, never
        // mutated in place.
        self.cache
            .lock()
            .insert(Self::cache_key(context, &info.name), Arc::new(info.clone()));
        debug!(table = %info.name, fields = ?field_list, "updated table info");
        Ok(())
    }

    /// Removes a descriptor.
    pub fn delete(&self, context: &RequestContext, table_name: &str) -> CoreResult<()> {
        let statement = format!(
            "DELETE FROM {} WHERE tenant={} AND name={}",
            self.system_table(),
            cql_quote(&context.tenant),
            cql_quote(table_name),
        );
        self.session.execute(statement, true)?;
        self.invalidate(context, table_name);
        Ok(())
    }

    /// Drops the cached entry for a table.
    pub fn invalidate(&self, context: &RequestContext, table_name: &str) {
        self.cache.lock().remove(&Self::cache_key(context, table_name));
    }

    /// Lists a tenant's table names, paginated by an exclusive start name.
    pub fn list_tenant_table_names(
        &self,
        context: &RequestContext,
        exclusive_start_table_name: Option<&str>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<String>> {
        let mut statement = format!(
            "SELECT name FROM {} WHERE tenant={}",
            self.system_table(),
            cql_quote(&context.tenant),
        );
        if let Some(start) = exclusive_start_table_name {
            statement.push_str(&format!(" AND name>{}", cql_quote(start)));
        }
        if let Some(limit) = limit {
            statement.push_str(&format!(" LIMIT {limit}"));
        }
        let rows = self.session.execute(statement, true)?;
        rows.iter()
            .map(|row| {
                row.get("name")
                    .and_then(StoreValue::as_text)
                    .map(str::to_owned)
                    .ok_or_else(|| CoreError::Backend("table info row has no name".to_owned()))
            })
            .collect()
    }
}

#[cfg(test)]
impl TableInfoRepository {
    /// Seeds the cache directly, bypassing the store.
    pub(crate) fn seed_cache(&self, context: &RequestContext, info: TableInfo) {
        self.cache
            .lock()
            .insert(Self::cache_key(context, &info.name), Arc::new(info));
    }
}

impl fmt::Debug for TableInfoRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableInfoRepository")
            .field("system_keyspace", &self.system_keyspace)
            .finish_non_exhaustive()
    }
}

fn schema_json(schema: &TableSchema) -> CoreResult<String> {
    serde_json::to_string(schema)
        .map_err(|e| CoreError::Backend(format!("schema serialization failed: {e}")))
}

fn parse_table_info(
    context: &RequestContext,
    table_name: &str,
    row: &Row,
) -> CoreResult<TableInfo> {
    let text = |field: &str| -> CoreResult<String> {
        row.get(field)
            .and_then(StoreValue::as_text)
            .map(str::to_owned)
            .ok_or_else(|| {
                CoreError::Backend(format!("table info row is missing field '{field}'"))
            })
    };

    let id = Uuid::parse_str(&text("id")?)
        .map_err(|e| CoreError::Backend(format!("malformed table id: {e}")))?;
    let schema: TableSchema = serde_json::from_str(&text("schema")?)
        .map_err(|e| CoreError::Backend(format!("malformed table schema: {e}")))?;
    let status: TableStatus = text("status")?
        .parse()
        .map_err(|e| CoreError::Backend(format!("malformed table status: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&text("created_at")?)
        .map_err(|e| CoreError::Backend(format!("malformed creation timestamp: {e}")))?
        .with_timezone(&Utc);
    let internal_name = row
        .get("internal_name")
        .and_then(StoreValue::as_text)
        .map(str::to_owned);

    Ok(TableInfo {
        name: table_name.to_owned(),
        id,
        schema,
        status,
        internal_name,
        internal_keyspace: internal_keyspace(&context.tenant),
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use columnar_model::AttributeType;

    use super::*;
    use crate::session::{StoreScalar, StoreValue};
    use crate::testing::ScriptedConnection;

    fn schema() -> TableSchema {
        TableSchema::new(
            BTreeMap::from([("id".to_owned(), AttributeType::STRING)]),
            vec!["id".to_owned()],
            BTreeMap::new(),
        )
        .unwrap()
    }

    fn repo(connection: &Arc<ScriptedConnection>) -> TableInfoRepository {
        let config = StorageConfig::default();
        let session = Arc::new(Session::new(
            Arc::clone(connection) as Arc<dyn crate::session::StoreConnection>,
            &config,
        ));
        TableInfoRepository::new(session, &config)
    }

    fn info_row(info: &TableInfo) -> Row {
        [
            (
                "id".to_owned(),
                StoreValue::Scalar(StoreScalar::Text(info.id.to_string())),
            ),
            (
                "schema".to_owned(),
                StoreValue::Scalar(StoreScalar::Text(
                    serde_json::to_string(&info.schema).unwrap(),
                )),
            ),
            (
                "status".to_owned(),
                StoreValue::Scalar(StoreScalar::Text(info.status.as_str().to_owned())),
            ),
            (
                "internal_name".to_owned(),
                info.internal_name.as_ref().map_or(StoreValue::Null, |n| {
                    StoreValue::Scalar(StoreScalar::Text(n.clone()))
                }),
            ),
            (
                "created_at".to_owned(),
                StoreValue::Scalar(StoreScalar::Text(info.created_at.to_rfc3339())),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_should_save_and_cache_table_info() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_applied(true);
        let repo = repo(&connection);
        let context = RequestContext::new("acme");
        let info = TableInfo::new(&context, "things", schema());

        repo.save(&context, &info).unwrap();

        // The descriptor is served from cache: no further statements.
        let fetched = repo.get(&context, "things").unwrap();
        assert_eq!(fetched.name, "things");
        assert_eq!(connection.executed().len(), 1);
        assert!(connection.executed()[0].starts_with("INSERT INTO \"columnar\".\"table_info\""));
    }

    #[test]
    fn test_should_reject_duplicate_save() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_applied(false);
        let repo = repo(&connection);
        let context = RequestContext::new("acme");
        let info = TableInfo::new(&context, "things", schema());

        let result = repo.save(&context, &info);
        assert!(matches!(result, Err(CoreError::TableAlreadyExists(_))));
    }

    #[test]
    fn test_should_load_from_store_on_cache_miss() {
        let connection = Arc::new(ScriptedConnection::new());
        let context = RequestContext::new("acme");
        let mut info = TableInfo::new(&context, "things", schema());
        info.status = TableStatus::Active;
        info.internal_name = Some("t_abc".to_owned());
        connection.push_rows(vec![info_row(&info)]);

        let repo = repo(&connection);
        let fetched = repo.get(&context, "things").unwrap();
        assert_eq!(fetched.status, TableStatus::Active);
        assert_eq!(fetched.internal_name.as_deref(), Some("t_abc"));
        assert_eq!(fetched.internal_keyspace, "user_acme");
        assert!(connection.executed()[0].starts_with("SELECT \"id\",\"schema\",\"status\""));
    }

    #[test]
    fn test_should_report_missing_table() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_rows(Vec::new());
        let repo = repo(&connection);
        let context = RequestContext::new("acme");

        let result = repo.get(&context, "ghost");
        assert!(matches!(result, Err(CoreError::TableNotFound(_))));
    }

    #[test]
    fn test_should_replace_cache_entry_on_update() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_applied(true); // save
        connection.push_applied(true); // update
        let repo = repo(&connection);
        let context = RequestContext::new("acme");
        let info = TableInfo::new(&context, "things", schema());
        repo.save(&context, &info).unwrap();

        let mut updated = info.clone();
        updated.status = TableStatus::Active;
        repo.update(&context, &updated, &["status"]).unwrap();

        let fetched = repo.get(&context, "things").unwrap();
        assert_eq!(fetched.status, TableStatus::Active);
        let statements = connection.executed();
        assert!(statements[1].contains("SET \"status\"='ACTIVE'"));
        assert!(statements[1].contains("IF \"id\"="));
    }

    #[test]
    fn test_should_report_missing_table_on_update_conflict() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_applied(false);
        let repo = repo(&connection);
        let context = RequestContext::new("acme");
        let info = TableInfo::new(&context, "things", schema());

        let result = repo.update(&context, &info, &["status"]);
        assert!(matches!(result, Err(CoreError::TableNotFound(_))));
    }

    #[test]
    fn test_should_list_tenant_tables_with_pagination() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_rows(vec![
            [(
                "name".to_owned(),
                StoreValue::Scalar(StoreScalar::Text("a".to_owned())),
            )]
            .into_iter()
            .collect(),
            [(
                "name".to_owned(),
                StoreValue::Scalar(StoreScalar::Text("b".to_owned())),
            )]
            .into_iter()
            .collect(),
        ]);
        let repo = repo(&connection);
        let context = RequestContext::new("acme");

        let names = repo
            .list_tenant_table_names(&context, Some("0"), Some(2))
            .unwrap();
        assert_eq!(names, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(
            connection.executed()[0],
            "SELECT name FROM \"columnar\".\"table_info\" WHERE tenant='acme' AND name>'0' LIMIT 2"
        );
    }
}
