//! Test doubles for the store connection.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use crate::session::{
    APPLIED_COLUMN, Row, Statement, StoreConnection, StoreError, StoreScalar, StoreValue,
};

/// A scripted connection: responses are queued up front and handed out in
/// order, while every executed statement is recorded for assertions.
#[derive(Debug, Default)]
pub(crate) struct ScriptedConnection {
    statements: Mutex<Vec<Statement>>,
    responses: Mutex<VecDeque<Result<Vec<Row>, StoreError>>>,
}

impl ScriptedConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues a plain row response.
    pub(crate) fn push_rows(&self, rows: Vec<Row>) {
        self.responses.lock().push_back(Ok(rows));
    }

    /// Queues a lightweight-transaction response with the given outcome
    /// and extra columns (the current cell values the store reports on a
    /// failed compare-and-set).
    pub(crate) fn push_applied_with(&self, applied: bool, mut columns: Vec<(String, StoreValue)>) {
        columns.push((
            APPLIED_COLUMN.to_owned(),
            StoreValue::Scalar(StoreScalar::Bool(applied)),
        ));
        self.push_rows(vec![columns.into_iter().collect()]);
    }

    /// Queues a lightweight-transaction response with no extra columns.
    pub(crate) fn push_applied(&self, applied: bool) {
        self.push_applied_with(applied, Vec::new());
    }

    /// Queues an error response.
    pub(crate) fn push_error(&self, error: StoreError) {
        self.responses.lock().push_back(Err(error));
    }

    /// The texts of all executed statements, in order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.statements
            .lock()
            .iter()
            .map(|s| s.text().to_owned())
            .collect()
    }

    /// The consistency flags of all executed statements, in order.
    #[allow(dead_code)]
    pub(crate) fn consistency_flags(&self) -> Vec<bool> {
        self.statements.lock().iter().map(Statement::consistent).collect()
    }
}

impl StoreConnection for ScriptedConnection {
    fn execute(&self, statement: &Statement, _timeout: Duration) -> Result<Vec<Row>, StoreError> {
        self.statements.lock().push(statement.clone());
        self.responses.lock().pop_front().unwrap_or_else(|| {
            panic!("unexpected statement: {}", statement.text());
        })
    }

    fn schema_settled(
        &self,
        _keyspace: &str,
        _table: &str,
        _expect_exists: bool,
        _timeout: Duration,
    ) -> Result<(), StoreError> {
        Ok(())
    }
}
