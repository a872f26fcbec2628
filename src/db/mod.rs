//! SQL command execution that survives a dropped database link. The driver itself is external;
//! it plugs in through [`DbDriver`] and [`DbSession`].

use crate::config::reconnect::Reconnect;
use crate::connection::{ConnectionManager, Connector};
use crate::error::WorkhorseResult;
use crate::error::db::DbError;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Named statement parameters.
pub type Params = BTreeMap<String, Value>;

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DbDriver: Send + Sync {
    async fn open(&self) -> Result<Box<dyn DbSession>, DbError>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DbSession: Send {
    /// Run a statement that returns no rows. Returns the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError>;

    async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>, DbError>;

    /// Abort the statement currently running on this session, if any.
    async fn cancel(&mut self) -> Result<(), DbError>;
}

pub struct DbConnector {
    driver: Arc<dyn DbDriver>,
}

#[async_trait]
impl Connector for DbConnector {
    type Connection = Box<dyn DbSession>;
    type Error = DbError;

    fn name(&self) -> &str {
        "database"
    }

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.driver.open().await
    }

    fn is_transient(&self, error: &Self::Error) -> bool {
        error.is_connection_lost()
    }

    async fn release(&self, connection: &mut Self::Connection) {
        if let Err(err) = connection.cancel().await {
            warn!("Unable to cancel the running statement: {err}");
        }
    }
}

/// A database connection whose commands are re-run on a fresh session when the server link is
/// lost (driver codes 2000..=2013).
pub struct DbConnection {
    manager: ConnectionManager<DbConnector>,
}

impl DbConnection {
    pub fn new(driver: Arc<dyn DbDriver>, reconnect: Reconnect) -> Self {
        Self {
            manager: ConnectionManager::new(DbConnector { driver }, reconnect),
        }
    }

    /// Open the session now instead of on first use.
    pub async fn open(&mut self) -> WorkhorseResult<()> {
        self.manager
            .with_retry(|_session| async { Ok(()) }.boxed())
            .await?;
        Ok(())
    }

    pub async fn execute(&mut self, sql: &str, params: &Params) -> WorkhorseResult<u64> {
        let sql = sql.to_owned();
        let params = params.clone();
        let affected = self
            .manager
            .with_retry(|session| {
                let sql = sql.clone();
                let params = params.clone();
                async move { session.execute(&sql, &params).await }.boxed()
            })
            .await?;
        Ok(affected)
    }

    pub async fn query_all(&mut self, sql: &str, params: &Params) -> WorkhorseResult<Vec<Row>> {
        let sql = sql.to_owned();
        let params = params.clone();
        let rows = self
            .manager
            .with_retry(|session| {
                let sql = sql.clone();
                let params = params.clone();
                async move { session.query(&sql, &params).await }.boxed()
            })
            .await?;
        Ok(rows)
    }

    /// The first row of the result, if any.
    pub async fn query_row(&mut self, sql: &str, params: &Params) -> WorkhorseResult<Option<Row>> {
        Ok(self.query_all(sql, params).await?.into_iter().next())
    }

    /// The first column of the first row, if any.
    pub async fn query_scalar(
        &mut self,
        sql: &str,
        params: &Params,
    ) -> WorkhorseResult<Option<Value>> {
        Ok(self
            .query_row(sql, params)
            .await?
            .and_then(|row| row.first().cloned()))
    }

    /// The first column of every row.
    pub async fn query_column(&mut self, sql: &str, params: &Params) -> WorkhorseResult<Vec<Value>> {
        Ok(self
            .query_all(sql, params)
            .await?
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect())
    }
}
