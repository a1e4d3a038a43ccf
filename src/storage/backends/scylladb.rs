use async_trait::async_trait;
use bytes::Bytes;
use scylla::IntoTypedRows;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Blob, BlobRecord, RecordSummary};
use crate::storage::backends::sql::{default_table, validate_table_name};
use crate::storage::{BlobKey, BlobStream, StorageBackend};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScyllaConfig {
    /// Contact points, as `host:port`.
    pub nodes: Vec<String>,
    pub keyspace: String,
    pub user: Option<String>,
    pub password: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,
}

pub struct ScyllaBackend {
    table: String,
    connection: session::Session,
}

impl ScyllaBackend {
    pub async fn connect(cfg: &ScyllaConfig) -> anyhow::Result<Self> {
        validate_table_name(&cfg.table)?;

        let mut session_cfg = scylla::SessionConfig::new();
        session_cfg.add_known_nodes(cfg.nodes.as_slice());
        session_cfg.auth_username = cfg.user.clone();
        session_cfg.auth_password = cfg.password.clone();

        let base = scylla::Session::connect(session_cfg).await?;
        base.use_keyspace(&cfg.keyspace, false).await?;

        let connection = session::Session::from(base);

        let qry = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
            id uuid PRIMARY KEY, \
            content_type text, \
            content blob \
        )",
            cfg.table
        );
        connection.query(&qry, ()).await?;

        Ok(Self {
            table: cfg.table.clone(),
            connection,
        })
    }
}

fn db_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

#[async_trait]
impl StorageBackend for ScyllaBackend {
    fn name(&self) -> &'static str {
        "scylla"
    }

    async fn ready(&self) -> StorageResult<()> {
        self.connection
            .query("SELECT now() FROM system.local;", ())
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn store(&self, _filename: &str, _stream: BlobStream<'_>) -> StorageResult<BlobKey> {
        Err(StorageError::Unsupported(self.name()))
    }

    async fn insert(&self, record: &BlobRecord) -> StorageResult<()> {
        let qry = format!(
            "INSERT INTO {table} (id, content_type, content) VALUES (?, ?, ?);",
            table = self.table
        );

        self.connection
            .query_prepared(
                &qry,
                (
                    record.id(),
                    record.content_type().to_string(),
                    record.content().to_vec(),
                ),
            )
            .await
            .map_err(db_error)?;

        Ok(())
    }

    async fn fetch(&self, key: &BlobKey) -> StorageResult<Blob> {
        let file_id = key.as_id()?;
        let qry = format!(
            "SELECT content_type, content FROM {table} WHERE id = ?;",
            table = self.table
        );

        let row = self
            .connection
            .query_prepared(&qry, (file_id,))
            .await
            .map_err(db_error)?
            .rows
            .unwrap_or_default()
            .into_typed::<(String, Vec<u8>)>()
            .next()
            .transpose()
            .map_err(db_error)?;

        match row {
            Some((content_type, content)) => Ok(Blob {
                data: Bytes::from(content),
                content_type: Some(content_type),
            }),
            None => Err(StorageError::record_not_found(file_id)),
        }
    }

    async fn delete(&self, keys: &[BlobKey]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let ids = keys
            .iter()
            .map(BlobKey::as_id)
            .collect::<StorageResult<Vec<Uuid>>>()?;

        let qry = format!("DELETE FROM {table} WHERE id IN ?;", table = self.table);
        debug!("Purging {} records", ids.len());

        self.connection
            .query_prepared(&qry, (ids,))
            .await
            .map_err(db_error)?;

        Ok(())
    }

    /// CQL has no offsets, rows are read up to `offset + limit` and the head
    /// is skipped. Ordering follows the partition token.
    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Vec<RecordSummary>> {
        let qry = format!(
            "SELECT id, content_type FROM {table} LIMIT ?;",
            table = self.table
        );
        let upto = limit.saturating_add(offset).min(i32::MAX as u32) as i32;

        self.connection
            .query_prepared(&qry, (upto,))
            .await
            .map_err(db_error)?
            .rows
            .unwrap_or_default()
            .into_typed::<(Uuid, String)>()
            .skip(offset as usize)
            .map(|row| {
                row.map(|(id, content_type)| RecordSummary { id, content_type })
                    .map_err(db_error)
            })
            .collect()
    }
}

mod session {
    use std::fmt::Debug;

    use scylla::frame::value::ValueList;
    use scylla::query::Query;
    use scylla::transport::errors::{DbError, QueryError};
    use scylla::QueryResult;

    /// Statement cache size, one entry per distinct query string.
    const CACHE_SIZE: usize = 32;

    pub struct Session(scylla::CachingSession);

    impl From<scylla::Session> for Session {
        fn from(s: scylla::Session) -> Self {
            Self(scylla::CachingSession::from(s, CACHE_SIZE))
        }
    }

    impl Session {
        #[instrument(skip(self, query), level = "debug")]
        pub async fn query(
            &self,
            query: &str,
            values: impl ValueList + Debug,
        ) -> Result<QueryResult, QueryError> {
            debug!("executing query {}", query);
            let result = self.0.execute(query, &values).await;

            if let Err(ref e) = result {
                consider_logging_error(e);
            }

            result
        }

        #[instrument(skip(self, query, values), level = "debug")]
        pub async fn query_prepared(
            &self,
            query: &str,
            values: impl ValueList,
        ) -> Result<QueryResult, QueryError> {
            debug!("executing prepared statement: {}", query);
            let result = self.0.execute(Query::from(query), &values).await;

            if let Err(ref e) = result {
                consider_logging_error(e);
            }

            result
        }
    }

    fn consider_logging_error(e: &QueryError) {
        if let QueryError::DbError(DbError::AlreadyExists { .. }, ..) = e {
            info!("Table already exists, skipping...");
        } else {
            warn!("query failed: {}", e);
        }
    }
}
