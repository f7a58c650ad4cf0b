//! LanceDB connection wrapper.
//!
//! `LanceConnection` wraps a `lancedb::Connection` rooted at a filesystem path
//! and opens the memory table, creating it on first use.

use std::path::PathBuf;
use std::sync::Arc;

use arrow_schema::Schema;

/// LanceDB connection at a single filesystem path.
pub struct LanceConnection {
    db: lancedb::Connection,
}

impl LanceConnection {
    /// Open or create a LanceDB database at the given path.
    ///
    /// Creates the directory if it does not exist.
    pub async fn open(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        std::fs::create_dir_all(&base_path).map_err(|e| lancedb::Error::CreateDir {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let uri = base_path
            .to_str()
            .ok_or_else(|| lancedb::Error::InvalidInput {
                message: format!("Path contains invalid UTF-8: {}", base_path.display()),
            })?;

        let db = lancedb::connect(uri).execute().await?;
        tracing::debug!(path = %base_path.display(), "Opened LanceDB connection");

        Ok(Self { db })
    }

    /// Ensure a table exists with the given schema.
    ///
    /// If the table already exists, opens it. If not, creates an empty table
    /// with the provided schema.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                tracing::info!(table = table_name, "Creating LanceDB table");
                self.db
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::schema::{memory_schema, vector_dimension, DEFAULT_EMBEDDING_DIMENSION};

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let nested = temp_dir.path().join("a").join("vector_store");
        LanceConnection::open(nested.clone())
            .await
            .expect("Failed to open connection");
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn test_ensure_table_creates_and_reopens() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let conn = LanceConnection::open(temp_dir.path().to_path_buf())
            .await
            .expect("Failed to open connection");
        let schema = Arc::new(memory_schema(DEFAULT_EMBEDDING_DIMENSION));

        let table = conn
            .ensure_table("memories", schema.clone())
            .await
            .expect("Failed to create table");
        assert_eq!(table.count_rows(None).await.expect("Failed to count rows"), 0);

        let reopened = conn
            .ensure_table("memories", schema)
            .await
            .expect("Failed to reopen table");
        let existing = reopened.schema().await.expect("Failed to read schema");
        assert_eq!(vector_dimension(&existing), Some(DEFAULT_EMBEDDING_DIMENSION));
    }
}
