//! SQLite implementation of IStateStore
//!
//! Concrete SQLite-based implementation of the persistence port defined in
//! treesync-core. Handles domain type serialization and SQL construction.
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                          |
//! |----------------------|----------|-----------------------------------|
//! | PathBuf              | TEXT     | lossy UTF-8 string                |
//! | FileStatus           | TEXT     | `as_str()` / `from_str` helper    |
//! | UploadStatus         | TEXT     | `as_str()` / `from_str` helper    |
//! | RemoteId             | TEXT     | `as_str()` / `RemoteId::new()`    |
//!
//! Create-if-absent operations use `INSERT OR IGNORE` against the UNIQUE
//! path column, then read back the row that ended up in the store, so they
//! are safe under concurrent reconciliation passes.

use std::path::{Path, PathBuf};

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use treesync_core::domain::{
    Credential, FileStatus, Node, RemoteId, RemoteMapping, UploadStatus, WatchRoot,
};
use treesync_core::ports::IStateStore;

use crate::StoreError;

/// SQLite-based implementation of the state store port
///
/// Provides persistent storage for all domain entities using SQLite.
/// All operations are performed through a connection pool; SQLite's own
/// locking serializes conflicting writes.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn file_status_from_str(s: &str) -> Result<FileStatus, StoreError> {
    match s {
        "unmodified" => Ok(FileStatus::Unmodified),
        "modified" => Ok(FileStatus::Modified),
        other => Err(StoreError::SerializationError(format!(
            "Unknown file status: {}",
            other
        ))),
    }
}

fn upload_status_from_str(s: &str) -> Result<UploadStatus, StoreError> {
    match s {
        "uploaded" => Ok(UploadStatus::Uploaded),
        "not_uploaded" => Ok(UploadStatus::NotUploaded),
        other => Err(StoreError::SerializationError(format!(
            "Unknown upload status: {}",
            other
        ))),
    }
}

fn remote_id_from_column(s: String) -> Result<RemoteId, StoreError> {
    RemoteId::new(s).map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn path_to_column(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn node_from_row(row: &SqliteRow) -> Result<Node, StoreError> {
    let file_status_str: String = row.get("file_status");
    let upload_status_str: String = row.get("upload_status");
    let path_str: String = row.get("absolute_path");

    Ok(Node {
        id: row.get("id"),
        name: row.get("name"),
        is_dir: row.get::<i64, _>("is_dir") != 0,
        file_status: file_status_from_str(&file_status_str)?,
        upload_status: upload_status_from_str(&upload_status_str)?,
        absolute_path: PathBuf::from(path_str),
    })
}

fn root_from_row(row: &SqliteRow) -> Result<WatchRoot, StoreError> {
    let path_str: String = row.get("absolute_path");
    let remote_id_str: Option<String> = row.get("remote_id");

    let remote_id = match remote_id_str {
        Some(s) if !s.is_empty() => Some(remote_id_from_column(s)?),
        _ => None,
    };

    Ok(WatchRoot {
        id: row.get("id"),
        name: row.get("name"),
        absolute_path: PathBuf::from(path_str),
        remote_id,
    })
}

fn mapping_from_row(row: &SqliteRow) -> Result<RemoteMapping, StoreError> {
    let local_path_str: String = row.get("local_path");
    let object_id_str: String = row.get("remote_object_id");
    let parent_id_str: String = row.get("remote_parent_id");

    Ok(RemoteMapping {
        id: row.get("id"),
        name: row.get("name"),
        local_path: PathBuf::from(local_path_str),
        remote_object_id: remote_id_from_column(object_id_str)?,
        remote_parent_id: remote_id_from_column(parent_id_str)?,
    })
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential, StoreError> {
    let device_root_str: Option<String> = row.get("device_root_id");
    let host_folder_str: Option<String> = row.get("host_folder_id");

    let device_root_id = match device_root_str {
        Some(s) if !s.is_empty() => Some(remote_id_from_column(s)?),
        _ => None,
    };
    let host_folder_id = match host_folder_str {
        Some(s) if !s.is_empty() => Some(remote_id_from_column(s)?),
        _ => None,
    };

    Ok(Credential {
        value: row.get("value"),
        device_root_id,
        host_folder_id,
    })
}

// ============================================================================
// IStateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateStore for SqliteStateStore {
    // --- Tracked nodes ---

    async fn create_node_if_absent(&self, node: &Node) -> anyhow::Result<Node> {
        let path = path_to_column(&node.absolute_path);

        sqlx::query(
            "INSERT OR IGNORE INTO nodes \
             (name, is_dir, file_status, upload_status, absolute_path) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&node.name)
        .bind(node.is_dir as i64)
        .bind(node.file_status.as_str())
        .bind(node.upload_status.as_str())
        .bind(&path)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM nodes WHERE absolute_path = ?")
            .bind(&path)
            .fetch_one(&self.pool)
            .await?;

        let stored = node_from_row(&row)?;
        tracing::trace!(path = %path, id = stored.id, "Ensured node row");
        Ok(stored)
    }

    async fn update_node(&self, node: &Node) -> anyhow::Result<()> {
        let path = path_to_column(&node.absolute_path);

        sqlx::query(
            "UPDATE nodes SET name = ?, is_dir = ?, file_status = ?, upload_status = ? \
             WHERE absolute_path = ?",
        )
        .bind(&node.name)
        .bind(node.is_dir as i64)
        .bind(node.file_status.as_str())
        .bind(node.upload_status.as_str())
        .bind(&path)
        .execute(&self.pool)
        .await?;

        tracing::trace!(path = %path, "Updated node row");
        Ok(())
    }

    async fn get_node_by_path(&self, path: &Path) -> anyhow::Result<Option<Node>> {
        let row = sqlx::query("SELECT * FROM nodes WHERE absolute_path = ?")
            .bind(path_to_column(path))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(node_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_nodes(&self) -> anyhow::Result<Vec<Node>> {
        let rows = sqlx::query("SELECT * FROM nodes ORDER BY absolute_path ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(node_from_row(row)?);
        }
        Ok(nodes)
    }

    async fn delete_node_by_path(&self, path: &Path) -> anyhow::Result<()> {
        let path = path_to_column(path);
        sqlx::query("DELETE FROM nodes WHERE absolute_path = ?")
            .bind(&path)
            .execute(&self.pool)
            .await?;

        tracing::trace!(path = %path, "Deleted node row");
        Ok(())
    }

    // --- Watch roots ---

    async fn create_root_if_absent(&self, root: &WatchRoot) -> anyhow::Result<WatchRoot> {
        let path = path_to_column(&root.absolute_path);

        sqlx::query(
            "INSERT OR IGNORE INTO watch_roots (name, absolute_path, remote_id) \
             VALUES (?, ?, ?)",
        )
        .bind(&root.name)
        .bind(&path)
        .bind(root.remote_id.as_ref().map(|r| r.as_str().to_string()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM watch_roots WHERE absolute_path = ?")
            .bind(&path)
            .fetch_one(&self.pool)
            .await?;

        let stored = root_from_row(&row)?;
        tracing::trace!(path = %path, id = stored.id, "Ensured watch root row");
        Ok(stored)
    }

    async fn list_roots(&self) -> anyhow::Result<Vec<WatchRoot>> {
        let rows = sqlx::query("SELECT * FROM watch_roots ORDER BY absolute_path ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut roots = Vec::with_capacity(rows.len());
        for row in &rows {
            roots.push(root_from_row(row)?);
        }
        Ok(roots)
    }

    async fn delete_root_by_path(&self, path: &Path) -> anyhow::Result<()> {
        let path = path_to_column(path);
        sqlx::query("DELETE FROM watch_roots WHERE absolute_path = ?")
            .bind(&path)
            .execute(&self.pool)
            .await?;

        tracing::trace!(path = %path, "Deleted watch root row");
        Ok(())
    }

    // --- Remote mappings ---

    async fn create_mapping_if_absent(
        &self,
        mapping: &RemoteMapping,
    ) -> anyhow::Result<RemoteMapping> {
        let path = path_to_column(&mapping.local_path);

        sqlx::query(
            "INSERT OR IGNORE INTO remote_mappings \
             (name, local_path, remote_object_id, remote_parent_id) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&mapping.name)
        .bind(&path)
        .bind(mapping.remote_object_id.as_str())
        .bind(mapping.remote_parent_id.as_str())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM remote_mappings WHERE local_path = ?")
            .bind(&path)
            .fetch_one(&self.pool)
            .await?;

        let stored = mapping_from_row(&row)?;
        tracing::trace!(path = %path, remote_id = %stored.remote_object_id, "Ensured mapping row");
        Ok(stored)
    }

    async fn get_mapping(&self, local_path: &Path) -> anyhow::Result<Option<RemoteMapping>> {
        let row = sqlx::query("SELECT * FROM remote_mappings WHERE local_path = ?")
            .bind(path_to_column(local_path))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(mapping_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_mappings(&self) -> anyhow::Result<Vec<RemoteMapping>> {
        let rows = sqlx::query("SELECT * FROM remote_mappings ORDER BY local_path ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut mappings = Vec::with_capacity(rows.len());
        for row in &rows {
            mappings.push(mapping_from_row(row)?);
        }
        Ok(mappings)
    }

    async fn delete_mapping(&self, local_path: &Path) -> anyhow::Result<()> {
        let path = path_to_column(local_path);
        sqlx::query("DELETE FROM remote_mappings WHERE local_path = ?")
            .bind(&path)
            .execute(&self.pool)
            .await?;

        tracing::trace!(path = %path, "Deleted mapping row");
        Ok(())
    }

    // --- Credential (singleton) ---

    async fn get_credential(&self) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query("SELECT * FROM credentials WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(credential_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn save_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO credentials (id, value, device_root_id, host_folder_id) \
             VALUES (1, ?, ?, ?)",
        )
        .bind(&credential.value)
        .bind(
            credential
                .device_root_id
                .as_ref()
                .map(|r| r.as_str().to_string()),
        )
        .bind(
            credential
                .host_folder_id
                .as_ref()
                .map(|r| r.as_str().to_string()),
        )
        .execute(&self.pool)
        .await?;

        tracing::trace!("Saved credential row");
        Ok(())
    }
}
