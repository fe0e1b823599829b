use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use super::{prepare_create, prepare_update, schema, ItemRepository, StoreError, StoreResult};
use crate::config::StorageOptions;
use crate::model::{
    format_date, format_timestamp, parse_date, parse_timestamp, Item, ValidationError,
};

const ITEM_COLUMNS: &str =
    "id, name, category, purchase_date, expiry_date, note, created_at, updated_at";

/// Per-record storage in a keyed table. Insertion order is the autoincrement `seq`
/// column, which `update` never touches.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db_path: Arc<PathBuf>,
    wal_autocheckpoint: u32,
}

impl SqliteRepository {
    pub fn open(db_path: &Path, options: &StorageOptions) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let repo = Self {
            db_path: Arc::new(db_path.to_path_buf()),
            wal_autocheckpoint: options.wal_autocheckpoint,
        };
        let conn = repo.connect()?;
        schema::apply(&conn)?;
        Ok(repo)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "wal_autocheckpoint", self.wal_autocheckpoint.to_string())?;
        Ok(conn)
    }

    fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }
}

impl ItemRepository for SqliteRepository {
    fn list_all(&self) -> StoreResult<Vec<Item>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY seq"))?;
            let rows = stmt
                .query_map([], StoredRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().filter_map(StoredRow::decode).collect())
        })
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Option<Item>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                    params![id],
                    StoredRow::from_row,
                )
                .optional()?;
            Ok(row.and_then(StoredRow::decode))
        })
    }

    fn create(&self, item: Item) -> StoreResult<()> {
        let item = prepare_create(item)?;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM items WHERE id = ?1", params![item.id], |_row| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Err(ValidationError::DuplicateId(item.id).into());
        }
        tx.execute(
            &format!("INSERT INTO items ({ITEM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                item.id,
                item.name,
                item.category,
                format_date(item.purchase_date),
                format_date(item.expiry_date),
                item.note,
                format_timestamp(item.created_at)?,
                format_timestamp(item.updated_at)?,
            ],
        )?;
        tx.commit()?;
        tracing::debug!(id = %item.id, "inserted item row");
        Ok(())
    }

    fn update(&self, item: Item) -> StoreResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let previous = tx
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![item.id],
                StoredRow::from_row,
            )
            .optional()?
            .and_then(StoredRow::decode);
        let Some(previous) = previous else {
            tracing::debug!(id = %item.id, "update for unknown item ignored");
            return Ok(());
        };
        let next = prepare_update(&previous, item, OffsetDateTime::now_utc())?;
        tx.execute(
            "UPDATE items
             SET name = ?2,
                 category = ?3,
                 purchase_date = ?4,
                 expiry_date = ?5,
                 note = ?6,
                 created_at = ?7,
                 updated_at = ?8
             WHERE id = ?1",
            params![
                next.id,
                next.name,
                next.category,
                format_date(next.purchase_date),
                format_date(next.expiry_date),
                next.note,
                format_timestamp(next.created_at)?,
                format_timestamp(next.updated_at)?,
            ],
        )?;
        tx.commit()?;
        tracing::debug!(id = %next.id, "updated item row");
        Ok(())
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        self.with_connection(|conn| {
            let removed = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
            tracing::debug!(id, removed, "delete item row");
            Ok(())
        })
    }
}

struct StoredRow {
    id: String,
    name: String,
    category: String,
    purchase_date: String,
    expiry_date: String,
    note: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            purchase_date: row.get(3)?,
            expiry_date: row.get(4)?,
            note: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    /// Rows with unparseable dates are skipped rather than failing the whole read.
    fn decode(self) -> Option<Item> {
        match self.try_decode() {
            Ok(item) => Some(item),
            Err(reason) => {
                tracing::warn!(id = %self.id, %reason, "skipping undecodable item row");
                None
            }
        }
    }

    fn try_decode(&self) -> Result<Item, String> {
        Ok(Item {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            purchase_date: parse_date(&self.purchase_date).map_err(|err| err.to_string())?,
            expiry_date: parse_date(&self.expiry_date).map_err(|err| err.to_string())?,
            note: self.note.clone(),
            created_at: parse_timestamp(&self.created_at).map_err(|err| err.to_string())?,
            updated_at: parse_timestamp(&self.updated_at).map_err(|err| err.to_string())?,
        })
    }
}
