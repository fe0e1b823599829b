use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::config::{ConfigPaths, StorageBackend, StorageOptions};
use crate::model::{normalize_note, Item, ValidationError};
use crate::search::{self, SearchFields};

mod schema;
mod snapshot;
mod sqlite;

pub use snapshot::{JsonFileBackend, MemoryBackend, SnapshotBackend, SnapshotRepository};
pub use sqlite::SqliteRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("storage i/o failed at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("database operation failed")]
    Database(#[from] rusqlite::Error),
    #[error("encoding items for storage")]
    Encode(#[source] serde_json::Error),
    #[error("formatting timestamp for storage")]
    Timestamp(#[from] time::error::Format),
}

impl StoreError {
    /// True when the storage medium itself failed, as opposed to the item being rejected.
    pub fn is_persistence(&self) -> bool {
        !matches!(self, StoreError::Validation(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Gateway to the persisted item collection.
///
/// Absence is never an error: an empty store lists nothing, an unknown id
/// yields `None`, and `update`/`remove` on an unknown id leave the
/// collection as it was. Only a failing storage medium or a rejected item
/// surfaces as [`StoreError`].
pub trait ItemRepository: Send + Sync {
    /// Every item in insertion order.
    fn list_all(&self) -> StoreResult<Vec<Item>>;

    fn get_by_id(&self, id: &str) -> StoreResult<Option<Item>>;

    /// Appends a fully populated item. The id must not already be stored.
    fn create(&self, item: Item) -> StoreResult<()>;

    /// Replaces the record sharing `item.id`, keeping its position and `created_at`
    /// and refreshing `updated_at`.
    fn update(&self, item: Item) -> StoreResult<()>;

    fn remove(&self, id: &str) -> StoreResult<()>;

    /// Blank queries match nothing; see [`search::search_items`].
    fn search(&self, query: &str, fields: SearchFields) -> StoreResult<Vec<Item>> {
        Ok(search::search_items(self.list_all()?, query, fields))
    }
}

pub(crate) fn prepare_create(mut item: Item) -> StoreResult<Item> {
    item.note = normalize_note(item.note);
    item.validate()?;
    Ok(item)
}

/// Carries `created_at` over from the stored record and moves `updated_at` strictly forward.
pub(crate) fn prepare_update(
    previous: &Item,
    mut next: Item,
    now: OffsetDateTime,
) -> StoreResult<Item> {
    next.created_at = previous.created_at;
    next.updated_at = touch(previous.updated_at, now);
    next.note = normalize_note(next.note);
    next.validate()?;
    Ok(next)
}

fn touch(previous: OffsetDateTime, now: OffsetDateTime) -> OffsetDateTime {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<Arc<dyn ItemRepository>> {
    fs::create_dir_all(&paths.data_dir)
        .with_context(|| format!("creating data directory {}", paths.data_dir.display()))?;
    let repository: Arc<dyn ItemRepository> = match storage.backend {
        StorageBackend::Json => {
            tracing::debug!(path = %storage.items_path.display(), "using json item storage");
            Arc::new(SnapshotRepository::new(JsonFileBackend::new(
                storage.items_path.clone(),
            )))
        }
        StorageBackend::Sqlite => {
            tracing::debug!(path = %storage.database_path.display(), "using sqlite item storage");
            Arc::new(
                SqliteRepository::open(&storage.database_path, storage)
                    .with_context(|| format!("opening {}", storage.database_path.display()))?,
            )
        }
    };
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;
    use time::macros::{date, datetime};

    type Backends = Vec<(&'static str, Box<dyn ItemRepository>)>;

    fn backends() -> anyhow::Result<(TempDir, Backends)> {
        let temp = TempDir::new()?;
        let json = SnapshotRepository::new(JsonFileBackend::new(temp.path().join("items.json")));
        let sqlite =
            SqliteRepository::open(&temp.path().join("items.db"), &StorageOptions::default())?;
        let repos: Backends = vec![
            ("memory", Box::new(SnapshotRepository::new(MemoryBackend::new()))),
            ("json", Box::new(json)),
            ("sqlite", Box::new(sqlite)),
        ];
        Ok((temp, repos))
    }

    fn item(id: &str, name: &str, category: &str) -> Item {
        Item {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            purchase_date: date!(2024 - 01 - 01),
            expiry_date: date!(2024 - 01 - 15),
            note: None,
            created_at: datetime!(2024-01-01 09:00 UTC),
            updated_at: datetime!(2024-01-01 09:00 UTC),
        }
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn yogurt_lifecycle() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            assert!(repo.list_all()?.is_empty(), "{name}: store starts empty");

            let yogurt = item("1", "Yogurt", "Dairy");
            repo.create(yogurt.clone())?;
            assert_eq!(repo.list_all()?, vec![yogurt.clone()], "{name}");
            assert_eq!(repo.search("yog", SearchFields::all())?, vec![yogurt], "{name}");

            repo.remove("1")?;
            assert!(repo.list_all()?.is_empty(), "{name}: removed");
        }
        Ok(())
    }

    #[test]
    fn create_then_get_round_trips() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            let mut bread = item("b-1", "Bread", "Bakery");
            bread.note = Some("sourdough".into());
            repo.create(bread.clone())?;
            assert_eq!(repo.get_by_id("b-1")?, Some(bread), "{name}");
            assert_eq!(repo.get_by_id("missing")?, None, "{name}");
        }
        Ok(())
    }

    #[test]
    fn update_keeps_creation_time_and_advances_updated_at() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            let original = item("1", "Milk", "Dairy");
            repo.create(original.clone())?;

            let mut edited = original.clone();
            edited.name = "Oat milk".into();
            edited.created_at = datetime!(2024-01-05 00:00 UTC);
            edited.updated_at = datetime!(2024-01-05 00:00 UTC);
            repo.update(edited)?;

            let first = repo.get_by_id("1")?.expect("stored");
            assert_eq!(first.name, "Oat milk", "{name}");
            assert_eq!(first.created_at, original.created_at, "{name}");
            assert!(first.updated_at > original.updated_at, "{name}");

            repo.update(first.clone())?;
            let second = repo.get_by_id("1")?.expect("stored");
            assert!(second.updated_at > first.updated_at, "{name}: strictly increasing");
        }
        Ok(())
    }

    #[test]
    fn update_preserves_position() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            repo.create(item("a", "Apples", "Fruit"))?;
            repo.create(item("b", "Butter", "Dairy"))?;
            repo.create(item("c", "Carrots", "Veg"))?;

            let mut butter = repo.get_by_id("b")?.expect("stored");
            butter.category = "Spreads".into();
            repo.update(butter)?;

            let all = repo.list_all()?;
            assert_eq!(ids(&all), vec!["a", "b", "c"], "{name}");
            assert_eq!(all[1].category, "Spreads", "{name}");
        }
        Ok(())
    }

    #[test]
    fn update_of_unknown_id_is_a_no_op() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            repo.create(item("a", "Apples", "Fruit"))?;
            let before = repo.list_all()?;
            repo.update(item("ghost", "Ghost", "Nowhere"))?;
            assert_eq!(repo.list_all()?, before, "{name}");
        }
        Ok(())
    }

    #[test]
    fn remove_of_absent_id_leaves_collection_unchanged() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            repo.create(item("a", "Apples", "Fruit"))?;
            repo.create(item("b", "Butter", "Dairy"))?;
            let before = repo.list_all()?;
            repo.remove("zzz")?;
            assert_eq!(repo.list_all()?, before, "{name}");
            repo.remove("a")?;
            assert_eq!(ids(&repo.list_all()?), vec!["b"], "{name}");
        }
        Ok(())
    }

    #[test]
    fn create_rejects_duplicate_ids_and_invalid_items() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            repo.create(item("a", "Apples", "Fruit"))?;
            assert_matches!(
                repo.create(item("a", "Again", "Fruit")),
                Err(StoreError::Validation(ValidationError::DuplicateId(id))) if id == "a",
                "{name}"
            );

            let mut reversed = item("r", "Rice", "Grains");
            reversed.expiry_date = date!(2023 - 12 - 01);
            let err = repo.create(reversed).expect_err("reversed dates rejected");
            assert!(!err.is_persistence(), "{name}");

            assert_eq!(repo.list_all()?.len(), 1, "{name}");
        }
        Ok(())
    }

    #[test]
    fn update_rejects_invalid_replacement() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            repo.create(item("a", "Apples", "Fruit"))?;
            let mut blank = item("a", "   ", "Fruit");
            blank.note = Some("x".into());
            assert_matches!(
                repo.update(blank),
                Err(StoreError::Validation(ValidationError::EmptyName)),
                "{name}"
            );
            assert_eq!(repo.get_by_id("a")?.expect("kept").name, "Apples", "{name}");
        }
        Ok(())
    }

    #[test]
    fn search_is_case_insensitive_and_blank_queries_are_empty() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            repo.create(item("1", "Milk", "Dairy"))?;
            repo.create(item("2", "Bread", "Bakery"))?;
            assert_eq!(ids(&repo.search("milk", SearchFields::all())?), vec!["1"], "{name}");
            assert!(repo.search("", SearchFields::all())?.is_empty(), "{name}");
            assert!(repo.search("   ", SearchFields::all())?.is_empty(), "{name}");
            assert_eq!(
                ids(&repo.search("BAK", SearchFields::CATEGORY)?),
                vec!["2"],
                "{name}"
            );
            assert!(repo.search("bak", SearchFields::NAME)?.is_empty(), "{name}");
        }
        Ok(())
    }

    #[test]
    fn blank_notes_are_stored_as_absent() -> anyhow::Result<()> {
        let (_temp, repos) = backends()?;
        for (name, repo) in repos {
            let mut eggs = item("e", "Eggs", "Dairy");
            eggs.note = Some("  ".into());
            repo.create(eggs)?;
            assert_eq!(repo.get_by_id("e")?.expect("stored").note, None, "{name}");
        }
        Ok(())
    }

    #[test]
    fn touch_moves_forward_when_clock_stalls() {
        let stored = datetime!(2024-01-01 09:00 UTC);
        assert_eq!(touch(stored, stored), stored + Duration::milliseconds(1));
        let later = datetime!(2024-01-02 09:00 UTC);
        assert_eq!(touch(stored, later), later);
    }
}
