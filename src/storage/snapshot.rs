use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{prepare_create, prepare_update, ItemRepository, StoreError, StoreResult};
use crate::model::{Item, ValidationError};

const TMP_EXTENSION: &str = "json.tmp";
const CORRUPT_EXTENSION: &str = "json.corrupt";

/// Raw get/set of the whole serialised collection under a single key.
pub trait SnapshotBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> StoreResult<Option<Vec<u8>>>;

    fn write(&self, payload: &[u8]) -> StoreResult<()>;

    /// Called with an undecodable payload right before it is overwritten.
    fn preserve_corrupt(&self, _payload: &[u8]) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            slot: Mutex::new(Some(payload.into())),
        }
    }

    pub fn payload(&self) -> Option<Vec<u8>> {
        self.slot.lock().clone()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn read(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.slot.lock().clone())
    }

    fn write(&self, payload: &[u8]) -> StoreResult<()> {
        *self.slot.lock() = Some(payload.to_vec());
        Ok(())
    }
}

/// One JSON file holding the whole collection, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the first preserved copy of an unreadable snapshot goes. Later copies
    /// get a numeric suffix so earlier ones are never replaced.
    pub fn corrupt_copy_path(&self) -> PathBuf {
        self.corrupt_slot(0)
    }

    fn corrupt_slot(&self, attempt: u32) -> PathBuf {
        if attempt == 0 {
            self.path.with_extension(CORRUPT_EXTENSION)
        } else {
            self.path.with_extension(format!("{CORRUPT_EXTENSION}.{attempt}"))
        }
    }

    fn io_error(path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn read(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::io_error(&self.path, err)),
        }
    }

    fn write(&self, payload: &[u8]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| Self::io_error(parent, err))?;
        }
        let tmp_path = self.path.with_extension(TMP_EXTENSION);
        fs::write(&tmp_path, payload).map_err(|err| Self::io_error(&tmp_path, err))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| Self::io_error(&self.path, err))?;
        Ok(())
    }

    fn preserve_corrupt(&self, payload: &[u8]) -> StoreResult<()> {
        let mut attempt = 0;
        loop {
            let copy = self.corrupt_slot(attempt);
            match fs::OpenOptions::new().write(true).create_new(true).open(&copy) {
                Ok(mut file) => {
                    tracing::warn!(
                        path = %copy.display(),
                        "keeping unreadable item snapshot before overwrite"
                    );
                    return file
                        .write_all(payload)
                        .map_err(|err| Self::io_error(&copy, err));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => return Err(Self::io_error(&copy, err)),
            }
        }
    }
}

#[derive(Debug, Default)]
struct Loaded {
    items: Vec<Item>,
    corrupt: Option<Vec<u8>>,
}

/// Repository over a [`SnapshotBackend`]: every mutation reads the whole
/// collection, edits it, and writes the whole collection back.
///
/// Reads treat unavailable or undecodable storage as an empty collection.
/// Mutations refuse to write when the backend could not be read at all, and
/// hand undecodable bytes to [`SnapshotBackend::preserve_corrupt`] before
/// replacing them. Writers inside one process are serialised; separate
/// processes sharing a backend overwrite each other, last writer wins.
#[derive(Debug)]
pub struct SnapshotRepository<B> {
    backend: B,
    write_lock: Mutex<()>,
}

impl<B: SnapshotBackend> SnapshotRepository<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn load(&self) -> StoreResult<Loaded> {
        let Some(raw) = self.backend.read()? else {
            return Ok(Loaded::default());
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Loaded::default());
        }
        match serde_json::from_slice::<Vec<Item>>(&raw) {
            Ok(items) => Ok(Loaded {
                items,
                corrupt: None,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "stored items could not be decoded, reading as empty");
                Ok(Loaded {
                    items: Vec::new(),
                    corrupt: Some(raw),
                })
            }
        }
    }

    fn snapshot(&self) -> Vec<Item> {
        match self.load() {
            Ok(loaded) => loaded.items,
            Err(err) => {
                tracing::warn!(error = %err, "item storage unavailable, reading as empty");
                Vec::new()
            }
        }
    }

    fn mutate<F>(&self, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<Item>) -> StoreResult<()>,
    {
        let _guard = self.write_lock.lock();
        let Loaded { mut items, corrupt } = self.load()?;
        edit(&mut items)?;
        if let Some(raw) = corrupt {
            self.backend.preserve_corrupt(&raw)?;
        }
        let payload = serde_json::to_vec(&items).map_err(StoreError::Encode)?;
        self.backend.write(&payload)
    }
}

impl<B: SnapshotBackend> ItemRepository for SnapshotRepository<B> {
    fn list_all(&self) -> StoreResult<Vec<Item>> {
        Ok(self.snapshot())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Option<Item>> {
        Ok(self.snapshot().into_iter().find(|item| item.id == id))
    }

    fn create(&self, item: Item) -> StoreResult<()> {
        let item = prepare_create(item)?;
        self.mutate(|items| {
            if items.iter().any(|existing| existing.id == item.id) {
                return Err(ValidationError::DuplicateId(item.id.clone()).into());
            }
            tracing::debug!(id = %item.id, "appending item");
            items.push(item);
            Ok(())
        })
    }

    fn update(&self, item: Item) -> StoreResult<()> {
        self.mutate(|items| {
            let Some(slot) = items.iter_mut().find(|existing| existing.id == item.id) else {
                tracing::debug!(id = %item.id, "update for unknown item ignored");
                return Ok(());
            };
            *slot = prepare_update(slot, item, OffsetDateTime::now_utc())?;
            tracing::debug!(id = %slot.id, "replaced item");
            Ok(())
        })
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        self.mutate(|items| {
            if let Some(position) = items.iter().position(|item| item.id == id) {
                items.remove(position);
                tracing::debug!(id, "removed item");
            }
            Ok(())
        })
    }
}
