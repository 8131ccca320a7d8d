//! Journal-backed repository in a locked directory.
//!
//! ```text
//! <dir>/
//! ├─ LOCK            # Advisory lock, one process per directory
//! └─ journal.jsonl   # One JSON record per line: put or delete
//! ```

use crate::error::{StorageError, StorageResult};
use crate::repository::{assign_id, check_version, require_id, Repository};
use datasync_core::{TableData, TableError, TableResult, Version};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.jsonl";
const COMPACT_FILE: &str = "journal.jsonl.tmp";

/// Options for [`FileRepository`].
#[derive(Debug, Clone)]
pub struct FileRepositoryConfig {
    /// Call `sync_data` after every journal append.
    pub sync_on_write: bool,
    /// Create the directory (and parents) if missing.
    pub create_dirs: bool,
}

impl Default for FileRepositoryConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            create_dirs: true,
        }
    }
}

impl FileRepositoryConfig {
    /// Sets whether each write is synced to disk.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Sets whether a missing directory is created.
    #[must_use]
    pub fn with_create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }
}

/// One journal line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum JournalRecord {
    Put { entity: TableData },
    Delete { id: String },
}

#[derive(Debug)]
struct State {
    entities: HashMap<String, TableData>,
    journal: File,
    records: usize,
}

/// A repository persisted as an append-only JSON journal.
///
/// The whole table is held in memory and rebuilt from the journal on open.
/// Every write appends one record before the in-memory state changes, so a
/// failed append leaves the table untouched. A trailing line cut short by a
/// crash is discarded on the next open.
///
/// The directory is locked for the lifetime of the repository; a second
/// open from any process fails with [`StorageError::Locked`].
#[derive(Debug)]
pub struct FileRepository {
    dir: PathBuf,
    config: FileRepositoryConfig,
    state: Mutex<State>,
    _lock_file: File,
}

impl FileRepository {
    /// Opens the repository in `dir` with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is locked, the journal is corrupted
    /// or an I/O error occurs.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        Self::open_with_config(dir, FileRepositoryConfig::default())
    }

    /// Opens the repository in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is locked, the journal is corrupted
    /// or an I/O error occurs.
    pub fn open_with_config(dir: &Path, config: FileRepositoryConfig) -> StorageResult<Self> {
        if config.create_dirs {
            fs::create_dir_all(dir)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if FileExt::try_lock_exclusive(&lock_file).is_err() {
            return Err(StorageError::Locked(dir.to_path_buf()));
        }

        let journal_path = dir.join(JOURNAL_FILE);
        let (entities, records) = replay(&journal_path)?;
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)?;
        info!(dir = %dir.display(), entities = entities.len(), records, "journal replayed");

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            state: Mutex::new(State {
                entities,
                journal,
                records,
            }),
            _lock_file: lock_file,
        })
    }

    /// Returns the repository directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Returns the number of records in the journal.
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.state.lock().records
    }

    /// Rewrites the journal with one `put` per live entity.
    ///
    /// Returns the number of records dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the new journal cannot be written.
    pub fn compact(&self) -> StorageResult<usize> {
        let mut state = self.state.lock();
        let tmp_path = self.dir.join(COMPACT_FILE);
        {
            let mut tmp = File::create(&tmp_path)?;
            for entity in state.entities.values() {
                let record = JournalRecord::Put {
                    entity: entity.clone(),
                };
                writeln!(tmp, "{}", serde_json::to_string(&record)?)?;
            }
            tmp.sync_all()?;
        }

        let journal_path = self.dir.join(JOURNAL_FILE);
        fs::rename(&tmp_path, &journal_path)?;
        state.journal = OpenOptions::new().append(true).open(&journal_path)?;

        let dropped = state.records - state.entities.len();
        state.records = state.entities.len();
        info!(dir = %self.dir.display(), dropped, "journal compacted");
        Ok(dropped)
    }

    fn append(&self, state: &mut State, record: &JournalRecord) -> StorageResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        state.journal.write_all(line.as_bytes())?;
        if self.config.sync_on_write {
            state.journal.sync_data()?;
        }
        state.records += 1;
        Ok(())
    }
}

impl Repository for FileRepository {
    fn query(&self) -> TableResult<Vec<TableData>> {
        Ok(self.state.lock().entities.values().cloned().collect())
    }

    fn create(&self, mut entity: TableData) -> TableResult<TableData> {
        assign_id(&mut entity);
        let mut state = self.state.lock();
        if let Some(existing) = state.entities.get(&entity.id) {
            debug!(id = %entity.id, "create conflict");
            return Err(TableError::conflict(existing.clone()));
        }
        entity.stamp(None);
        self.append(
            &mut state,
            &JournalRecord::Put {
                entity: entity.clone(),
            },
        )?;
        state.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    fn read(&self, id: &str) -> TableResult<TableData> {
        require_id(id)?;
        self.state
            .lock()
            .entities
            .get(id)
            .cloned()
            .ok_or(TableError::NotFound)
    }

    fn replace(&self, mut entity: TableData, version: Option<&Version>) -> TableResult<TableData> {
        require_id(&entity.id)?;
        let mut state = self.state.lock();
        let stored = state.entities.get(&entity.id).ok_or(TableError::NotFound)?;
        check_version(stored, version)?;
        entity.stamp(Some(&stored.updated_at));
        self.append(
            &mut state,
            &JournalRecord::Put {
                entity: entity.clone(),
            },
        )?;
        state.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    fn delete(&self, id: &str, version: Option<&Version>) -> TableResult<()> {
        require_id(id)?;
        let mut state = self.state.lock();
        let stored = state.entities.get(id).ok_or(TableError::NotFound)?;
        check_version(stored, version)?;
        self.append(&mut state, &JournalRecord::Delete { id: id.to_string() })?;
        state.entities.remove(id);
        Ok(())
    }

    fn count(&self) -> TableResult<usize> {
        Ok(self.state.lock().entities.len())
    }
}

/// Rebuilds the table from the journal, returning it and the record count.
fn replay(path: &Path) -> StorageResult<(HashMap<String, TableData>, usize)> {
    let mut entities = HashMap::new();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((entities, 0)),
        Err(e) => return Err(e.into()),
    };

    let mut records = 0;
    let mut valid_len = 0;
    let mut lines = contents.split_inclusive('\n').enumerate().peekable();
    while let Some((number, line)) = lines.next() {
        let complete = line.ends_with('\n');
        let text = line.trim();
        if text.is_empty() {
            valid_len += line.len();
            continue;
        }
        match serde_json::from_str::<JournalRecord>(text) {
            Ok(JournalRecord::Put { entity }) => {
                entities.insert(entity.id.clone(), entity);
            }
            Ok(JournalRecord::Delete { id }) => {
                entities.remove(&id);
            }
            Err(e) if !complete && lines.peek().is_none() => {
                warn!(line = number + 1, error = %e, "discarding torn journal tail");
                break;
            }
            Err(e) => {
                return Err(StorageError::Corrupted(format!(
                    "journal line {}: {e}",
                    number + 1
                )))
            }
        }
        records += 1;
        valid_len += line.len();
    }

    if valid_len < contents.len() {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len as u64)?;
        file.sync_all()?;
    }
    Ok((entities, records))
}
