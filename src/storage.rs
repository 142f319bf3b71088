use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Cannot migrate {key} from version {from}")]
    Migration { key: &'static str, from: u32 },
}

/// A state blob persisted under its own named file, the way each dashboard
/// store owns one local-storage entry.
pub trait Persisted: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// File stem under the data directory.
    const KEY: &'static str;
    /// Schema version written into the envelope.
    const VERSION: u32 = 0;

    /// State used when nothing has been persisted yet.
    fn seed() -> Self;

    /// Upgrade a raw state persisted by an older schema version.
    fn migrate(state: Value, from: u32) -> Result<Value, StorageError> {
        if from == Self::VERSION {
            Ok(state)
        } else {
            Err(StorageError::Migration {
                key: Self::KEY,
                from,
            })
        }
    }
}

/// Records addressed by a string id inside a list-shaped state.
pub trait Record {
    fn id(&self) -> &str;
}

#[derive(Serialize, Deserialize)]
struct Envelope<S> {
    #[serde(default)]
    version: u32,
    state: S,
}

pub struct Store<S: Persisted> {
    storage_path: PathBuf,
    state: S,
}

impl<S: Persisted> Store<S> {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            storage_path: data_dir.join(format!("{}.json", S::KEY)),
            state: S::seed(),
        }
    }

    /// Create the store and load it from disk, seeding the file on first use.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let mut store = Self::new(data_dir);
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&mut self) -> Result<(), StorageError> {
        if let Some(data_dir) = self.storage_path.parent() {
            fs::create_dir_all(data_dir)?;
        }

        if self.storage_path.exists() {
            let mut file = File::open(&self.storage_path)?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let envelope: Envelope<Value> = serde_json::from_str(&contents)?;
            let migrated = envelope.version != S::VERSION;
            let state = S::migrate(envelope.state, envelope.version)?;
            self.state = serde_json::from_value(state)?;
            if migrated {
                tracing::info!(
                    key = S::KEY,
                    from = envelope.version,
                    to = S::VERSION,
                    "migrated persisted store"
                );
                self.save()?;
            }
        } else {
            self.save()?;
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn snapshot_for_save(&self) -> (PathBuf, S) {
        (self.storage_path.clone(), self.state.clone())
    }

    pub async fn save_snapshot_async(storage_path: PathBuf, state: S) -> Result<(), StorageError> {
        tokio::task::spawn_blocking(move || write_envelope(&storage_path, &state))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!(
                    "spawn_blocking failed: {}",
                    e
                )))
            })?
    }

    /// Persist synchronously through a temporary file and an atomic rename so
    /// a crash never leaves a half-written store behind.
    pub fn save(&self) -> Result<(), StorageError> {
        write_envelope(&self.storage_path, &self.state)
    }

    pub async fn save_async(&self) -> Result<(), StorageError> {
        let (path, state) = self.snapshot_for_save();
        Self::save_snapshot_async(path, state).await
    }

    /// Apply `change` and persist the result. If either the change or the
    /// save fails, the in-memory state goes back to what it was before.
    pub async fn update_async<T, E, F>(&mut self, change: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StorageError>,
    {
        let before = self.state.clone();
        let outcome = match change(self) {
            Ok(value) => self.save_async().await.map(|()| value).map_err(E::from),
            Err(err) => Err(err),
        };
        if outcome.is_err() {
            self.state = before;
        }
        outcome
    }
}

fn write_envelope<S: Persisted>(storage_path: &Path, state: &S) -> Result<(), StorageError> {
    if let Some(parent) = storage_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let envelope = Envelope {
        version: S::VERSION,
        state,
    };
    let temp = storage_path.with_extension("tmp");
    let mut f = File::create(&temp)?;
    let content = serde_json::to_string_pretty(&envelope)?;
    f.write_all(content.as_bytes())?;
    f.sync_all()?;
    fs::rename(temp, storage_path)?;
    Ok(())
}

pub fn find<'a, T: Record>(records: &'a [T], id: &str) -> Option<&'a T> {
    records.iter().find(|r| r.id() == id)
}

/// Mutate the record with `id` in place and return its new value.
pub fn modify<T, F>(records: &mut [T], id: &str, what: &str, f: F) -> Result<T, StorageError>
where
    T: Record + Clone,
    F: FnOnce(&mut T),
{
    let record = records
        .iter_mut()
        .find(|r| r.id() == id)
        .ok_or_else(|| StorageError::NotFound(what.to_string()))?;
    f(record);
    Ok(record.clone())
}

pub fn remove<T: Record>(records: &mut Vec<T>, id: &str, what: &str) -> Result<T, StorageError> {
    let index = records
        .iter()
        .position(|r| r.id() == id)
        .ok_or_else(|| StorageError::NotFound(what.to_string()))?;
    Ok(records.remove(index))
}

#[cfg(test)]
pub(crate) fn temp_data_dir() -> PathBuf {
    std::env::temp_dir().join(format!("department-display-test-{}", ulid::Ulid::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: String,
        text: String,
    }

    impl Record for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Notes {
        notes: Vec<Note>,
    }

    impl Persisted for Notes {
        const KEY: &'static str = "notes";
        const VERSION: u32 = 1;

        fn seed() -> Self {
            Notes {
                notes: vec![Note {
                    id: "seed".into(),
                    text: "hello".into(),
                }],
            }
        }

        fn migrate(state: Value, from: u32) -> Result<Value, StorageError> {
            match from {
                0 => Ok(serde_json::json!({ "notes": state })),
                1 => Ok(state),
                _ => Err(StorageError::Migration {
                    key: Self::KEY,
                    from,
                }),
            }
        }
    }

    #[test]
    fn seeds_and_reloads() {
        let dir = temp_data_dir();
        let mut store: Store<Notes> = Store::open(&dir).unwrap();
        assert_eq!(store.state().notes.len(), 1);

        store.state_mut().notes.push(Note {
            id: "b".into(),
            text: "second".into(),
        });
        store.save().unwrap();

        let reloaded: Store<Notes> = Store::open(&dir).unwrap();
        assert_eq!(reloaded.state(), store.state());
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn migrates_older_envelope() {
        let dir = temp_data_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("notes.json"),
            r#"{"version":0,"state":[{"id":"x","text":"legacy"}]}"#,
        )
        .unwrap();

        let store: Store<Notes> = Store::open(&dir).unwrap();
        assert_eq!(store.state().notes[0].text, "legacy");

        let raw = fs::read_to_string(dir.join("notes.json")).unwrap();
        assert!(raw.contains("\"version\": 1"));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = temp_data_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.json"), r#"{"version":9,"state":{}}"#).unwrap();
        assert!(matches!(
            Store::<Notes>::open(&dir),
            Err(StorageError::Migration { from: 9, .. })
        ));
    }

    #[tokio::test]
    async fn async_save_round_trips() {
        let dir = temp_data_dir();
        let mut store: Store<Notes> = Store::open(&dir).unwrap();
        store.state_mut().notes.clear();
        store.save_async().await.unwrap();
        let reloaded: Store<Notes> = Store::open(&dir).unwrap();
        assert!(reloaded.state().notes.is_empty());
    }

    #[tokio::test]
    async fn failed_update_leaves_state_untouched() {
        let dir = temp_data_dir();
        let mut store: Store<Notes> = Store::open(&dir).unwrap();

        let rejected: Result<(), StorageError> = store
            .update_async(|s| {
                s.state_mut().notes.clear();
                Err(StorageError::NotFound("Note".into()))
            })
            .await;
        assert!(rejected.is_err());
        assert_eq!(store.state().notes.len(), 1);

        // A plain file where the data directory should be makes the write fail.
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"").unwrap();
        let unsaved = store
            .update_async(|s| {
                s.state_mut().notes.clear();
                Ok::<_, StorageError>(())
            })
            .await;
        assert!(matches!(unsaved, Err(StorageError::Io(_))));
        assert_eq!(store.state(), &Notes::seed());
        fs::remove_file(&dir).unwrap();
    }

    #[test]
    fn record_helpers() {
        let mut notes = Notes::seed().notes;
        let updated = modify(&mut notes, "seed", "Note", |n| n.text = "changed".into()).unwrap();
        assert_eq!(updated.id, "seed");
        assert_eq!(find(&notes, "seed").unwrap().text, "changed");
        assert!(matches!(
            modify(&mut notes, "nope", "Note", |_| {}),
            Err(StorageError::NotFound(_))
        ));
        remove(&mut notes, "seed", "Note").unwrap();
        assert!(notes.is_empty());
    }
}
