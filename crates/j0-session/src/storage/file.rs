//! Disk-backed session storage.
//!
//! Layout under the data directory:
//! - `<id>.json`      - pretty-printed session snapshot
//! - `logs/<id>.log`  - append-only execution log
//!
//! Each session record carries its own async mutex, held for the whole of a
//! mutation including its disk writes. The id -> record map is only locked
//! for lookups and inserts, so unrelated sessions never wait on each other.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;
use j0_core::{
    Execution, Language, NewExecution, Session, SessionFilter, SessionId, SessionStatus,
    SessionStorage, StorageError,
};
use tokio::{io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

use crate::log_writer;

type Record = Arc<Mutex<Session>>;

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Record>,
    /// Ids handed out to creations that have not finished persisting yet.
    pending: HashSet<SessionId>,
}

/// File-backed storage implementation.
///
/// Survives restarts: [`FileStorage::open`] reloads every snapshot in the
/// data directory.
pub struct FileStorage {
    data_dir: PathBuf,
    logs_dir: PathBuf,
    registry: RwLock<Registry>,
}

impl FileStorage {
    /// Open (or initialize) a store rooted at `data_dir`.
    ///
    /// Snapshots that cannot be read or parsed are skipped with a warning.
    ///
    /// # Errors
    /// Returns error if the data or logs directory cannot be created or
    /// listed.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        let logs_dir = data_dir.join("logs");
        tokio::fs::create_dir_all(&logs_dir)
            .await
            .map_err(|e| StorageError::persistence(&logs_dir, e))?;

        let sessions = load_snapshots(&data_dir).await?;
        tracing::info!(
            data_dir = %data_dir.display(),
            count = sessions.len(),
            "Loaded sessions"
        );

        Ok(Self {
            data_dir,
            logs_dir,
            registry: RwLock::new(Registry {
                sessions,
                pending: HashSet::new(),
            }),
        })
    }

    /// Root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the snapshot file for `id`.
    #[must_use]
    pub fn snapshot_path(&self, id: SessionId) -> PathBuf {
        self.data_dir.join(format!("{id}.json"))
    }

    fn record(&self, id: SessionId) -> Result<Record, StorageError> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    fn reserve_id(&self) -> SessionId {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = Uuid::new_v4();
            if !registry.sessions.contains_key(&id) && registry.pending.insert(id) {
                return id;
            }
        }
    }

    fn finish_create(&self, session: Option<Session>, id: SessionId) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.pending.remove(&id);
        if let Some(session) = session {
            registry.sessions.insert(id, Arc::new(Mutex::new(session)));
        }
    }

    /// Write `session` to a temp file and rename it over the snapshot.
    async fn write_snapshot(&self, session: &Session) -> Result<(), StorageError> {
        let path = self.snapshot_path(session.id);
        let tmp = path.with_extension("json.tmp");
        let data =
            serde_json::to_vec_pretty(session).map_err(|e| StorageError::persistence(&path, e))?;

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StorageError::persistence(&tmp, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| StorageError::persistence(&tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::persistence(&tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::persistence(&path, e))
    }

    async fn remove_partial(&self, session: &Session) {
        let _ = tokio::fs::remove_file(&session.log_file).await;
        let path = self.snapshot_path(session.id);
        let _ = tokio::fs::remove_file(path.with_extension("json.tmp")).await;
        let _ = tokio::fs::remove_file(path).await;
    }
}

fn ensure_active(session: &Session) -> Result<(), StorageError> {
    if session.is_active() {
        Ok(())
    } else {
        Err(StorageError::InvalidState {
            id: session.id,
            status: session.status,
        })
    }
}

async fn load_snapshots(data_dir: &Path) -> Result<HashMap<SessionId, Record>, StorageError> {
    let mut sessions = HashMap::new();
    let mut entries = tokio::fs::read_dir(data_dir)
        .await
        .map_err(|e| StorageError::persistence(data_dir, e))?;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(StorageError::persistence(data_dir, e)),
        };
        let path = entry.path();
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if !is_file || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        let session = match read_snapshot(&path).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Skipping unreadable session snapshot: {e}");
                continue;
            }
        };

        if !tokio::fs::try_exists(&session.log_file)
            .await
            .unwrap_or(false)
        {
            tracing::warn!(
                session_id = %session.id,
                log_file = %session.log_file.display(),
                "Session log missing, recreating empty"
            );
            if let Err(e) = log_writer::create(&session.log_file).await {
                tracing::warn!(session_id = %session.id, "Could not recreate log: {e}");
            }
        }

        sessions.insert(session.id, Arc::new(Mutex::new(session)));
    }

    Ok(sessions)
}

async fn read_snapshot(path: &Path) -> Result<Session, std::io::Error> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn create(
        &self,
        language: Language,
        name: Option<String>,
    ) -> Result<Session, StorageError> {
        let id = self.reserve_id();
        let timestamp = Utc::now();

        let session = Session {
            id,
            name,
            language,
            language_id: language.engine_id(),
            status: SessionStatus::Active,
            env: std::collections::BTreeMap::new(),
            history: Vec::new(),
            log_file: self.logs_dir.join(format!("{id}.log")),
            created_at: timestamp,
            updated_at: timestamp,
        };

        let persisted = match log_writer::create(&session.log_file).await {
            Ok(()) => self.write_snapshot(&session).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            self.remove_partial(&session).await;
            self.finish_create(None, id);
            return Err(e);
        }

        self.finish_create(Some(session.clone()), id);
        tracing::info!(session_id = %id, %language, "Created session");
        Ok(session)
    }

    async fn get(&self, id: SessionId) -> Result<Session, StorageError> {
        let record = self.record(id)?;
        let session = record.lock().await.clone();
        Ok(session)
    }

    async fn list(&self, filter: SessionFilter) -> Result<Vec<Session>, StorageError> {
        let records: Vec<Record> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .values()
            .cloned()
            .collect();

        let mut result = Vec::with_capacity(records.len());
        for record in records {
            let session = record.lock().await;
            if filter.matches(&session) {
                result.push(session.clone());
            }
        }

        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }

        Ok(result)
    }

    async fn set_env(
        &self,
        id: SessionId,
        key: String,
        value: String,
    ) -> Result<Session, StorageError> {
        let record = self.record(id)?;
        let mut session = record.lock().await;
        ensure_active(&session)?;

        let mut updated = session.clone();
        updated.env.insert(key, value);
        updated.updated_at = Utc::now();
        self.write_snapshot(&updated).await?;

        *session = updated;
        Ok(session.clone())
    }

    async fn add_execution(
        &self,
        id: SessionId,
        execution: NewExecution,
    ) -> Result<Execution, StorageError> {
        let record = self.record(id)?;
        let mut session = record.lock().await;

        let execution = execution.into_execution(Uuid::new_v4());
        session.history.push(execution.clone());
        session.updated_at = Utc::now();

        // Attempt both writes even if the first one fails.
        let logged = log_writer::append(&session.log_file, &execution).await;
        let persisted = self.write_snapshot(&session).await;
        logged.and(persisted)?;

        Ok(execution)
    }

    async fn close(&self, id: SessionId) -> Result<Session, StorageError> {
        let record = self.record(id)?;
        let mut session = record.lock().await;
        if !session.is_active() {
            return Ok(session.clone());
        }

        let mut updated = session.clone();
        updated.status = SessionStatus::Closed;
        updated.updated_at = Utc::now();
        self.write_snapshot(&updated).await?;

        *session = updated;
        tracing::info!(session_id = %id, "Closed session");
        Ok(session.clone())
    }

    async fn read_log(&self, id: SessionId, lines: usize) -> Result<String, StorageError> {
        let record = self.record(id)?;
        let log_file = record.lock().await.log_file.clone();
        log_writer::tail(&log_file, lines).await
    }
}
