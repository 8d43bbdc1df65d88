//! Subscriber registry: the set of chats that receive news alerts.
//!
//! The set lives in memory behind a single mutex and is snapshotted to disk
//! after every mutation, while the lock is still held. The snapshot is a flat
//! JSON array of chat ids, replaced atomically (temp file + rename).

use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tokio::sync::Mutex;

use crate::{domain::ChatId, errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    AlreadyPresent,
    Added,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    WasAbsent,
    Removed,
}

pub struct SubscriberRegistry {
    path: Option<PathBuf>,
    members: Mutex<HashSet<ChatId>>,
}

impl SubscriberRegistry {
    /// Registry with no backing snapshot.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            members: Mutex::new(HashSet::new()),
        }
    }

    /// Load the registry from its snapshot.
    ///
    /// A missing (or blank) snapshot yields an empty registry; a snapshot that
    /// does not parse as a flat array of ids is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let members = read_snapshot(&path)?;
        tracing::info!(
            path = %path.display(),
            subscribers = members.len(),
            "Subscriber registry loaded"
        );
        Ok(Self {
            path: Some(path),
            members: Mutex::new(members),
        })
    }

    pub async fn add(&self, id: ChatId) -> AddOutcome {
        let mut members = self.members.lock().await;
        if !members.insert(id) {
            return AddOutcome::AlreadyPresent;
        }
        self.persist_locked(&members);
        AddOutcome::Added
    }

    pub async fn remove(&self, id: ChatId) -> RemoveOutcome {
        let mut members = self.members.lock().await;
        if !members.remove(&id) {
            return RemoveOutcome::WasAbsent;
        }
        self.persist_locked(&members);
        RemoveOutcome::Removed
    }

    /// Remove every id in `ids`, persisting once. Returns the ids actually removed.
    pub async fn remove_all(&self, ids: &[ChatId]) -> Vec<ChatId> {
        let mut members = self.members.lock().await;
        let removed: Vec<ChatId> = ids.iter().copied().filter(|id| members.remove(id)).collect();
        if !removed.is_empty() {
            self.persist_locked(&members);
        }
        removed
    }

    pub async fn contains(&self, id: ChatId) -> bool {
        self.members.lock().await.contains(&id)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// All current members, sorted.
    pub async fn snapshot(&self) -> Vec<ChatId> {
        let members = self.members.lock().await;
        sorted(&members)
    }

    /// Write the current set to the snapshot file.
    pub async fn persist(&self) -> Result<()> {
        let members = self.members.lock().await;
        match &self.path {
            Some(path) => write_snapshot(path, &members),
            None => Ok(()),
        }
    }

    // Caller holds the lock. In-memory state stays authoritative when the write fails.
    fn persist_locked(&self, members: &HashSet<ChatId>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_snapshot(path, members) {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to persist subscriber snapshot"
            );
        }
    }
}

fn sorted(members: &HashSet<ChatId>) -> Vec<ChatId> {
    let mut out: Vec<ChatId> = members.iter().copied().collect();
    out.sort();
    out
}

fn read_snapshot(path: &Path) -> Result<HashSet<ChatId>> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No subscriber snapshot found, starting empty");
            return Ok(HashSet::new());
        }
        Err(e) => return Err(Error::Io(e)),
    };
    if txt.trim().is_empty() {
        return Ok(HashSet::new());
    }

    let ids: Vec<i64> = serde_json::from_str(&txt).map_err(|e| Error::InvalidSnapshot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(ids.into_iter().map(ChatId).collect())
}

fn write_snapshot(path: &Path, members: &HashSet<ChatId>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let ids: Vec<i64> = sorted(members).into_iter().map(|id| id.0).collect();
    let payload = serde_json::to_vec(&ids)?;

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp = path.with_file_name(tmp_name);

    // Data must be on disk before the rename makes it visible.
    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&payload)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_path(name: &str) -> PathBuf {
        let dir = PathBuf::from(format!("/tmp/cfb-registry-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.join("subscribers.json")
    }

    #[tokio::test]
    async fn add_twice_reports_already_present() {
        let reg = SubscriberRegistry::in_memory();
        assert_eq!(reg.add(ChatId(7)).await, AddOutcome::Added);
        assert_eq!(reg.add(ChatId(7)).await, AddOutcome::AlreadyPresent);
        assert_eq!(reg.snapshot().await, vec![ChatId(7)]);
    }

    #[tokio::test]
    async fn remove_absent_leaves_set_unchanged() {
        let reg = SubscriberRegistry::in_memory();
        reg.add(ChatId(1)).await;
        assert_eq!(reg.remove(ChatId(2)).await, RemoveOutcome::WasAbsent);
        assert_eq!(reg.snapshot().await, vec![ChatId(1)]);
        assert_eq!(reg.remove(ChatId(1)).await, RemoveOutcome::Removed);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn missing_snapshot_loads_empty() {
        let path = temp_path("missing");
        let reg = SubscriberRegistry::load(&path).unwrap();
        assert!(reg.is_empty().await);
        assert!(!path.exists());
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        let path = temp_path("malformed");
        fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        let err = SubscriberRegistry::load(&path).err().unwrap();
        assert!(matches!(err, Error::InvalidSnapshot { .. }));

        fs::write(&path, "[1, 2,").unwrap();
        assert!(SubscriberRegistry::load(&path).is_err());
    }

    #[tokio::test]
    async fn snapshot_round_trips_regardless_of_insertion_order() {
        let path = temp_path("roundtrip");
        let reg = SubscriberRegistry::load(&path).unwrap();
        for id in [42, -1001, 7, 3] {
            reg.add(ChatId(id)).await;
        }
        reg.persist().await.unwrap();

        let reloaded = SubscriberRegistry::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().await, reg.snapshot().await);

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "[-1001,3,7,42]");
    }

    #[tokio::test]
    async fn every_mutation_rewrites_snapshot() {
        let path = temp_path("mutations");
        let reg = SubscriberRegistry::load(&path).unwrap();

        reg.add(ChatId(1)).await;
        reg.add(ChatId(2)).await;
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1,2]");

        reg.remove(ChatId(1)).await;
        assert_eq!(fs::read_to_string(&path).unwrap(), "[2]");

        let removed = reg.remove_all(&[ChatId(2), ChatId(9)]).await;
        assert_eq!(removed, vec![ChatId(2)]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind");
    }

    #[tokio::test]
    async fn persist_failure_keeps_memory_state() {
        let dir = temp_path("unwritable");
        // A directory where the snapshot file should be makes the rename fail.
        fs::create_dir_all(&dir).unwrap();
        let reg = SubscriberRegistry {
            path: Some(dir.clone()),
            members: Mutex::new(HashSet::new()),
        };

        assert_eq!(reg.add(ChatId(5)).await, AddOutcome::Added);
        assert!(reg.contains(ChatId(5)).await);
        assert!(reg.persist().await.is_err());
    }

    #[tokio::test]
    async fn failed_snapshot_write_keeps_previous_file_intact() {
        let path = temp_path("intact");
        let reg = SubscriberRegistry::load(&path).unwrap();
        reg.add(ChatId(1)).await;
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1]");

        // Block the temp file so the next write cannot even start.
        let tmp = path.with_file_name(format!("subscribers.json.{}.tmp", std::process::id()));
        fs::create_dir_all(&tmp).unwrap();

        reg.add(ChatId(2)).await;
        assert_eq!(reg.snapshot().await, vec![ChatId(1), ChatId(2)]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1]");
        assert!(reg.persist().await.is_err());

        fs::remove_dir_all(&tmp).unwrap();
        reg.persist().await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1,2]");
    }

    #[tokio::test]
    async fn concurrent_adds_are_not_lost() {
        let reg = Arc::new(SubscriberRegistry::in_memory());
        let mut handles = Vec::new();
        for id in 0..50 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move { reg.add(ChatId(id % 25)).await }));
        }
        let mut added = 0;
        for h in handles {
            if h.await.unwrap() == AddOutcome::Added {
                added += 1;
            }
        }
        assert_eq!(added, 25);
        assert_eq!(reg.len().await, 25);
    }
}
