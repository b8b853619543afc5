use super::types::{OperationRecord, OperationStatus, Session};
use crate::error::StateStoreError;
use chrono::{Duration, Utc};
use log::{debug, info};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// 工作階段狀態儲存
///
/// 每個工作階段一份 JSON 紀錄加一份僅追加的 JSONL 作業日誌。
/// 所有寫入都經過同一把鎖序列化：編排執行緒與回報靜態圖完成
/// 的工作執行緒共用此儲存。
pub struct SessionStore {
    state_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn open(state_dir: &Path) -> Result<Self, StateStoreError> {
        fs::create_dir_all(state_dir).map_err(|source| StateStoreError::Io {
            path: state_dir.to_path_buf(),
            source,
        })?;

        debug!("狀態目錄: {}", state_dir.display());
        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.state_dir.join(format!("{session_id}.json"))
    }

    fn oplog_path(&self, session_id: &str) -> PathBuf {
        self.state_dir.join(format!("{session_id}.oplog.jsonl"))
    }

    /// 保存工作階段紀錄（原子寫入：暫存檔後改名）
    pub fn save(&self, session: &mut Session) -> Result<(), StateStoreError> {
        session.updated_at = Utc::now();

        let path = self.session_path(&session.session_id);
        let tmp = self.state_dir.join(format!(".{}.json.tmp", session.session_id));
        let content = serde_json::to_vec_pretty(session)?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        fs::write(&tmp, &content).map_err(|source| StateStoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StateStoreError::Io { path, source })?;

        Ok(())
    }

    /// 追加一筆作業紀錄
    ///
    /// 追加順序即派工順序；平行的靜態圖作業完成順序可能與
    /// 場景編號順序不同。
    pub fn append_operation(
        &self,
        session_id: &str,
        record: &OperationRecord,
    ) -> Result<(), StateStoreError> {
        let path = self.oplog_path(session_id);
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StateStoreError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| StateStoreError::Io { path, source })?;

        Ok(())
    }

    pub fn load(&self, session_id: &str) -> Result<Session, StateStoreError> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Err(StateStoreError::NotFound(session_id.to_string()));
        }

        let content = fs::read_to_string(&path).map_err(|source| StateStoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 讀取作業日誌；檔案不存在視為空日誌
    pub fn load_operations(
        &self,
        session_id: &str,
    ) -> Result<Vec<OperationRecord>, StateStoreError> {
        let path = self.oplog_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).map_err(|source| StateStoreError::Io {
            path: path.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }

    /// 已完成作業的名稱集合，恢復時跳過比對用
    pub fn completed_operation_names(
        &self,
        session_id: &str,
    ) -> Result<HashSet<String>, StateStoreError> {
        Ok(self
            .load_operations(session_id)?
            .into_iter()
            .filter(|r| r.status == OperationStatus::Completed)
            .map(|r| r.name)
            .collect())
    }

    /// 下一個作業序號
    pub fn next_sequence(&self, session_id: &str) -> Result<u32, StateStoreError> {
        Ok(self
            .load_operations(session_id)?
            .iter()
            .map(|r| r.sequence)
            .max()
            .unwrap_or(0)
            + 1)
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>, StateStoreError> {
        let entries = fs::read_dir(&self.state_dir).map_err(|source| StateStoreError::Io {
            path: self.state_dir.clone(),
            source,
        })?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") || name.starts_with('.') {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|source| StateStoreError::Io {
                path: path.clone(),
                source,
            })?;
            match serde_json::from_str::<Session>(&content) {
                Ok(session) => sessions.push(session),
                Err(e) => debug!("略過無法解析的狀態檔 {}: {e}", path.display()),
            }
        }
        Ok(sessions)
    }

    /// 最近可恢復的工作階段
    ///
    /// 條件：狀態為 processing 或 paused，且最後更新時間在
    /// 有效天數之內；多個符合時取最近更新者。
    pub fn find_resumable(
        &self,
        staleness_days: i64,
    ) -> Result<Option<Session>, StateStoreError> {
        let cutoff = Utc::now() - Duration::days(staleness_days);

        let resumable = self
            .list_sessions()?
            .into_iter()
            .filter(|s| s.status.is_resumable() && s.updated_at > cutoff)
            .max_by_key(|s| s.updated_at);

        if let Some(session) = &resumable {
            info!("找到可恢復的工作階段: {}", session.session_id);
        }
        Ok(resumable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::encoder::BackendKind;
    use crate::component::session::{OperationKind, SessionStatus};
    use crate::config::EncodePreset;

    fn make_session(artwork: &str) -> Session {
        Session::new(
            artwork.to_string(),
            "26-08-06".to_string(),
            PathBuf::from("/in/master.mov"),
            PathBuf::from("/out"),
            EncodePreset::default(),
            BackendKind::X264,
            30.0,
            15,
        )
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();

        let mut session = make_session("work");
        session.warnings.push("測試警告".to_string());
        store.save(&mut session).unwrap();

        let loaded = store.load(&session.session_id).unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.artwork_name, "work");
        assert_eq!(loaded.warnings, vec!["測試警告"]);
        assert_eq!(loaded.status, SessionStatus::Initialized);
    }

    #[test]
    fn test_load_missing_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.load("vap_none"),
            Err(StateStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_operation_log_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let id = "vap_test";

        for seq in 1..=3 {
            let record = OperationRecord::started(seq, OperationKind::ValidateSource)
                .finished(OperationStatus::Completed);
            store.append_operation(id, &record).unwrap();
        }

        let records = store.load_operations(id).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(store.next_sequence(id).unwrap(), 4);
    }

    #[test]
    fn test_completed_names_skip_failed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let id = "vap_test";

        let ok = OperationRecord::started(1, OperationKind::ValidateSource)
            .finished(OperationStatus::Completed);
        let failed = OperationRecord::started(2, OperationKind::ExtractStill { scene_index: 3 })
            .finished(OperationStatus::Failed);
        store.append_operation(id, &ok).unwrap();
        store.append_operation(id, &failed).unwrap();

        let names = store.completed_operation_names(id).unwrap();
        assert!(names.contains("validate_source"));
        assert!(!names.contains("extract_still_03"));
    }

    #[test]
    fn test_find_resumable_prefers_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();

        let mut done = make_session("done");
        done.status = SessionStatus::Completed;
        store.save(&mut done).unwrap();

        let mut older = make_session("older");
        older.status = SessionStatus::Paused;
        store.save(&mut older).unwrap();

        let mut newer = make_session("newer");
        newer.status = SessionStatus::Processing;
        store.save(&mut newer).unwrap();

        let found = store.find_resumable(7).unwrap().unwrap();
        assert_eq!(found.artwork_name, "newer");
    }

    #[test]
    fn test_find_resumable_honors_staleness_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();

        let mut stale = make_session("stale");
        stale.status = SessionStatus::Paused;
        store.save(&mut stale).unwrap();

        // 直接改寫狀態檔，模擬過期的更新時間
        let mut on_disk = store.load(&stale.session_id).unwrap();
        on_disk.updated_at = Utc::now() - Duration::days(10);
        let path = store.session_path(&stale.session_id);
        fs::write(&path, serde_json::to_vec_pretty(&on_disk).unwrap()).unwrap();

        assert!(store.find_resumable(7).unwrap().is_none());
    }

    #[test]
    fn test_empty_oplog_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();

        assert!(store.load_operations("vap_none").unwrap().is_empty());
        assert_eq!(store.next_sequence("vap_none").unwrap(), 1);
    }
}
