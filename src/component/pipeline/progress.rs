use crate::component::session::{OperationStatus, Session, SessionStatus};
use std::sync::{Arc, RwLock};

/// 作業日誌的精簡摘要，給進度顯示用
#[derive(Debug, Clone)]
pub struct OperationBrief {
    pub name: String,
    pub status: OperationStatus,
}

/// 工作階段的唯讀進度快照
///
/// 編排器在每個作業邊界發布；介面端輪詢讀取，兩邊沒有
/// 回呼耦合。
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub completed_operations: u32,
    pub total_operations: u32,
    pub current_operation: Option<String>,
    pub recent_operations: Vec<OperationBrief>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn of(session: &Session, recent_operations: Vec<OperationBrief>) -> Self {
        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            completed_operations: session.completed_operations,
            total_operations: session.total_operations,
            current_operation: session.current_operation.clone(),
            recent_operations,
        }
    }
}

/// 進度快照的共享把手
#[derive(Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<RwLock<Option<SessionSnapshot>>>,
}

impl ProgressHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: SessionSnapshot) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(snapshot);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_poll() {
        let handle = ProgressHandle::new();
        assert!(handle.snapshot().is_none());

        handle.publish(SessionSnapshot {
            session_id: "vap_x".to_string(),
            status: SessionStatus::Processing,
            completed_operations: 3,
            total_operations: 10,
            current_operation: Some("encode_clip_01".to_string()),
            recent_operations: vec![OperationBrief {
                name: "validate_source".to_string(),
                status: OperationStatus::Completed,
            }],
        });

        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.completed_operations, 3);
        assert_eq!(snapshot.current_operation.as_deref(), Some("encode_clip_01"));

        // 讀取是複本，之後的發布不影響已取得的快照
        let cloned = handle.clone();
        cloned.publish(SessionSnapshot {
            completed_operations: 4,
            ..snapshot.clone()
        });
        assert_eq!(snapshot.completed_operations, 3);
        assert_eq!(handle.snapshot().unwrap().completed_operations, 4);
    }
}
