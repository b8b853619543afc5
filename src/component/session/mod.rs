//! 工作階段狀態與持久化
//!
//! 可恢復性是這套工具的核心：每一次狀態轉移都先落地，
//! 恢復時從作業日誌判斷哪些工作已經完成。

mod store;
mod types;

pub use store::SessionStore;
pub use types::{OperationKind, OperationRecord, OperationStatus, Session, SessionStatus};
