use std::path::PathBuf;
use thiserror::Error;

/// 管線錯誤分類
///
/// 致命類別會讓整個工作階段轉為 failed；
/// `Encode` 屬於單一作業層級，記錄後跳過繼續。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 母帶驗證失敗（致命）
    #[error("來源驗證失敗: {0}")]
    Validation(String),

    /// 場景分析完全無法執行（致命，與「偵測不到切點」不同）
    #[error("場景偵測失敗: {0}")]
    Detection(String),

    /// 單一靜態圖 / 剪輯 / 群組作業失敗（非致命）
    #[error("編碼作業失敗: {0}")]
    Encode(String),

    /// 狀態持久化失敗（致命，未保存的狀態轉移比中斷更糟）
    #[error(transparent)]
    StateStore(#[from] StateStoreError),
}

impl PipelineError {
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }
}

/// 工作階段狀態儲存錯誤
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("無法存取狀態檔案 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("無法序列化工作階段狀態: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("找不到工作階段: {0}")]
    NotFound(String),
}

/// 選擇模型的不變量違反
///
/// 同步拒絕，不影響工作階段狀態。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("群組不可為空")]
    EmptyGroup,

    #[error("場景 {0} 不存在")]
    UnknownScene(usize),

    #[error("場景 {0} 已屬於其他群組")]
    AlreadyGrouped(usize),

    #[error("找不到群組 {0}")]
    UnknownGroup(usize),
}
