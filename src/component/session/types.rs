use crate::component::encoder::BackendKind;
use crate::component::scene_detector::Scene;
use crate::component::selection::Selection;
use crate::config::EncodePreset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// 工作階段狀態機的狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initialized,
    Processing,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    /// 終止狀態之後不再有任何轉移
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn is_resumable(self) -> bool {
        matches!(self, Self::Processing | Self::Paused)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initialized => "initialized",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// 單一作業的狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

/// 作業種類
///
/// 致命作業失敗會讓整個工作階段轉為 failed；其餘作業失敗
/// 只記錄後跳過。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OperationKind {
    ValidateSource,
    CopyMaster,
    OptimizeMaster,
    DetectScenes,
    EncodeClip { clip_seq: usize, scene_index: usize },
    EncodeGroup { group_seq: usize, members: Vec<usize> },
    ExtractStill { scene_index: usize },
    Finalize,
}

impl OperationKind {
    /// 作業的穩定名稱，作業日誌與恢復比對都以此為鍵
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::ValidateSource => "validate_source".to_string(),
            Self::CopyMaster => "copy_master".to_string(),
            Self::OptimizeMaster => "optimize_master".to_string(),
            Self::DetectScenes => "detect_scenes".to_string(),
            Self::EncodeClip { clip_seq, .. } => format!("encode_clip_{clip_seq:02}"),
            Self::EncodeGroup { group_seq, .. } => format!("encode_group_{group_seq:02}"),
            Self::ExtractStill { scene_index } => format!("extract_still_{scene_index:02}"),
            Self::Finalize => "finalize".to_string(),
        }
    }

    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::ValidateSource
                | Self::CopyMaster
                | Self::OptimizeMaster
                | Self::DetectScenes
                | Self::Finalize
        )
    }
}

/// 作業日誌紀錄，僅追加
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub sequence: u32,
    #[serde(flatten)]
    pub kind: OperationKind,
    pub name: String,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub input_file: Option<PathBuf>,
    pub output_files: Vec<PathBuf>,
    pub error_detail: Option<String>,
}

impl OperationRecord {
    #[must_use]
    pub fn started(sequence: u32, kind: OperationKind) -> Self {
        let name = kind.name();
        Self {
            sequence,
            kind,
            name,
            status: OperationStatus::Processing,
            started_at: Utc::now(),
            finished_at: None,
            duration_seconds: 0.0,
            input_file: None,
            output_files: Vec::new(),
            error_detail: None,
        }
    }

    #[must_use]
    pub fn finished(mut self, status: OperationStatus) -> Self {
        let now = Utc::now();
        self.duration_seconds = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.finished_at = Some(now);
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<PathBuf>) -> Self {
        self.output_files = outputs;
        self
    }
}

/// 一次完整的處理工作階段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub artwork_name: String,
    /// 專案日期（YY-MM-DD），用於輸出資料夾命名
    pub project_date: String,
    pub master_path: PathBuf,
    pub output_root: PathBuf,
    pub preset: EncodePreset,
    pub backend: BackendKind,
    pub scene_threshold: f64,
    pub min_scene_length: u32,
    /// 母帶長寬比後綴（16x9 等），驗證時決定
    pub aspect_suffix: String,
    pub total_operations: u32,
    pub completed_operations: u32,
    pub current_operation: Option<String>,
    pub status: SessionStatus,
    pub scenes: Vec<Scene>,
    pub selection: Option<Selection>,
    /// 非致命警告（例如硬體編碼退回軟體）
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        artwork_name: String,
        project_date: String,
        master_path: PathBuf,
        output_root: PathBuf,
        preset: EncodePreset,
        backend: BackendKind,
        scene_threshold: f64,
        min_scene_length: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: generate_session_id(now),
            artwork_name,
            project_date,
            master_path,
            output_root,
            preset,
            backend,
            scene_threshold,
            min_scene_length,
            aspect_suffix: String::new(),
            total_operations: 0,
            completed_operations: 0,
            current_operation: None,
            status: SessionStatus::Initialized,
            scenes: Vec::new(),
            selection: None,
            warnings: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

fn generate_session_id(now: DateTime<Utc>) -> String {
    let fragment = Uuid::new_v4().simple().to_string();
    format!("vap_{}_{}", now.format("%Y%m%d_%H%M%S"), &fragment[..8])
}
