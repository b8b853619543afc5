//! 整合測試 - 不需要 ffmpeg 的狀態機與持久化行為
//!
//! 涵蓋：工作階段儲存、恢復跳過邏輯、原子寫入、
//! 選擇模型與作業計畫的對應、驗證失敗的致命路徑。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use video_archive_prep::component::encoder::BackendKind;
use video_archive_prep::component::pipeline::{
    NewSessionRequest, Pipeline, ProgressHandle, build_clip_operations, total_operations,
};
use video_archive_prep::component::selection::Selection;
use video_archive_prep::component::session::{
    OperationKind, OperationRecord, OperationStatus, Session, SessionStatus, SessionStore,
};
use video_archive_prep::config::{EncodePreset, UserSettings};
use video_archive_prep::error::PipelineError;
use video_archive_prep::tools::{OutputKind, write_atomic};

fn scenario_selection() -> Selection {
    // 5 個場景：單選 {1,4}、群組 {2,3}、5 不選
    let mut selection = Selection::new(5);
    selection.select(1).unwrap();
    selection.select(4).unwrap();
    selection.group(&[2, 3]).unwrap();
    selection
}

fn make_session(state_dir: &std::path::Path) -> (SessionStore, Session) {
    let store = SessionStore::open(state_dir).unwrap();
    let mut session = Session::new(
        "work".to_string(),
        "26-08-06".to_string(),
        PathBuf::from("/in/master.mov"),
        PathBuf::from("/out"),
        EncodePreset::default(),
        BackendKind::X264,
        30.0,
        15,
    );
    store.save(&mut session).unwrap();
    (store, session)
}

/// 測試 1: 作業計畫與選擇模型的對應
#[test]
fn test_clip_plan_matches_selection() {
    let selection = scenario_selection();

    let operations = build_clip_operations(&selection);
    let names: Vec<String> = operations.iter().map(|(kind, _)| kind.name()).collect();
    assert_eq!(
        names,
        vec!["encode_clip_01", "encode_group_01", "encode_clip_02"]
    );

    // 5 固定作業 + 3 剪輯單元 + 4 張靜態圖
    assert_eq!(total_operations(&selection), 12);
    assert_eq!(selection.stills_scope(), vec![1, 2, 3, 4]);
}

/// 測試 2: 恢復時的跳過邏輯 - 已完成的作業不再出現在待辦清單
#[test]
fn test_resume_skips_completed_operations() {
    let dir = tempfile::tempdir().unwrap();
    let (store, session) = make_session(dir.path());
    let id = session.session_id.clone();

    // 模擬已完成前兩個剪輯單元中的第一個
    let done = OperationRecord::started(
        5,
        OperationKind::EncodeClip {
            clip_seq: 1,
            scene_index: 1,
        },
    )
    .finished(OperationStatus::Completed);
    store.append_operation(&id, &done).unwrap();

    let failed = OperationRecord::started(
        6,
        OperationKind::EncodeGroup {
            group_seq: 1,
            members: vec![2, 3],
        },
    )
    .finished(OperationStatus::Failed);
    store.append_operation(&id, &failed).unwrap();

    let completed = store.completed_operation_names(&id).unwrap();
    let selection = scenario_selection();
    let pending: Vec<String> = build_clip_operations(&selection)
        .into_iter()
        .filter(|(kind, _)| !completed.contains(&kind.name()))
        .map(|(kind, _)| kind.name())
        .collect();

    // 完成的跳過；失敗的會重新執行
    assert_eq!(pending, vec!["encode_group_01", "encode_clip_02"]);
}

/// 測試 3: 恢復冪等性 - 既有日誌前綴不因後續追加而改變
#[test]
fn test_resume_preserves_log_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let (store, session) = make_session(dir.path());
    let id = session.session_id.clone();

    for seq in 1..=3u32 {
        let record = OperationRecord::started(seq, OperationKind::ExtractStill {
            scene_index: seq as usize,
        })
        .finished(OperationStatus::Completed);
        store.append_operation(&id, &record).unwrap();
    }

    let before = store.load_operations(&id).unwrap();
    assert_eq!(store.next_sequence(&id).unwrap(), 4);

    // 恢復後繼續追加第 4 筆
    let next = OperationRecord::started(4, OperationKind::Finalize)
        .finished(OperationStatus::Completed);
    store.append_operation(&id, &next).unwrap();

    let after = store.load_operations(&id).unwrap();
    assert_eq!(after.len(), 4);
    for (old, new) in before.iter().zip(after.iter()) {
        assert_eq!(old.sequence, new.sequence);
        assert_eq!(old.name, new.name);
        assert_eq!(old.status, new.status);
        assert_eq!(old.started_at, new.started_at);
    }
}

/// 測試 4: 原子寫入 - 任何失敗點都不會在目標路徑留下半成品
#[test]
fn test_atomic_writer_failure_points() {
    let dir = tempfile::tempdir().unwrap();

    // 失敗點一：producer 寫到一半出錯
    let target = dir.path().join("partial.txt");
    let result = write_atomic(&target, OutputKind::Text, |tmp| {
        std::fs::write(tmp, b"half")?;
        anyhow::bail!("中斷");
    });
    assert!(result.is_err());
    assert!(!target.exists());

    // 失敗點二：producer 完全沒有寫
    let target = dir.path().join("missing.txt");
    let result = write_atomic(&target, OutputKind::Text, |_| Ok(()));
    assert!(result.is_err());
    assert!(!target.exists());

    // 失敗點三：內容通不過容器驗證
    let target = dir.path().join("bad.png");
    let result = write_atomic(&target, OutputKind::Png, |tmp| {
        std::fs::write(tmp, b"not png data")?;
        Ok(())
    });
    assert!(result.is_err());
    assert!(!target.exists());

    // 目錄裡不殘留任何暫存檔
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

/// 測試 5: 驗證失敗的致命路徑
///
/// 母帶不存在 ⇒ 工作階段直接 failed、完成數為 0、
/// 日誌只有驗證那一筆。
#[test]
fn test_validation_failure_fails_session_immediately() {
    let state_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();

    let settings = UserSettings {
        state_dir: state_dir.path().to_path_buf(),
        ..UserSettings::default()
    };
    let store = SessionStore::open(&settings.state_dir).unwrap();
    let progress = ProgressHandle::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let pipeline = Pipeline::new(&store, &settings, shutdown, progress);

    let result = pipeline.prepare(NewSessionRequest {
        artwork_name: "work".to_string(),
        project_date: "26-08-06".to_string(),
        master_path: PathBuf::from("/nonexistent/master.mov"),
        output_root: output_dir.path().to_path_buf(),
    });
    assert!(matches!(result, Err(PipelineError::Validation(_))));

    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.completed_operations, 0);
    assert!(session.error_message.is_some());

    let records = store.load_operations(&session.session_id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "validate_source");
    assert_eq!(records[0].status, OperationStatus::Failed);

    // 失敗的工作階段不可恢復
    assert!(store.find_resumable(7).unwrap().is_none());
}

/// 測試 6: 選擇未附加前不可執行、附加後鎖定
#[test]
fn test_selection_is_locked_after_attach() {
    let state_dir = tempfile::tempdir().unwrap();

    let settings = UserSettings {
        state_dir: state_dir.path().to_path_buf(),
        ..UserSettings::default()
    };
    let store = SessionStore::open(&settings.state_dir).unwrap();
    let progress = ProgressHandle::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let pipeline = Pipeline::new(&store, &settings, shutdown, progress);

    let (_, mut session) = make_session(state_dir.path());

    // 未附加選擇前不可執行
    let result = pipeline.run(&mut session);
    assert!(matches!(result, Err(PipelineError::Validation(_))));

    pipeline
        .attach_selection(&mut session, scenario_selection())
        .unwrap();
    assert_eq!(session.total_operations, 12);

    // 離開 initialized 後選擇不可再更改
    session.status = SessionStatus::Processing;
    let result = pipeline.attach_selection(&mut session, Selection::new(5));
    assert!(matches!(result, Err(PipelineError::Validation(_))));
}
