use super::plan::{
    OutputFolders, build_clip_operations, clip_filename, group_filename,
    optimized_master_filename, still_hq_filename, still_web_filename, total_operations,
};
use super::progress::{OperationBrief, ProgressHandle, SessionSnapshot};
use super::summary::{OperationTally, tally_operations, write_process_log};
use super::validator::validate_master;
use crate::component::clips::ClipEncoder;
use crate::component::encoder::EncodeBackendSelector;
use crate::component::scene_detector::{
    Scene, SceneDetectorConfig, detect_scenes, extract_selection_thumbnails,
};
use crate::component::selection::{ClipUnit, Selection};
use crate::component::session::{
    OperationKind, OperationRecord, OperationStatus, Session, SessionStatus, SessionStore,
};
use crate::component::stills::{
    ProvenanceMetadata, StillTask, StillsContext, extract_stills_parallel,
};
use crate::config::UserSettings;
use crate::error::PipelineError;
use crate::tools::{OutputKind, get_video_info, write_atomic};
use anyhow::Context as _;
use log::{error, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// 建立新工作階段的輸入
#[derive(Debug, Clone)]
pub struct NewSessionRequest {
    pub artwork_name: String,
    pub project_date: String,
    pub master_path: PathBuf,
    pub output_root: PathBuf,
}

/// 一次執行的結果摘要
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: SessionStatus,
    pub tally: OperationTally,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
    pub output_root: PathBuf,
}

/// 處理管線編排器
///
/// 單一執行緒驅動狀態機與所有工作階段轉移；靜態圖單位
/// 在受限的工作池平行執行。每一步完成都先持久化再前進，
/// 恢復時依作業日誌跳過已完成的工作。
pub struct Pipeline<'a> {
    store: &'a SessionStore,
    settings: &'a UserSettings,
    selector: EncodeBackendSelector,
    shutdown: Arc<AtomicBool>,
    progress: ProgressHandle,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        store: &'a SessionStore,
        settings: &'a UserSettings,
        shutdown: Arc<AtomicBool>,
        progress: ProgressHandle,
    ) -> Self {
        // 能力偵測一次，整個工作階段共用
        let selector = EncodeBackendSelector::new(settings.prefer_hardware);
        Self {
            store,
            settings,
            selector,
            shutdown,
            progress,
        }
    }

    /// 階段一：建立工作階段並執行前置關鍵作業
    ///
    /// 驗證母帶、複製母帶、母帶最佳化、場景偵測。完成後工作
    /// 階段停在 `initialized`，等操作員附加場景選擇。
    pub fn prepare(&self, request: NewSessionRequest) -> Result<Session, PipelineError> {
        let mut session = Session::new(
            request.artwork_name,
            request.project_date,
            request.master_path,
            request.output_root,
            self.settings.preset.clone(),
            self.selector.backend(),
            self.settings.scene_threshold,
            self.settings.min_scene_length,
        );
        if let Some(note) = self.selector.fallback_note() {
            session.warnings.push(note);
        }
        self.store.save(&mut session)?;
        info!("建立工作階段: {}", session.session_id);

        let folders = self.folders_for(&session);
        folders
            .create_all()
            .map_err(|e| PipelineError::Validation(format!("無法建立輸出結構: {e:#}")))?;

        let mut sequence = 1u32;
        let mut recent = Vec::new();

        self.run_critical(
            &mut session,
            &mut sequence,
            &mut recent,
            OperationKind::ValidateSource,
            |session| self.op_validate(session),
        )?;
        self.run_critical(
            &mut session,
            &mut sequence,
            &mut recent,
            OperationKind::CopyMaster,
            |session| self.op_copy_master(session, &folders),
        )?;
        self.run_critical(
            &mut session,
            &mut sequence,
            &mut recent,
            OperationKind::OptimizeMaster,
            |session| self.op_optimize_master(session, &folders),
        )?;
        self.run_critical(
            &mut session,
            &mut sequence,
            &mut recent,
            OperationKind::DetectScenes,
            |session| self.op_detect_scenes(session, &folders),
        )?;

        session.current_operation = None;
        self.store.save(&mut session)?;
        Ok(session)
    }

    /// 附加操作員的場景選擇
    ///
    /// 只有 `initialized` 狀態的工作階段可以更改選擇。
    pub fn attach_selection(
        &self,
        session: &mut Session,
        selection: Selection,
    ) -> Result<(), PipelineError> {
        if session.status != SessionStatus::Initialized {
            return Err(PipelineError::Validation(
                "工作階段已開始，選擇不可再更改".to_string(),
            ));
        }

        session.total_operations = total_operations(&selection);
        session.selection = Some(selection);
        self.store.save(session)?;
        Ok(())
    }

    /// 最近可恢復的工作階段
    pub fn find_resumable(&self) -> Result<Option<Session>, PipelineError> {
        Ok(self.store.find_resumable(self.settings.staleness_days)?)
    }

    /// 階段二：執行（或恢復）整個作業清單
    ///
    /// 已在日誌中標為完成的作業不會重做；暫停請求在作業
    /// 邊界生效。
    pub fn run(&self, session: &mut Session) -> Result<RunSummary, PipelineError> {
        if session.status.is_terminal() {
            return Err(PipelineError::Validation(format!(
                "工作階段已結束 ({})",
                session.status
            )));
        }
        let selection = session
            .selection
            .clone()
            .ok_or_else(|| PipelineError::Validation("尚未附加場景選擇".to_string()))?;

        let folders = self.folders_for(session);
        folders
            .create_all()
            .map_err(|e| PipelineError::Validation(format!("無法建立輸出結構: {e:#}")))?;

        session.status = SessionStatus::Processing;
        self.store.save(session)?;

        let completed = self.store.completed_operation_names(&session.session_id)?;
        // 恢復時以作業日誌為準重算完成數
        session.completed_operations = completed.len() as u32;
        let mut sequence = self.store.next_sequence(&session.session_id)?;
        let mut recent: Vec<OperationBrief> = Vec::new();
        self.publish(session, &recent);

        info!(
            "開始執行工作階段 {}（已完成 {}/{}）",
            session.session_id, session.completed_operations, session.total_operations
        );

        // 關鍵前置作業正常已在 prepare 完成；缺漏時補跑
        if !completed.contains("validate_source") {
            self.run_critical(
                session,
                &mut sequence,
                &mut recent,
                OperationKind::ValidateSource,
                |session| self.op_validate(session),
            )?;
        }
        if !completed.contains("copy_master") {
            self.run_critical(
                session,
                &mut sequence,
                &mut recent,
                OperationKind::CopyMaster,
                |session| self.op_copy_master(session, &folders),
            )?;
        }
        if !completed.contains("optimize_master") {
            self.run_critical(
                session,
                &mut sequence,
                &mut recent,
                OperationKind::OptimizeMaster,
                |session| self.op_optimize_master(session, &folders),
            )?;
        }
        if !completed.contains("detect_scenes") {
            self.run_critical(
                session,
                &mut sequence,
                &mut recent,
                OperationKind::DetectScenes,
                |session| self.op_detect_scenes(session, &folders),
            )?;
        }

        let master = session.master_path.clone();
        let preset = session.preset.clone();
        let artwork = session.artwork_name.clone();
        let aspect = session.aspect_suffix.clone();
        let metadata = self.provenance_for(session);
        let encoder = ClipEncoder::new(&master, &self.selector, &preset, &metadata);
        let scene_by_index: HashMap<usize, Scene> = session
            .scenes
            .iter()
            .map(|s| (s.index, s.clone()))
            .collect();

        // --- 剪輯單元 ---
        let pending_units: Vec<(OperationKind, ClipUnit)> = build_clip_operations(&selection)
            .into_iter()
            .filter(|(kind, _)| !completed.contains(&kind.name()))
            .collect();

        if self.settings.concurrent_clip_units && pending_units.len() > 1 {
            self.run_clip_units_parallel(
                session,
                &mut sequence,
                &mut recent,
                &pending_units,
                &encoder,
                &scene_by_index,
                &folders,
                &artwork,
            )?;
        } else {
            self.run_clip_units_sequential(
                session,
                &mut sequence,
                &mut recent,
                &pending_units,
                &encoder,
                &scene_by_index,
                &folders,
                &artwork,
            )?;
        }
        if self.shutdown.load(Ordering::SeqCst) {
            return self.pause(session, &recent, &folders);
        }

        // --- 靜態圖 ---
        let still_tasks: Vec<StillTask> = selection
            .stills_scope()
            .into_iter()
            .filter(|&index| {
                !completed.contains(&OperationKind::ExtractStill { scene_index: index }.name())
            })
            .filter_map(|index| {
                scene_by_index.get(&index).map(|scene| StillTask {
                    scene_index: index,
                    timestamp: scene.midpoint(),
                    hq_target: folders
                        .stills_hq
                        .join(still_hq_filename(&artwork, index, &aspect)),
                    web_target: folders
                        .stills_compressed
                        .join(still_web_filename(&artwork, index, &aspect)),
                })
            })
            .collect();

        if !still_tasks.is_empty() {
            session.current_operation = Some("extract_stills".to_string());
            self.store.save(session)?;
            self.publish(session, &recent);

            let session_id = session.session_id.clone();
            let sequence_counter = AtomicU32::new(sequence);
            let context = StillsContext {
                master: &master,
                metadata: &metadata,
                preset: &preset,
                store: self.store,
                session_id: &session_id,
                sequence: &sequence_counter,
            };

            let outcomes = extract_stills_parallel(
                &context,
                &still_tasks,
                self.settings.stills_workers,
                &self.shutdown,
            );
            sequence = sequence_counter.load(Ordering::SeqCst);

            for outcome in outcomes {
                if let Some(store_error) = outcome.store_error {
                    return self.fail(session, PipelineError::StateStore(store_error));
                }
                if outcome.skipped {
                    continue;
                }
                recent.push(OperationBrief {
                    name: OperationKind::ExtractStill {
                        scene_index: outcome.scene_index,
                    }
                    .name(),
                    status: if outcome.success {
                        OperationStatus::Completed
                    } else {
                        OperationStatus::Failed
                    },
                });
                if outcome.success {
                    session.completed_operations += 1;
                }
            }
            self.store.save(session)?;
            self.publish(session, &recent);
        }
        if self.shutdown.load(Ordering::SeqCst) {
            return self.pause(session, &recent, &folders);
        }

        // --- 收尾 ---
        if !completed.contains("finalize") {
            self.run_critical(
                session,
                &mut sequence,
                &mut recent,
                OperationKind::Finalize,
                |session| self.op_finalize(session, &folders),
            )?;
        }

        session.status = SessionStatus::Completed;
        session.completed_at = Some(chrono::Utc::now());
        session.current_operation = None;
        self.store.save(session)?;
        self.publish(session, &recent);
        info!("工作階段完成: {}", session.session_id);

        self.summarize(session, &folders)
    }

    // --- 個別作業 ---

    fn op_validate(&self, session: &mut Session) -> Result<Vec<PathBuf>, PipelineError> {
        let info = validate_master(&session.master_path)?;
        session.aspect_suffix = info.aspect_suffix;
        Ok(Vec::new())
    }

    fn op_copy_master(
        &self,
        session: &mut Session,
        folders: &OutputFolders,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let file_name = session
            .master_path
            .file_name()
            .ok_or_else(|| PipelineError::Validation("無法取得母帶檔名".to_string()))?;
        let target = folders.masters.join(file_name);
        let source = session.master_path.clone();

        write_atomic(&target, OutputKind::Video, |tmp| {
            fs::copy(&source, tmp)
                .with_context(|| format!("無法複製母帶: {}", source.display()))?;
            Ok(())
        })
        .map_err(|e| PipelineError::Validation(format!("複製母帶失敗: {e:#}")))?;

        Ok(vec![target])
    }

    fn op_optimize_master(
        &self,
        session: &mut Session,
        folders: &OutputFolders,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let metadata = self.provenance_for(session);
        let encoder = ClipEncoder::new(
            &session.master_path,
            &self.selector,
            &session.preset,
            &metadata,
        );
        let target = folders
            .masters
            .join(optimized_master_filename(&session.artwork_name));

        encoder.encode_full(&target, &session.preset.master_variant())?;
        Ok(vec![target])
    }

    fn op_detect_scenes(
        &self,
        session: &mut Session,
        folders: &OutputFolders,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let info = get_video_info(&session.master_path)
            .map_err(|e| PipelineError::Detection(format!("無法讀取母帶資訊: {e:#}")))?;

        let config = SceneDetectorConfig {
            threshold: session.scene_threshold,
            min_scene_length: session.min_scene_length,
        };
        let mut scenes = detect_scenes(&session.master_path, &info, config)?;

        extract_selection_thumbnails(
            &session.master_path,
            &mut scenes,
            &folders.temp_thumbnails,
            &session.artwork_name,
        );

        session.scenes = scenes;
        Ok(Vec::new())
    }

    fn op_finalize(
        &self,
        session: &mut Session,
        folders: &OutputFolders,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let records = self.store.load_operations(&session.session_id)?;
        let log_path = folders.root.join("process_log.txt");

        write_process_log(&log_path, session, &records)
            .map_err(|e| PipelineError::Validation(format!("無法寫入處理紀錄: {e:#}")))?;

        if folders.temp_thumbnails.exists() && fs::remove_dir_all(&folders.temp_thumbnails).is_err()
        {
            warn!(
                "無法清理縮圖暫存目錄: {}",
                folders.temp_thumbnails.display()
            );
        }

        Ok(vec![log_path])
    }

    // --- 剪輯階段 ---

    #[allow(clippy::too_many_arguments)]
    fn run_clip_units_sequential(
        &self,
        session: &mut Session,
        sequence: &mut u32,
        recent: &mut Vec<OperationBrief>,
        pending: &[(OperationKind, ClipUnit)],
        encoder: &ClipEncoder<'_>,
        scene_by_index: &HashMap<usize, Scene>,
        folders: &OutputFolders,
        artwork: &str,
    ) -> Result<(), PipelineError> {
        for (kind, unit) in pending {
            // 暫停請求在作業邊界生效，不會打斷進行中的編碼
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }

            let name = kind.name();
            session.current_operation = Some(name.clone());
            self.store.save(session)?;
            self.publish(session, recent);

            let mut record = OperationRecord::started(*sequence, kind.clone());
            *sequence += 1;
            record.input_file = Some(session.master_path.clone());

            match self.execute_clip_unit(encoder, scene_by_index, kind, unit, folders, artwork) {
                Ok(outputs) => {
                    let record = record
                        .with_outputs(outputs)
                        .finished(OperationStatus::Completed);
                    self.store.append_operation(&session.session_id, &record)?;
                    recent.push(OperationBrief {
                        name,
                        status: OperationStatus::Completed,
                    });
                    session.completed_operations += 1;
                }
                Err(e) => {
                    // 智慧跳過：記錄失敗後繼續下一個單元
                    warn!("剪輯單元失敗，跳過 [{name}]: {e}");
                    let record = record
                        .with_error(e.to_string())
                        .finished(OperationStatus::Failed);
                    self.store.append_operation(&session.session_id, &record)?;
                    recent.push(OperationBrief {
                        name,
                        status: OperationStatus::Failed,
                    });
                }
            }

            self.store.save(session)?;
            self.publish(session, recent);
        }
        Ok(())
    }

    /// 平行剪輯單元（設定選項，預設關閉）
    ///
    /// 各單元的輸出與暫存目錄互不重疊才允許平行。
    #[allow(clippy::too_many_arguments)]
    fn run_clip_units_parallel(
        &self,
        session: &mut Session,
        sequence: &mut u32,
        recent: &mut Vec<OperationBrief>,
        pending: &[(OperationKind, ClipUnit)],
        encoder: &ClipEncoder<'_>,
        scene_by_index: &HashMap<usize, Scene>,
        folders: &OutputFolders,
        artwork: &str,
    ) -> Result<(), PipelineError> {
        session.current_operation = Some("encode_clips".to_string());
        self.store.save(session)?;
        self.publish(session, recent);

        let session_id = session.session_id.clone();
        let master = session.master_path.clone();
        let sequence_counter = AtomicU32::new(*sequence);

        let run = |pending: &[(OperationKind, ClipUnit)]| {
            pending
                .par_iter()
                .map(|(kind, unit)| {
                    if self.shutdown.load(Ordering::SeqCst) {
                        return Ok(None);
                    }

                    let mut record =
                        OperationRecord::started(sequence_counter.fetch_add(1, Ordering::SeqCst), kind.clone());
                    record.input_file = Some(master.clone());

                    let result = self
                        .execute_clip_unit(encoder, scene_by_index, kind, unit, folders, artwork);
                    let (record, success) = match result {
                        Ok(outputs) => (
                            record
                                .with_outputs(outputs)
                                .finished(OperationStatus::Completed),
                            true,
                        ),
                        Err(e) => {
                            warn!("剪輯單元失敗，跳過 [{}]: {e}", kind.name());
                            (
                                record
                                    .with_error(e.to_string())
                                    .finished(OperationStatus::Failed),
                                false,
                            )
                        }
                    };

                    self.store
                        .append_operation(&session_id, &record)
                        .map(|()| Some((record.name.clone(), success)))
                })
                .collect::<Vec<_>>()
        };

        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build();
        let outcomes = match pool {
            Ok(pool) => pool.install(|| run(pending)),
            Err(e) => {
                error!("無法建立剪輯執行緒池: {e}");
                run(pending)
            }
        };
        *sequence = sequence_counter.load(Ordering::SeqCst);

        for outcome in outcomes {
            match outcome {
                Ok(Some((name, success))) => {
                    recent.push(OperationBrief {
                        name,
                        status: if success {
                            OperationStatus::Completed
                        } else {
                            OperationStatus::Failed
                        },
                    });
                    if success {
                        session.completed_operations += 1;
                    }
                }
                Ok(None) => {}
                Err(store_error) => {
                    return self
                        .fail(session, PipelineError::StateStore(store_error))
                        .map(|_| ());
                }
            }
        }

        self.store.save(session)?;
        self.publish(session, recent);
        Ok(())
    }

    fn execute_clip_unit(
        &self,
        encoder: &ClipEncoder<'_>,
        scene_by_index: &HashMap<usize, Scene>,
        kind: &OperationKind,
        unit: &ClipUnit,
        folders: &OutputFolders,
        artwork: &str,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        match (kind, unit) {
            (OperationKind::EncodeClip { clip_seq, scene_index }, ClipUnit::Single(_)) => {
                let scene = scene_by_index.get(scene_index).ok_or_else(|| {
                    PipelineError::Encode(format!("場景 {scene_index} 不存在"))
                })?;
                let target = folders
                    .video_clips
                    .join(clip_filename(artwork, *clip_seq));
                encoder.encode_scene(scene, &target)?;
                Ok(vec![target])
            }
            (OperationKind::EncodeGroup { group_seq, members }, ClipUnit::Group { .. }) => {
                // 串接順序依群組宣告的成員順序，不做場景編號排序
                let scenes: Vec<&Scene> = members
                    .iter()
                    .map(|index| {
                        scene_by_index.get(index).ok_or_else(|| {
                            PipelineError::Encode(format!("場景 {index} 不存在"))
                        })
                    })
                    .collect::<Result<_, _>>()?;
                let target = folders
                    .video_clips
                    .join(group_filename(artwork, *group_seq));
                let work_dir = folders
                    .video_clips
                    .join(format!(".tmp_group_{group_seq:02}"));
                encoder.encode_group(&scenes, &target, &work_dir)?;
                Ok(vec![target])
            }
            _ => Err(PipelineError::Encode("作業種類與單元不一致".to_string())),
        }
    }

    // --- 狀態機輔助 ---

    /// 執行一個關鍵作業：失敗立即讓整個工作階段轉為 failed
    fn run_critical<F>(
        &self,
        session: &mut Session,
        sequence: &mut u32,
        recent: &mut Vec<OperationBrief>,
        kind: OperationKind,
        op: F,
    ) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut Session) -> Result<Vec<PathBuf>, PipelineError>,
    {
        let name = kind.name();
        session.current_operation = Some(name.clone());
        self.store.save(session)?;
        self.publish(session, recent);
        info!("執行作業: {name}");

        let mut record = OperationRecord::started(*sequence, kind);
        *sequence += 1;
        record.input_file = Some(session.master_path.clone());

        match op(session) {
            Ok(outputs) => {
                let record = record
                    .with_outputs(outputs)
                    .finished(OperationStatus::Completed);
                self.store.append_operation(&session.session_id, &record)?;
                recent.push(OperationBrief {
                    name,
                    status: OperationStatus::Completed,
                });
                session.completed_operations += 1;
                self.store.save(session)?;
                self.publish(session, recent);
                Ok(())
            }
            Err(e) => {
                error!("關鍵作業失敗 [{name}]: {e}");
                let record = record
                    .with_error(e.to_string())
                    .finished(OperationStatus::Failed);
                // 致命路徑上仍盡力記錄；以原始錯誤為準回報
                let _ = self.store.append_operation(&session.session_id, &record);
                recent.push(OperationBrief {
                    name,
                    status: OperationStatus::Failed,
                });
                session.status = SessionStatus::Failed;
                session.error_message = Some(e.to_string());
                session.current_operation = None;
                let _ = self.store.save(session);
                self.publish(session, recent);
                Err(e)
            }
        }
    }

    /// 在作業邊界暫停
    fn pause(
        &self,
        session: &mut Session,
        recent: &[OperationBrief],
        folders: &OutputFolders,
    ) -> Result<RunSummary, PipelineError> {
        info!("在作業邊界暫停工作階段: {}", session.session_id);
        session.status = SessionStatus::Paused;
        session.current_operation = None;
        self.store.save(session)?;
        self.publish(session, recent);
        self.summarize(session, folders)
    }

    /// 致命錯誤：標記失敗後往上傳遞
    fn fail(
        &self,
        session: &mut Session,
        error: PipelineError,
    ) -> Result<RunSummary, PipelineError> {
        error!("工作階段失敗: {error}");
        session.status = SessionStatus::Failed;
        session.error_message = Some(error.to_string());
        session.current_operation = None;
        let _ = self.store.save(session);
        Err(error)
    }

    fn summarize(
        &self,
        session: &Session,
        folders: &OutputFolders,
    ) -> Result<RunSummary, PipelineError> {
        let records = self.store.load_operations(&session.session_id)?;
        Ok(RunSummary {
            status: session.status,
            tally: tally_operations(&records),
            warnings: session.warnings.clone(),
            error_message: session.error_message.clone(),
            output_root: folders.root.clone(),
        })
    }

    fn folders_for(&self, session: &Session) -> OutputFolders {
        OutputFolders::locate(
            &session.output_root,
            &session.project_date,
            &session.artwork_name,
        )
    }

    fn provenance_for(&self, session: &Session) -> ProvenanceMetadata {
        ProvenanceMetadata {
            copyright: self.settings.copyright_holder.clone(),
            creator: "影片封存準備工具".to_string(),
            software: format!("video_archive_prep v{}", env!("CARGO_PKG_VERSION")),
            description: format!("Artwork: {}", session.artwork_name),
            source_file: session
                .master_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }

    fn publish(&self, session: &Session, recent: &[OperationBrief]) {
        let recent_operations = recent.iter().rev().take(8).rev().cloned().collect();
        self.progress
            .publish(SessionSnapshot::of(session, recent_operations));
    }
}
