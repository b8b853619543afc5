use super::metadata::ProvenanceMetadata;
use crate::component::session::{OperationKind, OperationRecord, OperationStatus, SessionStore};
use crate::config::EncodePreset;
use crate::error::StateStoreError;
use crate::tools::{OutputKind, write_atomic};
use anyhow::{Context, Result};
use log::{debug, error, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// 兩段式 seek 的前置緩衝時間（秒）
const SEEK_MARGIN: f64 = 2.0;

/// 單一靜態圖工作：一個場景中點，兩個輸出
#[derive(Debug, Clone)]
pub struct StillTask {
    pub scene_index: usize,
    pub timestamp: f64,
    /// 封存品質 PNG
    pub hq_target: PathBuf,
    /// 網頁壓縮 JPEG
    pub web_target: PathBuf,
}

/// 單一靜態圖工作的結果
#[derive(Debug)]
pub struct StillOutcome {
    pub scene_index: usize,
    pub success: bool,
    /// 暫停信號造成的跳過：不記日誌，恢復時重做
    pub skipped: bool,
    pub error_message: Option<String>,
    /// 作業紀錄寫入失敗（致命，由編排器處理）
    pub store_error: Option<StateStoreError>,
}

/// 靜態圖階段的共用環境
pub struct StillsContext<'a> {
    pub master: &'a Path,
    pub metadata: &'a ProvenanceMetadata,
    pub preset: &'a EncodePreset,
    pub store: &'a SessionStore,
    pub session_id: &'a str,
    pub sequence: &'a AtomicU32,
}

/// 平行擷取靜態圖
///
/// 工作單位彼此獨立，單一失敗不影響其他單位；每個單位完成
/// 時由工作執行緒自行把作業紀錄寫入儲存（內部已序列化），
/// 因此日誌順序是完成順序而非場景編號順序。
pub fn extract_stills_parallel(
    context: &StillsContext<'_>,
    tasks: &[StillTask],
    workers: usize,
    shutdown: &Arc<AtomicBool>,
) -> Vec<StillOutcome> {
    if tasks.is_empty() {
        return Vec::new();
    }

    info!(
        "開始擷取 {} 張靜態圖（{} 個工作執行緒）",
        tasks.len(),
        workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    let run = |tasks: &[StillTask]| -> Vec<StillOutcome> {
        tasks
            .par_iter()
            .map(|task| {
                if shutdown.load(Ordering::SeqCst) {
                    return StillOutcome {
                        scene_index: task.scene_index,
                        success: false,
                        skipped: true,
                        error_message: None,
                        store_error: None,
                    };
                }
                process_one(context, task)
            })
            .collect()
    };

    match pool {
        Ok(pool) => pool.install(|| run(tasks)),
        // 建池失敗退回全域執行緒池
        Err(e) => {
            error!("無法建立工作執行緒池: {e}");
            run(tasks)
        }
    }
}

fn process_one(context: &StillsContext<'_>, task: &StillTask) -> StillOutcome {
    let sequence = context.sequence.fetch_add(1, Ordering::SeqCst);
    let mut record = OperationRecord::started(
        sequence,
        OperationKind::ExtractStill {
            scene_index: task.scene_index,
        },
    );
    record.input_file = Some(context.master.to_path_buf());

    let result = extract_pair(context, task);

    let (record, outcome_error) = match result {
        Ok(()) => (
            record
                .with_outputs(vec![task.hq_target.clone(), task.web_target.clone()])
                .finished(OperationStatus::Completed),
            None,
        ),
        Err(e) => {
            error!("場景 {} 靜態圖擷取失敗: {e:#}", task.scene_index);
            (
                record
                    .with_error(format!("{e:#}"))
                    .finished(OperationStatus::Failed),
                Some(format!("{e:#}")),
            )
        }
    };

    let store_error = context
        .store
        .append_operation(context.session_id, &record)
        .err();

    StillOutcome {
        scene_index: task.scene_index,
        success: outcome_error.is_none(),
        skipped: false,
        error_message: outcome_error,
        store_error,
    }
}

/// 擷取一組輸出：先封存 PNG，再由 PNG 產生網頁 JPEG
fn extract_pair(context: &StillsContext<'_>, task: &StillTask) -> Result<()> {
    write_atomic(&task.hq_target, OutputKind::Png, |tmp| {
        extract_hq_frame(context.master, task.timestamp, context.metadata, tmp)
    })?;

    write_atomic(&task.web_target, OutputKind::Jpeg, |tmp| {
        compress_to_web(&task.hq_target, context.preset, context.metadata, tmp)
    })?;

    Ok(())
}

/// 擷取封存品質 PNG
///
/// rgb24 保留色彩精度；compression_level 0 換取擷取速度。
fn extract_hq_frame(
    master: &Path,
    timestamp: f64,
    metadata: &ProvenanceMetadata,
    output: &Path,
) -> Result<()> {
    let t0 = (timestamp - SEEK_MARGIN).max(0.0);
    let delta = timestamp - t0;

    debug!(
        "擷取靜態圖: timestamp={timestamp:.3}s -> {}",
        output.display()
    );

    let mut args: Vec<String> = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];

    if t0 > 0.0 {
        args.push("-ss".to_string());
        args.push(format!("{t0:.3}"));
    }
    args.push("-i".to_string());
    args.push(master.to_string_lossy().to_string());
    if delta > 0.0 {
        args.push("-ss".to_string());
        args.push(format!("{delta:.3}"));
    }

    args.extend(
        [
            "-frames:v",
            "1",
            "-an",
            "-sn",
            "-dn",
            "-threads",
            "1",
            "-compression_level",
            "0",
            "-pix_fmt",
            "rgb24",
        ]
        .map(str::to_string),
    );
    args.extend(metadata.to_args());
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());

    run_ffmpeg(&args, "擷取靜態圖")
}

/// 由封存 PNG 產生網頁壓縮 JPEG
fn compress_to_web(
    hq_source: &Path,
    preset: &EncodePreset,
    metadata: &ProvenanceMetadata,
    output: &Path,
) -> Result<()> {
    let scale = format!("scale=min(iw\\,{}):-2", preset.web_max_width);
    let qscale = jpeg_qscale(preset.jpeg_quality);

    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-i",
    ]
    .map(str::to_string)
    .to_vec();
    args.push(hq_source.to_string_lossy().to_string());
    args.extend(["-vf".to_string(), scale]);
    args.extend(["-q:v".to_string(), qscale.to_string()]);
    args.extend(metadata.to_args());
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());

    run_ffmpeg(&args, "壓縮網頁靜態圖")
}

/// 把 1-100 的品質值映射到 mjpeg 的 qscale (2-31，越低品質越高)
fn jpeg_qscale(quality: u8) -> u8 {
    let quality = f64::from(quality.clamp(1, 100));
    (2.0 + (100.0 - quality) * 29.0 / 99.0).round() as u8
}

fn run_ffmpeg(args: &[String], action: &str) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .with_context(|| format!("無法執行 ffmpeg {action}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{action}失敗: {}", stderr.trim());
    }
    Ok(())
}
