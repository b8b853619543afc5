use crate::error::PipelineError;
use crate::tools::{VideoInfo, get_video_info, validate_file_exists};
use log::info;
use std::path::Path;

/// 通過驗證的母帶資訊
#[derive(Debug, Clone)]
pub struct MasterInfo {
    pub video: VideoInfo,
    pub aspect_suffix: String,
}

/// 驗證母帶檔案
///
/// 母帶合約：檔案存在、ffprobe 可解析、有視訊串流、編碼為
/// ProRes、尺寸與長度有效、幀率合理。任何一項不符都是致命
/// 的 `Validation` 錯誤。
pub fn validate_master(path: &Path) -> Result<MasterInfo, PipelineError> {
    validate_file_exists(path).map_err(|e| PipelineError::Validation(format!("{e:#}")))?;

    let video =
        get_video_info(path).map_err(|e| PipelineError::Validation(format!("無法解析母帶: {e:#}")))?;

    if !video.codec_name.to_lowercase().contains("prores") {
        return Err(PipelineError::Validation(format!(
            "母帶不是 ProRes: 編碼為 {}",
            if video.codec_long_name.is_empty() {
                "unknown"
            } else {
                &video.codec_long_name
            }
        )));
    }

    if video.width == 0 || video.height == 0 {
        return Err(PipelineError::Validation("母帶尺寸無效".to_string()));
    }

    if video.duration_seconds <= 0.0 {
        return Err(PipelineError::Validation("母帶長度無效".to_string()));
    }

    if video.frame_rate <= 0.0 || video.frame_rate > 120.0 {
        return Err(PipelineError::Validation(format!(
            "母帶幀率無效: {:.2}",
            video.frame_rate
        )));
    }

    let aspect_suffix = aspect_suffix(video.width, video.height);

    info!(
        "母帶驗證通過: ProRes {} {}x{} {:.2}s {:.2}fps ({:.1} MB)",
        video.profile.as_deref().unwrap_or("?"),
        video.width,
        video.height,
        video.duration_seconds,
        video.frame_rate,
        video.size_bytes as f64 / 1024.0 / 1024.0
    );

    Ok(MasterInfo {
        video,
        aspect_suffix,
    })
}

/// 長寬比後綴，用於輸出檔名
#[must_use]
pub fn aspect_suffix(width: u32, height: u32) -> String {
    if width == 0 || height == 0 {
        return "unknown".to_string();
    }

    let ratio = f64::from(width) / f64::from(height);
    let tolerance = 0.1;

    let table: [(f64, &str); 6] = [
        (16.0 / 9.0, "16x9"),
        (9.0 / 16.0, "9x16"),
        (1.0, "1x1"),
        (4.0 / 3.0, "4x3"),
        (21.0 / 9.0, "21x9"),
        (2.35, "235x100"),
    ];

    for (target, suffix) in table {
        if (ratio - target).abs() < tolerance {
            return (*suffix).to_string();
        }
    }

    format!("{width}x{height}")
}
