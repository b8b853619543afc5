use super::scene::Scene;
use anyhow::{Context, Result};
use log::{debug, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// 兩段式 seek 的前置緩衝時間（秒）
const SEEK_MARGIN: f64 = 2.0;

/// 為每個場景擷取選擇介面用的縮圖
///
/// 縮圖只是輔助操作員挑選場景，擷取失敗不影響管線，
/// 對應場景的 `thumbnail_path` 維持 None。
pub fn extract_selection_thumbnails(
    master: &Path,
    scenes: &mut [Scene],
    output_dir: &Path,
    artwork_name: &str,
) {
    let results: Vec<(usize, Option<PathBuf>)> = scenes
        .par_iter()
        .map(|scene| {
            let target = output_dir.join(format!(
                "{artwork_name}_scene_{:02}_thumb.jpg",
                scene.index
            ));

            match extract_one(master, scene.midpoint(), &target) {
                Ok(()) => (scene.index, Some(target)),
                Err(e) => {
                    warn!("場景 {} 縮圖擷取失敗: {e}", scene.index);
                    (scene.index, None)
                }
            }
        })
        .collect();

    for (index, path) in results {
        if let Some(scene) = scenes.iter_mut().find(|s| s.index == index) {
            scene.thumbnail_path = path;
        }
    }
}

/// 擷取單張縮圖（兩段式 seek 加速）
///
/// 1. `-ss` 在 `-i` 前：快速跳到最近的關鍵幀
/// 2. `-ss` 在 `-i` 後：精準解碼到目標時間點
fn extract_one(master: &Path, timestamp: f64, target: &Path) -> Result<()> {
    let t0 = (timestamp - SEEK_MARGIN).max(0.0);
    let delta = timestamp - t0;

    debug!(
        "擷取縮圖: timestamp={timestamp:.2}s, seek={t0:.2}s+{delta:.2}s -> {}",
        target.display()
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
            "-frames:v", "1", "-an", "-sn", "-dn", "-threads", "1", "-vf", "scale=320:-1",
            "-q:v", "5", "-y",
        ]
        .map(str::to_string),
    );
    args.push(target.to_string_lossy().to_string());

    let output = Command::new("ffmpeg")
        .args(&args)
        .output()
        .with_context(|| format!("無法執行 ffmpeg 擷取縮圖: {}", master.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffmpeg 擷取縮圖失敗: {}", stderr.trim());
    }

    if !target.exists() {
        anyhow::bail!("縮圖檔案未建立: {}", target.display());
    }

    Ok(())
}
