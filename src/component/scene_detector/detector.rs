use super::scene::Scene;
use crate::error::PipelineError;
use crate::tools::VideoInfo;
use log::{debug, info};
use regex::Regex;
use std::path::Path;
use std::process::Command;

/// 分析時縮放到的寬度（加速偵測，不影響決定性）
const ANALYZE_SCALE_WIDTH: u32 = 320;

/// 場景偵測設定
#[derive(Debug, Clone, Copy)]
pub struct SceneDetectorConfig {
    /// 場景變換閾值，越高越不敏感
    pub threshold: f64,
    /// 最短場景長度（幀）
    pub min_scene_length: u32,
}

impl Default for SceneDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 30.0,
            min_scene_length: 15,
        }
    }
}

/// 使用 ffmpeg scdet 濾鏡偵測場景邊界
///
/// 回傳依時間排序、不重疊且完整涵蓋 `[0, duration)` 的場景清單。
/// 找不到任何切點時回傳單一全長場景；來源完全無法分析時
/// 回傳 `PipelineError::Detection`。
pub fn detect_scenes(
    path: &Path,
    video_info: &VideoInfo,
    config: SceneDetectorConfig,
) -> Result<Vec<Scene>, PipelineError> {
    debug!(
        "場景偵測設定: threshold={}, min_scene_length={} 幀",
        config.threshold, config.min_scene_length
    );

    let filter = format!(
        "scale={ANALYZE_SCALE_WIDTH}:-1,scdet=s=1:t={}",
        config.threshold
    );

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-i"])
        .arg(path)
        .args([
            "-an", "-sn", "-dn", "-threads", "1", "-vf", &filter, "-f", "null", "-",
        ])
        .output()
        .map_err(|e| {
            PipelineError::Detection(format!("無法執行 ffmpeg: {} ({e})", path.display()))
        })?;

    // scdet 的輸出在 stderr；exit code 非零代表來源本身讀不了
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        let excerpt: String = stderr.lines().rev().take(4).collect::<Vec<_>>().join(" | ");
        return Err(PipelineError::Detection(format!(
            "來源無法分析: {excerpt}"
        )));
    }

    let cuts = parse_scdet_output(&stderr, video_info.duration_seconds)?;
    let scenes = build_scene_list(
        &cuts,
        video_info.duration_seconds,
        video_info.frame_rate,
        config.min_scene_length,
    );

    info!(
        "偵測到 {} 個切點，建立 {} 個場景",
        cuts.len(),
        scenes.len()
    );

    Ok(scenes)
}

/// 解析 scdet 的 stderr 輸出，回傳排序去重後的切點時間
///
/// 支援兩種格式:
/// `[scdet @ 0x...] t:12.345 pts_time:12.345`
/// `lavfi.scd.time=12.345`
fn parse_scdet_output(output: &str, duration: f64) -> Result<Vec<f64>, PipelineError> {
    let time_regex = Regex::new(r"t:([0-9.]+)")
        .map_err(|e| PipelineError::Detection(format!("無法編譯切點樣式: {e}")))?;
    let scd_time_regex = Regex::new(r"lavfi\.scd\.time=([0-9.]+)")
        .map_err(|e| PipelineError::Detection(format!("無法編譯切點樣式: {e}")))?;

    let mut cuts: Vec<f64> = output
        .lines()
        .filter_map(|line| {
            time_regex
                .captures(line)
                .or_else(|| scd_time_regex.captures(line))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
        })
        .filter(|&t| t > 0.0 && t < duration)
        .collect();

    cuts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    cuts.dedup_by(|a, b| (*a - *b).abs() < 0.1);
    Ok(cuts)
}

/// 由切點建立場景清單，套用最短長度限制
///
/// 與前一個保留邊界距離不足的切點會被捨棄，結尾不足最短
/// 長度的片段併入最後一個場景。零切點時回傳單一全長場景。
fn build_scene_list(cuts: &[f64], duration: f64, fps: f64, min_scene_length: u32) -> Vec<Scene> {
    let min_seconds = if fps > 0.0 {
        f64::from(min_scene_length) / fps
    } else {
        0.0
    };

    let mut boundaries = vec![0.0];
    for &cut in cuts {
        let last = *boundaries.last().expect("至少有起點");
        if cut - last >= min_seconds && duration - cut >= min_seconds {
            boundaries.push(cut);
        }
    }
    boundaries.push(duration);

    boundaries
        .windows(2)
        .enumerate()
        .map(|(i, window)| {
            let (start, end) = (window[0], window[1]);
            Scene {
                index: i + 1,
                start_frame: (start * fps).round() as u64,
                end_frame: (end * fps).round() as u64,
                start_time: start,
                end_time: end,
                thumbnail_path: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scdet_output_t_format() {
        let output = r"
[Parsed_scdet_2 @ 0x7f9b8c] t:12.345 pts_time:12.345
[Parsed_scdet_2 @ 0x7f9b8c] t:25.678 pts_time:25.678
";
        let cuts = parse_scdet_output(output, 100.0).unwrap();
        assert_eq!(cuts.len(), 2);
        assert!((cuts[0] - 12.345).abs() < 0.001);
        assert!((cuts[1] - 25.678).abs() < 0.001);
    }

    #[test]
    fn test_parse_scdet_output_scd_time_format() {
        let output = r"
frame:123 pts:12345 pts_time:12.345
lavfi.scd.time=12.345
frame:456 pts:25678 pts_time:25.678
lavfi.scd.time=25.678
";
        let cuts = parse_scdet_output(output, 100.0).unwrap();
        assert_eq!(cuts.len(), 2);
    }

    #[test]
    fn test_parse_scdet_output_filters_out_of_range() {
        let output = r"
[scdet] t:0.0 pts_time:0.0
[scdet] t:50.0 pts_time:50.0
[scdet] t:150.0 pts_time:150.0
";
        let cuts = parse_scdet_output(output, 100.0).unwrap();
        assert_eq!(cuts.len(), 1);
        assert!((cuts[0] - 50.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let output = "[scdet] t:30.0\n[scdet] t:10.0\n[scdet] t:20.0\n";
        let first = parse_scdet_output(output, 100.0).unwrap();
        let second = parse_scdet_output(output, 100.0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_zero_cuts_yields_single_full_span_scene() {
        let scenes = build_scene_list(&[], 120.0, 25.0, 15);
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].index, 1);
        assert!((scenes[0].start_time - 0.0).abs() < f64::EPSILON);
        assert!((scenes[0].end_time - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scene_list_is_ordered_and_covering() {
        let cuts = vec![10.0, 35.5, 70.0];
        let scenes = build_scene_list(&cuts, 100.0, 25.0, 15);

        assert_eq!(scenes.len(), 4);
        assert!((scenes[0].start_time).abs() < f64::EPSILON);
        assert!((scenes[3].end_time - 100.0).abs() < f64::EPSILON);

        for (i, scene) in scenes.iter().enumerate() {
            assert_eq!(scene.index, i + 1);
            assert!(scene.end_time > scene.start_time);
        }
        // 相鄰場景無縫相接
        for pair in scenes.windows(2) {
            assert!((pair[0].end_time - pair[1].start_time).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_min_scene_length_drops_close_cuts() {
        // 25 fps 下 15 幀 = 0.6 秒
        let cuts = vec![10.0, 10.3, 20.0];
        let scenes = build_scene_list(&cuts, 100.0, 25.0, 15);

        // 10.3 距離 10.0 不足 0.6 秒，應被捨棄
        assert_eq!(scenes.len(), 3);
        assert!((scenes[1].start_time - 10.0).abs() < f64::EPSILON);
        assert!((scenes[1].end_time - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_min_scene_length_merges_short_tail() {
        let cuts = vec![50.0, 99.9];
        let scenes = build_scene_list(&cuts, 100.0, 25.0, 15);

        // 結尾 0.1 秒的片段併入最後一個場景
        assert_eq!(scenes.len(), 2);
        assert!((scenes[1].end_time - 100.0).abs() < f64::EPSILON);
    }
}
