use crate::component::encoder::{BackendKind, EncodeBackendSelector, EncodeParameters};
use crate::component::scene_detector::Scene;
use crate::component::stills::ProvenanceMetadata;
use crate::config::EncodePreset;
use crate::error::PipelineError;
use crate::tools::{OutputKind, ensure_directory_exists, write_atomic};
use anyhow::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::process::Command;

/// 剪輯編碼器
///
/// 單一場景直接編碼區間；群組先把成員各自編碼成中間檔，
/// 再用 concat demuxer 串流複製串接，接點不重新編碼也不
/// 插入黑幀。
pub struct ClipEncoder<'a> {
    master: &'a Path,
    selector: &'a EncodeBackendSelector,
    preset: &'a EncodePreset,
    metadata: &'a ProvenanceMetadata,
}

impl<'a> ClipEncoder<'a> {
    #[must_use]
    pub const fn new(
        master: &'a Path,
        selector: &'a EncodeBackendSelector,
        preset: &'a EncodePreset,
        metadata: &'a ProvenanceMetadata,
    ) -> Self {
        Self {
            master,
            selector,
            preset,
            metadata,
        }
    }

    /// 編碼單一場景剪輯
    pub fn encode_scene(&self, scene: &Scene, target: &Path) -> Result<(), PipelineError> {
        info!(
            "編碼場景 {} 剪輯: {:.2}s - {:.2}s -> {}",
            scene.index,
            scene.start_time,
            scene.end_time,
            target.display()
        );
        self.encode_interval(scene.start_time, scene.duration(), target, self.preset)
    }

    /// 編碼群組剪輯，成員依宣告順序串接
    pub fn encode_group(
        &self,
        members: &[&Scene],
        target: &Path,
        work_dir: &Path,
    ) -> Result<(), PipelineError> {
        info!("串接 {} 個場景 -> {}", members.len(), target.display());

        // 單一成員的群組沒有接點，直接編碼
        if let [only] = members {
            return self.encode_scene(only, target);
        }

        ensure_directory_exists(work_dir)
            .map_err(|e| PipelineError::Encode(format!("無法建立群組暫存目錄: {e:#}")))?;

        let result = self.encode_group_segments(members, target, work_dir);

        if work_dir.exists() && fs::remove_dir_all(work_dir).is_err() {
            warn!("無法清理群組暫存目錄: {}", work_dir.display());
        }

        result
    }

    fn encode_group_segments(
        &self,
        members: &[&Scene],
        target: &Path,
        work_dir: &Path,
    ) -> Result<(), PipelineError> {
        let mut segment_paths = Vec::with_capacity(members.len());
        for (idx, scene) in members.iter().enumerate() {
            let segment = work_dir.join(format!("segment_{idx:03}.mp4"));
            self.encode_interval(scene.start_time, scene.duration(), &segment, self.preset)?;
            segment_paths.push(segment);
        }

        // concat demuxer 清單
        let list_path = work_dir.join("concat_list.txt");
        let mut list = String::new();
        for segment in &segment_paths {
            list.push_str(&format!("file '{}'\n", segment.display()));
        }
        fs::write(&list_path, list)
            .map_err(|e| PipelineError::Encode(format!("無法寫入串接清單: {e}")))?;

        write_atomic(target, OutputKind::Video, |tmp| {
            let mut args: Vec<String> = [
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
            ]
            .map(str::to_string)
            .to_vec();
            args.push(list_path.to_string_lossy().to_string());
            // 串流複製：接點無重新編碼、無黑幀
            args.extend(["-c".to_string(), "copy".to_string()]);
            args.extend(self.metadata.to_args());
            args.push("-y".to_string());
            args.push(tmp.to_string_lossy().to_string());

            run_ffmpeg(&args, "串接群組剪輯")
        })
        .map_err(|e| PipelineError::Encode(format!("{e:#}")))
    }

    /// 編碼一段區間到目標路徑（原子寫入）
    ///
    /// 硬體後端失敗時以軟體參數重試一次，仍失敗才回報
    /// `Encode` 錯誤。
    fn encode_interval(
        &self,
        start: f64,
        duration: f64,
        target: &Path,
        preset: &EncodePreset,
    ) -> Result<(), PipelineError> {
        let params = self.selector.parameters_for(preset);

        let first = write_atomic(target, OutputKind::Video, |tmp| {
            self.run_encode(&params, start, duration, tmp)
        });

        match first {
            Ok(()) => Ok(()),
            Err(e) if params.backend == BackendKind::Nvenc => {
                warn!("硬體編碼失敗，以軟體參數重試一次: {e:#}");
                let software = EncodeBackendSelector::software_parameters(preset);
                write_atomic(target, OutputKind::Video, |tmp| {
                    self.run_encode(&software, start, duration, tmp)
                })
                .map_err(|e| PipelineError::Encode(format!("{e:#}")))
            }
            Err(e) => Err(PipelineError::Encode(format!("{e:#}"))),
        }
    }

    /// 編碼整部母帶（母帶最佳化步驟）
    pub fn encode_full(&self, target: &Path, preset: &EncodePreset) -> Result<(), PipelineError> {
        info!("母帶最佳化 -> {}", target.display());

        let params = self.selector.parameters_for(preset);
        let first = write_atomic(target, OutputKind::Video, |tmp| {
            self.run_full_encode(&params, tmp)
        });

        match first {
            Ok(()) => Ok(()),
            Err(e) if params.backend == BackendKind::Nvenc => {
                warn!("硬體編碼失敗，以軟體參數重試一次: {e:#}");
                let software = EncodeBackendSelector::software_parameters(preset);
                write_atomic(target, OutputKind::Video, |tmp| {
                    self.run_full_encode(&software, tmp)
                })
                .map_err(|e| PipelineError::Encode(format!("{e:#}")))
            }
            Err(e) => Err(PipelineError::Encode(format!("{e:#}"))),
        }
    }

    fn run_encode(
        &self,
        params: &EncodeParameters,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> Result<()> {
        let mut args: Vec<String> = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        args.extend(params.hwaccel_args.clone());
        args.extend(["-ss".to_string(), format!("{start:.3}")]);
        args.push("-i".to_string());
        args.push(self.master.to_string_lossy().to_string());
        args.extend(["-t".to_string(), format!("{duration:.3}")]);
        args.extend(params.video_args.clone());
        args.extend(params.audio_args.clone());
        args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
        args.extend(self.metadata.to_args());
        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());

        run_ffmpeg(&args, "編碼剪輯")
    }

    fn run_full_encode(&self, params: &EncodeParameters, output: &Path) -> Result<()> {
        let mut args: Vec<String> = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        args.extend(params.hwaccel_args.clone());
        args.push("-i".to_string());
        args.push(self.master.to_string_lossy().to_string());
        args.extend(params.video_args.clone());
        args.extend(params.audio_args.clone());
        args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
        args.extend(self.metadata.to_args());
        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());

        run_ffmpeg(&args, "母帶最佳化")
    }
}

fn run_ffmpeg(args: &[String], action: &str) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .with_context(|| format!("無法執行 ffmpeg {action}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.lines().rev().take(4).collect::<Vec<_>>().join(" | ");
        anyhow::bail!("{action}失敗: {excerpt}");
    }
    Ok(())
}
