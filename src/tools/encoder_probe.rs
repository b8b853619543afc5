use log::{debug, info, warn};
use std::process::Command;

/// 硬體編碼能力偵測結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderCapabilities {
    /// ffmpeg 是否提供 h264_nvenc 編碼器
    pub nvenc: bool,
    /// 是否可用 CUDA 硬體解碼
    pub cuda_decode: bool,
}

/// 查詢 ffmpeg 的編碼能力
///
/// 偵測失敗視同無硬體支援，一律可退回軟體編碼。
#[must_use]
pub fn probe_capabilities() -> EncoderCapabilities {
    let nvenc = match Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
    {
        Ok(output) => parse_encoder_list(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            warn!("無法執行 ffmpeg 偵測編碼器: {e}");
            false
        }
    };

    let cuda_decode = match Command::new("ffmpeg")
        .args(["-hide_banner", "-hwaccels"])
        .output()
    {
        Ok(output) => parse_hwaccel_list(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            debug!("無法執行 ffmpeg 偵測硬體解碼: {e}");
            false
        }
    };

    if nvenc {
        info!("偵測到 NVENC 硬體編碼器");
    } else {
        info!("未偵測到硬體編碼器，將使用軟體編碼");
    }

    EncoderCapabilities { nvenc, cuda_decode }
}

fn parse_encoder_list(stdout: &str) -> bool {
    stdout.contains("h264_nvenc")
}

fn parse_hwaccel_list(stdout: &str) -> bool {
    stdout.lines().any(|line| line.trim() == "cuda")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoder_list() {
        let listing = "\
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder
";
        assert!(parse_encoder_list(listing));
        assert!(!parse_encoder_list(" V....D libx264  libx264 H.264"));
    }

    #[test]
    fn test_parse_hwaccel_list() {
        let listing = "Hardware acceleration methods:\nvdpau\ncuda\nvaapi\n";
        assert!(parse_hwaccel_list(listing));
        assert!(!parse_hwaccel_list("Hardware acceleration methods:\nvaapi\n"));
        // cuda 必須是完整項目，不是子字串
        assert!(!parse_hwaccel_list("Hardware acceleration methods:\ncudart\n"));
    }
}
