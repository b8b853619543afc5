use crate::config::EncodePreset;
use crate::tools::{EncoderCapabilities, probe_capabilities};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 編碼後端種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Nvenc,
    X264,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvenc => write!(f, "nvenc"),
            Self::X264 => write!(f, "x264"),
        }
    }
}

/// 單次編碼呼叫用的參數組
#[derive(Debug, Clone)]
pub struct EncodeParameters {
    pub backend: BackendKind,
    /// 輸入端硬體解碼旗標，放在 `-i` 之前
    pub hwaccel_args: Vec<String>,
    pub video_args: Vec<String>,
    pub audio_args: Vec<String>,
}

/// 編碼後端選擇器
///
/// 能力在建構時偵測一次並快取，工作階段中不會改變。
pub struct EncodeBackendSelector {
    capabilities: EncoderCapabilities,
    prefer_hardware: bool,
}

impl EncodeBackendSelector {
    #[must_use]
    pub fn new(prefer_hardware: bool) -> Self {
        Self::with_capabilities(probe_capabilities(), prefer_hardware)
    }

    /// 以指定能力建構（測試用）
    #[must_use]
    pub const fn with_capabilities(
        capabilities: EncoderCapabilities,
        prefer_hardware: bool,
    ) -> Self {
        Self {
            capabilities,
            prefer_hardware,
        }
    }

    /// 本次工作階段實際使用的後端
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        if self.prefer_hardware && self.capabilities.nvenc {
            BackendKind::Nvenc
        } else {
            BackendKind::X264
        }
    }

    /// 要求硬體但不可用時的警告，由呼叫端記入工作階段
    #[must_use]
    pub fn fallback_note(&self) -> Option<String> {
        if self.prefer_hardware && !self.capabilities.nvenc {
            warn!("要求硬體編碼但 NVENC 不可用，改用 x264 軟體編碼");
            Some("要求硬體編碼但 NVENC 不可用，已改用 x264 軟體編碼".to_string())
        } else {
            None
        }
    }

    /// 目前後端對應的編碼參數
    #[must_use]
    pub fn parameters_for(&self, preset: &EncodePreset) -> EncodeParameters {
        match self.backend() {
            BackendKind::Nvenc => self.nvenc_parameters(preset),
            BackendKind::X264 => Self::software_parameters(preset),
        }
    }

    fn nvenc_parameters(&self, preset: &EncodePreset) -> EncodeParameters {
        let hwaccel_args = if self.capabilities.cuda_decode {
            vec!["-hwaccel".to_string(), "cuda".to_string()]
        } else {
            Vec::new()
        };

        EncodeParameters {
            backend: BackendKind::Nvenc,
            hwaccel_args,
            video_args: [
                "-c:v",
                "h264_nvenc",
                "-preset",
                "p7",
                "-rc",
                "vbr",
                "-cq",
                &preset.crf.to_string(),
                "-b:v",
                "0",
                "-profile:v",
                "high",
                "-level",
                "4.1",
            ]
            .map(str::to_string)
            .to_vec(),
            audio_args: Self::audio_args(preset),
        }
    }

    /// 軟體參數，永遠可用；也是硬體失敗時的重試路徑
    #[must_use]
    pub fn software_parameters(preset: &EncodePreset) -> EncodeParameters {
        EncodeParameters {
            backend: BackendKind::X264,
            hwaccel_args: Vec::new(),
            video_args: [
                "-c:v",
                "libx264",
                "-crf",
                &preset.crf.to_string(),
                "-preset",
                &preset.x264_preset,
                "-profile:v",
                "high",
                "-level",
                "4.1",
            ]
            .map(str::to_string)
            .to_vec(),
            audio_args: Self::audio_args(preset),
        }
    }

    fn audio_args(preset: &EncodePreset) -> Vec<String> {
        [
            "-c:a",
            "aac",
            "-b:a",
            &preset.audio_bitrate,
            "-ar",
            "48000",
        ]
        .map(str::to_string)
        .to_vec()
    }
}
