use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 強型別編碼預設
///
/// 核心只接受這個結構，不處理鬆散的設定字典。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodePreset {
    /// 影片品質（CRF / NVENC CQ，越低品質越高）
    pub crf: u8,
    /// 軟體編碼速度預設
    pub x264_preset: String,
    /// 音訊位元率
    pub audio_bitrate: String,
    /// 網頁版 JPEG 品質 (1-100)
    pub jpeg_quality: u8,
    /// 網頁版靜態圖最大寬度
    pub web_max_width: u32,
}

impl Default for EncodePreset {
    fn default() -> Self {
        Self {
            crf: 20,
            x264_preset: "slow".to_string(),
            audio_bitrate: "320k".to_string(),
            jpeg_quality: 90,
            web_max_width: 2560,
        }
    }
}

impl EncodePreset {
    /// 母帶最佳化使用的高品質變體
    #[must_use]
    pub fn master_variant(&self) -> Self {
        Self {
            crf: 18,
            x264_preset: "slow".to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// 靜態圖擷取的工作執行緒數
    pub stills_workers: usize,
    /// 工作階段狀態目錄
    pub state_dir: PathBuf,
    /// 可恢復工作階段的有效天數
    pub staleness_days: i64,
    /// 嵌入輸出的版權宣告
    pub copyright_holder: String,
    /// 場景偵測閾值（越高越不敏感）
    pub scene_threshold: f64,
    /// 最短場景長度（幀）
    pub min_scene_length: u32,
    /// 是否允許剪輯單元平行編碼
    pub concurrent_clip_units: bool,
    /// 優先使用硬體編碼
    pub prefer_hardware: bool,
    pub preset: EncodePreset,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            stills_workers: 4,
            state_dir: PathBuf::from("state"),
            staleness_days: 7,
            copyright_holder: String::new(),
            scene_threshold: 30.0,
            min_scene_length: 15,
            concurrent_clip_units: false,
            prefer_hardware: true,
            preset: EncodePreset::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: UserSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = UserSettings::default();
        assert_eq!(settings.stills_workers, 4);
        assert_eq!(settings.staleness_days, 7);
        assert!((settings.scene_threshold - 30.0).abs() < f64::EPSILON);
        assert!(!settings.concurrent_clip_units);
    }

    #[test]
    fn test_master_variant_raises_quality() {
        let preset = EncodePreset::default();
        let master = preset.master_variant();
        assert_eq!(master.crf, 18);
        assert_eq!(master.x264_preset, "slow");
        assert_eq!(master.jpeg_quality, preset.jpeg_quality);
    }

    #[test]
    fn test_settings_roundtrip() {
        let settings = UserSettings {
            copyright_holder: "© Studio".to_string(),
            stills_workers: 8,
            ..UserSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: UserSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let parsed: UserSettings = serde_json::from_str(r#"{"stills_workers": 2}"#).unwrap();
        assert_eq!(parsed.stills_workers, 2);
        assert_eq!(parsed.staleness_days, 7);
    }
}
