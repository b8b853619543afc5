use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 偵測出的場景區間
///
/// 偵測完成後不再變動；同一組（來源、閾值、最短長度）
/// 輸入永遠產生相同的場景清單與編號。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// 1 起算的場景編號，依時間順序
    pub index: usize,
    pub start_frame: u64,
    pub end_frame: u64,
    /// 起點（秒），含
    pub start_time: f64,
    /// 終點（秒），不含
    pub end_time: f64,
    /// 選擇介面用的縮圖，擷取失敗時為 None
    pub thumbnail_path: Option<PathBuf>,
}

impl Scene {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// 代表時間點：場景中點
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        self.start_time + self.duration() / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint() {
        let scene = Scene {
            index: 1,
            start_frame: 0,
            end_frame: 250,
            start_time: 10.0,
            end_time: 20.0,
            thumbnail_path: None,
        };
        assert!((scene.duration() - 10.0).abs() < f64::EPSILON);
        assert!((scene.midpoint() - 15.0).abs() < f64::EPSILON);
    }
}
