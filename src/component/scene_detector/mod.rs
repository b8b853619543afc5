//! 場景邊界偵測
//!
//! 以 ffmpeg scdet 濾鏡做內容偵測，輸出不重疊且涵蓋全片的
//! 場景清單，並為選擇介面準備縮圖。

mod detector;
mod scene;
mod thumbnails;

pub use detector::{SceneDetectorConfig, detect_scenes};
pub use scene::Scene;
pub use thumbnails::extract_selection_thumbnails;
