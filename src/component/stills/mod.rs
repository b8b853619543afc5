//! 靜態圖擷取
//!
//! 對選擇範圍內的每個場景，在中點擷取一幀，同時輸出封存
//! PNG 與網頁 JPEG。單位平行執行、彼此獨立，失敗不會中斷
//! 整個工作階段。

mod extractor;
mod metadata;

pub use extractor::{StillOutcome, StillTask, StillsContext, extract_stills_parallel};
pub use metadata::ProvenanceMetadata;
