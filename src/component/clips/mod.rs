//! 剪輯產生
//!
//! 每個單選場景一個輸出檔，每個群組一個串接輸出檔；
//! 預設逐一執行，因為每次外部編碼本身就吃滿資源。

mod generator;

pub use generator::ClipEncoder;
