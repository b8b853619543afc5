use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 建立 Ctrl-C 暫停信號
///
/// 信號只會被設為 true，不會直接中止程序；
/// 管線會在下一個作業邊界安全暫停並保存狀態。
#[must_use]
pub fn setup_shutdown_signal() -> Arc<AtomicBool> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let signal_clone = Arc::clone(&shutdown_signal);

    ctrlc::set_handler(move || {
        signal_clone.store(true, Ordering::SeqCst);
        eprintln!("\n收到中斷信號，將在目前作業完成後暫停...");
    })
    .expect("無法設定 Ctrl-C 處理器");

    shutdown_signal
}
