use crate::component::session::{OperationKind, OperationRecord, OperationStatus, Session};
use crate::tools::{OutputKind, write_atomic};
use anyhow::Result;
use chrono::Utc;
use std::fmt::Write as _;
use std::path::Path;

/// 依作業日誌統計的分類結果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CategoryTally {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OperationTally {
    pub clips: CategoryTally,
    pub groups: CategoryTally,
    pub stills: CategoryTally,
}

#[must_use]
pub fn tally_operations(records: &[OperationRecord]) -> OperationTally {
    let mut tally = OperationTally::default();

    for record in records {
        let category = match &record.kind {
            OperationKind::EncodeClip { .. } => &mut tally.clips,
            OperationKind::EncodeGroup { .. } => &mut tally.groups,
            OperationKind::ExtractStill { .. } => &mut tally.stills,
            _ => continue,
        };
        match record.status {
            OperationStatus::Completed => category.completed += 1,
            OperationStatus::Failed => category.failed += 1,
            _ => {}
        }
    }
    tally
}

/// 把處理摘要寫進輸出根目錄
pub fn write_process_log(
    target: &Path,
    session: &Session,
    records: &[OperationRecord],
) -> Result<()> {
    let tally = tally_operations(records);
    let mut content = String::new();
    let line = "=".repeat(70);
    let thin = "-".repeat(70);

    let _ = writeln!(content, "{line}");
    let _ = writeln!(content, "影片封存處理紀錄");
    let _ = writeln!(content, "{line}");
    let _ = writeln!(content);
    let _ = writeln!(content, "作品名稱: {}", session.artwork_name);
    let _ = writeln!(content, "專案日期: {}", session.project_date);
    let _ = writeln!(content, "工作階段: {}", session.session_id);
    let _ = writeln!(content, "母帶來源: {}", session.master_path.display());
    let _ = writeln!(content, "編碼後端: {}", session.backend);
    let _ = writeln!(
        content,
        "產生時間: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(content);

    let _ = writeln!(content, "{thin}");
    let _ = writeln!(content, "摘要");
    let _ = writeln!(content, "{thin}");
    let _ = writeln!(
        content,
        "作業進度: {}/{}",
        session.completed_operations, session.total_operations
    );
    let _ = writeln!(
        content,
        "剪輯: 成功 {} / 失敗 {}",
        tally.clips.completed, tally.clips.failed
    );
    let _ = writeln!(
        content,
        "群組: 成功 {} / 失敗 {}",
        tally.groups.completed, tally.groups.failed
    );
    let _ = writeln!(
        content,
        "靜態圖: 成功 {} / 失敗 {}",
        tally.stills.completed, tally.stills.failed
    );

    if !session.warnings.is_empty() {
        let _ = writeln!(content);
        let _ = writeln!(content, "警告:");
        for warning in &session.warnings {
            let _ = writeln!(content, "  - {warning}");
        }
    }

    let _ = writeln!(content);
    let _ = writeln!(content, "{thin}");
    let _ = writeln!(content, "作業明細");
    let _ = writeln!(content, "{thin}");

    for record in records {
        let status = match record.status {
            OperationStatus::Completed => "成功",
            OperationStatus::Failed => "失敗",
            OperationStatus::Skipped => "跳過",
            OperationStatus::Pending => "等待",
            OperationStatus::Processing => "進行中",
        };
        let _ = writeln!(
            content,
            "[{:03}] {:<24} {} ({:.1}s)",
            record.sequence, record.name, status, record.duration_seconds
        );
        if let Some(error) = &record.error_detail {
            let _ = writeln!(content, "      錯誤: {error}");
        }
        for output in &record.output_files {
            let _ = writeln!(content, "      輸出: {}", output.display());
        }
    }

    let _ = writeln!(content);
    let _ = writeln!(content, "{line}");

    write_atomic(target, OutputKind::Text, |tmp| {
        std::fs::write(tmp, &content)?;
        Ok(())
    })
}
