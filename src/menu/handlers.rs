use crate::component::pipeline::{
    NewSessionRequest, Pipeline, ProgressHandle, RunSummary, SessionSnapshot,
};
use crate::component::scene_detector::Scene;
use crate::component::selection::Selection;
use crate::component::session::{OperationStatus, Session, SessionStatus, SessionStore};
use crate::config::Config;
use anyhow::Result;
use console::{Term, style};
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use log::error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// 開始新的封存處理
pub fn run_new_session(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &Config,
) -> Result<()> {
    shutdown_signal.store(false, Ordering::SeqCst);
    println!("{}", style("=== 新的封存處理 ===").cyan().bold());

    let artwork_name: String = Input::new()
        .with_prompt("請輸入作品名稱")
        .interact_text()?;
    let default_date = chrono::Local::now().format("%y-%m-%d").to_string();
    let project_date: String = Input::new()
        .with_prompt("請輸入專案日期 (YY-MM-DD)")
        .default(default_date)
        .interact_text()?;
    let master_path: String = Input::new()
        .with_prompt("請輸入母帶檔案路徑")
        .interact_text()?;
    let output_root: String = Input::new()
        .with_prompt("請輸入輸出根目錄")
        .interact_text()?;

    let store = SessionStore::open(&config.settings.state_dir)?;
    let progress = ProgressHandle::new();
    let pipeline = Pipeline::new(
        &store,
        &config.settings,
        Arc::clone(shutdown_signal),
        progress.clone(),
    );

    println!(
        "{}",
        style("驗證母帶、最佳化與場景偵測中，可能需要一段時間...").dim()
    );

    let mut session = match pipeline.prepare(NewSessionRequest {
        artwork_name: artwork_name.trim().to_string(),
        project_date: project_date.trim().to_string(),
        master_path: master_path.trim().into(),
        output_root: output_root.trim().into(),
    }) {
        Ok(session) => session,
        Err(e) => {
            error!("前置作業失敗: {e}");
            println!("{} {e}", style("✗ 前置作業失敗:").red().bold());
            return Ok(());
        }
    };

    println!(
        "{}",
        style(format!("偵測到 {} 個場景", session.scenes.len())).green()
    );
    print_scene_table(&session.scenes);

    let selection = prompt_selection(term, &session.scenes)?;
    if selection.is_empty() {
        println!(
            "{}",
            style("未選擇任何場景，將只保留母帶輸出與處理紀錄").yellow()
        );
    }

    if let Err(e) = pipeline.attach_selection(&mut session, selection) {
        println!("{} {e}", style("✗").red().bold());
        return Ok(());
    }

    execute_with_status(pipeline, session, &progress)
}

/// 恢復最近一次中斷的工作階段
pub fn run_resume_latest(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &Config,
) -> Result<()> {
    shutdown_signal.store(false, Ordering::SeqCst);
    println!("{}", style("=== 恢復工作階段 ===").cyan().bold());

    let store = SessionStore::open(&config.settings.state_dir)?;
    let progress = ProgressHandle::new();
    let pipeline = Pipeline::new(
        &store,
        &config.settings,
        Arc::clone(shutdown_signal),
        progress.clone(),
    );

    let Some(session) = pipeline.find_resumable()? else {
        println!("{}", style("找不到可恢復的工作階段").yellow());
        return Ok(());
    };

    println!("  工作階段: {}", session.session_id);
    println!("  作品: {}", session.artwork_name);
    println!(
        "  進度: {}/{} ({})",
        session.completed_operations, session.total_operations, session.status
    );
    println!("  最後更新: {}", session.updated_at.format("%Y-%m-%d %H:%M:%S"));

    let resume = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("要恢復這個工作階段嗎？")
        .default(true)
        .interact_on(term)?;
    if !resume {
        return Ok(());
    }

    execute_with_status(pipeline, session, &progress)
}

/// 在背景執行管線，前景輪詢進度快照並重繪狀態
fn execute_with_status(
    pipeline: Pipeline<'_>,
    mut session: Session,
    progress: &ProgressHandle,
) -> Result<()> {
    let status_term = Term::buffered_stdout();

    let outcome = thread::scope(|scope| {
        let worker = scope.spawn(|| pipeline.run(&mut session));

        let mut last_render_lines = 0usize;
        while !worker.is_finished() {
            render_status(&status_term, progress, &mut last_render_lines);
            thread::sleep(Duration::from_millis(500));
        }
        let _ = status_term.clear_last_lines(last_render_lines);
        let _ = status_term.flush();

        worker.join()
    });

    match outcome {
        Ok(Ok(summary)) => print_summary(&summary),
        Ok(Err(e)) => {
            error!("工作階段執行失敗: {e}");
            println!("{} {e}", style("✗ 處理失敗:").red().bold());
        }
        Err(_) => anyhow::bail!("處理執行緒異常結束"),
    }

    Ok(())
}

fn render_status(term: &Term, progress: &ProgressHandle, last_render_lines: &mut usize) {
    let Some(snapshot) = progress.snapshot() else {
        return;
    };

    let lines = status_lines(&snapshot);

    let _ = term.clear_last_lines(*last_render_lines);
    for line in &lines {
        let _ = term.write_line(line);
    }
    let _ = term.flush();
    *last_render_lines = lines.len();
}

fn status_lines(snapshot: &SessionSnapshot) -> Vec<String> {
    let mut lines = vec![format!(
        "[{}] 進度: {}/{} | 目前作業: {}",
        snapshot.status,
        snapshot.completed_operations,
        snapshot.total_operations,
        snapshot.current_operation.as_deref().unwrap_or("-")
    )];

    for op in &snapshot.recent_operations {
        let mark = match op.status {
            OperationStatus::Completed => style("✓").green().to_string(),
            OperationStatus::Failed => style("✗").red().to_string(),
            _ => style("…").dim().to_string(),
        };
        lines.push(format!("  {mark} {}", op.name));
    }
    lines
}

fn print_scene_table(scenes: &[Scene]) {
    for scene in scenes {
        println!(
            "  {:>3}. {} - {}  ({:.1}s)",
            scene.index,
            format_seconds(scene.start_time),
            format_seconds(scene.end_time),
            scene.duration()
        );
    }
    println!();
}

/// 互動式場景選擇：先單選、再建群組
fn prompt_selection(term: &Term, scenes: &[Scene]) -> Result<Selection> {
    let mut selection = Selection::new(scenes.len());

    let items: Vec<String> = scenes
        .iter()
        .map(|scene| {
            format!(
                "場景 {:02}  {} - {}  ({:.1}s)",
                scene.index,
                format_seconds(scene.start_time),
                format_seconds(scene.end_time),
                scene.duration()
            )
        })
        .collect();

    let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("選擇要單獨輸出的場景（空白鍵勾選，Enter 確認）")
        .items(&items)
        .interact_on(term)?;

    for position in chosen {
        if let Err(e) = selection.select(scenes[position].index) {
            println!("{} {e}", style("✗").red());
        }
    }

    loop {
        let input: String = Input::new()
            .with_prompt("建立群組（場景編號以逗號分隔，直接 Enter 結束）")
            .allow_empty(true)
            .interact_text()?;
        let trimmed = input.trim();
        if trimmed.is_empty() {
            break;
        }

        let indices: std::result::Result<Vec<usize>, _> = trimmed
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect();

        match indices {
            Ok(indices) => match selection.group(&indices) {
                Ok(id) => println!(
                    "{}",
                    style(format!("已建立群組 {id}: {indices:?}")).green()
                ),
                Err(e) => println!("{} {e}", style("✗").red()),
            },
            Err(_) => println!("{}", style("✗ 無法解析場景編號").red()),
        }
    }

    Ok(selection)
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", style("=== 處理摘要 ===").cyan().bold());

    let status_label = match summary.status {
        SessionStatus::Completed => style("完成").green().bold().to_string(),
        SessionStatus::Paused => style("已暫停（可恢復）").yellow().bold().to_string(),
        other => style(other.to_string()).red().bold().to_string(),
    };
    println!("  狀態: {status_label}");

    println!(
        "  剪輯: 成功 {} / 失敗 {}",
        style(summary.tally.clips.completed).green(),
        summary.tally.clips.failed
    );
    println!(
        "  群組: 成功 {} / 失敗 {}",
        style(summary.tally.groups.completed).green(),
        summary.tally.groups.failed
    );
    println!(
        "  靜態圖: 成功 {} / 失敗 {}",
        style(summary.tally.stills.completed).green(),
        summary.tally.stills.failed
    );

    if !summary.warnings.is_empty() {
        println!();
        for warning in &summary.warnings {
            println!("  {} {warning}", style("!").yellow().bold());
        }
    }

    if let Some(error) = &summary.error_message {
        println!("  {} {error}", style("錯誤:").red().bold());
    }

    println!("  輸出位置: {}", summary.output_root.display());
}

/// 秒數轉 HH:MM:SS
fn format_seconds(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{h:02}:{m:02}:{s:02}")
}
