use crate::config::Config;
use crate::config::save::save_settings;
use crate::menu::handlers::{run_new_session, run_resume_latest};
use anyhow::Result;
use console::{Term, style};
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub fn show_main_menu(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style("=== 影片封存準備工具 ===").cyan().bold());
    println!("{}", style("按 ESC 離開").dim());

    let options = vec![
        "開始新的封存處理",
        "繼續上次的工作階段",
        "設定",
        "離開",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("請選擇功能")
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => {
            run_new_session(term, shutdown_signal, config)?;
            pause(term)?;
            Ok(true)
        }
        Some(1) => {
            run_resume_latest(term, shutdown_signal, config)?;
            pause(term)?;
            Ok(true)
        }
        Some(2) => {
            show_settings_menu(term, config)?;
            Ok(true)
        }
        Some(3) | None => Ok(false), // ESC 也視為離開
        _ => unreachable!(),
    }
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style("=== 設定 ===").cyan().bold());
        println!("{}", style("按 ESC 返回").dim());

        let settings = &config.settings;
        let options = vec![
            format!("靜態圖工作執行緒: {}", settings.stills_workers),
            format!(
                "版權宣告: {}",
                if settings.copyright_holder.is_empty() {
                    "(未設定)"
                } else {
                    &settings.copyright_holder
                }
            ),
            format!("場景偵測閾值: {}", settings.scene_threshold),
            format!("最短場景長度: {} 幀", settings.min_scene_length),
            format!(
                "優先使用硬體編碼: {}",
                if settings.prefer_hardware { "是" } else { "否" }
            ),
            "返回".to_string(),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("請選擇要修改的設定")
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        match selection {
            Some(0) => {
                let value: usize = Input::new()
                    .with_prompt("靜態圖工作執行緒數")
                    .default(config.settings.stills_workers)
                    .interact_text()?;
                config.settings.stills_workers = value.max(1);
            }
            Some(1) => {
                let value: String = Input::new()
                    .with_prompt("版權宣告")
                    .with_initial_text(config.settings.copyright_holder.clone())
                    .allow_empty(true)
                    .interact_text()?;
                config.settings.copyright_holder = value.trim().to_string();
            }
            Some(2) => {
                let value: f64 = Input::new()
                    .with_prompt("場景偵測閾值（越高越不敏感）")
                    .default(config.settings.scene_threshold)
                    .interact_text()?;
                config.settings.scene_threshold = value;
            }
            Some(3) => {
                let value: u32 = Input::new()
                    .with_prompt("最短場景長度（幀）")
                    .default(config.settings.min_scene_length)
                    .interact_text()?;
                config.settings.min_scene_length = value.max(1);
            }
            Some(4) => {
                let value = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("優先使用硬體編碼？")
                    .default(config.settings.prefer_hardware)
                    .interact_on(term)?;
                config.settings.prefer_hardware = value;
            }
            Some(5) | None => break, // ESC 或返回
            _ => unreachable!(),
        }

        save_settings(&config.settings)?;
        println!("{}", style("設定已儲存").green());
    }

    Ok(())
}

fn pause(term: &Term) -> Result<()> {
    println!("\n{}", style("按 Enter 繼續...").dim());
    term.read_line()?;
    Ok(())
}
