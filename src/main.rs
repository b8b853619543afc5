use anyhow::Result;
use console::{Term, style};
use log::{info, warn};
use video_archive_prep::config::Config;
use video_archive_prep::menu::show_main_menu;
use video_archive_prep::signal::setup_shutdown_signal;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let term = Term::stdout();
    let shutdown_signal = setup_shutdown_signal();
    let mut config = Config::new()?;

    loop {
        match show_main_menu(&term, &shutdown_signal, &mut config) {
            Ok(true) => {}
            Ok(false) => {
                term.clear_screen()?;
                println!("\n{}", style("再見！").green().bold());
                info!("程式正常結束");
                break;
            }
            Err(e) => {
                warn!("程式錯誤: {e}");
                eprintln!("{} {}", style("錯誤:").red().bold(), e);
                break;
            }
        }
    }

    Ok(())
}
