//! Daemon logging setup, grounded on the teacher's `src-tauri/src/log.rs`
//! (`simplelog` + the `log` facade), reduced to the daemon's needs: one
//! terminal logger, no split backend/frontend files, since `transwacomd`
//! has no frontend to separate logs from.

use anyhow::{Context, Result};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

pub fn setup_logger(verbose: bool) -> Result<()> {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let config = ConfigBuilder::new()
        .set_time_offset_to_local()
        .unwrap()
        .build();

    TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto)
        .context("failed to initialize terminal logger")?;
    log::info!("transwacomd logging initialized at {level}");
    Ok(())
}
