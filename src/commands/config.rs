//! `converge config` - show where settings come from

use anyhow::Result;

use crate::config;
use crate::paths;
use crate::ui;

pub fn run() -> Result<()> {
    ui::header("Configuration");

    let dir = paths::config_dir()?;
    let file = paths::config_file()?;
    println!();
    ui::kv("Config directory", &dir.display().to_string());
    if file.exists() {
        ui::kv("Config file", &file.display().to_string());
    } else {
        ui::kv("Config file", &format!("{} (not found, using defaults)", file.display()));
    }
    println!();

    let settings = config::load()?;
    ui::info("Effective settings");
    for line in toml::to_string_pretty(&settings)?.lines() {
        ui::dim(line);
    }

    println!();
    ui::dim(&format!("Set {} to use another directory.", paths::ENV_CONFIG_DIR));
    Ok(())
}
