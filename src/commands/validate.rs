//! `converge validate` - check a declaration file

use anyhow::Result;
use std::path::Path;

use crate::Context;
use crate::resource::{self, Backends};
use crate::ui;

pub fn run(ctx: &Context, file: &Path) -> Result<()> {
    let collection = resource::load(file, &Backends::default())?;

    if !ctx.quiet {
        ui::header(&file.display().to_string());
        for entry in collection.entries() {
            let actions: Vec<&str> = entry.actions.iter().map(|a| a.as_str()).collect();
            let note = if entry.ignore_failure { ", ignore_failure" } else { "" };
            ui::kv(&entry.provider.identity(), &format!("{}{note}", actions.join(", ")));
        }
        println!();
    }
    ui::success(&format!("{} resources valid", collection.len()));
    Ok(())
}
