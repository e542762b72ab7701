//! `converge apply` - converge declared resources

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ReportStatus, RunContext, RunOptions, RunReport, Runner};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config;
use crate::resource::{self, Backends};
use crate::ui::{self, ConsoleEvents};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut settings = config::load()?;
    settings.why_run |= args.why_run;

    let mut collection =
        resource::load(&args.file, &Backends::default())?.filter_by_target(args.target.as_deref());
    if collection.is_empty() {
        if !args.json {
            ui::warn("No resources to converge");
        }
        return Ok(());
    }

    let human = !args.json && !ctx.quiet;
    let why_run = settings.why_run;
    let mut run_ctx = RunContext::new(settings);
    if human {
        run_ctx = run_ctx.with_events(ConsoleEvents);
        let mode = if why_run { " (why-run)" } else { "" };
        ui::header(&format!("Converging {} resources{mode}", collection.len()));
    }

    let options = RunOptions {
        continue_on_failure: args.continue_on_failure,
    };
    let report = Runner::new(&run_ctx, options).converge(&mut collection);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if human {
        if ctx.verbose > 0 {
            print_diffs(&report);
        }
        print_summary(&report);
    }

    if !report.success() {
        bail!("{} resource action(s) failed", report.summary.failed);
    }
    Ok(())
}

fn print_diffs(report: &RunReport) {
    for (resource, diff) in report
        .reports
        .iter()
        .filter_map(|r| r.diff.as_ref().map(|d| (&r.resource, d)))
    {
        ui::header(&format!("Diff for {resource}"));
        for line in diff.lines() {
            let line = match line.chars().next() {
                Some('+') => line.green(),
                Some('-') => line.red(),
                _ => line.normal(),
            };
            println!("  {line}");
        }
    }
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    println!();
    if report.success() {
        let verb = if report.why_run { "would be updated" } else { "updated" };
        println!(
            "  {} {}/{} resources {}",
            "✓".green().bold(),
            summary.updated,
            summary.total(),
            verb
        );
    } else {
        println!("  {} Converge finished with errors", "⚠".yellow().bold());
    }

    if summary.up_to_date > 0 {
        println!("    • {} up to date", summary.up_to_date);
    }
    if summary.bypassed > 0 {
        println!("    • {} skipped in why-run mode", summary.bypassed);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
        for failure in report.failures() {
            if let ReportStatus::Failed { error, .. } = &failure.status {
                let note = if failure.ignored { " (ignored)" } else { "" };
                ui::dim(&format!("{} action {}: {error}{note}", failure.resource, failure.action));
            }
        }
    }
    if report.aborted {
        ui::dim("Run stopped at the first failure; use --continue-on-failure to keep going");
    }
}
