use colored::Colorize;
use declarative::{Action, Error, EventSink};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Prefix for a change description, depending on why-run
pub fn change_line(change: &str, why_run: bool) -> String {
    if why_run {
        format!("Would {change}")
    } else {
        change.to_string()
    }
}

/// Prints convergence progress as it happens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleEvents;

impl EventSink for ConsoleEvents {
    fn action_start(&self, resource: &str, action: Action) {
        println!("  {} {} action {}", "*".cyan(), resource, action);
    }

    fn whyrun_assumption(&self, _resource: &str, _action: Action, message: &str) {
        println!("    {} {}", "⚠".yellow(), message.dimmed());
    }

    fn action_bypassed(&self, _resource: &str, _action: Action) {
        println!("    {}", "(skipped in why-run mode)".dimmed());
    }

    fn update_applied(&self, _resource: &str, _action: Action, changes: &[String], why_run: bool) {
        for change in changes {
            println!("    {} {}", "-".green(), change_line(change, why_run));
        }
    }

    fn up_to_date(&self, _resource: &str, _action: Action) {
        println!("    {}", "(up to date)".dimmed());
    }

    fn action_failed(&self, resource: &str, action: Action, error: &Error) {
        eprintln!("    {} {} action {}: {}", "✗".red(), resource, action, error);
    }
}
