//! Shared styling utilities for console output.

use console::Style;

use gitp4sync_core::models::SyncDirection;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Prefix for actions that were only planned.
pub fn dry_run_tag() -> String {
    let style = Style::new().magenta();
    style.apply_to("[dry-run]").to_string()
}

/// Direction label: blue for P4 → Git, green for Git → P4.
pub fn direction(direction: SyncDirection) -> String {
    match direction {
        SyncDirection::Forward => Style::new().blue().bold().apply_to("P4 → Git").to_string(),
        SyncDirection::Reverse => Style::new().green().bold().apply_to("Git → P4").to_string(),
    }
}
