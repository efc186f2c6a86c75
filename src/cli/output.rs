//! CLI output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::auth::{AuthPhase, User};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn warn(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Format a session phase as a colored string
pub fn format_phase(phase: AuthPhase) -> String {
    match phase {
        AuthPhase::Authenticated => phase.to_string().green().to_string(),
        AuthPhase::Loading => phase.to_string().yellow().to_string(),
        AuthPhase::Unauthenticated => phase.to_string().red().to_string(),
    }
}

/// Describe a user on one line
pub fn describe_user(user: &User) -> String {
    let name = if user.name.is_empty() {
        user.email.as_str()
    } else {
        user.name.as_str()
    };
    format!("{} <{}> ({})", name, user.email, user.role)
}

/// Snapshot of the local session for `screener status`
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub phase: AuthPhase,
    pub user: Option<User>,
    /// Access token expiry (RFC 3339)
    pub expires_at: Option<String>,
    pub expires_in_secs: Option<i64>,
    pub should_refresh: bool,
    pub has_refresh_token: bool,
    pub remembered: bool,
}

/// Print the session status as a table
pub fn print_status_table(report: &StatusReport) {
    let phase_color = match report.phase {
        AuthPhase::Authenticated => Color::Green,
        AuthPhase::Loading => Color::Yellow,
        AuthPhase::Unauthenticated => Color::Red,
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Field").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        Cell::new("Status"),
        Cell::new(report.phase.to_string()).fg(phase_color),
    ]);

    match &report.user {
        Some(user) => {
            table.add_row(vec![Cell::new("User"), Cell::new(describe_user(user))]);
            table.add_row(vec![Cell::new("User ID"), Cell::new(&user.id)]);
            table.add_row(vec![
                Cell::new("Permissions"),
                Cell::new(if user.permissions.is_empty() {
                    "-".to_string()
                } else {
                    user.permissions.join(", ")
                }),
            ]);
        }
        None => {
            table.add_row(vec![Cell::new("User"), Cell::new("-")]);
        }
    }

    let expiry = match (&report.expires_at, report.expires_in_secs) {
        (Some(at), Some(secs)) if secs > 0 => format!("{} (in {}s)", at, secs),
        (Some(at), Some(_)) => format!("{} (expired)", at),
        _ => "-".to_string(),
    };
    table.add_row(vec![Cell::new("Access token expires"), Cell::new(expiry)]);
    table.add_row(vec![
        Cell::new("Refresh due"),
        Cell::new(yes_no(report.should_refresh)),
    ]);
    table.add_row(vec![
        Cell::new("Refresh token"),
        Cell::new(yes_no(report.has_refresh_token)),
    ]);
    table.add_row(vec![
        Cell::new("Remembered"),
        Cell::new(yes_no(report.remembered)),
    ]);

    println!("{table}");
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
