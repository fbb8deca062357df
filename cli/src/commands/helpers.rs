use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::process;

use macrolog_core::models::{User, parse_entry_time, parse_log_date};
use macrolog_core::service::MacroService;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => parse_log_date(&s).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Entry time as `HH:MM`, defaulting to the current local time.
pub(crate) fn parse_time(time: Option<String>) -> Result<String> {
    match time {
        None => Ok(Local::now().format("%H:%M").to_string()),
        Some(t) => {
            let parsed = parse_entry_time(t.trim())?;
            Ok(parsed.format("%H:%M").to_string())
        }
    }
}

/// Look up the acting user, exiting with status 2 when it does not exist.
pub(crate) fn resolve_user(svc: &MacroService, username: &str, json: bool) -> Result<User> {
    if let Some(user) = svc.user_by_name(username)? {
        return Ok(user);
    }
    exit_not_found(
        &format!("User '{username}' not found. Create it with `macrolog user add`"),
        json,
    )
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
