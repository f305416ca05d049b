// src/utils/log.rs

//! Formatting helpers on top of the `log` facade.

use crate::models::StatusSnapshot;
use crate::pipeline::format_percent;

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    ::log::info!("{}", border);
    ::log::info!("  {}", title);
    ::log::info!("{}", border);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    ::log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        ::log::info!("    {}: {}", key, value);
    }
}

/// Summary lines for one finished harvest.
pub fn status_items(status: &StatusSnapshot) -> Vec<(&'static str, String)> {
    let processed = (status.num_succeeded + status.num_failed) as i64;
    vec![
        ("Lifecycle", status.lifecycle.to_string()),
        ("Declared", declared(status.num_declared)),
        ("Succeeded", status.num_succeeded.to_string()),
        ("Failed", status.num_failed.to_string()),
        (
            "Success rate",
            format_percent(status.num_succeeded as i64, processed),
        ),
    ]
}

fn declared(count: i64) -> String {
    if count < 0 {
        "unknown".to_string()
    } else {
        count.to_string()
    }
}
