//! Run summary report

use can_log_postproc::RunSummary;
use chrono::{DateTime, Utc};
use std::fmt::Write;

const RULE: &str = "═══════════════════════════════════════════════";

/// Render the end-of-run summary as plain text
pub fn render(summary: &RunSummary, started: DateTime<Utc>, finished: DateTime<Utc>) -> String {
    let mut out = String::new();
    let elapsed = finished.signed_duration_since(started);

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  CAN Log Post-Processor - Run Summary");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  Started:        {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(
        out,
        "  Duration:       {}.{:03} s",
        elapsed.num_seconds(),
        elapsed.num_milliseconds().rem_euclid(1000)
    );
    let _ = writeln!(out, "  Custom files:   {}", summary.custom_files);
    let _ = writeln!(out, "  Event files:    {}", summary.event_files);
    let _ = writeln!(out, "  Notifications:  {}", summary.notifications);
    let _ = writeln!(out, "  Uploaded files: {}", summary.uploaded);
    let _ = write!(out, "{}", RULE);
    out
}
