//! Rendering round results for the terminal or as JSON

use fleetcmd_core::{ClusterResult, RoundReport};
use fleetcmd_exec::OutputBuffer;
use fleetcmd_exec::colors::{paint_error, paint_host, paint_ok, paint_strong};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HostReport<'a> {
    host: &'a str,
    ok: bool,
    error: Option<String>,
    exit_code: Option<i32>,
    signal: Option<i32>,
    timed_out: bool,
    stdout: &'a OutputBuffer,
    stderr: &'a OutputBuffer,
}

impl<'a> From<&'a ClusterResult> for HostReport<'a> {
    fn from(result: &'a ClusterResult) -> Self {
        let error = result.error.as_ref();
        Self {
            host: &result.host,
            ok: result.success(),
            error: error.map(ToString::to_string),
            exit_code: error.and_then(|e| e.exit_code()),
            signal: error.and_then(|e| e.signal()),
            timed_out: error.is_some_and(|e| e.is_timeout()),
            stdout: &result.output.stdout,
            stderr: &result.output.stderr,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    ok: bool,
    error: Option<String>,
    failed_host: Option<&'a str>,
    results: Vec<HostReport<'a>>,
}

/// Round report as pretty-printed JSON
///
/// # Errors
/// Returns error if serialization fails
pub fn to_json(report: &RoundReport) -> serde_json::Result<String> {
    let json = JsonReport {
        ok: report.is_success(),
        error: report.error.as_ref().map(ToString::to_string),
        failed_host: report.error.as_ref().map(|e| e.host.as_str()),
        results: report.results.iter().map(HostReport::from).collect(),
    };
    serde_json::to_string_pretty(&json)
}

/// One line per host followed by a totals line
#[must_use]
pub fn summary(report: &RoundReport, total_hosts: usize) -> String {
    let mut out = String::new();

    for result in &report.results {
        let status = match &result.error {
            None => paint_ok("ok"),
            Some(err) => paint_error(&err.to_string()),
        };
        out.push_str(&format!("{} {status}\n", paint_host(&result.host)));
    }

    let skipped = total_hosts.saturating_sub(report.results.len());
    let succeeded = report.results.iter().filter(|r| r.success()).count();
    let mut totals = format!("{succeeded}/{total_hosts} hosts succeeded");
    if skipped > 0 {
        totals.push_str(&format!(", {skipped} not attempted"));
    }
    out.push_str(&paint_strong(&totals));
    out.push('\n');

    out
}
