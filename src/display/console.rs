//! Terminal rendering of the dashboard state.

use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::OutputFormat;
use crate::monitor::{Severity, Snapshot};

use super::{DashboardState, TransientError};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Serialize)]
struct JsonFrame<'a> {
    snapshot: Option<&'a Snapshot>,
    transient_error: Option<&'a TransientError>,
    published: u64,
}

pub fn render_json(state: &DashboardState) -> Result<String> {
    let frame = JsonFrame {
        snapshot: state.last.as_deref(),
        transient_error: state.transient_error.as_ref(),
        published: state.published,
    };
    Ok(serde_json::to_string(&frame)?)
}

pub fn render_text(state: &DashboardState) -> String {
    let mut out = String::new();

    let Some(snapshot) = state.last.as_deref() else {
        let _ = writeln!(out, "Real-Time Respiratory Rate (RR) Monitoring");
        let _ = writeln!(out, "Waiting for readings...");
        push_error(&mut out, state.transient_error.as_ref());
        return out;
    };

    let _ = writeln!(out, "Real-Time Respiratory Rate (RR) Monitoring");
    let _ = writeln!(out, "{}", snapshot.timestamp_label);
    let _ = writeln!(
        out,
        "Live RR per minute: {:<6} Total RR: {}",
        snapshot.live_rate, snapshot.total_count
    );

    if let Some(alert) = &snapshot.alert {
        let tag = match alert.severity {
            Severity::Info => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        let _ = writeln!(
            out,
            "[{tag}] {} | Stored Count: {}",
            alert.headline(),
            alert.stored_rate
        );
    }
    push_error(&mut out, state.transient_error.as_ref());

    let _ = writeln!(
        out,
        "{:>6}  {:<25}  {:>6}  {:>9}  {:>16}  {}",
        "id", "timestamp", "count", "count_60s", "stored_count_60s", "prediction"
    );
    for r in &snapshot.table {
        let _ = writeln!(
            out,
            "{:>6}  {:<25}  {:>6}  {:>9}  {:>16}  {}",
            r.id,
            r.timestamp.to_rfc3339(),
            r.count,
            r.count_60s,
            r.stored_count_60s,
            r.prediction.map(|c| c.as_str()).unwrap_or("-")
        );
    }
    if snapshot.rejected > 0 {
        let _ = writeln!(out, "({} malformed records skipped)", snapshot.rejected);
    }

    let rates: Vec<u32> = snapshot.series.iter().map(|p| p.count_60s).collect();
    let _ = writeln!(
        out,
        "RR over time (Latest: {}): {}",
        snapshot.timestamp_label,
        sparkline(&rates)
    );
    out
}

fn push_error(out: &mut String, error: Option<&TransientError>) {
    if let Some(error) = error {
        let _ = writeln!(
            out,
            "(!) {} at {}: {}",
            error.kind,
            error.at.format("%H:%M:%S"),
            error.message
        );
    }
}

fn sparkline(values: &[u32]) -> String {
    let Some(max) = values.iter().copied().max() else {
        return String::new();
    };
    let min = values.iter().copied().min().unwrap_or(max);
    let span = (max - min).max(1) as usize;
    values
        .iter()
        .map(|v| SPARK[((v - min) as usize * (SPARK.len() - 1)) / span])
        .collect()
}

fn write_frame(
    out: &mut impl std::io::Write,
    format: OutputFormat,
    frame: &str,
) -> std::io::Result<()> {
    if matches!(format, OutputFormat::Text) {
        write!(out, "\x1b[2J\x1b[H")?;
    }
    out.write_all(frame.as_bytes())?;
    out.flush()
}

/// Redraws whenever the dashboard changes until cancelled.
pub async fn render_loop(
    mut rx: watch::Receiver<DashboardState>,
    format: OutputFormat,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    log_info!("dashboard publisher gone; renderer exiting");
                    break;
                }
                let state = rx.borrow_and_update().clone();
                let frame = match format {
                    OutputFormat::Text => Ok(render_text(&state)),
                    OutputFormat::Json => render_json(&state).map(|line| line + "\n"),
                };
                match frame {
                    Ok(frame) => {
                        if let Err(err) = write_frame(&mut std::io::stdout().lock(), format, &frame) {
                            log_warn!("stdout closed, renderer exiting: {err}");
                            break;
                        }
                    }
                    Err(err) => log_error!("failed to render dashboard: {err:?}"),
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::Category;
    use crate::monitor::testing::{reading, ts};
    use crate::monitor::RetainedState;

    fn state() -> DashboardState {
        let retained = RetainedState {
            stored_rate: 8,
            category: Category::Bradypnea,
            timestamp: ts(4),
        };
        let snapshot = Snapshot::assemble(
            vec![reading(5, 0, None), reading(4, 8, Some(Category::Bradypnea))],
            Some(retained),
            0,
        )
        .unwrap();
        DashboardState {
            last: Some(Arc::new(snapshot)),
            transient_error: None,
            published: 1,
        }
    }

    #[test]
    fn text_shows_metrics_alert_and_table() {
        let text = render_text(&state());
        assert!(text.contains("Monday, March 10, 2025 | 08:00:05"));
        assert!(text.contains("Live RR per minute: 0"));
        assert!(text.contains(
            "[CRITICAL] CRITICAL ALERT (2025-03-10 08:00:04): Bradypnea detected! | Stored Count: 8"
        ));
        assert!(text.contains("Bradypnea\n"));
        assert!(text.contains("RR over time (Latest: Monday, March 10, 2025 | 08:00:05): "));
    }

    struct BrokenPipe;

    impl std::io::Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_surface_to_the_renderer() {
        let err = write_frame(&mut BrokenPipe, OutputFormat::Json, "{}\n").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

        let mut buf = Vec::new();
        write_frame(&mut buf, OutputFormat::Text, "frame").unwrap();
        assert_eq!(buf, b"\x1b[2J\x1b[Hframe");
    }

    #[test]
    fn text_before_first_snapshot_shows_waiting() {
        let text = render_text(&DashboardState::default());
        assert!(text.contains("Waiting for readings"));
    }

    #[test]
    fn json_frame_has_snapshot_and_severity() {
        let line = render_json(&state()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["snapshot"]["alert"]["severity"], "critical");
        assert_eq!(value["snapshot"]["table"][1]["prediction"], "Bradypnea");
        assert_eq!(value["snapshot"]["series"][0]["count_60s"], 8);
        assert!(value["transient_error"].is_null());
    }

    #[test]
    fn sparkline_spans_range() {
        assert_eq!(sparkline(&[]), "");
        assert_eq!(sparkline(&[10, 10]), "▁▁");
        assert_eq!(sparkline(&[0, 7, 14]), "▁▄█");
    }
}
