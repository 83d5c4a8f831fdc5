//! Event Script Replay
//!
//! Scripts are JSON lines, one [`PadEvent`] per line, in timestamp order.
//! Blank lines and lines starting with `#` are skipped.
//!
//! [`replay`] runs a script on a virtual clock: time jumps from deadline to
//! deadline and from event to event, so a script replays instantly and
//! deterministically. [`replay_realtime`] feeds the same script to an
//! [`EngineDriver`] with real sleeps between events.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info};

use crate::driver::EngineDriver;
use crate::engine::error::report;
use crate::engine::pad::{PadEvent, RemotePad};
use crate::engine::timer::Millis;
use crate::engine::transport::{CommandTransport, RecordingTransport, TransportEvent};

/// One emitted command or haptic with its emission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedOutput {
    /// Virtual time of emission
    pub at_ms: Millis,
    /// What was emitted
    #[serde(flatten)]
    pub output: TransportEvent,
}

/// Result of a virtual-clock replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    /// Emitted commands and haptics
    pub outputs: Vec<TimedOutput>,
    /// Events handled
    pub events: usize,
    /// Events rejected with an error
    pub errors: usize,
    /// Virtual time at the end of the replay
    pub end_ms: Millis,
}

/// Parse a JSON-lines script
pub fn parse_script<R: BufRead>(reader: R) -> Result<Vec<PadEvent>> {
    let mut events = Vec::new();
    let mut last_ms = 0;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read script line {}", line_no))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event: PadEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("Invalid event on script line {}", line_no))?;
        if event.timestamp_ms() < last_ms {
            anyhow::bail!(
                "Event on script line {} goes back in time ({} < {})",
                line_no,
                event.timestamp_ms(),
                last_ms
            );
        }
        last_ms = event.timestamp_ms();
        events.push(event);
    }

    debug!("Parsed {} script events", events.len());
    Ok(events)
}

/// Replay `events` on a virtual clock, then let pending timers run for
/// `settle_ms` after the last event
pub fn replay<I>(
    pad: &mut RemotePad<RecordingTransport>,
    events: I,
    settle_ms: Millis,
) -> ReplayReport
where
    I: IntoIterator<Item = PadEvent>,
{
    let mut report_out = ReplayReport::default();

    for event in events {
        let at = event.timestamp_ms();
        advance_to(pad, at, &mut report_out.outputs);

        report_out.events += 1;
        if let Err(e) = pad.handle_event(event) {
            report(&e);
            report_out.errors += 1;
        }
        collect(pad, at, &mut report_out.outputs);
        report_out.end_ms = at;
    }

    let end = report_out.end_ms.saturating_add(settle_ms);
    advance_to(pad, end, &mut report_out.outputs);
    report_out.end_ms = end;

    info!(
        "Replayed {} events ({} errors), {} outputs",
        report_out.events,
        report_out.errors,
        report_out.outputs.len()
    );
    report_out
}

/// Fire timers one deadline at a time up to `until`
fn advance_to(
    pad: &mut RemotePad<RecordingTransport>,
    until: Millis,
    outputs: &mut Vec<TimedOutput>,
) {
    while let Some(deadline) = pad.next_deadline().filter(|d| *d <= until) {
        pad.fire_due(deadline);
        collect(pad, deadline, outputs);
    }
}

fn collect(
    pad: &mut RemotePad<RecordingTransport>,
    at_ms: Millis,
    outputs: &mut Vec<TimedOutput>,
) {
    outputs.extend(
        pad.transport_mut()
            .drain()
            .into_iter()
            .map(|output| TimedOutput { at_ms, output }),
    );
}

/// Replay `events` through a realtime driver, sleeping until each event's
/// timestamp. Returns the pad once `settle_ms` has passed after the last event.
pub async fn replay_realtime<T>(
    pad: RemotePad<T>,
    events: Vec<PadEvent>,
    settle_ms: Millis,
) -> Result<RemotePad<T>>
where
    T: CommandTransport + Send + 'static,
{
    let (driver, handle) = EngineDriver::new(pad, events.len().max(16));
    let task = tokio::spawn(driver.run());
    let origin = Instant::now();
    let mut last_ms = 0;

    for event in events {
        last_ms = event.timestamp_ms();
        sleep_until(origin + Duration::from_millis(last_ms)).await;
        handle.send(event).await?;
    }

    sleep_until(origin + Duration::from_millis(last_ms.saturating_add(settle_ms))).await;
    // Closing the channel lets the driver drain queued events and stop
    drop(handle);

    task.await.context("Engine driver task failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::transport::{Command, HapticKind, MouseButton};

    const SCRIPT: &str = r#"
# two quick taps, then a long hold
{"event":"pointer","pointer_id":1,"target":"trackpad","phase":"down","x":10,"y":10,"timestamp_ms":0}
{"event":"pointer","pointer_id":1,"target":"trackpad","phase":"up","x":10,"y":10,"timestamp_ms":90}

{"event":"pointer","pointer_id":1,"target":"trackpad","phase":"down","x":10,"y":10,"timestamp_ms":1000}
{"event":"pointer","pointer_id":1,"target":"trackpad","phase":"up","x":10,"y":10,"timestamp_ms":1800}
"#;

    fn pad() -> RemotePad<RecordingTransport> {
        Config::default_config()
            .unwrap()
            .build_pad(RecordingTransport::new())
            .unwrap()
    }

    #[test]
    fn test_parse_script_skips_comments() {
        let events = parse_script(SCRIPT.as_bytes()).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].timestamp_ms(), 1800);
    }

    #[test]
    fn test_parse_script_reports_line() {
        let script = "{\"event\":\"mode\",\"mode\":\"a\",\"timestamp_ms\":0}\nnot json\n";
        let err = parse_script(script.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_script_rejects_time_travel() {
        let script = concat!(
            "{\"event\":\"mode\",\"mode\":\"a\",\"timestamp_ms\":50}\n",
            "{\"event\":\"mode\",\"mode\":\"b\",\"timestamp_ms\":10}\n",
        );
        assert!(parse_script(script.as_bytes()).is_err());
    }

    #[test]
    fn test_replay_timestamps_outputs() {
        let mut pad = pad();
        let events = parse_script(SCRIPT.as_bytes()).unwrap();
        let report = replay(&mut pad, events, 0);

        assert_eq!(report.events, 4);
        assert_eq!(report.errors, 0);
        assert_eq!(
            report.outputs,
            vec![
                TimedOutput {
                    at_ms: 90,
                    output: TransportEvent::Command(Command::Click {
                        button: MouseButton::Left
                    }),
                },
                TimedOutput {
                    at_ms: 90,
                    output: TransportEvent::Haptic(HapticKind::Normal),
                },
                TimedOutput {
                    at_ms: 1500,
                    output: TransportEvent::Command(Command::DoubleClick {
                        button: MouseButton::Left
                    }),
                },
                TimedOutput {
                    at_ms: 1500,
                    output: TransportEvent::Haptic(HapticKind::Long),
                },
            ]
        );
    }

    #[test]
    fn test_settle_runs_pending_timers() {
        let mut pad = pad();
        let events = parse_script(
            r#"{"event":"pointer","pointer_id":1,"target":"trackpad","phase":"down","timestamp_ms":0}"#
                .as_bytes(),
        )
        .unwrap();

        let report = replay(&mut pad, events.clone(), 100);
        assert!(report.outputs.is_empty());

        let mut pad = self::pad();
        let report = replay(&mut pad, events, 1000);
        assert_eq!(report.end_ms, 1000);
        assert_eq!(report.outputs[0].at_ms, 500);
    }

    #[test]
    fn test_timed_output_json() {
        let output = TimedOutput {
            at_ms: 7,
            output: TransportEvent::Command(Command::Scroll { dx: 0, dy: 1 }),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(
            json,
            r#"{"at_ms":7,"command":{"command":"scroll","dx":0,"dy":1}}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_replay_matches_virtual() {
        let events = parse_script(SCRIPT.as_bytes()).unwrap();
        let pad = replay_realtime(pad(), events, 0).await.unwrap();

        assert_eq!(
            pad.transport().commands(),
            vec![
                Command::Click {
                    button: MouseButton::Left
                },
                Command::DoubleClick {
                    button: MouseButton::Left
                },
            ]
        );
    }
}
