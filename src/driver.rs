//! Realtime Engine Driver
//!
//! Runs a [`RemotePad`] inside one tokio task against the tokio clock.
//!
//! ```text
//!   DriverHandle ──mpsc──> EngineDriver task
//!                            loop {
//!                              select! {
//!                                event        => restamp, pad.handle_event
//!                                sleep_until  => pad.fire_due
//!                                shutdown     => break
//!                              }
//!                            }
//! ```
//!
//! Events are restamped with the driver clock on arrival, so timer deadlines
//! and event timestamps share one time base.

use anyhow::{anyhow, Result};
use std::future::pending;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info};

use crate::engine::error::report;
use crate::engine::pad::{PadEvent, RemotePad};
use crate::engine::timer::Millis;
use crate::engine::transport::CommandTransport;
use crate::utils::metrics::{metric_names, Timer};

/// Sending side of a running driver
#[derive(Debug, Clone)]
pub struct DriverHandle {
    event_tx: mpsc::Sender<PadEvent>,
    shutdown_tx: mpsc::Sender<()>,
    origin: Instant,
}

impl DriverHandle {
    /// Queue an event
    pub async fn send(&self, event: PadEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| anyhow!("Engine driver is not running"))
    }

    /// Ask the driver to stop after the current step
    pub async fn shutdown(&self) {
        // Driver may already be gone
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Milliseconds on the driver clock
    pub fn elapsed_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Engine task state
pub struct EngineDriver<T: CommandTransport> {
    pad: RemotePad<T>,
    event_rx: mpsc::Receiver<PadEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    origin: Instant,
}

impl<T: CommandTransport> EngineDriver<T> {
    /// Create a driver and its handle. `capacity` bounds the event queue.
    pub fn new(pad: RemotePad<T>, capacity: usize) -> (Self, DriverHandle) {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let origin = Instant::now();

        let driver = Self {
            pad,
            event_rx,
            shutdown_rx,
            origin,
        };
        let handle = DriverHandle {
            event_tx,
            shutdown_tx,
            origin,
        };
        (driver, handle)
    }

    /// Run until every handle is dropped or shutdown is requested.
    /// Returns the pad for inspection.
    pub async fn run(self) -> RemotePad<T> {
        let EngineDriver {
            mut pad,
            mut event_rx,
            mut shutdown_rx,
            origin,
        } = self;
        let now_ms = || origin.elapsed().as_millis() as Millis;
        let metrics = pad.metrics();

        info!("Engine driver started");
        loop {
            let deadline = pad
                .next_deadline()
                .map(|ms| origin + Duration::from_millis(ms));
            let timer_due = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                maybe_event = event_rx.recv() => {
                    let Some(mut event) = maybe_event else {
                        debug!("Event channel closed");
                        break;
                    };
                    event.set_timestamp_ms(now_ms());
                    let timer = Timer::new();
                    if let Err(e) = pad.handle_event(event) {
                        report(&e);
                    }
                    metrics.record_histogram(metric_names::EVENT_HANDLING_US, timer.elapsed_us());
                }
                _ = timer_due => {
                    pad.fire_due(now_ms());
                }
                Some(()) = shutdown_rx.recv() => {
                    debug!("Engine driver shutting down");
                    break;
                }
            }
        }

        info!("Engine driver stopped, {} timers pending", pad.pending_timers());
        pad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::pad::{PointerEvent, PointerPhase, PointerTarget};
    use crate::engine::session::Position;
    use crate::engine::transport::{Command, MouseButton, RecordingTransport};

    fn pointer(target: PointerTarget, phase: PointerPhase) -> PadEvent {
        PadEvent::Pointer(PointerEvent {
            pointer_id: 1,
            target,
            phase,
            position: Position::new(50.0, 50.0),
            timestamp_ms: 0,
        })
    }

    fn driver() -> (EngineDriver<RecordingTransport>, DriverHandle) {
        let pad = Config::default_config()
            .unwrap()
            .build_pad(RecordingTransport::new())
            .unwrap();
        EngineDriver::new(pad, 16)
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_click_fires_on_tokio_clock() {
        let (driver, handle) = driver();
        let task = tokio::spawn(driver.run());

        handle
            .send(pointer(PointerTarget::Trackpad, PointerPhase::Down))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        handle
            .send(pointer(PointerTarget::Trackpad, PointerPhase::Up))
            .await
            .unwrap();
        drop(handle);

        let pad = task.await.unwrap();
        assert_eq!(
            pad.transport().commands(),
            vec![Command::DoubleClick {
                button: MouseButton::Left
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_tap_is_short_click() {
        let (driver, handle) = driver();
        let task = tokio::spawn(driver.run());

        handle
            .send(pointer(PointerTarget::Trackpad, PointerPhase::Down))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle
            .send(pointer(PointerTarget::Trackpad, PointerPhase::Up))
            .await
            .unwrap();
        drop(handle);

        let pad = task.await.unwrap();
        assert_eq!(
            pad.transport().commands(),
            vec![Command::Click {
                button: MouseButton::Left
            }]
        );
        assert_eq!(pad.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_repeat_on_tokio_clock() {
        let (driver, handle) = driver();
        let task = tokio::spawn(driver.run());
        let backspace = || PointerTarget::Element("key-backspace".to_string());

        handle
            .send(pointer(backspace(), PointerPhase::Down))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        handle
            .send(pointer(backspace(), PointerPhase::Up))
            .await
            .unwrap();
        drop(handle);

        let pad = task.await.unwrap();
        let taps = pad
            .transport()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::PressKey { .. }))
            .count();
        // initial tap, then repeats at 500 and 950
        assert_eq!(taps, 3);
        assert_eq!(pad.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_driver() {
        let (driver, handle) = driver();
        let task = tokio::spawn(driver.run());

        handle
            .send(pointer(PointerTarget::Trackpad, PointerPhase::Down))
            .await
            .unwrap();
        handle.shutdown().await;

        let pad = task.await.unwrap();
        assert!(pad.transport().commands().is_empty());
        assert!(handle
            .send(pointer(PointerTarget::Trackpad, PointerPhase::Up))
            .await
            .is_err());
    }
}
