//! Acquisition loop
//!
//! One task per recording. It owns the streaming `DeviceSession` outright
//! and runs a fixed-cadence cycle: pull a window, extract metrics, persist,
//! replicate, hand the sample to the hub. Cancellation is observed between
//! cycles, so a cancelled loop never leaves a half-written event behind.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use neurostream_board::DeviceSession;
use neurostream_dsp::MetricExtractor;
use neurostream_store::{EventRecord, EventStore, RemoteStore};

use crate::hub::HubCommand;
use crate::state::StateSnapshot;

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Remote collection events replicate into.
const EVENTS_COLLECTION: &str = "events";

/// Fallback when the backend does not report a rate.
const FALLBACK_SAMPLE_RATE: u32 = 250;

/// Everything the loop borrows from the rest of the system.
pub struct LoopDeps {
    pub store: Arc<EventStore>,
    pub remote: Option<Arc<dyn RemoteStore>>,
    pub snapshot: watch::Receiver<StateSnapshot>,
    pub hub: mpsc::Sender<HubCommand>,
    pub poll_period: Duration,
}

/// Handle held by the hub while a recording is active.
pub struct AcquisitionHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AcquisitionHandle {
    /// Signal cancellation and wait for the loop to release the device.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await {
            warn!("acquisition task did not shut down cleanly: {e}");
        }
    }

    /// Reap an already-failed loop without signalling.
    pub async fn reap(self) {
        let _ = self.cancel.send(true);
        let _ = self.task.await;
    }
}

pub fn spawn(session: DeviceSession, extractor: MetricExtractor, deps: LoopDeps) -> AcquisitionHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task = tokio::spawn(run(session, extractor, deps, cancel_rx));
    AcquisitionHandle {
        cancel: cancel_tx,
        task,
    }
}

async fn run(
    mut session: DeviceSession,
    extractor: MetricExtractor,
    deps: LoopDeps,
    mut cancel: watch::Receiver<bool>,
) {
    let sample_rate = session.sample_rate().unwrap_or(FALLBACK_SAMPLE_RATE);
    let mut ticker = tokio::time::interval(deps.poll_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(sample_rate, period_ms = deps.poll_period.as_millis() as u64, "acquisition loop started");

    let mut failure: Option<String> = None;

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }
        if *cancel.borrow() {
            break;
        }

        let window = match session.pull_window() {
            Ok(Some(window)) => window,
            Ok(None) => continue,
            Err(e) => {
                failure = Some(format!("Device stream failed: {e}"));
                break;
            }
        };

        let Some(sample) = extractor.compute(&window, sample_rate) else {
            continue;
        };

        // Mode/context as of this cycle, not as of delivery.
        let snapshot = deps.snapshot.borrow().clone();
        let record = EventRecord::from_sample(
            &sample,
            &snapshot.mode,
            Value::Object(snapshot.context),
            &snapshot.user_id,
        );

        // Local persistence failures are logged, never fatal.
        if let Err(e) = deps.store.append(&record) {
            warn!("failed to persist event: {e}");
        }

        if let Some(remote) = &deps.remote {
            if remote.is_available() {
                match serde_json::to_value(&record) {
                    Ok(doc) => {
                        if let Err(e) = remote.upsert(EVENTS_COLLECTION, doc, None, true) {
                            warn!("remote replication failed: {e}");
                        }
                    }
                    Err(e) => warn!("could not encode event for replication: {e}"),
                }
            }
        }

        // try_send: the hub must never be blocked on by its own loop.
        match deps.hub.try_send(HubCommand::Sample {
            sample,
            mode: snapshot.mode,
        }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("hub queue full, dropping sample");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    // Every exit path releases the hardware before reporting anything, so a
    // following start_recording never races a leaked handle.
    session.disconnect();

    if let Some(message) = failure {
        warn!("{message}");
        let _ = deps.hub.send(HubCommand::StreamFailed { message }).await;
    } else {
        info!("acquisition loop stopped");
    }
}
