//! The engine loop: channel boundaries around the per-frame pipeline.
//!
//! A producer (the capture layer) pushes [`LandmarkBundle`]s into a
//! bounded channel with `try_send`, dropping frames when the engine is
//! busy; the engine thread drains the channel, runs the pipeline, and
//! pushes serialized events onto the outbound channel, again with
//! `try_send` so a slow subscriber never stalls a frame.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde_json::Value;

use crate::events::EngineEvent;
use crate::landmarks::LandmarkBundle;
use crate::pipeline::GesturePipeline;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const STATS_EVERY_FRAMES: u64 = 10;

/// Handle to a running engine thread. Stops and joins on drop.
#[derive(Debug)]
pub struct EngineHandle {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Channel pair for the capture boundary: depth-1, drop-on-busy.
pub fn bundle_channel() -> (Sender<LandmarkBundle>, Receiver<LandmarkBundle>) {
    bounded(1)
}

/// Spawn the engine thread. Bundles arrive on `bundle_rx`; every event is
/// serialized and offered to `event_tx` without blocking. A stats message
/// goes out every ten processed frames.
pub fn start_engine(
    mut pipeline: GesturePipeline,
    bundle_rx: Receiver<LandmarkBundle>,
    event_tx: Sender<Value>,
) -> EngineHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut frames: u64 = 0;
        while !stop_flag.load(Ordering::Relaxed) {
            let bundle = match bundle_rx.recv_timeout(RECV_TIMEOUT) {
                Ok(bundle) => bundle,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    log::info!("landmark producer disconnected, engine stopping");
                    break;
                }
            };

            let events = pipeline.process(&bundle);
            for event in &events {
                offer(&event_tx, event.to_message());
            }

            frames += 1;
            if frames % STATS_EVERY_FRAMES == 0 {
                offer(&event_tx, EngineEvent::Stats(pipeline.stats()).to_message());
            }
        }
    });

    EngineHandle {
        stop,
        handle: Some(handle),
    }
}

/// Non-blocking send; a full outbound channel drops the message, a closed
/// one is only worth logging once per message.
fn offer(event_tx: &Sender<Value>, message: Value) {
    match event_tx.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            log::debug!("outbound channel full, dropping event");
        }
        Err(TrySendError::Disconnected(_)) => {
            log::debug!("no event subscriber connected");
        }
    }
}
