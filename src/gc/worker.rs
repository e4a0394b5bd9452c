//! Background loop driving one garbage collector
//!
//! The loop waits on a trigger channel with a timeout and runs one cycle
//! per wake-up. Triggers coalesce: at most one is ever pending. The stop
//! flag is shared with the collector so a cycle can abort between its
//! gather and its deletion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::errors::{GcError, GcResult};
use crate::observability::{log_event_with_fields, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerMessage {
    Trigger,
    Shutdown,
}

/// Why a cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Explicit trigger
    Triggered,
    /// Idle bound elapsed without a trigger
    Idle,
}

/// Handle on one GC thread.
pub struct GcWorker {
    name: String,
    sender: Sender<WorkerMessage>,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl GcWorker {
    /// Start a thread running `cycle` on every trigger and every `idle`.
    pub fn spawn<F>(name: &str, idle: Duration, stop: Arc<AtomicBool>, cycle: F) -> GcResult<Self>
    where
        F: FnMut(Wake) + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let loop_stop = Arc::clone(&stop);
        let loop_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("gmu-{}", name))
            .spawn(move || run_loop(&loop_name, receiver, idle, loop_stop, cycle))
            .map_err(|e| GcError::WorkerSpawn {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            sender,
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request a cycle. A trigger already pending absorbs this one.
    pub fn trigger(&self) {
        let _ = self.sender.try_send(WorkerMessage::Trigger);
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop after its current cycle and join the thread.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        // A full channel already holds a trigger that will wake the loop
        let _ = self.sender.try_send(WorkerMessage::Shutdown);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for GcWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<F>(
    name: &str,
    receiver: Receiver<WorkerMessage>,
    idle: Duration,
    stop: Arc<AtomicBool>,
    mut cycle: F,
) where
    F: FnMut(Wake),
{
    while !stop.load(Ordering::SeqCst) {
        let wake = match receiver.recv_timeout(idle) {
            Ok(WorkerMessage::Trigger) => Wake::Triggered,
            Err(RecvTimeoutError::Timeout) => Wake::Idle,
            Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }
        cycle(wake);
    }
    log_event_with_fields(Event::GcWorkerStopped, &[("worker", name)]);
}
