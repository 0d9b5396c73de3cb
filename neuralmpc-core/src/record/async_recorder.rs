//! Non-blocking recorder.
use super::{Record, Recorder};
use crossbeam_channel::{bounded, SendTimeoutError, Sender};
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Configuration of [`AsyncRecorder`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct AsyncRecorderConfig {
    /// The number of records queued for the worker thread.
    pub capacity: usize,

    /// The longest time [`AsyncRecorder::write`] waits for a free slot, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for AsyncRecorderConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            timeout_ms: 10,
        }
    }
}

impl AsyncRecorderConfig {
    /// Sets the capacity of the queue.
    pub fn capacity(mut self, v: usize) -> Self {
        self.capacity = v;
        self
    }

    /// Sets the timeout in milliseconds.
    pub fn timeout_ms(mut self, v: u64) -> Self {
        self.timeout_ms = v;
        self
    }
}

/// Runs a [`Recorder`] on a worker thread.
///
/// Records are sent through a bounded [`crossbeam_channel`]. When the queue is full for
/// longer than the configured timeout, or the worker has died, the record is dropped
/// with a warning. Writing never fails and never blocks longer than the timeout.
///
/// Dropping the [`AsyncRecorder`] closes the queue and joins the worker after it has
/// written the remaining records.
pub struct AsyncRecorder {
    sender: Option<Sender<Record>>,
    handle: Option<JoinHandle<()>>,
    timeout: Duration,
    n_dropped: Arc<AtomicUsize>,
}

impl AsyncRecorder {
    /// Spawns a worker thread writing records to `inner`.
    pub fn spawn<R>(mut inner: R, config: &AsyncRecorderConfig) -> Self
    where
        R: Recorder + Send + 'static,
    {
        let (sender, receiver) = bounded::<Record>(config.capacity.max(1));
        let handle = thread::spawn(move || {
            for record in receiver.iter() {
                inner.write(record);
            }
            trace!("Recorder worker exits");
        });

        Self {
            sender: Some(sender),
            handle: Some(handle),
            timeout: Duration::from_millis(config.timeout_ms),
            n_dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The number of records dropped so far.
    pub fn n_dropped(&self) -> usize {
        self.n_dropped.load(Ordering::Relaxed)
    }
}

impl Recorder for AsyncRecorder {
    fn write(&mut self, record: Record) {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return,
        };

        match sender.send_timeout(record, self.timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                self.n_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Logging sink did not accept a record within {:?}, record dropped",
                    self.timeout
                );
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                self.n_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Logging sink is gone, record dropped");
            }
        }
    }
}

impl Drop for AsyncRecorder {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Logging sink worker panicked");
            }
        }
    }
}
