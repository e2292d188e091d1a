//! Where caller callbacks run.
//!
//! Engine work happens on tokio tasks; the [`Dispatcher`] decides which
//! context finally invokes the caller's callback.

use std::sync::Mutex;

use tokio::sync::mpsc;

pub type Callback = Box<dyn FnOnce() + Send + 'static>;

pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, callback: Callback);
}

/// Runs callbacks immediately on the task that produced the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, callback: Callback) {
        callback();
    }
}

/// Queues callbacks for a designated thread to drain, e.g. a UI loop.
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Callback>,
    rx: Mutex<mpsc::UnboundedReceiver<Callback>>,
}

impl Default for ChannelDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Run every queued callback on the calling thread. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Release the lock before running, a callback may queue another.
            let next = match self.rx.lock() {
                Ok(mut rx) => rx.try_recv().ok(),
                Err(poisoned) => poisoned.into_inner().try_recv().ok(),
            };
            match next {
                Some(callback) => {
                    callback();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, callback: Callback) {
        if self.tx.send(callback).is_err() {
            tracing::warn!("Callback dropped: dispatcher queue is closed");
        }
    }
}
