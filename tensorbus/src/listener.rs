//! Receive loop.
//!
//! A [`Listener`] blocking-pops its queue, decodes each message and applies
//! it until the `stop::` sentinel arrives. Malformed messages end the loop
//! with an error instead of being skipped.

use crate::broker::Broker;
use crate::error::{BusError, BusResult};
use crate::message::{Message, SHARE_TENSOR, TensorAnnouncement};
use crate::variable_store::VariableStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tensorbus_common::config::{ListenerConfig, ShareTensorPolicy};
use tensorbus_common::consts::FIELD_DELIMITER;
use tracing::{debug, error, info, warn};

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Popping and applying messages
    Running,
    /// Terminal until [`Listener::reset`]
    Stopped,
}

/// Handler for a command; receives the message without its command prefix
pub type Callback = Box<dyn FnMut(&str) -> BusResult<()> + Send>;

/// Flag asking a listener to stop between two pops.
///
/// With an infinite pop timeout the flag is only seen after the next
/// message arrives.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Ask the listener to stop
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Receive side of the protocol
pub struct Listener {
    broker: Arc<dyn Broker>,
    queue: String,
    config: ListenerConfig,
    callbacks: HashMap<String, Callback>,
    state: ListenerState,
    stop: StopHandle,
}

impl Listener {
    /// Listener on `queue`
    pub fn new(broker: Arc<dyn Broker>, queue: impl Into<String>, config: ListenerConfig) -> Self {
        Self {
            broker,
            queue: queue.into(),
            config,
            callbacks: HashMap::new(),
            state: ListenerState::Running,
            stop: StopHandle::default(),
        }
    }

    /// Route `command` messages to `callback`, replacing any previous one
    pub fn register<F>(&mut self, command: impl Into<String>, callback: F)
    where
        F: FnMut(&str) -> BusResult<()> + Send + 'static,
    {
        self.callbacks.insert(command.into(), Box::new(callback));
    }

    /// Route decoded `share_tensor` announcements to `callback`.
    ///
    /// Only used when the listener dispatches `share_tensor`.
    pub fn on_shared_tensor<F>(&mut self, mut callback: F)
    where
        F: FnMut(TensorAnnouncement) -> BusResult<()> + Send + 'static,
    {
        self.register(SHARE_TENSOR, move |payload: &str| {
            callback(TensorAnnouncement::from_payload(payload)?)
        });
    }

    /// Handle that stops the loop from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Drop stale messages from the queue and make the listener runnable again
    pub fn reset(&mut self) -> BusResult<usize> {
        let dropped = self.broker.clear(&self.queue)?;
        if dropped > 0 {
            warn!(queue = %self.queue, dropped, "dropped stale messages");
        }
        self.stop.clear();
        self.state = ListenerState::Running;
        Ok(dropped)
    }

    /// Current state
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Queue listened on
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Apply messages to `store` until stopped; returns how many were handled
    pub fn run(&mut self, store: &mut VariableStore) -> BusResult<u64> {
        self.run_with(|message| store.apply_remote(message))
    }

    /// Like [`run`](Self::run), locking `store` only while applying a message
    pub fn run_shared(&mut self, store: &Mutex<VariableStore>) -> BusResult<u64> {
        self.run_with(|message| store.lock().apply_remote(message))
    }

    fn run_with<F>(&mut self, mut apply: F) -> BusResult<u64>
    where
        F: FnMut(&Message) -> BusResult<()>,
    {
        if self.state == ListenerState::Stopped {
            return Ok(0);
        }
        info!(queue = %self.queue, "listener started");

        let timeout = self.config.pop_timeout();
        let mut handled = 0;
        while self.state == ListenerState::Running {
            if self.stop.is_requested() {
                info!(queue = %self.queue, "stop requested");
                self.state = ListenerState::Stopped;
                break;
            }

            let popped = match self.broker.blocking_pop(&[self.queue.as_str()], timeout) {
                Ok(Some(popped)) => popped,
                Ok(None) => continue,
                Err(e) => {
                    self.state = ListenerState::Stopped;
                    error!(queue = %self.queue, error = %e, "pop failed");
                    return Err(e.into());
                }
            };

            match self.handle(&popped.message, &mut apply) {
                Ok(true) => handled += 1,
                Ok(false) => self.state = ListenerState::Stopped,
                Err(e) => {
                    self.state = ListenerState::Stopped;
                    error!(queue = %self.queue, message = %popped.message, error = %e, "listener aborted");
                    return Err(e);
                }
            }
        }

        info!(queue = %self.queue, handled, "listener stopped");
        Ok(handled)
    }

    /// Returns `false` on the sentinel
    fn handle<F>(&mut self, raw: &str, apply: &mut F) -> BusResult<bool>
    where
        F: FnMut(&Message) -> BusResult<()>,
    {
        let message = Message::decode(raw)?;
        debug!(command = message.command(), "received");

        match &message {
            Message::Stop => return Ok(false),
            Message::Const { .. } => apply(&message)?,
            Message::ShareTensor(announcement) => match self.config.share_tensor {
                ShareTensorPolicy::Ignore => {
                    debug!(name = %announcement.name, "share_tensor ignored");
                }
                ShareTensorPolicy::Dispatch => self.dispatch(SHARE_TENSOR, raw)?,
            },
            Message::Other { command, .. } => self.dispatch(command, raw)?,
        }
        Ok(true)
    }

    fn dispatch(&mut self, command: &str, raw: &str) -> BusResult<()> {
        let payload = raw
            .split_once(FIELD_DELIMITER)
            .map_or("", |(_, payload)| payload);
        let callback = self
            .callbacks
            .get_mut(command)
            .ok_or_else(|| BusError::UnknownCommand {
                command: command.to_string(),
            })?;
        callback(payload)
    }
}
