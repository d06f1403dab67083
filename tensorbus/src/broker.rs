//! Broker seam: named FIFO queues with blocking pop.

use crate::error::BrokerError;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A message taken off one of the watched queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popped {
    /// Queue the message came from
    pub queue: String,
    /// Raw wire message
    pub message: String,
}

/// FIFO message queue service.
///
/// Implementations own delivery ordering and persistence. Errors are
/// never retried by callers.
pub trait Broker: Send + Sync {
    /// Append `message` to the tail of `queue`
    fn push(&self, queue: &str, message: &str) -> Result<(), BrokerError>;

    /// Pop the head of the first non-empty queue in `queues`, blocking
    /// until one arrives. `None` blocks forever; an elapsed timeout
    /// yields `Ok(None)`.
    fn blocking_pop(
        &self,
        queues: &[&str],
        timeout: Option<Duration>,
    ) -> Result<Option<Popped>, BrokerError>;

    /// Drop every pending message of `queue`, returning how many were dropped
    fn clear(&self, queue: &str) -> Result<usize, BrokerError>;
}

#[derive(Default)]
struct QueueState {
    queues: HashMap<String, VecDeque<String>>,
    closed: bool,
}

impl QueueState {
    fn take(&mut self, queues: &[&str]) -> Option<Popped> {
        queues.iter().find_map(|&name| {
            let message = self.queues.get_mut(name)?.pop_front()?;
            Some(Popped {
                queue: name.to_string(),
                message,
            })
        })
    }
}

/// In-process broker with any number of named queues
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl MemoryBroker {
    /// Empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Disconnect: every later call fails and blocked pops wake up
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Pending messages in `queue`
    pub fn len(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Whether `queue` holds no message
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Snapshot of the pending messages of `queue`, head first
    pub fn pending(&self, queue: &str) -> Vec<String> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Broker for MemoryBroker {
    fn push(&self, queue: &str, message: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Disconnected);
        }
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message.to_string());
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn blocking_pop(
        &self,
        queues: &[&str],
        timeout: Option<Duration>,
    ) -> Result<Option<Popped>, BrokerError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(BrokerError::Disconnected);
            }
            if let Some(popped) = state.take(queues) {
                return Ok(Some(popped));
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        return Ok(state.take(queues));
                    }
                }
                None => self.ready.wait(&mut state),
            }
        }
    }

    fn clear(&self, queue: &str) -> Result<usize, BrokerError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Disconnected);
        }
        Ok(state.queues.remove(queue).map_or(0, |q| q.len()))
    }
}
