//! Process-wide facade over both stores and the receive loop.
//!
//! Each store sits behind its own lock so any thread may publish, while a
//! listener thread mirrors remote variables into the same
//! [`VariableStore`].

use crate::broker::Broker;
use crate::error::BusResult;
use crate::handle::TensorHandle;
use crate::listener::{Listener, StopHandle};
use crate::publisher::Publisher;
use crate::tensor::Tensor;
use crate::tensor_store::TensorStore;
use crate::variable::Variable;
use crate::variable_store::VariableStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tensorbus_common::config::BusConfig;
use tensorbus_shm::{SegmentAllocator, ShmAllocator};
use tracing::info;

/// Running listener thread
pub struct ListenerHandle {
    stop: StopHandle,
    thread: JoinHandle<BusResult<u64>>,
}

impl ListenerHandle {
    /// Set the stop flag.
    ///
    /// The flag is only checked between pops, so with an infinite pop
    /// timeout (the default) this has no effect until another message
    /// arrives. [`Bus::stop_listener`] also pushes the sentinel.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// Whether the thread has returned
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop and return its outcome
    pub fn join(self) -> BusResult<u64> {
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Tensor and variable publishing for one process
pub struct Bus<A: SegmentAllocator = ShmAllocator> {
    config: BusConfig,
    publisher: Publisher,
    tensors: Mutex<TensorStore<A>>,
    variables: Arc<Mutex<VariableStore>>,
}

impl Bus<ShmAllocator> {
    /// Bus exporting tensors to `config.shm`
    pub fn connect(config: BusConfig, broker: Arc<dyn Broker>) -> BusResult<Self> {
        let allocator = ShmAllocator::new(config.shm.clone());
        Self::with_allocator(config, broker, allocator)
    }
}

impl<A: SegmentAllocator> Bus<A> {
    /// Bus exporting tensors through `allocator`
    pub fn with_allocator(config: BusConfig, broker: Arc<dyn Broker>, allocator: A) -> BusResult<Self> {
        config.validate()?;
        let publisher = Publisher::new(broker, config.queues.clone());
        info!(
            service = %config.shared.service_name,
            outbound = %config.queues.outbound_queue(),
            inbound = %config.queues.inbound_queue(),
            "bus connected"
        );
        Ok(Self {
            tensors: Mutex::new(TensorStore::new(allocator, publisher.clone())),
            variables: Arc::new(Mutex::new(VariableStore::with_publisher(publisher.clone()))),
            publisher,
            config,
        })
    }

    /// See [`TensorStore::submit`]
    pub fn submit_tensor(&self, name: &str, tensor: &Tensor, overwrite: bool) -> BusResult<TensorHandle> {
        self.tensors.lock().submit(name, tensor, overwrite)
    }

    /// Handle currently announced for `name`
    pub fn tensor_handle(&self, name: &str) -> Option<TensorHandle> {
        self.tensors.lock().handle(name).cloned()
    }

    /// See [`TensorStore::remove`]
    pub fn remove_tensor(&self, name: &str) -> BusResult<bool> {
        Ok(self.tensors.lock().remove(name)?.is_some())
    }

    /// See [`VariableStore::publish`]
    pub fn publish_variable(&self, name: &str, value: impl Into<Variable>) -> BusResult<()> {
        self.variables.lock().publish(name, value)
    }

    /// Current value of a variable, local or mirrored
    pub fn get(&self, name: &str) -> Option<Variable> {
        self.variables.lock().get(name).cloned()
    }

    /// See [`VariableStore::stage_update`]
    pub fn stage_update(&self, receiver_id: i32, name: &str, value: impl Into<Variable>) -> bool {
        self.variables.lock().stage_update(receiver_id, name, value)
    }

    /// See [`VariableStore::push_updates`]
    pub fn push_updates(&self) -> BusResult<usize> {
        self.variables.lock().push_updates()
    }

    /// Listener on the inbound queue, ready for callback registration
    pub fn listener(&self) -> Listener {
        Listener::new(
            Arc::clone(self.publisher.broker()),
            self.config.queues.inbound_queue(),
            self.config.listener.clone(),
        )
    }

    /// Run `listener` on its own thread, applying variables to this bus
    pub fn spawn_listener(&self, mut listener: Listener) -> BusResult<ListenerHandle> {
        let stop = listener.stop_handle();
        let variables = Arc::clone(&self.variables);
        let thread = thread::Builder::new()
            .name("tensorbus-listener".to_string())
            .spawn(move || listener.run_shared(&variables))?;
        Ok(ListenerHandle { stop, thread })
    }

    /// Push the sentinel to this process's inbound queue
    pub fn request_stop(&self) -> BusResult<()> {
        self.publisher.request_stop(self.config.queues.inbound_id)
    }

    /// Stop a listener spawned by this bus and wait for it.
    ///
    /// Sets the stop flag and pushes the sentinel, so the loop ends even
    /// while blocked in an infinite pop.
    pub fn stop_listener(&self, handle: ListenerHandle) -> BusResult<u64> {
        handle.stop();
        if !handle.is_finished() {
            self.request_stop()?;
        }
        handle.join()
    }

    /// Configuration in use
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Publisher shared by both stores
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }
}
