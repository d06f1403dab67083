//! # tensorbus
//!
//! Shares tensors between local processes through shared memory segments
//! and keeps scalar variables in sync, using a FIFO message broker only for
//! small control messages.
//!
//! ## Data Flow
//!
//! ```text
//!  publishing process                       broker                consumer process
//! ┌────────────────────┐                                        ┌──────────────────┐
//! │ TensorStore ───────┼─► share_tensor::name::handle ──► q_0 ─►│ MappedTensor     │
//! │  └ ShmAllocator    │                                        │ (maps handle)    │
//! │ VariableStore ─────┼─► const::name::tag::value::1 ──► q_0 ─►│ Listener         │
//! │                    │                                        │  └ VariableStore │
//! │ Listener ◄─────────┼── const / stop:: ◄───────────── q_1 ◄──┤ Publisher        │
//! └────────────────────┘                                        └──────────────────┘
//! ```
//!
//! Only the handle string crosses the broker; the payload stays in the
//! segment, which the consumer maps with the same segment facility.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tensorbus::{Bus, MemoryBroker, Tensor};
//! use tensorbus_common::config::BusConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Bus::connect(BusConfig::default(), Arc::new(MemoryBroker::new()))?;
//!
//! let weights = Tensor::from_slice(vec![3, 4], &[0.5f32; 12])?;
//! let handle = bus.submit_tensor("weights", &weights, false)?;
//! println!("announced {handle}");
//!
//! bus.publish_variable("epoch", 3)?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod bus;
pub mod consumer;
pub mod dtype;
pub mod error;
pub mod handle;
pub mod listener;
pub mod message;
pub mod publisher;
pub mod tensor;
pub mod tensor_store;
pub mod variable;
pub mod variable_store;

pub use broker::{Broker, MemoryBroker, Popped};
pub use bus::{Bus, ListenerHandle};
pub use consumer::MappedTensor;
pub use dtype::{Dtype, Element, ElementType};
pub use error::{BrokerError, BusError, BusResult};
pub use handle::TensorHandle;
pub use listener::{Callback, Listener, ListenerState, StopHandle};
pub use message::{Message, TensorAnnouncement};
pub use publisher::Publisher;
pub use tensor::{Storage, Tensor};
pub use tensor_store::{TensorEntry, TensorStore};
pub use variable::Variable;
pub use variable_store::VariableStore;
