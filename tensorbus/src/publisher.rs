//! Encodes store mutations into broker messages

use crate::broker::Broker;
use crate::error::BusResult;
use crate::handle::TensorHandle;
use crate::message::Message;
use crate::variable::Variable;
use std::sync::Arc;
use tensorbus_common::config::QueueConfig;
use tensorbus_common::consts::BROADCAST_RECEIVER_ID;
use tracing::debug;

/// Pushes one wire message per store mutation.
///
/// Cheap to clone; every clone shares the same broker connection.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
    queues: QueueConfig,
}

impl Publisher {
    /// Publisher over an injected broker connection
    pub fn new(broker: Arc<dyn Broker>, queues: QueueConfig) -> Self {
        Self { broker, queues }
    }

    /// Announce a tensor segment on the outbound queue
    pub fn share_tensor(&self, name: &str, handle: &TensorHandle) -> BusResult<()> {
        let queue = self.queues.outbound_queue();
        self.push(&queue, &Message::share_tensor(name, handle.clone()))
    }

    /// Broadcast a variable on the outbound queue
    pub fn publish_const(&self, name: &str, value: &Variable) -> BusResult<()> {
        let queue = self.queues.outbound_queue();
        self.push(
            &queue,
            &Message::constant(name, value.clone(), BROADCAST_RECEIVER_ID),
        )
    }

    /// Send a variable update to the queue of one receiver
    pub fn send_const(&self, receiver_id: i32, name: &str, value: &Variable) -> BusResult<()> {
        let queue = self.queues.queue_name(receiver_id);
        self.push(&queue, &Message::constant(name, value.clone(), receiver_id))
    }

    /// Ask the listener on `queue_name(receiver_id)` to stop
    pub fn request_stop(&self, receiver_id: i32) -> BusResult<()> {
        let queue = self.queues.queue_name(receiver_id);
        self.push(&queue, &Message::Stop)
    }

    /// Encode and push any message
    pub fn push(&self, queue: &str, message: &Message) -> BusResult<()> {
        let encoded = message.encode();
        debug!(queue, command = message.command(), "push");
        self.broker.push(queue, &encoded)?;
        Ok(())
    }

    /// Queue naming in use
    pub fn queues(&self) -> &QueueConfig {
        &self.queues
    }

    /// Underlying broker connection
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;

    fn publisher() -> (Arc<MemoryBroker>, Publisher) {
        let broker = Arc::new(MemoryBroker::new());
        let publisher = Publisher::new(broker.clone(), QueueConfig::default());
        (broker, publisher)
    }

    #[test]
    fn const_is_broadcast_on_outbound_queue() {
        let (broker, publisher) = publisher();
        publisher.publish_const("lr", &Variable::Int(3)).unwrap();
        assert_eq!(
            broker.pending("__tensorbus_queue_0"),
            vec!["const::lr::int::3::1".to_string()]
        );
    }

    #[test]
    fn stop_goes_to_receiver_queue() {
        let (broker, publisher) = publisher();
        publisher.request_stop(1).unwrap();
        assert_eq!(
            broker.pending("__tensorbus_queue_1"),
            vec!["stop::".to_string()]
        );
    }

    #[test]
    fn send_const_addresses_receiver() {
        let (broker, publisher) = publisher();
        publisher
            .send_const(7, "gain", &Variable::Float(0.25))
            .unwrap();
        assert_eq!(
            broker.pending("__tensorbus_queue_7"),
            vec!["const::gain::float::0.25::7".to_string()]
        );
    }

    #[test]
    fn broker_failure_propagates() {
        let (broker, publisher) = publisher();
        broker.close();
        assert!(matches!(
            publisher.request_stop(1),
            Err(crate::error::BusError::Broker(_))
        ));
    }
}
