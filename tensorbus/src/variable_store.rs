//! Named scalar variables, mirrored between processes.
//!
//! The publishing process stores and broadcasts; the listening process
//! applies the decoded `const` messages. Both use the same type.

use crate::error::{BusError, BusResult};
use crate::message::Message;
use crate::publisher::Publisher;
use crate::variable::Variable;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Last-write-wins map of variables
#[derive(Default)]
pub struct VariableStore {
    vars: HashMap<String, Variable>,
    publisher: Option<Publisher>,
    // (receiver id, name) of every variable received from a remote publisher
    published_by: HashSet<(i32, String)>,
    staged: BTreeMap<(i32, String), Variable>,
}

impl VariableStore {
    /// Local-only store; `publish` and `push_updates` fail on it
    pub fn new() -> Self {
        Self::default()
    }

    /// Store announcing every publish through `publisher`
    pub fn with_publisher(publisher: Publisher) -> Self {
        Self {
            publisher: Some(publisher),
            ..Self::default()
        }
    }

    fn publisher(&self, operation: &'static str) -> BusResult<&Publisher> {
        self.publisher
            .as_ref()
            .ok_or(BusError::Detached { operation })
    }

    /// Store `value` and broadcast it
    pub fn publish(&mut self, name: &str, value: impl Into<Variable>) -> BusResult<()> {
        let value = value.into();
        self.publisher("publish")?.publish_const(name, &value)?;
        debug!(name, kind = value.type_tag(), "variable published");
        self.vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Store `value` without announcing it
    pub fn set(&mut self, name: &str, value: impl Into<Variable>) {
        self.vars.insert(name.to_string(), value.into());
    }

    /// Value stored under `name`; `None` means never stored
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Apply a decoded `const` message, overwriting any previous value
    pub fn apply_remote(&mut self, message: &Message) -> BusResult<()> {
        let Message::Const {
            name,
            value,
            receiver_id,
        } = message
        else {
            return Err(BusError::Protocol {
                message: message.encode(),
                reason: format!("`{}` cannot update a variable", message.command()),
            });
        };

        debug!(name, receiver_id, value = %value, "remote variable applied");
        self.published_by.insert((*receiver_id, name.clone()));
        self.vars.insert(name.clone(), value.clone());
        Ok(())
    }

    /// Queue an update for a variable that `receiver_id` published.
    ///
    /// Returns `false` (and stages nothing) for variables that receiver
    /// never published. Later stages of the same variable replace earlier
    /// ones until [`push_updates`](Self::push_updates).
    pub fn stage_update(
        &mut self,
        receiver_id: i32,
        name: &str,
        value: impl Into<Variable>,
    ) -> bool {
        let key = (receiver_id, name.to_string());
        if !self.published_by.contains(&key) {
            warn!(receiver_id, name, "update for a variable the receiver never published");
            return false;
        }
        self.staged.insert(key, value.into());
        true
    }

    /// Send every staged update to its receiver queue and clear the batch.
    ///
    /// On a broker failure the unsent updates stay staged.
    pub fn push_updates(&mut self) -> BusResult<usize> {
        let publisher = self.publisher("push_updates")?.clone();
        let mut count = 0;
        while let Some(((receiver_id, name), value)) = self.staged.pop_first() {
            if let Err(e) = publisher.send_const(receiver_id, &name, &value) {
                self.staged.insert((receiver_id, name), value);
                return Err(e);
            }
            self.vars.insert(name, value);
            count += 1;
        }
        if count > 0 {
            debug!(count, "staged updates pushed");
        }
        Ok(count)
    }

    /// Number of staged updates
    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variable is stored
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Every variable, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use std::sync::Arc;
    use tensorbus_common::config::QueueConfig;

    fn connected() -> (Arc<MemoryBroker>, VariableStore) {
        let broker = Arc::new(MemoryBroker::new());
        let store =
            VariableStore::with_publisher(Publisher::new(broker.clone(), QueueConfig::default()));
        (broker, store)
    }

    #[test]
    fn never_published_differs_from_empty_string() {
        let mut store = VariableStore::new();
        assert_eq!(store.get("s"), None);
        store.set("s", "");
        assert_eq!(store.get("s"), Some(&Variable::Str(String::new())));
    }

    #[test]
    fn publish_stores_and_broadcasts() {
        let (broker, mut store) = connected();
        store.publish("n", 3).unwrap();
        store.publish("n", 4.5).unwrap();
        assert_eq!(store.get("n"), Some(&Variable::Float(4.5)));
        assert_eq!(
            broker.pending("__tensorbus_queue_0"),
            vec![
                "const::n::int::3::1".to_string(),
                "const::n::float::4.5::1".to_string()
            ]
        );
    }

    #[test]
    fn detached_store_cannot_publish() {
        let mut store = VariableStore::new();
        assert!(matches!(
            store.publish("n", 1),
            Err(BusError::Detached { operation: "publish" })
        ));
        assert_eq!(store.get("n"), None);
    }

    #[test]
    fn apply_remote_overwrites() {
        let mut store = VariableStore::new();
        store.set("x", "old");
        store
            .apply_remote(&Message::decode("const::x::float::2.5::1").unwrap())
            .unwrap();
        assert_eq!(store.get("x"), Some(&Variable::Float(2.5)));
        assert!(store.apply_remote(&Message::Stop).is_err());
    }

    #[test]
    fn updates_only_for_published_variables() {
        let (broker, mut store) = connected();
        store
            .apply_remote(&Message::constant("gain", Variable::Int(1), 3))
            .unwrap();

        assert!(!store.stage_update(3, "other", 1));
        assert!(!store.stage_update(4, "gain", 1));
        assert!(store.stage_update(3, "gain", 2));
        assert!(store.stage_update(3, "gain", 5));
        assert_eq!(store.staged(), 1);

        assert_eq!(store.push_updates().unwrap(), 1);
        assert_eq!(store.staged(), 0);
        assert_eq!(store.get("gain"), Some(&Variable::Int(5)));
        assert_eq!(
            broker.pending("__tensorbus_queue_3"),
            vec!["const::gain::int::5::3".to_string()]
        );
        assert_eq!(store.push_updates().unwrap(), 0);
    }

    #[test]
    fn failed_push_keeps_staged_updates() {
        let (broker, mut store) = connected();
        for name in ["a", "b"] {
            store
                .apply_remote(&Message::constant(name, Variable::Int(0), 2))
                .unwrap();
            assert!(store.stage_update(2, name, 1));
        }

        broker.close();
        assert!(matches!(store.push_updates(), Err(BusError::Broker(_))));
        assert_eq!(store.staged(), 2);
        assert_eq!(store.get("a"), Some(&Variable::Int(0)));
    }

    #[test]
    fn delimiter_in_value_is_not_decodable() {
        let (broker, mut store) = connected();
        store.publish("s", "a::b").unwrap();

        let raw = broker.pending("__tensorbus_queue_0").remove(0);
        assert_eq!(raw, "const::s::str::a::b::1");
        assert!(matches!(
            Message::decode(&raw),
            Err(BusError::Protocol { .. })
        ));
    }
}
