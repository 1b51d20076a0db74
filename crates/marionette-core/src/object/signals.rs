use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::value::PropertyValue;

/// Identifier of a connected handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// One signal emission as seen by handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub signal: SmolStr,
    pub detail: Option<SmolStr>,
    /// Emission arguments. For `notify` this is the new property value.
    pub args: Vec<PropertyValue>,
}

pub type SignalHandler = Rc<dyn Fn(&Emission)>;

struct Connection {
    id: HandlerId,
    signal: SmolStr,
    detail: Option<SmolStr>,
    handler: SignalHandler,
}

/// Connected signal handlers of one object.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: Cell<u64>,
    connections: RefCell<Vec<Connection>>,
}

impl HandlerRegistry {
    pub fn connect(&self, signal: &str, detail: Option<&str>, handler: SignalHandler) -> HandlerId {
        let id = HandlerId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.connections.borrow_mut().push(Connection {
            id,
            signal: SmolStr::new(signal),
            detail: detail.map(SmolStr::new),
            handler,
        });
        id
    }

    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut connections = self.connections.borrow_mut();
        let before = connections.len();
        connections.retain(|connection| connection.id != id);
        connections.len() != before
    }

    /// Invoke matching handlers. A handler without a detail matches every
    /// detail. Handlers may connect or disconnect while running.
    pub fn emit(&self, emission: &Emission) {
        let matching: Vec<SignalHandler> = self
            .connections
            .borrow()
            .iter()
            .filter(|connection| {
                connection.signal == emission.signal
                    && connection
                        .detail
                        .as_ref()
                        .is_none_or(|detail| Some(detail) == emission.detail.as_ref())
            })
            .map(|connection| Rc::clone(&connection.handler))
            .collect();
        for handler in matching {
            handler(emission);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify(detail: &str) -> Emission {
        Emission {
            signal: "notify".into(),
            detail: Some(detail.into()),
            args: vec![PropertyValue::Bool(true)],
        }
    }

    #[test]
    fn detail_filters_handlers() {
        let registry = HandlerRegistry::default();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        registry.connect(
            "notify",
            Some("visible"),
            Rc::new(move |_: &Emission| counter.set(counter.get() + 1)),
        );
        registry.emit(&notify("label"));
        registry.emit(&notify("visible"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn handler_may_disconnect_itself() {
        let registry = Rc::new(HandlerRegistry::default());
        let id = Rc::new(Cell::new(None));
        let inner_registry = Rc::clone(&registry);
        let inner_id = Rc::clone(&id);
        let handler_id = registry.connect(
            "notify",
            None,
            Rc::new(move |_: &Emission| {
                if let Some(id) = inner_id.get() {
                    inner_registry.disconnect(id);
                }
            }),
        );
        id.set(Some(handler_id));
        registry.emit(&notify("visible"));
        assert!(registry.is_empty());
    }
}
