//! Lifecycle notifications raised by the manager.
//!
//! Events accumulate in the manager's [`EventQueue`] in the order the
//! underlying operations happened. The frame driver drains the queue once per
//! frame and hands the batch to every controller, so each event is delivered
//! to each controller exactly once.

use serde::Serialize;

use crate::component::ComponentKind;
use crate::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EntityEvent {
    /// An entity joined the manager.
    EntityAdded { entity: EntityId },
    /// An entity left the manager (destroyed or removed as a descendant).
    EntityRemoved { entity: EntityId },
    /// A component was attached to a registered entity.
    ComponentAdded {
        entity: EntityId,
        kind: ComponentKind,
    },
    /// A component was detached, replaced, or went away with its entity.
    ComponentRemoved {
        entity: EntityId,
        kind: ComponentKind,
    },
    /// A component finished processing (dirty -> clean).
    ComponentUpdated {
        entity: EntityId,
        kind: ComponentKind,
    },
}

impl EntityEvent {
    /// The entity the event is about.
    pub fn entity(&self) -> EntityId {
        match *self {
            EntityEvent::EntityAdded { entity }
            | EntityEvent::EntityRemoved { entity }
            | EntityEvent::ComponentAdded { entity, .. }
            | EntityEvent::ComponentRemoved { entity, .. }
            | EntityEvent::ComponentUpdated { entity, .. } => entity,
        }
    }

    /// The component kind, for component events.
    pub fn kind(&self) -> Option<ComponentKind> {
        match *self {
            EntityEvent::ComponentAdded { kind, .. }
            | EntityEvent::ComponentRemoved { kind, .. }
            | EntityEvent::ComponentUpdated { kind, .. } => Some(kind),
            EntityEvent::EntityAdded { .. } | EntityEvent::EntityRemoved { .. } => None,
        }
    }
}

/// FIFO queue of [`EntityEvent`]s.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<EntityEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: EntityEvent) {
        self.events.push(event);
    }

    /// Pending events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &EntityEvent> {
        self.events.iter()
    }

    /// Take every pending event, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<EntityEvent> {
        std::mem::take(&mut self.events)
    }

    /// Put a previously drained batch back ahead of anything raised since.
    pub fn requeue_front(&mut self, batch: Vec<EntityEvent>) {
        if batch.is_empty() {
            return;
        }
        let newer = std::mem::replace(&mut self.events, batch);
        self.events.extend(newer);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: ComponentKind = ComponentKind::new("Label");

    #[test]
    fn drain_empties_queue_in_order() {
        let mut queue = EventQueue::new();
        let e = EntityId::from_raw(0);
        queue.push(EntityEvent::EntityAdded { entity: e });
        queue.push(EntityEvent::ComponentAdded { entity: e, kind: LABEL });

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], EntityEvent::EntityAdded { entity: e });
        assert_eq!(drained[1].kind(), Some(LABEL));
        assert!(queue.is_empty());
    }

    #[test]
    fn requeued_batch_precedes_newer_events() {
        let mut queue = EventQueue::new();
        let old = EntityId::from_raw(1);
        let new = EntityId::from_raw(2);
        queue.push(EntityEvent::EntityAdded { entity: old });
        let batch = queue.drain();

        queue.push(EntityEvent::EntityAdded { entity: new });
        queue.requeue_front(batch);
        assert_eq!(
            queue.drain(),
            vec![
                EntityEvent::EntityAdded { entity: old },
                EntityEvent::EntityAdded { entity: new },
            ]
        );
    }

    #[test]
    fn accessors() {
        let e = EntityId::from_raw(9);
        let ev = EntityEvent::ComponentUpdated { entity: e, kind: LABEL };
        assert_eq!(ev.entity(), e);
        assert_eq!(EntityEvent::EntityRemoved { entity: e }.kind(), None);
    }

    #[test]
    fn serializes_with_event_tag() {
        let ev = EntityEvent::ComponentAdded {
            entity: EntityId::from_raw(3),
            kind: LABEL,
        };
        let json = serde_json::to_value(ev).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "component_added", "entity": 3, "kind": "Label"})
        );
    }
}
