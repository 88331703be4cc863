//! Change notifications for observers.
//!
//! Observers receive owned snapshots of the records that changed, batched per
//! entity kind, and a flag telling local edits apart from server responses.

use tokio::sync::broadcast;

use crate::models::{EntityKind, ListItem, ListShare, Record, ShoppingList};

#[derive(Debug, Clone, PartialEq)]
pub struct Changes<T> {
    pub added: Vec<T>,
    pub modified: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for Changes<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Lists {
        changes: Changes<ShoppingList>,
        from_server: bool,
    },
    Items {
        changes: Changes<ListItem>,
        from_server: bool,
    },
    Shares {
        changes: Changes<ListShare>,
        from_server: bool,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> EntityKind {
        match self {
            ChangeEvent::Lists { .. } => EntityKind::List,
            ChangeEvent::Items { .. } => EntityKind::Item,
            ChangeEvent::Shares { .. } => EntityKind::Share,
        }
    }

    /// `true` when the change came from a server response or pull.
    pub fn from_server(&self) -> bool {
        match self {
            ChangeEvent::Lists { from_server, .. }
            | ChangeEvent::Items { from_server, .. }
            | ChangeEvent::Shares { from_server, .. } => *from_server,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChangeEvent::Lists { changes, .. } => changes.is_empty(),
            ChangeEvent::Items { changes, .. } => changes.is_empty(),
            ChangeEvent::Shares { changes, .. } => changes.is_empty(),
        }
    }
}

/// Records that can be collected into a [`ChangeBatch`].
pub trait Tracked: Record {
    fn changes_mut(batch: &mut ChangeBatch) -> &mut Changes<Self>;
}

impl Tracked for ShoppingList {
    fn changes_mut(batch: &mut ChangeBatch) -> &mut Changes<Self> {
        &mut batch.lists
    }
}

impl Tracked for ListItem {
    fn changes_mut(batch: &mut ChangeBatch) -> &mut Changes<Self> {
        &mut batch.items
    }
}

impl Tracked for ListShare {
    fn changes_mut(batch: &mut ChangeBatch) -> &mut Changes<Self> {
        &mut batch.shares
    }
}

/// Accumulates changes so that one operation produces at most one event per kind.
#[derive(Debug, Default)]
pub struct ChangeBatch {
    lists: Changes<ShoppingList>,
    items: Changes<ListItem>,
    shares: Changes<ListShare>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added<R: Tracked>(&mut self, record: R) {
        R::changes_mut(self).added.push(record);
    }

    pub fn modified<R: Tracked>(&mut self, record: R) {
        R::changes_mut(self).modified.push(record);
    }

    pub fn removed<R: Tracked>(&mut self, record: R) {
        R::changes_mut(self).removed.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.items.is_empty() && self.shares.is_empty()
    }

    /// Number of recorded changes across all kinds.
    pub fn len(&self) -> usize {
        self.lists.len() + self.items.len() + self.shares.len()
    }

    /// Non-empty events, lists first.
    pub fn into_events(self, from_server: bool) -> Vec<ChangeEvent> {
        let events = [
            ChangeEvent::Lists {
                changes: self.lists,
                from_server,
            },
            ChangeEvent::Items {
                changes: self.items,
                from_server,
            },
            ChangeEvent::Shares {
                changes: self.shares,
                from_server,
            },
        ];
        events.into_iter().filter(|e| !e.is_empty()).collect()
    }
}

/// Event bus for broadcasting change events
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: ChangeEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    pub fn emit_batch(&self, batch: ChangeBatch, from_server: bool) {
        for event in batch.into_events(from_server) {
            self.emit(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_batch_groups_by_kind() {
        let list = ShoppingList::new("Groceries");
        let mut batch = ChangeBatch::new();
        assert!(batch.is_empty());

        batch.added(list.clone());
        batch.added(ListItem::new(list.id, "Milk"));
        batch.removed(ListItem::new(list.id, "Eggs"));

        let events = batch.into_events(true);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EntityKind::List);
        assert_eq!(events[1].kind(), EntityKind::Item);
        assert!(events.iter().all(|e| e.from_server()));
        match &events[1] {
            ChangeEvent::Items { changes, .. } => {
                assert_eq!(changes.len(), 2);
                assert_eq!(changes.removed[0].name, "Eggs");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = EventBus::default();
        // No subscribers yet
        bus.emit_batch(ChangeBatch::new(), false);

        let mut rx = bus.subscribe();
        let mut batch = ChangeBatch::new();
        batch.modified(ListShare::new(
            Uuid::new_v4(),
            "a@example.com",
            crate::models::ShareAccess::ReadOnly,
        ));
        bus.emit_batch(batch, false);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EntityKind::Share);
        assert!(!event.from_server());
    }
}
