//! Notification buffer.
//!
//! Newest first, bounded to [`NOTIFICATION_CAPACITY`] records. The unread
//! count is recomputed from the buffer after every mutation and is never
//! adjusted incrementally.

use counselflow_shared::{NewNotification, Notification, Priority};

/// Maximum number of retained notifications; older ones are evicted.
pub const NOTIFICATION_CAPACITY: usize = 100;

/// Generate a fresh notification id.
pub fn notification_id() -> String {
    format!("notif-{}", uuid::Uuid::new_v4())
}

/// Materialize `fields` with a new id and the current time.
pub fn materialize(fields: NewNotification) -> Notification {
    Notification::from_new(notification_id(), chrono::Utc::now(), fields)
}

/// Which records the presentation layer wants to see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
    Priority(Priority),
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Unread => !notification.is_read,
            NotificationFilter::Priority(p) => notification.priority == *p,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFeed {
    items: Vec<Notification>,
    unread: usize,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front, evicting the oldest records past capacity.
    /// Returns false if a record with the same id already exists.
    pub fn push(&mut self, notification: Notification) -> bool {
        if self.items.iter().any(|n| n.id == notification.id) {
            return false;
        }
        self.items.insert(0, notification);
        self.items.truncate(NOTIFICATION_CAPACITY);
        self.recount();
        true
    }

    /// Returns `true` if a record changed.
    pub fn mark_read(&mut self, id: &str) -> bool {
        let changed = match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                true
            }
            _ => false,
        };
        self.recount();
        changed
    }

    pub fn mark_all_read(&mut self) -> bool {
        let mut changed = false;
        for n in self.items.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            changed = true;
        }
        self.recount();
        changed
    }

    pub fn remove(&mut self, id: &str) -> Option<Notification> {
        let removed = self
            .items
            .iter()
            .position(|n| n.id == id)
            .map(|pos| self.items.remove(pos));
        self.recount();
        removed
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.items.is_empty();
        self.items.clear();
        self.recount();
        changed
    }

    /// Records newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Notification] {
        &self.items
    }

    pub fn filtered(&self, filter: NotificationFilter) -> Vec<Notification> {
        self.items
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|n| !n.is_read).count();
    }
}
