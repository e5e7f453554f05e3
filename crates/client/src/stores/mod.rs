//! Client-side state stores.

pub mod notifications;

pub use notifications::{
    materialize, notification_id, NotificationFeed, NotificationFilter, NOTIFICATION_CAPACITY,
};
