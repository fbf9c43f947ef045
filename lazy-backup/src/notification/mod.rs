//! Notification system.
//!
//! Run outcomes become [`NotificationEvent`]s; the [`NotificationDispatcher`]
//! renders one [`Message`] per subscribed channel and delivers them concurrently
//! through the adapters in [`channels`].

pub mod channels;
pub mod dispatcher;
pub mod events;
pub mod format;

pub use channels::{ChannelFactory, ChannelRegistry, NotificationChannel};
pub use dispatcher::{DEFAULT_SEND_TIMEOUT, DispatchStats, NotificationDispatcher};
pub use events::{
    DeliveryResult, Message, MessageField, MessageKind, MessageStyle, NotificationEvent,
    RunOutcome,
};
