// Notifications from the core to the front end

pub mod channels;
pub mod notification;

pub use channels::{
    ChannelNotifier, NotificationConsumer, NotificationFeed, create_notification_channel,
};
pub use notification::{
    LogNotifier, NOTIFICATION_TARGET, Notification, NotificationCategory, NotificationLevel,
    Notifier,
};
