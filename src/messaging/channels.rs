// Channel de notifications lock-free entre la session et le front end

use crate::messaging::notification::{Notification, Notifier, log_notification};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use std::collections::VecDeque;

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Notifier that logs each notification and queues it for the front end.
///
/// When the queue is full the notification is still logged, then dropped.
pub struct ChannelNotifier {
    producer: Mutex<NotificationProducer>,
}

impl ChannelNotifier {
    pub fn new(producer: NotificationProducer) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }

    /// Notifier plus the consumer end of a fresh channel
    pub fn channel(capacity: usize) -> (Self, NotificationConsumer) {
        let (producer, consumer) = create_notification_channel(capacity);
        (Self::new(producer), consumer)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        log_notification(&notification);

        if self.producer.lock().try_push(notification).is_err() {
            tracing::warn!("Notification queue full, dropping notification");
        }
    }
}

/// Bounded history of the most recent notifications, as shown by the front end
pub struct NotificationFeed {
    consumer: NotificationConsumer,
    queue: VecDeque<Notification>,
    max_notifications: usize,
}

impl NotificationFeed {
    pub fn new(consumer: NotificationConsumer, max_notifications: usize) -> Self {
        Self {
            consumer,
            queue: VecDeque::new(),
            max_notifications: max_notifications.max(1),
        }
    }

    /// Moves pending notifications into the history and returns them
    pub fn update(&mut self) -> Vec<Notification> {
        let mut fresh = Vec::new();

        while let Some(notification) = self.consumer.try_pop() {
            self.queue.push_back(notification.clone());
            fresh.push(notification);

            if self.queue.len() > self.max_notifications {
                self.queue.pop_front();
            }
        }

        fresh
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.queue.back()
    }

    /// Notifications younger than `max_age_ms`
    pub fn recent(&self, max_age_ms: u64) -> Vec<&Notification> {
        self.queue
            .iter()
            .filter(|n| n.is_recent(max_age_ms))
            .collect()
    }
}
