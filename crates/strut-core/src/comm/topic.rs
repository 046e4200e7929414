//! Publish-subscribe topics
//!
//! Fan-out of cloned messages to every subscriber over bounded crossbeam
//! channels. A full or disconnected subscriber is dropped rather than
//! allowed to block the publisher, which is usually the control thread.

use crossbeam_channel as cc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use crate::{Error, Result};

/// Configuration for a topic
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Messages buffered per subscriber
    pub buffer_size: usize,
    pub name: Arc<str>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            name: Arc::from(""),
        }
    }
}

impl TopicConfig {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

struct TopicInner<T> {
    config: TopicConfig,
    subscribers: Vec<cc::Sender<T>>,
}

/// Receiving end of a subscription
pub struct Subscriber<T> {
    inner: cc::Receiver<T>,
}

impl<T> Subscriber<T> {
    /// Take a message if one is waiting
    pub fn try_recv(&self) -> Result<Option<T>> {
        match self.inner.try_recv() {
            Ok(v) => Ok(Some(v)),
            Err(cc::TryRecvError::Empty) => Ok(None),
            Err(cc::TryRecvError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        match self.inner.recv_timeout(timeout) {
            Ok(v) => Ok(Some(v)),
            Err(cc::RecvTimeoutError::Timeout) => Ok(None),
            Err(cc::RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Drain everything currently buffered
    pub fn drain(&self) -> Vec<T> {
        self.inner.try_iter().collect()
    }
}

/// A publish-subscribe topic
///
/// Cloning yields another handle to the same topic.
pub struct Topic<T> {
    inner: Arc<RwLock<TopicInner<T>>>,
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_config(TopicConfig::new(name))
    }

    pub fn with_config(config: TopicConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TopicInner {
                config,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> Arc<str> {
        self.inner.read().config.name.clone()
    }

    /// Send a copy of `message` to every live subscriber
    pub fn publish(&self, message: T) {
        if self.inner.read().subscribers.is_empty() {
            return;
        }

        let mut inner = self.inner.write();
        let before = inner.subscribers.len();
        inner
            .subscribers
            .retain(|tx| tx.try_send(message.clone()).is_ok());
        let dropped = before - inner.subscribers.len();
        if dropped > 0 {
            tracing::debug!(topic = %inner.config.name, dropped, "dropped stalled subscribers");
        }
    }

    pub fn subscribe(&self) -> Subscriber<T> {
        let mut inner = self.inner.write();
        let (tx, rx) = cc::bounded(inner.config.buffer_size);
        inner.subscribers.push(tx);
        Subscriber { inner: rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fan_out() {
        let topic = Topic::<i32>::new("test");
        let a = topic.subscribe();
        let b = topic.subscribe();

        topic.publish(7);

        assert_eq!(a.recv_timeout(Duration::from_millis(100)).unwrap(), Some(7));
        assert_eq!(b.try_recv().unwrap(), Some(7));
        assert_eq!(b.try_recv().unwrap(), None);
    }

    #[test]
    fn test_full_subscriber_is_dropped() {
        let topic = Topic::<i32>::with_config(TopicConfig::new("test").buffer_size(1));
        let slow = topic.subscribe();
        topic.publish(1);
        topic.publish(2);

        assert_eq!(topic.subscriber_count(), 0);
        assert_eq!(slow.drain(), vec![1]);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let topic = Topic::<i32>::new("test");
        let sub = topic.subscribe();
        drop(sub);
        topic.publish(1);
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[test]
    fn test_cross_thread() {
        let topic = Topic::<i32>::new("test");
        let sub = topic.subscribe();
        let publisher = topic.clone();

        let handle = thread::spawn(move || {
            for i in 0..10 {
                publisher.publish(i);
            }
        });
        handle.join().unwrap();

        assert_eq!(sub.drain(), (0..10).collect::<Vec<_>>());
    }
}
