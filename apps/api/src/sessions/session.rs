//! A single connected device and its outbound queue

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wattline_protocol::{DeviceType, Event};

/// The session was closed before the event could be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session queue closed")]
pub struct QueueClosed;

/// Server-side state of one device stream
///
/// The registry owns the map entry; the transport owns the matching [`OutboundQueue`].
#[derive(Debug)]
pub struct ClientSession {
    id: String,
    device_type: DeviceType,
    serial: u64,
    connected_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<Event>,
    closed: CancellationToken,
}

impl ClientSession {
    /// Create a session and the receiving half of its queue
    pub fn open(id: String, device_type: DeviceType, serial: u64) -> (Arc<Self>, OutboundQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let session = Arc::new(Self {
            id,
            device_type,
            serial,
            connected_at: Utc::now(),
            sender,
            closed: closed.clone(),
        });
        (session, OutboundQueue { receiver, closed })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Registry-assigned number distinguishing successive sessions of one device
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Append an event to the outbound queue. Never drops; fails only once closed.
    pub fn enqueue(&self, event: Event) -> Result<(), QueueClosed> {
        if self.closed.is_cancelled() {
            return Err(QueueClosed);
        }
        self.sender.send(event).map_err(|_| QueueClosed)
    }

    /// Close the queue. Returns `true` for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        self.closed.cancel();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }
}

/// Receiving half of a session queue; single consumer
#[derive(Debug)]
pub struct OutboundQueue {
    receiver: mpsc::UnboundedReceiver<Event>,
    closed: CancellationToken,
}

impl OutboundQueue {
    /// Next event in FIFO order, or `None` once the session is closed
    pub async fn next_outbound(&mut self) -> Option<Event> {
        if self.closed.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            event = self.receiver.recv() => event,
            _ = self.closed.cancelled() => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let (session, mut queue) = ClientSession::open("dev1".into(), DeviceType::SWITCH, 1);
        for power in 1..=3 {
            session.enqueue(Event::command_power(power)).unwrap();
        }

        for power in 1..=3 {
            assert_eq!(queue.next_outbound().await, Some(Event::command_power(power)));
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, _queue) = ClientSession::open("dev1".into(), DeviceType::SWITCH, 1);
        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
        assert_eq!(session.enqueue(Event::None), Err(QueueClosed));
    }

    #[tokio::test]
    async fn test_close_wakes_pending_reader() {
        let (session, mut queue) = ClientSession::open("dev1".into(), DeviceType::SWITCH, 1);
        let reader = tokio::spawn(async move { queue.next_outbound().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        session.close();

        let next = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader should wake")
            .unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_dropped_queue_fails_enqueue() {
        let (session, queue) = ClientSession::open("dev1".into(), DeviceType::SWITCH, 1);
        drop(queue);
        assert!(session.is_closed());
        assert_eq!(session.enqueue(Event::message("hi")), Err(QueueClosed));
    }
}
