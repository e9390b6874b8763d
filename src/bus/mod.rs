//! Message Bus Module
//!
//! The `MessageBus` routes inbound events (channel adapters and background
//! tasks to the agent) and outbound replies (agent back to channels).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────>│  MessageBus │────>│  AgentLoop  │
//! │    (CLI)    │     │  (inbound)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                       ▲      │                │ spawn
//!        system-origin  │      │ outbound       ▼
//!        announcement   │      ▼          ┌─────────────┐
//!                       │  ┌─────────┐    │  Subagent   │
//!                       └──┤ Channel │    │   (task)    │
//!                          └─────────┘    └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use nanoclaw::bus::{MessageBus, InboundMessage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::new();
//!     let msg = InboundMessage::new("cli", "user", "direct", "Hello");
//!     bus.publish_inbound(msg).await.unwrap();
//!
//!     if let Some(received) = bus.consume_inbound().await {
//!         assert_eq!(received.content, "Hello");
//!     }
//! }
//! ```

pub mod message;

pub use message::{InboundMessage, MessageOrigin, OutboundMessage};

use crate::error::{ClawError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Default buffer size for message channels
const DEFAULT_BUFFER_SIZE: usize = 100;

/// The central message bus.
///
/// Two bounded MPSC queues backed by Tokio. Receivers sit behind a mutex so
/// the bus can be shared via `Arc` or `Clone`; in practice each queue has a
/// single consumer.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
}

impl MessageBus {
    /// Creates a new `MessageBus` with the default buffer size (100).
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a new `MessageBus` with a custom buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        }
    }

    /// Publishes an inbound message to the bus.
    ///
    /// # Errors
    /// Returns `ClawError::BusClosed` if the receiver has been dropped.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| ClawError::BusClosed)
    }

    /// Waits for the next inbound message. `None` once all senders are gone.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Publishes an outbound message to the bus.
    ///
    /// # Errors
    /// Returns `ClawError::BusClosed` if the receiver has been dropped.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| ClawError::BusClosed)
    }

    /// Waits for the next outbound message. `None` once all senders are gone.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones the message bus, sharing the same underlying channels.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
        }
    }
}
