/// Process-wide notification bus.
///
/// Constructed once by the entry point and handed to every publisher. There
/// is exactly one consumer, the application's event loop, which owns the
/// receiving half. Events are delivered in publish order.
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::event::AppEvent;

pub const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: mpsc::Sender<AppEvent>,
}

impl SignalBus {
    pub fn new() -> (Self, mpsc::Receiver<AppEvent>) {
        let (tx, rx) = mpsc::channel(BUS_CAPACITY);
        (Self { tx }, rx)
    }

    /// Waits for room on the bus. Returns `false` once the consumer is gone.
    pub async fn publish(&self, event: AppEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Non-waiting variant for synchronous callers. A full bus drops the event.
    pub fn try_publish(&self, event: AppEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::warn!("Notification bus full; dropping {event:?}");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
