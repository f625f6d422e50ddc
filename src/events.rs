// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Events the RPC façade exposes to the UI collaborator over `GET
//! /rpc/events` (§6).

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    RecordingFinalized { recording_id: i64, camera_id: i64 },
    StreamDead { camera_id: i64, reason: String },
}

/// Buffer size for lagging subscribers; a slow `/rpc/events` reader drops
/// the oldest events rather than applying backpressure to the rest of the
/// core (per §5, events are best-effort notifications, not a queue the
/// core blocks on).
const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        EventBus { tx }
    }

    pub fn publish(&self, event: Event) {
        // No receivers is a normal state (no UI connected); ignore the error.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::StreamDead {
            camera_id: 1,
            reason: "child exited".into(),
        });
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, Event::StreamDead { camera_id: 1, .. }));
    }
}
