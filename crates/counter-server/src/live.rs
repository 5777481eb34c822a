//! Per-connection live update stream.
//!
//! Lifecycle of one connection:
//!
//! ```text
//! CONNECTING ──register + snapshot──► OPEN ──remote close / write failure──► CLOSED
//! ```
//!
//! On open the connection is registered with the [`BroadcastHub`] first and the
//! snapshot is read afterwards, so no counter that existed before the
//! connection can be missing from it. The snapshot is always the first item
//! of the stream; events published while it was being read follow it and may
//! repeat what it already contains, which clients tolerate.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

use broadcaster::{BroadcastHub, ConnectionId, Payload};
use counter_core::{CounterStore, SyncEvent};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::{ApiError, Result};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl StreamState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => StreamState::Connecting,
            1 => StreamState::Open,
            _ => StreamState::Closed,
        }
    }
}

/// Hub registration owned by one stream. Closing is idempotent and also
/// happens on drop, which is how a remote disconnect reaches us.
struct Registration {
    id: ConnectionId,
    hub: BroadcastHub,
    state: AtomicU8,
}

impl Registration {
    fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn open(&self) {
        let _ = self.state.compare_exchange(
            StreamState::Connecting as u8,
            StreamState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        info!(connection = %self.id, "Live stream opened");
    }

    fn close(&self) {
        let previous = self.state.swap(StreamState::Closed as u8, Ordering::SeqCst);
        if previous == StreamState::Closed as u8 {
            return;
        }
        info!(connection = %self.id, "Live stream closed");

        let hub = self.hub.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    hub.unsubscribe(id).await;
                });
            }
            // The hub prunes the closed channel on its next publish.
            Err(_) => warn!(connection = %id, "No runtime to unregister live stream"),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.close();
    }
}

/// The stream of serialized events for one connection.
pub struct LiveStream {
    events: Pin<Box<dyn Stream<Item = Payload> + Send>>,
    registration: Registration,
}

impl LiveStream {
    /// Hub connection id of this stream.
    pub fn connection_id(&self) -> ConnectionId {
        self.registration.id
    }

    pub fn state(&self) -> StreamState {
        self.registration.state()
    }

    /// Close the stream and release its hub registration. Safe to call twice.
    pub fn close(&self) {
        self.registration.close();
    }
}

impl Stream for LiveStream {
    type Item = Payload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.registration.state() == StreamState::Closed {
            return Poll::Ready(None);
        }
        match self.events.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                // The hub dropped us after a failed write.
                self.registration.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Register a new connection and build its stream, snapshot first.
pub async fn open(store: &dyn CounterStore, hub: &BroadcastHub) -> Result<LiveStream> {
    let subscription = hub.subscribe_channel().await;
    let registration = Registration {
        id: subscription.id,
        hub: hub.clone(),
        state: AtomicU8::new(StreamState::Connecting as u8),
    };

    // Fetched fresh for every connection, never cached.
    let counters = store.list().await?;
    let initial = SyncEvent::initial(counters)
        .to_json()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let initial: Payload = Payload::from(initial);

    let events = stream::once(async move { initial })
        .chain(ReceiverStream::new(subscription.receiver))
        .boxed();

    registration.open();

    Ok(LiveStream {
        events,
        registration,
    })
}
