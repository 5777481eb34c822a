//! One-call setup of the full client stack.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::CounterApi;
use crate::colors::ColorRegistry;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::monitor::{Connectivity, ConnectivityMonitor};
use crate::queue::{OfflineQueue, ReplayReport};
use crate::storage::{FileStorage, MemoryStorage, QueueStorage};
use crate::subscriber::{Callbacks, StreamSubscriber};
use crate::sync::SyncEngine;

/// Request client, live stream, offline queue and colors wired together.
pub struct SyncClient {
    api: Arc<CounterApi>,
    engine: Arc<SyncEngine>,
    subscriber: Arc<StreamSubscriber>,
    colors: ColorRegistry,
}

impl SyncClient {
    /// Build the client and bring it up to date with the server.
    ///
    /// Restores the offline queue from `config.queue_path`, then probes the
    /// server. If it answers, the queue is replayed, the counters are loaded
    /// and the live stream is opened. If not, the client starts offline and
    /// every mutation is queued until [`probe`](Self::probe) succeeds.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let api = Arc::new(CounterApi::new(config.clone())?);

        let storage: Arc<dyn QueueStorage> = match &config.queue_path {
            Some(path) => Arc::new(FileStorage::new(path)),
            None => Arc::new(MemoryStorage::new()),
        };
        let queue = Arc::new(OfflineQueue::open(storage).await);
        let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Offline));

        let subscriber = Arc::new(StreamSubscriber::new(config, monitor.clone())?);
        let engine = Arc::new(
            SyncEngine::new(api.clone(), queue, monitor).with_subscriber(subscriber.clone()),
        );

        let client = Self {
            colors: ColorRegistry::new(api.clone()),
            api,
            engine,
            subscriber,
        };
        client.listen(Callbacks::new());

        if client.api.health_check().await {
            let report = client.engine.handle_online().await;
            if !report.is_some_and(|r| r.resynced) {
                if let Err(e) = client.engine.resync().await {
                    warn!(error = %e, "Initial load failed");
                    client.engine.monitor().report_failure();
                }
            }
            info!(counters = client.engine.counters().len(), "Client online");
        } else {
            warn!(
                pending = client.engine.pending_count(),
                "Server unreachable, starting offline"
            );
        }

        Ok(client)
    }

    pub fn api(&self) -> &Arc<CounterApi> {
        &self.api
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn subscriber(&self) -> &Arc<StreamSubscriber> {
        &self.subscriber
    }

    pub fn colors(&self) -> &ColorRegistry {
        &self.colors
    }

    /// Route live events through the local cache and on to `listeners`.
    pub fn listen(&self, listeners: Callbacks) {
        self.subscriber
            .set_callbacks(self.engine.stream_callbacks(listeners));
    }

    /// Check reachability once and act on the result.
    pub async fn probe(&self) -> Option<ReplayReport> {
        let reachable = self.api.health_check().await;
        self.engine.check_connectivity(reachable).await
    }

    /// Probe on a fixed interval until the handle is aborted.
    pub fn spawn_probe(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Some(report) = client.probe().await {
                    info!(
                        replayed = report.replayed,
                        remaining = report.remaining,
                        "Replayed after reconnect"
                    );
                }
            }
        })
    }
}
