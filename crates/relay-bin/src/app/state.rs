//! Relay state definition and wiring.

use crate::adapters::{BroadcastMessenger, RelayExecutor, ThrottledNotifier, TracingMetrics};
use callback_registry::{ApiTimeouts, CallbackRegistry, SignalApi};
use frame_dispatcher::{Dispatcher, DispatcherParts};
use relay_config_and_utils::Config;
use relay_ports::{ChannelRepository, InMemoryChannelStore, MetricsSink};
use relay_protocol_types::ShardId;
use resend_queue::ResendQueue;
use safety_number_workflow::SafetyNumberWorkflow;
use shard_transport::{ShardEvent, Transport, TransportConfig, TransportResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared relay state (cheap to clone).
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    pub transport: Arc<Transport>,
    /// Channel and membership store backing every collaborator.
    pub store: Arc<InMemoryChannelStore>,
    pub api: SignalApi,
    pub resend: ResendQueue,
    pub dispatcher: Dispatcher,
}

impl RelayState {
    /// Wire the core around `store`. Listener lifecycle events go to `events`.
    pub fn build(
        config: Config,
        store: Arc<InMemoryChannelStore>,
        events: mpsc::UnboundedSender<ShardEvent>,
    ) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(Transport::with_events(
            TransportConfig::from_config(&config),
            events,
        ));
        let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetrics);

        let api = SignalApi::new(
            transport.clone(),
            CallbackRegistry::new(metrics.clone()),
            ApiTimeouts::from_config(&config),
        );
        let notifier = Arc::new(ThrottledNotifier::new(
            api.clone(),
            store.clone(),
            store.clone(),
            config.notice_cooldown(),
        ));
        let resend = ResendQueue::new(
            transport.clone(),
            notifier.clone(),
            metrics.clone(),
            config.resend.clone(),
        );
        let safety_numbers =
            SafetyNumberWorkflow::new(api.clone(), store.clone(), notifier.clone(), metrics.clone());

        let dispatcher = Dispatcher::new(DispatcherParts {
            api: api.clone(),
            resend: resend.clone(),
            safety_numbers,
            channels: store.clone(),
            membership: store.clone(),
            executor: Arc::new(RelayExecutor),
            messenger: Arc::new(BroadcastMessenger::new(api.clone(), store.clone())),
            notifier,
            metrics,
        });

        Self {
            config,
            transport,
            store,
            api,
            resend,
            dispatcher,
        }
    }

    /// Shard indices the relay serves.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> {
        (0..self.config.shard_count).map(ShardId)
    }

    /// Connect every shard with the dispatcher as line handler. Stops at the
    /// first shard that cannot be reached.
    pub async fn connect_all(&self) -> TransportResult<()> {
        for shard in self.shards() {
            self.transport
                .connect(shard, Arc::new(self.dispatcher.clone()))
                .await?;
        }
        Ok(())
    }

    /// Subscribe every channel served by `shard`. Returns how many succeeded.
    pub async fn subscribe_shard(&self, shard: ShardId) -> usize {
        let channels = match self.store.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(shard = %shard, error = %e, "Failed to list channels for subscription");
                return 0;
            }
        };

        let mut subscribed = 0;
        for channel in channels.iter().filter(|c| c.shard == shard) {
            match self.api.subscribe(shard, &channel.phone_number).await {
                Ok(()) => subscribed += 1,
                Err(e) => warn!(
                    shard = %shard,
                    channel = %channel.phone_number,
                    error = %e,
                    "Failed to subscribe channel"
                ),
            }
        }
        debug!(shard = %shard, subscribed, "Shard channels subscribed");
        subscribed
    }

    /// Cancel pending resends and close every shard.
    pub fn shutdown(&self) {
        self.resend.cancel_all();
        self.transport.stop_all();
        info!("Relay state shut down");
    }
}
