//! Correlation of daemon responses with outstanding requests.
//!
//! Every registration resolves exactly once: either a matching response
//! removes it, or its timer does. Both paths remove the entry under the same
//! lock, and the timer carries the generation of the entry it was started
//! for, so a timer that loses the race finds nothing (or a newer entry) and
//! does nothing.

use crate::error::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use relay_ports::metrics::names;
use relay_ports::MetricsSink;
use relay_protocol_types::{CallbackKind, CorrelationKey, Frame, IdentityFailure};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Value delivered to an awaiting caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlated {
    Verified,
    Trusted,
    /// Every recipient accepted the message.
    Sent { latency: Duration },
    /// Some recipients refused the message because their identity changed.
    IdentityFailure { failures: Vec<IdentityFailure> },
    Healthcheck { elapsed: Duration },
    Version(String),
}

/// How a registration is resolved.
pub enum Resolution {
    /// A caller is waiting for the outcome.
    Awaited(oneshot::Sender<RegistryResult<Correlated>>),
    /// Nobody waits; the entry exists for its side effects (latency,
    /// identity-failure correlation) and vanishes silently on timeout.
    FireAndForget,
}

/// What [`CallbackRegistry::handle`] did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// No outstanding request matches; classify the frame normally.
    Unmatched,
    /// The frame answered an outstanding request.
    Resolved(CorrelationKey),
    /// Send results reported identity failures. `original` is the send
    /// frame stored at registration.
    IdentityFailures {
        key: CorrelationKey,
        failures: Vec<IdentityFailure>,
        original: Option<Frame>,
    },
}

struct CallbackEntry {
    resolution: Resolution,
    aux: Option<Frame>,
    registered_at: Instant,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl CallbackEntry {
    fn resolve(self, result: RegistryResult<Correlated>) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
        if let Resolution::Awaited(tx) = self.resolution {
            // The waiter may have given up; that is not an error here.
            let _ = tx.send(result);
        }
    }
}

struct Inner {
    entries: Mutex<HashMap<CorrelationKey, CallbackEntry>>,
    next_generation: AtomicU64,
    metrics: Arc<dyn MetricsSink>,
}

impl Inner {
    fn remove(&self, key: &CorrelationKey) -> Option<CallbackEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.remove(key);
        self.metrics
            .set_gauge(names::PENDING_CALLBACKS, entries.len() as f64, &[]);
        entry
    }

    fn expire(&self, key: &CorrelationKey, generation: u64) {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(entry) if entry.generation == generation => entries.remove(key),
                _ => None,
            }
        };

        let Some(mut entry) = entry else {
            return;
        };
        entry.timer = None;

        self.metrics
            .increment_counter(names::CALLBACK_TIMEOUTS, &[("kind", key.kind.as_str())]);
        match entry.resolution {
            Resolution::Awaited(_) => warn!(key = %key, "Response timed out"),
            Resolution::FireAndForget => debug!(key = %key, "Fire-and-forget entry expired"),
        }
        entry.resolve(Err(RegistryError::Timeout(key.clone())));
    }
}

/// A registration someone is waiting on.
pub struct PendingResponse {
    key: CorrelationKey,
    rx: oneshot::Receiver<RegistryResult<Correlated>>,
}

impl PendingResponse {
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// Wait for the response or the timeout, whichever comes first.
    pub async fn wait(self) -> RegistryResult<Correlated> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Cancelled(self.key)),
        }
    }
}

/// Outstanding requests keyed by [`CorrelationKey`].
#[derive(Clone)]
pub struct CallbackRegistry {
    inner: Arc<Inner>,
}

impl CallbackRegistry {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                metrics,
            }),
        }
    }

    /// Store an entry and start its timeout. A previous entry under the same
    /// key is displaced and resolved with [`RegistryError::Replaced`].
    pub fn register(
        &self,
        key: CorrelationKey,
        resolution: Resolution,
        aux: Option<Frame>,
        timeout: Duration,
    ) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = CallbackEntry {
            resolution,
            aux,
            registered_at: Instant::now(),
            generation,
            timer: None,
        };

        let displaced = {
            let mut entries = self.inner.entries.lock();
            let displaced = entries.insert(key.clone(), entry);
            self.inner
                .metrics
                .set_gauge(names::PENDING_CALLBACKS, entries.len() as f64, &[]);
            displaced
        };
        if let Some(old) = displaced {
            debug!(key = %key, "Registration replaced");
            old.resolve(Err(RegistryError::Replaced(key.clone())));
        }

        // Spawned after insertion so even a zero timeout finds the entry.
        let timer = {
            let inner = self.inner.clone();
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                inner.expire(&key, generation);
            })
        };

        let mut entries = self.inner.entries.lock();
        match entries.get_mut(&key) {
            Some(entry) if entry.generation == generation => entry.timer = Some(timer),
            _ => timer.abort(),
        }
    }

    /// Register an awaited entry and return the handle to wait on.
    pub fn expect(
        &self,
        key: CorrelationKey,
        aux: Option<Frame>,
        timeout: Duration,
    ) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        self.register(key.clone(), Resolution::Awaited(tx), aux, timeout);
        PendingResponse { key, rx }
    }

    /// Remove an entry without a response, e.g. when its request could not
    /// be written. An awaiting caller receives [`RegistryError::Cancelled`].
    pub fn cancel(&self, key: &CorrelationKey) -> bool {
        match self.inner.remove(key) {
            Some(entry) => {
                entry.resolve(Err(RegistryError::Cancelled(key.clone())));
                true
            }
            None => false,
        }
    }

    /// Resolve the entry `frame` answers, if any.
    pub fn handle(&self, frame: &Frame) -> HandleOutcome {
        let Some(key) = frame.correlation_key() else {
            return HandleOutcome::Unmatched;
        };
        let Some(mut entry) = self.inner.remove(&key) else {
            debug!(key = %key, "No outstanding request for response");
            return HandleOutcome::Unmatched;
        };

        let elapsed = entry.registered_at.elapsed();
        let aux = entry.aux.take();

        match (key.kind, frame) {
            (CallbackKind::Verify, Frame::VerificationError(error)) => {
                entry.resolve(Err(RegistryError::Rejected {
                    key: key.clone(),
                    message: error.data.message.clone(),
                }));
            }
            (CallbackKind::Verify, _) => entry.resolve(Ok(Correlated::Verified)),
            (CallbackKind::Trust, _) => entry.resolve(Ok(Correlated::Trusted)),
            (CallbackKind::Send, Frame::SendResults(results)) => {
                let failures = results.identity_failures();
                if !failures.is_empty() {
                    entry.resolve(Ok(Correlated::IdentityFailure {
                        failures: failures.clone(),
                    }));
                    return HandleOutcome::IdentityFailures {
                        key,
                        failures,
                        original: aux,
                    };
                }
                if results.all_succeeded() {
                    self.inner.metrics.observe_histogram(
                        names::SEND_ROUNDTRIP_SECONDS,
                        elapsed.as_secs_f64(),
                        &[],
                    );
                }
                entry.resolve(Ok(Correlated::Sent { latency: elapsed }));
            }
            (CallbackKind::Send, _) => entry.resolve(Ok(Correlated::Sent { latency: elapsed })),
            (CallbackKind::Healthcheck, _) => {
                entry.resolve(Ok(Correlated::Healthcheck { elapsed }));
            }
            (CallbackKind::Version, Frame::Version(version)) => {
                let version = version
                    .data
                    .as_ref()
                    .map(|d| d.version.clone())
                    .unwrap_or_default();
                entry.resolve(Ok(Correlated::Version(version)));
            }
            (CallbackKind::Version, _) => entry.resolve(Ok(Correlated::Version(String::new()))),
        }

        debug!(key = %key, elapsed_ms = elapsed.as_millis() as u64, "Response correlated");
        HandleOutcome::Resolved(key)
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}
