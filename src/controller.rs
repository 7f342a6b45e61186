//! Owns the live display snapshot and coordinates refreshes with applies.
//!
//! Change notifications are debounced into a single refresh. While an apply is
//! in flight, notifications are ignored; the apply itself waits a settle delay
//! and then forces one refresh. Refreshes are serialized, so at most one fetch
//! is outstanding at any time.

use crate::remap::RemapOutcome;
use crate::service::{DisplayConfigService, ServiceError};
use crate::snapshot::DisplayState;
use crate::types::{ApplyMethod, Config, LogicalMonitor, Properties};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);
pub(crate) const SETTLE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timings {
    pub(crate) debounce: Duration,
    pub(crate) settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            debounce: DEBOUNCE_DELAY,
            settle: SETTLE_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Uninitialized,
    Ready,
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyState {
    Idle,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateEvent {
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyOutcome {
    Applied,
    /// No display state has been fetched yet, so nothing was sent.
    NoState,
}

#[derive(Debug, Error)]
pub(crate) enum ControllerError {
    #[error("another display configuration is still being applied")]
    Busy,
    #[error("display state controller has been shut down")]
    Destroyed,
    #[error(transparent)]
    Transport(#[from] ServiceError),
}

struct PendingRefresh {
    id: u64,
    task: JoinHandle<()>,
}

struct Shared {
    snapshot: Option<Arc<DisplayState>>,
    phase: Phase,
    apply: ApplyState,
    debounce: Option<PendingRefresh>,
    next_debounce_id: u64,
    listener: Option<JoinHandle<()>>,
    destroyed: bool,
}

struct Inner<S> {
    service: S,
    timings: Timings,
    shared: Mutex<Shared>,
    refresh_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<StateEvent>,
    shutdown: watch::Sender<bool>,
}

pub(crate) struct DisplayStateController<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for DisplayStateController<S> {
    fn clone(&self) -> Self {
        DisplayStateController {
            inner: Arc::clone(&self.inner),
        }
    }
}

// Resets the apply gate even when the apply future is dropped half-way.
struct ApplyGuard<'a, S> {
    inner: &'a Inner<S>,
}

impl<S> Drop for ApplyGuard<'_, S> {
    fn drop(&mut self) {
        self.inner.shared().apply = ApplyState::Idle;
    }
}

impl<S> Inner<S> {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_destroyed(&self) -> bool {
        self.shared().destroyed
    }
}

impl<S: DisplayConfigService> Inner<S> {
    fn notify_changed(self: &Arc<Self>) {
        let mut shared = self.shared();
        if shared.destroyed {
            return;
        }
        if shared.apply == ApplyState::InFlight {
            debug!("ignoring MonitorsChanged while a configuration is being applied");
            return;
        }
        if let Some(pending) = shared.debounce.take() {
            pending.task.abort();
        }

        shared.next_debounce_id += 1;
        let id = shared.next_debounce_id;
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.timings.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.take_debounce(id) {
                return;
            }
            if let Err(err) = inner.refresh().await {
                warn!(error = %err, "debounced display state refresh failed");
            }
        });
        shared.debounce = Some(PendingRefresh { id, task });
    }

    // Claims the pending debounce slot if `id` still owns it.
    fn take_debounce(&self, id: u64) -> bool {
        let mut shared = self.shared();
        if shared.destroyed || shared.apply == ApplyState::InFlight {
            return false;
        }
        if shared.debounce.as_ref().map(|p| p.id) != Some(id) {
            return false;
        }
        shared.debounce = None;
        true
    }

    async fn refresh(&self) -> Result<(), ControllerError> {
        let _gate = self.refresh_gate.lock().await;
        {
            let mut shared = self.shared();
            if shared.destroyed {
                return Err(ControllerError::Destroyed);
            }
            shared.phase = Phase::Refreshing;
        }

        let fetched = self.service.get_current_state().await;

        let mut shared = self.shared();
        if shared.destroyed {
            debug!("discarding display state fetched after shutdown");
            return Err(ControllerError::Destroyed);
        }
        match fetched {
            Ok(state) => {
                let state = DisplayState::from_current(state);
                debug!(
                    serial = state.serial,
                    displays = state.displays.len(),
                    "display state refreshed"
                );
                shared.snapshot = Some(Arc::new(state));
                shared.phase = Phase::Ready;
                drop(shared);
                // No subscribers is fine.
                let _ = self.events.send(StateEvent::Changed);
                Ok(())
            }
            Err(err) => {
                shared.phase = if shared.snapshot.is_some() {
                    Phase::Ready
                } else {
                    Phase::Uninitialized
                };
                Err(err.into())
            }
        }
    }

    async fn settle(&self) {
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.timings.settle) => {}
            _ = shutdown.wait_for(|down| *down) => {
                debug!("settle delay cut short by shutdown");
            }
        }
    }
}

impl<S: DisplayConfigService> DisplayStateController<S> {
    pub(crate) fn new(service: S, timings: Timings) -> Self {
        let (events, _) = broadcast::channel(16);
        let (shutdown, _) = watch::channel(false);
        DisplayStateController {
            inner: Arc::new(Inner {
                service,
                timings,
                shared: Mutex::new(Shared {
                    snapshot: None,
                    phase: Phase::Uninitialized,
                    apply: ApplyState::Idle,
                    debounce: None,
                    next_debounce_id: 0,
                    listener: None,
                    destroyed: false,
                }),
                refresh_gate: tokio::sync::Mutex::new(()),
                events,
                shutdown,
            }),
        }
    }

    /// Creates the controller and subscribes it to `MonitorsChanged`.
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(service: S, timings: Timings) -> Self {
        let controller = Self::new(service, timings);
        let mut changes = controller.inner.service.monitors_changed();
        let weak = Arc::downgrade(&controller.inner);
        let listener = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.notify_changed();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        controller.inner.shared().listener = Some(listener);
        controller
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn phase(&self) -> Phase {
        self.inner.shared().phase
    }

    pub(crate) fn has_state(&self) -> bool {
        self.inner.shared().snapshot.is_some()
    }

    pub(crate) fn is_applying(&self) -> bool {
        self.inner.shared().apply == ApplyState::InFlight
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<DisplayState>> {
        self.inner.shared().snapshot.clone()
    }

    /// The live layout as an unnamed config.
    pub(crate) fn current_config(&self) -> Option<Config> {
        self.snapshot().map(|s| s.to_config(""))
    }

    pub(crate) fn remap(&self, saved: &Config) -> Option<RemapOutcome> {
        self.snapshot().map(|s| s.remap(saved))
    }

    /// Feeds one change notification into the debounce timer.
    pub(crate) fn notify_changed(&self) {
        self.inner.notify_changed();
    }

    pub(crate) async fn refresh(&self) -> Result<(), ControllerError> {
        self.inner.refresh().await
    }

    /// Sends a layout to the display service.
    ///
    /// Rejected with [`ControllerError::Busy`] while another apply is in flight.
    /// Whatever the service answers, the controller waits for the settle delay
    /// and refreshes once before the service's result is returned.
    pub(crate) async fn apply(
        &self,
        logical_monitors: Vec<LogicalMonitor>,
        properties: Properties,
        method: ApplyMethod,
    ) -> Result<ApplyOutcome, ControllerError> {
        let inner = &*self.inner;
        let serial = {
            let mut shared = inner.shared();
            if shared.destroyed {
                return Err(ControllerError::Destroyed);
            }
            if shared.apply == ApplyState::InFlight {
                return Err(ControllerError::Busy);
            }
            let Some(snapshot) = shared.snapshot.as_ref() else {
                warn!("no display state fetched yet; nothing applied");
                return Ok(ApplyOutcome::NoState);
            };
            let serial = snapshot.serial;
            shared.apply = ApplyState::InFlight;
            if let Some(pending) = shared.debounce.take() {
                pending.task.abort();
            }
            serial
        };
        let in_flight = ApplyGuard { inner };

        // A debounced refresh that is already fetching finishes before the
        // apply is sent, and its serial is the one used.
        let gate = inner.refresh_gate.lock().await;
        let serial = {
            let shared = inner.shared();
            if shared.destroyed {
                return Err(ControllerError::Destroyed);
            }
            shared.snapshot.as_ref().map_or(serial, |s| s.serial)
        };

        info!(
            serial,
            method = method.code(),
            logical_monitors = logical_monitors.len(),
            "applying monitors config"
        );
        let result = inner
            .service
            .apply_monitors_config(serial, method, logical_monitors, properties)
            .await;
        drop(gate);
        if let Err(err) = &result {
            warn!(error = %err, "ApplyMonitorsConfig failed");
        }

        if !inner.is_destroyed() {
            inner.settle().await;
            match inner.refresh().await {
                Ok(()) | Err(ControllerError::Destroyed) => {}
                Err(err) => warn!(error = %err, "refresh after apply failed"),
            }
        }
        drop(in_flight);

        result
            .map(|()| ApplyOutcome::Applied)
            .map_err(ControllerError::from)
    }

    /// Remaps a saved config onto the live connectors and applies it.
    pub(crate) async fn apply_config(
        &self,
        config: &Config,
        method: ApplyMethod,
    ) -> Result<ApplyOutcome, ControllerError> {
        let Some(remapped) = self.remap(config) else {
            warn!(config = %config.name, "no display state fetched yet; nothing applied");
            return Ok(ApplyOutcome::NoState);
        };
        debug!(config = %config.name, connectors = ?remapped.connector_map, "remapped saved config");
        if !remapped.unmatched.is_empty() || !remapped.duplicate_names.is_empty() {
            info!(
                config = %config.name,
                unmatched = ?remapped.unmatched,
                duplicate_names = ?remapped.duplicate_names,
                "saved config only partly matches the connected displays"
            );
        }
        self.apply(
            remapped.logical_monitors,
            config.properties.clone(),
            method,
        )
        .await
    }

    /// Cancels pending timers, unsubscribes from change notifications, and makes
    /// every later or still-running operation a no-op.
    pub(crate) fn shutdown(&self) {
        let (debounce, listener) = {
            let mut shared = self.inner.shared();
            if shared.destroyed {
                return;
            }
            shared.destroyed = true;
            (shared.debounce.take(), shared.listener.take())
        };
        if let Some(pending) = debounce {
            pending.task.abort();
        }
        if let Some(listener) = listener {
            listener.abort();
        }
        self.inner.shutdown.send_replace(true);
        info!("display state controller shut down");
    }
}
