//! Brew session.
//!
//! A [`BrewSession`] is one connection to the teapot plus the brew it runs.
//! Connecting discovers the device, opens the serial link and starts two
//! background tasks: the telemetry poller, which owns the link, and the
//! infusion countdown. Cancelling or closing the session stops both, sends
//! the kettle a final off instruction and releases the link.
//!
//! There is no automatic reconnection; call [`BrewSession::connect`] again.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::brew::{run_countdown, BrewController, BrewEvent, BrewPhase, BrewSnapshot, Recipe};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::poller::{PollerExit, TelemetryPoller};
use crate::transport::{discover, DeviceIdentity, FramedTransport, Radio};

/// Registration returned by [`BrewSession::on_event`].
///
/// The callback stays registered until this handle is dropped or
/// [`unregister`](Self::unregister) is called.
pub struct CallbackHandle {
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl CallbackHandle {
    fn new(id: u64, task: JoinHandle<()>) -> Self {
        Self {
            id,
            task: Some(task),
        }
    }

    /// Stop delivering events to the callback.
    pub fn unregister(mut self) {
        self.abort();
    }

    /// Registration id, unique per session.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// A connected brew.
pub struct BrewSession {
    identity: DeviceIdentity,
    controller: Arc<BrewController>,
    stop: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<PollerExit>>>,
    countdown: Mutex<Option<JoinHandle<()>>>,
    callback_counter: AtomicU64,
}

impl BrewSession {
    /// Connect to the configured teapot and start brewing `recipe`.
    ///
    /// Discovery and open errors are returned here; once connected, I/O
    /// problems are handled by the poller.
    pub async fn connect(radio: &dyn Radio, config: &SessionConfig, recipe: Recipe) -> Result<Self> {
        info!(
            "Connecting to {} to brew {}",
            config.device_name, recipe.name
        );

        let identity = discover(radio, config.device_name.as_str(), config.service_uuid).await?;
        let transport = FramedTransport::open(radio, identity.clone()).await?;

        let controller = Arc::new(BrewController::new(recipe));
        controller.on_connected();

        let (stop, stop_rx) = watch::channel(false);
        let poller = TelemetryPoller::new(transport, controller.clone(), config);
        let poller = tokio::spawn(poller.run(stop_rx));
        let countdown = tokio::spawn(run_countdown(controller.clone(), config.countdown_tick));

        Ok(Self {
            identity,
            controller,
            stop,
            poller: Mutex::new(Some(poller)),
            countdown: Mutex::new(Some(countdown)),
            callback_counter: AtomicU64::new(0),
        })
    }

    /// The connected device.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The recipe being brewed.
    pub fn recipe(&self) -> Recipe {
        self.controller.recipe()
    }

    /// Current phase.
    pub fn phase(&self) -> BrewPhase {
        self.controller.phase()
    }

    /// Snapshot of the brew.
    pub fn snapshot(&self) -> BrewSnapshot {
        self.controller.snapshot()
    }

    /// Whether the poller still holds the link.
    pub fn is_active(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Subscribe to brew events.
    pub fn subscribe(&self) -> broadcast::Receiver<BrewEvent> {
        self.controller.subscribe()
    }

    /// Watch the phase.
    pub fn watch_phase(&self) -> watch::Receiver<BrewPhase> {
        self.controller.watch_phase()
    }

    /// Register a callback for brew events.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&BrewEvent) + Send + Sync + 'static,
    {
        let id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.controller.subscribe();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Event callback {} missed {} events", id, missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(id, task)
    }

    /// Wait until the brew is ready or cancelled.
    pub async fn wait_until_finished(&self) -> BrewPhase {
        let mut phase = self.controller.watch_phase();
        loop {
            let current = *phase.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if phase.changed().await.is_err() {
                return self.controller.phase();
            }
        }
    }

    /// Cancel the brew and close the session.
    pub async fn cancel(&self) -> Result<()> {
        info!("Cancelling brew on {}", self.identity.name);
        self.close().await
    }

    /// End the session. Safe to call more than once.
    ///
    /// A brew still in progress is cancelled. The poller sends the off
    /// instruction and closes the link before this returns.
    pub async fn close(&self) -> Result<()> {
        self.controller.cancel();
        self.stop.send_replace(true);

        let countdown = self.countdown.lock().take();
        if let Some(handle) = countdown {
            handle.abort();
            let _ = handle.await;
        }

        let poller = self.poller.lock().take();
        if let Some(handle) = poller {
            match handle.await {
                Ok(exit) => debug!("Poller for {} ended: {:?}", self.identity.name, exit),
                Err(e) if e.is_panic() => {
                    return Err(Error::Internal(format!("poller task panicked: {e}")));
                }
                Err(_) => {}
            }
            info!("Session with {} closed", self.identity.name);
        }

        Ok(())
    }
}

impl Drop for BrewSession {
    fn drop(&mut self) {
        self.controller.cancel();
        self.stop.send_replace(true);
    }
}

impl std::fmt::Debug for BrewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrewSession")
            .field("identity", &self.identity)
            .field("phase", &self.phase())
            .finish()
    }
}
