//! Tokio tick driver.
//!
//! Runs [`Application::setup`] once, then calls [`Application::tick`] on a
//! fixed interval until the device asks for a restart or the shutdown future
//! resolves. The status endpoint is started the first time the application
//! reports its services as ready.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use iotkit_core::provisioning::duration_ms;
use iotkit_core::{
    Application, ConfigPortal, DeviceHooks, KeyValueBackend, NetworkLink, Restarter,
};

use crate::restart::RESTART_EXIT_CODE;
use crate::status::{spawn_status_server, SharedStatus, StatusSnapshot};

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    /// The device asked to be restarted.
    Restart,
    /// The shutdown future resolved.
    Shutdown,
}

impl DriverExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverExit::Restart => RESTART_EXIT_CODE,
            DriverExit::Shutdown => 0,
        }
    }
}

pub struct Driver {
    tick_interval: Duration,
    status_addr: Option<SocketAddr>,
    status: SharedStatus,
}

impl Driver {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            status_addr: None,
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
        }
    }

    /// Serve the status endpoint on `addr` once services are ready.
    pub fn with_status_endpoint(mut self, addr: SocketAddr) -> Self {
        self.status_addr = Some(addr);
        self
    }

    /// Snapshot updated after every tick.
    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    pub async fn run<B, H, N, P, R, F>(
        &self,
        app: &mut Application<B, H, N, P, R>,
        shutdown: F,
    ) -> DriverExit
    where
        B: KeyValueBackend,
        H: DeviceHooks,
        N: NetworkLink,
        P: ConfigPortal,
        R: Restarter,
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let now_ms = || duration_ms(started.elapsed());

        let state = app.setup(now_ms());
        debug!(?state, "setup finished");

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status_server: Option<JoinHandle<()>> = None;
        let mut status_started = false;

        tokio::pin!(shutdown);

        let exit = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break DriverExit::Shutdown;
                }
                _ = interval.tick() => {
                    let now = now_ms();
                    app.tick(now);

                    if app.take_publish_request() {
                        info!(name = %app.properties().name, "publishing device state");
                    }

                    let snapshot = StatusSnapshot::capture(app, now);
                    *self.status.write().await = snapshot;

                    if !status_started && app.services_ready() {
                        status_started = true;
                        status_server = self.start_status_server().await;
                    }

                    if app.controller().restart_requested() {
                        break DriverExit::Restart;
                    }
                }
            }
        };

        if let Some(handle) = status_server {
            handle.abort();
        }
        info!(?exit, "tick driver stopped");
        exit
    }

    async fn start_status_server(&self) -> Option<JoinHandle<()>> {
        let addr = self.status_addr?;
        match spawn_status_server(addr, self.status.clone()).await {
            Ok((_, handle)) => Some(handle),
            Err(e) => {
                warn!("Status endpoint unavailable: {}", e);
                None
            }
        }
    }
}
