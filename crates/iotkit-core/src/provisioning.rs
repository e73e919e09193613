//! Boot-time provisioning state machine.
//!
//! ```text
//!          begin                      first Connected poll / cap reached
//!   Idle ─────────▶ Joining ─────────────────────────────────▶ Joined(Online | Offline)
//!     │                ▲
//!     │ no SSID or     │ credentials confirmed
//!     │ hook trigger   │
//!     └──────────▶ ConfigPortal ──── timeout / closed / failed ───▶ Restarting
//! ```
//!
//! The controller never blocks. The owner calls [`ProvisioningController::tick`]
//! periodically with a monotonic millisecond timestamp; joining advances by at
//! most one link poll per tick, the portal is polled once per tick, and all
//! deadlines are compared against the supplied timestamp.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::hooks::{DeviceHooks, Restarter};
use crate::network::{LinkStatus, NetworkLink};
use crate::portal::{access_point_name, ConfigPortal, PortalEvent, PortalRequest, DEFAULT_AP_PREFIX};
use crate::settings::{KeyValueBackend, SettingsStore};
use crate::wifi_settings::{WifiSettings, DEFAULT_NAMESPACE};

/// Link polls allowed before giving up on a join.
pub const DEFAULT_JOIN_POLL_CAP: u32 = 5;

/// Time between two link polls.
pub const DEFAULT_JOIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long the configuration portal stays open.
pub const DEFAULT_PORTAL_TIMEOUT: Duration = Duration::from_secs(180);

/// Delay between deciding to restart and issuing the restart.
pub const DEFAULT_RESTART_GRACE: Duration = Duration::from_secs(3);

/// Policy and naming for one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Settings namespace that confirmed credentials are committed to.
    pub namespace: String,
    /// Advertised access-point name of the portal.
    pub access_point: String,
    pub join_poll_cap: u32,
    pub join_poll_interval: Duration,
    pub portal_timeout: Duration,
    pub restart_grace: Duration,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            access_point: access_point_name(DEFAULT_AP_PREFIX, 0),
            join_poll_cap: DEFAULT_JOIN_POLL_CAP,
            join_poll_interval: DEFAULT_JOIN_POLL_INTERVAL,
            portal_timeout: DEFAULT_PORTAL_TIMEOUT,
            restart_grace: DEFAULT_RESTART_GRACE,
        }
    }
}

/// Result of a finished join sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The link came up.
    Online,
    /// The link did not come up; the device runs in degraded mode.
    Offline,
}

/// Provisioning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Idle,
    Joining,
    Joined(JoinOutcome),
    ConfigPortal,
    Restarting,
}

impl ProvisioningState {
    /// No further transitions happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Joined(_) | Self::Restarting)
    }
}

/// Bookkeeping for one join sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAttempt {
    /// Link polls performed so far.
    pub attempts: u32,
    pub started_at_ms: u64,
    pub last_poll_ms: Option<u64>,
    pub last_status: LinkStatus,
}

impl JoinAttempt {
    fn new(now_ms: u64) -> Self {
        Self {
            attempts: 0,
            started_at_ms: now_ms,
            last_poll_ms: None,
            last_status: LinkStatus::Disconnected,
        }
    }
}

/// Bookkeeping for one configuration-portal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalSession {
    pub active: bool,
    /// The user confirmed new values.
    pub confirmed: bool,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRestart {
    due_ms: u64,
    issued: bool,
}

/// Drives the join-or-configure decision for one boot.
pub struct ProvisioningController<H, N, P, R> {
    config: ProvisioningConfig,
    hooks: H,
    link: N,
    portal: P,
    restarter: R,
    state: ProvisioningState,
    join: Option<JoinAttempt>,
    last_join: Option<JoinAttempt>,
    session: Option<PortalSession>,
    last_session: Option<PortalSession>,
    restart: Option<PendingRestart>,
}

impl<H, N, P, R> ProvisioningController<H, N, P, R>
where
    H: DeviceHooks,
    N: NetworkLink,
    P: ConfigPortal,
    R: Restarter,
{
    pub fn new(config: ProvisioningConfig, hooks: H, link: N, portal: P, restarter: R) -> Self {
        Self {
            config,
            hooks,
            link,
            portal,
            restarter,
            state: ProvisioningState::Idle,
            join: None,
            last_join: None,
            session: None,
            last_session: None,
            restart: None,
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    /// Outcome of the join sequence, once it has finished.
    pub fn outcome(&self) -> Option<JoinOutcome> {
        match self.state {
            ProvisioningState::Joined(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// The link came up during provisioning.
    pub fn network_available(&self) -> bool {
        self.outcome() == Some(JoinOutcome::Online)
    }

    /// Network-dependent services (message bus, web endpoints) may start.
    pub fn services_ready(&self) -> bool {
        self.network_available()
    }

    /// The join sequence in progress, if any.
    pub fn join_attempt(&self) -> Option<&JoinAttempt> {
        self.join.as_ref()
    }

    /// The most recently finished join sequence.
    pub fn last_join(&self) -> Option<&JoinAttempt> {
        self.last_join.as_ref()
    }

    /// The portal session in progress, if any.
    pub fn session(&self) -> Option<&PortalSession> {
        self.session.as_ref()
    }

    /// The most recently finished portal session.
    pub fn last_session(&self) -> Option<&PortalSession> {
        self.last_session.as_ref()
    }

    /// The restart collaborator has been invoked.
    pub fn restart_requested(&self) -> bool {
        self.restart.map(|r| r.issued).unwrap_or(false)
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn link(&self) -> &N {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut N {
        &mut self.link
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn restarter(&self) -> &R {
        &self.restarter
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Make the entry decision. Only honoured from [`ProvisioningState::Idle`].
    pub fn begin(&mut self, now_ms: u64, settings: &WifiSettings) -> ProvisioningState {
        if self.state != ProvisioningState::Idle {
            warn!(state = ?self.state, "provisioning already started, ignoring begin");
            return self.state;
        }

        if !settings.is_configured() {
            info!("no network configured, opening configuration portal");
            self.enter_portal(now_ms, settings);
        } else if self.hooks.config_requested_on_startup() {
            info!("configuration requested by device, opening configuration portal");
            self.enter_portal(now_ms, settings);
        } else {
            self.start_join(now_ms, settings);
        }
        self.state
    }

    /// Advance the state machine. Never blocks.
    ///
    /// `settings` is only mutated when the user confirms new values in the
    /// portal, in which case they are committed through `store`.
    pub fn tick<B: KeyValueBackend>(
        &mut self,
        now_ms: u64,
        settings: &mut WifiSettings,
        store: &mut SettingsStore<B>,
    ) -> ProvisioningState {
        match self.state {
            ProvisioningState::Idle | ProvisioningState::Joined(_) => {}
            ProvisioningState::Joining => self.poll_join(now_ms),
            ProvisioningState::ConfigPortal => self.poll_portal(now_ms, settings, store),
            ProvisioningState::Restarting => self.poll_restart(now_ms),
        }
        self.state
    }

    fn start_join(&mut self, now_ms: u64, settings: &WifiSettings) {
        let attempt = JoinAttempt::new(now_ms);

        if !settings.is_configured() {
            warn!("empty network identifier, skipping join");
            self.join = Some(attempt);
            self.finish_join(JoinOutcome::Offline);
            return;
        }

        info!(
            ssid = settings.ssid(),
            password_len = settings.password().len(),
            "joining network"
        );

        if let Err(err) = self.link.begin_join(settings.ssid(), settings.password()) {
            warn!(%err, "failed to start join");
            self.join = Some(attempt);
            self.finish_join(JoinOutcome::Offline);
            return;
        }
        if let Err(err) = self.link.disable_power_save() {
            warn!(%err, "failed to disable power saving");
        }

        self.join = Some(attempt);
        self.state = ProvisioningState::Joining;
    }

    fn poll_join(&mut self, now_ms: u64) {
        let Some(mut attempt) = self.join else {
            self.finish_join(JoinOutcome::Offline);
            return;
        };

        if attempt.attempts >= self.config.join_poll_cap {
            self.finish_join(JoinOutcome::Offline);
            return;
        }

        // First poll right away, then one per interval.
        if let Some(last) = attempt.last_poll_ms {
            if now_ms.saturating_sub(last) < duration_ms(self.config.join_poll_interval) {
                return;
            }
        }

        let status = self.link.link_status();
        attempt.attempts += 1;
        attempt.last_poll_ms = Some(now_ms);
        attempt.last_status = status;
        self.join = Some(attempt);
        debug!(attempt = attempt.attempts, ?status, "polled link");

        if status.is_connected() {
            self.finish_join(JoinOutcome::Online);
        } else if attempt.attempts >= self.config.join_poll_cap {
            self.finish_join(JoinOutcome::Offline);
        }
    }

    fn finish_join(&mut self, outcome: JoinOutcome) {
        self.last_join = self.join.take();
        self.state = ProvisioningState::Joined(outcome);

        let attempts = self.last_join.map(|a| a.attempts).unwrap_or(0);
        match outcome {
            JoinOutcome::Online => {
                let rssi = self.link.rssi();
                info!(attempts, ?rssi, "network joined");
            }
            JoinOutcome::Offline => warn!(attempts, "network not joined, continuing offline"),
        }
    }

    fn enter_portal(&mut self, now_ms: u64, settings: &WifiSettings) {
        self.hooks.on_config(&self.config.access_point);

        let request = PortalRequest {
            access_point: self.config.access_point.clone(),
            timeout: self.config.portal_timeout,
            broker_defaults: settings.broker().cloned(),
        };

        match self.portal.open(&request) {
            Ok(()) => {
                let deadline_ms = now_ms.saturating_add(duration_ms(self.config.portal_timeout));
                info!(
                    access_point = %request.access_point,
                    timeout_s = request.timeout.as_secs(),
                    "configuration portal open"
                );
                self.session = Some(PortalSession {
                    active: true,
                    confirmed: false,
                    deadline_ms,
                });
                self.state = ProvisioningState::ConfigPortal;
            }
            Err(err) => {
                warn!(%err, "failed to open configuration portal");
                self.enter_restart(now_ms);
            }
        }
    }

    fn poll_portal<B: KeyValueBackend>(
        &mut self,
        now_ms: u64,
        settings: &mut WifiSettings,
        store: &mut SettingsStore<B>,
    ) {
        let Some(session) = self.session else {
            self.enter_restart(now_ms);
            return;
        };

        if now_ms >= session.deadline_ms {
            warn!("configuration portal timed out");
            self.exit_portal(false);
            self.enter_restart(now_ms);
            return;
        }

        match self.portal.poll() {
            PortalEvent::Pending => {}
            PortalEvent::Submitted(submission) => {
                info!(ssid = %submission.ssid, "configuration confirmed");
                self.exit_portal(true);

                let changed = submission.apply_to(settings);
                match store.commit(&self.config.namespace, settings) {
                    Ok(true) => debug!(changed, "confirmed settings saved"),
                    Ok(false) => debug!("confirmed settings unchanged"),
                    Err(err) => warn!(%err, "confirmed settings not saved"),
                }

                self.start_join(now_ms, settings);
            }
            PortalEvent::Closed => {
                warn!("configuration portal closed without confirmation");
                self.exit_portal(false);
                self.enter_restart(now_ms);
            }
            PortalEvent::Failed(err) => {
                warn!(%err, "configuration portal failed");
                self.exit_portal(false);
                self.enter_restart(now_ms);
            }
        }
    }

    fn exit_portal(&mut self, confirmed: bool) {
        self.portal.close();
        self.last_session = self.session.take().map(|mut session| {
            session.active = false;
            session.confirmed = confirmed;
            session
        });
    }

    fn enter_restart(&mut self, now_ms: u64) {
        let due_ms = now_ms.saturating_add(duration_ms(self.config.restart_grace));
        info!(grace_ms = due_ms - now_ms, "restart scheduled");
        self.restart = Some(PendingRestart {
            due_ms,
            issued: false,
        });
        self.state = ProvisioningState::Restarting;
    }

    fn poll_restart(&mut self, now_ms: u64) {
        let Some(plan) = self.restart.as_mut() else {
            return;
        };
        if plan.issued || now_ms < plan.due_ms {
            return;
        }
        plan.issued = true;
        warn!("restarting device");
        self.restarter.restart();
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ProvisioningState::Idle.is_terminal());
        assert!(!ProvisioningState::Joining.is_terminal());
        assert!(!ProvisioningState::ConfigPortal.is_terminal());
        assert!(ProvisioningState::Joined(JoinOutcome::Offline).is_terminal());
        assert!(ProvisioningState::Restarting.is_terminal());
    }

    #[test]
    fn test_default_config() {
        let config = ProvisioningConfig::default();

        assert_eq!(config.namespace, "WIFI");
        assert_eq!(config.join_poll_cap, 5);
        assert_eq!(config.join_poll_interval, Duration::from_secs(1));
        assert_eq!(config.portal_timeout, Duration::from_secs(180));
        assert_eq!(config.restart_grace, Duration::from_secs(3));
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
