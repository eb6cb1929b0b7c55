//! Session lifecycle.
//!
//! [`SessionController::initialize`] opens the remote client, links the device
//! with a QR code or a pairing code, and resolves once the remote has synced
//! and `ready` has been emitted. Remote signals are consumed by a background
//! task one at a time, so handlers for a signal finish before the next signal
//! is looked at.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::error::SessionError;
use super::events::EventBus;
use super::pairing;
use super::remote::{QrCredentials, RemoteError, RemoteSession, RemoteSignal};
use super::storage;
use crate::config::SessionOptions;
use crate::types::{ConnectionState, DisconnectReason};

/// Backoff before retry `n` is `n` times this.
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_secs(15);

/// Attempts used by callers that have no preference.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const POST_LOGOUT_MARKER: &str = "post_logout=1";

/// Where the controller is in the authentication cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Not authenticated; waiting for pairing or sync
    Idle,
    /// `authenticated` emitted, store injection in progress
    Authenticating,
    /// `ready` emitted
    Ready,
    /// A logout was requested and the navigation that completes it is pending
    LoggingOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Failure {
    Disconnected(DisconnectReason),
    Remote(RemoteError),
    SignalsClosed,
}

impl From<Failure> for SessionError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Disconnected(reason) => SessionError::Disconnected(reason),
            Failure::Remote(err) => SessionError::Remote(err),
            Failure::SignalsClosed => SessionError::SignalsClosed,
        }
    }
}

/// Result of the current initialization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Pending,
    Ready,
    Failed(Failure),
}

#[derive(Debug, Default)]
struct QrState {
    credentials: Option<QrCredentials>,
    emitted: u32,
}

struct Inner {
    remote: Arc<dyn RemoteSession>,
    options: SessionOptions,
    events: EventBus,
    phase: Mutex<SessionPhase>,
    state: watch::Sender<Option<ConnectionState>>,
    outcome: watch::Sender<Outcome>,
    qr: Mutex<QrState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Drives one remote session through pairing and synchronisation.
///
/// Cloning is cheap and every clone controls the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(remote: Arc<dyn RemoteSession>, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(None);
        let (outcome, _) = watch::channel(Outcome::Pending);

        Self {
            inner: Arc::new(Inner {
                remote,
                options,
                events: EventBus::new(),
                phase: Mutex::new(SessionPhase::Idle),
                state,
                outcome,
                qr: Mutex::new(QrState::default()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Event channels, for handlers that need the full [`EventBus`] API.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn phase(&self) -> SessionPhase {
        *lock(&self.inner.phase)
    }

    /// Last state reported by the remote, if any.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        *self.inner.state.borrow()
    }

    pub fn on_qr<F>(&self, handler: F) -> &Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.inner.events.qr.subscribe(handler);
        self
    }

    pub fn on_qr_async<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.qr.subscribe_async(handler);
        self
    }

    pub fn on_code<F>(&self, handler: F) -> &Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.inner.events.code.subscribe(handler);
        self
    }

    pub fn on_code_async<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.code.subscribe_async(handler);
        self
    }

    pub fn on_authenticated<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.authenticated.subscribe(move |()| handler());
        self
    }

    pub fn on_authenticated_async<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .events
            .authenticated
            .subscribe_async(move |()| handler());
        self
    }

    pub fn on_ready<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.ready.subscribe(move |()| handler());
        self
    }

    pub fn on_ready_async<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.ready.subscribe_async(move |()| handler());
        self
    }

    pub fn on_auth_state_changed<F>(&self, handler: F) -> &Self
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.inner.events.auth_state_changed.subscribe(handler);
        self
    }

    pub fn on_auth_state_changed_async<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn(ConnectionState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.auth_state_changed.subscribe_async(handler);
        self
    }

    pub fn on_loading_progress<F>(&self, handler: F) -> &Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.inner.events.loading_progress.subscribe(handler);
        self
    }

    pub fn on_loading_progress_async<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn(u8) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.loading_progress.subscribe_async(handler);
        self
    }

    pub fn on_disconnected<F>(&self, handler: F) -> &Self
    where
        F: Fn(DisconnectReason) + Send + Sync + 'static,
    {
        self.inner.events.disconnected.subscribe(handler);
        self
    }

    pub fn on_disconnected_async<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn(DisconnectReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.disconnected.subscribe_async(handler);
        self
    }

    /// Open the session and wait until it is ready.
    ///
    /// Transient failures tear the remote down, delete the stored session and
    /// retry after `attempt * 15s`, up to `max_attempts` attempts (at least
    /// one). Any other failure is returned immediately.
    pub async fn initialize(&self, max_attempts: u32) -> Result<(), SessionError> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            info!("initializing session, attempt {}/{}", attempt, max_attempts);

            let err = match self.try_initialize().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                warn!("session initialization failed: {}", err);
                return Err(err);
            }

            let backoff = RETRY_BACKOFF_STEP * attempt;
            warn!(
                "session initialization hit a transient error ({}), clearing session and retrying in {:?}",
                err, backoff
            );

            self.teardown().await;
            if let Err(clear_err) = storage::clear_session(&self.inner.options.session_path).await {
                debug!("failed to clear session storage: {}", clear_err);
            }

            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Delete the persisted session directory.
    pub async fn clear_session(&self) -> Result<(), SessionError> {
        storage::clear_session(&self.inner.options.session_path).await?;
        Ok(())
    }

    /// Stop background work and close the remote session.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.abort_tasks();
        self.set_phase(SessionPhase::Idle);
        self.inner.remote.close().await?;
        info!("session shut down");
        Ok(())
    }

    async fn try_initialize(&self) -> Result<(), SessionError> {
        self.reset();

        storage::ensure_session_dir(&self.inner.options.session_path).await?;
        let signals = self.inner.remote.open(&self.inner.options).await?;
        self.track(tokio::spawn(self.clone().pump(signals)));

        let initial = self.inner.remote.app_state().await?;
        // a state already delivered by the signal stream is newer
        let adopted = self.inner.state.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(initial);
                true
            } else {
                false
            }
        });

        if adopted {
            if let Some(reason) = initial.disconnect_reason() {
                warn!("remote opened in terminal state {}", initial);
                self.inner.events.disconnected.emit(reason).await;
                self.settle(Outcome::Failed(Failure::Disconnected(reason)));
                return Err(SessionError::Disconnected(reason));
            }
        }

        let state = self.wait_for_settled_state().await?;
        debug!("remote settled in state {}", state);

        if state.disconnect_reason().is_some() {
            // the signal pump reports the disconnect and settles the outcome
            return self.wait_for_outcome().await;
        }

        if self.inner.remote.has_synced().await? {
            self.complete_authentication().await?;
            return self.wait_for_outcome().await;
        }

        if state.is_unpaired() {
            self.start_pairing().await?;
        }

        self.wait_for_outcome().await
    }

    fn reset(&self) {
        self.abort_tasks();
        self.set_phase(SessionPhase::Idle);
        self.inner.state.send_replace(None);
        self.inner.outcome.send_replace(Outcome::Pending);
        *lock(&self.inner.qr) = QrState::default();
    }

    async fn teardown(&self) {
        self.abort_tasks();
        if let Err(err) = self.inner.remote.close().await {
            debug!("failed to close remote session: {}", err);
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        lock(&self.inner.tasks).push(task);
    }

    fn abort_tasks(&self) {
        let tasks = std::mem::take(&mut *lock(&self.inner.tasks));
        for task in tasks {
            task.abort();
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        *lock(&self.inner.phase) = phase;
    }

    /// Record the attempt outcome unless one is already recorded.
    fn settle(&self, outcome: Outcome) -> bool {
        self.inner.outcome.send_if_modified(|current| {
            if *current == Outcome::Pending {
                *current = outcome;
                true
            } else {
                false
            }
        })
    }

    fn is_pending(&self) -> bool {
        *self.inner.outcome.borrow() == Outcome::Pending
    }

    async fn wait_for_outcome(&self) -> Result<(), SessionError> {
        let mut outcomes = self.inner.outcome.subscribe();
        let outcome = outcomes
            .wait_for(|outcome| *outcome != Outcome::Pending)
            .await
            .map(|outcome| Outcome::clone(&outcome))
            .map_err(|_| SessionError::SignalsClosed)?;

        match outcome {
            Outcome::Ready => Ok(()),
            Outcome::Failed(failure) => Err(failure.into()),
            Outcome::Pending => Err(SessionError::SignalsClosed),
        }
    }

    /// Wait until the remote leaves Opening/Unlaunched/Pairing.
    async fn wait_for_settled_state(&self) -> Result<ConnectionState, SessionError> {
        let mut states = self.inner.state.subscribe();
        let mut outcomes = self.inner.outcome.subscribe();

        tokio::select! {
            settled = states.wait_for(|state| state.map_or(false, |s| !s.is_transitional())) => {
                settled
                    .ok()
                    .and_then(|state| *state)
                    .ok_or(SessionError::SignalsClosed)
            }
            outcome = outcomes.wait_for(|outcome| *outcome != Outcome::Pending) => {
                match outcome.map(|outcome| Outcome::clone(&outcome)) {
                    Ok(Outcome::Failed(failure)) => Err(failure.into()),
                    Ok(_) => Ok(self.connection_state().unwrap_or(ConnectionState::Connected)),
                    Err(_) => Err(SessionError::SignalsClosed),
                }
            }
        }
    }

    async fn start_pairing(&self) -> Result<(), SessionError> {
        let options = &self.inner.options;

        match &options.pair_with_phone_number {
            Some(phone_number) => {
                let code = pairing::request_pairing_code(
                    self.inner.remote.as_ref(),
                    phone_number,
                    options.show_pairing_notification,
                )
                .await?;
                info!("pairing code issued");
                self.inner.events.code.emit(code).await;
                self.spawn_pairing_code_refresh(phone_number.clone());
            }
            None => {
                let credentials = self.inner.remote.qr_credentials().await?;
                lock(&self.inner.qr).credentials = Some(credentials);
                self.emit_qr().await?;
            }
        }

        Ok(())
    }

    /// Re-issue the pairing code every interval while the remote stays unpaired.
    fn spawn_pairing_code_refresh(&self, phone_number: String) {
        let controller = self.clone();
        let interval = self.inner.options.pairing_code_interval;

        self.track(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let unpaired = controller
                    .connection_state()
                    .map_or(false, ConnectionState::is_unpaired);
                if !unpaired {
                    debug!("remote no longer unpaired, stopping pairing code refresh");
                    break;
                }

                let inner = &controller.inner;
                match pairing::request_pairing_code(
                    inner.remote.as_ref(),
                    &phone_number,
                    inner.options.show_pairing_notification,
                )
                .await
                {
                    Ok(code) => inner.events.code.emit(code).await,
                    Err(err) => warn!(
                        "pairing code refresh failed, trying again in {:?}: {}",
                        interval, err
                    ),
                }
            }
        }));
    }

    /// Emit the QR payload for the stored credentials, enforcing `qr_max_retries`.
    async fn emit_qr(&self) -> Result<(), SessionError> {
        let (payload, emitted) = {
            let mut qr = lock(&self.inner.qr);
            let Some(credentials) = qr.credentials.as_ref() else {
                return Ok(());
            };
            let payload = pairing::qr_payload(credentials);
            qr.emitted += 1;
            (payload, qr.emitted)
        };

        if let Some(max) = self.inner.options.qr_max_retries {
            if emitted > max {
                let reason = DisconnectReason::MaxQrRetries;
                warn!("no QR code scanned after {} attempts, giving up", max);
                self.inner.events.disconnected.emit(reason).await;
                self.settle(Outcome::Failed(Failure::Disconnected(reason)));
                if let Err(err) = self.inner.remote.close().await {
                    debug!("failed to close remote session: {}", err);
                }
                return Err(SessionError::Disconnected(reason));
            }
        }

        debug!("emitting QR code #{}", emitted);
        self.inner.events.qr.emit(payload).await;
        Ok(())
    }

    /// authenticated, then store injection, then ready; once per cycle.
    async fn complete_authentication(&self) -> Result<(), RemoteError> {
        {
            let mut phase = lock(&self.inner.phase);
            if *phase != SessionPhase::Idle {
                debug!("ignoring sync while {:?}", *phase);
                return Ok(());
            }
            *phase = SessionPhase::Authenticating;
        }

        info!("session authenticated");
        self.inner.events.authenticated.emit(()).await;

        if let Err(err) = self.inner.remote.inject_store().await {
            self.set_phase(SessionPhase::Idle);
            return Err(err);
        }

        {
            let mut phase = lock(&self.inner.phase);
            if *phase != SessionPhase::Authenticating {
                debug!("phase changed to {:?} before ready", *phase);
                return Ok(());
            }
            *phase = SessionPhase::Ready;
        }

        info!("session ready");
        self.inner.events.ready.emit(()).await;
        self.settle(Outcome::Ready);
        Ok(())
    }

    async fn pump(self, mut signals: mpsc::UnboundedReceiver<RemoteSignal>) {
        while let Some(signal) = signals.recv().await {
            debug!("remote signal: {:?}", signal);
            self.handle_signal(signal).await;
        }

        debug!("remote signal stream ended");
        self.settle(Outcome::Failed(Failure::SignalsClosed));
    }

    async fn handle_signal(&self, signal: RemoteSignal) {
        match signal {
            RemoteSignal::StateChanged(state) => self.on_state_changed(state).await,
            RemoteSignal::Synced => {
                if let Err(err) = self.complete_authentication().await {
                    warn!("failed to finish authentication: {}", err);
                    self.settle(Outcome::Failed(Failure::Remote(err)));
                }
            }
            RemoteSignal::OfflineProgress(percent) => {
                if self.phase() == SessionPhase::LoggingOut {
                    return;
                }
                self.inner.events.loading_progress.emit(percent.min(100)).await;
            }
            RemoteSignal::RefChanged(new_ref) => self.on_ref_changed(new_ref).await,
            RemoteSignal::LogoutRequested => {
                info!("logout requested");
                self.set_phase(SessionPhase::LoggingOut);
            }
            RemoteSignal::Navigated { url } => self.on_navigated(&url).await,
        }
    }

    async fn on_state_changed(&self, state: ConnectionState) {
        self.inner.state.send_replace(Some(state));
        self.inner.events.auth_state_changed.emit(state).await;

        if let Some(reason) = state.disconnect_reason() {
            warn!("remote entered terminal state {}", state);
            self.inner.events.disconnected.emit(reason).await;
            self.settle(Outcome::Failed(Failure::Disconnected(reason)));
            return;
        }

        if state.is_transitional() && self.phase() == SessionPhase::Ready {
            debug!("ignoring late {} after ready", state);
            return;
        }

        if state == ConnectionState::UnpairedIdle
            && self.inner.options.pair_with_phone_number.is_none()
        {
            if let Err(err) = self.inner.remote.refresh_qr().await {
                warn!("failed to refresh QR code: {}", err);
            }
        }
    }

    async fn on_ref_changed(&self, new_ref: String) {
        if self.inner.options.pair_with_phone_number.is_some()
            || self.phase() != SessionPhase::Idle
            || !self.is_pending()
        {
            return;
        }

        let known = match lock(&self.inner.qr).credentials.as_mut() {
            Some(credentials) => {
                credentials.current_ref = new_ref.clone();
                true
            }
            None => false,
        };

        if !known {
            match self.inner.remote.qr_credentials().await {
                Ok(mut credentials) => {
                    credentials.current_ref = new_ref;
                    lock(&self.inner.qr).credentials = Some(credentials);
                }
                Err(err) => {
                    warn!("failed to read QR credentials: {}", err);
                    return;
                }
            }
        }

        if let Err(err) = self.emit_qr().await {
            debug!("QR rotation stopped: {}", err);
        }
    }

    async fn on_navigated(&self, url: &str) {
        if self.phase() != SessionPhase::LoggingOut && !url.contains(POST_LOGOUT_MARKER) {
            return;
        }

        info!("logged out");
        self.set_phase(SessionPhase::Idle);
        self.inner
            .events
            .disconnected
            .emit(DisconnectReason::Logout)
            .await;
        self.settle(Outcome::Failed(Failure::Disconnected(DisconnectReason::Logout)));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
