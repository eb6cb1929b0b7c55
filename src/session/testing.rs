//! Scripted [`RemoteSession`] used by the session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::remote::{QrCredentials, RemoteError, RemoteSession, RemoteSignal};
use crate::config::SessionOptions;
use crate::types::ConnectionState;

pub(crate) struct ScriptedRemote {
    open_errors: Mutex<VecDeque<RemoteError>>,
    initial_state: ConnectionState,
    synced: AtomicBool,
    script: Vec<RemoteSignal>,
    code_results: Mutex<VecDeque<Result<String, RemoteError>>>,
    inject_error: Option<RemoteError>,
    credentials: QrCredentials,
    calls: Mutex<Vec<String>>,
    sender: Mutex<Option<mpsc::UnboundedSender<RemoteSignal>>>,
}

impl ScriptedRemote {
    pub(crate) fn new(initial_state: ConnectionState) -> Self {
        Self {
            open_errors: Mutex::new(VecDeque::new()),
            initial_state,
            synced: AtomicBool::new(false),
            script: Vec::new(),
            code_results: Mutex::new(VecDeque::new()),
            inject_error: None,
            credentials: QrCredentials {
                current_ref: "ref-1".into(),
                static_key: vec![1, 2, 3],
                identity_key: vec![4, 5, 6],
                adv_secret_key: "c2VjcmV0".into(),
                platform: "WEB".into(),
            },
            calls: Mutex::new(Vec::new()),
            sender: Mutex::new(None),
        }
    }

    /// Signals delivered right after every successful `open`.
    pub(crate) fn with_signals(mut self, signals: Vec<RemoteSignal>) -> Self {
        self.script = signals;
        self
    }

    pub(crate) fn already_synced(self) -> Self {
        self.synced.store(true, Ordering::SeqCst);
        self
    }

    /// Errors returned by the next `open` calls, in order.
    pub(crate) fn with_open_errors(self, messages: &[&str]) -> Self {
        *self.open_errors.lock().unwrap() =
            messages.iter().map(|m| RemoteError::new(*m)).collect();
        self
    }

    pub(crate) fn with_code_results(self, results: Vec<Result<String, RemoteError>>) -> Self {
        *self.code_results.lock().unwrap() = results.into();
        self
    }

    pub(crate) fn with_inject_error(mut self, message: &str) -> Self {
        self.inject_error = Some(RemoteError::new(message));
        self
    }

    /// Push a signal into the stream of the current session.
    pub(crate) fn send(&self, signal: RemoteSignal) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(signal);
        }
    }

    /// End the signal stream.
    pub(crate) fn close_signals(&self) {
        self.sender.lock().unwrap().take();
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl RemoteSession for ScriptedRemote {
    async fn open(
        &self,
        _options: &SessionOptions,
    ) -> Result<mpsc::UnboundedReceiver<RemoteSignal>, RemoteError> {
        self.record("open");
        if let Some(err) = self.open_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for signal in &self.script {
            let _ = tx.send(signal.clone());
        }
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn app_state(&self) -> Result<ConnectionState, RemoteError> {
        Ok(self.initial_state)
    }

    async fn has_synced(&self) -> Result<bool, RemoteError> {
        Ok(self.synced.load(Ordering::SeqCst))
    }

    async fn qr_credentials(&self) -> Result<QrCredentials, RemoteError> {
        self.record("qr_credentials");
        Ok(self.credentials.clone())
    }

    async fn start_code_linking(
        &self,
        _phone_number: &str,
        _show_notification: bool,
    ) -> Result<String, RemoteError> {
        self.record("code");
        let attempt = self.count("code");
        self.code_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("CODE{}", attempt)))
    }

    async fn refresh_qr(&self) -> Result<(), RemoteError> {
        self.record("refresh_qr");
        Ok(())
    }

    async fn inject_store(&self) -> Result<(), RemoteError> {
        self.record("inject_store");
        match &self.inject_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.record("close");
        self.close_signals();
        Ok(())
    }
}
