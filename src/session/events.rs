//! Typed event channels.
//!
//! Every event kind has its own [`Channel`]. Handlers run one after another in
//! registration order and each is awaited before the next starts. The handler
//! list is copied before emission so no lock is held while handlers run, and a
//! handler may register further handlers without deadlocking.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::{self, BoxFuture, FutureExt};

use crate::types::{ConnectionState, DisconnectReason, Event};

type Handler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Ordered list of handlers for one event kind.
pub struct Channel<T> {
    handlers: RwLock<Vec<Handler<T>>>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("handlers", &self.len())
            .finish()
    }
}

impl<T> Channel<T> {
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + 'static> Channel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.push(Arc::new(move |value: T| {
            handler(value);
            future::ready(()).boxed()
        }));
    }

    /// Register a handler returning a future; emission waits for it.
    pub fn subscribe_async<F, Fut>(&self, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(Arc::new(move |value: T| handler(value).boxed()));
    }

    /// Run every handler registered so far, in order.
    pub async fn emit(&self, value: T) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for handler in handlers {
            handler(value.clone()).await;
        }
    }

    fn push(&self, handler: Handler<T>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}

/// One channel per event kind.
#[derive(Debug, Default)]
pub struct EventBus {
    pub qr: Channel<String>,
    pub code: Channel<String>,
    pub authenticated: Channel<()>,
    pub ready: Channel<()>,
    pub auth_state_changed: Channel<ConnectionState>,
    pub loading_progress: Channel<u8>,
    pub disconnected: Channel<DisconnectReason>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route an event to the channel of its kind.
    pub async fn dispatch(&self, event: Event) {
        match event {
            Event::Qr(payload) => self.qr.emit(payload).await,
            Event::Code(code) => self.code.emit(code).await,
            Event::Authenticated => self.authenticated.emit(()).await,
            Event::Ready => self.ready.emit(()).await,
            Event::AuthStateChanged(state) => self.auth_state_changed.emit(state).await,
            Event::LoadingProgress(percent) => self.loading_progress.emit(percent).await,
            Event::Disconnected(reason) => self.disconnected.emit(reason).await,
        }
    }

    /// Register one handler on every channel, receiving each event as an [`Event`].
    pub fn subscribe_all<F>(&self, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);

        let h = handler.clone();
        self.qr.subscribe(move |payload| h(Event::Qr(payload)));
        let h = handler.clone();
        self.code.subscribe(move |code| h(Event::Code(code)));
        let h = handler.clone();
        self.authenticated.subscribe(move |()| h(Event::Authenticated));
        let h = handler.clone();
        self.ready.subscribe(move |()| h(Event::Ready));
        let h = handler.clone();
        self.auth_state_changed
            .subscribe(move |state| h(Event::AuthStateChanged(state)));
        let h = handler.clone();
        self.loading_progress
            .subscribe(move |percent| h(Event::LoadingProgress(percent)));
        self.disconnected
            .subscribe(move |reason| handler(Event::Disconnected(reason)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let channel: Channel<u8> = Channel::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        channel.subscribe_async(move |v| {
            let l = l.clone();
            async move {
                // the slow first handler must still finish before the second runs
                tokio::time::sleep(Duration::from_millis(20)).await;
                l.lock().unwrap().push(format!("first {}", v));
            }
        });
        let l = log.clone();
        channel.subscribe(move |v| l.lock().unwrap().push(format!("second {}", v)));

        channel.emit(7).await;
        assert_eq!(*log.lock().unwrap(), vec!["first 7", "second 7"]);
    }

    #[tokio::test]
    async fn test_emit_without_handlers() {
        let channel: Channel<()> = Channel::new();
        assert!(channel.is_empty());
        channel.emit(()).await;
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        bus.subscribe_all(move |event| s.lock().unwrap().push(event));
        let s = seen.clone();
        bus.ready.subscribe(move |()| s.lock().unwrap().push(Event::Code("extra".into())));

        bus.dispatch(Event::AuthStateChanged(ConnectionState::Connected))
            .await;
        bus.dispatch(Event::Ready).await;
        bus.dispatch(Event::LoadingProgress(40)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Event::AuthStateChanged(ConnectionState::Connected),
                Event::Ready,
                Event::Code("extra".into()),
                Event::LoadingProgress(40),
            ]
        );
        assert_eq!(bus.qr.len(), 1);
        assert_eq!(bus.ready.len(), 2);
    }
}
