//! Gateway seam: authentication and record storage the core depends on.
//!
//! Each concern is its own trait so shells can back them with different
//! services. [`Capabilities`] bundles them for the [`App`](crate::App).

mod memory;

pub use self::memory::{CallCounts, InMemoryBackend, InMemoryGateway};

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::model::{
    Message, NewMessage, NewProfile, NewService, Service, ServiceId, ServicePatch, Session, User,
    UserId,
};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait::async_trait]
pub trait AuthGateway: Send + Sync {
    async fn get_session(&self) -> GatewayResult<Option<Session>>;
    /// Pushes the new session (or `None`) on every sign-in and sign-out.
    fn on_session_change(&self) -> Subscription<Option<Session>>;
    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<Session>;
    /// Creates the auth identity and its profile record.
    async fn sign_up(&self, email: &str, password: &str, profile: &NewProfile) -> GatewayResult<Session>;
    async fn sign_out(&self) -> GatewayResult<()>;
}

#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: &UserId) -> GatewayResult<Option<User>>;
    async fn list_profiles(&self) -> GatewayResult<Vec<User>>;
}

#[async_trait::async_trait]
pub trait ServiceStore: Send + Sync {
    async fn list_services(&self) -> GatewayResult<Vec<Service>>;
    /// Returns the stored record with its assigned id.
    async fn insert_service(&self, record: &NewService) -> GatewayResult<Service>;
    async fn update_service(&self, id: &ServiceId, patch: &ServicePatch) -> GatewayResult<()>;
}

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages of one conversation, `created_at` ascending.
    async fn list_messages(&self, service_id: &ServiceId) -> GatewayResult<Vec<Message>>;
    async fn insert_message(&self, record: &NewMessage) -> GatewayResult<Message>;
    fn subscribe_message_inserts(&self, service_id: &ServiceId) -> Subscription<Message>;
}

#[derive(Clone)]
pub struct Capabilities {
    pub auth: Arc<dyn AuthGateway>,
    pub profiles: Arc<dyn ProfileStore>,
    pub services: Arc<dyn ServiceStore>,
    pub messages: Arc<dyn MessageStore>,
}

impl Capabilities {
    /// Uses one backend object for every concern.
    pub fn from_gateway<G>(gateway: Arc<G>) -> Self
    where
        G: AuthGateway + ProfileStore + ServiceStore + MessageStore + 'static,
    {
        Self {
            auth: gateway.clone(),
            profiles: gateway.clone(),
            services: gateway.clone(),
            messages: gateway,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Cancel hook of a push subscription. Runs exactly once: on [`cancel`] or
/// on drop, whichever comes first.
///
/// [`cancel`]: Unsubscribe::cancel
pub struct Unsubscribe {
    hook: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    pub fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
        }
    }

    pub fn cancel(mut self) {
        self.run();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.hook.is_some()
    }

    fn run(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Stream of push events from the gateway.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    guard: Unsubscribe,
}

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::UnboundedReceiver<T>, on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            receiver,
            guard: Unsubscribe::new(on_cancel),
        }
    }

    /// `None` once the subscription is cancelled or the sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        self.guard.cancel();
    }

    /// Splits the event stream from its cancel hook, so a listener task can
    /// own the stream while the owner keeps the hook.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<T>, Unsubscribe) {
        (self.receiver, self.guard)
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
