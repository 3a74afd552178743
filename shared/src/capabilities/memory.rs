use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use super::{AuthGateway, GatewayResult, MessageStore, ProfileStore, ServiceStore, Subscription};
use crate::error::GatewayError;
use crate::model::{
    Message, MessageId, NewMessage, NewProfile, NewService, Service, ServiceId, ServicePatch,
    Session, UnixTimeMs, User, UserId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Listeners<T> {
    next_id: u64,
    senders: Vec<(u64, mpsc::UnboundedSender<T>)>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            senders: Vec::new(),
        }
    }
}

impl<T: Clone> Listeners<T> {
    fn add(&mut self) -> (u64, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.next_id += 1;
        self.senders.push((self.next_id, tx));
        (self.next_id, rx)
    }

    fn remove(&mut self, id: u64) {
        self.senders.retain(|(listener, _)| *listener != id);
    }

    fn broadcast(&mut self, event: &T) {
        self.senders.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    fn len(&self) -> usize {
        self.senders.len()
    }
}

/// Gateway calls observed by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub sign_ins: usize,
    pub sign_outs: usize,
    pub service_inserts: usize,
    pub service_updates: usize,
    pub message_inserts: usize,
}

struct Account {
    password: String,
    user_id: UserId,
}

#[derive(Default)]
struct Records {
    accounts: HashMap<String, Account>,
    profiles: Vec<User>,
    services: Vec<Service>,
    messages: Vec<Message>,
    last_timestamp: u64,
    calls: CallCounts,
}

impl Records {
    /// Wall clock, but strictly increasing so inserts never tie.
    fn next_timestamp(&mut self) -> UnixTimeMs {
        let now = UnixTimeMs::now().0.max(self.last_timestamp + 1);
        self.last_timestamp = now;
        UnixTimeMs(now)
    }
}

/// Shared in-memory data store. Every client connects through its own
/// [`InMemoryGateway`], which holds that client's auth session.
#[derive(Default)]
pub struct InMemoryBackend {
    records: Mutex<Records>,
    message_listeners: Arc<Mutex<HashMap<ServiceId, Listeners<Message>>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn connect(self: &Arc<Self>) -> Arc<InMemoryGateway> {
        Arc::new(InMemoryGateway {
            backend: Arc::clone(self),
            session: Mutex::new(None),
            session_listeners: Arc::new(Mutex::new(Listeners::default())),
        })
    }

    /// Registers an account and profile directly, bypassing failure injection.
    pub fn seed_user(&self, email: &str, password: &str, profile: NewProfile) -> User {
        let mut records = lock(&self.records);
        let user = profile.into_user(UserId::generate());
        records.accounts.insert(
            normalize_email(email),
            Account {
                password: password.to_string(),
                user_id: user.id.clone(),
            },
        );
        records.profiles.push(user.clone());
        user
    }

    pub fn seed_service(&self, record: NewService) -> Service {
        let service = record.with_id(ServiceId::generate());
        lock(&self.records).services.push(service.clone());
        service
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        lock(&self.records).calls
    }

    #[must_use]
    pub fn service(&self, id: &ServiceId) -> Option<Service> {
        lock(&self.records)
            .services
            .iter()
            .find(|s| &s.id == id)
            .cloned()
    }

    #[must_use]
    pub fn active_message_subscriptions(&self) -> usize {
        lock(&self.message_listeners).values().map(Listeners::len).sum()
    }

    fn check_read(&self) -> GatewayResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> GatewayResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct InMemoryGateway {
    backend: Arc<InMemoryBackend>,
    session: Mutex<Option<Session>>,
    session_listeners: Arc<Mutex<Listeners<Option<Session>>>>,
}

impl InMemoryGateway {
    #[must_use]
    pub fn backend(&self) -> &Arc<InMemoryBackend> {
        &self.backend
    }

    #[must_use]
    pub fn active_session_listeners(&self) -> usize {
        lock(&self.session_listeners).len()
    }

    /// Drops the session as if it had expired server-side.
    pub fn expire_session(&self) {
        self.set_session(None);
    }

    fn set_session(&self, session: Option<Session>) {
        *lock(&self.session) = session.clone();
        lock(&self.session_listeners).broadcast(&session);
    }

    fn open_session(&self, user_id: UserId) -> Session {
        let session = Session::new(user_id, uuid::Uuid::new_v4().to_string());
        self.set_session(Some(session.clone()));
        session
    }
}

#[async_trait::async_trait]
impl AuthGateway for InMemoryGateway {
    async fn get_session(&self) -> GatewayResult<Option<Session>> {
        self.backend.check_read()?;
        Ok(lock(&self.session).clone())
    }

    fn on_session_change(&self) -> Subscription<Option<Session>> {
        let (id, rx) = lock(&self.session_listeners).add();
        let listeners = Arc::clone(&self.session_listeners);
        Subscription::new(rx, move || lock(&listeners).remove(id))
    }

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<Session> {
        self.backend.check_read()?;
        let user_id = {
            let mut records = lock(&self.backend.records);
            records.calls.sign_ins += 1;
            match records.accounts.get(&normalize_email(email)) {
                Some(account) if account.password == password => account.user_id.clone(),
                _ => return Err(GatewayError::Unauthorized("invalid login credentials".into())),
            }
        };
        debug!(user_id = %user_id, "signed in");
        Ok(self.open_session(user_id))
    }

    async fn sign_up(&self, email: &str, password: &str, profile: &NewProfile) -> GatewayResult<Session> {
        self.backend.check_write()?;
        let user_id = {
            let mut records = lock(&self.backend.records);
            let key = normalize_email(email);
            if records.accounts.contains_key(&key) {
                return Err(GatewayError::Rejected("email already registered".into()));
            }
            let user = profile.clone().into_user(UserId::generate());
            records.accounts.insert(
                key,
                Account {
                    password: password.to_string(),
                    user_id: user.id.clone(),
                },
            );
            let id = user.id.clone();
            records.profiles.push(user);
            id
        };
        debug!(user_id = %user_id, "account created");
        Ok(self.open_session(user_id))
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        self.backend.check_write()?;
        lock(&self.backend.records).calls.sign_outs += 1;
        self.set_session(None);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryGateway {
    async fn get_profile(&self, id: &UserId) -> GatewayResult<Option<User>> {
        self.backend.check_read()?;
        Ok(lock(&self.backend.records)
            .profiles
            .iter()
            .find(|u| &u.id == id)
            .cloned())
    }

    async fn list_profiles(&self) -> GatewayResult<Vec<User>> {
        self.backend.check_read()?;
        Ok(lock(&self.backend.records).profiles.clone())
    }
}

#[async_trait::async_trait]
impl ServiceStore for InMemoryGateway {
    async fn list_services(&self) -> GatewayResult<Vec<Service>> {
        self.backend.check_read()?;
        Ok(lock(&self.backend.records).services.clone())
    }

    async fn insert_service(&self, record: &NewService) -> GatewayResult<Service> {
        self.backend.check_write()?;
        let mut records = lock(&self.backend.records);
        records.calls.service_inserts += 1;
        if !records.profiles.iter().any(|u| u.id == record.author_id) {
            return Err(GatewayError::Rejected(format!(
                "unknown author {}",
                record.author_id
            )));
        }
        let service = record.clone().with_id(ServiceId::generate());
        records.services.push(service.clone());
        Ok(service)
    }

    async fn update_service(&self, id: &ServiceId, patch: &ServicePatch) -> GatewayResult<()> {
        self.backend.check_write()?;
        let mut records = lock(&self.backend.records);
        records.calls.service_updates += 1;
        let service = records
            .services
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| GatewayError::NotFound {
                entity: "service",
                id: id.to_string(),
            })?;
        // Last write wins; the store itself does not guard transitions.
        service.apply(patch);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageStore for InMemoryGateway {
    async fn list_messages(&self, service_id: &ServiceId) -> GatewayResult<Vec<Message>> {
        self.backend.check_read()?;
        let mut messages: Vec<Message> = lock(&self.backend.records)
            .messages
            .iter()
            .filter(|m| &m.service_id == service_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn insert_message(&self, record: &NewMessage) -> GatewayResult<Message> {
        self.backend.check_write()?;
        let message = {
            let mut records = lock(&self.backend.records);
            records.calls.message_inserts += 1;
            if !records.services.iter().any(|s| s.id == record.service_id) {
                return Err(GatewayError::NotFound {
                    entity: "service",
                    id: record.service_id.to_string(),
                });
            }
            let message = Message {
                id: MessageId::generate(),
                sender_id: record.sender_id.clone(),
                content: record.content.clone(),
                created_at: records.next_timestamp(),
                service_id: record.service_id.clone(),
            };
            records.messages.push(message.clone());
            message
        };

        if let Some(listeners) = lock(&self.backend.message_listeners).get_mut(&message.service_id) {
            listeners.broadcast(&message);
        }
        Ok(message)
    }

    fn subscribe_message_inserts(&self, service_id: &ServiceId) -> Subscription<Message> {
        let (id, rx) = lock(&self.backend.message_listeners)
            .entry(service_id.clone())
            .or_default()
            .add();
        let listeners = Arc::clone(&self.backend.message_listeners);
        let service_id = service_id.clone();
        Subscription::new(rx, move || {
            let mut listeners = lock(&listeners);
            if let Some(entry) = listeners.get_mut(&service_id) {
                entry.remove(id);
                if entry.len() == 0 {
                    listeners.remove(&service_id);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ServiceStatus;
    use crate::model::UserType;

    fn profile(name: &str, user_type: UserType) -> NewProfile {
        NewProfile {
            name: name.into(),
            user_type,
            bio: String::new(),
            avatar_url: String::new(),
        }
    }

    fn listing(author: &UserId) -> NewService {
        NewService {
            title: "Logo design".into(),
            author_id: author.clone(),
            price: "$100".into(),
            deadline: "3 days".into(),
            description: String::new(),
            category: "design".into(),
            status: ServiceStatus::Available,
        }
    }

    #[tokio::test]
    async fn sign_in_checks_password_and_notifies() {
        let backend = InMemoryBackend::new();
        let maria = backend.seed_user("maria@example.com", "secret1", profile("Maria", UserType::Freelancer));
        let gateway = backend.connect();
        let mut changes = gateway.on_session_change();

        let wrong = gateway.sign_in("maria@example.com", "nope").await;
        assert!(matches!(wrong, Err(GatewayError::Unauthorized(_))));

        let session = gateway.sign_in(" Maria@Example.com ", "secret1").await.unwrap();
        assert_eq!(session.user_id(), &maria.id);
        assert_eq!(changes.recv().await, Some(Some(session)));

        gateway.sign_out().await.unwrap();
        assert_eq!(changes.recv().await, Some(None));
        assert_eq!(gateway.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sessions_are_per_client() {
        let backend = InMemoryBackend::new();
        backend.seed_user("a@example.com", "secret1", profile("A", UserType::Freelancer));
        let first = backend.connect();
        let second = backend.connect();

        first.sign_in("a@example.com", "secret1").await.unwrap();
        assert!(first.get_session().await.unwrap().is_some());
        assert!(second.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicate_email() {
        let backend = InMemoryBackend::new();
        let gateway = backend.connect();
        let session = gateway
            .sign_up("new@example.com", "secret1", &profile("New", UserType::Client))
            .await
            .unwrap();
        assert!(gateway.get_profile(session.user_id()).await.unwrap().is_some());

        let again = gateway
            .sign_up("NEW@example.com", "secret2", &profile("Other", UserType::Client))
            .await;
        assert!(matches!(again, Err(GatewayError::Rejected(_))));
    }

    #[tokio::test]
    async fn insert_requires_known_author() {
        let backend = InMemoryBackend::new();
        let gateway = backend.connect();
        let result = gateway.insert_service(&listing(&UserId::new("ghost"))).await;
        assert!(matches!(result, Err(GatewayError::Rejected(_))));
    }

    #[tokio::test]
    async fn message_inserts_reach_subscribers_of_that_service_only() {
        let backend = InMemoryBackend::new();
        let a = backend.seed_user("a@example.com", "secret1", profile("A", UserType::Freelancer));
        let first = backend.seed_service(listing(&a.id));
        let second = backend.seed_service(listing(&a.id));
        let gateway = backend.connect();

        let mut first_sub = gateway.subscribe_message_inserts(&first.id);
        let mut second_sub = gateway.subscribe_message_inserts(&second.id);
        assert_eq!(backend.active_message_subscriptions(), 2);

        let sent = gateway
            .insert_message(&NewMessage {
                sender_id: a.id.clone(),
                content: "Hello".into(),
                service_id: first.id.clone(),
            })
            .await
            .unwrap();

        assert_eq!(first_sub.recv().await, Some(sent));
        assert_eq!(second_sub.try_recv(), None);

        first_sub.unsubscribe();
        drop(second_sub);
        assert_eq!(backend.active_message_subscriptions(), 0);
    }

    #[tokio::test]
    async fn messages_are_listed_in_creation_order() {
        let backend = InMemoryBackend::new();
        let a = backend.seed_user("a@example.com", "secret1", profile("A", UserType::Freelancer));
        let service = backend.seed_service(listing(&a.id));
        let gateway = backend.connect();

        for text in ["one", "two", "three"] {
            gateway
                .insert_message(&NewMessage {
                    sender_id: a.id.clone(),
                    content: text.into(),
                    service_id: service.id.clone(),
                })
                .await
                .unwrap();
        }

        let listed = gateway.list_messages(&service.id).await.unwrap();
        let contents: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert!(listed.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn injected_failures() {
        let backend = InMemoryBackend::new();
        let gateway = backend.connect();

        backend.set_fail_reads(true);
        assert!(matches!(
            gateway.list_services().await,
            Err(GatewayError::Unavailable(_))
        ));
        backend.set_fail_reads(false);
        assert!(gateway.list_services().await.unwrap().is_empty());

        backend.set_fail_writes(true);
        let patch = ServicePatch {
            status: ServiceStatus::InProgress,
            client_id: Some(UserId::new("b")),
            delivery: None,
        };
        assert!(matches!(
            gateway.update_service(&ServiceId::new("s"), &patch).await,
            Err(GatewayError::Unavailable(_))
        ));
    }
}
