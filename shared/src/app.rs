//! The app-state container.
//!
//! [`App`] owns the session, the mirrored profiles, services and messages,
//! the toast slot and the UI language. State lives in a `watch` channel, so
//! every change is observable through [`App::subscribe`]. Writes go to the
//! gateway first and are applied to the mirror only after it accepts them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::{Capabilities, GatewayResult, Unsubscribe};
use crate::config::Config;
use crate::conversation;
use crate::error::{AppError, AppResult, GatewayError, ValidationError};
use crate::i18n::{Dictionary, I18n, Language, Translations};
use crate::lifecycle::{self, Action};
use crate::model::{
    validate_credentials, Delivery, LoadState, Message, Model, NewMessage, NewProfile, Service,
    ServiceDraft, ServiceId, ServicePatch, Session, User, UserId,
};
use crate::toast::{Toast, ToastKind, ToastTimer};
use crate::view::ViewModel;

/// A live push subscription: the gateway-side cancel hook plus the task
/// draining its events into the model.
struct Listener {
    guard: Unsubscribe,
    task: JoinHandle<()>,
}

impl Listener {
    fn stop(self) {
        self.guard.cancel();
        self.task.abort();
    }
}

#[derive(Default)]
struct Listeners {
    closed: bool,
    session: Option<Listener>,
    conversations: HashMap<ServiceId, Listener>,
}

struct Inner {
    caps: Capabilities,
    config: Config,
    i18n: I18n,
    state: watch::Sender<Model>,
    toast_timer: ToastTimer,
    listeners: Mutex<Listeners>,
}

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct App {
    inner: Arc<Inner>,
}

impl App {
    pub fn new(caps: Capabilities, config: Config) -> Self {
        Self::with_translations(caps, config, Arc::new(Dictionary::builtin()))
    }

    pub fn with_translations(
        caps: Capabilities,
        config: Config,
        translations: Arc<dyn Translations>,
    ) -> Self {
        let model = Model {
            language: config.initial_language(),
            ..Model::default()
        };
        let (state, _) = watch::channel(model);
        Self {
            inner: Arc::new(Inner {
                caps,
                config,
                i18n: I18n::new(translations),
                state,
                toast_timer: ToastTimer::default(),
                listeners: Mutex::new(Listeners::default()),
            }),
        }
    }

    // --- Observation ---

    /// Receiver that is notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Model> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> Model {
        self.read(Model::clone)
    }

    #[must_use]
    pub fn view(&self) -> ViewModel {
        self.read(|m| ViewModel::build(m, &self.inner.i18n))
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.read(|m| m.current_user.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(Model::is_authenticated)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // --- Session ---

    /// Starts following auth changes, then adopts the stored session if
    /// there is one. Returns the signed-in user.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> AppResult<Option<User>> {
        self.watch_session_changes();
        let session = self.inner.caps.auth.get_session().await.map_err(|e| {
            let e = AppError::from(e);
            error!(error = %e, "failed to restore session");
            e
        })?;
        match session {
            Some(session) => self
                .apply_session(Some(session))
                .await
                .map_err(|e| self.gateway_failed("restore_session", e))?,
            None => debug!("no stored session"),
        }
        Ok(self.current_user())
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AppResult<User> {
        let email = email.trim();
        if email.is_empty() {
            return Err(self.reject(ValidationError::EmptyField { field: "email" }.into()));
        }
        if password.is_empty() {
            return Err(self.reject(ValidationError::EmptyField { field: "password" }.into()));
        }
        self.watch_session_changes();
        let session = self
            .inner
            .caps
            .auth
            .sign_in(email, password)
            .await
            .map_err(|e| self.gateway_failed("login", e))?;
        self.finish_sign_in(session).await
    }

    #[instrument(skip(self, password, profile))]
    pub async fn register(&self, email: &str, password: &str, profile: NewProfile) -> AppResult<User> {
        let email = email.trim();
        validate_credentials(email, password)
            .and_then(|()| profile.validate())
            .map_err(|e| self.reject(e.into()))?;
        self.watch_session_changes();
        let session = self
            .inner
            .caps
            .auth
            .sign_up(email, password, &profile)
            .await
            .map_err(|e| self.gateway_failed("register", e))?;
        self.finish_sign_in(session).await
    }

    #[instrument(skip(self))]
    pub async fn logout(&self) -> AppResult<()> {
        if self.read(|m| m.session.is_none()) {
            debug!("logout without a session");
            return Ok(());
        }
        self.inner
            .caps
            .auth
            .sign_out()
            .await
            .map_err(|e| self.gateway_failed("logout", e))?;
        self.apply_session(None)
            .await
            .map_err(|e| self.gateway_failed("logout", e))
    }

    async fn finish_sign_in(&self, session: Session) -> AppResult<User> {
        let user_id = session.user_id().clone();
        self.apply_session(Some(session))
            .await
            .map_err(|e| self.gateway_failed("load_profile", e))?;
        self.current_user()
            .filter(|u| u.id == user_id)
            .ok_or_else(|| AppError::not_found("profile", &user_id))
    }

    /// Adopts `session` into the model. Safe to call repeatedly with the same
    /// value: the profile is only fetched when the signed-in user changes.
    /// A session whose profile cannot be loaded is dropped from the model.
    async fn apply_session(&self, session: Option<Session>) -> GatewayResult<()> {
        let Some(session) = session else {
            let signed_out = self.inner.state.send_if_modified(|m| {
                if m.session.is_none() && m.current_user.is_none() {
                    return false;
                }
                m.session = None;
                m.current_user = None;
                m.messages_by_service.clear();
                true
            });
            if signed_out {
                self.close_all_conversations();
                info!("signed out");
            }
            return Ok(());
        };

        let user_id = session.user_id().clone();
        let mut switched = false;
        let mut needs_profile = false;
        self.inner.state.send_if_modified(|m| {
            let loaded = m.current_user.as_ref().map(|u| &u.id);
            if m.session.as_ref() == Some(&session) && loaded == Some(&user_id) {
                return false;
            }
            if loaded.is_some_and(|id| id != &user_id) {
                switched = true;
                m.current_user = None;
                m.messages_by_service.clear();
            }
            needs_profile = m.current_user.is_none();
            m.session = Some(session);
            true
        });
        if switched {
            self.close_all_conversations();
        }
        if !needs_profile {
            return Ok(());
        }

        match self.inner.caps.profiles.get_profile(&user_id).await {
            Ok(Some(user)) => {
                info!(user_id = %user.id, name = %user.name, "signed in");
                self.modify(|m| {
                    if m.session.as_ref().is_some_and(|s| s.user_id() == &user.id) {
                        m.upsert_user(user.clone());
                        m.current_user = Some(user);
                    }
                });
                Ok(())
            }
            Ok(None) => {
                warn!(user_id = %user_id, "session has no profile record");
                self.drop_unprofiled_session(&user_id);
                Ok(())
            }
            Err(e) => {
                self.drop_unprofiled_session(&user_id);
                Err(e)
            }
        }
    }

    /// The gateway may still hold the session; the model falls back to
    /// signed out until a profile loads.
    fn drop_unprofiled_session(&self, user_id: &UserId) {
        self.inner.state.send_if_modified(|m| {
            let dangling = m.current_user.is_none()
                && m.session.as_ref().is_some_and(|s| s.user_id() == user_id);
            if dangling {
                m.session = None;
            }
            dangling
        });
    }

    fn watch_session_changes(&self) {
        let mut listeners = self.listeners();
        if listeners.closed || listeners.session.is_some() {
            return;
        }
        let (mut events, guard) = self.inner.caps.auth.on_session_change().into_parts();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(session) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                debug!(signed_in = session.is_some(), "session change pushed");
                if let Err(e) = (App { inner }).apply_session(session).await {
                    error!(error = %e, "failed to load profile for pushed session");
                }
            }
        });
        listeners.session = Some(Listener { guard, task });
    }

    // --- Mirrors ---

    /// Fetches profiles and services concurrently. Each collection that
    /// fails keeps its previous contents and is marked `Failed`; the first
    /// failure is returned.
    #[instrument(skip(self))]
    pub async fn load_initial_data(&self) -> AppResult<()> {
        self.modify(|m| {
            m.users_state = LoadState::Loading;
            m.services_state = LoadState::Loading;
        });
        let (users, services) = tokio::join!(
            self.inner.caps.profiles.list_profiles(),
            self.inner.caps.services.list_services(),
        );
        let users = self.store_users(users);
        let services = self.store_services(services);
        users.and(services)
    }

    #[instrument(skip(self))]
    pub async fn refresh_services(&self) -> AppResult<()> {
        self.modify(|m| m.services_state = LoadState::Loading);
        let services = self.inner.caps.services.list_services().await;
        self.store_services(services)
    }

    fn store_users(&self, result: GatewayResult<Vec<User>>) -> AppResult<()> {
        match result {
            Ok(users) => {
                info!(count = users.len(), "profiles loaded");
                self.modify(|m| {
                    m.users = users;
                    m.users_state = LoadState::Loaded;
                });
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load profiles");
                self.modify(|m| m.users_state = LoadState::Failed);
                Err(e.into())
            }
        }
    }

    fn store_services(&self, result: GatewayResult<Vec<Service>>) -> AppResult<()> {
        match result {
            Ok(services) => {
                info!(count = services.len(), "services loaded");
                self.modify(|m| {
                    m.services = services;
                    m.services_state = LoadState::Loaded;
                });
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load services");
                self.modify(|m| m.services_state = LoadState::Failed);
                Err(e.into())
            }
        }
    }

    // --- Service lifecycle ---

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create_service(&self, draft: ServiceDraft) -> AppResult<Service> {
        let author = self.require_user().map_err(|e| self.reject(e))?;
        draft.validate().map_err(|e| self.reject(e.into()))?;
        let record = draft.into_record(author.id);
        let service = self
            .inner
            .caps
            .services
            .insert_service(&record)
            .await
            .map_err(|e| self.gateway_failed("create_service", e))?;
        info!(service_id = %service.id, "service created");
        self.modify(|m| m.upsert_service(service.clone()));
        self.show_toast_kind(self.t("toast_service_created"), ToastKind::Success);
        Ok(service)
    }

    pub async fn accept_service(&self, service_id: &ServiceId, client_id: &UserId) -> AppResult<Service> {
        let action = Action::Accept {
            client_id: client_id.clone(),
        };
        self.transition(service_id, action).await
    }

    pub async fn deliver_service(
        &self,
        service_id: &ServiceId,
        file_name: &str,
        message: &str,
    ) -> AppResult<Service> {
        let action = Action::Deliver {
            delivery: Delivery {
                file_name: file_name.to_string(),
                message: message.to_string(),
            },
        };
        self.transition(service_id, action).await
    }

    pub async fn confirm_completion(&self, service_id: &ServiceId) -> AppResult<Service> {
        self.transition(service_id, Action::Confirm).await
    }

    #[instrument(skip(self, action), fields(action = action.kind().name()))]
    async fn transition(&self, service_id: &ServiceId, action: Action) -> AppResult<Service> {
        let patch = self
            .require_user()
            .and_then(|actor| {
                self.read(|m| -> AppResult<ServicePatch> {
                    let service = m
                        .service(service_id)
                        .ok_or_else(|| AppError::not_found("service", service_id))?;
                    Ok(lifecycle::plan(service, &actor, &action)?)
                })
            })
            .map_err(|e| self.reject(e))?;

        self.inner
            .caps
            .services
            .update_service(service_id, &patch)
            .await
            .map_err(|e| self.gateway_failed(action.kind().name(), e))?;

        let mut updated = None;
        self.modify(|m| {
            if let Some(service) = m.service_mut(service_id) {
                service.apply(&patch);
                updated = Some(service.clone());
            }
        });
        let service = updated.ok_or_else(|| AppError::not_found("service", service_id))?;
        info!(service_id = %service.id, status = %service.status, "service updated");
        self.show_toast_kind(self.t(action.kind().success_key()), ToastKind::Success);
        Ok(service)
    }

    // --- Conversations ---

    #[instrument(skip(self, text))]
    pub async fn send_message(&self, service_id: &ServiceId, text: &str) -> AppResult<Message> {
        let record = self
            .require_user()
            .and_then(|sender| {
                let content = text.trim();
                if content.is_empty() {
                    return Err(ValidationError::EmptyField { field: "message" }.into());
                }
                let len = content.chars().count();
                let max = self.inner.config.max_message_length;
                if len > max {
                    return Err(ValidationError::TooLong {
                        field: "message",
                        len,
                        max,
                    }
                    .into());
                }
                self.check_conversation(service_id, &sender.id)?;
                Ok(NewMessage {
                    sender_id: sender.id,
                    content: content.to_string(),
                    service_id: service_id.clone(),
                })
            })
            .map_err(|e| self.reject(e))?;

        let message = self
            .inner
            .caps
            .messages
            .insert_message(&record)
            .await
            .map_err(|e| self.gateway_failed("send_message", e))?;
        debug!(message_id = %message.id, "message sent");
        self.merge_messages(service_id, [message.clone()]);
        Ok(message)
    }

    /// Follows new messages of the service's conversation and loads its
    /// history. Opening an already open conversation refetches the history
    /// without a second subscription.
    #[instrument(skip(self))]
    pub async fn open_conversation(&self, service_id: &ServiceId) -> AppResult<Vec<Message>> {
        self.require_user()
            .and_then(|user| self.check_conversation(service_id, &user.id))
            .map_err(|e| self.reject(e))?;

        // Subscribe before listing so nothing sent in between is missed.
        self.watch_conversation(service_id);
        match self.inner.caps.messages.list_messages(service_id).await {
            Ok(history) => {
                debug!(count = history.len(), "conversation loaded");
                self.merge_messages(service_id, history);
                Ok(self.read(|m| m.messages(service_id).to_vec()))
            }
            Err(e) => {
                let e = AppError::from(e);
                error!(error = %e, "failed to load conversation");
                Err(e)
            }
        }
    }

    /// Stops following the conversation. Returns whether it was open.
    pub fn close_conversation(&self, service_id: &ServiceId) -> bool {
        let listener = self.listeners().conversations.remove(service_id);
        match listener {
            Some(listener) => {
                listener.stop();
                debug!(service_id = %service_id, "conversation closed");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn messages(&self, service_id: &ServiceId) -> Vec<Message> {
        self.read(|m| m.messages(service_id).to_vec())
    }

    fn check_conversation(&self, service_id: &ServiceId, user_id: &UserId) -> AppResult<()> {
        self.read(|m| -> AppResult<()> {
            let service = m
                .service(service_id)
                .ok_or_else(|| AppError::not_found("service", service_id))?;
            if service.client_id.is_none() {
                return Err(AppError::not_found("conversation", service_id));
            }
            if conversation::other_party(service, user_id).is_none() {
                return Err(ValidationError::NotPermitted {
                    action: "conversation",
                }
                .into());
            }
            Ok(())
        })
    }

    fn watch_conversation(&self, service_id: &ServiceId) {
        let mut listeners = self.listeners();
        if listeners.closed || listeners.conversations.contains_key(service_id) {
            return;
        }
        let (mut events, guard) = self
            .inner
            .caps
            .messages
            .subscribe_message_inserts(service_id)
            .into_parts();
        let weak = Arc::downgrade(&self.inner);
        let id = service_id.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                if message.service_id != id {
                    continue;
                }
                debug!(service_id = %id, message_id = %message.id, "message pushed");
                App { inner }.merge_messages(&id, [message]);
            }
        });
        listeners
            .conversations
            .insert(service_id.clone(), Listener { guard, task });
    }

    fn merge_messages(&self, service_id: &ServiceId, messages: impl IntoIterator<Item = Message>) {
        self.inner.state.send_if_modified(|m| {
            let created = !m.messages_by_service.contains_key(service_id);
            let thread = m.messages_by_service.entry(service_id.clone()).or_default();
            let mut changed = created;
            for message in messages {
                changed |= conversation::merge_message(thread, message);
            }
            changed
        });
    }

    fn close_all_conversations(&self) {
        let open: Vec<Listener> = self
            .listeners()
            .conversations
            .drain()
            .map(|(_, listener)| listener)
            .collect();
        for listener in open {
            listener.stop();
        }
    }

    // --- Toast and language ---

    pub fn show_toast(&self, text: impl Into<String>) {
        self.show_toast_kind(text, ToastKind::Info);
    }

    /// Replaces the current toast. Only the newest toast's timer clears the
    /// slot.
    pub fn show_toast_kind(&self, text: impl Into<String>, kind: ToastKind) {
        let duration = self.inner.config.toast_duration();
        let weak = Arc::downgrade(&self.inner);
        self.inner.toast_timer.restart(duration, move |generation| {
            let Some(inner) = weak.upgrade() else { return };
            inner.toast_timer.expire_if_current(generation, || {
                inner.state.send_if_modified(|m| m.toast.take().is_some());
            });
        });
        let toast = Toast::new(text, kind, duration);
        debug!(text = %toast.text, kind = ?toast.kind, "toast shown");
        self.modify(|m| m.toast = Some(toast));
    }

    pub fn dismiss_toast(&self) {
        self.inner.toast_timer.cancel();
        self.inner.state.send_if_modified(|m| m.toast.take().is_some());
    }

    pub fn set_language(&self, language: Language) {
        self.modify(|m| m.language = language);
        info!(language = language.tag(), "language changed");
        self.show_toast(self.inner.i18n.translate(language, "toast_language_changed"));
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.read(|m| m.language)
    }

    /// Translates `key` into the current language.
    #[must_use]
    pub fn t(&self, key: &str) -> String {
        self.inner.i18n.translate(self.language(), key)
    }

    // --- Teardown ---

    /// Cancels every push subscription and the pending toast clear.
    /// Idempotent; operations after shutdown no longer subscribe.
    pub fn shutdown(&self) {
        let (session, conversations) = {
            let mut listeners = self.listeners();
            if listeners.closed {
                return;
            }
            listeners.closed = true;
            let conversations: Vec<Listener> = listeners
                .conversations
                .drain()
                .map(|(_, listener)| listener)
                .collect();
            (listeners.session.take(), conversations)
        };
        if let Some(listener) = session {
            listener.stop();
        }
        for listener in conversations {
            listener.stop();
        }
        self.inner.toast_timer.cancel();
        info!("app shut down");
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.listeners().closed
    }

    // --- Internals ---

    fn read<R>(&self, f: impl FnOnce(&Model) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    fn modify(&self, f: impl FnOnce(&mut Model)) {
        self.inner.state.send_modify(f);
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn require_user(&self) -> AppResult<User> {
        self.current_user()
            .ok_or_else(|| ValidationError::NotSignedIn.into())
    }

    /// Local precondition failure: nothing was sent to the gateway.
    fn reject(&self, err: AppError) -> AppError {
        warn!(code = err.code(), error = %err, "operation rejected");
        if self.inner.config.toast_on_rejection {
            self.show_toast_kind(self.t(err.toast_key()), ToastKind::Error);
        }
        err
    }

    /// The gateway refused or failed a call. The mirror is left untouched.
    fn gateway_failed(&self, operation: &'static str, err: GatewayError) -> AppError {
        let err = AppError::from(err);
        error!(operation, code = err.code(), retryable = err.is_retryable(), error = %err, "gateway call failed");
        self.show_toast_kind(self.t(err.toast_key()), ToastKind::Error);
        err
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::InMemoryBackend;
    use crate::lifecycle::ServiceStatus;
    use crate::model::{NewProfile, UserType};
    use std::time::Duration;

    fn profile(name: &str, user_type: UserType) -> NewProfile {
        NewProfile {
            name: name.into(),
            user_type,
            bio: String::new(),
            avatar_url: String::new(),
        }
    }

    fn app_for(backend: &Arc<InMemoryBackend>) -> App {
        App::new(Capabilities::from_gateway(backend.connect()), Config::default())
    }

    #[tokio::test]
    async fn operations_require_a_signed_in_user() {
        let backend = InMemoryBackend::new();
        let app = app_for(&backend);

        let err = app
            .create_service(ServiceDraft {
                title: "Logo".into(),
                price: "$10".into(),
                deadline: "1 day".into(),
                ..ServiceDraft::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, AppError::Validation(ValidationError::NotSignedIn));
        assert_eq!(backend.calls().service_inserts, 0);
        assert!(app.snapshot().toast.is_some());
    }

    #[tokio::test]
    async fn login_loads_profile_and_logout_clears_it() {
        let backend = InMemoryBackend::new();
        backend.seed_user("ana@example.com", "secret1", profile("Ana", UserType::Freelancer));
        let app = app_for(&backend);

        let user = app.login("ana@example.com", "secret1").await.unwrap();
        assert_eq!(user.name, "Ana");
        assert!(app.is_authenticated());

        app.logout().await.unwrap();
        assert!(app.current_user().is_none());
        assert!(app.snapshot().session.is_none());
        app.shutdown();
    }

    #[tokio::test]
    async fn wrong_password_is_an_auth_error() {
        let backend = InMemoryBackend::new();
        backend.seed_user("ana@example.com", "secret1", profile("Ana", UserType::Freelancer));
        let app = app_for(&backend);

        let err = app.login("ana@example.com", "nope").await.unwrap_err();
        assert_eq!(err.code(), "AUTH_ERROR");
        assert!(app.current_user().is_none());
        app.shutdown();
    }

    #[tokio::test]
    async fn applying_the_same_session_twice_fetches_once() {
        let backend = InMemoryBackend::new();
        backend.seed_user("ana@example.com", "secret1", profile("Ana", UserType::Freelancer));
        let app = app_for(&backend);
        app.login("ana@example.com", "secret1").await.unwrap();

        let mut changes = app.subscribe();
        changes.borrow_and_update();
        let session = app.snapshot().session;
        app.apply_session(session).await.unwrap();
        assert!(!changes.has_changed().unwrap());
        app.shutdown();
    }

    #[tokio::test]
    async fn rejected_transition_leaves_mirror_unchanged() {
        let backend = InMemoryBackend::new();
        let author = backend.seed_user("ana@example.com", "secret1", profile("Ana", UserType::Freelancer));
        let service = backend.seed_service(
            ServiceDraft {
                title: "Logo design".into(),
                price: "$100".into(),
                deadline: "3 days".into(),
                ..ServiceDraft::default()
            }
            .into_record(author.id.clone()),
        );
        let app = app_for(&backend);
        app.login("ana@example.com", "secret1").await.unwrap();
        app.load_initial_data().await.unwrap();

        let err = app.confirm_completion(&service.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::Transition(_))));
        assert_eq!(backend.calls().service_updates, 0);
        assert_eq!(
            app.snapshot().service(&service.id).map(|s| s.status),
            Some(ServiceStatus::Available)
        );
        app.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn toast_clears_after_configured_duration() {
        let backend = InMemoryBackend::new();
        let config = Config {
            toast_duration_ms: 1_000,
            ..Config::default()
        };
        let app = App::new(Capabilities::from_gateway(backend.connect()), config);

        app.show_toast("saved");
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(app.snapshot().toast.map(|t| t.text).as_deref(), Some("saved"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(app.snapshot().toast.is_none());
    }

    #[tokio::test]
    async fn set_language_announces_in_new_language() {
        let backend = InMemoryBackend::new();
        let app = app_for(&backend);
        app.set_language(Language::Es);
        assert_eq!(app.language(), Language::Es);
        let toast = app.snapshot().toast.unwrap();
        assert_eq!(toast.text, app.t("toast_language_changed"));
        app.dismiss_toast();
        assert!(app.snapshot().toast.is_none());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let backend = InMemoryBackend::new();
        let gateway = backend.connect();
        let app = App::new(Capabilities::from_gateway(gateway.clone()), Config::default());
        app.restore_session().await.unwrap();
        assert_eq!(gateway.active_session_listeners(), 1);

        app.shutdown();
        app.shutdown();
        assert!(app.is_shut_down());
        assert_eq!(gateway.active_session_listeners(), 0);

        app.restore_session().await.unwrap();
        assert_eq!(gateway.active_session_listeners(), 0);
    }
}
