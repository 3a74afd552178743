use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ValidationError;
use crate::i18n::Language;
use crate::lifecycle::ServiceStatus;
use crate::toast::Toast;
use crate::{MAX_FIELD_LENGTH, MAX_TITLE_LENGTH, MIN_PASSWORD_LENGTH};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(UserId);
typed_id!(ServiceId);
typed_id!(MessageId);

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(ms)
    }

    #[must_use]
    pub const fn saturating_add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

// --- Session ---

/// Authentication handle. The access token is never logged or serialized.
#[derive(Clone)]
pub struct Session {
    user_id: UserId,
    access_token: Arc<SecretString>,
}

impl Session {
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: Arc::new(SecretString::new(access_token.into())),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.access_token() == other.access_token()
    }
}

impl Eq for Session {}

// --- Profiles ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Freelancer,
    Client,
}

impl UserType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Freelancer => "freelancer",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Profile fields collected at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub name: String,
    pub user_type: UserType,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl NewProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name, MAX_TITLE_LENGTH)?;
        bounded("bio", &self.bio, MAX_FIELD_LENGTH)?;

        let avatar = self.avatar_url.trim();
        if !avatar.is_empty() {
            let parsed =
                url::Url::parse(avatar).map_err(|_| ValidationError::InvalidUrl(avatar.into()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ValidationError::InvalidUrl(avatar.into()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            name: self.name.trim().to_string(),
            user_type: self.user_type,
            bio: self.bio.trim().to_string(),
            avatar_url: self.avatar_url.trim().to_string(),
        }
    }
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    let (local, domain) = email.split_once('@').ok_or(ValidationError::InvalidEmail)?;
    if local.is_empty() || domain.contains('@') || !domain.contains('.') || domain.ends_with('.') {
        return Err(ValidationError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

// --- Services ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub file_name: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub title: String,
    pub author_id: UserId,
    pub price: String,
    pub deadline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
}

impl Service {
    #[must_use]
    pub fn is_party(&self, user_id: &UserId) -> bool {
        &self.author_id == user_id || self.client_id.as_ref() == Some(user_id)
    }

    /// `client_id` is set exactly when the status requires one, and never
    /// equals the author.
    #[must_use]
    pub fn satisfies_client_invariant(&self) -> bool {
        self.status.requires_client() == self.client_id.is_some()
            && self.client_id.as_ref() != Some(&self.author_id)
    }

    pub fn apply(&mut self, patch: &ServicePatch) {
        self.status = patch.status;
        if let Some(client_id) = &patch.client_id {
            self.client_id = Some(client_id.clone());
        }
        if let Some(delivery) = &patch.delivery {
            self.delivery = Some(delivery.clone());
        }
    }
}

/// Form input for a new listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDraft {
    pub title: String,
    pub price: String,
    pub deadline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

impl ServiceDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("title", &self.title, MAX_TITLE_LENGTH)?;
        required("price", &self.price, MAX_TITLE_LENGTH)?;
        required("deadline", &self.deadline, MAX_TITLE_LENGTH)?;
        bounded("category", &self.category, MAX_TITLE_LENGTH)?;
        bounded("description", &self.description, MAX_FIELD_LENGTH)?;
        Ok(())
    }

    #[must_use]
    pub fn into_record(self, author_id: UserId) -> NewService {
        NewService {
            title: self.title.trim().to_string(),
            author_id,
            price: self.price.trim().to_string(),
            deadline: self.deadline.trim().to_string(),
            description: self.description.trim().to_string(),
            category: self.category.trim().to_string(),
            status: ServiceStatus::Available,
        }
    }
}

/// Service record before the gateway assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewService {
    pub title: String,
    pub author_id: UserId,
    pub price: String,
    pub deadline: String,
    pub description: String,
    pub category: String,
    pub status: ServiceStatus,
}

impl NewService {
    #[must_use]
    pub fn with_id(self, id: ServiceId) -> Service {
        Service {
            id,
            title: self.title,
            author_id: self.author_id,
            price: self.price,
            deadline: self.deadline,
            description: self.description,
            category: self.category,
            status: self.status,
            client_id: None,
            delivery: None,
        }
    }
}

/// Status transition written to the gateway. `None` fields are left as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePatch {
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
}

// --- Messages ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: UnixTimeMs,
    pub service_id: ServiceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub content: String,
    pub service_id: ServiceId,
}

// --- Container state ---

/// Whether a mirrored collection reflects the backend. An empty `Loaded`
/// collection is confirmed empty; an empty `Unknown` one is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Unknown,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub session: Option<Session>,
    pub current_user: Option<User>,
    pub users: Vec<User>,
    pub services: Vec<Service>,
    pub messages_by_service: HashMap<ServiceId, Vec<Message>>,
    pub toast: Option<Toast>,
    pub language: Language,
    pub users_state: LoadState,
    pub services_state: LoadState,
}

impl Model {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() && self.current_user.is_some()
    }

    #[must_use]
    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    #[must_use]
    pub fn service(&self, id: &ServiceId) -> Option<&Service> {
        self.services.iter().find(|s| &s.id == id)
    }

    pub fn service_mut(&mut self, id: &ServiceId) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| &s.id == id)
    }

    #[must_use]
    pub fn messages(&self, service_id: &ServiceId) -> &[Message] {
        self.messages_by_service
            .get(service_id)
            .map_or(&[], Vec::as_slice)
    }

    pub fn upsert_user(&mut self, user: User) {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => self.users.push(user),
        }
    }

    pub fn upsert_service(&mut self, service: Service) {
        match self.service_mut(&service.id) {
            Some(existing) => *existing = service,
            None => self.services.push(service),
        }
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    bounded(field, value, max)
}

fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ServiceDraft {
        ServiceDraft {
            title: "Logo design".into(),
            price: "$100".into(),
            deadline: "3 days".into(),
            ..ServiceDraft::default()
        }
    }

    #[test]
    fn session_debug_is_redacted() {
        let session = Session::new(UserId::new("u-1"), "super_secret");
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("super_secret"));
        assert!(rendered.contains("u-1"));
    }

    #[test]
    fn draft_requires_title_price_and_deadline() {
        assert!(draft().validate().is_ok());

        let blank_title = ServiceDraft {
            title: "   ".into(),
            ..draft()
        };
        assert_eq!(
            blank_title.validate(),
            Err(ValidationError::EmptyField { field: "title" })
        );

        let no_price = ServiceDraft {
            price: String::new(),
            ..draft()
        };
        assert_eq!(
            no_price.validate(),
            Err(ValidationError::EmptyField { field: "price" })
        );
    }

    #[test]
    fn draft_record_starts_available_without_client() {
        let record = draft().into_record(UserId::new("a"));
        assert_eq!(record.status, ServiceStatus::Available);
        let service = record.with_id(ServiceId::new("s-1"));
        assert!(service.client_id.is_none());
        assert!(service.satisfies_client_invariant());
    }

    #[test]
    fn credentials_validation() {
        assert!(validate_credentials("a@example.com", "secret1").is_ok());
        assert_eq!(
            validate_credentials("not-an-email", "secret1"),
            Err(ValidationError::InvalidEmail)
        );
        assert_eq!(
            validate_credentials("a@localhost", "secret1"),
            Err(ValidationError::InvalidEmail)
        );
        assert!(matches!(
            validate_credentials("a@example.com", "123"),
            Err(ValidationError::PasswordTooShort { .. })
        ));
    }

    #[test]
    fn profile_rejects_non_http_avatar() {
        let mut profile = NewProfile {
            name: "Maria".into(),
            user_type: UserType::Freelancer,
            bio: String::new(),
            avatar_url: "javascript:alert(1)".into(),
        };
        assert!(matches!(
            profile.validate(),
            Err(ValidationError::InvalidUrl(_))
        ));

        profile.avatar_url = "https://example.com/a.png".into();
        assert!(profile.validate().is_ok());

        profile.avatar_url = String::new();
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn patch_keeps_unset_fields() {
        let mut service = draft()
            .into_record(UserId::new("a"))
            .with_id(ServiceId::new("s-1"));
        service.apply(&ServicePatch {
            status: ServiceStatus::InProgress,
            client_id: Some(UserId::new("b")),
            delivery: None,
        });
        service.apply(&ServicePatch {
            status: ServiceStatus::Delivered,
            client_id: None,
            delivery: Some(Delivery {
                file_name: "logo.png".into(),
                message: String::new(),
            }),
        });
        assert_eq!(service.client_id, Some(UserId::new("b")));
        assert_eq!(service.status, ServiceStatus::Delivered);
        assert!(service.satisfies_client_invariant());
    }

    #[test]
    fn user_type_serializes_as_type_field() {
        let user = User {
            id: UserId::new("u-1"),
            name: "Maria".into(),
            user_type: UserType::Freelancer,
            bio: String::new(),
            avatar_url: String::new(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["type"], "freelancer");
    }
}
