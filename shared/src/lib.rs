// lib.rs - shared core of the freelance marketplace client

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod conversation;
pub mod error;
pub mod i18n;
pub mod lifecycle;
pub mod model;
pub mod toast;
pub mod view;

pub use app::App;
pub use capabilities::{Capabilities, InMemoryBackend, InMemoryGateway, Subscription};
pub use config::Config;
pub use error::{AppError, AppResult, GatewayError, ValidationError};
pub use i18n::{Dictionary, Language, Translations};
pub use lifecycle::{Action, ServiceStatus, TransitionError};
pub use model::{
    Delivery, LoadState, Message, MessageId, Model, NewMessage, NewProfile, NewService, Service,
    ServiceDraft, ServiceId, ServicePatch, Session, UnixTimeMs, User, UserId, UserType,
};
pub use toast::{Toast, ToastKind};
pub use view::ViewModel;

pub const DEFAULT_TOAST_DURATION_MS: u64 = 3_000;
pub const MAX_MESSAGE_LENGTH: usize = 4_000;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_FIELD_LENGTH: usize = 10_000;
pub const MIN_PASSWORD_LENGTH: usize = 6;
