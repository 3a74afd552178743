//! Service lifecycle rules.
//!
//! ```text
//! available --accept--> in_progress --deliver--> delivered --confirm--> completed
//! ```
//!
//! Every mutation is checked here against the mirrored record and the acting
//! user before anything is written to the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::ValidationError;
use crate::model::{Delivery, Service, ServicePatch, User, UserId, UserType};
use crate::MAX_FIELD_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Available,
    InProgress,
    Delivered,
    Completed,
}

impl ServiceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InProgress => "in_progress",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
        }
    }

    /// Translation key of the status badge.
    #[must_use]
    pub const fn label_key(self) -> &'static str {
        match self {
            Self::Available => "status_available",
            Self::InProgress => "status_in_progress",
            Self::Delivered => "status_delivered",
            Self::Completed => "status_completed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    #[must_use]
    pub const fn requires_client(self) -> bool {
        !matches!(self, Self::Available)
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Available => Some(Self::InProgress),
            Self::InProgress => Some(Self::Delivered),
            Self::Delivered => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }

    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        if self == to {
            return Err(TransitionError::SameStatus { status: self });
        }
        if self.is_terminal() {
            return Err(TransitionError::FromTerminalStatus { status: self });
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition { from: self, to });
        }
        Ok(())
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("service is already {status}")]
    SameStatus { status: ServiceStatus },
    #[error("cannot transition from terminal status: {status}")]
    FromTerminalStatus { status: ServiceStatus },
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ServiceStatus,
        to: ServiceStatus,
    },
}

/// A requested lifecycle step together with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Accept { client_id: UserId },
    Deliver { delivery: Delivery },
    Confirm,
}

/// Payload-free form of [`Action`], used for permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Accept,
    Deliver,
    Confirm,
}

impl ActionKind {
    #[must_use]
    pub const fn target(self) -> ServiceStatus {
        match self {
            Self::Accept => ServiceStatus::InProgress,
            Self::Deliver => ServiceStatus::Delivered,
            Self::Confirm => ServiceStatus::Completed,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accept => "accept_service",
            Self::Deliver => "deliver_service",
            Self::Confirm => "confirm_completion",
        }
    }

    /// Translation key of the toast shown once the gateway accepts the step.
    #[must_use]
    pub const fn success_key(self) -> &'static str {
        match self {
            Self::Accept => "toast_service_accepted",
            Self::Deliver => "toast_service_delivered",
            Self::Confirm => "toast_service_completed",
        }
    }
}

impl Action {
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Accept { .. } => ActionKind::Accept,
            Self::Deliver { .. } => ActionKind::Deliver,
            Self::Confirm => ActionKind::Confirm,
        }
    }
}

/// Checks status and role for `kind` without looking at a payload.
///
/// Accept: the actor must be a client and not the author. Deliver: only the
/// author. Confirm: only the assigned client.
pub fn authorize(service: &Service, actor: &User, kind: ActionKind) -> Result<(), ValidationError> {
    service.status.validate_transition(kind.target())?;

    let permitted = match kind {
        ActionKind::Accept => {
            if actor.id == service.author_id {
                return Err(ValidationError::SelfAssignment);
            }
            actor.user_type == UserType::Client
        }
        ActionKind::Deliver => actor.id == service.author_id,
        ActionKind::Confirm => service.client_id.as_ref() == Some(&actor.id),
    };

    if permitted {
        Ok(())
    } else {
        Err(ValidationError::NotPermitted { action: kind.name() })
    }
}

/// Validates `action` against the mirrored `service` and returns the patch to
/// write. The patch is only applied locally after the gateway accepts it.
pub fn plan(service: &Service, actor: &User, action: &Action) -> Result<ServicePatch, ValidationError> {
    let kind = action.kind();
    authorize(service, actor, kind)?;

    match action {
        Action::Accept { client_id } => {
            if client_id == &service.author_id {
                return Err(ValidationError::SelfAssignment);
            }
            // Clients accept on their own behalf only.
            if client_id != &actor.id {
                return Err(ValidationError::NotPermitted { action: kind.name() });
            }
            Ok(ServicePatch {
                status: kind.target(),
                client_id: Some(client_id.clone()),
                delivery: None,
            })
        }
        Action::Deliver { delivery } => {
            if delivery.file_name.trim().is_empty() {
                return Err(ValidationError::EmptyField { field: "file_name" });
            }
            let len = delivery.message.chars().count();
            if len > MAX_FIELD_LENGTH {
                return Err(ValidationError::TooLong {
                    field: "message",
                    len,
                    max: MAX_FIELD_LENGTH,
                });
            }
            Ok(ServicePatch {
                status: kind.target(),
                client_id: None,
                delivery: Some(Delivery {
                    file_name: delivery.file_name.trim().to_string(),
                    message: delivery.message.trim().to_string(),
                }),
            })
        }
        Action::Confirm => Ok(ServicePatch {
            status: kind.target(),
            client_id: None,
            delivery: None,
        }),
    }
}
