//! Render-ready projection of the [`Model`].
//!
//! Action flags use [`lifecycle::authorize`], the same check the container
//! runs before a write, so a button is shown exactly when pressing it would
//! pass local validation.

use serde::Serialize;

use crate::conversation;
use crate::i18n::{I18n, Language};
use crate::lifecycle::{self, ActionKind, ServiceStatus};
use crate::model::{LoadState, Model, Service, User, UserId};
use crate::toast::ToastKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    pub is_authenticated: bool,
    pub current_user: Option<User>,
    pub language: Language,
    /// Open listings, for the home page.
    pub available_services: Vec<ServiceCard>,
    /// Present while signed in.
    pub dashboard: Option<Dashboard>,
    pub toast: Option<ToastView>,
    pub users_state: LoadState,
    pub services_state: LoadState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastView {
    pub text: String,
    pub kind: ToastKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCard {
    pub service: Service,
    /// Empty when the author's profile is not mirrored.
    pub author_name: String,
    pub status_label: String,
    pub actions: ServiceActions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceActions {
    pub can_accept: bool,
    pub can_deliver: bool,
    pub can_confirm: bool,
    pub can_chat: bool,
    pub other_party: Option<UserId>,
}

/// The signed-in user's services, one list per tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Authored and still open.
    pub created: Vec<ServiceCard>,
    pub accepted: Vec<ServiceCard>,
    pub delivered: Vec<ServiceCard>,
    pub history: Vec<ServiceCard>,
}

impl ViewModel {
    #[must_use]
    pub fn build(model: &Model, i18n: &I18n) -> Self {
        let viewer = model.current_user.as_ref();
        let card = |service: &Service| ServiceCard::build(model, i18n, viewer, service);

        let available_services = model
            .services
            .iter()
            .filter(|s| s.status == ServiceStatus::Available)
            .map(card)
            .collect();

        let dashboard = viewer.filter(|_| model.is_authenticated()).map(|user| {
            let mut dashboard = Dashboard::default();
            for service in model.services.iter().filter(|s| s.is_party(&user.id)) {
                let tab = match service.status {
                    ServiceStatus::Available if service.author_id == user.id => &mut dashboard.created,
                    ServiceStatus::Available => continue,
                    ServiceStatus::InProgress => &mut dashboard.accepted,
                    ServiceStatus::Delivered => &mut dashboard.delivered,
                    ServiceStatus::Completed => &mut dashboard.history,
                };
                tab.push(card(service));
            }
            dashboard
        });

        Self {
            is_authenticated: model.is_authenticated(),
            current_user: model.current_user.clone(),
            language: model.language,
            available_services,
            dashboard,
            toast: model.toast.as_ref().map(|t| ToastView {
                text: t.text.clone(),
                kind: t.kind,
            }),
            users_state: model.users_state,
            services_state: model.services_state,
        }
    }
}

impl ServiceCard {
    fn build(model: &Model, i18n: &I18n, viewer: Option<&User>, service: &Service) -> Self {
        Self {
            service: service.clone(),
            author_name: model
                .user(&service.author_id)
                .map(|u| u.name.clone())
                .unwrap_or_default(),
            status_label: i18n.translate(model.language, service.status.label_key()),
            actions: viewer
                .map(|user| ServiceActions::for_viewer(service, user))
                .unwrap_or_default(),
        }
    }
}

impl ServiceActions {
    #[must_use]
    pub fn for_viewer(service: &Service, viewer: &User) -> Self {
        let allowed = |kind| lifecycle::authorize(service, viewer, kind).is_ok();
        let other_party = conversation::other_party(service, &viewer.id).cloned();
        Self {
            can_accept: allowed(ActionKind::Accept),
            can_deliver: allowed(ActionKind::Deliver),
            can_confirm: allowed(ActionKind::Confirm),
            can_chat: other_party.is_some(),
            other_party,
        }
    }
}

/// Services authored by `user`, for profile pages.
#[must_use]
pub fn services_by_author<'a>(model: &'a Model, user: &UserId) -> Vec<&'a Service> {
    model
        .services
        .iter()
        .filter(|s| &s.author_id == user)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ServiceId, Session, UserType};

    fn user(id: &str, user_type: UserType) -> User {
        User {
            id: UserId::new(id),
            name: id.to_uppercase(),
            user_type,
            bio: String::new(),
            avatar_url: String::new(),
        }
    }

    fn service(id: &str, author: &str, status: ServiceStatus, client: Option<&str>) -> Service {
        Service {
            id: ServiceId::new(id),
            title: id.to_string(),
            author_id: UserId::new(author),
            price: "$1".into(),
            deadline: "1 day".into(),
            description: String::new(),
            category: String::new(),
            status,
            client_id: client.map(UserId::new),
            delivery: None,
        }
    }

    fn signed_in(model: &mut Model, user: User) {
        model.session = Some(Session::new(user.id.clone(), "token"));
        model.current_user = Some(user);
    }

    fn model() -> Model {
        Model {
            users: vec![user("a", UserType::Freelancer), user("b", UserType::Client)],
            services: vec![
                service("open", "a", ServiceStatus::Available, None),
                service("working", "a", ServiceStatus::InProgress, Some("b")),
                service("sent", "a", ServiceStatus::Delivered, Some("b")),
                service("done", "a", ServiceStatus::Completed, Some("b")),
                service("other", "c", ServiceStatus::Available, None),
            ],
            ..Model::default()
        }
    }

    fn ids(cards: &[ServiceCard]) -> Vec<&str> {
        cards.iter().map(|c| c.service.id.as_str()).collect()
    }

    #[test]
    fn signed_out_view_lists_open_services_without_actions() {
        let view = ViewModel::build(&model(), &I18n::default());
        assert!(!view.is_authenticated);
        assert!(view.dashboard.is_none());
        assert_eq!(ids(&view.available_services), ["open", "other"]);
        assert_eq!(view.available_services[0].author_name, "A");
        assert_eq!(view.available_services[0].status_label, "Available");
        assert_eq!(view.available_services[0].actions, ServiceActions::default());
    }

    #[test]
    fn dashboard_tabs_follow_status() {
        let mut model = model();
        signed_in(&mut model, user("a", UserType::Freelancer));
        let dashboard = ViewModel::build(&model, &I18n::default()).dashboard.unwrap();
        assert_eq!(ids(&dashboard.created), ["open"]);
        assert_eq!(ids(&dashboard.accepted), ["working"]);
        assert_eq!(ids(&dashboard.delivered), ["sent"]);
        assert_eq!(ids(&dashboard.history), ["done"]);
    }

    #[test]
    fn client_dashboard_has_no_created_tab_entries() {
        let mut model = model();
        signed_in(&mut model, user("b", UserType::Client));
        let dashboard = ViewModel::build(&model, &I18n::default()).dashboard.unwrap();
        assert!(dashboard.created.is_empty());
        assert_eq!(ids(&dashboard.accepted), ["working"]);
    }

    #[test]
    fn action_flags_match_roles() {
        let model = model();
        let author = user("a", UserType::Freelancer);
        let client = user("b", UserType::Client);

        let open = model.service(&ServiceId::new("open")).unwrap();
        assert!(ServiceActions::for_viewer(open, &client).can_accept);
        assert!(!ServiceActions::for_viewer(open, &author).can_accept);
        assert!(!ServiceActions::for_viewer(open, &author).can_chat);

        let working = model.service(&ServiceId::new("working")).unwrap();
        let as_author = ServiceActions::for_viewer(working, &author);
        assert!(as_author.can_deliver);
        assert!(as_author.can_chat);
        assert_eq!(as_author.other_party, Some(UserId::new("b")));
        assert!(!ServiceActions::for_viewer(working, &client).can_deliver);

        let sent = model.service(&ServiceId::new("sent")).unwrap();
        assert!(ServiceActions::for_viewer(sent, &client).can_confirm);
        assert!(!ServiceActions::for_viewer(sent, &author).can_confirm);
    }

    #[test]
    fn status_labels_follow_language() {
        let mut model = model();
        model.language = Language::PtBr;
        let view = ViewModel::build(&model, &I18n::default());
        assert_eq!(view.available_services[0].status_label, "Disponível");
    }

    #[test]
    fn services_by_author_filters() {
        let model = model();
        assert_eq!(services_by_author(&model, &UserId::new("a")).len(), 4);
        assert_eq!(services_by_author(&model, &UserId::new("c")).len(), 1);
    }
}
