use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[serde(rename = "pt-BR")]
    PtBr,
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "es")]
    Es,
}

impl Language {
    pub const ALL: [Self; 3] = [Self::PtBr, Self::En, Self::Es];

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::PtBr => "pt-BR",
            Self::En => "en",
            Self::Es => "es",
        }
    }

    /// Picks a supported language from a locale tag such as `pt-PT` or
    /// `es_AR`. Unknown tags fall back to English.
    #[must_use]
    pub fn from_locale(locale: &str) -> Self {
        let primary = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "pt" => Self::PtBr,
            "es" => Self::Es,
            _ => Self::En,
        }
    }
}

/// Key/value translation lookup. Implementations are external dictionaries.
pub trait Translations: Send + Sync {
    fn lookup(&self, language: Language, key: &str) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("invalid dictionary json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// In-memory dictionary, `{"en": {"key": "text"}, ...}` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: HashMap<Language, HashMap<String, String>>,
}

impl Dictionary {
    pub fn from_json(json: &str) -> Result<Self, DictionaryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, language: Language, key: impl Into<String>, text: impl Into<String>) {
        self.entries
            .entry(language)
            .or_default()
            .insert(key.into(), text.into());
    }

    /// Entries of `other` win over existing ones.
    #[must_use]
    pub fn merged(mut self, other: Dictionary) -> Self {
        for (language, entries) in other.entries {
            self.entries.entry(language).or_default().extend(entries);
        }
        self
    }

    /// Strings the core itself shows as toasts.
    #[must_use]
    pub fn builtin() -> Self {
        const ENTRIES: &[(&str, [&str; 3])] = &[
            (
                "toast_language_changed",
                ["Idioma alterado", "Language changed", "Idioma cambiado"],
            ),
            (
                "toast_service_created",
                ["Serviço criado", "Service created", "Servicio creado"],
            ),
            (
                "toast_service_accepted",
                ["Serviço aceito", "Service accepted", "Servicio aceptado"],
            ),
            (
                "toast_service_delivered",
                ["Entrega enviada", "Delivery sent", "Entrega enviada"],
            ),
            (
                "toast_service_completed",
                ["Serviço concluído", "Service completed", "Servicio completado"],
            ),
            (
                "toast_action_failed",
                [
                    "Não foi possível concluir a ação",
                    "The action could not be completed",
                    "No se pudo completar la acción",
                ],
            ),
            (
                "toast_auth_failed",
                ["Falha na autenticação", "Authentication failed", "Error de autenticación"],
            ),
            (
                "toast_not_found",
                ["Item não encontrado", "Item not found", "Elemento no encontrado"],
            ),
            (
                "toast_sign_in_required",
                ["Entre para continuar", "Sign in to continue", "Inicia sesión para continuar"],
            ),
            (
                "toast_not_permitted",
                ["Ação não permitida", "Action not permitted", "Acción no permitida"],
            ),
            (
                "toast_invalid_input",
                ["Dados inválidos", "Invalid input", "Datos no válidos"],
            ),
            ("status_available", ["Disponível", "Available", "Disponible"]),
            ("status_in_progress", ["Em andamento", "In progress", "En curso"]),
            ("status_delivered", ["Entregue", "Delivered", "Entregado"]),
            ("status_completed", ["Concluído", "Completed", "Completado"]),
        ];

        let mut dictionary = Self::default();
        for (key, texts) in ENTRIES {
            for (language, text) in Language::ALL.iter().zip(texts) {
                dictionary.insert(*language, *key, *text);
            }
        }
        dictionary
    }
}

impl Translations for Dictionary {
    fn lookup(&self, language: Language, key: &str) -> Option<String> {
        self.entries.get(&language)?.get(key).cloned()
    }
}

#[derive(Clone)]
pub struct I18n {
    translations: Arc<dyn Translations>,
}

impl I18n {
    pub fn new(translations: Arc<dyn Translations>) -> Self {
        Self { translations }
    }

    /// Missing keys render as the key itself.
    #[must_use]
    pub fn translate(&self, language: Language, key: &str) -> String {
        self.translations
            .lookup(language, key)
            .unwrap_or_else(|| key.to_string())
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new(Arc::new(Dictionary::builtin()))
    }
}
