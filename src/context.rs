//! Per-application session context.
//!
//! Holds who is signed in and which language to display. The application
//! owns one of these and passes it to whatever needs it.

use std::fmt;

/// Display language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Language {
    /// French.
    #[default]
    French,
    /// English.
    English,
}

impl Language {
    /// The other language.
    pub fn toggle(self) -> Self {
        match self {
            Self::French => Self::English,
            Self::English => Self::French,
        }
    }

    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::French => "fr",
            Self::English => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Signed-in user and display preferences.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionContext {
    user_id: Option<String>,
    language: Language,
}

impl SessionContext {
    /// Signed-out context in the default language.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful sign-in.
    pub fn sign_in(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    /// Forget the signed-in user.
    pub fn sign_out(&mut self) {
        self.user_id = None;
    }

    /// The signed-in user, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Check if a user is signed in.
    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }

    /// Current language.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Switch to the other language and return it.
    pub fn toggle_language(&mut self) -> Language {
        self.language = self.language.toggle();
        self.language
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_toggle() {
        assert_eq!(Language::default(), Language::French);
        assert_eq!(Language::French.toggle(), Language::English);
        assert_eq!(Language::English.toggle().toggle(), Language::English);
        assert_eq!(Language::English.to_string(), "en");
    }

    #[test]
    fn test_sign_in_and_out() {
        let mut ctx = SessionContext::new();
        assert!(!ctx.is_signed_in());

        ctx.sign_in("user-42");
        assert_eq!(ctx.user_id(), Some("user-42"));

        assert_eq!(ctx.toggle_language(), Language::English);
        ctx.sign_out();
        assert_eq!(ctx.user_id(), None);
        assert_eq!(ctx.language(), Language::English);
    }
}
