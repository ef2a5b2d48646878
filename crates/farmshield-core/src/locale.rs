//! Locale lookup collaborator.
//!
//! The string tables themselves live outside this crate; views only need a
//! key -> string lookup and the current locale code. Swapping the locale at
//! runtime never invalidates anything held by the router, the cache, or a
//! voice session.

use crate::error::{FarmError, FarmResult};
use std::collections::HashMap;
use std::sync::RwLock;

pub const FALLBACK_LOCALE: &str = "en";

/// Maps semantic keys to localized strings.
pub trait LocaleProvider: Send + Sync {
    /// Current locale code (e.g. "en", "hi").
    fn locale(&self) -> String;

    /// Localized string for `key`. Unknown keys come back unchanged.
    fn text(&self, key: &str) -> String;
}

/// In-memory tables keyed by locale, e.g. loaded from a TOML file:
///
/// ```toml
/// [en]
/// "nav.dashboard" = "Dashboard"
///
/// [hi]
/// "nav.dashboard" = "डैशबोर्ड"
/// ```
#[derive(Debug, Default)]
pub struct TableLocale {
    current: RwLock<String>,
    tables: HashMap<String, HashMap<String, String>>,
}

impl TableLocale {
    pub fn new(locale: &str, tables: HashMap<String, HashMap<String, String>>) -> Self {
        Self {
            current: RwLock::new(locale.to_string()),
            tables,
        }
    }

    pub fn from_toml_str(locale: &str, raw: &str) -> FarmResult<Self> {
        let tables: HashMap<String, HashMap<String, String>> =
            toml::from_str(raw).map_err(|e| FarmError::Config(format!("locale tables: {}", e)))?;
        Ok(Self::new(locale, tables))
    }

    /// Switch locale. Unknown codes are accepted; lookups fall back to `en`.
    pub fn set_locale(&self, locale: &str) {
        match self.current.write() {
            Ok(mut guard) => *guard = locale.to_string(),
            Err(poisoned) => *poisoned.into_inner() = locale.to_string(),
        }
    }

    pub fn locales(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}

impl LocaleProvider for TableLocale {
    fn locale(&self) -> String {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn text(&self, key: &str) -> String {
        let locale = self.locale();
        self.tables
            .get(&locale)
            .and_then(|t| t.get(key))
            .or_else(|| self.tables.get(FALLBACK_LOCALE).and_then(|t| t.get(key)))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLES: &str = r#"
[en]
"nav.mandi" = "Mandi Rates"
"nav.bot" = "Sahayak Bot"

[hi]
"nav.mandi" = "मंडी भाव"
"#;

    #[test]
    fn looks_up_current_locale_then_english() {
        let locale = TableLocale::from_toml_str("hi", TABLES).unwrap();
        assert_eq!(locale.text("nav.mandi"), "मंडी भाव");
        assert_eq!(locale.text("nav.bot"), "Sahayak Bot");
        assert_eq!(locale.text("nav.missing"), "nav.missing");
    }

    #[test]
    fn swapping_to_unknown_locale_falls_back() {
        let locale = TableLocale::from_toml_str("en", TABLES).unwrap();
        locale.set_locale("ta");
        assert_eq!(locale.locale(), "ta");
        assert_eq!(locale.text("nav.mandi"), "Mandi Rates");
        assert_eq!(locale.locales(), vec!["en", "hi"]);
    }
}
