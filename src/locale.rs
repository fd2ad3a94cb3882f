//! Locales and locale resolution

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BarberError, Result};

/// A language tag such as `en-US`, compared verbatim
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Locale {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Locale {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Chooses which installed locale serves a request
///
/// Implementations must return a member of `options`; [`resolve_entry`]
/// reports anything else as a contract violation.
pub trait LocaleResolver: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, requested: &Locale, options: &BTreeSet<&Locale>, token: &str) -> Result<Locale>;
}

/// The requested locale when installed, otherwise the first installed one
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOrFirst;

impl LocaleResolver for MatchOrFirst {
    fn name(&self) -> &str {
        "match-or-first"
    }

    fn resolve(&self, requested: &Locale, options: &BTreeSet<&Locale>, token: &str) -> Result<Locale> {
        if options.contains(requested) {
            return Ok(requested.clone());
        }
        options
            .first()
            .map(|locale| (*locale).clone())
            .ok_or_else(|| BarberError::EmptyLocaleOptions {
                requested: requested.to_string(),
                token: token.to_string(),
            })
    }
}

/// Resolve a locale against the keys of `entries` and return its value
pub fn resolve_entry<'a, V>(
    resolver: &dyn LocaleResolver,
    requested: &Locale,
    entries: &'a BTreeMap<Locale, V>,
    token: &str,
) -> Result<(&'a Locale, &'a V)> {
    if entries.is_empty() {
        return Err(BarberError::EmptyLocaleOptions {
            requested: requested.to_string(),
            token: token.to_string(),
        });
    }

    let options: BTreeSet<&Locale> = entries.keys().collect();
    let resolved = resolver.resolve(requested, &options, token)?;
    entries
        .get_key_value(&resolved)
        .ok_or_else(|| BarberError::ResolverContract {
            resolver: resolver.name().to_string(),
            token: token.to_string(),
            requested: requested.to_string(),
            resolved: resolved.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(locales: &[&str]) -> BTreeMap<Locale, String> {
        locales
            .iter()
            .map(|l| (Locale::from(*l), format!("template-{}", l)))
            .collect()
    }

    #[test]
    fn test_exact_match() {
        let map = entries(&["en-US", "fr-FR"]);
        let (locale, value) = resolve_entry(&MatchOrFirst, &Locale::from("fr-FR"), &map, "t").unwrap();
        assert_eq!(locale.as_str(), "fr-FR");
        assert_eq!(value, "template-fr-FR");
    }

    #[test]
    fn test_fallback_is_first_in_order() {
        let map = entries(&["fr-FR", "en-US"]);
        let (locale, _) = resolve_entry(&MatchOrFirst, &Locale::from("en-CA"), &map, "t").unwrap();
        assert_eq!(locale.as_str(), "en-US");
    }

    #[test]
    fn test_empty_map_is_its_own_error() {
        let map: BTreeMap<Locale, String> = BTreeMap::new();
        let err = resolve_entry(&MatchOrFirst, &Locale::from("en-US"), &map, "t").unwrap_err();
        assert!(matches!(err, BarberError::EmptyLocaleOptions { .. }));
    }

    #[derive(Debug)]
    struct Klingon;

    impl LocaleResolver for Klingon {
        fn name(&self) -> &str {
            "klingon"
        }

        fn resolve(&self, _: &Locale, _: &BTreeSet<&Locale>, _: &str) -> Result<Locale> {
            Ok(Locale::from("tlh"))
        }
    }

    #[test]
    fn test_contract_violation_names_resolver() {
        let map = entries(&["en-US"]);
        let err = resolve_entry(&Klingon, &Locale::from("en-US"), &map, "transfer").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("klingon"));
        assert!(message.contains("en-US"));
        assert!(message.contains("tlh"));
    }
}
