//! The built render table
//!
//! A [`Barbershop`] owns every [`Barber`] produced by a successful build,
//! keyed by (template token, document). Nothing in it can be changed after
//! the build, so it can be shared freely between threads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::barber::{Barber, TypedBarber};
use crate::diagnostics::Diagnostic;
use crate::error::{BarberError, Result};
use crate::schema::{Document, DocumentData};
use crate::signature::Signature;
use crate::template::TemplateToken;

const MAX_SUGGESTIONS: usize = 3;

/// Key of the render table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BarberKey {
    pub token: TemplateToken,
    pub document: String,
}

impl BarberKey {
    pub fn new(token: TemplateToken, document: impl Into<String>) -> Self {
        Self {
            token,
            document: document.into(),
        }
    }
}

impl fmt::Display for BarberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.token, self.document)
    }
}

/// What the barbershop remembers about one template family
#[derive(Debug, Clone)]
pub(crate) struct TemplateFamily {
    data_schema: String,
    signature: Signature,
    /// version → documents targeted at that version
    targets: BTreeMap<u64, BTreeSet<String>>,
}

impl TemplateFamily {
    pub(crate) fn new(data_schema: &str, signature: Signature) -> Self {
        Self {
            data_schema: data_schema.to_string(),
            signature,
            targets: BTreeMap::new(),
        }
    }

    pub(crate) fn add_targets(&mut self, version: u64, targets: &BTreeSet<String>) {
        self.targets
            .entry(version)
            .or_default()
            .extend(targets.iter().cloned());
    }
}

#[derive(Debug)]
pub struct Barbershop {
    barbers: BTreeMap<BarberKey, Barber>,
    families: BTreeMap<TemplateToken, TemplateFamily>,
    documents: BTreeSet<String>,
    warnings: Vec<Diagnostic>,
}

impl Barbershop {
    pub(crate) fn new(
        barbers: BTreeMap<BarberKey, Barber>,
        families: BTreeMap<TemplateToken, TemplateFamily>,
        documents: BTreeSet<String>,
        warnings: Vec<Diagnostic>,
    ) -> Self {
        Self {
            barbers,
            families,
            documents,
            warnings,
        }
    }

    /// Look up the barber for a template token and document
    pub fn get_barber(&self, token: &str, document: &str) -> Result<&Barber> {
        let key = BarberKey::new(TemplateToken::from(token), document);
        if let Some(barber) = self.barbers.get(&key) {
            return Ok(barber);
        }

        if !self.documents.contains(document) {
            Err(BarberError::DocumentNotInstalled {
                document: document.to_string(),
            })
        } else if !self.families.contains_key(&key.token) {
            Err(BarberError::TemplateNotInstalled {
                token: token.to_string(),
                suggestions: self.suggest_tokens(token),
            })
        } else {
            Err(BarberError::TargetMismatch {
                token: token.to_string(),
                document: document.to_string(),
            })
        }
    }

    /// Look up a barber by its data and document types
    pub fn barber<D: DocumentData, O: Document>(&self) -> Result<TypedBarber<'_, D, O>> {
        let token = D::schema().template_token();
        let barber = self.get_barber(token.as_str(), &O::schema().name)?;
        Ok(TypedBarber::new(barber))
    }

    pub fn all_barbers(&self) -> &BTreeMap<BarberKey, Barber> {
        &self.barbers
    }

    /// Documents a template family renders at `version`, or at its newest version
    pub fn get_target_documents(&self, token: &str, version: Option<u64>) -> Result<BTreeSet<&str>> {
        let family = self
            .families
            .get(&TemplateToken::from(token))
            .ok_or_else(|| BarberError::TemplateNotInstalled {
                token: token.to_string(),
                suggestions: self.suggest_tokens(token),
            })?;

        let targets = match version {
            Some(v) => family.targets.get(&v),
            None => family.targets.values().next_back(),
        };
        Ok(targets
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect())
    }

    /// Warnings the build tolerated
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Signature of the data schema behind a template family
    pub fn signature(&self, token: &str) -> Option<&Signature> {
        self.families.get(&TemplateToken::from(token)).map(|f| &f.signature)
    }

    /// Data schema name behind a template family
    pub fn data_schema(&self, token: &str) -> Option<&str> {
        self.families
            .get(&TemplateToken::from(token))
            .map(|f| f.data_schema.as_str())
    }

    /// Whether the installed data schema can still satisfy a signature
    /// persisted by an older deployment
    pub fn can_satisfy_legacy(&self, token: &str, encoded: &str) -> Result<bool> {
        let legacy = Signature::decode(encoded)?;
        let current = self
            .signature(token)
            .ok_or_else(|| BarberError::TemplateNotInstalled {
                token: token.to_string(),
                suggestions: self.suggest_tokens(token),
            })?;
        Ok(current.can_satisfy(&legacy))
    }

    fn suggest_tokens(&self, query: &str) -> Vec<String> {
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, &str)> = self
            .families
            .keys()
            .filter_map(|token| {
                matcher
                    .fuzzy_match(token.as_str(), query)
                    .map(|score| (score, token.as_str()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, token)| token.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::schema::{DataSchema, DocumentField, DocumentSchema, TypeTag};
    use crate::template::DocumentTemplate;

    fn shop() -> Barbershop {
        let transfer = DataSchema::new("TransferDocumentData")
            .field("sender", TypeTag::String)
            .field("amount", TypeTag::String);

        let mut builder = Builder::new();
        builder
            .install_document(DocumentSchema::new("SmsDocument").field(DocumentField::required("sms_body")))
            .unwrap();
        builder
            .install_document(DocumentSchema::new("PushDocument").field(DocumentField::required("push_title")))
            .unwrap();
        builder
            .install_template(
                &transfer,
                DocumentTemplate::new("TransferDocumentData", "en-US")
                    .target("SmsDocument")
                    .target("PushDocument")
                    .field("sms_body", "{{sender}} sent you {{amount}}")
                    .field("push_title", "{{sender}}"),
            )
            .unwrap();
        builder
            .install_template(
                &transfer,
                DocumentTemplate::new("TransferDocumentData", "en-US")
                    .version(2)
                    .target("SmsDocument")
                    .field("sms_body", "{{sender}}: {{amount}}"),
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_not_found_is_disambiguated() {
        let shop = shop();
        assert!(shop.get_barber("transfer", "SmsDocument").is_ok());
        assert!(matches!(
            shop.get_barber("transfer", "FaxDocument"),
            Err(BarberError::DocumentNotInstalled { .. })
        ));
        match shop.get_barber("transfr", "SmsDocument") {
            Err(BarberError::TemplateNotInstalled { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["transfer".to_string()]);
            }
            other => panic!("Expected TemplateNotInstalled, got {:?}", other.map(|b| b.token().clone())),
        }
    }

    #[test]
    fn test_target_documents_per_version() {
        let shop = shop();
        let v1: Vec<_> = shop.get_target_documents("transfer", Some(1)).unwrap().into_iter().collect();
        assert_eq!(v1, vec!["PushDocument", "SmsDocument"]);
        let newest: Vec<_> = shop.get_target_documents("transfer", None).unwrap().into_iter().collect();
        assert_eq!(newest, vec!["SmsDocument"]);
        assert!(shop.get_target_documents("transfer", Some(9)).unwrap().is_empty());
    }

    #[test]
    fn test_push_barber_only_supports_version_one() {
        let shop = shop();
        let push = shop.get_barber("transfer", "PushDocument").unwrap();
        assert_eq!(push.compatible_versions().iter().copied().collect::<Vec<_>>(), vec![1]);
        let sms = shop.get_barber("transfer", "SmsDocument").unwrap();
        assert_eq!(sms.compatible_versions().len(), 2);
    }

    #[test]
    fn test_legacy_signature_check() {
        let shop = shop();
        assert!(shop.can_satisfy_legacy("transfer", "sender,0").unwrap());
        assert!(!shop.can_satisfy_legacy("transfer", "sender,0;memo,0").unwrap());
        assert!(shop.can_satisfy_legacy("transfer", "garbage").is_err());
        assert_eq!(shop.data_schema("transfer"), Some("TransferDocumentData"));
    }
}
