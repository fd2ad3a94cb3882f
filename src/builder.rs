//! Barbershop builder
//!
//! Stages data schemas, templates and documents, then validates the whole
//! configuration in one pass and materializes a [`Barbershop`].
//!
//! ## Pipeline
//!
//! ```text
//! install_*  ──►  emptiness ──► documents ──► wiring ──► compile
//!                 (1)           (2, 3)        (4, 5)     (6)
//!                                                         │
//!   Barbershop ◄── materialize ◄── unused fields ◄── contents
//!                  (14)            (12, 13)          (7..11)
//! ```
//!
//! Problems are collected into [`Diagnostics`] and reported together at a
//! few checkpoints, so a misconfigured template set is reported in one run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::barber::{Barber, BarberParts};
use crate::barbershop::{BarberKey, Barbershop, TemplateFamily};
use crate::config::BarbershopConfig;
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::error::{BarberError, Result};
use crate::locale::{LocaleResolver, Locale, MatchOrFirst};
use crate::schema::{DataSchema, Document, DocumentData, DocumentSchema};
use crate::signature::Signature;
use crate::template::{CompiledDocumentTemplate, DocumentTemplate, TemplateToken};
use crate::version::{SpecifiedOrNewest, VersionResolver};

/// Installed templates: data schema → locale → version → template
type TemplateTable = BTreeMap<String, BTreeMap<Locale, BTreeMap<u64, DocumentTemplate>>>;

/// Compiled templates keyed by (data schema, locale, version)
type CompiledTable = BTreeMap<(String, Locale, u64), Arc<CompiledDocumentTemplate>>;

#[derive(Debug)]
struct InstalledData {
    schema: DataSchema,
    signature: Signature,
}

/// Single-use builder; [`Builder::build`] consumes it
#[derive(Debug)]
pub struct Builder {
    strict: bool,
    version_resolver: Arc<dyn VersionResolver>,
    locale_resolver: Arc<dyn LocaleResolver>,
    data: BTreeMap<String, InstalledData>,
    templates: TemplateTable,
    documents: BTreeMap<String, DocumentSchema>,
    /// Document field name → owning document
    field_owners: BTreeMap<String, String>,
    /// (data schema, document) pairs the host declared it will render
    required_pairings: BTreeSet<(String, String)>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            strict: false,
            version_resolver: Arc::new(SpecifiedOrNewest),
            locale_resolver: Arc::new(MatchOrFirst),
            data: BTreeMap::new(),
            templates: BTreeMap::new(),
            documents: BTreeMap::new(),
            field_owners: BTreeMap::new(),
            required_pairings: BTreeSet::new(),
        }
    }

    /// Builder with strictness and resolvers taken from configuration
    pub fn from_config(config: &BarbershopConfig) -> Self {
        Self {
            strict: config.build.strict,
            version_resolver: config.resolvers.version.resolver(),
            locale_resolver: config.resolvers.locale.resolver(),
            ..Self::new()
        }
    }

    /// Promote warnings to errors
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_version_resolver(mut self, resolver: impl VersionResolver + 'static) -> Self {
        self.version_resolver = Arc::new(resolver);
        self
    }

    pub fn with_locale_resolver(mut self, resolver: impl LocaleResolver + 'static) -> Self {
        self.locale_resolver = Arc::new(resolver);
        self
    }

    /// Register a data schema; templates installed under it are added separately
    pub fn install_data_schema(&mut self, schema: &DataSchema) -> Result<()> {
        if let Some(existing) = self.data.get(&schema.name) {
            if existing.schema != *schema {
                return Err(BarberError::Config(format!(
                    "Data schema {} is already installed with a different definition",
                    schema.name
                )));
            }
            return Ok(());
        }

        let signature = schema.signature()?;
        tracing::debug!(schema = %schema.name, signature = %signature, "installed data schema");
        self.data.insert(
            schema.name.clone(),
            InstalledData {
                schema: schema.clone(),
                signature,
            },
        );
        Ok(())
    }

    /// Install a template under the data schema it reads from
    pub fn install_template(&mut self, schema: &DataSchema, template: DocumentTemplate) -> Result<()> {
        self.install_data_schema(schema)?;

        let versions = self
            .templates
            .entry(schema.name.clone())
            .or_default()
            .entry(template.locale.clone())
            .or_default();

        if let Some(existing) = versions.get(&template.version) {
            return Err(BarberError::TemplateOverwrite {
                source_schema: schema.name.clone(),
                locale: template.locale.to_string(),
                version: template.version,
                existing: existing.to_string(),
            });
        }

        tracing::debug!(
            schema = %schema.name,
            locale = %template.locale,
            version = template.version,
            targets = template.targets.len(),
            "installed document template"
        );
        versions.insert(template.version, template);
        Ok(())
    }

    /// Install a template under a typed data schema
    pub fn install<D: DocumentData>(&mut self, template: DocumentTemplate) -> Result<()> {
        self.install_template(&D::schema(), template)
    }

    /// Install a document; its field names must not collide with any installed document
    pub fn install_document(&mut self, schema: DocumentSchema) -> Result<()> {
        schema.validate()?;
        if self.documents.contains_key(&schema.name) {
            return Err(BarberError::Config(format!(
                "Document {} is already installed",
                schema.name
            )));
        }
        for field in &schema.fields {
            if let Some(owner) = self.field_owners.get(&field.name) {
                return Err(BarberError::FieldShadow {
                    field: field.name.clone(),
                    existing_schema: owner.clone(),
                    new_schema: schema.name.clone(),
                });
            }
        }

        for field in &schema.fields {
            self.field_owners.insert(field.name.clone(), schema.name.clone());
        }
        tracing::debug!(document = %schema.name, fields = schema.fields.len(), "installed document");
        self.documents.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Install a typed document
    pub fn install_document_type<O: Document>(&mut self) -> Result<()> {
        self.install_document(O::schema())
    }

    /// Declare that `document` will be rendered from `schema`; the build
    /// fails if no installed template of `schema` targets it
    pub fn require_barber(&mut self, schema: &DataSchema, document: impl Into<String>) -> Result<()> {
        self.install_data_schema(schema)?;
        self.required_pairings.insert((schema.name.clone(), document.into()));
        Ok(())
    }

    /// Typed form of [`Builder::require_barber`]
    pub fn require<D: DocumentData, O: Document>(&mut self) -> Result<()> {
        self.require_barber(&D::schema(), O::schema().name)
    }

    fn all_templates(&self) -> impl Iterator<Item = (&str, &DocumentTemplate)> {
        self.templates.iter().flat_map(|(installed_under, by_locale)| {
            by_locale
                .values()
                .flat_map(|by_version| by_version.values())
                .map(move |template| (installed_under.as_str(), template))
        })
    }

    /// Validate everything that was installed and materialize the barbershop
    pub fn build(self) -> Result<Barbershop> {
        let mut diagnostics = Diagnostics::new(self.strict);

        // Emptiness is reported on its own; later checks would only echo it
        self.check_emptiness(&mut diagnostics);
        diagnostics.checkpoint()?;

        self.check_field_ownership(&mut diagnostics);
        self.check_dangling_documents(&mut diagnostics);
        self.check_template_wiring(&mut diagnostics);
        if diagnostics.has_errors() {
            return Err(BarberError::Validation(diagnostics));
        }

        let compiled = self.compile_all(&mut diagnostics);

        self.check_missing_variables(&compiled, &mut diagnostics);
        self.check_required_fields(&mut diagnostics);
        self.check_extra_fields(&mut diagnostics);
        self.check_pairings(&mut diagnostics);
        if diagnostics.has_errors() {
            return Err(BarberError::Validation(diagnostics));
        }

        self.check_unused_data_fields(&compiled, &mut diagnostics);
        diagnostics.checkpoint()?;

        for warning in diagnostics.warnings() {
            tracing::warn!(code = %warning.code, "{}", warning.message);
        }
        Ok(self.materialize(compiled, diagnostics))
    }

    // =========================================================================
    // Validation passes
    // =========================================================================

    fn check_emptiness(&self, diagnostics: &mut Diagnostics) {
        if self.templates.is_empty() {
            diagnostics.push(
                DiagnosticCode::NoTemplates,
                "No document templates are installed; the barbershop will not be able to render anything.",
            );
        }
        if self.documents.is_empty() {
            diagnostics.push(
                DiagnosticCode::NoDocuments,
                "No documents are installed; the barbershop will not be able to render anything.",
            );
        }
    }

    fn check_field_ownership(&self, diagnostics: &mut Diagnostics) {
        let mut owners: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for document in self.documents.values() {
            for field in &document.fields {
                owners
                    .entry(field.name.as_str())
                    .or_default()
                    .insert(document.name.as_str());
            }
        }
        for (field, documents) in owners.iter().filter(|(_, docs)| docs.len() > 1) {
            diagnostics.push(
                DiagnosticCode::ShadowedField,
                format!(
                    "Field '{}' is declared by multiple documents: {}. \
                     Document field names must be unique across all installed documents.",
                    field,
                    join(documents)
                ),
            );
        }
    }

    fn check_dangling_documents(&self, diagnostics: &mut Diagnostics) {
        let targeted: BTreeSet<&str> = self
            .all_templates()
            .flat_map(|(_, t)| t.targets.iter().map(String::as_str))
            .collect();
        for name in self.documents.keys() {
            if !targeted.contains(name.as_str()) {
                diagnostics.push(
                    DiagnosticCode::DanglingDocument,
                    format!(
                        "Document {} is installed but no installed template targets it.",
                        name
                    ),
                );
            }
        }
    }

    fn check_template_wiring(&self, diagnostics: &mut Diagnostics) {
        for (installed_under, template) in self.all_templates() {
            if template.source != installed_under {
                diagnostics.push(
                    DiagnosticCode::SourceMismatch,
                    format!(
                        "Template was installed under data schema {} but declares source {}.\n{}",
                        installed_under, template.source, template
                    ),
                );
            }
            for target in &template.targets {
                if !self.documents.contains_key(target) {
                    diagnostics.push(
                        DiagnosticCode::MissingTarget,
                        format!(
                            "Template for {} (locale {}, version {}) targets document {}, which is not installed. \
                             Installed documents: [{}]",
                            installed_under,
                            template.locale,
                            template.version,
                            target,
                            join(self.documents.keys())
                        ),
                    );
                }
            }
        }
    }

    fn compile_all(&self, diagnostics: &mut Diagnostics) -> CompiledTable {
        let mut compiled = BTreeMap::new();
        for (installed_under, template) in self.all_templates() {
            if let Some(result) = CompiledDocumentTemplate::compile(template, &self.documents, diagnostics) {
                tracing::debug!(
                    schema = installed_under,
                    locale = %template.locale,
                    version = template.version,
                    "compiled document template"
                );
                compiled.insert(
                    (installed_under.to_string(), template.locale.clone(), template.version),
                    Arc::new(result),
                );
            }
        }
        compiled
    }

    fn check_missing_variables(&self, compiled: &CompiledTable, diagnostics: &mut Diagnostics) {
        for ((schema_name, locale, version), template) in compiled {
            let Some(data) = self.data.get(schema_name) else {
                continue;
            };
            let roots = data.signature.root_keys();
            let mut reported = BTreeSet::new();

            for (field, _, cell) in template.cells() {
                let Some(cell) = cell else { continue };
                for variable in cell.variable_references() {
                    let root = variable.split('.').next().unwrap_or(variable);
                    if roots.contains(root) || !reported.insert((field, variable.as_str())) {
                        continue;
                    }
                    diagnostics.push(
                        DiagnosticCode::MissingVariable,
                        format!(
                            "Field '{}' of the {} template for {} (version {}) references variable '{}', \
                             but data schema {} has no field '{}'.\nField template: {}",
                            field, locale, schema_name, version, variable, schema_name, root,
                            cell.text()
                        ),
                    );
                }
            }
        }
    }

    fn check_required_fields(&self, diagnostics: &mut Diagnostics) {
        for (installed_under, template) in self.all_templates() {
            let mut missing = Vec::new();
            for target in &template.targets {
                let Some(document) = self.documents.get(target) else { continue };
                for field in document.required_fields() {
                    if !template.fields.contains_key(&field.name) {
                        missing.push(format!("{} requires '{}'", document.name, field.name));
                    }
                }
            }
            if !missing.is_empty() {
                diagnostics.push(
                    DiagnosticCode::MissingRequiredField,
                    format!(
                        "Template for {} (locale {}, version {}) is missing required document fields: {}.",
                        installed_under,
                        template.locale,
                        template.version,
                        missing.join("; ")
                    ),
                );
            }
        }
    }

    fn check_extra_fields(&self, diagnostics: &mut Diagnostics) {
        for (installed_under, template) in self.all_templates() {
            let used: BTreeSet<&str> = template
                .targets
                .iter()
                .filter_map(|t| self.documents.get(t))
                .flat_map(|d| d.fields.iter().map(|f| f.name.as_str()))
                .collect();
            let extra: Vec<&str> = template
                .fields
                .keys()
                .map(String::as_str)
                .filter(|f| !used.contains(f))
                .collect();
            if !extra.is_empty() {
                diagnostics.push(
                    DiagnosticCode::ExtraField,
                    format!(
                        "Template for {} (locale {}, version {}) declares fields not used by any of its targets [{}]: {}.",
                        installed_under,
                        template.locale,
                        template.version,
                        join(&template.targets),
                        extra.join(", ")
                    ),
                );
            }
        }
    }

    fn check_pairings(&self, diagnostics: &mut Diagnostics) {
        for (name, data) in &self.data {
            if self.templates.get(name).map_or(true, BTreeMap::is_empty) {
                diagnostics.push(
                    DiagnosticCode::DanglingDataSchema,
                    format!(
                        "Data schema {} is installed but has no templates (template token '{}').",
                        name,
                        data.schema.template_token()
                    ),
                );
            }
        }

        // Tokens are the family key, so they must be unique across data schemas
        let mut by_token: BTreeMap<TemplateToken, BTreeSet<&str>> = BTreeMap::new();
        for (name, data) in &self.data {
            by_token
                .entry(data.schema.template_token())
                .or_default()
                .insert(name.as_str());
        }
        for (token, schemas) in by_token.iter().filter(|(_, schemas)| schemas.len() > 1) {
            diagnostics.push(
                DiagnosticCode::TokenCollision,
                format!(
                    "Data schemas {} all derive template token '{}'; rename all but one of them.",
                    join(schemas),
                    token
                ),
            );
        }

        for (data_schema, document) in &self.required_pairings {
            let targets = self.targets_of(data_schema);
            let has_templates = self.templates.get(data_schema).is_some_and(|t| !t.is_empty());
            // Schemas without any template are already reported as dangling
            if has_templates && !targets.contains(document.as_str()) {
                diagnostics.push(
                    DiagnosticCode::InvalidTarget,
                    format!(
                        "Data schema {} is required to render document {}, but no template of {} lists {} as a target. \
                         Targeted documents: [{}]",
                        data_schema,
                        document,
                        data_schema,
                        document,
                        join(&targets)
                    ),
                );
            }
        }
    }

    fn targets_of(&self, data_schema: &str) -> BTreeSet<&str> {
        self.templates
            .get(data_schema)
            .into_iter()
            .flat_map(|by_locale| by_locale.values())
            .flat_map(|by_version| by_version.values())
            .flat_map(|t| t.targets.iter().map(String::as_str))
            .collect()
    }

    fn check_unused_data_fields(&self, compiled: &CompiledTable, diagnostics: &mut Diagnostics) {
        for (name, data) in &self.data {
            let mut locales = BTreeSet::new();
            let mut variables = BTreeSet::new();
            for ((schema_name, locale, _), template) in compiled {
                if schema_name == name {
                    locales.insert(locale);
                    variables.extend(template.variable_references());
                }
            }
            if locales.is_empty() {
                continue;
            }

            for path in data.signature.paths() {
                if !variables.iter().any(|v| references(v, path)) {
                    diagnostics.push(
                        DiagnosticCode::UnusedDataField,
                        format!(
                            "Field '{}' of data schema {} is not referenced by any template (locales: {}).",
                            path,
                            name,
                            join(&locales)
                        ),
                    );
                }
            }
        }
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    fn materialize(self, compiled: CompiledTable, diagnostics: Diagnostics) -> Barbershop {
        let mut parts: BTreeMap<BarberKey, BarberParts> = BTreeMap::new();
        let mut families: BTreeMap<TemplateToken, TemplateFamily> = BTreeMap::new();

        for ((schema_name, locale, version), template) in compiled {
            let Some(data) = self.data.get(&schema_name) else { continue };
            let token = data.schema.template_token();

            families
                .entry(token.clone())
                .or_insert_with(|| TemplateFamily::new(&schema_name, data.signature.clone()))
                .add_targets(version, template.targets());

            for target in template.targets() {
                let Some(document) = self.documents.get(target) else { continue };
                parts
                    .entry(BarberKey::new(token.clone(), target.clone()))
                    .or_insert_with(|| BarberParts::new(token.clone(), &schema_name, document.clone()))
                    .add(version, locale.clone(), Arc::clone(&template));
            }
        }

        let barbers: BTreeMap<BarberKey, Barber> = parts
            .into_iter()
            .map(|(key, parts)| {
                let barber = parts.into_barber(
                    Arc::clone(&self.version_resolver),
                    Arc::clone(&self.locale_resolver),
                );
                (key, barber)
            })
            .collect();

        tracing::info!(
            barbers = barbers.len(),
            warnings = diagnostics.warnings().len(),
            "barbershop built"
        );
        Barbershop::new(
            barbers,
            families,
            self.documents.into_keys().collect(),
            diagnostics.into_warnings(),
        )
    }
}

/// Whether template variable `variable` reads data field `path`
fn references(variable: &str, path: &str) -> bool {
    variable == path
        || path
            .strip_prefix(variable)
            .is_some_and(|rest| rest.starts_with('.'))
        || variable
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn join<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DocumentField, TypeTag};

    fn transfer() -> DataSchema {
        DataSchema::new("TransferDocumentData")
            .field("sender", TypeTag::String)
            .field("amount", TypeTag::String)
    }

    fn sms() -> DocumentSchema {
        DocumentSchema::new("SmsDocument").field(DocumentField::required("sms_body"))
    }

    fn sms_template(locale: &str) -> DocumentTemplate {
        DocumentTemplate::new("TransferDocumentData", locale)
            .target("SmsDocument")
            .field("sms_body", "{{sender}} sent you {{amount}}")
    }

    fn codes(err: BarberError) -> Vec<DiagnosticCode> {
        match err {
            BarberError::Validation(d) => d
                .errors()
                .iter()
                .chain(d.warnings())
                .map(|i| i.code)
                .collect(),
            other => panic!("Expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_overwrite_prevention() {
        let mut builder = Builder::new();
        builder.install_template(&transfer(), sms_template("en-US")).unwrap();
        let err = builder.install_template(&transfer(), sms_template("en-US")).unwrap_err();
        assert!(matches!(err, BarberError::TemplateOverwrite { version: 1, .. }));
        assert!(err.to_string().contains("DocumentTemplate{source=TransferDocumentData"));

        builder.install_template(&transfer(), sms_template("en-US").version(2)).unwrap();
        builder.install_template(&transfer(), sms_template("fr-FR")).unwrap();
    }

    #[test]
    fn test_shadow_prevention() {
        let mut builder = Builder::new();
        builder
            .install_document(DocumentSchema::new("SmsDocument").field(DocumentField::required("body")))
            .unwrap();
        let err = builder
            .install_document(DocumentSchema::new("PushDocument").field(DocumentField::required("body")))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("SmsDocument"));
        assert!(message.contains("PushDocument"));
        assert!(message.contains("'body'"));
    }

    #[test]
    fn test_data_schema_redefinition_rejected() {
        let mut builder = Builder::new();
        builder.install_data_schema(&transfer()).unwrap();
        builder.install_data_schema(&transfer()).unwrap();
        let changed = transfer().field("memo", TypeTag::String);
        assert!(builder.install_data_schema(&changed).is_err());
    }

    #[test]
    fn test_empty_builder_warns_and_strict_fails() {
        let shop = Builder::new().build().unwrap();
        assert_eq!(shop.warnings().len(), 2);

        let err = Builder::new().strict(true).build().unwrap_err();
        assert_eq!(codes(err), vec![DiagnosticCode::NoTemplates, DiagnosticCode::NoDocuments]);
    }

    #[test]
    fn test_wiring_errors_stop_before_compilation() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder
            .install_template(
                &transfer(),
                DocumentTemplate::new("OtherDocumentData", "en-US")
                    .target("SmsDocument")
                    .target("EmailDocument")
                    .field("sms_body", "{{nope}}"),
            )
            .unwrap();

        let found = codes(builder.build().unwrap_err());
        assert!(found.contains(&DiagnosticCode::SourceMismatch));
        assert!(found.contains(&DiagnosticCode::MissingTarget));
        // Compilation-stage checks never ran
        assert!(!found.contains(&DiagnosticCode::MissingVariable));
    }

    #[test]
    fn test_content_errors_are_aggregated() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder
            .install_document(
                DocumentSchema::new("EmailDocument")
                    .field(DocumentField::required("email_subject"))
                    .field(DocumentField::required("email_body")),
            )
            .unwrap();
        builder
            .install_template(
                &transfer(),
                DocumentTemplate::new("TransferDocumentData", "en-US")
                    .target("SmsDocument")
                    .target("EmailDocument")
                    .field("sms_body", "{{sender}} to {{recipient}}")
                    .field("email_body", "{{amount}}")
                    .field("push_title", "hi"),
            )
            .unwrap();

        let err = builder.build().unwrap_err();
        let report = err.to_string();
        let found = codes(err);
        assert!(found.contains(&DiagnosticCode::MissingVariable));
        assert!(found.contains(&DiagnosticCode::MissingRequiredField));
        assert!(found.contains(&DiagnosticCode::ExtraField));
        assert!(report.contains("EmailDocument requires 'email_subject'"));
        assert!(report.contains("push_title"));
    }

    #[test]
    fn test_unused_field_warning() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder
            .install_template(
                &transfer(),
                DocumentTemplate::new("TransferDocumentData", "en-US")
                    .target("SmsDocument")
                    .field("sms_body", "{{sender}} pinged you"),
            )
            .unwrap();
        let shop = builder.build().unwrap();
        assert_eq!(shop.warnings().len(), 1);
        assert_eq!(shop.warnings()[0].code, DiagnosticCode::UnusedDataField);
        assert!(shop.warnings()[0].message.contains("'amount'"));
    }

    #[test]
    fn test_dangling_data_schema() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder.install_template(&transfer(), sms_template("en-US")).unwrap();
        builder.install_data_schema(&DataSchema::new("RefundDocumentData")).unwrap();
        let found = codes(builder.build().unwrap_err());
        assert_eq!(found, vec![DiagnosticCode::DanglingDataSchema]);
    }

    #[test]
    fn test_token_collision() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder.install_template(&transfer(), sms_template("en-US")).unwrap();
        let twin = DataSchema::new("TransferData")
            .field("sender", TypeTag::String)
            .field("amount", TypeTag::String);
        builder
            .install_template(
                &twin,
                DocumentTemplate::new("TransferData", "en-US")
                    .target("SmsDocument")
                    .field("sms_body", "{{sender}} {{amount}}"),
            )
            .unwrap();
        let found = codes(builder.build().unwrap_err());
        assert!(found.contains(&DiagnosticCode::TokenCollision));
    }

    #[test]
    fn test_token_collision_across_different_targets() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder
            .install_document(DocumentSchema::new("EmailDocument").field(DocumentField::required("email_body")))
            .unwrap();
        builder.install_template(&transfer(), sms_template("en-US")).unwrap();
        let twin = DataSchema::new("TransferData")
            .field("sender", TypeTag::String)
            .field("amount", TypeTag::String);
        builder
            .install_template(
                &twin,
                DocumentTemplate::new("TransferData", "en-US")
                    .target("EmailDocument")
                    .field("email_body", "{{sender}} {{amount}}"),
            )
            .unwrap();

        match builder.build().unwrap_err() {
            BarberError::Validation(report) => {
                assert_eq!(report.errors().len(), 1);
                assert_eq!(report.errors()[0].code, DiagnosticCode::TokenCollision);
                assert!(report.errors()[0].message.contains("TransferData, TransferDocumentData"));
                assert!(report.errors()[0].message.contains("'transfer'"));
            }
            other => panic!("Expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_required_pairing_without_target() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder
            .install_document(DocumentSchema::new("EmailDocument").field(DocumentField::required("email_body")))
            .unwrap();
        builder.install_template(&transfer(), sms_template("en-US")).unwrap();
        builder.require_barber(&transfer(), "SmsDocument").unwrap();
        builder.require_barber(&transfer(), "EmailDocument").unwrap();

        match builder.build().unwrap_err() {
            BarberError::Validation(report) => {
                assert_eq!(report.errors().len(), 1);
                let error = &report.errors()[0];
                assert_eq!(error.code, DiagnosticCode::InvalidTarget);
                assert!(error.message.contains("document EmailDocument"));
                assert!(error.message.contains("Targeted documents: [SmsDocument]"));
            }
            other => panic!("Expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_satisfied_pairing_builds() {
        let mut builder = Builder::new();
        builder.install_document(sms()).unwrap();
        builder.require_barber(&transfer(), "SmsDocument").unwrap();
        builder.install_template(&transfer(), sms_template("en-US")).unwrap();
        let shop = builder.build().unwrap();
        assert!(shop.get_barber("transfer", "SmsDocument").is_ok());
    }

    #[test]
    fn test_reference_matching() {
        assert!(references("sender", "sender"));
        assert!(references("account", "account.id"));
        assert!(references("account.id.value", "account.id"));
        assert!(!references("acc", "account.id"));
        assert!(!references("account.idx", "account.id"));
    }
}
