//! Barbers: render-ready units
//!
//! A [`Barber`] renders one document from one data schema across every
//! installed locale and version. It is frozen at build time, so `render` only
//! reads shared state and may be called from many threads at once.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::execute_cell;
use crate::error::{BarberError, Result};
use crate::locale::{resolve_entry, Locale, LocaleResolver};
use crate::schema::{wire_context, Document, DocumentData, DocumentSchema, WireField};
use crate::template::{CompiledDocumentTemplate, TemplateToken};
use crate::version::{as_ranges, resolve_version, supports, VersionRange, VersionResolver};

/// Compiled templates of one barber: version → locale → template
type VersionTable = BTreeMap<u64, BTreeMap<Locale, Arc<CompiledDocumentTemplate>>>;

/// Rendered field values of one document, before typed construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    document: String,
    locale: Locale,
    version: u64,
    /// `None` is a null field, distinct from an empty string
    fields: BTreeMap<String, Option<String>>,
}

impl RenderedDocument {
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Locale of the template that was used
    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Version of the template that was used
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fields(&self) -> &BTreeMap<String, Option<String>> {
        &self.fields
    }

    /// Rendered value of a field; `None` when null or absent
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }

    pub fn is_null(&self, field: &str) -> bool {
        matches!(self.fields.get(field), Some(None) | None)
    }

    /// Move a value out, leaving null behind
    pub fn take(&mut self, field: &str) -> Option<String> {
        self.fields.get_mut(field).and_then(Option::take)
    }

    /// Move a value out, failing if it is null or absent
    pub fn require(&mut self, field: &str) -> Result<String> {
        let document = self.document.clone();
        self.take(field).ok_or_else(|| {
            BarberError::Render(format!("field '{}' of {} rendered as null", field, document))
        })
    }
}

/// Staging form of a barber, filled in while the builder materializes
#[derive(Debug)]
pub(crate) struct BarberParts {
    token: TemplateToken,
    data_schema: String,
    document: DocumentSchema,
    templates: VersionTable,
}

impl BarberParts {
    pub(crate) fn new(token: TemplateToken, data_schema: &str, document: DocumentSchema) -> Self {
        Self {
            token,
            data_schema: data_schema.to_string(),
            document,
            templates: BTreeMap::new(),
        }
    }

    pub(crate) fn add(&mut self, version: u64, locale: Locale, template: Arc<CompiledDocumentTemplate>) {
        self.templates.entry(version).or_default().insert(locale, template);
    }

    pub(crate) fn into_barber(
        self,
        version_resolver: Arc<dyn VersionResolver>,
        locale_resolver: Arc<dyn LocaleResolver>,
    ) -> Barber {
        let versions: BTreeSet<u64> = self.templates.keys().copied().collect();
        let ranges = as_ranges(&versions);
        Barber {
            token: self.token,
            data_schema: self.data_schema,
            document: self.document,
            templates: self.templates,
            versions,
            ranges,
            version_resolver,
            locale_resolver,
        }
    }
}

/// Renders one document for one template family
#[derive(Debug)]
pub struct Barber {
    token: TemplateToken,
    data_schema: String,
    document: DocumentSchema,
    templates: VersionTable,
    /// Versions at which this document is a target of the family
    versions: BTreeSet<u64>,
    ranges: BTreeSet<VersionRange>,
    version_resolver: Arc<dyn VersionResolver>,
    locale_resolver: Arc<dyn LocaleResolver>,
}

impl Barber {
    pub fn token(&self) -> &TemplateToken {
        &self.token
    }

    pub fn data_schema(&self) -> &str {
        &self.data_schema
    }

    pub fn document(&self) -> &DocumentSchema {
        &self.document
    }

    /// Versions a render may resolve to
    pub fn compatible_versions(&self) -> &BTreeSet<u64> {
        &self.versions
    }

    pub fn version_ranges(&self) -> &BTreeSet<VersionRange> {
        &self.ranges
    }

    pub fn supports(&self, version: u64) -> bool {
        supports(&self.ranges, version)
    }

    /// Every locale installed at any compatible version
    pub fn locales(&self) -> BTreeSet<&Locale> {
        self.templates.values().flat_map(|by_locale| by_locale.keys()).collect()
    }

    /// Resolve the compiled template a request would use
    pub fn resolve(&self, locale: &Locale, version: Option<u64>) -> Result<&CompiledDocumentTemplate> {
        let token = self.token.as_str();
        let resolved = resolve_version(self.version_resolver.as_ref(), version, &self.versions, token)?;
        let by_locale = self
            .templates
            .get(&resolved)
            .ok_or_else(|| BarberError::NoCompatibleVersions {
                token: token.to_string(),
            })?;
        let (resolved_locale, template) =
            resolve_entry(self.locale_resolver.as_ref(), locale, by_locale, token)?;

        tracing::trace!(
            token,
            document = %self.document.name,
            requested_locale = %locale,
            resolved_locale = %resolved_locale,
            requested_version = ?version,
            resolved_version = resolved,
            "resolved template"
        );
        Ok(template)
    }

    /// Render the document's fields from `data`
    pub fn render<T: Serialize>(
        &self,
        data: &T,
        locale: &Locale,
        version: Option<u64>,
    ) -> Result<RenderedDocument> {
        let template = self.resolve(locale, version)?;
        let mut fields = BTreeMap::new();
        for (field, cell) in template.cells_for(&self.document.name) {
            fields.insert(field.to_string(), execute_cell(cell, data)?);
        }
        Ok(RenderedDocument {
            document: self.document.name.clone(),
            locale: template.locale().clone(),
            version: template.version(),
            fields,
        })
    }

    /// Render from a record supplied in wire form
    pub fn render_wire(
        &self,
        fields: &[WireField],
        locale: &Locale,
        version: Option<u64>,
    ) -> Result<RenderedDocument> {
        self.render(&wire_context(fields), locale, version)
    }

    /// Render and construct a typed document
    pub fn render_as<O: Document, T: Serialize>(
        &self,
        data: &T,
        locale: &Locale,
        version: Option<u64>,
    ) -> Result<O> {
        let requested = O::schema().name;
        if requested != self.document.name {
            return Err(BarberError::MismatchedDocument {
                document: self.document.name.clone(),
                requested,
            });
        }
        O::from_rendered(self.render(data, locale, version)?)
    }
}

/// A barber bound to its data and document types
pub struct TypedBarber<'a, D, O> {
    barber: &'a Barber,
    _types: PhantomData<fn(&D) -> O>,
}

impl<'a, D: DocumentData, O: Document> TypedBarber<'a, D, O> {
    pub(crate) fn new(barber: &'a Barber) -> Self {
        Self {
            barber,
            _types: PhantomData,
        }
    }

    pub fn barber(&self) -> &'a Barber {
        self.barber
    }

    pub fn render(&self, data: &D, locale: &Locale, version: Option<u64>) -> Result<O> {
        O::from_rendered(self.barber.render(data, locale, version)?)
    }
}
