//! Document templates
//!
//! A [`DocumentTemplate`] is the passive, serializable description of one
//! locale and version of a template family. Compiling it against the installed
//! documents yields a [`CompiledDocumentTemplate`]: a matrix of compiled field
//! templates keyed by (field, document), since each document may encode a
//! field of the same name differently.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::compiler::{CompiledTemplate, FieldEncoding};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::error::{BarberError, Result};
use crate::locale::Locale;
use crate::schema::DocumentSchema;

/// Conventional suffixes stripped from data schema names
const TOKEN_SUFFIXES: &[&str] = &["DocumentData", "Data"];

/// Stable key of a template family, derived from its data schema name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateToken(String);

impl TemplateToken {
    /// `TransferDocumentData` becomes `transfer`
    pub fn from_schema_name(name: &str) -> Self {
        let stem = TOKEN_SUFFIXES
            .iter()
            .find_map(|suffix| name.strip_suffix(suffix).filter(|s| !s.is_empty()))
            .unwrap_or(name);

        let mut chars = stem.chars();
        let token = match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        };
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TemplateToken {
    /// Wraps an already-derived token verbatim
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

fn default_version() -> u64 {
    1
}

/// One locale and version of a template family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTemplate {
    /// Document field name → raw template text
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Name of the data schema the template reads from
    pub source: String,
    /// Names of the documents the template renders
    #[serde(default)]
    pub targets: BTreeSet<String>,
    pub locale: Locale,
    #[serde(default = "default_version")]
    pub version: u64,
}

impl DocumentTemplate {
    pub fn new(source: impl Into<String>, locale: impl Into<Locale>) -> Self {
        Self {
            fields: BTreeMap::new(),
            source: source.into(),
            targets: BTreeSet::new(),
            locale: locale.into(),
            version: default_version(),
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn target(mut self, document: impl Into<String>) -> Self {
        self.targets.insert(document.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.insert(name.into(), text.into());
        self
    }

    /// Parse a template from JSON or TOML, chosen by file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Ok(serde_json::from_str(&content)?),
        }
    }
}

impl fmt::Display for DocumentTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<&str> = self.targets.iter().map(String::as_str).collect();
        write!(
            f,
            "DocumentTemplate{{source={}, locale={}, version={}, targets=[{}], fields={{",
            self.source,
            self.locale,
            self.version,
            targets.join(", ")
        )?;
        for (i, (name, text)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", name, text)?;
        }
        write!(f, "}}}}")
    }
}

/// Load every `*.json` and `*.toml` template under `dir`, in path order
pub fn load_templates(dir: impl AsRef<Path>) -> Result<Vec<DocumentTemplate>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir.as_ref()).sort_by_file_name() {
        let entry = entry.map_err(|e| BarberError::Io(e.into()))?;
        let path = entry.path();
        let is_template = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("toml")
        );
        if entry.file_type().is_file() && is_template {
            paths.push(path.to_path_buf());
        }
    }

    paths
        .iter()
        .map(|path| {
            tracing::debug!(path = %path.display(), "loading document template");
            DocumentTemplate::load(path)
        })
        .collect()
}

// =============================================================================
// Compiled form
// =============================================================================

/// Key of one cell in the compiled matrix: (field name, document name)
pub type CellKey = (String, String);

/// Immutable, compiled form of a [`DocumentTemplate`]
#[derive(Debug, Clone)]
pub struct CompiledDocumentTemplate {
    /// `None` marks a nullable field without template text; it renders as null
    fields: BTreeMap<CellKey, Option<CompiledTemplate>>,
    source: String,
    targets: BTreeSet<String>,
    locale: Locale,
    version: u64,
}

impl CompiledDocumentTemplate {
    /// Compile every field of `template` for each of its installed targets.
    ///
    /// Compile failures are recorded in `diagnostics`; `None` is returned if
    /// any field failed. Targets missing from `documents`, required fields
    /// without text and extra fields are left for the builder to report.
    pub fn compile(
        template: &DocumentTemplate,
        documents: &BTreeMap<String, DocumentSchema>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Self> {
        let mut fields = BTreeMap::new();
        let mut failed = false;
        // Templates compiled once per distinct (text, encoding)
        let mut cache: BTreeMap<(&str, FieldEncoding), CompiledTemplate> = BTreeMap::new();

        for target in &template.targets {
            let Some(document) = documents.get(target) else {
                continue;
            };
            for field in &document.fields {
                let key = (field.name.clone(), document.name.clone());
                let Some(text) = template.fields.get(&field.name) else {
                    if field.nullable {
                        fields.insert(key, None);
                    }
                    continue;
                };

                if let Some(compiled) = cache.get(&(text.as_str(), field.encoding)) {
                    fields.insert(key, Some(compiled.clone()));
                    continue;
                }
                match CompiledTemplate::compile(&field.name, text, field.encoding) {
                    Ok(compiled) => {
                        cache.insert((text.as_str(), field.encoding), compiled.clone());
                        fields.insert(key, Some(compiled));
                    }
                    Err(e) => {
                        failed = true;
                        diagnostics.push(
                            DiagnosticCode::CompileFailure,
                            format!(
                                "Template {} (locale {}, version {}) failed to compile for document {}: {}",
                                template.source, template.locale, template.version, document.name, e
                            ),
                        );
                    }
                }
            }
        }

        if failed {
            return None;
        }
        Some(Self {
            fields,
            source: template.source.clone(),
            targets: template.targets.clone(),
            locale: template.locale.clone(),
            version: template.version,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, field: &str, document: &str) -> Option<Option<&CompiledTemplate>> {
        self.fields
            .get(&(field.to_string(), document.to_string()))
            .map(Option::as_ref)
    }

    /// Every (field, document, cell) of the matrix
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, Option<&CompiledTemplate>)> {
        self.fields
            .iter()
            .map(|((field, document), cell)| (field.as_str(), document.as_str(), cell.as_ref()))
    }

    /// Cells belonging to one document
    pub fn cells_for<'a>(
        &'a self,
        document: &'a str,
    ) -> impl Iterator<Item = (&'a str, Option<&'a CompiledTemplate>)> + 'a {
        self.cells()
            .filter(move |(_, doc, _)| *doc == document)
            .map(|(field, _, cell)| (field, cell))
    }

    /// Union of variables referenced by every compiled cell
    pub fn variable_references(&self) -> BTreeSet<&str> {
        self.fields
            .values()
            .flatten()
            .flat_map(|t| t.variable_references().iter().map(String::as_str))
            .collect()
    }
}
