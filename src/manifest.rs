//! Declarative barbershop manifests
//!
//! A manifest describes data schemas, documents and templates on disk, so a
//! template set can be validated without compiling the application that owns
//! it.
//!
//! ```toml
//! templates_dir = "templates"
//!
//! [[data]]
//! name = "TransferDocumentData"
//! fields = [
//!     { name = "sender", type = "string" },
//!     { name = "amount", type = "string" },
//! ]
//!
//! [[documents]]
//! name = "SmsDocument"
//! fields = [{ name = "sms_body", encoding = "plaintext" }]
//!
//! # Pairings the application renders; the build fails if no template covers one
//! [[barbers]]
//! data = "TransferDocumentData"
//! document = "SmsDocument"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::Builder;
use crate::config::BarbershopConfig;
use crate::error::{BarberError, Result};
use crate::schema::{DataSchema, DocumentSchema, TypeTag};
use crate::template::{load_templates, DocumentTemplate};

const RECORD_TYPE: &str = "record";

/// One field of a declared data schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestField {
    pub name: String,
    /// `string`, `long`, `duration`, `instant` or `record`
    #[serde(rename = "type")]
    pub type_name: String,
    /// Children of a `record` field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ManifestField>,
}

/// A declared data schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestData {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<ManifestField>,
}

impl ManifestData {
    /// Unknown type names are kept so the reflector rejects them by name
    pub fn to_schema(&self) -> DataSchema {
        to_schema(&self.name, &self.fields)
    }
}

fn to_schema(name: &str, fields: &[ManifestField]) -> DataSchema {
    fields.iter().fold(DataSchema::new(name), |schema, field| {
        if field.type_name.eq_ignore_ascii_case(RECORD_TYPE) {
            let child = to_schema(&format!("{}.{}", name, field.name), &field.fields);
            schema.nested(&field.name, child)
        } else if let Some(tag) = TypeTag::from_name(&field.type_name) {
            schema.field(&field.name, tag)
        } else {
            schema.unsupported(&field.name, &field.type_name)
        }
    })
}

/// A (data schema, document) pairing the application expects to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestBarber {
    pub data: String,
    pub document: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Template directory, relative to the manifest file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,

    #[serde(default)]
    pub data: Vec<ManifestData>,

    #[serde(default)]
    pub documents: Vec<DocumentSchema>,

    /// Templates declared inline, installed after those loaded from disk
    #[serde(default)]
    pub templates: Vec<DocumentTemplate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub barbers: Vec<ManifestBarber>,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Manifest {
    /// Parse a manifest from TOML or JSON, chosen by file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut manifest: Manifest = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        manifest.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(
            path = %path.display(),
            data = manifest.data.len(),
            documents = manifest.documents.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    /// Template directory to load, resolved against the manifest location.
    /// Falls back to the configured directory when the manifest names none.
    pub fn resolved_templates_dir(&self, config: &BarbershopConfig) -> Option<PathBuf> {
        match &self.templates_dir {
            Some(dir) if dir.is_relative() => Some(
                self.base_dir
                    .as_deref()
                    .map(|base| base.join(dir))
                    .unwrap_or_else(|| dir.clone()),
            ),
            Some(dir) => Some(dir.clone()),
            None => config.templates.dir.clone(),
        }
    }

    /// Install everything the manifest declares into a fresh builder
    pub fn builder(&self, config: &BarbershopConfig) -> Result<Builder> {
        let mut builder = Builder::from_config(config);

        for document in &self.documents {
            builder.install_document(document.clone())?;
        }

        let schemas: BTreeMap<&str, DataSchema> = self
            .data
            .iter()
            .map(|data| (data.name.as_str(), data.to_schema()))
            .collect();
        for schema in schemas.values() {
            builder.install_data_schema(schema)?;
        }

        let mut templates = match self.resolved_templates_dir(config) {
            Some(dir) => load_templates(dir)?,
            None => Vec::new(),
        };
        templates.extend(self.templates.iter().cloned());

        for template in templates {
            let schema = schemas.get(template.source.as_str()).ok_or_else(|| {
                BarberError::Config(format!(
                    "Template {} reads from data schema {}, which the manifest does not declare",
                    template, template.source
                ))
            })?;
            builder.install_template(schema, template)?;
        }

        for barber in &self.barbers {
            let schema = schemas.get(barber.data.as_str()).ok_or_else(|| {
                BarberError::Config(format!(
                    "Barber {} → {} reads from data schema {}, which the manifest does not declare",
                    barber.data, barber.document, barber.data
                ))
            })?;
            builder.require_barber(schema, barber.document.clone())?;
        }
        Ok(builder)
    }
}
