//! Schema descriptions and reflection
//!
//! Data schemas (template inputs) and document schemas (rendered outputs) are
//! described explicitly, once per type, instead of being discovered through
//! runtime introspection. The reflector flattens a data schema, or a record
//! supplied in wire form, into a [`Signature`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::barber::RenderedDocument;
use crate::compiler::FieldEncoding;
use crate::error::{BarberError, Result};
use crate::signature::Signature;
use crate::template::TemplateToken;

/// Primitive type of a data field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeTag {
    String,
    Long,
    Duration,
    Instant,
}

impl TypeTag {
    /// Stable ordinal used in signature encodings
    pub fn ordinal(&self) -> u8 {
        match self {
            TypeTag::String => 0,
            TypeTag::Long => 1,
            TypeTag::Duration => 2,
            TypeTag::Instant => 3,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(TypeTag::String),
            1 => Some(TypeTag::Long),
            2 => Some(TypeTag::Duration),
            3 => Some(TypeTag::Instant),
            _ => None,
        }
    }

    /// Parse a lowercase type name as written in manifests
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Some(TypeTag::String),
            "long" => Some(TypeTag::Long),
            "duration" => Some(TypeTag::Duration),
            "instant" => Some(TypeTag::Instant),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::String => "STRING",
            TypeTag::Long => "LONG",
            TypeTag::Duration => "DURATION",
            TypeTag::Instant => "INSTANT",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Data schemas (template inputs)
// =============================================================================

/// Declared type of a data field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Primitive(TypeTag),
    /// A nested record; its fields are flattened with `.`-joined paths
    Nested(DataSchema),
    /// A type the reflector cannot describe (kept so reflection can name it)
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    pub name: String,
    pub kind: FieldKind,
}

/// Description of a typed input record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSchema {
    /// Type name, the schema's identity (e.g. "TransferDocumentData")
    pub name: String,
    pub fields: Vec<DataField>,
}

impl DataSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a primitive field
    pub fn field(mut self, name: impl Into<String>, type_tag: TypeTag) -> Self {
        self.fields.push(DataField {
            name: name.into(),
            kind: FieldKind::Primitive(type_tag),
        });
        self
    }

    /// Add a nested record field
    pub fn nested(mut self, name: impl Into<String>, schema: DataSchema) -> Self {
        self.fields.push(DataField {
            name: name.into(),
            kind: FieldKind::Nested(schema),
        });
        self
    }

    /// Add a field of a type templates cannot consume
    pub fn unsupported(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.push(DataField {
            name: name.into(),
            kind: FieldKind::Unsupported(type_name.into()),
        });
        self
    }

    /// Template family key derived from the schema name
    pub fn template_token(&self) -> TemplateToken {
        TemplateToken::from_schema_name(&self.name)
    }

    /// Reflect this schema into a flat signature
    pub fn signature(&self) -> Result<Signature> {
        let mut signature = Signature::new();
        self.reflect_into("", &mut signature)?;
        Ok(signature)
    }

    fn reflect_into(&self, prefix: &str, signature: &mut Signature) -> Result<()> {
        for field in &self.fields {
            let path = format!("{}{}", prefix, field.name);
            match &field.kind {
                FieldKind::Primitive(tag) => signature.insert(path, *tag),
                FieldKind::Nested(child) => child.reflect_into(&format!("{}.", path), signature)?,
                FieldKind::Unsupported(type_name) => {
                    return Err(BarberError::Config(format!(
                        "Field '{}' of {} has type {}, which cannot be used as a template variable. \
                         Supported types are STRING, LONG, DURATION, INSTANT and nested records",
                        path, self.name, type_name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A typed record that supplies template variables
pub trait DocumentData: Serialize {
    fn schema() -> DataSchema;

    /// Reflect an instance; equivalent to reflecting its type
    fn signature(&self) -> Result<Signature> {
        Self::schema().signature()
    }
}

// =============================================================================
// Document schemas (rendered outputs)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentField {
    pub name: String,
    /// Nullable fields may be omitted by templates and then render as null
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub encoding: FieldEncoding,
}

impl DocumentField {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            encoding: FieldEncoding::default(),
        }
    }

    pub fn nullable(name: impl Into<String>) -> Self {
        Self {
            nullable: true,
            ..Self::required(name)
        }
    }

    pub fn encoding(mut self, encoding: FieldEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Description of a typed output record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSchema {
    pub name: String,
    pub fields: Vec<DocumentField>,
}

impl DocumentSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: DocumentField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DocumentField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> BTreeSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &DocumentField> {
        self.fields.iter().filter(|f| !f.nullable)
    }

    /// Structural checks performed when the document is installed
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(BarberError::Config(format!(
                "Document {} declares no fields; there is nothing to render",
                self.name
            )));
        }
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(BarberError::Config(format!(
                    "Document {} declares field '{}' more than once",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// A typed output record, constructed from rendered field values
pub trait Document: Sized {
    fn schema() -> DocumentSchema;

    /// Build the record from rendered values; absent fields are `None`
    fn from_rendered(rendered: RenderedDocument) -> Result<Self>;
}

// =============================================================================
// Wire form
// =============================================================================

/// A typed value as it arrives from a transport layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    String(String),
    Long(i64),
    Duration(std::time::Duration),
    Instant(DateTime<Utc>),
    Record(Vec<WireField>),
}

/// One (key, typed value) pair of a wire record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireField {
    pub key: String,
    pub value: WireValue,
}

impl WireField {
    pub fn new(key: impl Into<String>, value: WireValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, WireValue::String(value.into()))
    }
}

impl WireValue {
    fn to_context(&self) -> Value {
        match self {
            WireValue::String(s) => Value::String(s.clone()),
            WireValue::Long(n) => Value::from(*n),
            WireValue::Duration(d) => match chrono::Duration::from_std(*d) {
                Ok(delta) => Value::String(delta.to_string()),
                Err(_) => Value::String(format!("{}s", d.as_secs())),
            },
            WireValue::Instant(at) => Value::String(at.to_rfc3339()),
            WireValue::Record(fields) => wire_context(fields),
        }
    }
}

/// Reflect a wire record into a signature
pub fn wire_signature(fields: &[WireField]) -> Signature {
    let mut signature = Signature::new();
    reflect_wire("", fields, &mut signature);
    signature
}

fn reflect_wire(prefix: &str, fields: &[WireField], signature: &mut Signature) {
    for field in fields {
        let path = format!("{}{}", prefix, field.key);
        match &field.value {
            WireValue::String(_) => signature.insert(path, TypeTag::String),
            WireValue::Long(_) => signature.insert(path, TypeTag::Long),
            WireValue::Duration(_) => signature.insert(path, TypeTag::Duration),
            WireValue::Instant(_) => signature.insert(path, TypeTag::Instant),
            WireValue::Record(children) => reflect_wire(&format!("{}.", path), children, signature),
        }
    }
}

/// Convert a wire record into the JSON context templates execute against
pub fn wire_context(fields: &[WireField]) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|f| (f.key.clone(), f.value.to_context()))
        .collect();
    Value::Object(map)
}
