//! Barbershop
//!
//! A template binding and validation engine. Templates written against a typed
//! data record are compiled into typed output documents, across many locales
//! and versions.
//!
//! ## Features
//!
//! - **Build-time Validation**: Every template is checked against its data
//!   schema and target documents before anything can render
//! - **Aggregated Reports**: All configuration problems are reported together
//! - **Locale and Version Fallback**: Pluggable resolvers pick the template to use
//! - **Field Encodings**: HTML-escaped, plaintext and URL-normalized fields
//! - **Legacy Signatures**: Persisted input signatures can be checked against
//!   the installed schema
//!
//! ## Architecture
//!
//! ```text
//! DataSchema ──┐
//! DocumentTemplate ──► Builder ──build()──► Barbershop ──► Barber ──render()──► Document
//! DocumentSchema ──┘      │
//!                         └── Diagnostics (errors + warnings)
//! ```

pub mod barber;
pub mod barbershop;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod locale;
pub mod manifest;
pub mod schema;
pub mod signature;
pub mod template;
pub mod version;

pub use barber::{Barber, RenderedDocument, TypedBarber};
pub use barbershop::{BarberKey, Barbershop};
pub use builder::Builder;
pub use compiler::{CompiledTemplate, FieldEncoding};
pub use config::BarbershopConfig;
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Severity};
pub use error::{BarberError, Result};
pub use locale::{Locale, LocaleResolver, MatchOrFirst};
pub use manifest::Manifest;
pub use schema::{
    DataSchema, Document, DocumentData, DocumentField, DocumentSchema, TypeTag, WireField, WireValue,
};
pub use signature::Signature;
pub use template::{CompiledDocumentTemplate, DocumentTemplate, TemplateToken};
pub use version::{SpecifiedOrNewest, SpecifiedThrowOrNewest, VersionRange, VersionResolver};
