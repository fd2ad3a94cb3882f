//! Error types for the barbershop

use std::collections::BTreeSet;

use thiserror::Error;

use crate::diagnostics::Diagnostics;

/// Result type for barbershop operations
pub type Result<T> = std::result::Result<T, BarberError>;

/// Barbershop errors
#[derive(Error, Debug)]
pub enum BarberError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Template for {source_schema} (locale {locale}, version {version}) is already installed. \
         Refusing to overwrite existing template: {existing}"
    )]
    TemplateOverwrite {
        source_schema: String,
        locale: String,
        version: u64,
        existing: String,
    },

    #[error(
        "Document {new_schema} declares field '{field}' which is already declared by document {existing_schema}. \
         Document field names must be unique across all installed documents"
    )]
    FieldShadow {
        field: String,
        existing_schema: String,
        new_schema: String,
    },

    #[error("{0}")]
    Validation(Diagnostics),

    #[error("Failed to compile template for field '{field}': {message}\nTemplate: {text}")]
    Compile {
        field: String,
        text: String,
        message: String,
    },

    #[error("Failed to render template: {0}")]
    Render(String),

    #[error("Rendered value '{value}' is not a valid URL: {reason}")]
    InvalidUrl { value: String, reason: String },

    #[error("No compatible versions for template token '{token}'")]
    NoCompatibleVersions { token: String },

    #[error(
        "Incompatible version [{requested}] requested for template token '{token}', compatibleOptions={}",
        format_versions(.compatible)
    )]
    IncompatibleVersion {
        requested: u64,
        token: String,
        compatible: BTreeSet<u64>,
    },

    #[error("No locales available to resolve {requested} for template token '{token}'")]
    EmptyLocaleOptions { requested: String, token: String },

    #[error(
        "Resolver {resolver} violated its contract: requested {requested} for template token '{token}' \
         but resolved to {resolved}, which is not one of the available options"
    )]
    ResolverContract {
        resolver: String,
        token: String,
        requested: String,
        resolved: String,
    },

    #[error("Document {document} is not installed")]
    DocumentNotInstalled { document: String },

    #[error("No templates installed for template token '{token}'{}", format_suggestions(.suggestions))]
    TemplateNotInstalled {
        token: String,
        suggestions: Vec<String>,
    },

    #[error(
        "Templates for '{token}' are installed and document {document} is installed, \
         but no template for '{token}' targets {document}"
    )]
    TargetMismatch { token: String, document: String },

    #[error("Barber for {document} cannot construct {requested}")]
    MismatchedDocument { document: String, requested: String },

    #[error("Malformed signature: {0}")]
    Signature(String),

    #[error("Invalid version range: min {min} is greater than max {max}")]
    InvalidVersionRange { min: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn format_versions(versions: &BTreeSet<u64>) -> String {
    let items: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(","))
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}
