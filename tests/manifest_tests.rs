//! Manifest and on-disk template loading tests

use std::fs;
use std::path::{Path, PathBuf};

use barbershop::config::VersionPolicy;
use barbershop::template::load_templates;
use barbershop::{BarberError, BarbershopConfig, DiagnosticCode, Locale, Manifest};
use serde_json::json;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn transfer_data() -> serde_json::Value {
    json!({
        "sender": "Sandy",
        "amount": "$50",
        "account": { "id": 7 }
    })
}

// =============================================================================
// Fixture manifest
// =============================================================================

#[test]
fn test_load_templates_in_path_order() {
    let templates = load_templates(fixture("transfer/templates")).unwrap();
    let described: Vec<(String, u64)> = templates
        .iter()
        .map(|t| (t.locale.to_string(), t.version))
        .collect();
    assert_eq!(
        described,
        vec![
            ("en-US".to_string(), 1),
            ("en-US".to_string(), 2),
            ("fr-FR".to_string(), 1),
        ]
    );
    let targets: Vec<_> = templates[0].targets.iter().map(String::as_str).collect();
    assert_eq!(targets, vec!["EmailDocument", "SmsDocument"]);
}

#[test]
fn test_fixture_templates_have_distinct_keys() {
    let templates = load_templates(fixture("transfer/templates")).unwrap();
    let keys: std::collections::BTreeSet<_> = templates
        .iter()
        .map(|t| (t.source.clone(), t.locale.clone(), t.version))
        .collect();
    assert_eq!(keys.len(), templates.len());
}

#[test]
fn test_fixture_manifest_builds_and_renders() {
    let manifest = Manifest::load(fixture("transfer/manifest.toml")).unwrap();
    let shop = manifest.builder(&BarbershopConfig::default()).unwrap().build().unwrap();
    assert!(shop.warnings().is_empty());
    assert_eq!(shop.all_barbers().len(), 2);

    let sms = shop.get_barber("transfer", "SmsDocument").unwrap();
    let latest = sms.render(&transfer_data(), &Locale::from("en-US"), None).unwrap();
    assert_eq!(latest.get("sms_body"), Some("Sandy sent $50 to account 7"));

    let french = sms.render(&transfer_data(), &Locale::from("fr-FR"), Some(1)).unwrap();
    assert_eq!(french.get("sms_body"), Some("Sandy vous a envoyé $50"));

    let email = shop.get_barber("transfer", "EmailDocument").unwrap();
    let rendered = email.render(&transfer_data(), &Locale::from("de-DE"), None).unwrap();
    assert_eq!(rendered.locale().as_str(), "en-US");
    assert_eq!(rendered.get("email_link"), Some("https://bank.example/accounts/7"));
    assert!(rendered.is_null("email_footer"));
}

#[test]
fn test_fixture_target_documents() {
    let manifest = Manifest::load(fixture("transfer/manifest.toml")).unwrap();
    let shop = manifest.builder(&BarbershopConfig::default()).unwrap().build().unwrap();

    let v1: Vec<_> = shop.get_target_documents("transfer", Some(1)).unwrap().into_iter().collect();
    assert_eq!(v1, vec!["EmailDocument", "SmsDocument"]);
    let newest: Vec<_> = shop.get_target_documents("transfer", None).unwrap().into_iter().collect();
    assert_eq!(newest, vec!["SmsDocument"]);

    assert!(shop.can_satisfy_legacy("transfer", "amount,0;sender,0").unwrap());
    assert!(!shop.can_satisfy_legacy("transfer", "amount,1").unwrap());
}

#[test]
fn test_config_policies_apply_to_manifest_builds() {
    let manifest = Manifest::load(fixture("transfer/manifest.toml")).unwrap();
    let mut config = BarbershopConfig::default();
    config.resolvers.version = VersionPolicy::SpecifiedThrowOrNewest;
    let shop = manifest.builder(&config).unwrap().build().unwrap();

    let email = shop.get_barber("transfer", "EmailDocument").unwrap();
    let err = email
        .render(&transfer_data(), &Locale::from("en-US"), Some(2))
        .unwrap_err();
    assert!(err.to_string().contains("compatibleOptions=[1]"));
}

// =============================================================================
// Ad-hoc manifests
// =============================================================================

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

const WELCOME_MANIFEST: &str = r#"
[[data]]
name = "WelcomeData"
fields = [{ name = "name", type = "string" }]

[[documents]]
name = "SmsDocument"
fields = [{ name = "sms_body" }]
"#;

#[test]
fn test_inline_templates_and_configured_dir() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "shared/welcome.json",
        r#"{"source": "WelcomeData", "targets": ["SmsDocument"], "locale": "en-US",
            "fields": {"sms_body": "Hi {{name}}"}}"#,
    );
    let manifest_path = write(
        dir.path(),
        "manifest.toml",
        &format!(
            "{}\n{}",
            WELCOME_MANIFEST,
            r#"
[[templates]]
source = "WelcomeData"
targets = ["SmsDocument"]
locale = "en-US"
version = 2
fields = { sms_body = "Welcome back {{name}}" }
"#
        ),
    );

    let mut config = BarbershopConfig::default();
    config.templates.dir = Some(dir.path().join("shared"));
    let manifest = Manifest::load(&manifest_path).unwrap();
    let shop = manifest.builder(&config).unwrap().build().unwrap();

    let barber = shop.get_barber("welcome", "SmsDocument").unwrap();
    assert_eq!(barber.compatible_versions().len(), 2);
    let rendered = barber
        .render(&json!({"name": "Ann"}), &Locale::from("en-US"), Some(1))
        .unwrap();
    assert_eq!(rendered.get("sms_body"), Some("Hi Ann"));
}

#[test]
fn test_manifest_with_broken_template_reports() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "templates/welcome.toml",
        r#"
source = "WelcomeData"
targets = ["SmsDocument"]
locale = "en-US"

[fields]
sms_body = "Hi {{nickname}}"
"#,
    );
    let manifest_path = write(
        dir.path(),
        "manifest.toml",
        &format!("templates_dir = \"templates\"\n{}", WELCOME_MANIFEST),
    );

    let manifest = Manifest::load(&manifest_path).unwrap();
    let err = manifest
        .builder(&BarbershopConfig::default())
        .unwrap()
        .build()
        .unwrap_err();
    match err {
        BarberError::Validation(report) => {
            assert_eq!(report.errors()[0].code, DiagnosticCode::MissingVariable);
            assert!(report.errors()[0].message.contains("nickname"));
        }
        other => panic!("Expected Validation, got {}", other),
    }
}

#[test]
fn test_duplicate_template_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let template = r#"{"source": "WelcomeData", "targets": ["SmsDocument"], "locale": "en-US",
        "fields": {"sms_body": "Hi {{name}}"}}"#;
    write(dir.path(), "templates/a.json", template);
    write(dir.path(), "templates/b.json", template);
    let manifest_path = write(
        dir.path(),
        "manifest.toml",
        &format!("templates_dir = \"templates\"\n{}", WELCOME_MANIFEST),
    );

    let manifest = Manifest::load(&manifest_path).unwrap();
    let err = manifest.builder(&BarbershopConfig::default()).unwrap_err();
    assert!(matches!(err, BarberError::TemplateOverwrite { .. }));
}

#[test]
fn test_declared_barber_without_template_target_fails() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = write(
        dir.path(),
        "manifest.toml",
        &format!(
            "{}\n{}",
            WELCOME_MANIFEST,
            r#"
[[documents]]
name = "PushDocument"
fields = [{ name = "push_title" }]

[[templates]]
source = "WelcomeData"
targets = ["SmsDocument"]
locale = "en-US"
fields = { sms_body = "Hi {{name}}" }

[[barbers]]
data = "WelcomeData"
document = "PushDocument"
"#
        ),
    );

    let manifest = Manifest::load(&manifest_path).unwrap();
    let err = manifest
        .builder(&BarbershopConfig::default())
        .unwrap()
        .build()
        .unwrap_err();
    match err {
        BarberError::Validation(report) => {
            let codes: Vec<_> = report.errors().iter().map(|e| e.code).collect();
            assert_eq!(codes, vec![DiagnosticCode::InvalidTarget]);
            assert!(report.errors()[0].message.contains("PushDocument"));
        }
        other => panic!("Expected Validation, got {}", other),
    }
}

#[test]
fn test_malformed_manifest_is_a_toml_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "manifest.toml", "[[data]\nname = ");
    assert!(matches!(Manifest::load(&path), Err(BarberError::Toml(_))));
}
