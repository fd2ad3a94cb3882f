//! Barbershop Lint CLI
//!
//! Loads a manifest, runs the full build pipeline and prints the report.

use std::path::PathBuf;

use anyhow::Context;
use barbershop::{BarberError, BarbershopConfig, Manifest};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barber-lint")]
#[command(about = "Validate a barbershop manifest and its templates")]
struct Cli {
    /// Path to the manifest (TOML or JSON)
    manifest: PathBuf,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Treat warnings as errors
    #[arg(long)]
    strict: bool,

    /// Print the barber table after a successful build
    #[arg(short, long)]
    list: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = BarbershopConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    if cli.strict {
        config.build.strict = true;
    }

    let manifest = Manifest::load(&cli.manifest)
        .with_context(|| format!("failed to load manifest {}", cli.manifest.display()))?;

    println!("🔍 Linting {}...", cli.manifest.display());
    let builder = manifest.builder(&config)?;

    let shop = match builder.build() {
        Ok(shop) => shop,
        Err(BarberError::Validation(diagnostics)) => {
            println!("❌ Build failed");
            println!();
            println!("{}", diagnostics);
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    println!("✅ Build succeeded ({} barbers)", shop.all_barbers().len());
    if !shop.warnings().is_empty() {
        println!();
        println!("⚠️  {} warnings:", shop.warnings().len());
        for (i, warning) in shop.warnings().iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, warning.code, warning.message);
        }
    }

    if cli.list {
        println!();
        println!("📋 Barbers:");
        for (key, barber) in shop.all_barbers() {
            let locales: Vec<String> = barber.locales().iter().map(|l| l.to_string()).collect();
            let ranges: Vec<String> = barber.version_ranges().iter().map(|r| r.to_string()).collect();
            println!("  {}", key);
            println!("     locales:  {}", locales.join(", "));
            println!("     versions: {}", ranges.join(", "));
        }
    }

    Ok(true)
}
