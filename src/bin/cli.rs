//! Mask Propagator - calibrate once, segment a whole folder
//!
//! This is the batch entry point.
//! Run with: cargo run --bin mask-propagator -- <reference-image> <output-dir>

use mask_propagator::app::{self, RunOptions, TargetMode};
use mask_propagator::AppSettings;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    app::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match RunOptions::parse(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{}", app::usage("mask-propagator", TargetMode::Folder));
            return Ok(());
        }
        Err(e) => {
            eprintln!("❌ {}\n", e);
            eprintln!("{}", app::usage("mask-propagator", TargetMode::Folder));
            std::process::exit(2);
        }
    };

    let settings = AppSettings::load().with_env_overrides();
    if options.save_settings {
        match settings.save() {
            Ok(()) => println!("Settings saved"),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    println!("🎭 Mask Propagator");
    println!("==================");
    println!("Service: {}", settings.base_url);
    println!("Model: {}", settings.model_type);
    println!("Output: {}", options.output_dir.display());
    println!();

    if let Err(e) = app::run_with_service(&options, &settings, TargetMode::Folder).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
