//! Mask Propagator - single image mode
//!
//! Calibrate on one image and write only its mask.
//! Run with: cargo run --bin mask-single -- <image> <output-dir>

use mask_propagator::app::{self, RunOptions, TargetMode};
use mask_propagator::AppSettings;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    app::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match RunOptions::parse(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{}", app::usage("mask-single", TargetMode::ReferenceOnly));
            return Ok(());
        }
        Err(e) => {
            eprintln!("❌ {}\n", e);
            eprintln!("{}", app::usage("mask-single", TargetMode::ReferenceOnly));
            std::process::exit(2);
        }
    };

    let settings = AppSettings::load().with_env_overrides();
    if options.save_settings {
        if let Err(e) = settings.save() {
            tracing::warn!("{}", e);
        }
    }

    println!("🎭 Mask Propagator (single image)");
    println!("Service: {}", settings.base_url);
    println!();

    if let Err(e) = app::run_with_service(&options, &settings, TargetMode::ReferenceOnly).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
