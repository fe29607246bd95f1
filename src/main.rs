// src/main.rs

use anyhow::Result;
use filekeeper::{FileRegistry, KeeperConfig, KeeperError, Keeper, RecordId, SharedRegistry, SortField};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <archive-name> <destination-dir> <path>...", args[0]);
        eprintln!("       (use \"\" as archive name for the default, \"-\" as directory for the configured one)");
        return Ok(());
    }

    let archive_name = args[1].clone();
    let config = KeeperConfig::from_env();
    let destination = match args[2].as_str() {
        "-" => config.archive_dir.clone(),
        dir => PathBuf::from(dir),
    };

    // ========== INITIALIZE REGISTRY ==========
    let registry: SharedRegistry = Arc::new(FileRegistry::new());
    let keeper = Keeper::new(Arc::clone(&registry), config)?;
    tracing::info!("✓ Registry initialized");

    // ========== REGISTER FILES ==========
    for raw in &args[3..] {
        let path = PathBuf::from(raw);
        if path.is_dir() {
            for (file, outcome) in keeper.add_directory(&path) {
                report_registration(&file, outcome);
            }
        } else {
            let outcome = keeper.add_file(&path);
            report_registration(&path, outcome);
        }
    }

    let count = registry.len()?;
    tracing::info!("✓ {} file(s) registered", count);
    if count == 0 {
        tracing::warn!("Nothing to do.");
        return Ok(());
    }

    for record in keeper.sorted_records(SortField::Name, true)? {
        println!("{:>6}  {:>12}  {}", record.id, record.size_bytes, record.name);
    }

    // ========== HASH ==========
    let hashing = keeper.compute_hashes()?;
    let report = hashing
        .finish(|p| tracing::info!("Hashing {:>5.1}%", p.fraction() * 100.0))
        .await?;
    for failure in &report.failed {
        tracing::warn!("Could not hash {}: {}", failure.path.display(), failure.reason);
    }

    for record in keeper.all_records()? {
        println!("{}", serde_json::to_string(&record)?);
    }

    // ========== ARCHIVE ==========
    let archiving = keeper.create_archive(&archive_name, &destination)?;
    let report = archiving
        .finish(|p| tracing::info!("Archiving {:>5.1}%", p.fraction() * 100.0))
        .await
        .map_err(|e| {
            tracing::error!("Archive failed: {}", e);
            e
        })?;
    tracing::info!("✓ Archive written: {} ({} entries, {} bytes)",
        report.path.display(), report.entries, report.bytes_out);

    Ok(())
}

fn report_registration(path: &std::path::Path, outcome: filekeeper::Result<RecordId>) {
    match outcome {
        Ok(id) => tracing::debug!("Registered {} as {}", path.display(), id),
        Err(KeeperError::Duplicate(p)) => tracing::info!("Skipping duplicate {}", p.display()),
        Err(e) => tracing::warn!("Cannot add {}: {}", path.display(), e),
    }
}
