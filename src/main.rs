//! plate-sync: read a license plate from a vehicle photo, keep a local repair
//! record, and replicate the record's photos into a Google Drive folder named
//! after the plate.
//!
//! Recognition goes to the Gemini `generateContent` API with a short linear
//! backoff. Drive access needs two clients to bootstrap before the first sync;
//! every sync then asks the user to pick an account and uploads photos one by
//! one through multipart requests.

#![warn(clippy::all)]

mod cli;
mod config;
mod drive;
#[cfg(test)]
mod mock_http;
mod ocr;
mod payload;
pub mod retry;
mod store;
mod types;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use cli::{Command, SaveArgs};
use config::Config;
use drive::{CloudSession, DriveClient, Endpoints, InstalledAppFlow, SyncEngine, SyncError};
use ocr::{RecognitionClient, RecognitionResult};
use store::{RecordStore, RepairRecord, SqliteRecordStore};

fn create_progress_bar(no_progress_bar: bool) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn recognition_client(config: &Config, http: &reqwest::Client) -> RecognitionClient {
    RecognitionClient::new(
        Box::new(http.clone()),
        config.gemini_api_key.clone(),
        config.ocr_model.clone(),
    )
}

/// Wire the Drive client and the account-picker flow into one session.
fn sync_engine(config: &Config, http: &reqwest::Client) -> SyncEngine {
    let endpoints = Endpoints::google();
    let drive = Arc::new(DriveClient::new(
        http.clone(),
        endpoints,
        config.google_api_key.clone(),
    ));
    let identity = Arc::new(InstalledAppFlow::new(
        http.clone(),
        endpoints,
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    ));
    let session = Arc::new(CloudSession::new(
        drive.clone(),
        identity,
        config.init_timeout,
    ));
    SyncEngine::new(drive, session).with_progress(create_progress_bar(config.no_progress_bar))
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteRecordStore> {
    tokio::fs::create_dir_all(&config.data_directory)
        .await
        .with_context(|| {
            format!(
                "Failed to create data directory {}",
                config.data_directory.display()
            )
        })?;
    Ok(SqliteRecordStore::open(&config.database_path()).await?)
}

async fn run_recognize(
    config: &Config,
    http: &reqwest::Client,
    photo: &std::path::Path,
) -> anyhow::Result<()> {
    let payload = payload::encode_jpeg_file(photo).await?;
    match recognition_client(config, http).recognize(&payload).await {
        RecognitionResult::PlateText(plate) => println!("{}", plate),
        RecognitionResult::Unknown => println!("UNKNOWN"),
        RecognitionResult::MissingCredential => anyhow::bail!(
            "Plate recognition is not configured. Set GEMINI_API_KEY (or API_KEY)."
        ),
        RecognitionResult::Failure(reason) => {
            anyhow::bail!("Plate recognition failed: {}", reason)
        }
    }
    Ok(())
}

/// Pick the plate for a save: explicit flag, then the stored one, then OCR
/// on the first photo.
async fn resolve_plate(
    args: &SaveArgs,
    existing: Option<&RepairRecord>,
    photos: &[String],
    config: &Config,
    http: &reqwest::Client,
) -> anyhow::Result<String> {
    if let Some(plate) = args.plate.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(plate.to_uppercase());
    }
    if let Some(record) = existing {
        return Ok(record.license_plate.clone());
    }

    let first = photos
        .first()
        .context("At least one photo is required")?;
    tracing::info!("No plate given, reading it from the first photo");
    match recognition_client(config, http).recognize(first).await {
        RecognitionResult::PlateText(plate) => {
            println!("Recognized plate {}", plate);
            Ok(plate)
        }
        RecognitionResult::Unknown => {
            anyhow::bail!("No license plate visible in the first photo. Pass --plate.")
        }
        RecognitionResult::MissingCredential => anyhow::bail!(
            "Plate recognition is not configured. Set GEMINI_API_KEY or pass --plate."
        ),
        RecognitionResult::Failure(reason) => anyhow::bail!(
            "Plate recognition failed ({}). Pass --plate to save anyway.",
            reason
        ),
    }
}

async fn run_save(args: SaveArgs, config: &Config, http: &reqwest::Client) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    let existing = match args.id {
        Some(id) => Some(
            store
                .get(id)
                .await?
                .with_context(|| format!("No repair record with id {}", id))?,
        ),
        None => None,
    };

    let mut photos = Vec::with_capacity(args.photos.len());
    for path in &args.photos {
        photos.push(payload::encode_jpeg_file(path).await?);
    }

    let plate = resolve_plate(&args, existing.as_ref(), &photos, config, http).await?;
    let date = match (&args.date, &existing) {
        (None, Some(record)) => record.date,
        (date, _) => config::parse_repair_date(date.as_deref())?,
    };

    let record = match existing {
        Some(mut record) => {
            record.license_plate = plate.clone();
            record.date = date;
            record.photos = photos;
            record.notes = args.notes.clone();
            record
        }
        None => RepairRecord::new(plate.clone(), date, photos, args.notes.clone()),
    };

    // Local save never depends on the Drive outcome.
    let id = store.save(&record).await?;
    println!("Saved record {} ({})", id, plate);

    if args.no_sync {
        return Ok(());
    }

    let engine = sync_engine(config, http);
    if let Err(e) = engine.session().ensure_ready().await {
        tracing::warn!("Drive sync unavailable: {}", e);
        println!("Saved locally; Drive sync unavailable: {}", e);
        return Ok(());
    }

    match drive::authenticate_and_sync(&engine, &plate, &record.photos).await {
        Ok(report) => {
            store.set_drive_folder(id, &report.folder_id).await?;
            println!(
                "Synced {} photo(s) to Drive folder '{}'",
                report.file_ids.len(),
                report.folder_name
            );
            Ok(())
        }
        Err(SyncError::PartialSync {
            uploaded, total, ..
        }) => anyhow::bail!(
            "Saved locally, but Drive sync failed after {} of {} photos",
            uploaded,
            total
        ),
        Err(e) => anyhow::bail!("Saved locally, but Drive sync failed: {}", e),
    }
}

async fn run_list(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let records = store.list().await?;
    if records.is_empty() {
        println!("No repair records saved yet.");
        return Ok(());
    }

    for record in records {
        println!(
            "{:>5}  {:<12} {}  {} photo(s)  {}{}",
            record.id.unwrap_or_default(),
            record.license_plate,
            record.date,
            record.photos.len(),
            if record.is_synced() { "synced" } else { "local" },
            if record.notes.is_empty() {
                String::new()
            } else {
                format!("  {}", record.notes)
            }
        );
    }
    Ok(())
}

async fn run_delete(config: &Config, id: i64) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    if store.delete(id).await? {
        println!("Deleted record {}", id);
        Ok(())
    } else {
        anyhow::bail!("No repair record with id {}", id)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.global.log_level.as_filter())),
        )
        .init();

    let config = Config::from_cli(&cli.global)?;
    tracing::debug!(?config, "Starting plate-sync");

    let http = config
        .http_client()
        .context("Failed to build HTTP client")?;

    match cli.command {
        Command::Recognize { photo } => run_recognize(&config, &http, &photo).await,
        Command::Save(args) => run_save(args, &config, &http).await,
        Command::List => run_list(&config).await,
        Command::Delete { id } => run_delete(&config, id).await,
    }
}
