use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::drive::session::DEFAULT_INIT_TIMEOUT;
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "plate-sync",
    about = "Read license plates from vehicle photos and sync repair photos to Google Drive"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Gemini API key used for plate recognition.
    /// Falls back to the API_KEY environment variable.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// Google API key for the Drive API
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    pub google_api_key: Option<String>,

    /// OAuth client ID used for the Google account picker
    #[arg(long, env = "GOOGLE_CLIENT_ID", global = true)]
    pub google_client_id: Option<String>,

    /// OAuth client secret (required by some desktop OAuth clients)
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub google_client_secret: Option<String>,

    /// Directory holding the local repair record database
    #[arg(long, default_value = "~/.plate-sync", global = true)]
    pub data_directory: String,

    /// Gemini model used for plate recognition
    #[arg(long, default_value = "gemini-2.0-flash-exp", global = true)]
    pub ocr_model: String,

    /// Seconds to wait for the Drive and identity clients to become ready
    #[arg(long, default_value_t = DEFAULT_INIT_TIMEOUT.as_secs(), global = true)]
    pub init_timeout: u64,

    /// Seconds allowed to establish an HTTP connection. Transfers themselves
    /// are never cut off.
    #[arg(long, default_value_t = 30, global = true)]
    pub connect_timeout: u64,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract the license plate from a single photo
    Recognize {
        /// JPEG photo of the vehicle
        #[arg(long)]
        photo: PathBuf,
    },
    /// Save a repair record locally, then sync its photos to Drive
    Save(SaveArgs),
    /// List saved repair records, most recently updated first
    List,
    /// Delete a saved repair record
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SaveArgs {
    /// Existing record to update
    #[arg(long)]
    pub id: Option<i64>,

    /// License plate; recognized from the first photo when omitted
    #[arg(long)]
    pub plate: Option<String>,

    /// Photos to attach, in upload order
    #[arg(long = "photo", required = true)]
    pub photos: Vec<PathBuf>,

    #[arg(long, default_value = "")]
    pub notes: String,

    /// Repair date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub date: Option<String>,

    /// Only save locally
    #[arg(long)]
    pub no_sync: bool,
}
