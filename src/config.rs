use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};

use crate::cli::GlobalArgs;

/// Values that build tooling and `.env` templates leave behind when a
/// variable was never set.
const PLACEHOLDER_VALUES: &[&str] = &["undefined", "null"];

/// A secret resolved from configuration.
///
/// Construction goes through [`Credential::resolve`], so an existing
/// `Credential` is always non-empty and never a placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn resolve(raw: Option<&str>) -> Option<Self> {
        let value = raw?.trim();
        if value.is_empty()
            || PLACEHOLDER_VALUES
                .iter()
                .any(|p| value.eq_ignore_ascii_case(p))
        {
            return None;
        }
        Some(Self(value.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Application configuration.
pub struct Config {
    pub data_directory: PathBuf,
    pub ocr_model: String,
    pub gemini_api_key: Option<Credential>,
    pub google_api_key: Option<Credential>,
    pub google_client_id: Option<Credential>,
    pub google_client_secret: Option<Credential>,
    pub init_timeout: Duration,
    pub connect_timeout: Duration,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_directory", &self.data_directory)
            .field("ocr_model", &self.ocr_model)
            .field("gemini_api_key", &self.gemini_api_key.is_some())
            .field("google_api_key", &self.google_api_key.is_some())
            .field("google_client_id", &self.google_client_id)
            .field("init_timeout", &self.init_timeout)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(args: &GlobalArgs) -> anyhow::Result<Self> {
        let gemini_key = args
            .gemini_api_key
            .clone()
            .or_else(|| std::env::var("API_KEY").ok());
        Self::from_parts(args, gemini_key)
    }

    fn from_parts(args: &GlobalArgs, gemini_api_key: Option<String>) -> anyhow::Result<Self> {
        if args.init_timeout == 0 {
            anyhow::bail!("--init-timeout must be at least 1 second");
        }

        Ok(Self {
            data_directory: expand_tilde(&args.data_directory),
            ocr_model: args.ocr_model.clone(),
            gemini_api_key: Credential::resolve(gemini_api_key.as_deref()),
            google_api_key: Credential::resolve(args.google_api_key.as_deref()),
            google_client_id: Credential::resolve(args.google_client_id.as_deref()),
            google_client_secret: Credential::resolve(args.google_client_secret.as_deref()),
            init_timeout: Duration::from_secs(args.init_timeout),
            connect_timeout: Duration::from_secs(args.connect_timeout),
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_directory.join("records.db")
    }

    /// Shared HTTP client. Only connection setup is bounded; a slow photo
    /// upload runs to completion.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
    }
}

/// Parse a repair date, defaulting to today's local date.
pub(crate) fn parse_repair_date(s: Option<&str>) -> anyhow::Result<NaiveDate> {
    match s {
        None => Ok(Local::now().date_naive()),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            anyhow::anyhow!("Cannot parse '{}' as a date. Expected ISO date (2025-01-02)", s)
        }),
    }
}
