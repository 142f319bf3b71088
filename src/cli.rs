use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use crate::metadata::{PKG_DESCRIPTION, PKG_NAME, PKG_VERSION};

#[derive(Parser, Debug, Clone)]
#[command(name = PKG_NAME)]
#[command(version = PKG_VERSION)]
#[command(about = PKG_DESCRIPTION, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the display backend
    Start(CommandArguments),
    /// Show the resolved configuration (secrets masked)
    Status(CommandArguments),
    /// Print version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct CommandArguments {
    /// HTTP bind address
    #[arg(long, env = "DISPLAY_HTTP_ADDR", default_value = "0.0.0.0:3000")]
    pub http_addr: String,

    /// Directory holding the persisted stores
    #[arg(long, env = "DISPLAY_DATA_DIR", default_value_os_t = default_data_dir())]
    pub data_dir: PathBuf,

    /// Offset from UTC of the display's wall clock, in minutes
    #[arg(long, env = "DISPLAY_UTC_OFFSET_MINUTES", default_value_t = 480, allow_negative_numbers = true)]
    pub utc_offset_minutes: i32,

    /// OpenAI API key used for chat and embeddings
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Chat completion model
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-3.5-turbo")]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_EMBEDDING_MODEL", default_value = "text-embedding-ada-002")]
    pub embedding_model: String,

    /// Spreadsheet holding the staff roster form responses
    #[arg(long, env = "GOOGLE_SHEET_ID")]
    pub google_sheet_id: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_SHEET_RANGE", default_value = "A:F")]
    pub google_sheet_range: String,

    #[arg(long, env = "NEWS_FEED_URL", default_value = "https://rss.astroawani.com/rss/latest/public")]
    pub news_feed_url: String,

    /// JAKIM e-solat zone code
    #[arg(long, env = "PRAYER_ZONE", default_value = "JHR02")]
    pub prayer_zone: String,

    #[arg(long, env = "ROSTER_POLL_SECS", default_value_t = 300)]
    pub roster_poll_secs: u64,

    #[arg(long, env = "PRAYER_POLL_SECS", default_value_t = 3600)]
    pub prayer_poll_secs: u64,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PKG_NAME)
}

impl CommandArguments {
    pub fn default_settings() -> Self {
        Self {
            http_addr: "0.0.0.0:3000".to_string(),
            data_dir: default_data_dir(),
            utc_offset_minutes: 480,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            google_sheet_id: None,
            google_api_key: None,
            google_sheet_range: "A:F".to_string(),
            news_feed_url: "https://rss.astroawani.com/rss/latest/public".to_string(),
            prayer_zone: "JHR02".to_string(),
            roster_poll_secs: 300,
            prayer_poll_secs: 3600,
        }
    }

    /// Validate CLI/environment-derived arguments.
    pub fn validate(&self) -> Result<(), String> {
        self.http_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid DISPLAY_HTTP_ADDR '{}': {e}", self.http_addr))?;
        if self.data_dir.as_os_str().is_empty() {
            return Err("DISPLAY_DATA_DIR cannot be empty".to_string());
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(format!(
                "DISPLAY_UTC_OFFSET_MINUTES out of range: {}",
                self.utc_offset_minutes
            ));
        }
        if self.roster_poll_secs == 0 || self.prayer_poll_secs == 0 {
            return Err("Poll intervals must be at least one second".to_string());
        }
        if self.prayer_zone.trim().is_empty() {
            return Err("PRAYER_ZONE cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.http_addr
            .parse()
            .map_err(|e| format!("Invalid DISPLAY_HTTP_ADDR '{}': {e}", self.http_addr))
    }

    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn roster_poll_interval(&self) -> Duration {
        Duration::from_secs(self.roster_poll_secs)
    }

    pub fn prayer_poll_interval(&self) -> Duration {
        Duration::from_secs(self.prayer_poll_secs)
    }

    /// Human readable summary used by the `status` command.
    pub fn describe(&self) -> String {
        let secret = |v: &Option<String>| match v {
            Some(s) if !s.is_empty() => "set".green().to_string(),
            _ => "unset".red().to_string(),
        };
        let optional = |v: &Option<String>| match v {
            Some(s) if !s.is_empty() => s.clone(),
            _ => "unset".red().to_string(),
        };
        let rows = [
            ("http_addr", self.http_addr.clone()),
            ("data_dir", self.data_dir.display().to_string()),
            ("utc_offset_minutes", self.utc_offset_minutes.to_string()),
            ("openai_api_key", secret(&self.openai_api_key)),
            ("openai_base_url", self.openai_base_url.clone()),
            ("openai_model", self.openai_model.clone()),
            ("embedding_model", self.embedding_model.clone()),
            ("google_sheet_id", optional(&self.google_sheet_id)),
            ("google_api_key", secret(&self.google_api_key)),
            ("google_sheet_range", self.google_sheet_range.clone()),
            ("news_feed_url", self.news_feed_url.clone()),
            ("prayer_zone", self.prayer_zone.clone()),
            ("roster_poll_secs", self.roster_poll_secs.to_string()),
            ("prayer_poll_secs", self.prayer_poll_secs.to_string()),
        ];
        rows.iter()
            .map(|(k, v)| format!("{:<20} {}", k.bold(), v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
