//! Application configuration. Gateway credentials, paths, listen address.
//!
//! Read from `DAT_DISPATCH_*` environment variables (after `.env`), plus an optional
//! file named by `DAT_DISPATCH_CONFIG`.

use serde::Deserialize;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_MAIL_FROM: &str = "DAT Dispatch <dispatch@localhost>";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Directory holding `dat.db`. Read from DAT_DISPATCH_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// HTTP listen address. Read from DAT_DISPATCH_BIND_ADDR.
    #[serde(default)]
    pub bind_addr: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // SMS (Twilio)
    // ─────────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub twilio_account_sid: Option<String>,

    #[serde(default)]
    pub twilio_auth_token: Option<String>,

    /// Our sending number, E.164.
    #[serde(default)]
    pub twilio_from_number: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Mail (Mailgun)
    // ─────────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub mailgun_domain: Option<String>,

    #[serde(default)]
    pub mailgun_api_key: Option<String>,

    /// From header on outgoing mail. Read from DAT_DISPATCH_MAIL_FROM.
    #[serde(default)]
    pub mail_from: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Links and maps
    // ─────────────────────────────────────────────────────────────────────────
    /// Bitly access token. Read from DAT_DISPATCH_BITLY_TOKEN.
    #[serde(default)]
    pub bitly_token: Option<String>,

    /// Google static maps key; maps work without one at a lower quota.
    #[serde(default)]
    pub maps_api_key: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("DAT_DISPATCH_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        // Environment wins over the file.
        c = c.add_source(config::Environment::with_prefix("DAT_DISPATCH"));
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> String {
        non_blank(&self.data_dir).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
    }

    pub fn bind_addr_or_default(&self) -> String {
        non_blank(&self.bind_addr).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
    }

    pub fn mail_from_or_default(&self) -> String {
        non_blank(&self.mail_from).unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string())
    }

    pub fn maps_api_key(&self) -> Option<String> {
        non_blank(&self.maps_api_key)
    }

    /// Returns true if all three Twilio settings are present.
    pub fn is_twilio_configured(&self) -> bool {
        [&self.twilio_account_sid, &self.twilio_auth_token, &self.twilio_from_number]
            .iter()
            .all(|v| non_blank(v).is_some())
    }

    pub fn is_mailgun_configured(&self) -> bool {
        non_blank(&self.mailgun_domain).is_some() && non_blank(&self.mailgun_api_key).is_some()
    }

    pub fn is_bitly_configured(&self) -> bool {
        non_blank(&self.bitly_token).is_some()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
