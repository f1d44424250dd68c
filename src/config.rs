use serde::{Deserialize, Serialize};
use std::env;

use crate::membership::resolver::SelectionPolicy;

pub const IN_MEMORY_API_URL: &str = "memory://";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub hotel_api: HotelApiConfig,
    pub mail: MailConfig,
    pub membership: MembershipConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelApiConfig {
    /// Base URL of the hotel REST API, or `memory://` for a process-local store.
    pub base_url: String,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    /// Emails registered up front when running against the in-memory store.
    pub seed_users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Endpoint for membership confirmation emails. Logged only when unset.
    pub endpoint: Option<String>,
    pub timeout_milliseconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MembershipConfig {
    pub selection_policy: SelectionPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            port: parse_var("PORT", 8080)?,

            hotel_api: HotelApiConfig {
                base_url: env::var("HOTEL_API_URL")
                    .unwrap_or_else(|_| IN_MEMORY_API_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                access_token: non_empty_var("HOTEL_API_TOKEN"),
                timeout_secs: parse_var("HOTEL_API_TIMEOUT_SECS", 30)?,
                seed_users: env::var("MEMORY_SEED_USERS")
                    .unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },

            mail: MailConfig {
                endpoint: non_empty_var("MAIL_API_URL"),
                timeout_milliseconds: parse_var("MAIL_API_TIMEOUT_MS", 5_000)?,
            },

            membership: MembershipConfig {
                selection_policy: parse_var("MEMBERSHIP_SELECTION_POLICY", SelectionPolicy::default())?,
            },
        })
    }
}

impl HotelApiConfig {
    pub fn is_in_memory(&self) -> bool {
        self.base_url.starts_with(IN_MEMORY_API_URL.trim_end_matches('/'))
    }
}

impl Default for HotelApiConfig {
    fn default() -> Self {
        Self {
            base_url: IN_MEMORY_API_URL.to_string(),
            access_token: None,
            timeout_secs: 30,
            seed_users: Vec::new(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
