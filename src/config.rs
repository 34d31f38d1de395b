use std::time::Duration;

use clap::Args;

pub const DEFAULT_DAILY_POINTS: i32 = 100;
pub const DEFAULT_CATALOGUE_TTL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "CLASSROOM_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    pub max_connections: u32,

    /// Floor daily points at zero when applying deductions
    #[arg(long, env = "CLASSROOM_NON_NEGATIVE_DAILY", global = true)]
    pub non_negative_daily: bool,

    /// How long a loaded catalogue stays valid
    #[arg(
        long,
        env = "CLASSROOM_CATALOGUE_TTL_SECS",
        default_value_t = DEFAULT_CATALOGUE_TTL_SECS,
        global = true
    )]
    pub catalogue_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub enforce_non_negative_daily: bool,
    pub default_daily_points: i32,
    pub catalogue_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_non_negative_daily: false,
            default_daily_points: DEFAULT_DAILY_POINTS,
            catalogue_ttl: Duration::from_secs(DEFAULT_CATALOGUE_TTL_SECS),
        }
    }
}

impl From<&Settings> for EngineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            enforce_non_negative_daily: settings.non_negative_daily,
            default_daily_points: DEFAULT_DAILY_POINTS,
            catalogue_ttl: Duration::from_secs(settings.catalogue_ttl_secs),
        }
    }
}
