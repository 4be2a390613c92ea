//! CLI configuration via environment variables
//!
//! Output preferences only. Run settings live in mongotest.toml and are
//! loaded through `mongotest_config`.

use std::env;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Default to JSON output (MONGOTEST_OUTPUT=json)
    pub default_json: bool,
    /// Disable colored output (MONGOTEST_NO_COLOR=1 or NO_COLOR=1)
    pub no_color: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            default_json: env::var("MONGOTEST_OUTPUT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            no_color: env::var_os("MONGOTEST_NO_COLOR").is_some()
                || env::var_os("NO_COLOR").is_some(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
