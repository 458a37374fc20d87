use anyhow::{Context, Result};
use std::env;

/// Runtime configuration, loaded once at startup.
///
/// The Supabase URL/anon key pair identifies the backing project; the
/// service-role key grants the admin-mode access this endpoint writes with
/// (row-level security does not apply to it). `WEBHOOK_API_KEY` is optional:
/// when unset, inbound calls are accepted without authentication.
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub webhook_api_key: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            supabase_url: require_env("SUPABASE_URL")?,
            supabase_anon_key: require_env("SUPABASE_ANON_KEY")?,
            supabase_service_role_key: require_env("SUPABASE_SERVICE_ROLE_KEY")?,
            webhook_api_key: env::var("WEBHOOK_API_KEY").ok().filter(|s| !s.is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8787".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("Required environment variable '{}' is not set", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_names_the_missing_variable() {
        let err = require_env("TRIAGEM_TEST_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("TRIAGEM_TEST_UNSET_VAR"));
    }
}
