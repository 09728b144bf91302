//! API credential loading.
//!
//! Environment variables win; a `.env` in the config directory fills
//! the gaps. The setup wizard that writes these files lives outside
//! this repo.

use std::collections::HashMap;
use std::path::Path;
use warden_core::error::WardenError;

pub const API_KEY_VAR: &str = "NEXTDNS_API_KEY";
pub const PROFILE_ID_VAR: &str = "NEXTDNS_PROFILE_ID";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub profile_id: String,
}

/// Parse a `.env` body into key/value pairs. Lines without `=` and
/// comment lines are skipped; surrounding quotes are stripped.
fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in contents.lines() {
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches('"').trim_matches('\'');
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

/// Resolve credentials from the process environment, then `.env`.
pub fn load(config_dir: &Path) -> Result<Credentials, WardenError> {
    let mut file_vars = HashMap::new();
    let env_path = config_dir.join(".env");
    if let Ok(contents) = std::fs::read_to_string(&env_path) {
        file_vars = parse_env_file(&contents);
    }

    let lookup = |name: &str| -> Option<String> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| file_vars.get(name).cloned().filter(|v| !v.is_empty()))
    };

    let api_key = lookup(API_KEY_VAR).ok_or_else(|| {
        WardenError::Config(format!(
            "missing {API_KEY_VAR} (set it in the environment or {})",
            env_path.display()
        ))
    })?;
    let profile_id = lookup(PROFILE_ID_VAR).ok_or_else(|| {
        WardenError::Config(format!(
            "missing {PROFILE_ID_VAR} (set it in the environment or {})",
            env_path.display()
        ))
    })?;

    Ok(Credentials {
        api_key,
        profile_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_file() {
        let vars = parse_env_file(
            "# comment\nNEXTDNS_API_KEY=abcd1234\n\nNEXTDNS_PROFILE_ID=\"abc123\"\nBROKEN LINE\n=nokey\n",
        );
        assert_eq!(vars.get("NEXTDNS_API_KEY").unwrap(), "abcd1234");
        assert_eq!(vars.get("NEXTDNS_PROFILE_ID").unwrap(), "abc123");
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_bom_is_tolerated() {
        let vars = parse_env_file("\u{feff}KEY=value\n");
        assert_eq!(vars.get("KEY").unwrap(), "value");
    }
}
