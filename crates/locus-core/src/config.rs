//! Planner configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Table group the plan compiles against. Fresh target Locations are
    /// requested from the registry for this group.
    pub table_group: String,

    /// Allow joins and aggregates to skip a shuffle when a shared part-fix
    /// key scheme proves colocation.
    pub enable_part_fix_key_colocation: bool,

    /// Degenerate deployments: every freshly requested compute Location is
    /// the table group's single Location.
    pub force_single_location: bool,

    /// Hash function stamped on distributions created by hash exchanges.
    pub default_hash_function: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            table_group: "default".to_string(),
            enable_part_fix_key_colocation: true,
            force_single_location: false,
            default_hash_function: "murmur3".to_string(),
        }
    }
}

impl PlannerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `LOCUS_TABLE_GROUP`: table group name
    /// - `LOCUS_PART_FIX_KEY_COLOCATION`: `true`/`false`
    /// - `LOCUS_FORCE_SINGLE_LOCATION`: `true`/`false`
    /// - `LOCUS_HASH_FUNCTION`: default hash function name
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("LOCUS_TABLE_GROUP") {
            if !s.trim().is_empty() {
                cfg.table_group = s;
            }
        }

        if let Ok(s) = std::env::var("LOCUS_PART_FIX_KEY_COLOCATION") {
            if let Some(v) = parse_flag(&s) {
                cfg.enable_part_fix_key_colocation = v;
            }
        }

        if let Ok(s) = std::env::var("LOCUS_FORCE_SINGLE_LOCATION") {
            if let Some(v) = parse_flag(&s) {
                cfg.force_single_location = v;
            }
        }

        if let Ok(s) = std::env::var("LOCUS_HASH_FUNCTION") {
            if !s.trim().is_empty() {
                cfg.default_hash_function = s;
            }
        }

        cfg
    }

    /// Reject configs the planner cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.table_group.trim().is_empty() {
            return Err(Error::Config("table_group must not be empty".into()));
        }
        if self.default_hash_function.trim().is_empty() {
            return Err(Error::Config(
                "default_hash_function must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
