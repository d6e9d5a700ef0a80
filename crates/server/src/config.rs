use std::{collections::HashMap, fs};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub locations_path: String,
    pub messages_path: Option<String>,
    /// Reports endpoint of the crisis map; pushes are skipped when unset.
    pub crisis_map_url: Option<String>,
    /// Map definitions endpoint used when importing a survey from a map.
    pub crisis_map_maps_url: String,
    pub source_url: String,
    pub reporting_utc_offset_hours: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/interviews.db".into(),
            locations_path: "./data/locations.json".into(),
            messages_path: None,
            crisis_map_url: None,
            crisis_map_maps_url: crisis_map::DEFAULT_MAPS_URL.into(),
            source_url: "http://localhost:8080/".into(),
            reporting_utc_offset_hours: interview::interval::DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |name| std::env::var(name).ok());
    settings
}

/// Overlays the flat string table of `server.toml`.
pub fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            warn!(%error, "ignoring unreadable server.toml");
            return;
        }
    };

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("locations_path") {
        settings.locations_path = v.clone();
    }
    if let Some(v) = file_cfg.get("messages_path") {
        settings.messages_path = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("crisis_map_url") {
        settings.crisis_map_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("crisis_map_maps_url") {
        settings.crisis_map_maps_url = v.clone();
    }
    if let Some(v) = file_cfg.get("source_url") {
        settings.source_url = v.clone();
    }
    if let Some(v) = file_cfg.get("reporting_utc_offset_hours") {
        set_offset(settings, v);
    }
}

/// Environment wins over the file. `APP__*` names win over the short ones.
pub fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("LOCATIONS_PATH") {
        settings.locations_path = v;
    }
    if let Some(v) = var("MESSAGES_PATH") {
        settings.messages_path = Some(v);
    }
    if let Some(v) = var("CRISIS_MAP_URL") {
        settings.crisis_map_url = Some(v);
    }
    if let Some(v) = var("CRISIS_MAP_MAPS_URL") {
        settings.crisis_map_maps_url = v;
    }
    if let Some(v) = var("SOURCE_URL") {
        settings.source_url = v;
    }

    if let Some(v) = var("APP__REPORTING_UTC_OFFSET_HOURS") {
        set_offset(settings, &v);
    }
}

fn set_offset(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<i32>() {
        Ok(hours) if (-23..=23).contains(&hours) => settings.reporting_utc_offset_hours = hours,
        _ => warn!(value = raw, "ignoring invalid reporting UTC offset"),
    }
}

/// Turns a plain file path into a sqlite URL. Storage creates the parent
/// directory when it opens the file.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
