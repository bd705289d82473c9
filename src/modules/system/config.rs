use std::fs;
use std::path::PathBuf;

use crate::models::AppConfig;

const CONFIG_FILE: &str = "trestle.json";

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TRESTLE_CONFIG") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(CONFIG_FILE)
}

pub fn load_app_config() -> Result<AppConfig, String> {
    let path = config_path();

    if !path.exists() {
        return Ok(AppConfig::new());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| format!("failed_to_read_config_file {}: {}", path.display(), e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("failed_to_parse_config_file {}: {}", path.display(), e))
}
