use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct WatchConfig {
    pub interval_secs: Option<u64>,
    pub detection_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub api: Option<ApiConfig>,
    pub watch: Option<WatchConfig>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("platewatch.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}
