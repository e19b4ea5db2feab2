use crate::data_structures::{SeriesWindow, TickerMode};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

// YAML-serializable configuration structure
#[derive(Serialize, Deserialize, Debug)]
pub struct ConfigYaml {
    pub polygon_api_key: String,
    pub openai_api_key: String,
    pub port: Option<u16>,
    pub allowed_origin: Option<String>,
    pub openai_model: Option<String>,
    pub openai_max_tokens: Option<u32>,
    pub openai_temperature: Option<f32>,
    pub report_window_bars: Option<usize>,
    pub ticker_mode: Option<String>,
    pub upstream_timeout_secs: Option<u64>,
    pub environment: Option<String>,
}

// Holds application-wide settings
#[derive(Clone)]
pub struct AppConfig {
    pub polygon_api_key: String,
    pub openai_api_key: String,
    pub port: u16,
    pub allowed_origin: Option<String>,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,
    pub report_window: SeriesWindow,
    pub ticker_mode: TickerMode,
    pub upstream_timeout: Duration,
    pub environment: String,
}

/// Settings the report handlers need beyond the shared session.
#[derive(Clone, Copy)]
pub struct ReportSettings {
    pub window: SeriesWindow,
}

impl AppConfig {
    // Load configuration from YAML file or environment variables
    pub fn load() -> Self {
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_yaml(&config_file)
        } else {
            Self::from_env()
        }
    }

    // Load configuration from YAML file
    pub fn from_yaml(file_path: &str) -> Self {
        let yaml_content = fs::read_to_string(file_path)
            .unwrap_or_else(|e| panic!("Failed to read config file {}: {}", file_path, e));

        let yaml_config: ConfigYaml = serde_yaml::from_str(&yaml_content)
            .unwrap_or_else(|e| panic!("Failed to parse YAML config: {}", e));

        if yaml_config.polygon_api_key.is_empty() || yaml_config.openai_api_key.is_empty() {
            panic!("API keys are missing. Check your config file.");
        }

        Self {
            polygon_api_key: yaml_config.polygon_api_key,
            openai_api_key: yaml_config.openai_api_key,
            port: yaml_config.port.unwrap_or(5001),
            allowed_origin: yaml_config.allowed_origin,
            openai_model: yaml_config.openai_model.unwrap_or_else(|| "gpt-4".to_string()),
            openai_max_tokens: yaml_config.openai_max_tokens.unwrap_or(150),
            openai_temperature: yaml_config.openai_temperature.unwrap_or(0.7),
            report_window: window_from(yaml_config.report_window_bars),
            ticker_mode: parse_ticker_mode(yaml_config.ticker_mode.as_deref().unwrap_or("single")),
            upstream_timeout: Duration::from_secs(yaml_config.upstream_timeout_secs.unwrap_or(10)),
            environment: yaml_config.environment.unwrap_or_else(|| "development".to_string()),
        }
    }

    // Load all configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        let polygon_api_key = env::var("POLYGON_API_KEY").expect("POLYGON_API_KEY must be set");
        let openai_api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5001);

        let allowed_origin = env::var("ALLOWED_ORIGIN").ok();

        let openai_model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string());

        let openai_max_tokens = env::var("OPENAI_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(150);

        let openai_temperature = env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.7);

        let report_window_bars = env::var("REPORT_WINDOW_BARS")
            .ok()
            .map(|s| s.parse().expect("REPORT_WINDOW_BARS must be a number"));

        let ticker_mode = env::var("TICKER_MODE").unwrap_or_else(|_| "single".to_string());

        let upstream_timeout_secs = env::var("UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Self {
            polygon_api_key,
            openai_api_key,
            port,
            allowed_origin,
            openai_model,
            openai_max_tokens,
            openai_temperature,
            report_window: window_from(report_window_bars),
            ticker_mode: parse_ticker_mode(&ticker_mode),
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            environment,
        }
    }
}

fn parse_ticker_mode(value: &str) -> TickerMode {
    match value.to_ascii_lowercase().as_str() {
        "single" => TickerMode::Single,
        "multi" => TickerMode::Multi,
        other => panic!("TICKER_MODE must be 'single' or 'multi', got '{}'", other),
    }
}

fn window_from(bars: Option<usize>) -> SeriesWindow {
    match bars {
        None => SeriesWindow::Full,
        Some(0) => panic!("REPORT_WINDOW_BARS must be greater than zero"),
        Some(n) => SeriesWindow::LastBars(n),
    }
}
