use crate::constants::{CONFIG_DIR_NAME, SAVE_DEBOUNCE_MS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub active_model: String,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub active_provider: String,
    /// Default tone applied to generation requests that do not set one
    /// (e.g. "friendly", "formal").
    #[serde(default)]
    pub default_tone: Option<String>,
    /// Debounce window for the autosave queue, in milliseconds.
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    pub providers: Vec<ProviderConfig>,
}

fn default_save_debounce_ms() -> u64 {
    SAVE_DEBOUNCE_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_provider: "Ollama".to_string(),
            default_tone: None,
            save_debounce_ms: SAVE_DEBOUNCE_MS,
            providers: vec![
                ProviderConfig {
                    name: "Ollama".to_string(),
                    api_key: None,
                    base_url: "http://localhost:11434".to_string(),
                    active_model: "qwen2.5:0.5b".to_string(),
                    system_prompt: None,
                },
                ProviderConfig {
                    name: "DeepSeek".to_string(),
                    api_key: None,
                    base_url: "https://api.deepseek.com/v1".to_string(),
                    active_model: "deepseek-chat".to_string(),
                    system_prompt: None,
                },
                ProviderConfig {
                    name: "OpenAI".to_string(),
                    api_key: None,
                    base_url: "https://api.openai.com/v1".to_string(),
                    active_model: "gpt-4o".to_string(),
                    system_prompt: None,
                },
            ],
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR_NAME);
        path
    }

    pub fn config_file() -> PathBuf {
        let mut path = Self::config_dir();
        path.push("config.toml");
        path
    }

    pub fn load() -> Self {
        match Self::load_from(&Self::config_file()) {
            Some(config) => config,
            None => {
                let default = Self::default();
                let _ = default.save();
                default
            }
        }
    }

    /// Parses the config at `path`, or `None` if it is missing or invalid.
    pub fn load_from(path: &std::path::Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let content = fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Invalid config at {:?}, using defaults: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(Self::config_file(), content)?;
        Ok(())
    }

    pub fn get_active_provider(&self) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|p| p.name == self.active_provider)
    }
}
