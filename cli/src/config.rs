use anyhow::{Context, Result};
use clap::Args;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve the data directory and database path. An explicit `db_path`
    /// (from `--db` / `MACROLOG_DB`) wins over the platform default.
    pub fn load(db_path: Option<PathBuf>) -> Result<Self> {
        if let Some(db_path) = db_path {
            let data_dir = db_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            return Self::in_dir(&data_dir, db_path);
        }

        let proj_dirs =
            ProjectDirs::from("", "", "macrolog").context("Could not determine home directory")?;
        let data_dir = proj_dirs.data_dir().to_path_buf();
        let db_path = data_dir.join("macrolog.db");
        Self::in_dir(&data_dir, db_path)
    }

    fn in_dir(data_dir: &Path, db_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        Ok(Config { db_path })
    }
}

/// Provider credentials and models. A provider without a key is skipped.
#[derive(Debug, Clone, Args)]
pub struct LlmConfig {
    /// OpenAI API key (primary provider)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    /// OpenAI model
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    pub openai_model: String,
    /// Gemini API key (secondary provider)
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,
    /// Gemini model
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,
    /// Per-provider request timeout in seconds
    #[arg(long, env = "MACROLOG_LLM_TIMEOUT", default_value_t = DEFAULT_LLM_TIMEOUT_SECS)]
    pub llm_timeout: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            llm_timeout: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl LlmConfig {
    pub(crate) fn openai_key(&self) -> Option<&str> {
        non_blank(self.openai_api_key.as_deref())
    }

    pub(crate) fn gemini_key(&self) -> Option<&str> {
        non_blank(self.gemini_api_key.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
