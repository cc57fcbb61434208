//! Pipeline configuration
//!
//! Values come from the process environment (a `.env` file is loaded by the
//! binary before this runs). CLI flags override individual fields afterwards.

use crate::error::{NlqError, Result};
use crate::fuzzy_matcher::ScorerKind;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_KNOWLEDGEBASE: &str = "metadata/knowledgebase.json";
pub const DEFAULT_MAX_RETRIES: u8 = 3;
pub const MAX_RETRIES_LIMIT: u8 = 6;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY: usize = 64;

/// Connection settings for the text-generation service.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub database_url: Option<String>,
    pub knowledgebase_path: PathBuf,
    /// Extra attempts allowed for the synthesis + validation pair.
    pub max_retries: u8,
    /// Upper bound on in-flight column-selection and value-lookup tasks.
    pub concurrency: usize,
    /// Matches scoring below this (0-100) keep the extracted literal.
    pub min_match_score: Option<f64>,
    pub scorer: ScorerKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: String::new(),
                base_url: DEFAULT_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                temperature: 0.0,
            },
            database_url: None,
            knowledgebase_path: PathBuf::from(DEFAULT_KNOWLEDGEBASE),
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            min_match_score: None,
            scorer: ScorerKind::TokenSet,
        }
    }
}

impl PipelineConfig {
    /// Build a config from the current process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            config.llm.api_key = key;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(raw) = get("LLM_TEMPERATURE") {
            config.llm.temperature = parse_number("LLM_TEMPERATURE", &raw)?;
        }
        config.database_url = get("DATABASE_URL").or_else(|| get("DB_URL"));
        if let Some(path) = get("KNOWLEDGEBASE_PATH") {
            config.knowledgebase_path = PathBuf::from(path);
        }
        if let Some(raw) = get("NLQ_MAX_RETRIES") {
            config.max_retries = parse_number("NLQ_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = get("NLQ_CONCURRENCY") {
            config.concurrency = parse_number("NLQ_CONCURRENCY", &raw)?;
        }
        if let Some(raw) = get("NLQ_MIN_MATCH_SCORE") {
            config.min_match_score = Some(parse_number("NLQ_MIN_MATCH_SCORE", &raw)?);
        }
        if let Some(raw) = get("NLQ_FUZZY_SCORER") {
            config.scorer = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(NlqError::Config(format!(
                "max retries must be between 0 and {}, got {}",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(NlqError::Config(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }
        if let Some(score) = self.min_match_score {
            if !(0.0..=100.0).contains(&score) {
                return Err(NlqError::Config(format!(
                    "minimum match score must be within 0..=100, got {}",
                    score
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| NlqError::Config(format!("{} has an invalid value: '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.database_url.is_none());
        assert!(config.min_match_score.is_none());
    }

    #[test]
    fn test_reads_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("OPENAI_BASE_URL", "http://localhost:8000/v1/"),
            ("DB_URL", "mysql://root@localhost/olist"),
            ("NLQ_MAX_RETRIES", "5"),
            ("NLQ_MIN_MATCH_SCORE", "60"),
            ("NLQ_FUZZY_SCORER", "exact"),
        ]))
        .unwrap();
        assert_eq!(config.llm.base_url, "http://localhost:8000/v1");
        assert_eq!(config.database_url.as_deref(), Some("mysql://root@localhost/olist"));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.min_match_score, Some(60.0));
        assert_eq!(config.scorer, ScorerKind::Exact);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(PipelineConfig::from_lookup(lookup(&[("NLQ_MAX_RETRIES", "9")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("NLQ_CONCURRENCY", "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("NLQ_CONCURRENCY", "4294967296")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("NLQ_CONCURRENCY", "64")])).is_ok());
        assert!(PipelineConfig::from_lookup(lookup(&[("NLQ_MIN_MATCH_SCORE", "abc")])).is_err());
    }
}
