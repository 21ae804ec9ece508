use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::phrases::PhraseRules;

pub const DEFAULT_PATH_PREFIX: &str = "/blog";
pub const DEFAULT_LOCALE: &str = "de";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct LinkerConfig {
    #[serde(default)]
    pub linker: LinkerSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct LinkerSection {
    pub path_prefix: Option<String>,
    pub locale: Option<String>,
    /// Extra stopwords merged into the locale defaults.
    #[serde(default)]
    pub stopwords: Vec<String>,
    /// Extra compound-single stopwords merged into the locale defaults.
    #[serde(default)]
    pub compound_stopwords: Vec<String>,
    pub min_token_len: Option<usize>,
    pub bigram_first_min: Option<usize>,
    pub bigram_second_min: Option<usize>,
    pub trigram_min: Option<usize>,
    pub compound_min: Option<usize>,
}

impl LinkerConfig {
    /// Resolve the link route prefix: env CROSSLINK_PATH_PREFIX > config >
    /// default. The trailing slash is always stripped.
    pub fn path_prefix(&self) -> String {
        if let Ok(value) = env::var("CROSSLINK_PATH_PREFIX") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed.trim_end_matches('/').to_string();
            }
        }
        self.linker
            .path_prefix
            .as_deref()
            .unwrap_or(DEFAULT_PATH_PREFIX)
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the corpus locale: env CROSSLINK_LOCALE > config > default.
    pub fn locale(&self) -> String {
        if let Ok(value) = env::var("CROSSLINK_LOCALE") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.linker
            .locale
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    /// Materialize the effective phrase rules: locale defaults plus any
    /// overrides from the `[linker]` section.
    pub fn rules(&self) -> PhraseRules {
        let mut rules = PhraseRules::for_locale(&self.locale());
        for word in &self.linker.stopwords {
            rules.stopwords.insert(word.trim().to_lowercase());
        }
        for word in &self.linker.compound_stopwords {
            rules.compound_stopwords.insert(word.trim().to_lowercase());
        }
        if let Some(value) = self.linker.min_token_len {
            rules.min_token_len = value;
        }
        if let Some(value) = self.linker.bigram_first_min {
            rules.bigram_first_min = value;
        }
        if let Some(value) = self.linker.bigram_second_min {
            rules.bigram_second_min = value;
        }
        if let Some(value) = self.linker.trigram_min {
            rules.trigram_min = value;
        }
        if let Some(value) = self.linker.compound_min {
            rules.compound_min = value;
        }
        rules
    }
}

/// Load and parse a LinkerConfig from a TOML file. Returns default if the
/// file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<LinkerConfig> {
    if !config_path.exists() {
        return Ok(LinkerConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: LinkerConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
