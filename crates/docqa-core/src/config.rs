//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nesting, e.g. `APP_RETRIEVAL__FINAL_K`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Filter;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.retrieval()?;
        Ok(config)
    }

    /// Wrap an already-assembled figment (tests, embedding applications).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::new().merge(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[retrieval]` section, validated.
    pub fn retrieval(&self) -> Result<RetrievalConfig> {
        let cfg: RetrievalConfig = self
            .figment
            .extract_inner("retrieval")
            .map_err(|e| Error::InvalidConfig(format!("retrieval: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The `[data]` section with paths expanded.
    pub fn data(&self) -> Result<DataConfig> {
        let mut cfg: DataConfig = self
            .figment
            .extract_inner("data")
            .map_err(|e| Error::InvalidConfig(format!("data: {e}")))?;
        cfg.chunks_dir = expand_path(cfg.chunks_dir.to_string_lossy());
        cfg.lancedb_dir = expand_path(cfg.lancedb_dir.to_string_lossy());
        cfg.model_dir = cfg.model_dir.map(|p| expand_path(p.to_string_lossy()));
        cfg.reranker_model_dir = cfg.reranker_model_dir.map(|p| expand_path(p.to_string_lossy()));
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Settings {
    retrieval: RetrievalConfig,
    data: DataConfig,
}

/// Tunables of the retrieval pipeline. Every field has a documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight of the semantic (vector) contribution in fusion.
    pub semantic_weight: f32,
    /// Weight of the keyword contribution in fusion.
    pub keyword_weight: f32,
    /// Candidate pool size requested from each signal.
    pub max_results: usize,
    /// Default number of results returned when the caller does not ask for more.
    pub final_k: usize,
    /// Flat score bonus for the first result of each category.
    pub diversity_boost: f32,
    pub rerank_enabled: bool,
    pub rerank_top_k: usize,
    pub rerank_final_k: usize,
    pub rerank_batch_size: usize,
    pub rerank_cache_size: usize,
    pub cache_enabled: bool,
    pub cache_max_size: usize,
    pub cache_max_age_seconds: u64,
    pub cache_cleanup_interval_seconds: u64,
    pub semantic_cache_threshold: f32,
    pub semantic_cache_early_exit_threshold: f32,
    pub cache_min_population_for_semantic_match: usize,
    pub search_timeout_ms: u64,
    pub embed_timeout_ms: u64,
    /// Required equality filter applied to every vector query.
    pub vector_filter: Filter,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            keyword_weight: 0.4,
            max_results: 15,
            final_k: 6,
            diversity_boost: 0.1,
            rerank_enabled: true,
            rerank_top_k: 10,
            rerank_final_k: 4,
            rerank_batch_size: 5,
            rerank_cache_size: 100,
            cache_enabled: true,
            cache_max_size: 500,
            cache_max_age_seconds: 3600,
            cache_cleanup_interval_seconds: 300,
            semantic_cache_threshold: 0.85,
            semantic_cache_early_exit_threshold: 0.95,
            cache_min_population_for_semantic_match: 10,
            search_timeout_ms: 5000,
            embed_timeout_ms: 5000,
            vector_filter: Filter::new(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("semantic_weight", self.semantic_weight), ("keyword_weight", self.keyword_weight), ("diversity_boost", self.diversity_boost)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be a finite non-negative number, got {w}")));
            }
        }
        for (name, n) in [
            ("max_results", self.max_results),
            ("final_k", self.final_k),
            ("rerank_top_k", self.rerank_top_k),
            ("rerank_final_k", self.rerank_final_k),
            ("rerank_batch_size", self.rerank_batch_size),
            ("rerank_cache_size", self.rerank_cache_size),
            ("cache_max_size", self.cache_max_size),
        ] {
            if n == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
            }
        }
        for (name, t) in [("semantic_cache_threshold", self.semantic_cache_threshold), ("semantic_cache_early_exit_threshold", self.semantic_cache_early_exit_threshold)] {
            if !(0.0..=1.0).contains(&t) {
                return Err(Error::InvalidConfig(format!("{name} must be within [0, 1], got {t}")));
            }
        }
        if self.semantic_cache_early_exit_threshold < self.semantic_cache_threshold {
            return Err(Error::InvalidConfig(format!(
                "semantic_cache_early_exit_threshold ({}) is below semantic_cache_threshold ({})",
                self.semantic_cache_early_exit_threshold, self.semantic_cache_threshold
            )));
        }
        if self.cache_max_age_seconds == 0 || self.cache_cleanup_interval_seconds == 0 {
            return Err(Error::InvalidConfig("cache ages and intervals must be greater than zero".to_string()));
        }
        if self.search_timeout_ms == 0 || self.embed_timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn cache_max_age(&self) -> Duration { Duration::from_secs(self.cache_max_age_seconds) }
    pub fn cache_cleanup_interval(&self) -> Duration { Duration::from_secs(self.cache_cleanup_interval_seconds) }
    pub fn search_timeout(&self) -> Duration { Duration::from_millis(self.search_timeout_ms) }
    pub fn embed_timeout(&self) -> Duration { Duration::from_millis(self.embed_timeout_ms) }
}

/// Locations of the corpus, the vector table and local model files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub chunks_dir: PathBuf,
    pub lancedb_dir: PathBuf,
    pub lancedb_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_model_dir: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            chunks_dir: PathBuf::from("../data/chunks"),
            lancedb_dir: PathBuf::from("../data/indexes/lancedb"),
            lancedb_table: "chunks".to_string(),
            model_dir: None,
            reranker_model_dir: None,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_validate() {
        RetrievalConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn toml_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[retrieval]\nsemantic_weight = 0.7\nfinal_k = 3\n")?;
            jail.create_file("config.test.toml", "[retrieval]\nfinal_k = 5\n")?;
            jail.set_env("RUST_ENV", "test");
            jail.set_env("APP_RETRIEVAL__CACHE_MAX_SIZE", "42");
            let config = Config::load().map_err(|e| e.to_string())?;
            let r = config.retrieval().map_err(|e| e.to_string())?;
            assert!((r.semantic_weight - 0.7).abs() < f32::EPSILON);
            assert_eq!(r.final_k, 5);
            assert_eq!(r.cache_max_size, 42);
            assert!((r.keyword_weight - 0.4).abs() < f32::EPSILON, "untouched keys keep defaults");
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_fast() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[retrieval]\nsemantic_cache_threshold = 1.5\n")?;
            jail.set_env("RUST_ENV", "test");
            assert!(Config::load().is_err());
            Ok(())
        });

        let mut cfg = RetrievalConfig::default();
        cfg.keyword_weight = -0.1;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let mut cfg = RetrievalConfig::default();
        cfg.semantic_cache_early_exit_threshold = 0.5;
        assert!(cfg.validate().is_err(), "early exit must not sit below the hit threshold");

        let mut cfg = RetrievalConfig::default();
        cfg.cache_max_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn data_paths_are_expanded() {
        Jail::expect_with(|jail| {
            jail.set_env("DOCQA_TEST_ROOT", "/srv/docqa");
            let config = Config::from_figment(Figment::from(Toml::string("[data]\nchunks_dir = \"${DOCQA_TEST_ROOT}/chunks\"\n")));
            let data = config.data().map_err(|e| e.to_string())?;
            assert_eq!(data.chunks_dir, PathBuf::from("/srv/docqa/chunks"));
            assert_eq!(data.lancedb_table, "chunks");
            Ok(())
        });
    }

    #[test]
    fn resolve_relative_against_base() {
        let base = Path::new("/opt/app");
        assert_eq!(resolve_with_base(base, "data"), PathBuf::from("/opt/app/data"));
        assert_eq!(resolve_with_base(base, "/abs"), PathBuf::from("/abs"));
    }
}
