//! §9 layered configuration. Grounded on the teacher's
//! `CommitConfig::load/from_file/apply_env_overrides/default_config_path`
//! (same four-call shape, same "only touch fields a layer actually sets"
//! discipline) generalized into an explicit `Provenance` per field instead
//! of silent overwrite, per the redesign flag calling for traceable
//! layering.

use std::{collections::HashMap, path::{Path, PathBuf}};

use serde::Deserialize;

use crate::{
   chunker::ChunkingLevel,
   embedding::EmbeddingSettings,
   error::{EngineError, Result},
   filters::Aggression,
   grouper::FallbackStrategy,
   llm::LlmSettings,
   logical_grouper::GroupingMode,
};

/// Where a resolved field's value actually came from, highest-precedence
/// layer first (spec §9: CLI > custom config > local config > env >
/// user-global config > default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
   Cli,
   CustomConfig,
   LocalConfig,
   Env,
   UserGlobal,
   Default,
}

/// Every field optional: a config file (or, in principle, a CLI-overrides
/// struct) only sets what it names, and `apply_layer` only stamps those.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
   chunking_level:                  Option<ChunkingLevel>,
   fallback_strategy:               Option<FallbackStrategy>,
   aggression:                      Option<Aggression>,
   grouping_mode:                   Option<GroupingMode>,
   min_commit_size:                 Option<usize>,
   llm_api_base_url:                Option<String>,
   llm_api_key:                     Option<String>,
   llm_model:                       Option<String>,
   llm_request_timeout_secs:        Option<u64>,
   llm_connect_timeout_secs:        Option<u64>,
   llm_temperature:                 Option<f32>,
   llm_max_retries:                 Option<u32>,
   llm_initial_backoff_ms:          Option<u64>,
   embedding_api_base_url:          Option<String>,
   embedding_api_key:               Option<String>,
   embedding_model:                 Option<String>,
   embedding_request_timeout_secs:  Option<u64>,
   embedding_connect_timeout_secs:  Option<u64>,
   language_query_config_dir:       Option<PathBuf>,
   llm_batch_concurrency:           Option<usize>,
   diff_context_lines:              Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
   pub chunking_level:     ChunkingLevel,
   pub fallback_strategy:  FallbackStrategy,
   pub aggression:         Aggression,
   pub grouping_mode:      GroupingMode,
   pub min_commit_size:    usize,

   pub llm_api_base_url:         String,
   pub llm_api_key:              Option<String>,
   pub llm_model:                String,
   pub llm_request_timeout_secs: u64,
   pub llm_connect_timeout_secs: u64,
   pub llm_temperature:          f32,
   pub llm_max_retries:          u32,
   pub llm_initial_backoff_ms:   u64,

   pub embedding_api_base_url:         String,
   pub embedding_api_key:              Option<String>,
   pub embedding_model:                String,
   pub embedding_request_timeout_secs: u64,
   pub embedding_connect_timeout_secs: u64,

   /// Directory overriding the bundled tree-sitter query config (§6
   /// Language config), one JSON file per language.
   pub language_query_config_dir: Option<PathBuf>,

   /// How many LLM/embedding calls a single batch may issue concurrently
   /// (spec §5: "bounded-concurrency batches (configurable; default
   /// serial)").
   pub llm_batch_concurrency: usize,

   pub diff_context_lines: u32,
}

impl Default for EngineConfig {
   fn default() -> Self {
      Self {
         chunking_level:     ChunkingLevel::AllFiles,
         fallback_strategy:  FallbackStrategy::ByFilePath,
         aggression:         Aggression::Standard,
         grouping_mode:      GroupingMode::SingleCall,
         min_commit_size:    0,

         llm_api_base_url:         "http://localhost:4000".to_string(),
         llm_api_key:              None,
         llm_model:                "claude-sonnet-4.5".to_string(),
         llm_request_timeout_secs: 120,
         llm_connect_timeout_secs: 30,
         llm_temperature:          0.2,
         llm_max_retries:          3,
         llm_initial_backoff_ms:   1000,

         embedding_api_base_url:         "http://localhost:4000".to_string(),
         embedding_api_key:              None,
         embedding_model:                "text-embedding-3-small".to_string(),
         embedding_request_timeout_secs: 60,
         embedding_connect_timeout_secs: 30,

         language_query_config_dir: None,
         llm_batch_concurrency:     1,
         diff_context_lines:        3,
      }
   }
}

impl EngineConfig {
   pub fn llm_settings(&self) -> LlmSettings {
      LlmSettings {
         api_base_url:         self.llm_api_base_url.clone(),
         api_key:              self.llm_api_key.clone(),
         model:                self.llm_model.clone(),
         request_timeout_secs: self.llm_request_timeout_secs,
         connect_timeout_secs: self.llm_connect_timeout_secs,
         temperature:          self.llm_temperature,
         max_retries:          self.llm_max_retries,
         initial_backoff_ms:   self.llm_initial_backoff_ms,
      }
   }

   pub fn embedding_settings(&self) -> EmbeddingSettings {
      EmbeddingSettings {
         api_base_url:         self.embedding_api_base_url.clone(),
         api_key:              self.embedding_api_key.clone(),
         model:                self.embedding_model.clone(),
         request_timeout_secs: self.embedding_request_timeout_secs,
         connect_timeout_secs: self.embedding_connect_timeout_secs,
      }
   }
}

/// A resolved config plus a provenance stamp per field that was actually
/// set by something other than the compiled-in default.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
   pub value:      EngineConfig,
   pub provenance: HashMap<&'static str, Provenance>,
}

impl ResolvedConfig {
   /// Build the default-only resolution (every field's provenance is
   /// `Default`); layers are then applied on top via `apply_*`.
   pub fn defaults() -> Self {
      Self { value: EngineConfig::default(), provenance: HashMap::new() }
   }

   fn stamp(&mut self, field: &'static str, provenance: Provenance) {
      self.provenance.insert(field, provenance);
   }

   /// Merge a parsed TOML layer in, stamping every field the layer actually
   /// names. Mirrors the teacher's "only touch what's present" discipline
   /// but across the whole field set instead of two hardcoded env vars.
   fn apply_layer(&mut self, layer: ConfigLayer, provenance: Provenance) {
      macro_rules! merge_field {
         ($field:ident) => {
            if let Some(v) = layer.$field {
               self.value.$field = v;
               self.stamp(stringify!($field), provenance);
            }
         };
      }
      merge_field!(chunking_level);
      merge_field!(fallback_strategy);
      merge_field!(aggression);
      merge_field!(grouping_mode);
      merge_field!(min_commit_size);
      merge_field!(llm_api_base_url);
      merge_field!(llm_api_key);
      merge_field!(llm_model);
      merge_field!(llm_request_timeout_secs);
      merge_field!(llm_connect_timeout_secs);
      merge_field!(llm_temperature);
      merge_field!(llm_max_retries);
      merge_field!(llm_initial_backoff_ms);
      merge_field!(embedding_api_base_url);
      merge_field!(embedding_api_key);
      merge_field!(embedding_model);
      merge_field!(embedding_request_timeout_secs);
      merge_field!(embedding_connect_timeout_secs);
      merge_field!(llm_batch_concurrency);
      merge_field!(diff_context_lines);

      if let Some(dir) = layer.language_query_config_dir {
         self.value.language_query_config_dir = Some(dir);
         self.stamp("language_query_config_dir", provenance);
      }
   }

   fn apply_file(&mut self, path: &Path, provenance: Provenance) -> Result<()> {
      if !path.exists() {
         return Ok(());
      }
      let contents = std::fs::read_to_string(path)
         .map_err(|e| EngineError::ValidationInput(format!("failed to read config {}: {e}", path.display())))?;
      let layer: ConfigLayer = toml::from_str(&contents)
         .map_err(|e| EngineError::ValidationInput(format!("failed to parse config {}: {e}", path.display())))?;
      self.apply_layer(layer, provenance);
      Ok(())
   }

   /// `GITLOOM_*` env vars, mirroring the teacher's `LLM_GIT_*` convention.
   fn apply_env(&mut self) {
      if let Ok(v) = std::env::var("GITLOOM_LLM_API_URL") {
         self.value.llm_api_base_url = v;
         self.stamp("llm_api_base_url", Provenance::Env);
      }
      if let Ok(v) = std::env::var("GITLOOM_LLM_API_KEY") {
         self.value.llm_api_key = Some(v);
         self.stamp("llm_api_key", Provenance::Env);
      }
      if let Ok(v) = std::env::var("GITLOOM_LLM_MODEL") {
         self.value.llm_model = v;
         self.stamp("llm_model", Provenance::Env);
      }
      if let Ok(v) = std::env::var("GITLOOM_EMBEDDING_API_KEY") {
         self.value.embedding_api_key = Some(v);
         self.stamp("embedding_api_key", Provenance::Env);
      }
   }

   pub fn user_global_config_path() -> Option<PathBuf> {
      let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok()?;
      Some(PathBuf::from(home).join(".gitloom/config.toml"))
   }

   pub fn local_config_path(repo_dir: &Path) -> PathBuf {
      repo_dir.join(".gitloom.toml")
   }

   /// Resolve all layers in precedence order (lowest first, so later calls
   /// win and stamp provenance over earlier ones): user-global, env, local,
   /// custom config, CLI.
   pub fn load(repo_dir: &Path, custom_config: Option<&Path>) -> Result<Self> {
      let mut resolved = Self::defaults();

      if let Some(path) = Self::user_global_config_path() {
         resolved.apply_file(&path, Provenance::UserGlobal)?;
      }
      resolved.apply_env();
      resolved.apply_file(&Self::local_config_path(repo_dir), Provenance::LocalConfig)?;
      if let Some(path) = custom_config {
         resolved.apply_file(path, Provenance::CustomConfig)?;
      }
      Ok(resolved)
   }

   /// Top layer of the precedence chain: flags the user passed directly on
   /// the command line. Every field left `None` here leaves the layers
   /// beneath it untouched.
   pub fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
      macro_rules! merge {
         ($field:ident) => {
            if let Some(v) = overrides.$field {
               self.value.$field = v;
               self.stamp(stringify!($field), Provenance::Cli);
            }
         };
      }
      merge!(chunking_level);
      merge!(fallback_strategy);
      merge!(aggression);
      merge!(grouping_mode);
      merge!(min_commit_size);
   }
}

/// CLI-flag overrides, the highest-precedence config layer (spec §9: CLI >
/// custom config > local config > env > user-global config > default).
#[derive(Debug, Default)]
pub struct CliOverrides {
   pub chunking_level:    Option<ChunkingLevel>,
   pub fallback_strategy: Option<FallbackStrategy>,
   pub aggression:        Option<Aggression>,
   pub grouping_mode:     Option<GroupingMode>,
   pub min_commit_size:   Option<usize>,
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn defaults_have_no_provenance_entries() {
      let resolved = ResolvedConfig::defaults();
      assert!(resolved.provenance.is_empty());
      assert_eq!(resolved.value.min_commit_size, 0);
   }

   #[test]
   fn local_config_layer_stamps_only_fields_it_sets() {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join(".gitloom.toml"), "min_commit_size = 5\n").unwrap();

      let mut resolved = ResolvedConfig::defaults();
      resolved.apply_file(&ResolvedConfig::local_config_path(dir.path()), Provenance::LocalConfig).unwrap();

      assert_eq!(resolved.value.min_commit_size, 5);
      assert_eq!(resolved.provenance.get("min_commit_size"), Some(&Provenance::LocalConfig));
      assert!(resolved.provenance.get("llm_model").is_none());
   }

   #[test]
   fn custom_config_overrides_local_config() {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join(".gitloom.toml"), "min_commit_size = 5\n").unwrap();
      let custom = dir.path().join("custom.toml");
      std::fs::write(&custom, "min_commit_size = 20\n").unwrap();

      let resolved = ResolvedConfig::load(dir.path(), Some(&custom)).unwrap();
      assert_eq!(resolved.value.min_commit_size, 20);
      assert_eq!(resolved.provenance.get("min_commit_size"), Some(&Provenance::CustomConfig));
   }

   #[test]
   fn cli_override_wins_over_every_file_layer() {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join(".gitloom.toml"), "min_commit_size = 5\n").unwrap();

      let mut resolved = ResolvedConfig::load(dir.path(), None).unwrap();
      resolved.apply_cli_overrides(CliOverrides { min_commit_size: Some(99), ..Default::default() });

      assert_eq!(resolved.value.min_commit_size, 99);
      assert_eq!(resolved.provenance.get("min_commit_size"), Some(&Provenance::Cli));
   }
}
