//! §C language config asset bundling. Grounded on the teacher's own
//! `templates.rs` (RustEmbed folder + unpack-to-home-dir + user-override
//! precedence), generalized from Tera prompt templates to the four-query-kind
//! tree-sitter config JSON that `ast.rs` consults per language (spec §6).

use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Embedded default query config (compiled into the binary).
#[derive(RustEmbed)]
#[folder = "queries/"]
struct Queries;

/// One language's query catalog, as stored in `queries/<lang>.json`. Mirrors
/// `ast::LanguageConfig` but with owned strings so it can come from disk, and
/// with scope kinds as their JSON names rather than the `ScopeKind` enum.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageQueryConfig {
   pub scope:              Vec<(String, String)>,
   #[serde(default)]
   pub token_definition:   Vec<String>,
   #[serde(default)]
   pub token_reference:    Vec<String>,
   #[serde(default)]
   pub comment_node_kinds: Vec<String>,
}

/// Determine the user query directory (`~/.gitloom/queries/`) if a home dir
/// exists.
fn get_user_queries_dir() -> Option<PathBuf> {
   std::env::var("HOME")
      .or_else(|_| std::env::var("USERPROFILE"))
      .ok()
      .map(|home| PathBuf::from(home).join(".gitloom").join("queries"))
}

/// Unpack embedded query config into `~/.gitloom/queries/` if missing, or if
/// its content differs from the bundled default. Does nothing when no home
/// dir is resolvable; callers fall back to the embedded copy in that case.
pub fn ensure_queries_dir() -> Result<()> {
   let Some(user_queries_dir) = get_user_queries_dir() else { return Ok(()) };

   std::fs::create_dir_all(&user_queries_dir).map_err(|e| {
      EngineError::ValidationInput(format!(
         "failed to create directory {}: {e}",
         user_queries_dir.display()
      ))
   })?;

   for file in Queries::iter() {
      let file_path = user_queries_dir.join(file.as_ref());
      let Some(embedded_file) = Queries::get(file.as_ref()) else { continue };
      let embedded_content = embedded_file.data;

      let should_write = match std::fs::read(&file_path) {
         Ok(existing) => existing != embedded_content.as_ref(),
         Err(_) => true,
      };
      if should_write {
         std::fs::write(&file_path, embedded_content.as_ref()).map_err(|e| {
            EngineError::ValidationInput(format!("failed to write file {}: {e}", file_path.display()))
         })?;
      }
   }

   Ok(())
}

/// Resolve `<lang>.json` in precedence order: `--custom-config` override
/// directory, then the unpacked user directory, then the embedded default.
/// Returns `None` if no layer defines the language at all (spec §4.4's
/// "unrecognized language -> no context").
pub fn load_language_query_config(lang: &str, override_dir: Option<&Path>) -> Option<LanguageQueryConfig> {
   let file_name = format!("{lang}.json");

   if let Some(dir) = override_dir {
      let path = dir.join(&file_name);
      if let Ok(contents) = std::fs::read_to_string(&path) {
         if let Ok(config) = serde_json::from_str(&contents) {
            return Some(config);
         }
      }
   }

   if let Some(user_dir) = get_user_queries_dir() {
      let path = user_dir.join(&file_name);
      if let Ok(contents) = std::fs::read_to_string(&path) {
         if let Ok(config) = serde_json::from_str(&contents) {
            return Some(config);
         }
      }
   }

   let embedded = Queries::get(&file_name)?;
   serde_json::from_slice(embedded.data.as_ref()).ok()
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn embedded_rust_config_parses() {
      let config = load_language_query_config("rust", None).expect("rust.json is bundled");
      assert!(config.scope.iter().any(|(_, kind)| kind == "Function"));
      assert!(config.comment_node_kinds.contains(&"line_comment".to_string()));
   }

   #[test]
   fn unknown_language_returns_none() {
      assert!(load_language_query_config("cobol", None).is_none());
   }

   #[test]
   fn override_dir_takes_precedence_over_embedded_default() {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(
         dir.path().join("rust.json"),
         r#"{"scope": [["(mod_item) @scope", "Module"]], "comment_node_kinds": []}"#,
      )
      .unwrap();

      let config = load_language_query_config("rust", Some(dir.path())).unwrap();
      assert_eq!(config.scope.len(), 1);
      assert!(config.comment_node_kinds.is_empty());
   }
}
