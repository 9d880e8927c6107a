//! C7: context manager. Derives the demand set from a chunk list, batches
//! blob reads through C1/C5, parses each demanded `(path, commit)` once,
//! and memoizes the result for the lifetime of one command (spec §4.4).
//! Grounded on `scope_mapper.py` + `models.py::AnalysisContext` for the
//! per-(path,commit) memoization contract.

use std::{collections::HashMap, path::Path};

use crate::{
   ast::{self, ParsedFile},
   error::Result,
   git::GitRepo,
   model::Leaf,
};

pub struct ContextManager {
   contexts: HashMap<(String, String), Option<ParsedFile>>,
}

impl ContextManager {
   pub fn empty() -> Self {
      Self { contexts: HashMap::new() }
   }

   /// Build the demand set from `leaves`, batch-read blobs via `repo`, and
   /// parse each one. Demands: removal -> (old_path, base); addition ->
   /// (new_path, target); file addition only demands (new_path, target);
   /// deletion only demands (old_path, base).
   pub fn build(
      repo: &GitRepo,
      leaves: &[Leaf],
      base: &str,
      target: &str,
      query_config_dir: Option<&Path>,
   ) -> Result<Self> {
      let mut ranges: HashMap<(String, String), Vec<(usize, usize)>> = HashMap::new();

      for leaf in leaves {
         let Leaf::Chunk(chunk) = leaf else { continue };

         if let Some(path) = &chunk.old_path {
            if let Some((lo, hi)) = chunk.old_range() {
               ranges.entry((path.clone(), base.to_string())).or_default().push((lo, hi));
            } else if chunk.is_file_deletion() {
               ranges.entry((path.clone(), base.to_string())).or_default();
            }
         }
         if let Some(path) = &chunk.new_path {
            if let Some((lo, hi)) = chunk.new_range() {
               ranges.entry((path.clone(), target.to_string())).or_default().push((lo, hi));
            } else if chunk.is_file_addition() {
               ranges.entry((path.clone(), target.to_string())).or_default();
            }
         }
      }

      let demands: Vec<(String, String)> = ranges.keys().cloned().collect();
      let blobs = repo.read_blobs_batch(&demands)?;

      let mut contexts = HashMap::new();
      for (key, line_ranges) in ranges {
         let merged = merge_ranges(line_ranges);
         let parsed = match blobs.get(&key) {
            Some(bytes) => ast::parse_and_analyze_with_config(&key.0, bytes, &merged, query_config_dir)?,
            None => None,
         };
         contexts.insert(key, parsed);
      }

      Ok(Self { contexts })
   }

   pub fn has_context(&self, path: &str, commit: &str) -> bool {
      self.contexts.get(&(path.to_string(), commit.to_string())).is_some_and(Option::is_some)
   }

   pub fn get(&self, path: &str, commit: &str) -> Option<&ParsedFile> {
      self.contexts.get(&(path.to_string(), commit.to_string()))?.as_ref()
   }

   pub fn is_pure_comment_line(&self, path: &str, commit: &str, line: usize) -> bool {
      self.get(path, commit).is_some_and(|p| p.pure_comment_lines.contains(&line))
   }

   /// Qualified symbols defined/referenced on `line` in `(path, commit)`'s
   /// context, or empty lists if there is no context for that file.
   pub fn symbols_at(&self, path: &str, commit: &str, line: usize) -> (Vec<String>, Vec<String>) {
      let Some(parsed) = self.get(path, commit) else { return (Vec::new(), Vec::new()) };
      (
         parsed.defined_symbols.get(&line).cloned().unwrap_or_default(),
         parsed.referenced_symbols.get(&line).cloned().unwrap_or_default(),
      )
   }
}

fn merge_ranges(mut ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
   if ranges.is_empty() {
      return ranges;
   }
   ranges.sort_unstable();
   let mut merged = vec![ranges[0]];
   for &(lo, hi) in &ranges[1..] {
      let last = merged.last_mut().unwrap();
      if lo <= last.1 + 1 {
         last.1 = last.1.max(hi);
      } else {
         merged.push((lo, hi));
      }
   }
   merged
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn merge_ranges_coalesces_adjacent_and_overlapping() {
      let merged = merge_ranges(vec![(1, 3), (4, 6), (10, 12), (11, 15)]);
      assert_eq!(merged, vec![(1, 6), (10, 15)]);
   }

   #[test]
   fn empty_context_has_no_contexts() {
      let ctx = ContextManager::empty();
      assert!(!ctx.has_context("a.rs", "abc"));
   }
}
