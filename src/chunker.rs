//! C4: atomic chunker. Splits pure-addition or pure-removal chunks so that
//! each emitted piece contains at least one non-context (non-blank,
//! non-comment) line, merging trailing context into the preceding piece
//! (spec §4.2). Grounded on
//! `original_source/src/codestory/core/diff/creation/atomic_chunker.py`.

use crate::{
   context::ContextManager,
   model::{DiffChunk, Leaf, LineChange},
};

/// How aggressively the chunker splits hunks before semantic grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum ChunkingLevel {
   /// No splitting; hunks pass through as-is.
   None,
   /// Split only within files that are wholly additions or deletions.
   #[default]
   FullFiles,
   /// Split any eligible pure-add/pure-remove chunk, regardless of file.
   AllFiles,
}

/// Run the chunker over a parsed leaf list.
pub fn chunk(leaves: Vec<Leaf>, level: ChunkingLevel, contexts: &ContextManager) -> Vec<Leaf> {
   if level == ChunkingLevel::None {
      return leaves;
   }

   let mut out = Vec::with_capacity(leaves.len());
   for leaf in leaves {
      match leaf {
         Leaf::Opaque(o) => out.push(Leaf::Opaque(o)),
         Leaf::Chunk(c) => {
            if is_eligible(&c, level) {
               out.extend(split_chunk(c, contexts).into_iter().map(Leaf::Chunk));
            } else {
               out.push(Leaf::Chunk(c));
            }
         },
      }
   }
   out
}

/// Mixed add/remove hunks are true replacements and must not be cleaved
/// (spec §4.2). Under `FullFiles`, additionally require the chunk to
/// represent a whole-file add/delete; a pure-addition hunk inside an
/// otherwise-modified file must pass through untouched.
fn is_eligible(chunk: &DiffChunk, level: ChunkingLevel) -> bool {
   let has_add = chunk.lines.iter().any(LineChange::is_addition);
   let has_rem = chunk.lines.iter().any(|l| !l.is_addition());
   if has_add == has_rem {
      return false;
   }
   match level {
      ChunkingLevel::None => false,
      ChunkingLevel::FullFiles => chunk.is_file_addition() || chunk.is_file_deletion(),
      ChunkingLevel::AllFiles => true,
   }
}

fn is_context_line(line: &LineChange, contexts: &ContextManager, chunk: &DiffChunk) -> bool {
   let text = String::from_utf8_lossy(line.content());
   if text.trim().is_empty() {
      return true;
   }
   let (path, commit, lineno) = if line.is_addition() {
      (chunk.new_path.as_deref(), chunk.new_commit.as_str(), line.new_line())
   } else {
      (chunk.old_path.as_deref(), chunk.base_commit.as_str(), line.old_line())
   };
   let Some(path) = path else { return false };
   contexts.is_pure_comment_line(path, commit, lineno)
}

fn split_chunk(chunk: DiffChunk, contexts: &ContextManager) -> Vec<DiffChunk> {
   let mut pieces = Vec::new();
   let mut pending: Vec<LineChange> = Vec::new();

   for line in chunk.lines {
      if is_context_line(&line, contexts, &chunk) {
         pending.push(line);
      } else {
         pending.push(line);
         pieces.push(std::mem::take(&mut pending));
      }
   }

   if pieces.is_empty() {
      // The whole hunk was context; keep it as a single piece.
      return vec![rebuild(&chunk, pending)];
   }

   if !pending.is_empty() {
      // Trailing context merges into the last emitted piece.
      pieces.last_mut().unwrap().extend(pending);
   }

   pieces.into_iter().map(|lines| rebuild(&chunk, lines)).collect()
}

fn rebuild(template: &DiffChunk, lines: Vec<LineChange>) -> DiffChunk {
   let old_start = lines
      .iter()
      .find_map(|l| (!l.is_addition()).then(|| l.old_line()))
      .unwrap_or(template.old_start);

   // Open Question 1 (DESIGN.md): the newline-fallback marker propagates
   // only onto the split that contains the original hunk's last physical
   // line, identified here as the split holding the highest line number.
   let is_last_split = lines.iter().any(|l| {
      let no = if l.is_addition() { l.new_line() } else { l.old_line() };
      let template_max = template
         .lines
         .iter()
         .map(|tl| if tl.is_addition() { tl.new_line() } else { tl.old_line() })
         .max()
         .unwrap_or(0);
      no == template_max
   });

   DiffChunk {
      base_commit: template.base_commit.clone(),
      new_commit: template.new_commit.clone(),
      old_path: template.old_path.clone(),
      new_path: template.new_path.clone(),
      file_mode: template.file_mode.clone(),
      lines,
      old_start,
      contains_newline_fallback: is_last_split && template.contains_newline_fallback,
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::model::OpaqueHunk;

   fn add(content: &str, new_line: usize) -> LineChange {
      LineChange::Addition { content: content.as_bytes().to_vec(), new_line }
   }

   fn make_chunk(lines: Vec<LineChange>, old_start: usize) -> DiffChunk {
      DiffChunk {
         base_commit: "base".into(),
         new_commit: "new".into(),
         old_path: None,
         new_path: Some("a.rs".into()),
         file_mode: None,
         lines,
         old_start,
         contains_newline_fallback: false,
      }
   }

   #[test]
   fn opaque_leaves_pass_through_untouched() {
      let leaves = vec![Leaf::Opaque(OpaqueHunk {
         canonical_path: "logo.png".into(),
         patch_bytes: vec![1, 2, 3],
      })];
      let contexts = ContextManager::empty();
      let out = chunk(leaves, ChunkingLevel::AllFiles, &contexts);
      assert_eq!(out.len(), 1);
      assert!(matches!(out[0], Leaf::Opaque(_)));
   }

   #[test]
   fn pure_addition_splits_on_code_lines() {
      let lines = vec![add("", 1), add("fn foo() {}", 2), add("", 3), add("fn bar() {}", 4)];
      let chunk_in = make_chunk(lines, 1);
      let contexts = ContextManager::empty();
      let out = chunk(vec![Leaf::Chunk(chunk_in)], ChunkingLevel::AllFiles, &contexts);
      assert_eq!(out.len(), 2);
   }

   #[test]
   fn full_files_level_does_not_split_addition_in_modified_file() {
      let lines = vec![add("fn foo() {}", 2), add("fn bar() {}", 4)];
      let mut chunk_in = make_chunk(lines, 1);
      chunk_in.old_path = Some("a.rs".into()); // modified, not added, file
      let contexts = ContextManager::empty();
      let out = chunk(vec![Leaf::Chunk(chunk_in)], ChunkingLevel::FullFiles, &contexts);
      assert_eq!(out.len(), 1, "a pure-addition hunk inside a modified file must pass through under full_files");
   }

   #[test]
   fn full_files_level_splits_a_whole_file_addition() {
      let lines = vec![add("fn foo() {}", 1), add("fn bar() {}", 2)];
      let chunk_in = make_chunk(lines, 1); // old_path is None: whole-file addition
      let contexts = ContextManager::empty();
      let out = chunk(vec![Leaf::Chunk(chunk_in)], ChunkingLevel::FullFiles, &contexts);
      assert_eq!(out.len(), 2);
   }

   #[test]
   fn mixed_add_remove_hunk_is_not_split() {
      let lines = vec![
         LineChange::Removal { content: b"old".to_vec(), old_line: 1 },
         add("new", 1),
      ];
      let chunk_in = make_chunk(lines, 1);
      let contexts = ContextManager::empty();
      let out = chunk(vec![Leaf::Chunk(chunk_in)], ChunkingLevel::AllFiles, &contexts);
      assert_eq!(out.len(), 1);
   }
}
