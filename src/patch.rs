//! C12: patch generator. Two output modes over the same `Container`:
//! `unified_diff` produces bytewise-applicable `git apply` input; `semantic_diff`
//! produces a human/LLM-readable rendering, never used for application.
//! Grounded on the teacher's existing `patch.rs` (unified-diff shaped text
//! output) for the bytewise mode, and on
//! `original_source/.../diff_generation/semantic_diff_generator.py` for the
//! semantic mode's `### MODIFIED FILE:` / `Line N:` format.

use std::collections::BTreeMap;

use crate::model::{Container, DiffChunk, Leaf, LineChange, OpaqueHunk};

/// Group a container's chunk leaves by canonical path, each file's chunks
/// ordered by `old_start` (spec §4.8: "merged into one `diff --git` block
/// with multiple hunks ordered by old_start").
fn chunks_by_file(container: &Container) -> BTreeMap<String, Vec<&DiffChunk>> {
   let mut map: BTreeMap<String, Vec<&DiffChunk>> = BTreeMap::new();
   for leaf in container.leaves() {
      if let Leaf::Chunk(c) = leaf {
         map.entry(c.canonical_path().to_string()).or_default().push(c);
      }
   }
   for chunks in map.values_mut() {
      chunks.sort_by_key(|c| (c.old_start, c.min_addition_line()));
   }
   map
}

fn opaque_hunks(container: &Container) -> Vec<&OpaqueHunk> {
   container
      .leaves()
      .into_iter()
      .filter_map(|l| match l {
         Leaf::Opaque(o) => Some(o),
         Leaf::Chunk(_) => None,
      })
      .collect()
}

/// Strip trailing tabs from a path before it lands in a header line (spec
/// §4.8 sanitization rule).
fn sanitize_path(path: &str) -> &str {
   path.trim_end_matches('\t')
}

fn git_path(path: &str) -> String {
   format!("a/{}", sanitize_path(path))
}

fn git_path_new(path: &str) -> String {
   format!("b/{}", sanitize_path(path))
}

/// `,count` is omitted by real Git when `count == 1`; always shown
/// otherwise (including `,0`).
fn format_range(start: usize, count: usize) -> String {
   if count == 1 { format!("{start}") } else { format!("{start},{count}") }
}

/// Render one `DiffChunk`'s body (the `@@ ... @@` header plus `+`/`-`
/// lines) into `out`. `delta_before` is the cumulative old→new line offset
/// contributed by earlier hunks in this file, used to place the new-side
/// start when the chunk carries no addition lines of its own.
fn render_hunk(out: &mut Vec<u8>, chunk: &DiffChunk, delta_before: i64) {
   let old_count = chunk.removals();
   let new_count = chunk.additions();
   let new_start = match chunk.new_range() {
      Some((lo, _)) => lo,
      None => (chunk.old_start as i64 + delta_before).max(0) as usize,
   };

   out.extend_from_slice(
      format!("@@ -{} +{} @@\n", format_range(chunk.old_start, old_count), format_range(new_start, new_count))
         .as_bytes(),
   );
   for line in &chunk.lines {
      match line {
         LineChange::Removal { content, .. } => {
            out.push(b'-');
            out.extend_from_slice(content);
            out.push(b'\n');
         },
         LineChange::Addition { content, .. } => {
            out.push(b'+');
            out.extend_from_slice(content);
            out.push(b'\n');
         },
      }
   }
   if chunk.contains_newline_fallback {
      out.extend_from_slice(b"\\ No newline at end of file\n");
   }
}

fn render_file_block(out: &mut Vec<u8>, path: &str, chunks: &[&DiffChunk]) {
   let first = chunks[0];
   let old_path = first.old_path.as_deref();
   let new_path = first.new_path.as_deref();

   let header_old = old_path.unwrap_or(path);
   let header_new = new_path.unwrap_or(path);
   out.extend_from_slice(format!("diff --git {} {}\n", git_path(header_old), git_path_new(header_new)).as_bytes());

   if first.is_rename() {
      out.extend_from_slice(format!("rename from {}\n", sanitize_path(old_path.unwrap())).as_bytes());
      out.extend_from_slice(format!("rename to {}\n", sanitize_path(new_path.unwrap())).as_bytes());
   }
   if first.is_file_addition() {
      out.extend_from_slice(format!("new file mode {}\n", first.file_mode.as_deref().unwrap_or("100644")).as_bytes());
   }
   if first.is_file_deletion() {
      out.extend_from_slice(
         format!("deleted file mode {}\n", first.file_mode.as_deref().unwrap_or("100644")).as_bytes(),
      );
   }

   out.extend_from_slice(format!("--- {}\n", old_path.map_or("/dev/null".to_string(), git_path)).as_bytes());
   out.extend_from_slice(format!("+++ {}\n", new_path.map_or("/dev/null".to_string(), git_path_new)).as_bytes());

   let mut delta = 0i64;
   for chunk in chunks {
      render_hunk(out, chunk, delta);
      delta += chunk.additions() as i64 - chunk.removals() as i64;
   }
}

/// Render every file touched by `container` as one bytewise-exact unified
/// diff suitable for `git apply --cached`.
pub fn unified_diff(container: &Container) -> Vec<u8> {
   unified_diff_shifted(container, &BTreeMap::new())
}

/// As [`unified_diff`], but first shifts each file's hunks by
/// `deltas[path]` — the net line-count change already applied to that path
/// by earlier groups synthesized in this run. The chunker's hunks carry
/// zero context and line numbers relative to the original base commit, so
/// once a second group touches a file a prior group already changed, those
/// numbers no longer match the tree the patch is actually applied against
/// (`apply_one_group` applies sequentially onto the previous group's
/// tree, not onto the base). `orchestrator::synthesize` accumulates
/// `deltas` across groups and passes it here so every hunk lands on the
/// tree's real current line, not base `B`'s.
pub fn unified_diff_shifted(container: &Container, deltas: &BTreeMap<String, i64>) -> Vec<u8> {
   let mut out = Vec::new();
   for (path, chunks) in chunks_by_file(container) {
      let shift = deltas.get(&path).copied().unwrap_or(0);
      let shifted: Vec<DiffChunk> = chunks
         .into_iter()
         .map(|c| {
            let mut c = c.clone();
            c.old_start = (c.old_start as i64 + shift).max(0) as usize;
            c
         })
         .collect();
      let refs: Vec<&DiffChunk> = shifted.iter().collect();
      render_file_block(&mut out, &path, &refs);
   }
   for opaque in opaque_hunks(container) {
      out.extend_from_slice(&opaque.patch_bytes);
      if !opaque.patch_bytes.ends_with(b"\n") {
         out.push(b'\n');
      }
   }
   out
}

/// Net old→new line-count change `container` contributes to each path it
/// touches, for `orchestrator::synthesize` to fold into its running
/// `deltas` map after this group is committed.
pub fn net_deltas(container: &Container) -> BTreeMap<String, i64> {
   let mut out = BTreeMap::new();
   for (path, chunks) in chunks_by_file(container) {
      let net: i64 = chunks.iter().map(|c| c.additions() as i64 - c.removals() as i64).sum();
      out.insert(path, net);
   }
   out
}

/// Human-readable rendering of `container` for display or LLM prompts.
/// Never used for patch application. Grounded on
/// `SemanticDiffGenerator.generate_diff` (`semantic_diff_generator.py`).
pub fn semantic_diff(container: &Container) -> String {
   let mut out = String::new();
   for (path, chunks) in chunks_by_file(container) {
      let first = chunks[0];
      let old_path = first.old_path.clone().unwrap_or_else(|| "dev/null".to_string());
      let new_path = first.new_path.clone().unwrap_or_else(|| "dev/null".to_string());

      if first.is_rename() {
         out.push_str(&format!("### RENAMED FILE: {old_path} -> {new_path}\n"));
      } else if chunks.iter().all(|c| c.is_file_deletion()) {
         out.push_str(&format!("### DELETED FILE: {old_path}\n"));
      } else if chunks.iter().all(|c| c.is_file_addition()) {
         out.push_str(&format!("### NEW FILE: {new_path}\n"));
      } else {
         out.push_str(&format!("### MODIFIED FILE: {path}\n"));
      }

      for (i, chunk) in chunks.iter().enumerate() {
         if chunk.lines.is_empty() {
            continue;
         }
         if i > 0 {
            out.push_str("...\n");
         }
         out.push_str(&format!("Line {}:\n", chunk.old_start));
         for line in &chunk.lines {
            match line {
               LineChange::Removal { content, .. } => {
                  out.push_str("- ");
                  out.push_str(String::from_utf8_lossy(content).trim_end());
                  out.push('\n');
               },
               LineChange::Addition { content, .. } => {
                  out.push_str("+ ");
                  out.push_str(String::from_utf8_lossy(content).trim_end());
                  out.push('\n');
               },
            }
         }
      }
   }

   for opaque in opaque_hunks(container) {
      out.push_str(&format!("### BINARY FILE: {}\n", opaque.canonical_path));
   }
   out
}

/// Preview used by the relevance filter / logical grouper prompts: the
/// semantic diff of a single container, tagged with its assigned id.
pub fn patch_preview(container: &Container, _id: usize) -> String {
   semantic_diff(container)
}

#[cfg(test)]
mod tests {
   use super::*;

   fn addition(path: &str, new_line: usize, content: &str) -> DiffChunk {
      DiffChunk {
         base_commit: "base".into(),
         new_commit: "new".into(),
         old_path: Some(path.into()),
         new_path: Some(path.into()),
         file_mode: None,
         lines: vec![LineChange::Addition { content: content.as_bytes().to_vec(), new_line }],
         old_start: new_line.saturating_sub(1).max(1),
         contains_newline_fallback: false,
      }
   }

   fn removal(path: &str, old_line: usize, content: &str) -> DiffChunk {
      DiffChunk {
         base_commit: "base".into(),
         new_commit: "new".into(),
         old_path: Some(path.into()),
         new_path: Some(path.into()),
         file_mode: None,
         lines: vec![LineChange::Removal { content: content.as_bytes().to_vec(), old_line }],
         old_start: old_line,
         contains_newline_fallback: false,
      }
   }

   #[test]
   fn unified_diff_renders_single_addition_hunk() {
      let container = Container::from_chunk(addition("src/lib.rs", 5, "fn foo() {}"));
      let text = String::from_utf8(unified_diff(&container)).unwrap();
      assert!(text.contains("diff --git a/src/lib.rs b/src/lib.rs"));
      assert!(text.contains("+fn foo() {}"));
      assert!(text.contains("@@ -4,0 +5 @@"));
   }

   #[test]
   fn whole_file_addition_emits_new_file_mode_and_dev_null_old_side() {
      let mut chunk = addition("new.rs", 1, "fn main() {}");
      chunk.old_path = None;
      let container = Container::from_chunk(chunk);
      let text = String::from_utf8(unified_diff(&container)).unwrap();
      assert!(text.contains("new file mode 100644"));
      assert!(text.contains("--- /dev/null"));
      assert!(text.contains("+++ b/new.rs"));
   }

   #[test]
   fn rename_emits_rename_headers() {
      let mut chunk = removal("old.py", 5, "x = 1");
      chunk.new_path = Some("new.py".into());
      chunk.lines.push(LineChange::Addition { content: b"x = 2".to_vec(), new_line: 5 });
      let container = Container::from_chunk(chunk);
      let text = String::from_utf8(unified_diff(&container)).unwrap();
      assert!(text.contains("rename from old.py"));
      assert!(text.contains("rename to new.py"));
   }

   #[test]
   fn multiple_chunks_same_file_merge_into_one_block_sorted_by_old_start() {
      let container =
         Container::from_chunk(addition("a.rs", 20, "late")).merge(Container::from_chunk(addition("a.rs", 2, "early")));
      let text = String::from_utf8(unified_diff(&container)).unwrap();
      assert_eq!(text.matches("diff --git").count(), 1);
      let early_pos = text.find("early").unwrap();
      let late_pos = text.find("late").unwrap();
      assert!(early_pos < late_pos);
   }

   #[test]
   fn semantic_diff_uses_line_header_and_sign_prefixes() {
      let container = Container::from_chunk(removal("a.rs", 3, "old_code()"));
      let text = semantic_diff(&container);
      assert!(text.contains("### MODIFIED FILE: a.rs"));
      assert!(text.contains("Line 3:"));
      assert!(text.contains("- old_code()"));
   }

   #[test]
   fn opaque_leaf_becomes_binary_file_marker_in_semantic_diff() {
      let container = Container::from_opaque(OpaqueHunk {
         canonical_path: "img.png".into(),
         patch_bytes: b"Binary files a/img.png and b/img.png differ\n".to_vec(),
      });
      let text = semantic_diff(&container);
      assert!(text.contains("### BINARY FILE: img.png"));
      let raw = unified_diff(&container);
      assert!(String::from_utf8(raw).unwrap().contains("Binary files a/img.png and b/img.png differ"));
   }

   #[test]
   fn shifted_diff_moves_hunk_header_by_the_given_delta() {
      let container = Container::from_chunk(addition("a.rs", 5, "fn foo() {}"));
      let mut deltas = BTreeMap::new();
      deltas.insert("a.rs".to_string(), 2i64);
      let text = String::from_utf8(unified_diff_shifted(&container, &deltas)).unwrap();
      assert!(text.contains("@@ -6,0 +5 @@"), "old_start 4 shifted by +2 should read 6: {text}");
   }

   #[test]
   fn net_deltas_reports_additions_minus_removals_per_path() {
      let container =
         Container::from_chunk(addition("a.rs", 1, "one")).merge(Container::from_chunk(addition("a.rs", 2, "two")));
      let deltas = net_deltas(&container);
      assert_eq!(deltas.get("a.rs"), Some(&2));
   }

   #[test]
   fn format_range_omits_count_when_one() {
      assert_eq!(format_range(5, 1), "5");
      assert_eq!(format_range(5, 0), "5,0");
      assert_eq!(format_range(5, 3), "5,3");
   }
}
