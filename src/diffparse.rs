//! C2: diff parser. Turns the byte stream from
//! `git diff --binary --no-color -U<N> base..new` into ordered
//! [`Leaf`]s, one hunk-header-delimited sweep at a time (spec §4.1).
//! State-machine shape grounded on the teacher's line-oriented
//! `diff.rs::parse_diff`, generalized from "one `FileDiff` per path" to
//! "one `DiffChunk` per hunk" and from `&str` lines to raw bytes so binary
//! content and non-UTF8 paths never get lossily decoded.

use crate::{
   error::{EngineError, Result},
   model::{DiffChunk, Leaf, LineChange, OpaqueHunk},
};

#[derive(Default)]
struct FileHeader {
   old_path:  Option<String>,
   new_path:  Option<String>,
   file_mode: Option<String>,
   is_binary: bool,
}

/// Parse a full `git diff` byte stream into atomic (pre-chunking) leaves.
pub fn parse_diff(bytes: &[u8], base_commit: &str, new_commit: &str) -> Result<Vec<Leaf>> {
   let lines = split_lines(bytes);
   let mut leaves = Vec::new();
   let mut i = 0usize;
   let mut header = FileHeader::default();
   let mut have_header = false;

   while i < lines.len() {
      let line = lines[i];

      if starts_with(line, b"diff --git ") {
         header = parse_diff_git_header(line)?;
         have_header = true;
         i += 1;
         continue;
      }

      if !have_header {
         i += 1;
         continue;
      }

      if starts_with(line, b"new file mode ") {
         header.old_path = None;
         header.file_mode = Some(ascii_tail(line, b"new file mode "));
         i += 1;
      } else if starts_with(line, b"deleted file mode ") {
         header.new_path = None;
         header.file_mode = Some(ascii_tail(line, b"deleted file mode "));
         i += 1;
      } else if starts_with(line, b"old mode ") || starts_with(line, b"new mode ") {
         header.file_mode = Some(ascii_tail(line, b"new mode ").max(ascii_tail(line, b"old mode ")));
         i += 1;
      } else if starts_with(line, b"index ") {
         i += 1;
      } else if starts_with(line, b"Binary files ") || starts_with(line, b"GIT binary patch") {
         header.is_binary = true;
         let canonical = header
            .new_path
            .clone()
            .or_else(|| header.old_path.clone())
            .unwrap_or_default();
         // Collect the opaque body verbatim until the next `diff --git` or EOF.
         let start = i;
         i += 1;
         while i < lines.len() && !starts_with(lines[i], b"diff --git ") {
            i += 1;
         }
         let body = join_lines(&lines[start..i]);
         leaves.push(Leaf::Opaque(OpaqueHunk { canonical_path: canonical, patch_bytes: body }));
         have_header = false;
      } else if starts_with(line, b"--- ") {
         header.old_path = parse_path_marker(line, b"--- ");
         i += 1;
      } else if starts_with(line, b"+++ ") {
         header.new_path = parse_path_marker(line, b"+++ ");
         i += 1;
      } else if starts_with(line, b"@@ ") {
         let (old_start, old_len, new_start, new_len, consumed) = parse_hunk_header(line)?;
         i += 1;
         let body_start = i;
         while i < lines.len() && !starts_with(lines[i], b"@@ ") && !starts_with(lines[i], b"diff --git ")
         {
            i += 1;
         }
         let _ = (old_len, new_len, consumed);
         let chunk = build_chunk(&header, &lines[body_start..i], old_start, new_start, base_commit, new_commit)?;
         leaves.push(Leaf::Chunk(chunk));
      } else {
         // similarity index / rename from / rename to / copy from / copy to /
         // other informational header lines.
         i += 1;
      }
   }

   Ok(leaves)
}

fn build_chunk(
   header: &FileHeader,
   body: &[&[u8]],
   old_start: usize,
   new_start: usize,
   base_commit: &str,
   new_commit: &str,
) -> Result<DiffChunk> {
   let mut lines = Vec::new();
   let mut old_line = old_start;
   let mut new_line = new_start;
   let mut contains_newline_fallback = false;

   for raw in body {
      if raw.is_empty() {
         // context line with trailing whitespace stripped by the splitter
         old_line += 1;
         new_line += 1;
         continue;
      }
      match raw[0] {
         b'+' => {
            lines.push(LineChange::Addition { content: raw[1..].to_vec(), new_line });
            new_line += 1;
         },
         b'-' => {
            lines.push(LineChange::Removal { content: raw[1..].to_vec(), old_line });
            old_line += 1;
         },
         b' ' => {
            old_line += 1;
            new_line += 1;
         },
         b'\\' => {
            contains_newline_fallback = true;
         },
         _ => {
            return Err(EngineError::DiffParse(format!(
               "unexpected hunk body byte {:?}",
               raw[0] as char
            )));
         },
      }
   }

   Ok(DiffChunk {
      base_commit: base_commit.to_string(),
      new_commit: new_commit.to_string(),
      old_path: header.old_path.clone(),
      new_path: header.new_path.clone(),
      file_mode: header.file_mode.clone(),
      lines,
      old_start,
      contains_newline_fallback,
   })
}

fn parse_diff_git_header(line: &[u8]) -> Result<FileHeader> {
   let text = String::from_utf8_lossy(line);
   let rest = text.strip_prefix("diff --git ").ok_or_else(|| {
      EngineError::DiffParse("malformed diff --git header".to_string())
   })?;
   // rest looks like "a/<path> b/<path>"; paths may themselves contain
   // spaces, so split on the last unambiguous " b/" marker.
   let Some(idx) = rest.find(" b/") else {
      return Err(EngineError::DiffParse(format!("malformed diff --git header: {rest}")));
   };
   let a_part = &rest[..idx];
   let b_part = &rest[idx + 3..];
   let old_path = a_part.strip_prefix("a/").unwrap_or(a_part).to_string();
   let new_path = b_part.to_string();
   Ok(FileHeader {
      old_path: Some(old_path),
      new_path: Some(new_path),
      file_mode: None,
      is_binary: false,
   })
}

fn parse_path_marker(line: &[u8], prefix: &[u8]) -> Option<String> {
   let text = String::from_utf8_lossy(&line[prefix.len()..]);
   let text = text.trim_end_matches('\t');
   if text == "/dev/null" {
      return None;
   }
   Some(text.strip_prefix("a/").or_else(|| text.strip_prefix("b/")).unwrap_or(text).to_string())
}

/// Parse `@@ -a,b +c,d @@` (omitted `,b`/`,d` default to 1, per spec §4.1).
fn parse_hunk_header(line: &[u8]) -> Result<(usize, usize, usize, usize, usize)> {
   let text = String::from_utf8_lossy(line);
   let bad = || EngineError::DiffParse(format!("malformed hunk header: {text}"));
   let body = text.strip_prefix("@@ ").ok_or_else(bad)?;
   let end = body.find(" @@").ok_or_else(bad)?;
   let coords = &body[..end];
   let mut parts = coords.split_whitespace();
   let old_part = parts.next().ok_or_else(bad)?.strip_prefix('-').ok_or_else(bad)?;
   let new_part = parts.next().ok_or_else(bad)?.strip_prefix('+').ok_or_else(bad)?;
   let (old_start, old_len) = parse_range(old_part).ok_or_else(bad)?;
   let (new_start, new_len) = parse_range(new_part).ok_or_else(bad)?;
   Ok((old_start, old_len, new_start, new_len, end))
}

fn parse_range(part: &str) -> Option<(usize, usize)> {
   if let Some((start, len)) = part.split_once(',') {
      Some((start.parse().ok()?, len.parse().ok()?))
   } else {
      Some((part.parse().ok()?, 1))
   }
}

fn starts_with(line: &[u8], prefix: &[u8]) -> bool {
   line.len() >= prefix.len() && &line[..prefix.len()] == prefix
}

fn ascii_tail(line: &[u8], prefix: &[u8]) -> String {
   if !starts_with(line, prefix) {
      return String::new();
   }
   String::from_utf8_lossy(&line[prefix.len()..]).trim().to_string()
}

fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
   let mut out = Vec::new();
   let mut start = 0usize;
   for (idx, &b) in bytes.iter().enumerate() {
      if b == b'\n' {
         let mut end = idx;
         if end > start && bytes[end - 1] == b'\r' {
            end -= 1;
         }
         out.push(&bytes[start..end]);
         start = idx + 1;
      }
   }
   if start < bytes.len() {
      out.push(&bytes[start..]);
   }
   out
}

fn join_lines(lines: &[&[u8]]) -> Vec<u8> {
   let mut out = Vec::new();
   for (i, l) in lines.iter().enumerate() {
      if i > 0 {
         out.push(b'\n');
      }
      out.extend_from_slice(l);
   }
   out
}

/// Cross-checks `--numstat` output (`-\t-\t<path>` for binaries) against the
/// parsed leaves; used by callers that want an extra binary-detection
/// signal beyond the inline `Binary files ... differ` marker (spec §4.1).
pub fn binary_paths_from_numstat(numstat: &str) -> Vec<String> {
   numstat
      .lines()
      .filter_map(|line| {
         let mut cols = line.split('\t');
         let added = cols.next()?;
         let removed = cols.next()?;
         let path = cols.next()?;
         (added == "-" && removed == "-").then(|| path.to_string())
      })
      .collect()
}

#[cfg(test)]
mod tests {
   use super::*;

   fn chunk_leaves(bytes: &[u8]) -> Vec<Leaf> {
      parse_diff(bytes, "base", "new").unwrap()
   }

   #[test]
   fn parses_simple_modification() {
      let diff = b"diff --git a/a.txt b/a.txt\nindex 111..222 100644\n--- a/a.txt\n+++ \
                    b/a.txt\n@@ -1,1 +1,2 @@\n one\n+two\n";
      let leaves = chunk_leaves(diff);
      assert_eq!(leaves.len(), 1);
      let Leaf::Chunk(c) = &leaves[0] else { panic!("expected chunk") };
      assert_eq!(c.canonical_path(), "a.txt");
      assert_eq!(c.additions(), 1);
      assert_eq!(c.removals(), 0);
   }

   #[test]
   fn parses_file_addition() {
      let diff = b"diff --git a/new.txt b/new.txt\nnew file mode 100644\nindex \
                    000..123 100644\n--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,2 @@\n+one\n+two\n";
      let leaves = chunk_leaves(diff);
      let Leaf::Chunk(c) = &leaves[0] else { panic!("expected chunk") };
      assert!(c.is_file_addition());
      assert_eq!(c.additions(), 2);
   }

   #[test]
   fn parses_binary_as_opaque() {
      let diff = b"diff --git a/logo.png b/logo.png\nindex 123..456 100644\nBinary files \
                    a/logo.png and b/logo.png differ\n";
      let leaves = chunk_leaves(diff);
      assert_eq!(leaves.len(), 1);
      assert!(matches!(leaves[0], Leaf::Opaque(_)));
   }

   #[test]
   fn parses_rename_with_single_hunk() {
      let diff = b"diff --git a/old.py b/new.py\nsimilarity index 90%\nrename from \
                    old.py\nrename to new.py\nindex 111..222 100644\n--- a/old.py\n+++ \
                    b/new.py\n@@ -5,1 +5,1 @@\n-x = 1\n+x = 2\n";
      let leaves = chunk_leaves(diff);
      assert_eq!(leaves.len(), 1);
      let Leaf::Chunk(c) = &leaves[0] else { panic!("expected chunk") };
      assert!(c.is_rename());
      assert_eq!(c.old_path.as_deref(), Some("old.py"));
      assert_eq!(c.new_path.as_deref(), Some("new.py"));
   }

   #[test]
   fn rejects_malformed_hunk_header() {
      let diff = b"diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ garbage @@\n+x\n";
      assert!(parse_diff(diff, "base", "new").is_err());
   }

   #[test]
   fn binary_paths_detected_from_numstat() {
      let numstat = "1\t2\ta.txt\n-\t-\tlogo.png\n";
      assert_eq!(binary_paths_from_numstat(numstat), vec!["logo.png".to_string()]);
   }
}
