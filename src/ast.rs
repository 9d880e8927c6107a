//! C6: AST/query layer. Four query kinds per language — scope, token
//! definition, token reference, comment — each a list of tree-sitter
//! pattern strings with named captures (spec §4.3). Grammar set and the
//! by-extension language dispatch are grounded on
//! `CryptArtificer-booger/src/index/chunker.rs::get_language`; the
//! query-catalog idea (named capture → qualified symbol) is grounded on
//! `original_source/.../semantic_grouper/scope_mapper.py`.

use std::{collections::HashMap, path::Path};

use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator as _, Tree};

use crate::{
   error::{EngineError, Result},
   templates,
};

/// One scope in the arena built for a parsed file (spec §3 "Scope").
/// Referenced by index, not by pointer, per the §9 redesign flag.
#[derive(Debug, Clone)]
pub struct Scope {
   pub id:         usize,
   pub kind:       ScopeKind,
   pub name:       Option<String>,
   pub start_line: usize,
   pub end_line:   usize,
   pub parent:     Option<usize>,
   pub children:   Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
   Function,
   Class,
   Method,
   Namespace,
   Block,
   Module,
}

/// Query patterns for one language, keyed by the four kinds the spec
/// names. Owned (rather than `&'static str`) since it may come from a
/// user's `~/.gitloom/queries/<lang>.json` or `--custom-config` override,
/// not just the embedded default (§C).
pub struct LanguageConfig {
   pub scope:              Vec<(String, ScopeKind)>,
   pub token_definition:   Vec<String>,
   pub token_reference:    Vec<String>,
   pub comment_node_kinds: Vec<String>,
}

fn language_for_extension(path: &str) -> Option<(&'static str, Language)> {
   let ext = path.rsplit('.').next()?.to_ascii_lowercase();
   match ext.as_str() {
      "rs" => Some(("rust", tree_sitter_rust::LANGUAGE.into())),
      "py" => Some(("python", tree_sitter_python::LANGUAGE.into())),
      "js" | "jsx" | "mjs" | "cjs" => Some(("javascript", tree_sitter_javascript::LANGUAGE.into())),
      "ts" => Some(("typescript", tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())),
      "tsx" => Some(("typescript", tree_sitter_typescript::LANGUAGE_TSX.into())),
      "go" => Some(("go", tree_sitter_go::LANGUAGE.into())),
      "c" | "h" => Some(("c", tree_sitter_c::LANGUAGE.into())),
      "sh" | "bash" => Some(("bash", tree_sitter_bash::LANGUAGE.into())),
      "json" => Some(("json", tree_sitter_json::LANGUAGE.into())),
      "toml" => Some(("toml", tree_sitter_toml_ng::LANGUAGE.into())),
      "yaml" | "yml" => Some(("yaml", tree_sitter_yaml::LANGUAGE.into())),
      _ => None,
   }
}

fn parse_scope_kind(name: &str) -> Option<ScopeKind> {
   match name {
      "Function" => Some(ScopeKind::Function),
      "Class" => Some(ScopeKind::Class),
      "Method" => Some(ScopeKind::Method),
      "Namespace" => Some(ScopeKind::Namespace),
      "Block" => Some(ScopeKind::Block),
      "Module" => Some(ScopeKind::Module),
      _ => None,
   }
}

/// Resolve `lang`'s query catalog from `override_dir` / the user's unpacked
/// `~/.gitloom/queries/` / the embedded default, falling back to an empty
/// (comment-detection-only) catalog if nothing defines the language.
fn load_config(lang: &str, override_dir: Option<&Path>) -> LanguageConfig {
   let Some(raw) = templates::load_language_query_config(lang, override_dir) else {
      return LanguageConfig {
         scope:              Vec::new(),
         token_definition:   Vec::new(),
         token_reference:    Vec::new(),
         comment_node_kinds: vec!["comment".to_string()],
      };
   };
   LanguageConfig {
      scope:              raw
         .scope
         .into_iter()
         .filter_map(|(pattern, kind)| parse_scope_kind(&kind).map(|k| (pattern, k)))
         .collect(),
      token_definition:   raw.token_definition,
      token_reference:    raw.token_reference,
      comment_node_kinds: raw.comment_node_kinds,
   }
}

/// Parsed AST plus the derived scope arena, symbol maps, and pure-comment
/// line set for one `(path, commit)` (spec §4.4's per-demand output).
pub struct ParsedFile {
   pub tree:               Tree,
   pub language:           &'static str,
   pub scopes:             Vec<Scope>,
   /// line -> enclosing scope ids, outermost first.
   pub scope_map:          HashMap<usize, Vec<usize>>,
   /// line -> qualified symbol tokens defined on that line.
   pub defined_symbols:    HashMap<usize, Vec<String>>,
   /// line -> qualified symbol tokens referenced on that line.
   pub referenced_symbols: HashMap<usize, Vec<String>>,
   pub pure_comment_lines: std::collections::HashSet<usize>,
   source:                 Vec<u8>,
}

impl ParsedFile {
   pub fn source(&self) -> &[u8] {
      &self.source
   }

   /// Enclosing FQNs for a 1-based line, innermost last.
   pub fn fqns_for_line(&self, line: usize) -> Vec<crate::model::Fqn> {
      let Some(ids) = self.scope_map.get(&line) else { return Vec::new() };
      ids
         .iter()
         .filter_map(|id| self.scopes.get(*id))
         .filter_map(|s| {
            s.name.clone().map(|name| crate::model::Fqn { kind: format!("{:?}", s.kind), name })
         })
         .collect()
   }
}

/// Parse `source` as `path`'s language (by extension) and build its
/// scope/symbol/comment maps restricted to `line_ranges` (1-based,
/// inclusive); returns `None` if the language is unrecognized or parsing
/// fails, matching spec §4.4's "unknown -> no context" rule.
pub fn parse_and_analyze(
   path: &str,
   source: &[u8],
   line_ranges: &[(usize, usize)],
) -> Result<Option<ParsedFile>> {
   parse_and_analyze_with_config(path, source, line_ranges, None)
}

/// As [`parse_and_analyze`], but resolving query config through
/// `override_dir` first (spec §C `--custom-config`).
pub fn parse_and_analyze_with_config(
   path: &str,
   source: &[u8],
   line_ranges: &[(usize, usize)],
   override_dir: Option<&Path>,
) -> Result<Option<ParsedFile>> {
   let Some((lang_name, language)) = language_for_extension(path) else { return Ok(None) };

   let mut parser = Parser::new();
   parser
      .set_language(&language)
      .map_err(|e| EngineError::Other(format!("tree-sitter language load failed: {e}")))?;

   let Some(tree) = parser.parse(source, None) else { return Ok(None) };
   let config = load_config(lang_name, override_dir);
   let root = tree.root_node();

   let mut scopes = Vec::new();
   build_scopes(root, None, &config, source, &mut scopes);

   let mut scope_map: HashMap<usize, Vec<usize>> = HashMap::new();
   for scope in &scopes {
      for line in scope.start_line..=scope.end_line {
         if in_ranges(line, line_ranges) {
            scope_map.entry(line).or_default().push(scope.id);
         }
      }
   }

   let mut defined_symbols = run_symbol_query(&tree, &language, source, &config.token_definition, line_ranges);
   let mut referenced_symbols =
      run_symbol_query(&tree, &language, source, &config.token_reference, line_ranges);
   let pure_comment_lines = find_pure_comment_lines(root, source, &config.comment_node_kinds, line_ranges);

   // spec §4.4 step 3: a parse error overlapping a chunk's line range means
   // that range has no reliable context. Drop it from every derived map
   // rather than trusting a tree built around an ERROR node.
   let error_lines = find_error_lines(root, line_ranges);
   if !error_lines.is_empty() {
      scope_map.retain(|line, _| !error_lines.contains(line));
      defined_symbols.retain(|line, _| !error_lines.contains(line));
      referenced_symbols.retain(|line, _| !error_lines.contains(line));
   }

   Ok(Some(ParsedFile {
      tree,
      language: lang_name,
      scopes,
      scope_map,
      defined_symbols,
      referenced_symbols,
      pure_comment_lines,
      source: source.to_vec(),
   }))
}

fn in_ranges(line: usize, ranges: &[(usize, usize)]) -> bool {
   ranges.is_empty() || ranges.iter().any(|&(a, b)| line >= a && line <= b)
}

fn build_scopes(node: Node, parent: Option<usize>, config: &LanguageConfig, source: &[u8], out: &mut Vec<Scope>) {
   let kind_str = node.kind();
   let matched = config.scope.iter().find_map(|(pattern, kind)| {
      pattern.contains(&format!("({kind_str})")).then_some(*kind)
   });

   let my_id = if let Some(kind) = matched {
      let name = node
         .child_by_field_name("name")
         .and_then(|n| n.utf8_text(source).ok())
         .map(str::to_string);
      let id = out.len();
      out.push(Scope {
         id,
         kind,
         name,
         start_line: node.start_position().row + 1,
         end_line: node.end_position().row + 1,
         parent,
         children: Vec::new(),
      });
      if let Some(p) = parent {
         out[p].children.push(id);
      }
      Some(id)
   } else {
      None
   };

   let next_parent = my_id.or(parent);
   let mut cursor = node.walk();
   for child in node.children(&mut cursor) {
      build_scopes(child, next_parent, config, source, out);
   }
}

/// Lines covered by a tree-sitter `ERROR` node, restricted to `line_ranges`.
fn find_error_lines(root: Node, line_ranges: &[(usize, usize)]) -> std::collections::HashSet<usize> {
   let mut lines = std::collections::HashSet::new();
   let mut stack = vec![root];
   while let Some(node) = stack.pop() {
      if node.is_error() || node.is_missing() {
         let start = node.start_position().row + 1;
         let end = node.end_position().row + 1;
         for line in start..=end {
            if in_ranges(line, line_ranges) {
               lines.insert(line);
            }
         }
      }
      let mut cursor = node.walk();
      for child in node.children(&mut cursor) {
         stack.push(child);
      }
   }
   lines
}

fn run_symbol_query(
   tree: &Tree,
   language: &Language,
   source: &[u8],
   patterns: &[String],
   line_ranges: &[(usize, usize)],
) -> HashMap<usize, Vec<String>> {
   let mut out: HashMap<usize, Vec<String>> = HashMap::new();
   for pattern in patterns {
      let Ok(query) = Query::new(language, pattern) else { continue };
      let mut cursor = QueryCursor::new();
      let mut matches = cursor.matches(&query, tree.root_node(), source);
      while let Some(m) = matches.next() {
         for capture in m.captures {
            let node = capture.node;
            let line = node.start_position().row + 1;
            if !in_ranges(line, line_ranges) {
               continue;
            }
            let capture_name = &query.capture_names()[capture.index as usize];
            let text = node.utf8_text(source).unwrap_or_default();
            out.entry(line).or_default().push(format!("{capture_name}:{text}"));
         }
      }
   }
   out
}

fn find_pure_comment_lines(
   root: Node,
   source: &[u8],
   comment_kinds: &[String],
   line_ranges: &[(usize, usize)],
) -> std::collections::HashSet<usize> {
   let mut lines = std::collections::HashSet::new();
   let mut stack = vec![root];
   while let Some(node) = stack.pop() {
      if comment_kinds.iter().any(|k| k == node.kind()) {
         let start = node.start_position().row + 1;
         let end = node.end_position().row + 1;
         for line in start..=end {
            if in_ranges(line, line_ranges) {
               lines.insert(line);
            }
         }
      }
      let mut cursor = node.walk();
      for child in node.children(&mut cursor) {
         stack.push(child);
      }
   }
   lines
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn parses_rust_and_finds_function_scope() {
      let source = b"fn foo() {\n    let x = 1;\n}\n";
      let parsed = parse_and_analyze("a.rs", source, &[]).unwrap().unwrap();
      assert_eq!(parsed.language, "rust");
      assert!(parsed.scopes.iter().any(|s| s.kind == ScopeKind::Function));
   }

   #[test]
   fn unknown_extension_yields_no_context() {
      let parsed = parse_and_analyze("a.unknownlang", b"whatever", &[]).unwrap();
      assert!(parsed.is_none());
   }

   #[test]
   fn comment_lines_are_found() {
      let source = b"// a comment\nfn foo() {}\n";
      let parsed = parse_and_analyze("a.rs", source, &[]).unwrap().unwrap();
      assert!(parsed.pure_comment_lines.contains(&1));
      assert!(!parsed.pure_comment_lines.contains(&2));
   }

   #[test]
   fn scope_name_is_the_symbol_text_not_the_node_kind() {
      let source = b"fn foo() {\n    let x = 1;\n}\nfn bar() {\n    let y = 2;\n}\n";
      let parsed = parse_and_analyze("a.rs", source, &[]).unwrap().unwrap();
      let names: std::collections::HashSet<_> =
         parsed.scopes.iter().filter_map(|s| s.name.as_deref()).collect();
      assert!(names.contains("foo"));
      assert!(names.contains("bar"));
      assert!(!names.contains("identifier"));
   }

   #[test]
   fn error_node_suppresses_context_on_its_lines() {
      // unbalanced brace: tree-sitter recovers with an ERROR node covering
      // the rest of the file, including line 1's otherwise-valid scope.
      let source = b"fn foo( {\n    let x = 1;\n";
      let parsed = parse_and_analyze("a.rs", source, &[]).unwrap().unwrap();
      assert!(parsed.scope_map.get(&1).is_none_or(Vec::is_empty));
   }
}
