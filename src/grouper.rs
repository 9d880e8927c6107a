//! C9: semantic grouper. Two passes per spec §4.5:
//!
//! 1. Context grouping, within each file independently: comment/blank-only
//!    containers accumulate into the next code-bearing container.
//! 2. Signature grouping: union-find over valid-signature containers that
//!    share a symbol or overlapping FQN; invalid-signature containers are
//!    routed to a fallback strategy.
//!
//! Union-find grounded on `original_source/.../union_find.py` (path
//! compression + union by rank).

use std::collections::HashMap;

use crate::{context::ContextManager, labeler, model::{Container, Leaf}};

/// How containers with no valid signature are grouped (spec §4.5 "fallback
/// strategy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum FallbackStrategy {
   #[default]
   AllTogether,
   ByFilePath,
   ByFileName,
   ByFileExtension,
   AllAlone,
}

/// Pass 1: within each file (processed independently), merge runs of
/// comment/blank-only containers into the following code-bearing one;
/// trailing comment-only containers attach to the last emitted composite
/// or become their own sole composite if the whole file was comment-only.
pub fn context_group(leaves: Vec<Leaf>, contexts: &ContextManager) -> Vec<Container> {
   let mut by_file: HashMap<String, Vec<Leaf>> = HashMap::new();
   let mut order: Vec<String> = Vec::new();
   for leaf in leaves {
      let path = leaf.canonical_path().to_string();
      if !by_file.contains_key(&path) {
         order.push(path.clone());
      }
      by_file.entry(path).or_default().push(leaf);
   }

   let mut out = Vec::new();
   for path in order {
      let mut leaves = by_file.remove(&path).unwrap();
      leaves.sort_by_key(sort_key);

      let mut pending: Vec<Container> = Vec::new();
      let mut emitted: Vec<Container> = Vec::new();
      for leaf in leaves {
         let is_context_only = is_context_only_leaf(&leaf, contexts);
         let container = Container::Atomic(leaf);
         if is_context_only {
            pending.push(container);
         } else {
            let merged = pending.drain(..).fold(container, Container::merge);
            emitted.push(merged);
         }
      }
      if !pending.is_empty() {
         if let Some(last) = emitted.pop() {
            let merged = pending.drain(..).fold(last, Container::merge);
            emitted.push(merged);
         } else {
            let mut iter = pending.drain(..);
            let first = iter.next().unwrap();
            emitted.push(iter.fold(first, Container::merge));
         }
      }
      out.extend(emitted);
   }
   out
}

fn sort_key(leaf: &Leaf) -> (usize, usize) {
   match leaf {
      Leaf::Chunk(c) => (c.old_start, c.min_addition_line()),
      Leaf::Opaque(_) => (0, 0),
   }
}

fn is_context_only_leaf(leaf: &Leaf, contexts: &ContextManager) -> bool {
   let Leaf::Chunk(chunk) = leaf else { return false };
   chunk.lines.iter().all(|line| {
      let text = String::from_utf8_lossy(line.content());
      if text.trim().is_empty() {
         return true;
      }
      let (path, commit, lineno) = if line.is_addition() {
         (chunk.new_path.as_deref(), chunk.new_commit.as_str(), line.new_line())
      } else {
         (chunk.old_path.as_deref(), chunk.base_commit.as_str(), line.old_line())
      };
      path.is_some_and(|p| contexts.is_pure_comment_line(p, commit, lineno))
   })
}

struct UnionFind {
   parent: Vec<usize>,
   rank:   Vec<usize>,
}

impl UnionFind {
   fn new(n: usize) -> Self {
      Self { parent: (0..n).collect(), rank: vec![0; n] }
   }

   fn find(&mut self, x: usize) -> usize {
      if self.parent[x] != x {
         self.parent[x] = self.find(self.parent[x]);
      }
      self.parent[x]
   }

   fn union(&mut self, a: usize, b: usize) {
      let (ra, rb) = (self.find(a), self.find(b));
      if ra == rb {
         return;
      }
      if self.rank[ra] < self.rank[rb] {
         self.parent[ra] = rb;
      } else if self.rank[ra] > self.rank[rb] {
         self.parent[rb] = ra;
      } else {
         self.parent[rb] = ra;
         self.rank[ra] += 1;
      }
   }
}

/// Pass 2: union containers whose signatures overlap; route invalid
/// ones through `fallback`. Binary/opaque containers never participate in
/// signature analysis and always go to the fallback pool (spec §4.5 edge
/// policy).
pub fn signature_group(
   containers: Vec<Container>,
   contexts: &ContextManager,
   fallback: FallbackStrategy,
) -> Vec<Container> {
   let signatures: Vec<_> = containers.iter().map(|c| labeler::label(c, contexts)).collect();
   let mut uf = UnionFind::new(containers.len());

   let valid_indices: Vec<usize> = signatures
      .iter()
      .enumerate()
      .filter(|(_, s)| s.is_valid())
      .map(|(i, _)| i)
      .collect();

   for &i in &valid_indices {
      for &j in &valid_indices {
         if i < j && signatures[i].overlaps(&signatures[j]) {
            uf.union(i, j);
         }
      }
   }

   let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
   for &i in &valid_indices {
      let root = uf.find(i);
      groups.entry(root).or_default().push(i);
   }

   let invalid_indices: Vec<usize> =
      (0..containers.len()).filter(|i| !valid_indices.contains(i)).collect();
   let fallback_groups = route_fallback(&containers, &invalid_indices, fallback);

   let mut containers: Vec<Option<Container>> = containers.into_iter().map(Some).collect();
   let mut out = Vec::new();

   for indices in groups.into_values() {
      let merged = indices
         .into_iter()
         .filter_map(|i| containers[i].take())
         .reduce(Container::merge);
      if let Some(c) = merged {
         out.push(c);
      }
   }

   for indices in fallback_groups {
      let merged = indices
         .into_iter()
         .filter_map(|i| containers[i].take())
         .reduce(Container::merge);
      if let Some(c) = merged {
         out.push(c);
      }
   }

   out
}

fn route_fallback(
   containers: &[Container],
   indices: &[usize],
   strategy: FallbackStrategy,
) -> Vec<Vec<usize>> {
   match strategy {
      FallbackStrategy::AllTogether => {
         if indices.is_empty() { Vec::new() } else { vec![indices.to_vec()] }
      },
      FallbackStrategy::AllAlone => indices.iter().map(|&i| vec![i]).collect(),
      FallbackStrategy::ByFilePath => bucket_by(containers, indices, |c| c.canonical_paths().into_iter().collect::<Vec<_>>().join(",")),
      FallbackStrategy::ByFileName => bucket_by(containers, indices, |c| {
         c.canonical_paths()
            .into_iter()
            .next()
            .and_then(|p| p.rsplit('/').next().map(ToString::to_string))
            .unwrap_or_default()
      }),
      FallbackStrategy::ByFileExtension => bucket_by(containers, indices, |c| {
         c.canonical_paths()
            .into_iter()
            .next()
            .map(|p| extension_key(&p))
            .unwrap_or_default()
      }),
   }
}

/// Open Question 2 (DESIGN.md): a dotfile's extension key is the literal
/// string after the leading dot (`.gitignore` -> `"gitignore"`), not empty.
fn extension_key(path: &str) -> String {
   let name = path.rsplit('/').next().unwrap_or(path);
   if let Some(rest) = name.strip_prefix('.') {
      if !rest.contains('.') {
         return rest.to_string();
      }
   }
   name.rsplit_once('.').map_or_else(String::new, |(_, ext)| ext.to_string())
}

fn bucket_by(containers: &[Container], indices: &[usize], key_fn: impl Fn(&Container) -> String) -> Vec<Vec<usize>> {
   let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
   for &i in indices {
      buckets.entry(key_fn(&containers[i])).or_default().push(i);
   }
   buckets.into_values().collect()
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn extension_key_treats_dotfile_suffix_as_extension() {
      assert_eq!(extension_key(".gitignore"), "gitignore");
      assert_eq!(extension_key("src/main.rs"), "rs");
      assert_eq!(extension_key("Makefile"), "");
   }

   #[test]
   fn all_together_fallback_produces_one_group() {
      let containers = vec![
         Container::from_opaque(crate::model::OpaqueHunk { canonical_path: "a.png".into(), patch_bytes: vec![] }),
         Container::from_opaque(crate::model::OpaqueHunk { canonical_path: "b.png".into(), patch_bytes: vec![] }),
      ];
      let groups = route_fallback(&containers, &[0, 1], FallbackStrategy::AllTogether);
      assert_eq!(groups.len(), 1);
      assert_eq!(groups[0].len(), 2);
   }
}
