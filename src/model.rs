//! Data model of §3: line changes, diff chunks, containers, signatures,
//! commit groups. Grounded on
//! `original_source/.../data/composite_diff_chunk.py` (container aggregation)
//! and `original_source/.../data/hunk_wrapper.py` (chunk/hunk invariants).

use std::collections::BTreeSet;

/// A single added or removed line within a hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
   Addition { content: Vec<u8>, new_line: usize },
   Removal { content: Vec<u8>, old_line: usize },
}

impl LineChange {
   pub fn content(&self) -> &[u8] {
      match self {
         Self::Addition { content, .. } | Self::Removal { content, .. } => content,
      }
   }

   pub const fn old_line(&self) -> usize {
      match self {
         Self::Removal { old_line, .. } => *old_line,
         Self::Addition { .. } => 0,
      }
   }

   pub const fn new_line(&self) -> usize {
      match self {
         Self::Addition { new_line, .. } => *new_line,
         Self::Removal { .. } => 0,
      }
   }

   pub const fn is_addition(&self) -> bool {
      matches!(self, Self::Addition { .. })
   }
}

/// A whole-file binary or submodule diff, stored verbatim and never
/// dissected (spec §3 "opaque hunk").
#[derive(Debug, Clone)]
pub struct OpaqueHunk {
   pub canonical_path: String,
   pub patch_bytes:    Vec<u8>,
}

/// Immutable atomic diff unit (spec §3 "Diff chunk").
///
/// Invariants upheld by construction:
/// (i) `lines` is ordered by appearance in the diff;
/// (ii) within a chunk, removal line numbers are contiguous in old-file
///      coordinates and addition line numbers contiguous in new-file
///      coordinates;
/// (iii) a chunk touches exactly one path-pair;
/// (iv) disjointness across chunks on the same old path is checked by the
///      caller (`chunker`/`diffparse`) before write-out, not here.
#[derive(Debug, Clone)]
pub struct DiffChunk {
   pub base_commit: String,
   pub new_commit:  String,
   pub old_path:    Option<String>,
   pub new_path:    Option<String>,
   pub file_mode:   Option<String>,
   pub lines:       Vec<LineChange>,
   pub old_start:   usize,
   /// Whether the source hunk had a "\ No newline at end of file" marker.
   /// See DESIGN.md Open Question 1 for the propagation rule used when a
   /// hunk is split by the atomic chunker.
   pub contains_newline_fallback: bool,
}

impl DiffChunk {
   /// Canonical path for this chunk: new path if present, else old path.
   pub fn canonical_path(&self) -> &str {
      self.new_path
         .as_deref()
         .or(self.old_path.as_deref())
         .unwrap_or("")
   }

   pub fn is_file_addition(&self) -> bool {
      self.old_path.is_none()
   }

   pub fn is_file_deletion(&self) -> bool {
      self.new_path.is_none()
   }

   pub fn is_rename(&self) -> bool {
      match (&self.old_path, &self.new_path) {
         (Some(o), Some(n)) => o != n,
         _ => false,
      }
   }

   /// Old-coordinate (start, end inclusive) range spanned by removals, if any.
   pub fn old_range(&self) -> Option<(usize, usize)> {
      let mut lo = usize::MAX;
      let mut hi = 0usize;
      for l in &self.lines {
         if let LineChange::Removal { old_line, .. } = l {
            lo = lo.min(*old_line);
            hi = hi.max(*old_line);
         }
      }
      (lo <= hi).then_some((lo, hi))
   }

   /// New-coordinate (start, end inclusive) range spanned by additions, if any.
   pub fn new_range(&self) -> Option<(usize, usize)> {
      let mut lo = usize::MAX;
      let mut hi = 0usize;
      for l in &self.lines {
         if let LineChange::Addition { new_line, .. } = l {
            lo = lo.min(*new_line);
            hi = hi.max(*new_line);
         }
      }
      (lo <= hi).then_some((lo, hi))
   }

   /// Minimum addition line, used as the grouper's secondary sort key.
   pub fn min_addition_line(&self) -> usize {
      self.new_range().map_or(usize::MAX, |(lo, _)| lo)
   }

   pub fn additions(&self) -> usize {
      self.lines.iter().filter(|l| l.is_addition()).count()
   }

   pub fn removals(&self) -> usize {
      self.lines.iter().filter(|l| !l.is_addition()).count()
   }
}

/// A leaf chunk or an opaque hunk: the thing containers aggregate.
#[derive(Debug, Clone)]
pub enum Leaf {
   Chunk(DiffChunk),
   Opaque(OpaqueHunk),
}

impl Leaf {
   pub fn canonical_path(&self) -> &str {
      match self {
         Self::Chunk(c) => c.canonical_path(),
         Self::Opaque(o) => &o.canonical_path,
      }
   }

   /// Size used by the min-commit-size grouper: additions+removals, or 1 for
   /// opaque chunks (grounded on `min_commit_size_grouper.py`'s `_SizedGroup`).
   pub fn size(&self) -> usize {
      match self {
         Self::Chunk(c) => (c.additions() + c.removals()).max(1),
         Self::Opaque(_) => 1,
      }
   }
}

/// Either a single leaf (atomic) or an ordered list of sub-containers
/// (composite). Tagged variant per the §9 redesign flag — operations are
/// methods on the enum, never inheritance.
#[derive(Debug, Clone)]
pub enum Container {
   Atomic(Leaf),
   Composite(Vec<Container>),
}

impl Container {
   pub fn from_chunk(chunk: DiffChunk) -> Self {
      Self::Atomic(Leaf::Chunk(chunk))
   }

   pub fn from_opaque(hunk: OpaqueHunk) -> Self {
      Self::Atomic(Leaf::Opaque(hunk))
   }

   /// Flatten any nesting into the leaf list, in order.
   pub fn leaves(&self) -> Vec<&Leaf> {
      match self {
         Self::Atomic(leaf) => vec![leaf],
         Self::Composite(children) => children.iter().flat_map(Self::leaves).collect(),
      }
   }

   /// Aggregated, de-duplicated canonical paths across the tree.
   pub fn canonical_paths(&self) -> BTreeSet<String> {
      self.leaves()
         .into_iter()
         .map(|l| l.canonical_path().to_string())
         .collect()
   }

   /// Aggregated hunk ranges per path: (old_start, old_len, new_start, new_len).
   pub fn hunk_ranges(&self) -> std::collections::HashMap<String, Vec<(usize, usize, usize, usize)>> {
      let mut out: std::collections::HashMap<String, Vec<(usize, usize, usize, usize)>> =
         std::collections::HashMap::new();
      for leaf in self.leaves() {
         if let Leaf::Chunk(c) = leaf {
            let old = c.old_range();
            let new = c.new_range();
            let (old_start, old_len) = old.map_or((c.old_start, 0), |(a, b)| (a, b - a + 1));
            let (new_start, new_len) = new.map_or((0, 0), |(a, b)| (a, b - a + 1));
            out.entry(c.canonical_path().to_string())
               .or_default()
               .push((old_start, old_len, new_start, new_len));
         }
      }
      out
   }

   /// Merge this container with another into a new composite, flattening any
   /// nested composites one level (mirrors `CompositeDiffChunk` semantics,
   /// which never nests composites-of-composites beyond what `leaves()`
   /// already flattens).
   pub fn merge(self, other: Self) -> Self {
      let mut children = Vec::new();
      match self {
         Self::Composite(c) => children.extend(c),
         atomic => children.push(atomic),
      }
      match other {
         Self::Composite(c) => children.extend(c),
         atomic => children.push(atomic),
      }
      Self::Composite(children)
   }

   pub fn total_size(&self) -> usize {
      self.leaves().iter().map(|l| l.size()).sum()
   }

   pub fn has_valid_signature(&self, sig: &Signature) -> bool {
      sig.is_valid()
   }
}

/// Enclosing fully-qualified scope name with its kind, used by `Signature`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fqn {
   pub kind: String,
   pub name: String,
}

impl Fqn {
   pub fn matches_overlap(&self, other: &Self) -> bool {
      self.name == other.name
         || self.name.starts_with(&other.name)
         || other.name.starts_with(&self.name)
         || self.name.ends_with(&other.name)
         || other.name.ends_with(&self.name)
   }
}

/// Set of qualified symbols/scopes one chunk defines and references (spec
/// §3 "Signature").
#[derive(Debug, Clone, Default)]
pub struct Signature {
   pub defined_new:    BTreeSet<String>,
   pub defined_old:    BTreeSet<String>,
   pub referenced_new: BTreeSet<String>,
   pub referenced_old: BTreeSet<String>,
   pub new_fqns:        BTreeSet<Fqn>,
   pub old_fqns:        BTreeSet<Fqn>,
   pub languages:       BTreeSet<String>,
}

impl Signature {
   pub fn is_valid(&self) -> bool {
      !self.defined_new.is_empty()
         || !self.defined_old.is_empty()
         || !self.referenced_new.is_empty()
         || !self.referenced_old.is_empty()
   }

   fn all_symbols(&self) -> impl Iterator<Item = &String> {
      self
         .defined_new
         .iter()
         .chain(self.defined_old.iter())
         .chain(self.referenced_new.iter())
         .chain(self.referenced_old.iter())
   }

   /// Two signatures overlap if any symbol name appears in both, or any FQN
   /// in one is a prefix/suffix/equal of an FQN in the other.
   pub fn overlaps(&self, other: &Self) -> bool {
      for sym in self.all_symbols() {
         if other.all_symbols().any(|s| s == sym) {
            return true;
         }
      }
      let my_fqns = self.new_fqns.iter().chain(self.old_fqns.iter());
      let other_fqns: Vec<&Fqn> = other.new_fqns.iter().chain(other.old_fqns.iter()).collect();
      for f in my_fqns {
         if other_fqns.iter().any(|o| f.matches_overlap(o)) {
            return true;
         }
      }
      false
   }

   pub fn union(&mut self, other: &Self) {
      self.defined_new.extend(other.defined_new.iter().cloned());
      self.defined_old.extend(other.defined_old.iter().cloned());
      self.referenced_new.extend(other.referenced_new.iter().cloned());
      self.referenced_old.extend(other.referenced_old.iter().cloned());
      self.new_fqns.extend(other.new_fqns.iter().cloned());
      self.old_fqns.extend(other.old_fqns.iter().cloned());
      self.languages.extend(other.languages.iter().cloned());
   }
}

/// Final output of logical grouping: a container paired with a commit
/// message (spec §3 "Commit group").
pub struct CommitGroup {
   pub container: Container,
   pub message:   String,
}

/// Metadata needed to reconstruct a commit during reparenting (C14). Shape
/// carried over from the teacher's `CommitMetadata` (`types.rs`), which
/// already matched what `git show -s --format=...` yields.
#[derive(Debug, Clone)]
pub struct CommitMetadata {
   pub hash:            String,
   pub author_name:     String,
   pub author_email:    String,
   pub author_date:     String,
   pub committer_name:  String,
   pub committer_email: String,
   pub committer_date:  String,
   pub message:         String,
   pub parent_hashes:   Vec<String>,
   pub tree_hash:       String,
}

#[cfg(test)]
mod tests {
   use super::*;

   /// Spec §8 scenario E: two chunks both touching symbol `foo`, one
   /// defining it and one referencing it, overlap and union into a single
   /// signature despite living in different hunks.
   #[test]
   fn overlapping_defined_and_referenced_symbol_merges() {
      let mut defines_foo = Signature { defined_new: BTreeSet::from(["foo".to_string()]), ..Signature::default() };
      let references_foo = Signature { referenced_new: BTreeSet::from(["foo".to_string()]), ..Signature::default() };

      assert!(defines_foo.overlaps(&references_foo));

      defines_foo.union(&references_foo);
      assert!(defines_foo.defined_new.contains("foo"));
      assert!(defines_foo.referenced_new.contains("foo"));
   }

   #[test]
   fn disjoint_symbols_do_not_overlap() {
      let a = Signature { defined_new: BTreeSet::from(["foo".to_string()]), ..Signature::default() };
      let b = Signature { defined_new: BTreeSet::from(["bar".to_string()]), ..Signature::default() };
      assert!(!a.overlaps(&b));
   }

   #[test]
   fn fqn_overlap_matches_on_containment_not_just_equality() {
      let a = Fqn { kind: "function".to_string(), name: "mod.foo".to_string() };
      let b = Fqn { kind: "call".to_string(), name: "foo".to_string() };
      assert!(a.matches_overlap(&b));
   }
}
