//! C8: semantic labeller. Computes one `Signature` per container: a leaf
//! chunk's removal lines look up the base-commit context, its addition
//! lines the target-commit context; a composite's signature is the union
//! of its leaves'. Grounded on
//! `original_source/src/codestory/core/semantic_grouper/semantic_grouper.py`.

use crate::{
   context::ContextManager,
   model::{Container, Fqn, Leaf, LineChange, Signature},
};

pub fn label(container: &Container, contexts: &ContextManager) -> Signature {
   match container {
      Container::Atomic(leaf) => label_leaf(leaf, contexts),
      Container::Composite(children) => {
         let mut sig = Signature::default();
         for child in children {
            sig.union(&label(child, contexts));
         }
         sig
      },
   }
}

fn label_leaf(leaf: &Leaf, contexts: &ContextManager) -> Signature {
   let mut sig = Signature::default();
   let Leaf::Chunk(chunk) = leaf else { return sig };

   for line in &chunk.lines {
      let (path, commit, lineno, is_old) = match line {
         LineChange::Removal { old_line, .. } => {
            (chunk.old_path.as_deref(), chunk.base_commit.as_str(), *old_line, true)
         },
         LineChange::Addition { new_line, .. } => {
            (chunk.new_path.as_deref(), chunk.new_commit.as_str(), *new_line, false)
         },
      };
      let Some(path) = path else { continue };
      let (defined, referenced) = contexts.symbols_at(path, commit, lineno);
      if is_old {
         sig.defined_old.extend(defined);
         sig.referenced_old.extend(referenced);
      } else {
         sig.defined_new.extend(defined);
         sig.referenced_new.extend(referenced);
      }

      if let Some(parsed) = contexts.get(path, commit) {
         sig.languages.insert(parsed.language.to_string());
         let fqns: Vec<Fqn> = parsed.fqns_for_line(lineno);
         if is_old {
            sig.old_fqns.extend(fqns);
         } else {
            sig.new_fqns.extend(fqns);
         }
      }
   }

   sig
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::model::DiffChunk;

   #[test]
   fn opaque_leaf_has_invalid_signature() {
      let leaf = Leaf::Opaque(crate::model::OpaqueHunk {
         canonical_path: "logo.png".into(),
         patch_bytes: vec![],
      });
      let contexts = ContextManager::empty();
      let sig = label(&Container::Atomic(leaf), &contexts);
      assert!(!sig.is_valid());
   }

   #[test]
   fn chunk_without_context_has_invalid_signature() {
      let chunk = DiffChunk {
         base_commit: "b".into(),
         new_commit: "n".into(),
         old_path: None,
         new_path: Some("a.rs".into()),
         file_mode: None,
         lines: vec![LineChange::Addition { content: b"fn foo(){}".to_vec(), new_line: 1 }],
         old_start: 1,
         contains_newline_fallback: false,
      };
      let contexts = ContextManager::empty();
      let sig = label(&Container::from_chunk(chunk), &contexts);
      assert!(!sig.is_valid());
   }
}
