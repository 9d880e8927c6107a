//! C13: rewrite orchestrator. Applies an ordered list of `CommitGroup`s onto
//! a base commit entirely inside a private index, never touching the real
//! index, HEAD, or working tree (spec §4.9). Re-architected from the
//! teacher's `compose.rs::execute_compose`/`rewrite.rs::rewrite_history`,
//! which mutated the real index directly; this version routes every step
//! through `sandbox::SandboxIndex` and `GitRepo`'s `GIT_INDEX_FILE`-scoped
//! primitives instead.

use std::collections::BTreeMap;

use crate::{
   error::{EngineError, Result},
   git::GitRepo,
   model::CommitGroup,
   patch,
   sandbox::{check_interrupted, SandboxIndex},
};

/// One group's outcome, tracked through `Pending → Applying → Committed |
/// Failed` (spec §4.9 state machine). Exposed so callers can report
/// progress; the orchestrator itself only needs the terminal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
   Pending,
   Applying,
   Committed { commit: String },
   Failed { reason: String },
}

/// Result of a full orchestration run.
pub struct OrchestrationResult {
   /// Hash of the last synthesized commit, `Tₖ′`.
   pub final_commit: String,
   /// Per-group terminal states, in input order.
   pub states:       Vec<GroupState>,
}

/// Run the synthesis loop of spec §4.9: for each group, in order, prepare a
/// transient index seeded from the previous step's tree, apply that
/// group's aggregated patch into it, write the tree, and commit it on top
/// of the previous new commit. `base` seeds the first group's index and is
/// also the first commit's parent. `target_tree` is the tree the final
/// synthesized commit must match (the sanity invariant: sum of parts
/// equals the whole).
pub fn synthesize(repo: &GitRepo, base: &str, groups: &[CommitGroup], target_tree: &str) -> Result<OrchestrationResult> {
   let mut states = vec![GroupState::Pending; groups.len()];
   let mut parent = base.to_string();
   // Net old->new line shift already applied to each path by earlier
   // groups in this run, so a later group's zero-context hunks for a file
   // a prior group already touched land on the right line of the tree
   // they're actually applied against instead of base `B`'s.
   let mut deltas: BTreeMap<String, i64> = BTreeMap::new();

   for (i, group) in groups.iter().enumerate() {
      check_interrupted()?;
      states[i] = GroupState::Applying;

      let commit = match apply_one_group(repo, &parent, group, &deltas) {
         Ok(commit) => commit,
         Err(err) => {
            states[i] = GroupState::Failed { reason: err.one_line() };
            return Err(err);
         },
      };

      for (path, net) in patch::net_deltas(&group.container) {
         *deltas.entry(path).or_default() += net;
      }

      states[i] = GroupState::Committed { commit: commit.clone() };
      parent = commit;
   }

   let actual_tree = repo.tree_of(&parent)?;
   if actual_tree != target_tree {
      return Err(EngineError::synthesis_mismatch(target_tree, actual_tree));
   }

   Ok(OrchestrationResult { final_commit: parent, states })
}

fn apply_one_group(repo: &GitRepo, parent: &str, group: &CommitGroup, deltas: &BTreeMap<String, i64>) -> Result<String> {
   let index = SandboxIndex::new()?;
   repo.read_tree_into(index.path(), parent)?;

   let patch = patch::unified_diff_shifted(&group.container, deltas);
   repo.apply_cached(index.path(), &patch)?;

   let tree = repo.write_tree(index.path())?;
   repo.commit_tree(&tree, &[parent], &group.message)
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::model::{Container, DiffChunk, LineChange};

   fn group(path: &str, content: &str, message: &str) -> CommitGroup {
      CommitGroup {
         container: Container::from_chunk(DiffChunk {
            base_commit: "base".into(),
            new_commit: "new".into(),
            old_path: None,
            new_path: Some(path.into()),
            file_mode: None,
            lines: vec![LineChange::Addition { content: content.as_bytes().to_vec(), new_line: 1 }],
            old_start: 0,
            contains_newline_fallback: false,
         }),
         message: message.to_string(),
      }
   }

   #[test]
   fn state_machine_starts_pending_for_every_group() {
      let groups = vec![group("a.rs", "fn a() {}", "add a"), group("b.rs", "fn b() {}", "add b")];
      let states = vec![GroupState::Pending; groups.len()];
      assert_eq!(states.len(), 2);
      assert!(matches!(states[0], GroupState::Pending));
   }

   #[test]
   fn failed_state_carries_a_one_line_reason() {
      let err = EngineError::synthesis_mismatch("deadbeef", "cafebabe");
      let state = GroupState::Failed { reason: err.one_line() };
      match state {
         GroupState::Failed { reason } => assert!(reason.contains("deadbeef")),
         _ => panic!("expected Failed"),
      }
   }
}
