//! C14: history reparent. Only reached by `fix` and `clean`, after the
//! orchestrator (C13) has produced a replacement `Tₖ′` for some original
//! commit `T`: every commit strictly after `T` up to the branch tip gets
//! recreated on top of the new chain, keeping its tree and identity exactly.
//! Grounded on the teacher's `git.rs::rewrite_history`, generalized from
//! "rebase the whole branch" to "rebase only the ancestry-path after `T`".

use crate::{error::Result, git::GitRepo, sandbox::check_interrupted};

/// Recreate every commit strictly after `old_target` up to `tip`, each with
/// its original tree and author/committer identity, chained onto
/// `new_target` instead of `old_target`. Returns the new tip hash (or
/// `new_target` unchanged if there is nothing after it to replay).
pub fn reparent_onto(repo: &GitRepo, old_target: &str, new_target: &str, tip: &str) -> Result<String> {
   let descendants = repo.ancestry_path(old_target, tip)?;

   let mut parent = new_target.to_string();
   for commit in descendants {
      check_interrupted()?;
      let meta = repo.commit_metadata(&commit)?;
      parent = repo.commit_tree_as(&meta.tree_hash, &[&parent], &meta.message, &meta)?;
   }
   Ok(parent)
}

/// One candidate commit considered by `clean`'s outer loop.
pub struct CleanCandidate {
   pub hash:       String,
   pub is_merge:   bool,
   pub total_size: usize,
}

/// Filter `clean`'s tip-to-root candidate list down to the commits that are
/// actually eligible for the `fix` flow: no merges, nothing matching an
/// `ignore` prefix (first match wins, in the same tip-to-root order the
/// candidates already arrive in — DESIGN.md Open Question 3), nothing
/// below `min_size` total line changes.
pub fn eligible_for_clean<'a>(
   candidates: &'a [CleanCandidate],
   ignore_prefixes: &[String],
   min_size: usize,
) -> Vec<&'a CleanCandidate> {
   candidates
      .iter()
      .filter(|c| !c.is_merge)
      .filter(|c| !ignore_prefixes.iter().any(|p| c.hash.starts_with(p.as_str())))
      .filter(|c| c.total_size >= min_size)
      .collect()
}

#[cfg(test)]
mod tests {
   use super::*;

   fn candidate(hash: &str, is_merge: bool, total_size: usize) -> CleanCandidate {
      CleanCandidate { hash: hash.to_string(), is_merge, total_size }
   }

   #[test]
   fn merges_are_excluded() {
      let candidates = vec![candidate("abc123", true, 50), candidate("def456", false, 50)];
      let eligible = eligible_for_clean(&candidates, &[], 0);
      assert_eq!(eligible.len(), 1);
      assert_eq!(eligible[0].hash, "def456");
   }

   #[test]
   fn ignore_prefix_excludes_matching_commits() {
      let candidates = vec![candidate("abc123", false, 50), candidate("abd789", false, 50)];
      let eligible = eligible_for_clean(&candidates, &["abc".to_string()], 0);
      assert_eq!(eligible.len(), 1);
      assert_eq!(eligible[0].hash, "abd789");
   }

   #[test]
   fn commits_below_min_size_are_excluded() {
      let candidates = vec![candidate("abc123", false, 3), candidate("def456", false, 30)];
      let eligible = eligible_for_clean(&candidates, &[], 10);
      assert_eq!(eligible.len(), 1);
      assert_eq!(eligible[0].hash, "def456");
   }
}
