//! Assertions used across the lettered scenario tests (spec §8): tree-hash
//! equality (property 1) and log shape (scenarios D/F).

use crate::{error::Result, git::GitRepo};

/// Spec §8 property 1: the synthesized chain's final tree must exactly
/// match the original target's tree.
pub fn trees_equal(repo: &GitRepo, a: &str, b: &str) -> Result<bool> {
   Ok(repo.tree_of(a)? == repo.tree_of(b)?)
}

/// `git log --format=%H` equivalent: hashes from `tip` to the root,
/// first-parent only, nearest first.
pub fn log_hashes(repo: &GitRepo, tip: &str) -> Result<Vec<String>> {
   repo.first_parent_chain(tip)
}
