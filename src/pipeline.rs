//! Shared diff→chunk→context→group→filter→cluster→synthesize pipeline
//! (spec §2's control-flow sentence), factored out of `main.rs` so the
//! testing harness can drive it with deterministic adapters instead of the
//! real HTTP ones.

use std::path::Path;

use crate::{
   chunker, config::ResolvedConfig, context::ContextManager, diffparse,
   embedding::EmbeddingAdapter,
   error::{EngineError, Result},
   filters, git::GitRepo, grouper,
   llm::LlmAdapter,
   logical_grouper,
   model::CommitGroup,
   orchestrator::{self, OrchestrationResult},
   patch, sandbox, style,
};

/// Knobs a caller can vary per run; everything else comes from `ResolvedConfig`.
#[derive(Debug, Default, Clone)]
pub struct RewriteOptions {
   pub path_filter: Option<String>,
   pub intent:      Option<String>,
}

/// C2 diff → C4 chunk → C6/C7 context → C8/C9 group → C10 filter → C11
/// cluster. Stops short of synthesis so the caller can preview, confirm, or
/// bail out on a dry run before touching any git object.
pub fn build_groups(
   repo: &GitRepo,
   base: &str,
   target: &str,
   resolved: &ResolvedConfig,
   options: &RewriteOptions,
   query_config_dir: Option<&Path>,
   llm: &dyn LlmAdapter,
   embedder: &dyn EmbeddingAdapter,
) -> Result<Vec<CommitGroup>> {
   sandbox::check_interrupted()?;

   if repo.has_merge_in_range(base, target)? {
      return Err(EngineError::MergeInRange(format!("{base}..{target}")));
   }

   style::print_info(&format!("diffing {} against {}", short(base), short(target)));
   let diff = repo.diff_bytes(base, target, resolved.value.diff_context_lines)?;
   let mut leaves = diffparse::parse_diff(&diff, base, target)?;

   if let Some(filter) = &options.path_filter {
      leaves.retain(|leaf| leaf.canonical_path().starts_with(filter.as_str()));
   }
   if leaves.is_empty() {
      return Err(EngineError::ValidationInput("no changes to rewrite".to_string()));
   }

   let contexts = ContextManager::build(repo, &leaves, base, target, query_config_dir)?;

   let leaves = chunker::chunk(leaves, resolved.value.chunking_level, &contexts);
   let containers = grouper::context_group(leaves, &contexts);
   let containers = grouper::signature_group(containers, &contexts, resolved.value.fallback_strategy);

   let (containers, secret_hits) = filters::secret_scan(containers, resolved.value.aggression);
   if !secret_hits.is_empty() {
      style::warn(&format!(
         "{} container(s) held back: looked like a secret (left as uncommitted working-tree diff)",
         secret_hits.len()
      ));
   }

   let (containers, irrelevant) = if let Some(intent) = &options.intent {
      filters::relevance_filter(containers, intent, resolved.value.aggression, &patch::patch_preview, llm)
   } else {
      (containers, Vec::new())
   };
   if !irrelevant.is_empty() {
      style::warn(&format!(
         "{} container(s) held back: judged irrelevant to the stated intent",
         irrelevant.len()
      ));
   }

   if containers.is_empty() {
      return Err(EngineError::ValidationInput("nothing left to commit after filtering".to_string()));
   }

   let groups = logical_grouper::group(
      containers,
      resolved.value.grouping_mode,
      options.intent.as_deref(),
      &patch::patch_preview,
      llm,
      embedder,
   );
   Ok(logical_grouper::enforce_minimum_size(groups, resolved.value.min_commit_size))
}

/// C12/C13: synthesize `groups` onto `base`, checking the result against
/// `target`'s tree (spec §4.9's sum-of-parts-equals-the-whole invariant).
pub fn synthesize_groups(repo: &GitRepo, base: &str, target: &str, groups: &[CommitGroup]) -> Result<OrchestrationResult> {
   let target_tree = repo.tree_of(target)?;
   orchestrator::synthesize(repo, base, groups, &target_tree)
}

fn short(hash: &str) -> &str {
   &hash[..hash.len().min(8)]
}
