//! Drives `pipeline::build_groups`/`synthesize_groups` against a
//! [`TempRepo`](super::fixture::TempRepo) with deterministic adapters, so
//! the lettered scenarios in spec §8 don't depend on network access.
//! Grounded on the teacher's `testing::runner` (fixture-in, result-out
//! shape), retargeted from commit-message generation to history rewriting.

use crate::{
   embedding::EmbeddingAdapter,
   error::{EngineError, Result},
   git::GitRepo,
   llm::{LlmAdapter, Message},
   model::CommitGroup,
   orchestrator::OrchestrationResult,
   pipeline::{self, RewriteOptions},
};

/// Always fails, forcing `logical_grouper::group`'s single-group-per-container
/// fallback (and `filters::relevance_filter`'s fail-open passthrough) so
/// scenario tests get a fully deterministic grouping without a network call.
/// "Auto-generated: N" in spec §8 scenario A is explicitly "or equivalent
/// placeholders" — the fallback's `"Updated <path>"` messages satisfy that.
pub struct NoOpLlm;

impl LlmAdapter for NoOpLlm {
   fn invoke(&self, _messages: &[Message]) -> Result<String> {
      Err(EngineError::Other("test double: no LLM configured".to_string()))
   }
}

/// Fixed low-dimensional embeddings; good enough to exercise
/// `embed_cluster_group` without a network call.
pub struct FixedEmbedder;

impl EmbeddingAdapter for FixedEmbedder {
   fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      Ok(texts.iter().enumerate().map(|(i, _)| vec![i as f32]).collect())
   }
}

/// Run the full pipeline (`commit`/`fix`/`clean`'s shared core) over one
/// `(base, target)` pair with deterministic adapters, returning the
/// synthesized result directly — no preview, dry-run, or confirm step.
pub fn run_pipeline(
   repo: &GitRepo,
   base: &str,
   target: &str,
   resolved: &crate::config::ResolvedConfig,
   options: &RewriteOptions,
) -> Result<OrchestrationResult> {
   let llm = NoOpLlm;
   let embedder = FixedEmbedder;
   let groups = pipeline::build_groups(repo, base, target, resolved, options, None, &llm, &embedder)?;
   pipeline::synthesize_groups(repo, base, target, &groups)
}

/// Same as [`run_pipeline`] but returns the groups without synthesizing,
/// for scenarios that only assert on preview content.
pub fn build_groups_only(
   repo: &GitRepo,
   base: &str,
   target: &str,
   resolved: &crate::config::ResolvedConfig,
   options: &RewriteOptions,
) -> Result<Vec<CommitGroup>> {
   let llm = NoOpLlm;
   let embedder = FixedEmbedder;
   pipeline::build_groups(repo, base, target, resolved, options, None, &llm, &embedder)
}
