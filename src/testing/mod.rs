//! Fixture-driven integration harness for `commit`/`fix`/`clean`.
//!
//! Builds throwaway git repositories under a tempdir (`tempfile`), drives
//! the shared pipeline against them with deterministic adapters, and
//! asserts tree/log shape. One integration test per lettered scenario in
//! spec §8 lives under `tests/`, built on top of this module.
//!
//! Retargeted from the teacher's golden-file commit-message fixture
//! harness (`testing::{fixture,runner,compare}`), which compared
//! `ConventionalAnalysis` JSON against golden files; that format has no
//! counterpart once the engine rewrites history instead of describing a
//! single diff.

mod compare;
pub mod fixture;
mod runner;

pub use compare::{log_hashes, trees_equal};
pub use fixture::TempRepo;
pub use runner::{build_groups_only, run_pipeline, FixedEmbedder, NoOpLlm};
