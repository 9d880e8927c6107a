//! CLI entry point. `commit`/`fix`/`clean` replace the teacher's flag-based
//! mode switches (spec §A), each driving the same core pipeline (C1 → C2 →
//! C4 → C6/C7 → C8/C9 → C10 → C11 → C12/C13 → C14) over a different (base,
//! target) pair. Grounded on `vowstar-llm-git/src/main.rs`'s CLI-to-pipeline
//! wiring, particularly its auto-stage-on-commit and dry-run idioms.

use std::{io::IsTerminal, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use gitloom::{
   chunker::ChunkingLevel,
   config::{CliOverrides, ResolvedConfig},
   embedding::HttpEmbeddingAdapter,
   error::{EngineError, Result},
   filters::Aggression,
   git::GitRepo,
   grouper::FallbackStrategy,
   llm::HttpLlmAdapter,
   logical_grouper::GroupingMode,
   model::CommitGroup,
   orchestrator::OrchestrationResult,
   patch,
   pipeline::{self, RewriteOptions},
   reparent, sandbox, style,
};

#[derive(Parser)]
#[command(name = "gitloom", version, about = "Rewrites local git history into smaller, semantically coherent commits")]
struct Cli {
   #[command(subcommand)]
   command: Commands,
}

#[derive(Subcommand)]
enum Commands {
   /// Turn the current working tree into one or more commits on top of HEAD.
   Commit(CommitArgs),
   /// Replace a single past commit with several smaller ones, preserving
   /// downstream history.
   Fix(FixArgs),
   /// Apply `fix` iteratively from the branch tip down to the root.
   Clean(CleanArgs),
}

#[derive(Args)]
struct SharedArgs {
   /// Only rewrite changes under this path prefix; everything else is left
   /// as uncommitted working-tree diff (ignored by `fix`/`clean`, which
   /// always operate on a single existing commit's full diff).
   #[arg(long)]
   path_filter: Option<String>,

   /// Free-text description of what this run should keep; drives the
   /// relevance filter (C10) and the logical grouper's commit messages
   /// (C11).
   #[arg(long)]
   intent: Option<String>,

   /// Preview the commit groups without synthesizing or updating any ref.
   #[arg(long)]
   dry_run: bool,

   /// Skip the interactive confirmation prompt before rewriting history.
   #[arg(long)]
   yes: bool,

   /// TOML config file overriding `~/.gitloom/config.toml` and
   /// `.gitloom.toml` (spec §9 layered config).
   #[arg(long)]
   config: Option<PathBuf>,

   /// Directory overriding the bundled tree-sitter query catalog, one JSON
   /// file per language (spec §C `--custom-config`).
   #[arg(long)]
   custom_config: Option<PathBuf>,

   #[arg(long, value_enum)]
   chunking_level: Option<ChunkingLevel>,

   #[arg(long, value_enum)]
   fallback_strategy: Option<FallbackStrategy>,

   #[arg(long, value_enum)]
   aggression: Option<Aggression>,

   #[arg(long, value_enum)]
   grouping_mode: Option<GroupingMode>,

   #[arg(long)]
   min_commit_size: Option<usize>,

   /// Repository directory; defaults to the current directory.
   #[arg(long, default_value = ".")]
   dir: PathBuf,
}

impl SharedArgs {
   fn cli_overrides(&self) -> CliOverrides {
      CliOverrides {
         chunking_level:    self.chunking_level,
         fallback_strategy: self.fallback_strategy,
         aggression:        self.aggression,
         grouping_mode:     self.grouping_mode,
         min_commit_size:   self.min_commit_size,
      }
   }
}

#[derive(Args)]
struct CommitArgs {
   #[command(flatten)]
   shared: SharedArgs,
}

#[derive(Args)]
struct FixArgs {
   /// The commit to split, as any revision git accepts (hash, `HEAD~3`, ...).
   target: String,

   #[command(flatten)]
   shared: SharedArgs,
}

#[derive(Args)]
struct CleanArgs {
   /// Commit hash prefixes to skip; first match wins in tip-to-root order
   /// (DESIGN.md Open Question 3).
   #[arg(long = "ignore")]
   ignore: Vec<String>,

   /// Minimum total changed-line count a commit must have to be split.
   #[arg(long)]
   min_size: Option<usize>,

   #[command(flatten)]
   shared: SharedArgs,
}

/// Outcome of running the shared pipeline over one (base, target) pair,
/// before the caller decides what to do with it (update a branch ref, or
/// also reparent descendants).
enum RewriteOutcome {
   DryRun(Vec<CommitGroup>),
   Synthesized(OrchestrationResult),
}

/// Thin CLI wrapper over `pipeline::build_groups`/`synthesize_groups`: adds
/// the preview print, the dry-run short-circuit, and the interactive
/// confirmation step that only make sense for a human driving a terminal.
fn run_rewrite(
   repo: &GitRepo,
   base: &str,
   target: &str,
   resolved: &ResolvedConfig,
   shared: &SharedArgs,
) -> Result<RewriteOutcome> {
   let options = RewriteOptions { path_filter: shared.path_filter.clone(), intent: shared.intent.clone() };
   let query_config_dir = shared.custom_config.as_deref().or(resolved.value.language_query_config_dir.as_deref());

   let llm = HttpLlmAdapter::new(resolved.value.llm_settings());
   let embedder = HttpEmbeddingAdapter::new(resolved.value.embedding_settings());

   let groups = pipeline::build_groups(repo, base, target, resolved, &options, query_config_dir, &llm, &embedder)?;

   print_group_preview(&groups);

   if shared.dry_run {
      return Ok(RewriteOutcome::DryRun(groups));
   }
   if !shared.yes && !confirm("proceed with rewriting history")? {
      return Err(EngineError::ValidationInput("aborted by user".to_string()));
   }

   let result = pipeline::synthesize_groups(repo, base, target, &groups)?;
   Ok(RewriteOutcome::Synthesized(result))
}

fn print_group_preview(groups: &[CommitGroup]) {
   println!("\n{}", style::section_header(&format!("{} commit(s)", groups.len()), style::term_width()));
   for (i, group) in groups.iter().enumerate() {
      println!("{}", style::boxed_message(&format!("#{} {}", i + 1, group.message), &patch::semantic_diff(&group.container), style::term_width()));
   }
}

fn confirm(prompt: &str) -> Result<bool> {
   if !std::io::stdin().is_terminal() {
      return Ok(true);
   }
   eprint!("{} {prompt}? [y/N] ", style::info(style::icons::ARROW));
   use std::io::Write as _;
   std::io::stderr().flush().ok();
   let mut line = String::new();
   std::io::stdin().read_line(&mut line)?;
   Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn short(hash: &str) -> &str {
   &hash[..hash.len().min(8)]
}

fn load_config(dir: &std::path::Path, shared: &SharedArgs) -> Result<ResolvedConfig> {
   let mut resolved = ResolvedConfig::load(dir, shared.config.as_deref())?;
   resolved.apply_cli_overrides(shared.cli_overrides());
   Ok(resolved)
}

fn run_commit(args: CommitArgs) -> Result<()> {
   let repo = GitRepo::discover(&args.shared.dir)?;
   let branch = repo.current_branch()?;
   let resolved = load_config(std::path::Path::new(repo.dir()), &args.shared)?;

   if repo.is_working_tree_clean()? {
      return Err(EngineError::ValidationInput("nothing to commit: working tree is clean".to_string()));
   }

   let base = repo.head_hash()?;
   let target = repo.synth_working_tree_commit(&base)?;

   match run_rewrite(&repo, &base, &target, &resolved, &args.shared)? {
      RewriteOutcome::DryRun(_) => {
         style::print_info("dry run: no ref updated");
      },
      RewriteOutcome::Synthesized(result) => {
         repo.update_ref(&branch, &result.final_commit, &base)?;
         println!("{} {branch} now at {}", style::success(style::icons::SUCCESS), short(&result.final_commit));
      },
   }
   Ok(())
}

fn run_fix(args: FixArgs) -> Result<()> {
   let repo = GitRepo::discover(&args.shared.dir)?;
   let branch = repo.current_branch()?;
   let resolved = load_config(std::path::Path::new(repo.dir()), &args.shared)?;

   let tip = repo.head_hash()?;
   let target = repo.resolve(&args.target)?;
   if repo.is_root_commit(&target)? {
      return Err(EngineError::RootCommitUnsupported(target));
   }
   if !repo.is_ancestor(&target, &tip)? {
      return Err(EngineError::ValidationInput(format!("{target} is not an ancestor of {branch}")));
   }
   let base = repo.resolve(&format!("{target}^"))?;

   match run_rewrite(&repo, &base, &target, &resolved, &args.shared)? {
      RewriteOutcome::DryRun(_) => {
         style::print_info("dry run: no ref updated");
      },
      RewriteOutcome::Synthesized(result) => {
         let new_tip = reparent::reparent_onto(&repo, &target, &result.final_commit, &tip)?;
         repo.update_ref(&branch, &new_tip, &tip)?;
         println!("{} {branch} now at {}", style::success(style::icons::SUCCESS), short(&new_tip));
      },
   }
   Ok(())
}

fn run_clean(args: CleanArgs) -> Result<()> {
   let repo = GitRepo::discover(&args.shared.dir)?;
   let branch = repo.current_branch()?;
   let resolved = load_config(std::path::Path::new(repo.dir()), &args.shared)?;
   let min_size = args.min_size.unwrap_or(resolved.value.min_commit_size);

   let tip = repo.head_hash()?;
   let chain = repo.first_parent_chain(&tip)?;

   let mut candidates = Vec::new();
   for hash in &chain {
      if repo.is_root_commit(hash)? {
         continue;
      }
      let meta = repo.commit_metadata(hash)?;
      let total_size = repo.commit_change_size(hash)?;
      candidates.push(reparent::CleanCandidate { hash: hash.clone(), is_merge: meta.parent_hashes.len() > 1, total_size });
   }

   let eligible: Vec<String> =
      reparent::eligible_for_clean(&candidates, &args.ignore, min_size).into_iter().map(|c| c.hash.clone()).collect();

   if eligible.is_empty() {
      style::print_info("nothing eligible to clean");
      return Ok(());
   }

   let mut current_tip = tip.clone();
   let mut rewritten = 0usize;
   for target in eligible {
      sandbox::check_interrupted()?;
      let base = repo.resolve(&format!("{target}^"))?;

      match run_rewrite(&repo, &base, &target, &resolved, &args.shared)? {
         RewriteOutcome::DryRun(_) => {
            style::print_info(&format!("dry run: would split {}", short(&target)));
         },
         RewriteOutcome::Synthesized(result) => {
            current_tip = reparent::reparent_onto(&repo, &target, &result.final_commit, &current_tip)?;
            rewritten += 1;
         },
      }
   }

   if args.shared.dry_run {
      return Ok(());
   }
   if rewritten > 0 {
      repo.update_ref(&branch, &current_tip, &tip)?;
   }
   println!("{} {branch} now at {} ({rewritten} commit(s) split)", style::success(style::icons::SUCCESS), short(&current_tip));
   Ok(())
}

fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_env("GITLOOM_LOG"))
      .with_writer(std::io::stderr)
      .init();
   sandbox::install_interrupt_handler();

   let cli = Cli::parse();
   let result = match cli.command {
      Commands::Commit(args) => run_commit(args),
      Commands::Fix(args) => run_fix(args),
      Commands::Clean(args) => run_clean(args),
   };

   if let Err(err) = result {
      eprintln!("{} {}", style::error(style::icons::ERROR), err.one_line());
      std::process::exit(err.exit_code());
   }
}
