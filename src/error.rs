use thiserror::Error;

/// Errors surfaced by the rewrite engine, one variant per error kind named in
/// the design's propagation policy.
#[derive(Debug, Error)]
pub enum EngineError {
   #[error("not a git repository: {0}")]
   NotARepo(String),

   #[error("HEAD is detached: {0}")]
   DetachedHead(String),

   #[error("cannot rewrite the root commit: {0}")]
   RootCommitUnsupported(String),

   #[error("a merge commit lies in the rewrite range: {0}")]
   MergeInRange(String),

   #[error("failed to parse diff: {0}")]
   DiffParse(String),

   #[error("git apply failed: {stderr}")]
   PatchApply { stderr: String },

   #[error("synthesized tree {actual} does not match target tree {expected}")]
   SynthesisMismatch { expected: String, actual: String },

   #[error("reparenting commit {commit} failed: {reason}")]
   FixReparent { commit: String, reason: String },

   #[error("invalid input: {0}")]
   ValidationInput(String),

   #[error("adapter call failed: {0}")]
   AdapterFailure(#[from] AdapterError),

   #[error("interrupted")]
   Interrupted,

   #[error("git command failed: {0}")]
   GitError(String),

   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   #[error("http error: {0}")]
   Http(#[from] reqwest::Error),

   #[error("{0}")]
   Other(String),
}

/// LLM or embedding provider failure, kept distinct so callers can pattern
/// match on it without unwrapping the whole engine error.
#[derive(Debug, Error)]
pub enum AdapterError {
   #[error("request failed (HTTP {status}): {body}")]
   Http { status: u16, body: String },

   #[error("transport error: {0}")]
   Transport(String),

   #[error("response could not be parsed as JSON: {0}")]
   Unparseable(String),

   #[error("response missing expected field: {0}")]
   MissingField(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
   pub fn not_a_repo(path: impl std::fmt::Display) -> Self {
      Self::NotARepo(format!("{path} is not inside a git working tree"))
   }

   pub fn detached_head() -> Self {
      Self::DetachedHead("refusing to rewrite history with no branch checked out".to_string())
   }

   pub fn invalid_commit_hash(hash: impl std::fmt::Display) -> Self {
      Self::ValidationInput(format!("'{hash}' does not resolve to a commit"))
   }

   pub fn path_not_found(path: impl std::fmt::Display) -> Self {
      Self::ValidationInput(format!("path not found: {path}"))
   }

   pub fn synthesis_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
      Self::SynthesisMismatch { expected: expected.into(), actual: actual.into() }
   }

   /// The exit code this error maps to, per the propagation policy (§7).
   pub const fn exit_code(&self) -> i32 {
      match self {
         Self::Interrupted => 130,
         _ => 1,
      }
   }

   /// One-line cause string for the fatal-error print contract (§7): "a
   /// fatal error prints exactly one line stating the kind and a short
   /// cause".
   pub fn one_line(&self) -> String {
      format!("{self}")
   }
}
