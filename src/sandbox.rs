//! Scoped resources for the rewrite engine: a private index file per
//! orchestrator run and the process-wide interrupt flag. Neither ever
//! touches the real index, HEAD, or working tree (spec §5 "shared-resource
//! policy").

use std::{
   path::{Path, PathBuf},
   sync::atomic::{AtomicBool, Ordering},
   sync::OnceLock,
};

use crate::error::{EngineError, Result};

/// A `GIT_INDEX_FILE` pointing at a private temp file, removed on every
/// exit path. Never leaves its owning stack frame (spec §9 "context/resource
/// scoping").
pub struct SandboxIndex {
   path: PathBuf,
}

impl SandboxIndex {
   /// Allocate a fresh, non-existent index path under the system temp dir.
   /// Git creates the backing file itself on first `read-tree`/`apply`.
   pub fn new() -> Result<Self> {
      let mut path = std::env::temp_dir();
      let unique = format!("gitloom-index-{}-{}", std::process::id(), random_suffix());
      path.push(unique);
      Ok(Self { path })
   }

   pub fn path(&self) -> &Path {
      &self.path
   }
}

impl Drop for SandboxIndex {
   fn drop(&mut self) {
      let _ = std::fs::remove_file(&self.path);
   }
}

/// Cheap non-cryptographic suffix so concurrent runs in the same temp dir
/// don't collide; uniqueness, not secrecy.
fn random_suffix() -> u64 {
   use std::time::{SystemTime, UNIX_EPOCH};
   SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_nanos() as u64)
      .unwrap_or(0)
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static HANDLER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the SIGINT handler once per process. Safe to call more than
/// once; only the first call takes effect.
pub fn install_interrupt_handler() {
   HANDLER_INSTALLED.get_or_init(|| {
      let _ = ctrlc::set_handler(|| {
         INTERRUPTED.store(true, Ordering::SeqCst);
      });
   });
}

pub fn is_interrupted() -> bool {
   INTERRUPTED.load(Ordering::SeqCst)
}

/// Checked at every subprocess/network boundary; returns `Interrupted` once
/// a signal has landed so in-flight work can finish and unwind cleanly
/// (spec §5 "cancellation").
pub fn check_interrupted() -> Result<()> {
   if is_interrupted() { Err(EngineError::Interrupted) } else { Ok(()) }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn sandbox_index_path_is_unique_and_removed_on_drop() {
      let a = SandboxIndex::new().unwrap();
      let b = SandboxIndex::new().unwrap();
      assert_ne!(a.path(), b.path());
      let path = a.path().to_path_buf();
      std::fs::write(&path, b"index").unwrap();
      drop(a);
      assert!(!path.exists());
   }

   #[test]
   fn interrupted_flag_round_trips() {
      assert!(check_interrupted().is_ok());
      INTERRUPTED.store(true, Ordering::SeqCst);
      assert!(matches!(check_interrupted(), Err(EngineError::Interrupted)));
      INTERRUPTED.store(false, Ordering::SeqCst);
   }
}
