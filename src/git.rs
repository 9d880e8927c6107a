//! C1: Git I/O adapter. Every subprocess call the engine makes funnels
//! through here, grounded on `vowstar-llm-git/src/git.rs`'s
//! `std::process::Command` idiom but generalized past single-commit
//! amendment: batched blob reads for C5/C7, ancestry queries for C14, and
//! the private-index primitives `sandbox.rs` builds on.

use std::{collections::HashMap, path::Path, process::Command};

use crate::{
   error::{EngineError, Result},
   model::CommitMetadata,
};

/// A resolved git working tree plus the directory all commands run in.
#[derive(Debug, Clone)]
pub struct GitRepo {
   dir: String,
}

fn run(dir: &str, args: &[&str]) -> Result<std::process::Output> {
   Command::new("git")
      .args(args)
      .current_dir(dir)
      .output()
      .map_err(|e| EngineError::GitError(format!("failed to run git {}: {e}", args.join(" "))))
}

fn run_ok(dir: &str, args: &[&str]) -> Result<String> {
   let output = run(dir, args)?;
   if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(EngineError::GitError(format!("git {} failed: {stderr}", args.join(" "))));
   }
   Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl GitRepo {
   /// Resolve `dir` to the top of its working tree, failing with
   /// `NotARepo` if it isn't inside one.
   pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
      let dir_str = dir.as_ref().to_string_lossy().to_string();
      let output = run(&dir_str, &["rev-parse", "--show-toplevel"])?;
      if !output.status.success() {
         return Err(EngineError::not_a_repo(dir_str));
      }
      let toplevel = String::from_utf8_lossy(&output.stdout).trim().to_string();
      Ok(Self { dir: toplevel })
   }

   pub fn dir(&self) -> &str {
      &self.dir
   }

   /// Current branch name, or `DetachedHead` if none is checked out.
   pub fn current_branch(&self) -> Result<String> {
      let branch = run_ok(&self.dir, &["symbolic-ref", "--short", "-q", "HEAD"]);
      match branch {
         Ok(name) if !name.is_empty() => Ok(name),
         _ => Err(EngineError::detached_head()),
      }
   }

   pub fn resolve(&self, rev: &str) -> Result<String> {
      run_ok(&self.dir, &["rev-parse", "--verify", &format!("{rev}^{{commit}}")])
         .map_err(|_| EngineError::invalid_commit_hash(rev))
   }

   pub fn head_hash(&self) -> Result<String> {
      self.resolve("HEAD")
   }

   pub fn is_working_tree_clean(&self) -> Result<bool> {
      let output = run(&self.dir, &["status", "--porcelain"])?;
      Ok(output.stdout.is_empty())
   }

   /// `true` if `ancestor` is a (non-strict) ancestor of `descendant`.
   pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
      let output = run(&self.dir, &["merge-base", "--is-ancestor", ancestor, descendant])?;
      Ok(output.status.success())
   }

   /// Commits strictly between `base` (exclusive) and `tip` (inclusive),
   /// oldest first, first-parent ancestry only (spec §4.10).
   pub fn ancestry_path(&self, base: &str, tip: &str) -> Result<Vec<String>> {
      let range = format!("{base}..{tip}");
      let out = run_ok(
         &self.dir,
         &["rev-list", "--reverse", "--first-parent", "--ancestry-path", &range],
      )?;
      Ok(out.lines().filter(|l| !l.is_empty()).map(ToString::to_string).collect())
   }

   /// `true` if any commit strictly between `base` and `tip` has more than
   /// one parent (spec §7 `MergeInRange`).
   pub fn has_merge_in_range(&self, base: &str, tip: &str) -> Result<bool> {
      let range = format!("{base}..{tip}");
      let out = run_ok(&self.dir, &["rev-list", "--min-parents=2", "--ancestry-path", &range])?;
      Ok(!out.trim().is_empty())
   }

   pub fn commit_metadata(&self, hash: &str) -> Result<CommitMetadata> {
      let format_str = "%an%x00%ae%x00%aI%x00%cn%x00%ce%x00%cI%x00%B";
      let info = run_ok(&self.dir, &["show", "-s", &format!("--format={format_str}"), hash])?;
      let parts: Vec<&str> = info.splitn(7, '\0').collect();
      if parts.len() < 7 {
         return Err(EngineError::GitError(format!("could not parse commit metadata for {hash}")));
      }

      let tree_hash = run_ok(&self.dir, &["rev-parse", &format!("{hash}^{{tree}}")])?;

      let parents_line = run_ok(&self.dir, &["rev-list", "--parents", "-n", "1", hash])?;
      let parent_hashes: Vec<String> =
         parents_line.split_whitespace().skip(1).map(ToString::to_string).collect();

      Ok(CommitMetadata {
         hash: hash.to_string(),
         author_name: parts[0].to_string(),
         author_email: parts[1].to_string(),
         author_date: parts[2].to_string(),
         committer_name: parts[3].to_string(),
         committer_email: parts[4].to_string(),
         committer_date: parts[5].to_string(),
         message: parts[6].trim().to_string(),
         parent_hashes,
         tree_hash,
      })
   }

   pub fn tree_of(&self, commit: &str) -> Result<String> {
      run_ok(&self.dir, &["rev-parse", &format!("{commit}^{{tree}}")])
   }

   /// Raw `git diff --binary --no-color -U<context> base..target` bytes,
   /// the input stream C2 parses (spec §4.1).
   pub fn diff_bytes(&self, base: &str, target: &str, context: u32) -> Result<Vec<u8>> {
      let range = format!("{base}..{target}");
      let unified = format!("-U{context}");
      let output = run(&self.dir, &["diff", "--binary", "--no-color", &unified, &range])?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         return Err(EngineError::GitError(format!("git diff failed: {stderr}")));
      }
      Ok(output.stdout)
   }

   /// `--numstat` companion call used to detect binary files (reported as
   /// `-\t-\tpath`, spec §4.1).
   pub fn numstat(&self, base: &str, target: &str) -> Result<String> {
      let range = format!("{base}..{target}");
      run_ok(&self.dir, &["diff", "--numstat", &range])
   }

   /// Batched blob read: one `git cat-file --batch` call for every
   /// `(path, commit)` demand, used by C7's context manager and C5.
   pub fn read_blobs_batch(
      &self,
      demands: &[(String, String)],
   ) -> Result<HashMap<(String, String), Vec<u8>>> {
      use std::io::Write;

      let mut child = Command::new("git")
         .args(["cat-file", "--batch"])
         .current_dir(&self.dir)
         .stdin(std::process::Stdio::piped())
         .stdout(std::process::Stdio::piped())
         .spawn()
         .map_err(|e| EngineError::GitError(format!("failed to spawn git cat-file: {e}")))?;

      {
         let stdin = child.stdin.as_mut().expect("stdin piped");
         for (path, commit) in demands {
            writeln!(stdin, "{commit}:{path}")
               .map_err(|e| EngineError::GitError(format!("cat-file stdin write failed: {e}")))?;
         }
      }

      let output = child
         .wait_with_output()
         .map_err(|e| EngineError::GitError(format!("cat-file wait failed: {e}")))?;

      let mut out = HashMap::new();
      let mut cursor = 0usize;
      for (path, commit) in demands {
         let Some(header_end) = find_newline(&output.stdout, cursor) else {
            break;
         };
         let header = String::from_utf8_lossy(&output.stdout[cursor..header_end]).to_string();
         cursor = header_end + 1;
         if header.ends_with("missing") {
            continue;
         }
         // header: "<hash> blob <size>"
         let Some(size) = header.rsplit(' ').next().and_then(|s| s.parse::<usize>().ok()) else {
            continue;
         };
         let body = output.stdout[cursor..cursor + size].to_vec();
         cursor += size + 1; // trailing newline after the object body
         out.insert((path.clone(), commit.clone()), body);
      }
      Ok(out)
   }

   /// Read-tree `commit`'s tree into the private index at `index_file`.
   pub fn read_tree_into(&self, index_file: &Path, commit: &str) -> Result<()> {
      let status = Command::new("git")
         .args(["read-tree", commit])
         .current_dir(&self.dir)
         .env("GIT_INDEX_FILE", index_file)
         .status()
         .map_err(|e| EngineError::GitError(format!("failed to run git read-tree: {e}")))?;
      if !status.success() {
         return Err(EngineError::GitError(format!("git read-tree {commit} failed")));
      }
      Ok(())
   }

   /// Apply `patch` to the private index at `index_file` without touching
   /// the working tree (`--cached --index`, spec §4.9 step 3). `patch.rs`
   /// emits zero-context hunks, so `--unidiff-zero` is required or `git
   /// apply` refuses them as ambiguous.
   pub fn apply_cached(&self, index_file: &Path, patch: &[u8]) -> Result<()> {
      use std::io::Write;

      let mut child = Command::new("git")
         .args(["apply", "--cached", "--index", "--unidiff-zero", "--whitespace=nowarn"])
         .current_dir(&self.dir)
         .env("GIT_INDEX_FILE", index_file)
         .stdin(std::process::Stdio::piped())
         .stderr(std::process::Stdio::piped())
         .spawn()
         .map_err(|e| EngineError::GitError(format!("failed to spawn git apply: {e}")))?;

      child
         .stdin
         .as_mut()
         .expect("stdin piped")
         .write_all(patch)
         .map_err(|e| EngineError::GitError(format!("git apply stdin write failed: {e}")))?;

      let output = child
         .wait_with_output()
         .map_err(|e| EngineError::GitError(format!("git apply wait failed: {e}")))?;

      if !output.status.success() {
         return Err(EngineError::PatchApply { stderr: String::from_utf8_lossy(&output.stderr).to_string() });
      }
      Ok(())
   }

   /// Write the private index at `index_file` out to a tree object.
   pub fn write_tree(&self, index_file: &Path) -> Result<String> {
      let output = Command::new("git")
         .args(["write-tree"])
         .current_dir(&self.dir)
         .env("GIT_INDEX_FILE", index_file)
         .output()
         .map_err(|e| EngineError::GitError(format!("failed to run git write-tree: {e}")))?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         return Err(EngineError::GitError(format!("git write-tree failed: {stderr}")));
      }
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
   }

   /// Create a commit object for `tree` with the given parent(s) and
   /// message, without moving any ref.
   pub fn commit_tree(&self, tree: &str, parents: &[&str], message: &str) -> Result<String> {
      let mut cmd = Command::new("git");
      cmd.arg("commit-tree").arg(tree).current_dir(&self.dir);
      for parent in parents {
         cmd.arg("-p").arg(parent);
      }
      cmd.arg("-m").arg(message);

      let output = cmd
         .output()
         .map_err(|e| EngineError::GitError(format!("failed to run git commit-tree: {e}")))?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         return Err(EngineError::GitError(format!("git commit-tree failed: {stderr}")));
      }
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
   }

   /// As `commit_tree`, but reusing the original author/committer identity
   /// and dates (spec §4.10 reparenting).
   pub fn commit_tree_as(
      &self,
      tree: &str,
      parents: &[&str],
      message: &str,
      meta: &CommitMetadata,
   ) -> Result<String> {
      let mut cmd = Command::new("git");
      cmd.arg("commit-tree").arg(tree).current_dir(&self.dir);
      for parent in parents {
         cmd.arg("-p").arg(parent);
      }
      cmd.arg("-m")
         .arg(message)
         .env("GIT_AUTHOR_NAME", &meta.author_name)
         .env("GIT_AUTHOR_EMAIL", &meta.author_email)
         .env("GIT_AUTHOR_DATE", &meta.author_date)
         .env("GIT_COMMITTER_NAME", &meta.committer_name)
         .env("GIT_COMMITTER_EMAIL", &meta.committer_email)
         .env("GIT_COMMITTER_DATE", &meta.committer_date);

      let output = cmd
         .output()
         .map_err(|e| EngineError::GitError(format!("failed to run git commit-tree: {e}")))?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         return Err(EngineError::GitError(format!("git commit-tree failed: {stderr}")));
      }
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
   }

   /// Atomic ref update with an expected previous value, so a concurrent
   /// mutator aborts cleanly rather than silently losing a write (spec §5).
   pub fn update_ref(&self, branch: &str, new_value: &str, old_value: &str) -> Result<()> {
      let refname = format!("refs/heads/{branch}");
      let output = run(&self.dir, &["update-ref", &refname, new_value, old_value])?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         return Err(EngineError::GitError(format!("git update-ref failed: {stderr}")));
      }
      Ok(())
   }

   pub fn reset_hard(&self, to: &str) -> Result<()> {
      run_ok(&self.dir, &["reset", "--hard", to]).map(|_| ())
   }

   /// Stage everything in the real working tree/index (mirrors the
   /// teacher's "auto-stage if nothing staged" behavior in `main.rs`) and
   /// wrap it in a dangling commit object on top of `parent`, never moving
   /// any ref. This is the `commit` operation's only use of the real index;
   /// everything downstream of it runs through the `sandbox.rs`
   /// private-index primitives instead (spec §3 "Sandbox").
   pub fn synth_working_tree_commit(&self, parent: &str) -> Result<String> {
      let add = Command::new("git")
         .args(["add", "-A"])
         .current_dir(&self.dir)
         .output()
         .map_err(|e| EngineError::GitError(format!("failed to run git add -A: {e}")))?;
      if !add.status.success() {
         let stderr = String::from_utf8_lossy(&add.stderr);
         return Err(EngineError::GitError(format!("git add -A failed: {stderr}")));
      }

      let tree = run_ok(&self.dir, &["write-tree"])?;
      self.commit_tree(&tree, &[parent], "working tree snapshot")
   }

   /// First-parent ancestor chain starting at (and including) `tip`,
   /// nearest-first, stopping at the root commit.
   pub fn first_parent_chain(&self, tip: &str) -> Result<Vec<String>> {
      let out = run_ok(&self.dir, &["rev-list", "--first-parent", tip])?;
      Ok(out.lines().filter(|l| !l.is_empty()).map(ToString::to_string).collect())
   }

   /// `true` if `commit` has no parent (the repo root).
   pub fn is_root_commit(&self, commit: &str) -> Result<bool> {
      let out = run_ok(&self.dir, &["rev-list", "--parents", "-n", "1", commit])?;
      Ok(out.split_whitespace().count() <= 1)
   }

   /// Total changed-line count for `commit` against its first parent
   /// (additions + removals; a binary file reported as `-\t-\tpath` counts
   /// as 1, matching `Leaf::size`'s opaque-hunk convention).
   pub fn commit_change_size(&self, commit: &str) -> Result<usize> {
      let parent = format!("{commit}^");
      let out = run_ok(&self.dir, &["diff", "--numstat", &parent, commit])?;
      Ok(
         out
            .lines()
            .map(|line| {
               let mut fields = line.split('\t');
               let added = fields.next().unwrap_or("0").parse::<usize>().unwrap_or(1);
               let removed = fields.next().unwrap_or("0").parse::<usize>().unwrap_or(0);
               added + removed
            })
            .sum(),
      )
   }
}

fn find_newline(buf: &[u8], from: usize) -> Option<usize> {
   buf[from..].iter().position(|&b| b == b'\n').map(|p| from + p)
}
