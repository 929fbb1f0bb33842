//! In-memory repository standing in for git in replay scenarios.

#![allow(dead_code)]

use git_replay::errors::GitError;
use git_replay::git::{CherryPickRequest, VersionControl};
use git_replay::types::{CommitMetadata, CommitRef, Identity, Signature};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

pub const OPERATOR_DATE: &str = "1800000000 +0000";

pub fn operator() -> Identity {
    Identity::new("Replay Operator", "operator@example.com")
}

pub fn signature(identity: &Identity, date: &str) -> Signature {
    Signature {
        identity: identity.clone(),
        date: date.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCommit {
    pub id: String,
    pub parents: Vec<String>,
    pub author: Signature,
    pub committer: Signature,
    /// Commit this one was cherry-picked from, if any.
    pub picked_from: Option<String>,
}

#[derive(Default)]
struct State {
    commits: BTreeMap<String, FakeCommit>,
    order: Vec<String>,
    branches: BTreeMap<String, String>,
    head: Option<String>,
    current_branch: Option<String>,
    pending_pick: Option<String>,
    empty_on: BTreeSet<String>,
    conflict_on: BTreeSet<String>,
    frozen_on: BTreeSet<String>,
    checkout_failures: BTreeSet<String>,
    amend_fails: bool,
    /// Submodule updates that succeed before every later one fails.
    submodule_budget: Option<usize>,
    submodule_updates: usize,
    calls: Vec<String>,
}

impl State {
    fn next_id(&self) -> String {
        format!("{:040x}", self.order.len() + 1)
    }

    fn insert(&mut self, commit: FakeCommit) -> String {
        let id = commit.id.clone();
        self.order.push(id.clone());
        self.commits.insert(id.clone(), commit);
        id
    }

    fn lookup(&self, reference: &str) -> Option<String> {
        if reference == "HEAD" {
            return self.head.clone();
        }
        if self.commits.contains_key(reference) {
            return Some(reference.to_string());
        }
        self.branches.get(reference).cloned()
    }

    fn move_head(&mut self, id: String) {
        if let Some(branch) = &self.current_branch {
            self.branches.insert(branch.clone(), id.clone());
        }
        self.head = Some(id);
    }

    fn ancestors(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&next) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }
}

fn command_failed(command: &str, exit_code: i32, stderr: &str) -> GitError {
    GitError::Command {
        command: command.to_string(),
        exit_code,
        stderr: stderr.to_string(),
    }
}

fn unknown_revision(command: &str, reference: &str) -> GitError {
    GitError::Command {
        command: command.to_string(),
        exit_code: 128,
        stderr: format!("fatal: ambiguous argument '{reference}': unknown revision"),
    }
}

#[derive(Default)]
pub struct FakeRepository {
    state: Mutex<State>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("state lock")
    }

    /// Records a commit authored and committed by the given identities at a fixed date.
    pub fn commit(&self, parents: &[&String], author: &Identity, committer: &Identity) -> String {
        let mut state = self.state();
        let id = state.next_id();
        let date = format!("{} +0100", 1_700_000_000 + state.order.len() * 60);
        state.insert(FakeCommit {
            id,
            parents: parents.iter().map(|p| p.to_string()).collect(),
            author: signature(author, &date),
            committer: signature(committer, &date),
            picked_from: None,
        })
    }

    pub fn set_branch(&self, name: &str, id: &str) {
        let mut state = self.state();
        state.branches.insert(name.to_string(), id.to_string());
    }

    pub fn mark_empty(&self, id: &str) {
        self.state().empty_on.insert(id.to_string());
    }

    pub fn mark_conflict(&self, id: &str) {
        self.state().conflict_on.insert(id.to_string());
    }

    /// The pick of `id` reports success without creating a commit.
    pub fn freeze_head_on_pick(&self, id: &str) {
        self.state().frozen_on.insert(id.to_string());
    }

    pub fn fail_checkout(&self, reference: &str) {
        self.state().checkout_failures.insert(reference.to_string());
    }

    pub fn fail_amend(&self) {
        self.state().amend_fails = true;
    }

    /// Lets `n` submodule updates succeed, then fails every later one.
    pub fn fail_submodule_after(&self, n: usize) {
        self.state().submodule_budget = Some(n);
    }

    pub fn get(&self, id: &str) -> FakeCommit {
        self.state().commits[id].clone()
    }

    pub fn branch(&self, name: &str) -> Option<String> {
        self.state().branches.get(name).cloned()
    }

    pub fn head_id(&self) -> Option<String> {
        self.state().head.clone()
    }

    pub fn current_branch(&self) -> Option<String> {
        self.state().current_branch.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// First-parent chain from `tip` back to (excluding) `stop`, oldest first.
    pub fn first_parent_chain(&self, tip: &str, stop: &str) -> Vec<FakeCommit> {
        let state = self.state();
        let mut chain = Vec::new();
        let mut cursor = tip.to_string();
        while cursor != stop {
            let commit = state.commits[&cursor].clone();
            let Some(parent) = commit.parents.first().cloned() else {
                chain.push(commit);
                break;
            };
            chain.push(commit);
            cursor = parent;
        }
        chain.reverse();
        chain
    }
}

impl VersionControl for FakeRepository {
    fn resolve_commit(&self, reference: &str) -> Result<CommitRef, GitError> {
        let mut state = self.state();
        state.calls.push(format!("rev-parse {reference}"));
        state
            .lookup(reference)
            .map(CommitRef::new)
            .ok_or_else(|| unknown_revision("git rev-parse", reference))
    }

    fn checkout(&self, reference: &str) -> Result<String, GitError> {
        let mut state = self.state();
        state.calls.push(format!("checkout {reference}"));
        if state.checkout_failures.contains(reference) {
            return Err(command_failed(
                &format!("git checkout {reference}"),
                1,
                "error: Your local changes would be overwritten by checkout.",
            ));
        }
        let id = state
            .lookup(reference)
            .ok_or_else(|| unknown_revision("git checkout", reference))?;
        let branch = state
            .branches
            .contains_key(reference)
            .then(|| reference.to_string());
        state.current_branch = branch;
        state.head = Some(id);
        Ok(String::new())
    }

    fn create_branch(&self, name: &str) -> Result<String, GitError> {
        let mut state = self.state();
        state.calls.push(format!("checkout -b {name}"));
        if state.branches.contains_key(name) {
            return Err(command_failed(
                &format!("git checkout -b {name}"),
                128,
                &format!("fatal: a branch named '{name}' already exists"),
            ));
        }
        let head = state.head.clone().unwrap_or_default();
        state.branches.insert(name.to_string(), head);
        state.current_branch = Some(name.to_string());
        Ok(format!("Switched to a new branch '{name}'"))
    }

    fn commit_metadata(&self, commit: &CommitRef) -> Result<CommitMetadata, GitError> {
        let mut state = self.state();
        state.calls.push(format!("log -1 {commit}"));
        let found = state
            .commits
            .get(commit.as_str())
            .ok_or_else(|| unknown_revision("git log", commit.as_str()))?;
        Ok(CommitMetadata {
            author: found.author.clone(),
            committer: found.committer.clone(),
        })
    }

    fn log_with_parents(&self, relative: &str, upto: &str) -> Result<String, GitError> {
        let mut state = self.state();
        state.calls.push(format!("log {relative}..{upto}"));
        let from = state
            .lookup(relative)
            .ok_or_else(|| unknown_revision("git log", relative))?;
        let to = state
            .lookup(upto)
            .ok_or_else(|| unknown_revision("git log", upto))?;
        let excluded = state.ancestors(&from);
        let included = state.ancestors(&to);
        let lines = state
            .order
            .iter()
            .rev()
            .filter(|id| included.contains(*id) && !excluded.contains(*id))
            .map(|id| {
                let commit = &state.commits[id];
                std::iter::once(commit.id.as_str())
                    .chain(commit.parents.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>();
        Ok(lines.join("\n"))
    }

    fn cherry_pick(&self, request: &CherryPickRequest) -> Result<String, GitError> {
        let mut state = self.state();
        let mut call = "cherry-pick".to_string();
        if let Some(mainline) = request.mainline {
            call.push_str(&format!(" -m {mainline}"));
        }
        if request.cross_reference {
            call.push_str(" -x");
        }
        call.push_str(&format!(" {}", request.commit));
        state.calls.push(call.clone());

        let id = request.commit.to_string();
        if state.conflict_on.contains(&id) {
            state.pending_pick = Some(id.clone());
            let stderr = format!(
                "error: could not apply {}...\nCONFLICT (content): Merge conflict in lib.rs",
                &id[..7]
            );
            return Err(command_failed(&format!("git {call}"), 1, &stderr));
        }
        if state.empty_on.contains(&id) {
            state.pending_pick = Some(id.clone());
            return Err(GitError::EmptyReplay {
                commit: id,
                stderr: "The previous cherry-pick is now empty.".to_string(),
            });
        }

        let original = state
            .commits
            .get(&id)
            .cloned()
            .ok_or_else(|| unknown_revision("git cherry-pick", &id))?;
        if original.parents.len() > 1 && request.mainline.is_none() {
            let stderr = format!("error: commit {id} is a merge but no -m option was given.");
            return Err(command_failed(&format!("git {call}"), 128, &stderr));
        }
        if state.frozen_on.contains(&id) {
            return Ok(String::new());
        }
        let head = state.head.clone().unwrap_or_default();
        let committer = request
            .committer
            .clone()
            .unwrap_or_else(|| signature(&operator(), OPERATOR_DATE));
        let new_id = state.next_id();
        state.insert(FakeCommit {
            id: new_id.clone(),
            parents: vec![head],
            author: original.author.clone(),
            committer,
            picked_from: Some(id),
        });
        state.move_head(new_id.clone());
        Ok(format!("[picked {}]", &new_id[..7]))
    }

    fn skip_cherry_pick(&self) -> Result<String, GitError> {
        let mut state = self.state();
        state.calls.push("cherry-pick --skip".to_string());
        match state.pending_pick.take() {
            Some(_) => Ok(String::new()),
            None => Err(command_failed(
                "git cherry-pick --skip",
                128,
                "error: no cherry-pick or revert in progress",
            )),
        }
    }

    fn amend_signatures(
        &self,
        author: &Signature,
        committer: &Signature,
    ) -> Result<String, GitError> {
        let mut state = self.state();
        state.calls.push(format!("commit --amend --author={}", author.identity));
        if state.amend_fails {
            return Err(command_failed(
                "git commit --amend --no-edit",
                1,
                "error: cannot lock ref 'HEAD'",
            ));
        }
        let head = state.head.clone().unwrap_or_default();
        let mut amended = state.commits[&head].clone();
        amended.id = state.next_id();
        amended.author = author.clone();
        amended.committer = committer.clone();
        let new_id = state.insert(amended);
        state.move_head(new_id);
        Ok(String::new())
    }

    fn update_submodules(&self) -> Result<String, GitError> {
        let mut state = self.state();
        state.calls.push("submodule update".to_string());
        state.submodule_updates += 1;
        match state.submodule_budget {
            Some(budget) if state.submodule_updates > budget => Err(command_failed(
                "git submodule update",
                1,
                "fatal: unable to checkout submodule 'vendor/lib'",
            )),
            _ => Ok(String::new()),
        }
    }
}
