//! Replays a resolved commit range onto a fresh branch, correcting one identity.
//!
//! A run moves through `INIT -> BASE_CHECKOUT -> REPLAYING -> DONE`. Every step
//! depends on the HEAD left by the previous one, so nothing here is parallel and
//! a fatal error stops the run where it is, leaving the branch for inspection.

use crate::errors::{GitError, ReplayError};
use crate::fsm::PhaseTracker;
use crate::git::{CherryPickRequest, VersionControl};
use crate::identity::IdentityCorrection;
use crate::logging::append_run_log;
use crate::resolver::resolve_replay_list;
use crate::runtime::Terminal;
use crate::types::{CommitRecord, CommitRef, ReplayContext, ReplayList, ReplayPhase};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    pub cross_reference: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            cross_reference: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedCommit {
    pub original: CommitRef,
    pub replayed: CommitRef,
    pub author_corrected: bool,
    pub committer_corrected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayWarning {
    /// The pick left nothing to commit and was skipped.
    EmptyReplay { commit: CommitRef },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub base: CommitRef,
    pub replayed: Vec<ReplayedCommit>,
    pub warnings: Vec<ReplayWarning>,
}

impl ReplayReport {
    pub fn skipped(&self) -> Vec<&CommitRef> {
        self.warnings
            .iter()
            .map(|warning| match warning {
                ReplayWarning::EmptyReplay { commit } => commit,
            })
            .collect()
    }
}

enum StepOutcome {
    Replayed(ReplayedCommit),
    Skipped,
}

pub struct ReplayEngine<'a> {
    vcs: &'a dyn VersionControl,
    terminal: &'a dyn Terminal,
    context: &'a ReplayContext,
    correction: IdentityCorrection,
    options: ReplayOptions,
}

impl<'a> ReplayEngine<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        terminal: &'a dyn Terminal,
        context: &'a ReplayContext,
        options: ReplayOptions,
    ) -> Self {
        Self {
            vcs,
            terminal,
            context,
            correction: IdentityCorrection::from_context(context),
            options,
        }
    }

    pub fn run(&self) -> Result<ReplayReport, ReplayError> {
        let mut tracker = PhaseTracker::default();
        append_run_log(
            "info",
            "replay.run.started",
            json!({
                "relative": self.context.relative,
                "upto": self.context.upto,
                "into": self.context.into,
                "bad": self.context.bad.to_string(),
                "good": self.context.good.to_string()
            }),
        );

        let list = resolve_replay_list(self.vcs, &self.context.relative, &self.context.upto)?;

        tracker.transition(ReplayPhase::BaseCheckout)?;
        let base = self.establish_base(&list)?;

        tracker.transition(ReplayPhase::Replaying)?;
        let mut report = ReplayReport {
            base: base.clone(),
            replayed: Vec::with_capacity(list.len()),
            warnings: Vec::new(),
        };
        let mut head = base;
        for record in &list {
            match self.replay_commit(record, &head)? {
                StepOutcome::Replayed(commit) => {
                    tracker.on_commit_replayed()?;
                    head = commit.replayed.clone();
                    report.replayed.push(commit);
                }
                StepOutcome::Skipped => {
                    tracker.on_commit_skipped()?;
                    report.warnings.push(ReplayWarning::EmptyReplay {
                        commit: record.id.clone(),
                    });
                }
            }
        }

        tracker.transition(ReplayPhase::Done)?;
        self.terminal.write_line("Done")?;
        let out = self
            .vcs
            .checkout(&self.context.upto)
            .map_err(|source| ReplayError::Restore {
                target: self.context.upto.clone(),
                source,
            })?;
        self.echo(&out)?;

        append_run_log(
            "info",
            "replay.run.completed",
            json!({
                "into": self.context.into,
                "replayed": tracker.replayed,
                "skipped": tracker.skipped
            }),
        );
        Ok(report)
    }

    /// Detaches at the first commit's first parent and branches `into` from there.
    fn establish_base(&self, list: &ReplayList) -> Result<CommitRef, ReplayError> {
        let setup_failed = |reason: String| ReplayError::BaseSetup {
            branch: self.context.into.clone(),
            reason,
        };
        let first = list
            .first()
            .ok_or_else(|| setup_failed("replay list is empty".to_string()))?;
        let parent = first.first_parent().ok_or_else(|| {
            setup_failed(format!(
                "{} is a root commit and has no parent to branch from",
                first.id
            ))
        })?;

        let out = self
            .vcs
            .checkout(parent.as_str())
            .map_err(|e| setup_failed(e.to_string()))?;
        self.echo(&out)?;
        let out = self
            .vcs
            .create_branch(&self.context.into)
            .map_err(|e| setup_failed(e.to_string()))?;
        self.echo(&out)?;
        let out = self
            .vcs
            .update_submodules()
            .map_err(|e| setup_failed(e.to_string()))?;
        self.echo(&out)?;
        let base = self.vcs.head().map_err(|e| setup_failed(e.to_string()))?;

        append_run_log(
            "info",
            "replay.base.ready",
            json!({
                "into": self.context.into,
                "base": base.as_str()
            }),
        );
        Ok(base)
    }

    fn replay_commit(
        &self,
        record: &CommitRecord,
        previous_head: &CommitRef,
    ) -> Result<StepOutcome, ReplayError> {
        self.terminal.write_line(&format!("Processing {}", record.id))?;

        let original = self
            .vcs
            .commit_metadata(&record.id)
            .map_err(|source| ReplayError::Inspection {
                commit: record.id.to_string(),
                source,
            })?;
        let committer = self.correction.correct_signature(&original.committer);
        let committer_corrected = committer != original.committer;
        let request = CherryPickRequest {
            commit: record.id.clone(),
            mainline: record.mainline(),
            cross_reference: self.options.cross_reference,
            committer: Some(committer),
        };
        append_run_log(
            "info",
            "replay.commit.started",
            json!({
                "commit": record.id.as_str(),
                "parents": record.parents.len(),
                "mainline": request.mainline,
                "committer_corrected": committer_corrected
            }),
        );

        let picked = self.pick(&request);
        // Submodules follow HEAD on every path, including a failed pick.
        let synced = self.vcs.update_submodules();
        let applied = picked?;
        let out = synced.map_err(|source| ReplayError::SubmoduleSync {
            commit: record.id.to_string(),
            source,
        })?;
        self.echo(&out)?;

        if !applied {
            return Ok(StepOutcome::Skipped);
        }
        self.amend_author(record, previous_head, committer_corrected)
            .map(StepOutcome::Replayed)
    }

    /// Ok(false) means the pick was empty and has been skipped.
    fn pick(&self, request: &CherryPickRequest) -> Result<bool, ReplayError> {
        let conflict = |source: GitError| ReplayError::ReplayConflict {
            commit: request.commit.to_string(),
            source,
        };
        match self.vcs.cherry_pick(request) {
            Ok(out) => {
                self.echo(&out)?;
                Ok(true)
            }
            Err(GitError::EmptyReplay { stderr, .. }) => {
                append_run_log(
                    "warn",
                    "replay.commit.empty_skipped",
                    json!({
                        "commit": request.commit.as_str(),
                        "stderr": stderr
                    }),
                );
                self.terminal.write_line(&format!(
                    "Skipping {}: its changes are already present",
                    request.commit
                ))?;
                let out = self.vcs.skip_cherry_pick().map_err(conflict)?;
                self.echo(&out)?;
                Ok(false)
            }
            Err(source) => {
                append_run_log(
                    "error",
                    "replay.commit.failed",
                    json!({
                        "commit": request.commit.as_str(),
                        "error": source.to_string()
                    }),
                );
                Err(conflict(source))
            }
        }
    }

    /// Rewrites the author of the commit just created and re-asserts its committer.
    fn amend_author(
        &self,
        record: &CommitRecord,
        previous_head: &CommitRef,
        committer_corrected: bool,
    ) -> Result<ReplayedCommit, ReplayError> {
        let failed = |reason: String| ReplayError::Amendment {
            commit: record.id.to_string(),
            reason,
        };
        let head = self.vcs.head().map_err(|e| failed(e.to_string()))?;
        if &head == previous_head {
            return Err(failed(format!(
                "HEAD is still {head} after a successful cherry-pick"
            )));
        }
        self.terminal.write_line(&format!("Git HEAD: {head}"))?;

        let picked = self
            .vcs
            .commit_metadata(&head)
            .map_err(|e| failed(e.to_string()))?;
        let author = self.correction.correct_signature(&picked.author);
        let author_corrected = author != picked.author;
        self.terminal.write_line(&format!("New author info: {}", author.identity))?;

        let out = self
            .vcs
            .amend_signatures(&author, &picked.committer)
            .map_err(|e| failed(e.to_string()))?;
        self.echo(&out)?;
        let replayed = self.vcs.head().map_err(|e| failed(e.to_string()))?;

        append_run_log(
            "info",
            "replay.commit.amended",
            json!({
                "commit": record.id.as_str(),
                "replayed": replayed.as_str(),
                "author_corrected": author_corrected,
                "committer_corrected": committer_corrected
            }),
        );
        Ok(ReplayedCommit {
            original: record.id.clone(),
            replayed,
            author_corrected,
            committer_corrected,
        })
    }

    fn echo(&self, output: &str) -> Result<(), ReplayError> {
        if output.trim().is_empty() {
            return Ok(());
        }
        self.terminal.write_line(output)
    }
}
