use crate::errors::ReplayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque commit id as printed by git.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..10).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: CommitRef,
    pub parents: Vec<CommitRef>,
}

impl CommitRecord {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Parent index handed to `cherry-pick -m`; merges always replay against their first parent.
    pub fn mainline(&self) -> Option<u32> {
        if self.is_merge() {
            Some(1)
        } else {
            None
        }
    }

    pub fn first_parent(&self) -> Option<&CommitRef> {
        self.parents.first()
    }
}

/// Oldest-first sequence of commits to replay.
pub type ReplayList = Vec<CommitRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// An identity plus the raw git date (`<epoch-seconds> <offset>`) it was recorded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub identity: Identity,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    pub author: Signature,
    pub committer: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPhase {
    Init,
    BaseCheckout,
    Replaying,
    Done,
}

impl ReplayPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::BaseCheckout => "base_checkout",
            Self::Replaying => "replaying",
            Self::Done => "done",
        }
    }
}

/// Everything one invocation needs to know; built once and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayContext {
    pub bad: Identity,
    pub good: Identity,
    pub relative: String,
    pub upto: String,
    pub into: String,
}

impl ReplayContext {
    pub fn new(
        bad: Identity,
        good: Identity,
        relative: impl Into<String>,
        upto: impl Into<String>,
        into: impl Into<String>,
    ) -> Result<Self, ReplayError> {
        let context = Self {
            bad,
            good,
            relative: relative.into(),
            upto: upto.into(),
            into: into.into(),
        };
        context.validate()?;
        Ok(context)
    }

    fn validate(&self) -> Result<(), ReplayError> {
        let fields = [
            ("bad name", self.bad.name.as_str()),
            ("bad email", self.bad.email.as_str()),
            ("good name", self.good.name.as_str()),
            ("good email", self.good.email.as_str()),
            ("relative reference", self.relative.as_str()),
            ("upto reference", self.upto.as_str()),
            ("destination branch", self.into.as_str()),
        ];
        if let Some((label, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ReplayError::InvalidConfig(format!(
                "{label} must not be empty"
            )));
        }
        if self.bad == self.good {
            return Err(ReplayError::InvalidConfig(
                "bad and good identities are identical; nothing to correct".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeScope {
    pub process_cwd: PathBuf,
    pub repo_root: Option<PathBuf>,
    pub working_dir: PathBuf,
}
