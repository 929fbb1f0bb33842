use crate::errors::ReplayError;
use crate::types::ReplayPhase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTracker {
    pub phase: ReplayPhase,
    pub replayed: usize,
    pub skipped: usize,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: ReplayPhase::Init,
            replayed: 0,
            skipped: 0,
        }
    }
}

impl PhaseTracker {
    pub fn transition(&mut self, next: ReplayPhase) -> Result<(), ReplayError> {
        validate_transition(self.phase, next)?;
        self.phase = next;
        Ok(())
    }

    pub fn on_commit_replayed(&mut self) -> Result<(), ReplayError> {
        self.require(ReplayPhase::Replaying, "commit replayed")?;
        self.replayed = self.replayed.saturating_add(1);
        Ok(())
    }

    pub fn on_commit_skipped(&mut self) -> Result<(), ReplayError> {
        self.require(ReplayPhase::Replaying, "commit skipped")?;
        self.skipped = self.skipped.saturating_add(1);
        Ok(())
    }

    fn require(&self, phase: ReplayPhase, event: &str) -> Result<(), ReplayError> {
        if self.phase != phase {
            return Err(ReplayError::Phase(format!(
                "{event} is only valid in {} (currently {})",
                phase.as_str(), self.phase.as_str()
            )));
        }
        Ok(())
    }
}

pub fn validate_transition(from: ReplayPhase, to: ReplayPhase) -> Result<(), ReplayError> {
    let allowed = matches!(
        (from, to),
        (ReplayPhase::Init, ReplayPhase::BaseCheckout)
            | (ReplayPhase::BaseCheckout, ReplayPhase::Replaying)
            | (ReplayPhase::Replaying, ReplayPhase::Done)
    );
    if !allowed {
        let detail = format!("{} -> {}", from.as_str(), to.as_str());
        return Err(ReplayError::Phase(detail));
    }
    Ok(())
}
