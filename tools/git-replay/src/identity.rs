use crate::types::{Identity, ReplayContext, Signature};

/// Swaps one exact `(name, email)` pair for another and leaves everything else alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCorrection {
    bad: Identity,
    good: Identity,
}

impl IdentityCorrection {
    pub fn new(bad: Identity, good: Identity) -> Self {
        Self { bad, good }
    }

    pub fn from_context(context: &ReplayContext) -> Self {
        Self::new(context.bad.clone(), context.good.clone())
    }

    /// Both fields must match; a name or email match alone is not the bad identity.
    pub fn matches(&self, identity: &Identity) -> bool {
        identity.name == self.bad.name && identity.email == self.bad.email
    }

    pub fn correct(&self, identity: &Identity) -> Identity {
        if self.matches(identity) {
            self.good.clone()
        } else {
            identity.clone()
        }
    }

    pub fn correct_signature(&self, signature: &Signature) -> Signature {
        Signature {
            identity: self.correct(&signature.identity),
            date: signature.date.clone(),
        }
    }
}
