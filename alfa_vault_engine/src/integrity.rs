//! Device integrity advice consulted before key export.
//!
//! Heuristics like root or debugger checks are easy to evade, so advice only
//! gates export. It never affects authentication or decryption.

/// Verdict from an [`IntegrityAdvisor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advice {
    Trusted,
    Suspicious(String),
}

/// Pluggable device integrity check
pub trait IntegrityAdvisor: Send + Sync {
    fn assess(&self) -> Advice;
}

/// Advisor for hosts with no integrity signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAdvisor;

impl IntegrityAdvisor for NoopAdvisor {
    fn assess(&self) -> Advice {
        Advice::Trusted
    }
}

impl<F> IntegrityAdvisor for F
where
    F: Fn() -> Advice + Send + Sync,
{
    fn assess(&self) -> Advice {
        self()
    }
}
