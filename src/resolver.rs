use pnet::util::MacAddr;
use thiserror::Error;

use crate::domain::{action_for, RunState, WakeAction};
use crate::hypervisor::{ControlPlaneError, Connector, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    Woken { domain: String, action: WakeAction },
    AlreadyRunning { domain: String, state: RunState },
}

#[derive(Debug, Error)]
pub enum WakeError {
    #[error("no domain configured with MAC {0}")]
    NoMatchingDomain(MacAddr),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

impl WakeError {
    /// Most WOL traffic on a shared segment is for someone else.
    pub fn is_expected(&self) -> bool {
        matches!(self, WakeError::NoMatchingDomain(_))
    }
}

/// Finds the domain owning `mac` and wakes it according to its run state.
///
/// Domains are examined in name order and the first one carrying the MAC
/// wins; a MAC shared between domains is a configuration error this does
/// not try to resolve. The session is dropped on every return path.
pub fn wake_by_mac<C: Connector>(mac: MacAddr, connector: &C) -> Result<WakeOutcome, WakeError> {
    let session = connector.connect()?;

    let mut domains = session.domains()?;
    domains.sort_by(|a, b| a.name.cmp(&b.name));

    let Some(domain) = domains.into_iter().find(|d| d.has_mac(&mac)) else {
        return Err(WakeError::NoMatchingDomain(mac));
    };

    let state = session.state(&domain)?;
    let Some(action) = action_for(&state) else {
        log::debug!("[waker] {} at {} is already running ({})", domain.name, mac, state);
        return Ok(WakeOutcome::AlreadyRunning { domain: domain.name, state });
    };

    log::debug!("[waker] issuing {} for {} at {} (was {})", action, domain.name, mac, state);
    session.wake(&domain, action)?;

    Ok(WakeOutcome::Woken { domain: domain.name, action })
}
