use std::collections::HashMap;
use std::time::{Duration, Instant};

use pnet::util::MacAddr;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureError, FrameSource};
use crate::hypervisor::Connector;
use crate::resolver::{self, WakeError, WakeOutcome};
use crate::wol::{self, ValidationPolicy, WolError};

/// What became of one candidate payload.
#[derive(Debug)]
pub enum Handled {
    Dropped(WolError),
    CoolingDown(MacAddr),
    Resolved(Result<WakeOutcome, WakeError>),
}

pub struct Listener<C> {
    connector: C,
    policy: ValidationPolicy,
    cooldown: Option<Duration>,
    recently_woken: HashMap<MacAddr, Instant>,
}

impl<C: Connector> Listener<C> {
    pub fn new(connector: C, policy: ValidationPolicy, cooldown: Option<Duration>) -> Self {
        Self { connector, policy, cooldown, recently_woken: HashMap::new() }
    }

    /// Runs one payload through validation and, if it is a magic packet, the waker.
    pub fn handle(&mut self, payload: &[u8]) -> Handled {
        let mac = match wol::extract_target_mac(Some(payload), self.policy) {
            Ok(mac) => mac,
            Err(e) => {
                log::debug!("[listener] dropping frame: {}", e);
                return Handled::Dropped(e);
            },
        };
        log::info!("[listener] validated WOL packet for MAC {}", mac);

        if let Some(cooldown) = self.cooldown {
            if let Some(t) = self.recently_woken.get(&mac).copied() {
                if t.elapsed() < cooldown {
                    log::debug!("[listener] {} was woken {:?} ago, skipping", mac, t.elapsed());
                    return Handled::CoolingDown(mac);
                }
                self.recently_woken.remove(&mac);
            }
        }

        let res = resolver::wake_by_mac(mac, &self.connector);
        match &res {
            Ok(WakeOutcome::Woken { domain, action }) => {
                log::info!("[listener] {} issued for domain '{}'", action, domain);
                if self.cooldown.is_some() {
                    self.recently_woken.insert(mac, Instant::now());
                }
            },
            Ok(WakeOutcome::AlreadyRunning { domain, state }) => {
                log::info!("[listener] domain '{}' at {} is already running ({})", domain, mac, state);
            },
            Err(e) if e.is_expected() => log::info!("[listener] {}", e),
            Err(e) => log::error!("[listener] error waking virtual machine: {}", e),
        }

        Handled::Resolved(res)
    }

    /// Processes frames one at a time until the token is cancelled.
    ///
    /// A wake in progress always runs to completion; cancellation is only
    /// observed between frames.
    pub fn run<S: FrameSource>(&mut self, source: &mut S, token: &CancellationToken) -> Result<(), CaptureError> {
        loop {
            if token.is_cancelled() {
                log::trace!("[listener] exit");
                return Ok(());
            }

            if let Some(payload) = source.poll()? {
                self.handle(&payload);
            }
        }
    }
}
