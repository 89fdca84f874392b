//! In-memory control plane for tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::domain::{DescriptorError, DomainDescriptor, RunState, WakeAction};
use crate::hypervisor::{ControlPlaneError, Connector, Session};

#[derive(Default)]
pub struct Plane {
    pub domains: Vec<DomainDescriptor>,
    pub states: HashMap<String, RunState>,
    pub calls: RefCell<Vec<(String, WakeAction)>>,
    pub connects: Cell<usize>,
    /// Sessions currently alive.
    pub open: Cell<usize>,
    pub refuse: bool,
    /// Enumeration hits a domain whose XML has no name.
    pub bad_descriptor: bool,
    pub fail_domains: bool,
    pub fail_state: bool,
    pub fail_wake: bool,
}

impl Plane {
    pub fn with(mut self, name: &str, mac: &str, state: RunState) -> Self {
        let uuid = format!("00000000-0000-0000-0000-{:012x}", self.domains.len() + 1);
        self.domains.push(DomainDescriptor {
            name: name.to_string(),
            uuid,
            macs: vec![mac.parse().unwrap()],
        });
        self.states.insert(name.to_string(), state);
        self
    }
}

pub fn fleet() -> Plane {
    Plane::default()
        .with("web", "52:54:00:00:00:01", RunState::Running)
        .with("db", "52:54:00:00:00:02", RunState::ShutOff)
        .with("build", "52:54:00:00:00:03", RunState::Paused)
        .with("laptop", "52:54:00:00:00:04", RunState::PmSuspended)
        .with("ci", "52:54:00:00:00:05", RunState::Crashed)
}

pub struct FakeSession<'a> {
    plane: &'a Plane,
}

impl Drop for FakeSession<'_> {
    fn drop(&mut self) {
        self.plane.open.set(self.plane.open.get() - 1);
    }
}

impl<'a> Connector for &'a Plane {
    type Session = FakeSession<'a>;

    fn connect(&self) -> Result<FakeSession<'a>, ControlPlaneError> {
        if self.refuse {
            return Err(ControlPlaneError::Connect {
                uri: "test:///default".into(),
                reason: "connection refused".into(),
            });
        }
        self.connects.set(self.connects.get() + 1);
        self.open.set(self.open.get() + 1);
        Ok(FakeSession { plane: *self })
    }
}

impl Session for FakeSession<'_> {
    fn domains(&self) -> Result<Vec<DomainDescriptor>, ControlPlaneError> {
        if self.plane.fail_domains {
            return Err(ControlPlaneError::Command {
                command: "virsh list --all --uuid".into(),
                stderr: "error: failed to list domains".into(),
            });
        }
        if self.plane.bad_descriptor {
            return Err(ControlPlaneError::Descriptor {
                domain: "00000000-0000-0000-0000-0000000000ff".into(),
                source: DescriptorError::MissingName,
            });
        }
        Ok(self.plane.domains.clone())
    }

    fn state(&self, domain: &DomainDescriptor) -> Result<RunState, ControlPlaneError> {
        if self.plane.fail_state {
            return Err(ControlPlaneError::Command {
                command: format!("virsh domstate --domain {}", domain.uuid),
                stderr: "error: failed to get domain state".into(),
            });
        }
        Ok(self.plane.states[&domain.name].clone())
    }

    fn wake(&self, domain: &DomainDescriptor, action: WakeAction) -> Result<(), ControlPlaneError> {
        self.plane.calls.borrow_mut().push((domain.name.clone(), action));
        if self.plane.fail_wake {
            return Err(ControlPlaneError::Wake {
                domain: domain.name.clone(),
                action,
                reason: "domain is already running".into(),
            });
        }
        Ok(())
    }
}
