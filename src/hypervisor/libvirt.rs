use virt::connect::Connect;
use virt::domain::Domain;
use virt::sys;

use crate::domain::{DomainDescriptor, RunState, WakeAction};
use crate::hypervisor::{ControlPlaneError, Connector, Session};

/// Native libvirt connection, one per session.
#[derive(Debug, Clone)]
pub struct LibvirtConnector {
    uri: String,
}

impl LibvirtConnector {
    pub fn new(uri: &str) -> Self {
        Self { uri: uri.to_string() }
    }
}

impl Connector for LibvirtConnector {
    type Session = LibvirtSession;

    fn connect(&self) -> Result<LibvirtSession, ControlPlaneError> {
        let conn = Connect::open(Some(self.uri.as_str())).map_err(|e| ControlPlaneError::Connect {
            uri: self.uri.clone(),
            reason: e.to_string(),
        })?;
        log::trace!("[libvirt] connected to {}", self.uri);

        Ok(LibvirtSession { conn })
    }
}

pub struct LibvirtSession {
    conn: Connect,
}

fn libvirt_err(e: virt::error::Error) -> ControlPlaneError {
    ControlPlaneError::Libvirt(e.to_string())
}

fn map_state(state: sys::virDomainState) -> RunState {
    match state {
        sys::VIR_DOMAIN_RUNNING => RunState::Running,
        sys::VIR_DOMAIN_BLOCKED => RunState::Blocked,
        sys::VIR_DOMAIN_PAUSED => RunState::Paused,
        sys::VIR_DOMAIN_SHUTDOWN => RunState::Shutdown,
        sys::VIR_DOMAIN_SHUTOFF => RunState::ShutOff,
        sys::VIR_DOMAIN_CRASHED => RunState::Crashed,
        sys::VIR_DOMAIN_PMSUSPENDED => RunState::PmSuspended,
        other => RunState::Other(format!("state {}", other)),
    }
}

impl LibvirtSession {
    fn lookup(&self, domain: &DomainDescriptor) -> Result<Domain, ControlPlaneError> {
        Domain::lookup_by_uuid_string(&self.conn, &domain.uuid).map_err(libvirt_err)
    }
}

impl Session for LibvirtSession {
    fn domains(&self) -> Result<Vec<DomainDescriptor>, ControlPlaneError> {
        let flags = sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE | sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;
        let domains = self.conn.list_all_domains(flags).map_err(libvirt_err)?;

        domains
            .iter()
            .map(|dom| {
                let name = dom.get_name().map_err(libvirt_err)?;
                let xml = dom.get_xml_desc(0).map_err(libvirt_err)?;
                DomainDescriptor::from_xml(&xml)
                    .map_err(|source| ControlPlaneError::Descriptor { domain: name, source })
            })
            .collect()
    }

    fn state(&self, domain: &DomainDescriptor) -> Result<RunState, ControlPlaneError> {
        let (state, _reason) = self.lookup(domain)?.get_state().map_err(libvirt_err)?;
        Ok(map_state(state))
    }

    fn wake(&self, domain: &DomainDescriptor, action: WakeAction) -> Result<(), ControlPlaneError> {
        let dom = self.lookup(domain)?;
        let res = match action {
            WakeAction::Start => dom.create(),
            WakeAction::Resume => dom.resume(),
            WakeAction::PmWakeup => dom.pm_wakeup(0),
        };

        res.map(|_| ()).map_err(|e| ControlPlaneError::Wake {
            domain: domain.name.clone(),
            action,
            reason: e.to_string(),
        })
    }
}

impl Drop for LibvirtSession {
    fn drop(&mut self) {
        if let Err(e) = self.conn.close() {
            log::warn!("[libvirt] failed to close connection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_state() {
        assert_eq!(map_state(sys::VIR_DOMAIN_SHUTOFF), RunState::ShutOff);
        assert_eq!(map_state(sys::VIR_DOMAIN_PMSUSPENDED), RunState::PmSuspended);
        assert_eq!(map_state(sys::VIR_DOMAIN_NOSTATE), RunState::Other("state 0".into()));
    }
}
