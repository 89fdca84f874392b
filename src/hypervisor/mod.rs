use serde::Deserialize;
use thiserror::Error;

use crate::domain::{DescriptorError, DomainDescriptor, RunState, WakeAction};

#[cfg(test)]
pub mod fake;
#[cfg(feature = "libvirt")]
pub mod libvirt;
pub mod virsh;

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("failed to connect to '{uri}': {reason}")]
    Connect { uri: String, reason: String },

    #[error("failed to run virsh: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("'{command}' failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("bad descriptor for domain '{domain}': {source}")]
    Descriptor { domain: String, #[source] source: DescriptorError },

    #[error("{action} on domain '{domain}' failed: {reason}")]
    Wake { domain: String, action: WakeAction, reason: String },

    #[cfg(feature = "libvirt")]
    #[error("libvirt error: {0}")]
    Libvirt(String),

    #[error("backend '{0}' is not compiled in")]
    Unavailable(&'static str),
}

/// One open connection to the control plane.
///
/// Dropping the session releases the connection.
pub trait Session {
    /// All defined domains, active and inactive.
    fn domains(&self) -> Result<Vec<DomainDescriptor>, ControlPlaneError>;

    fn state(&self, domain: &DomainDescriptor) -> Result<RunState, ControlPlaneError>;

    fn wake(&self, domain: &DomainDescriptor, action: WakeAction) -> Result<(), ControlPlaneError>;
}

/// Opens sessions; every wake attempt gets a fresh one.
pub trait Connector {
    type Session: Session;

    fn connect(&self) -> Result<Self::Session, ControlPlaneError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Shell out to `virsh`.
    #[default]
    Virsh,
    /// Native libvirt bindings (cargo feature `libvirt`).
    Libvirt,
}

/// Connector picked at startup from the configured backend.
pub enum AnyConnector {
    Virsh(virsh::VirshConnector),
    #[cfg(feature = "libvirt")]
    Libvirt(libvirt::LibvirtConnector),
}

pub enum AnySession {
    Virsh(virsh::VirshSession),
    #[cfg(feature = "libvirt")]
    Libvirt(libvirt::LibvirtSession),
}

impl AnyConnector {
    pub fn new(backend: Backend, uri: &str, virsh_program: &str) -> Result<AnyConnector, ControlPlaneError> {
        match backend {
            Backend::Virsh => Ok(AnyConnector::Virsh(virsh::VirshConnector::new(uri).with_program(virsh_program))),
            #[cfg(feature = "libvirt")]
            Backend::Libvirt => Ok(AnyConnector::Libvirt(libvirt::LibvirtConnector::new(uri))),
            #[cfg(not(feature = "libvirt"))]
            Backend::Libvirt => Err(ControlPlaneError::Unavailable("libvirt")),
        }
    }
}

impl Connector for AnyConnector {
    type Session = AnySession;

    fn connect(&self) -> Result<AnySession, ControlPlaneError> {
        match self {
            AnyConnector::Virsh(c) => c.connect().map(AnySession::Virsh),
            #[cfg(feature = "libvirt")]
            AnyConnector::Libvirt(c) => c.connect().map(AnySession::Libvirt),
        }
    }
}

impl Session for AnySession {
    fn domains(&self) -> Result<Vec<DomainDescriptor>, ControlPlaneError> {
        match self {
            AnySession::Virsh(s) => s.domains(),
            #[cfg(feature = "libvirt")]
            AnySession::Libvirt(s) => s.domains(),
        }
    }

    fn state(&self, domain: &DomainDescriptor) -> Result<RunState, ControlPlaneError> {
        match self {
            AnySession::Virsh(s) => s.state(domain),
            #[cfg(feature = "libvirt")]
            AnySession::Libvirt(s) => s.state(domain),
        }
    }

    fn wake(&self, domain: &DomainDescriptor, action: WakeAction) -> Result<(), ControlPlaneError> {
        match self {
            AnySession::Virsh(s) => s.wake(domain, action),
            #[cfg(feature = "libvirt")]
            AnySession::Libvirt(s) => s.wake(domain, action),
        }
    }
}
