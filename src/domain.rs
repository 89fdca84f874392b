use std::fmt;

use pnet::util::MacAddr;
use thiserror::Error;

/// Run state of a domain as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Running,
    Blocked,
    Paused,
    Shutdown,
    ShutOff,
    Crashed,
    PmSuspended,
    Other(String),
}

impl RunState {
    /// Parses the words printed by `virsh domstate`.
    pub fn parse(s: &str) -> RunState {
        match s.trim() {
            "running" => RunState::Running,
            "idle" | "blocked" => RunState::Blocked,
            "paused" => RunState::Paused,
            "in shutdown" | "shutdown" => RunState::Shutdown,
            "shut off" | "shutoff" => RunState::ShutOff,
            "crashed" => RunState::Crashed,
            "pmsuspended" => RunState::PmSuspended,
            other => RunState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Blocked => write!(f, "blocked"),
            RunState::Paused => write!(f, "paused"),
            RunState::Shutdown => write!(f, "in shutdown"),
            RunState::ShutOff => write!(f, "shut off"),
            RunState::Crashed => write!(f, "crashed"),
            RunState::PmSuspended => write!(f, "pmsuspended"),
            RunState::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeAction {
    Start,
    Resume,
    PmWakeup,
}

impl fmt::Display for WakeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeAction::Start => write!(f, "start"),
            WakeAction::Resume => write!(f, "resume"),
            WakeAction::PmWakeup => write!(f, "pm-wakeup"),
        }
    }
}

/// Maps a run state to the call that wakes the domain, `None` when it is already up.
pub fn action_for(state: &RunState) -> Option<WakeAction> {
    match state {
        RunState::ShutOff | RunState::Shutdown | RunState::Crashed => Some(WakeAction::Start),
        RunState::PmSuspended => Some(WakeAction::PmWakeup),
        RunState::Paused => Some(WakeAction::Resume),
        RunState::Running | RunState::Blocked | RunState::Other(_) => None,
    }
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("malformed domain XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("domain XML has no <name>")]
    MissingName,

    #[error("domain '{0}' has no <uuid>")]
    MissingUuid(String),

    #[error("domain '{domain}' has an invalid MAC address '{value}'")]
    InvalidMac { domain: String, value: String },
}

/// Snapshot of one configured guest, rebuilt on every wake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainDescriptor {
    pub name: String,
    /// Stable handle for addressing the domain; names may look like IDs or UUIDs.
    pub uuid: String,
    pub macs: Vec<MacAddr>,
}

impl DomainDescriptor {
    /// Reads the domain name, UUID and interface MACs out of libvirt domain XML.
    ///
    /// Interfaces without a `<mac>` element are skipped; libvirt always
    /// fills one in for defined domains.
    pub fn from_xml(xml: &str) -> Result<DomainDescriptor, DescriptorError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();

        let text_of = |tag: &str| {
            root.children()
                .find(|n| n.has_tag_name(tag))
                .and_then(|n| n.text())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        };

        let name = text_of("name").ok_or(DescriptorError::MissingName)?;
        let uuid = text_of("uuid").ok_or_else(|| DescriptorError::MissingUuid(name.clone()))?;

        let mut macs = Vec::new();
        let interfaces = root
            .children()
            .filter(|n| n.has_tag_name("devices"))
            .flat_map(|d| d.children().filter(|n| n.has_tag_name("interface")));

        for iface in interfaces {
            let Some(value) = iface
                .children()
                .find(|n| n.has_tag_name("mac"))
                .and_then(|m| m.attribute("address"))
            else {
                continue;
            };

            let mac = value.trim().parse::<MacAddr>().map_err(|_| DescriptorError::InvalidMac {
                domain: name.clone(),
                value: value.to_string(),
            })?;
            macs.push(mac);
        }

        Ok(DomainDescriptor { name, uuid, macs })
    }

    pub fn has_mac(&self, mac: &MacAddr) -> bool {
        self.macs.iter().any(|m| m == mac)
    }
}
