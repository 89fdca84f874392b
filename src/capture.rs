use std::io::ErrorKind;
use std::time::Duration;

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::vlan::VlanPacket;
use pnet::packet::Packet;
use thiserror::Error;

pub const ETHERTYPE_WOL: EtherType = EtherType(0x0842);
pub const DEFAULT_WOL_PORT: u16 = 9;

/// Smallest payload handed on; anything shorter cannot hold a magic packet.
const CANDIDATE_MIN_LEN: usize = 100;

const READ_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no interface to listen on specified")]
    EmptyInterface,

    #[error("unknown interface '{name}' (available: {})", .available.join(", "))]
    UnknownInterface { name: String, available: Vec<String> },

    #[error("unable to open device '{name}': {source}")]
    Open { name: String, #[source] source: std::io::Error },

    #[error("device '{0}' does not provide an Ethernet channel")]
    NotEthernet(String),

    #[error("receive on '{name}' failed: {source}")]
    Receive { name: String, #[source] source: std::io::Error },
}

/// Looks the interface up among the host's network devices.
pub fn find_interface(name: &str) -> Result<NetworkInterface, CaptureError> {
    if name.is_empty() {
        return Err(CaptureError::EmptyInterface);
    }

    let interfaces = datalink::interfaces();
    if let Some(iface) = interfaces.iter().find(|i| i.name == name) {
        return Ok(iface.clone());
    }

    Err(CaptureError::UnknownInterface {
        name: name.to_string(),
        available: interfaces.into_iter().map(|i| i.name).collect(),
    })
}

/// Cheap checks that decide whether a frame is worth validating.
///
/// This only narrows the stream; the magic packet check happens later.
#[derive(Debug, Clone)]
pub struct PreFilter {
    ports: Vec<u16>,
}

impl Default for PreFilter {
    fn default() -> Self {
        Self { ports: vec![DEFAULT_WOL_PORT] }
    }
}

impl PreFilter {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }

    /// Application payload of a UDP WOL candidate, or the body of an
    /// EtherType 0x0842 frame.
    pub fn wol_payload(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let eth = EthernetPacket::new(frame)?;
        self.by_ethertype(eth.get_ethertype(), eth.payload())
    }

    fn by_ethertype(&self, ethertype: EtherType, payload: &[u8]) -> Option<Vec<u8>> {
        if ethertype == ETHERTYPE_WOL {
            return Self::candidate(payload);
        }

        if ethertype == EtherTypes::Vlan {
            let vlan = VlanPacket::new(payload)?;
            return self.by_ethertype(vlan.get_ethertype(), vlan.payload());
        }

        if ethertype == EtherTypes::Ipv4 {
            let ip = Ipv4Packet::new(payload)?;
            if ip.get_header_length() < 5 || ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
                return None;
            }
            return self.udp_payload(ip.payload());
        }

        if ethertype == EtherTypes::Ipv6 {
            let ip = Ipv6Packet::new(payload)?;
            if ip.get_next_header() != IpNextHeaderProtocols::Udp {
                return None;
            }
            return self.udp_payload(ip.payload());
        }

        None
    }

    fn udp_payload(&self, segment: &[u8]) -> Option<Vec<u8>> {
        let udp = UdpPacket::new(segment)?;
        if !self.ports.contains(&udp.get_destination()) {
            return None;
        }
        Self::candidate(udp.payload())
    }

    fn candidate(payload: &[u8]) -> Option<Vec<u8>> {
        (payload.len() >= CANDIDATE_MIN_LEN).then(|| payload.to_vec())
    }
}

/// Anything that hands out WOL candidate payloads one at a time.
pub trait FrameSource {
    /// `Ok(None)` when nothing arrived within the read timeout or the
    /// frame was filtered out.
    fn poll(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;
}

pub struct Capture {
    iface: NetworkInterface,
    rx: Box<dyn DataLinkReceiver>,
    filter: PreFilter,
}

impl Capture {
    pub fn open(iface: NetworkInterface, filter: PreFilter) -> Result<Capture, CaptureError> {
        let mut dl_cfg = Config::default();
        dl_cfg.read_timeout = Some(READ_TIMEOUT);
        dl_cfg.promiscuous = false;

        let rx: Box<dyn DataLinkReceiver> = match datalink::channel(&iface, dl_cfg) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => return Err(CaptureError::NotEthernet(iface.name.clone())),
            Err(source) => return Err(CaptureError::Open { name: iface.name.clone(), source }),
        };
        log::debug!("[capture] listening on interface '{}'", iface.name);

        Ok(Capture { iface, rx, filter })
    }
}

impl FrameSource for Capture {
    fn poll(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        match self.rx.next() {
            Ok(frame) => {
                let payload = self.filter.wol_payload(frame);
                if payload.is_some() {
                    log::debug!("[capture][{}] WOL candidate of {} bytes", self.iface.name, frame.len());
                }
                Ok(payload)
            },
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(source) => Err(CaptureError::Receive { name: self.iface.name.clone(), source }),
        }
    }
}
