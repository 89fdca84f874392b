use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

use crate::capture::DEFAULT_WOL_PORT;
use crate::hypervisor::Backend;
use crate::wol::ValidationPolicy;

pub const DEFAULT_INTERFACE: &str = "eth0";
pub const DEFAULT_URI: &str = "qemu+tcp:///system";

#[derive(Debug, Parser)]
#[command(version, about = "Wakes libvirt domains when a Wake-on-LAN magic packet for their MAC arrives")]
pub struct Cli {
    /// Network interface to listen on
    #[arg(short, long)]
    pub interface: Option<String>,

    /// libvirt connection URI, such as qemu:///system
    #[arg(short = 'c', long = "connect", value_name = "URI")]
    pub connect: Option<String>,

    /// YAML configuration file; command line flags take precedence
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// UDP destination port treated as WOL traffic (repeatable)
    #[arg(short, long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Only check header and length, not all sixteen MAC repetitions
    #[arg(long, default_value_t = false)]
    pub lenient: bool,

    /// Ignore packets for a MAC woken less than this many seconds ago
    #[arg(long, value_name = "SECS")]
    pub cooldown: Option<u64>,

    /// How to talk to libvirt
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Build a magic packet for MAC, run it through the validator and exit
    #[arg(long, value_name = "MAC")]
    pub self_test: Option<String>,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short, long, default_value_t = false, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Warn;
        }

        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub interface: String,
    pub connect: String,
    pub ports: Vec<u16>,
    pub validation: ValidationPolicy,
    /// Seconds; 0 disables the cooldown.
    pub cooldown: u64,
    pub backend: Backend,
    /// virsh binary used by the virsh backend.
    pub virsh: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            connect: DEFAULT_URI.to_string(),
            ports: vec![DEFAULT_WOL_PORT],
            validation: ValidationPolicy::default(),
            cooldown: 0,
            backend: Backend::default(),
            virsh: "virsh".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{}': {source}", .path.display())]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("invalid config file '{}': {source}", .path.display())]
    Parse { path: PathBuf, #[source] source: serde_yml::Error },

    #[error("at least one WOL port is required")]
    NoPorts,
}

impl Config {
    /// Reads a YAML config file; a leading `~` in the path is expanded.
    pub fn from_file(path: &str) -> Result<Config, ConfigError> {
        let path = PathBuf::from(shellexpand::tilde(path).as_ref());
        let data = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;

        if data.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_yml::from_str(&data).map_err(|source| ConfigError::Parse { path, source })
    }

    /// File (if any) first, then command line overrides.
    pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(interface) = &cli.interface {
            config.interface = interface.clone();
        }
        if let Some(uri) = &cli.connect {
            config.connect = uri.clone();
        }
        if !cli.ports.is_empty() {
            config.ports = cli.ports.clone();
        }
        if cli.lenient {
            config.validation = ValidationPolicy::Lenient;
        }
        if let Some(secs) = cli.cooldown {
            config.cooldown = secs;
        }
        if let Some(backend) = cli.backend {
            config.backend = backend;
        }

        if config.ports.is_empty() {
            return Err(ConfigError::NoPorts);
        }

        Ok(config)
    }

    pub fn cooldown(&self) -> Option<Duration> {
        (self.cooldown > 0).then(|| Duration::from_secs(self.cooldown))
    }
}
