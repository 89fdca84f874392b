mod capture;
mod config;
mod domain;
mod hypervisor;
mod listener;
mod resolver;
mod wol;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pnet::util::MacAddr;
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

use crate::capture::{Capture, PreFilter};
use crate::config::{Cli, Config};
use crate::hypervisor::AnyConnector;
use crate::listener::Listener;
use crate::wol::{MagicPacket, ValidationPolicy};

fn self_test(mac: &str, policy: ValidationPolicy) -> Result<()> {
    let mac: MacAddr = mac.parse().map_err(|_| anyhow!("'{}' is not a MAC address", mac))?;
    let pkt = MagicPacket::new(mac);
    let extracted = wol::extract_target_mac(Some(pkt.as_bytes()), policy)?;

    println!("{}", extracted);
    Ok(())
}

/// Token cancelled on SIGINT, SIGTERM or SIGHUP.
fn cancel_on_termination() -> Result<CancellationToken> {
    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    ctrlc::set_handler(move || {
        log::info!("received termination signal, shutting down");
        signal_token.cancel();
    })
    .context("failed to install termination signal handler")?;

    Ok(cancel_token)
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli).context("configuration failed")?;

    if let Some(mac) = &cli.self_test {
        return self_test(mac, config.validation);
    }

    let connector = AnyConnector::new(config.backend, &config.connect, &config.virsh)?;

    let iface = capture::find_interface(&config.interface)?;
    let mut capture = Capture::open(iface, PreFilter::new(config.ports.clone()))?;

    let cancel_token = cancel_on_termination()?;

    log::info!(
        "listening for WOL packets on {} (ports {:?}, libvirt URI: {}, {:?} validation)",
        config.interface, config.ports, config.connect, config.validation
    );

    let mut listener = Listener::new(connector, config.validation, config.cooldown());
    listener.run(&mut capture, &cancel_token)?;

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = SimpleLogger::new().with_level(cli.log_level()).with_colors(true).env().init() {
        eprintln!("failed to initialize logger: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
