// bifold-ble: BLE bootstrap demo CLI
//
// Runs the Central and Peripheral handshakes against each other over an
// in-memory loopback link, and exposes the wire codec and settings.

mod agent;
mod config;

use anyhow::{Context, Result};
use bifold_ble_core::message::{decode_message, encode, WireMessage};
use bifold_ble_core::settings::{AcceptancePolicy, RequestStyle, VerificationMethod};
use bifold_ble_core::transport::LoopbackLink;
use bifold_ble_core::{
    error_channel, BlePlatformBridge, BootstrapDriver, BootstrapNotice, BootstrapOutcome,
    BootstrapSettings, ChannelConfig, DriverHandle, RecordingHandoff, Role,
};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use tokio::sync::mpsc;

const CENTRAL_ID: &str = "11:22:33";

#[derive(Parser)]
#[command(name = "bifold-ble")]
#[command(about = "Bifold BLE: out-of-band connection bootstrap over Bluetooth LE")]
#[command(long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full Central ↔ Peripheral handshake over a loopback link
    Simulate {
        /// Peripheral waits for a decision, then accepts
        #[arg(long)]
        manual_accept: bool,
        /// Peripheral waits for a decision, then rejects
        #[arg(long, conflicts_with = "manual_accept")]
        reject: bool,
        /// Central sends <STD>0 instead of an addressed request
        #[arg(long)]
        standard: bool,
        /// Peripheral issues a random channel as a QR payload; Central scans it
        #[arg(long)]
        qr: bool,
        /// Identifier of the simulated peripheral
        #[arg(long, default_value = "AA:BB:CC")]
        peer: String,
    },
    /// Encode a command line
    Encode { verb: String, argument: String },
    /// Decode a line received from the channel
    Decode { line: String },
    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Get { key: String },
    Set { key: String, value: String },
    Reset,
}

#[derive(Debug, Clone, Copy)]
enum Decision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy)]
struct SimulateOptions {
    decision: Option<Decision>,
    standard: bool,
    qr: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Simulate {
            manual_accept,
            reject,
            standard,
            qr,
            peer,
        } => {
            let decision = match (manual_accept, reject) {
                (_, true) => Some(Decision::Reject),
                (true, false) => Some(Decision::Accept),
                (false, false) => None,
            };
            let options = SimulateOptions {
                decision,
                standard,
                qr,
            };
            cmd_simulate(options, peer).await
        }
        Commands::Encode { verb, argument } => cmd_encode(&verb, &argument),
        Commands::Decode { line } => cmd_decode(&line),
        Commands::Config { action } => cmd_config(action),
    }
}

async fn cmd_simulate(options: SimulateOptions, peer: String) -> Result<()> {
    let settings = config::Config::load()?.settings;
    let decision = options.decision;

    let mut peripheral_settings = BootstrapSettings {
        role: Role::Peripheral,
        ..settings.clone()
    };
    if decision.is_some() {
        peripheral_settings.peripheral.acceptance = AcceptancePolicy::Manual;
    }

    let mut central_settings = BootstrapSettings {
        role: Role::Central,
        ..settings
    };
    if options.standard {
        central_settings.central.request_style = RequestStyle::Standard;
    }
    if options.qr {
        peripheral_settings.verification = VerificationMethod::QrCode;
        peripheral_settings.channel = ChannelConfig::random();
        let payload = peripheral_settings.qr_payload();
        println!("{} {}", "QR payload:".bold(), payload.to_string().dimmed());
        central_settings
            .apply_qr_payload(&payload)
            .context("Central could not read the QR payload")?;
    }
    let connect_on_discovery = !central_settings.central.auto_connect;

    println!("{}", "Simulating BLE bootstrap".bold());
    println!("  Central:    {}", CENTRAL_ID.bright_cyan());
    println!("  Peripheral: {}", peer.bright_cyan());
    println!(
        "  Request:    {:?}, acceptance: {:?}",
        central_settings.central.request_style, peripheral_settings.peripheral.acceptance
    );
    println!(
        "  Channel:    {} ({})",
        central_settings.active_channel().service_uuid,
        central_settings.verification
    );
    println!();

    let link = LoopbackLink::new(CENTRAL_ID, &peer);
    let (error_tx, mut error_rx) = error_channel();

    let endpoint = central_settings.agent_endpoint.clone();
    let peripheral_bridge: Arc<dyn BlePlatformBridge> = link.peripheral();
    let (mut peripheral, peripheral_handle) = BootstrapDriver::new(
        peripheral_settings,
        peripheral_bridge,
        Arc::new(agent::DemoAgent::new("peripheral", &endpoint)),
        Arc::new(RecordingHandoff::new()),
        error_tx.clone(),
    )
    .context("Failed to set up peripheral")?;

    let central_bridge: Arc<dyn BlePlatformBridge> = link.central();
    let (mut central, central_handle) = BootstrapDriver::new(
        central_settings,
        central_bridge,
        Arc::new(agent::DemoAgent::new("central", &endpoint)),
        Arc::new(RecordingHandoff::new()),
        error_tx,
    )
    .context("Failed to set up central")?;

    let peripheral_watch = tokio::spawn(watch(
        Role::Peripheral,
        peripheral.subscribe_notices(),
        peripheral_handle,
        decision,
        false,
    ));
    let central_watch = tokio::spawn(watch(
        Role::Central,
        central.subscribe_notices(),
        central_handle,
        None,
        connect_on_discovery,
    ));

    let peripheral_run = tokio::spawn(peripheral.run());
    let central_run = tokio::spawn(central.run());

    let central_result = central_run.await.context("Central task failed")?;
    let peripheral_result = peripheral_run.await.context("Peripheral task failed")?;
    let _ = tokio::join!(central_watch, peripheral_watch);

    println!();
    println!("{}", "Outcome:".bold());
    print_outcome(Role::Central, &central_result);
    print_outcome(Role::Peripheral, &peripheral_result);

    while let Ok(app_error) = error_rx.try_recv() {
        println!("  {} {}", "✗".red(), app_error.to_string().bright_red());
    }

    Ok(())
}

async fn watch(
    role: Role,
    mut notices: mpsc::UnboundedReceiver<BootstrapNotice>,
    handle: DriverHandle,
    decision: Option<Decision>,
    connect_on_discovery: bool,
) {
    while let Some(notice) = notices.recv().await {
        match notice {
            BootstrapNotice::Discovered(peer) => {
                println!(
                    "  {} {:<10} discovered {}",
                    "•".bright_blue(),
                    role,
                    peer.as_str().bright_cyan()
                );
                if connect_on_discovery {
                    if let Err(e) = handle.connect(peer).await {
                        println!("  {} {:<10} connect refused: {}", "⚠".yellow(), role, e);
                    }
                }
            }
            BootstrapNotice::StateChanged { session, state } => {
                println!(
                    "  {} {:<10} session {} → {}",
                    "•".bright_blue(),
                    role,
                    session,
                    state.to_string().bright_yellow()
                );
            }
            BootstrapNotice::AwaitingDecision { peer, .. } => {
                let result = match decision {
                    Some(Decision::Accept) => {
                        println!(
                            "  {} {:<10} accepting {}",
                            "?".bright_magenta(),
                            role,
                            peer.as_str()
                        );
                        handle.accept_request().await
                    }
                    Some(Decision::Reject) => {
                        println!(
                            "  {} {:<10} rejecting {}",
                            "?".bright_magenta(),
                            role,
                            peer.as_str()
                        );
                        handle.reject_request().await
                    }
                    None => Ok(()),
                };
                if let Err(e) = result {
                    println!("  {} {:<10} decision refused: {}", "⚠".yellow(), role, e);
                }
            }
        }
    }
}

fn print_outcome(role: Role, result: &Result<BootstrapOutcome, bifold_ble_core::BootstrapError>) {
    match result {
        Ok(BootstrapOutcome::Established(link)) => {
            println!(
                "  {} {:<10} established with {} ({:?})",
                "✓".green(),
                role,
                link.peer.as_str().bright_cyan(),
                link.direction
            );
            if let Some(url) = &link.invitation_url {
                println!("    invitation: {}", url.dimmed());
            }
        }
        Ok(BootstrapOutcome::Rejected(peer)) => {
            println!("  {} {:<10} rejected ({})", "✗".red(), role, peer.as_str());
        }
        Ok(BootstrapOutcome::Disconnected(peer)) => {
            println!("  {} {:<10} lost {}", "✗".red(), role, peer.as_str());
        }
        Ok(BootstrapOutcome::TimedOut) => println!("  {} {:<10} timed out", "✗".red(), role),
        Ok(BootstrapOutcome::Cancelled) => println!("  {} {:<10} cancelled", "✗".red(), role),
        Err(e) => println!("  {} {:<10} failed: {}", "✗".red(), role, e),
    }
}

fn cmd_encode(verb: &str, argument: &str) -> Result<()> {
    let line = encode(verb, argument)?;
    println!("{}", line);
    if let Err(e) = decode_message(&line) {
        eprintln!("{} not a protocol message: {}", "⚠".yellow(), e);
    }
    Ok(())
}

fn cmd_decode(line: &str) -> Result<()> {
    let message = decode_message(line)?;
    println!("{} {}", "Kind:".bold(), message.kind());
    println!("{} {}", "Sent by:".bold(), message.sender());
    match message {
        WireMessage::Command { peer, .. } => println!("{} {}", "Peer:".bold(), peer.as_str()),
        WireMessage::Standard(standard) => println!("{} {}", "Control:".bold(), standard),
        WireMessage::Invitation(payload) => {
            println!("{} {}", "Invitation:".bold(), payload.invitation_url)
        }
        WireMessage::InvitationSuccess(records) => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Show => {
            println!("{}", "Configuration:".bold());
            for (key, value) in config.list() {
                println!("  {:<26} {}", key.bright_cyan(), value);
            }
            println!();
            println!("  File: {}", config.path().display().to_string().dimmed());
        }
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown config key: {}", key),
        },
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} {} = {}", "✓".green(), key, value);
        }
        ConfigAction::Reset => {
            config.reset()?;
            println!("{} Configuration reset", "✓".green());
        }
    }

    Ok(())
}
