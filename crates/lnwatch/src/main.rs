//! lnwatch - Lightning node uptime monitor with a Telegram command bot.
//!
//! Polls an LND node over its onion REST endpoint, alerts the operator on
//! online/offline transitions and answers read-only chat commands.

use clap::Parser;
use lnwatch_core::report::info_report;
use lnwatch_core::{tracing_setup, CommandSource, Config, NodeSnapshot, Notifier};
use lnwatch_monitor::{messages, StatusMonitor};
use lnwatch_node::transport::{build_proxy_client, probe_proxy};
use lnwatch_node::{CircuitRefresher, NodeApi, NodeClient, ProxyTransport};
use lnwatch_telegram::{run_listener, CommandDispatcher, TelegramBot};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lnwatch")]
#[command(version)]
#[command(about = "Lightning node uptime monitor over Tor", long_about = None)]
struct Cli {
    /// Query the node once, print its status and exit (1 if unreachable)
    #[arg(long)]
    once: bool,

    /// Skip the startup check that the Tor proxy is reachable
    #[arg(long)]
    skip_tor_check: bool,

    /// Send alerts only; do not listen for chat commands
    #[arg(long)]
    no_commands: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging comes up before the rest of the configuration so that
    // configuration errors are recorded too.
    let log_file = env::var("LOG_FILE").ok().filter(|p| !p.is_empty());
    let _log_guard = tracing_setup::init(log_file.as_deref());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(node = %config.node.onion_host, port = config.node.port, "Configuration loaded");

    if cli.skip_tor_check {
        warn!("Skipping Tor connectivity check");
    } else if let Err(e) = check_tor(&config).await {
        error!("Tor proxy at {} is not usable: {}", config.tor.socks_proxy, e);
        return ExitCode::FAILURE;
    }

    let circuit = Arc::new(CircuitRefresher::new(&config.tor));
    let transport = match ProxyTransport::new(&config.node, &config.tor, &config.monitor, circuit.clone()) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to build node client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let node: Arc<dyn NodeApi> = Arc::new(NodeClient::new(transport));

    if cli.once {
        return check_once(node.as_ref()).await;
    }

    let bot = match TelegramBot::new(&config.telegram) {
        Ok(bot) => Arc::new(bot),
        Err(e) => {
            error!("Failed to build Telegram client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(chat_id = bot.chat_id(), "Telegram bot ready");
    serve(cli, config, node, circuit, bot).await;
    ExitCode::SUCCESS
}

async fn check_tor(config: &Config) -> Result<(), lnwatch_node::TransportError> {
    info!("Checking Tor connectivity via {}", config.tor.check_url);
    let client = build_proxy_client(
        &config.tor.proxy_url(),
        config.monitor.connect_timeout,
        config.monitor.request_timeout,
    )?;
    probe_proxy(&client, &config.tor.check_url).await?;
    info!("Tor proxy is working");
    Ok(())
}

async fn check_once(node: &dyn NodeApi) -> ExitCode {
    match node.get_info().await {
        Some(info) => {
            println!("{}", info_report(&NodeSnapshot::from_json(&info)));
            ExitCode::SUCCESS
        }
        None => {
            error!("Node is unreachable");
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    cli: Cli,
    config: Config,
    node: Arc<dyn NodeApi>,
    circuit: Arc<CircuitRefresher>,
    bot: Arc<TelegramBot>,
) {
    if !cli.no_commands {
        if let Err(e) = bot.register_commands().await {
            warn!("Could not register bot commands: {}", e);
        }
    }

    let startup = messages::startup(
        &config.node.onion_host,
        config.monitor.check_interval,
        &config.tor.socks_proxy,
    );
    if let Err(e) = bot.notify(&startup).await {
        warn!("Could not send startup message: {}", e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let notifier: Arc<dyn Notifier> = bot.clone();
    let monitor = StatusMonitor::new(node.clone(), circuit, notifier, config.monitor.clone());
    let monitor_task = tokio::spawn(monitor.run(shutdown_rx.clone()));

    let listener_task = if cli.no_commands {
        info!("Command listener disabled");
        None
    } else {
        let source: Arc<dyn CommandSource> = bot.clone();
        let dispatcher = Arc::new(CommandDispatcher::new(node, config.telegram.chat_id));
        Some(tokio::spawn(run_listener(source, dispatcher, shutdown_rx)))
    };

    wait_for_shutdown().await;
    info!("Shutting down");
    // Receivers may already be gone if a task ended on its own.
    let _ = shutdown_tx.send(true);

    if let Err(e) = monitor_task.await {
        error!("Monitor task failed: {}", e);
    }
    if let Some(listener) = listener_task {
        if let Err(e) = listener.await {
            error!("Command listener task failed: {}", e);
        }
    }

    if let Err(e) = bot.notify(&messages::stopped()).await {
        warn!("Could not send stop message: {}", e);
    }
    info!("lnwatch stopped");
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
            }
            return;
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Cannot listen for Ctrl-C: {}", e);
            }
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {}", e);
    }
}
