use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ensign_session::{
    AuthTarget, DeviceAuthFlow, LocalProbe, PairingCoordinator, PairingTracker,
    ProcessController, SessionClient, SessionConfig, SessionEvent, StatusReconciler,
    build_transport,
};
use ensign_types::{AuthPollOutcome, ConnectionState, TransportMode};

/// Retry schedule after asking the daemon to reload.
const RELOAD_RETRIES: u32 = 5;
const RELOAD_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "ensign", version, about = "Client for the ensignd backend daemon")]
struct Cli {
    /// Connect to a remote daemon at this base URL instead of the local socket
    #[arg(long, global = true, value_name = "URL")]
    remote: Option<String>,

    /// API key for the remote daemon
    #[arg(long, global = true, value_name = "KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show daemon status after a one-shot refresh
    Status,
    /// Poll the daemon continuously, printing state changes until ctrl-c
    Watch,
    /// Start the local daemon
    Start,
    /// Stop the local daemon
    Stop,
    /// Restart the local daemon
    Restart,
    /// Ask the daemon to reload its configuration in place
    Reload,
    /// Device-code authorization flows
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Slave node management
    Slaves {
        #[command(subcommand)]
        command: SlavesCommand,
    },
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Authorize a named MCP server
    Login { server: String },
    /// Authorize a Google account
    Google {
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
enum SlavesCommand {
    /// List paired slave nodes
    List,
    /// List pending pairing requests
    Pending,
    /// Approve a pending pairing request
    Approve { hostname: String, pairing_code: String },
    /// Deny a pending pairing request
    Deny { hostname: String, pairing_code: String },
    /// Revoke a slave's credentials
    Revoke { hostname: String },
    /// Restart a slave and wait for it to reconnect
    Restart { hostname: String },
    /// Upgrade a slave and wait for it to reconnect
    Upgrade { hostname: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.remote {
        Some(url) => SessionConfig::remote(url.clone(), cli.api_key.clone()),
        None => SessionConfig::local(),
    };
    let transport = build_transport(&config).context("building transport")?;
    let client = SessionClient::new(transport);

    match cli.command {
        Command::Status => status(client, &config).await,
        Command::Watch => watch(client, &config).await,
        Command::Start => start(&client).await,
        Command::Stop => stop(&client),
        Command::Restart => restart(&client).await,
        Command::Reload => reload(client, &config).await,
        Command::Auth { command } => auth(client, command).await,
        Command::Slaves { command } => slaves(client, command).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn probe_for(config: &SessionConfig) -> Option<LocalProbe> {
    match config.mode {
        TransportMode::Local => Some(LocalProbe::new()),
        TransportMode::Remote { .. } => None,
    }
}

fn require_local(client: &SessionClient) -> Result<ProcessController> {
    if client.is_read_only() {
        bail!("process control requires a local session");
    }
    Ok(ProcessController::new())
}

async fn status(client: SessionClient, config: &SessionConfig) -> Result<()> {
    let (mut reconciler, state_rx, _events) = StatusReconciler::new(
        client,
        probe_for(config),
        PairingTracker::new(),
        config.poll_interval,
    );
    reconciler.refresh().await;

    let state = state_rx.borrow().clone();
    print_state(&state);
    Ok(())
}

async fn watch(client: SessionClient, config: &SessionConfig) -> Result<()> {
    let (reconciler, mut state_rx, mut events) = StatusReconciler::new(
        client,
        probe_for(config),
        PairingTracker::new(),
        config.poll_interval,
    );
    let handle = reconciler.spawn();
    handle.refresh().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow().clone();
                print_state(&state);
            }
            event = events.recv() => match event {
                None => break,
                Some(SessionEvent::PairingRequested(request)) => {
                    println!(
                        "pairing request from {} (code {})",
                        request.hostname, request.pairing_code
                    );
                }
                Some(SessionEvent::OperationFinished { target, confirmed }) => {
                    println!(
                        "{} {}",
                        target,
                        if confirmed { "is back online" } else { "did not come back in time" }
                    );
                }
            },
        }
    }
    handle.shutdown();
    Ok(())
}

async fn start(client: &SessionClient) -> Result<()> {
    let controller = require_local(client)?;
    if controller.is_running() {
        println!("ensignd is already running (pid {})", controller.read_pid().unwrap_or(0));
        return Ok(());
    }
    controller.start().context("starting ensignd")?;
    println!("ensignd started");
    Ok(())
}

fn stop(client: &SessionClient) -> Result<()> {
    let controller = require_local(client)?;
    controller.stop().context("stopping ensignd")?;
    println!("ensignd asked to stop");
    Ok(())
}

async fn restart(client: &SessionClient) -> Result<()> {
    let controller = require_local(client)?;
    controller.restart().await.context("restarting ensignd")?;
    println!("ensignd restarted");
    Ok(())
}

async fn reload(client: SessionClient, config: &SessionConfig) -> Result<()> {
    let controller = require_local(&client)?;
    controller.send_reload().context("signalling reload")?;

    // The daemon drops connections briefly while re-reading config.
    let (mut reconciler, state_rx, _events) = StatusReconciler::new(
        client,
        probe_for(config),
        PairingTracker::new(),
        config.poll_interval,
    );
    reconciler
        .refresh_with_retry(RELOAD_RETRIES, RELOAD_RETRY_DELAY)
        .await;

    let state = state_rx.borrow().clone();
    if state.is_connected() {
        println!("configuration reloaded");
    } else {
        println!(
            "reload signalled, but the daemon has not answered yet ({})",
            state.connection.label()
        );
    }
    Ok(())
}

async fn auth(client: SessionClient, command: AuthCommand) -> Result<()> {
    let target = match command {
        AuthCommand::Login { server } => AuthTarget::McpServer(server),
        AuthCommand::Google { account } => AuthTarget::Google { account },
    };

    let flow = DeviceAuthFlow::new(client);
    let info = flow
        .initiate(&target)
        .await
        .with_context(|| format!("starting authorization for {}", target.label()))?;

    println!("Visit {} and enter code {}", info.verification_uri, info.user_code);

    let cancel = CancellationToken::new();
    let cancel_on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_interrupt.cancel();
        }
    });

    match flow.run(&target, &info, &cancel).await? {
        None => println!("authorization cancelled"),
        Some(AuthPollOutcome::Success) => println!("{} authorized", target.label()),
        Some(outcome) => println!("authorization ended: {}", outcome.label()),
    }
    Ok(())
}

async fn slaves(client: SessionClient, command: SlavesCommand) -> Result<()> {
    match command {
        SlavesCommand::List => {
            let slaves = client.slaves().await.context("listing slaves")?;
            if slaves.is_empty() {
                println!("no slaves paired");
                return Ok(());
            }
            for slave in slaves {
                println!(
                    "{:<24} {:<12} {:>3} tools{}",
                    slave.hostname,
                    slave.status,
                    slave.tool_count,
                    slave
                        .platform
                        .as_deref()
                        .map(|p| format!("  [{p}]"))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        SlavesCommand::Pending => {
            let pending = client.pending_pairings().await.context("listing pending pairings")?;
            if pending.is_empty() {
                println!("no pending pairing requests");
                return Ok(());
            }
            for request in pending {
                println!("{:<24} code {}", request.hostname, request.pairing_code);
            }
            Ok(())
        }
        SlavesCommand::Approve { hostname, pairing_code } => {
            client
                .approve_pairing(&hostname, &pairing_code)
                .await
                .context("approving pairing")?;
            println!("{hostname} approved");
            Ok(())
        }
        SlavesCommand::Deny { hostname, pairing_code } => {
            client
                .deny_pairing(&hostname, &pairing_code)
                .await
                .context("denying pairing")?;
            println!("{hostname} denied");
            Ok(())
        }
        SlavesCommand::Revoke { hostname } => {
            client.revoke_slave(&hostname).await.context("revoking slave")?;
            println!("{hostname} revoked");
            Ok(())
        }
        SlavesCommand::Restart { hostname } => {
            supervise(client, &hostname, Operation::Restart).await
        }
        SlavesCommand::Upgrade { hostname } => {
            supervise(client, &hostname, Operation::Upgrade).await
        }
    }
}

enum Operation {
    Restart,
    Upgrade,
}

/// Kick off a restart/upgrade and stay attached until its monitor reports.
async fn supervise(client: SessionClient, hostname: &str, operation: Operation) -> Result<()> {
    let (event_tx, mut events) = mpsc::channel(4);
    let coordinator = PairingCoordinator::new(client, PairingTracker::new(), event_tx);

    match operation {
        Operation::Restart => {
            coordinator
                .restart_slave(hostname)
                .await
                .context("requesting restart")?;
            println!("{hostname} restarting...");
        }
        Operation::Upgrade => {
            coordinator
                .upgrade_slave(hostname)
                .await
                .context("requesting upgrade")?;
            println!("{hostname} upgrading...");
        }
    }

    match events.recv().await {
        Some(SessionEvent::OperationFinished { target, confirmed: true }) => {
            println!("{target} is back online");
        }
        Some(SessionEvent::OperationFinished { target, confirmed: false }) => {
            println!("{target} did not reconnect in time; check it manually");
        }
        _ => {}
    }
    Ok(())
}

fn print_state(state: &ensign_session::SessionState) {
    match &state.connection {
        ConnectionState::Connected => {
            let snapshot = &state.snapshot;
            println!(
                "ensignd {} (pid {}), up {}",
                snapshot.version, snapshot.pid, snapshot.uptime
            );
            println!(
                "{} tools across {} MCP servers ({} connected)",
                snapshot.total_tools,
                snapshot.mcp_servers.len(),
                snapshot.connected_servers()
            );
            for server in &snapshot.mcp_servers {
                println!(
                    "  {:<20} {}{}",
                    server.name,
                    if server.connected { "connected" } else { "disconnected" },
                    server
                        .error
                        .as_deref()
                        .map(|e| format!(" ({e})"))
                        .unwrap_or_default()
                );
            }
            if !state.slaves.is_empty() {
                println!("{} slave(s) paired", state.slaves.len());
            }
            if !state.pending_pairings.is_empty() {
                println!("{} pairing request(s) pending", state.pending_pairings.len());
            }
        }
        ConnectionState::Error(label) => {
            println!(
                "connection error: {label}{}",
                state
                    .last_error
                    .as_deref()
                    .map(|e| format!(" ({e})"))
                    .unwrap_or_default()
            );
        }
        other => println!("{}", other.label()),
    }
}
