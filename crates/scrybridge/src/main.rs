mod cli;
mod error;

use std::io::IsTerminal;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use scrybridge_config::Settings;
use scrybridge_core::Bridge;
use scrybridge_facade::AppState;

use crate::cli::{Cli, Command, GlobalOpts, LogFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "scrybridge", &mut std::io::stdout());
            Ok(())
        }
        Command::Check => check(&cli.global).await,
        Command::Serve => serve(&cli.global).await,
    }
}

// ── Settings ─────────────────────────────────────────────────────────

fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(scrybridge_config::config_path);

    let mut settings = scrybridge_config::load(global.config.as_deref(), &global.overrides())
        .map_err(|source| CliError::Config {
            source,
            path: path.display().to_string(),
        })?;

    if settings.password.is_none() && std::io::stdin().is_terminal() {
        let prompt = format!(
            "Password for {}: ",
            settings.username.as_deref().unwrap_or("hub")
        );
        settings.password = Some(rpassword::prompt_password(prompt)?);
    }

    Ok(settings)
}

// ── Commands ─────────────────────────────────────────────────────────

/// Log in once and print the hub's response.
async fn check(global: &GlobalOpts) -> Result<(), CliError> {
    let config = load_settings(global)?.to_bridge_config()?;

    match Bridge::check_login(&config).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(e) => {
            let body = serde_json::json!({ "error": e.to_string() });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(e.into())
        }
    }
}

/// Log in, start mirroring, and serve until interrupted.
async fn serve(global: &GlobalOpts) -> Result<(), CliError> {
    let settings = load_settings(global)?;
    let config = settings.to_bridge_config()?;
    let addr = settings.listen_addr()?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // Login failures end the process here, before anything listens.
    let bridge = Bridge::connect(config, cancel.child_token()).await?;

    let listener = TcpListener::bind(addr).await.map_err(|source| CliError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    let state = AppState::new(Arc::clone(bridge.store()), bridge.snapshots());
    let served = scrybridge_facade::serve(listener, state, cancel.clone().cancelled_owned()).await;

    cancel.cancel();
    bridge.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("interrupt received, shutting down"),
        () = terminate => info!("terminate received, shutting down"),
        () = cancel.cancelled() => debug!("shutdown requested"),
    }
    cancel.cancel();
}
