//! rust-file-transfer - Main entry point
//!
//! A resumable file-transfer CLI with a local file server, download queue,
//! and progress events.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rust_file_transfer::{
    Authenticator, CliArgs, Command, ErrorCode, FetchConfig, FileServer, ProgressDisplay,
    TransferClient, TransferListener, TransferRequest, TransferStats, TransferStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        let location = panic_info.location().unwrap();

        error!(
            "PANIC occurred at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("rust-file-transfer starting");
    debug!("CLI arguments: {:?}", args);

    let quiet = args.is_quiet();
    match args.command {
        Command::Serve {
            files,
            port,
            credential,
            clear_on_shutdown,
        } => run_serve(files, port, credential, clear_on_shutdown).await?,
        Command::Fetch {
            url,
            output,
            authorization,
            workers,
        } => {
            let config = FetchConfig::from_args(url, output, authorization, workers, quiet);
            config.validate().context("Invalid configuration")?;
            run_fetch(config).await?;
        }
    }

    info!("rust-file-transfer finished");
    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

/// Run the file server until interrupted
async fn run_serve(
    files: Vec<PathBuf>,
    port: u16,
    credential: String,
    clear_on_shutdown: bool,
) -> Result<()> {
    let server = FileServer::builder()
        .bind_addr(([127, 0, 0, 1], port).into())
        .authenticator(Authenticator::equals(credential))
        .clear_registry_on_shutdown(clear_on_shutdown)
        .build();

    let registry = server.registry();
    for file in &files {
        let name = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("file has no usable name: {}", file.display()))?;
        let entry = registry
            .register(file, name)
            .await
            .with_context(|| format!("Failed to register {}", file.display()))?;
        println!(
            "Registered '{}' ({}, id {})",
            entry.name,
            TransferStats::format_bytes(entry.length),
            entry.id
        );
    }

    let addr = server.start().await.context("Failed to start file server")?;
    println!("Serving {} file(s) on fetchlocal://{}/", files.len(), addr);
    println!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;
    println!();
    info!("Interrupt received, shutting down");
    server.shut_down(clear_on_shutdown).await;

    Ok(())
}

/// Listener bridging transfer events to the progress display
struct CliListener {
    display: Arc<Mutex<ProgressDisplay>>,
    terminal: mpsc::UnboundedSender<TransferRequest>,
}

impl TransferListener for CliListener {
    fn on_progress(&self, request: &TransferRequest, eta_millis: i64, bytes_per_second: u64) {
        let stats = TransferStats {
            downloaded: request.downloaded_bytes,
            total: request.total_bytes,
            bytes_per_second,
            eta_millis,
            progress: request.progress(),
        };
        let mut display = self.display.lock().unwrap();
        let _ = display.update(&stats);
    }

    fn on_completed(&self, request: &TransferRequest) {
        let _ = self.terminal.send(request.clone());
    }

    fn on_failed(&self, request: &TransferRequest, _code: ErrorCode) {
        let _ = self.terminal.send(request.clone());
    }
}

/// Run a single download to completion
async fn run_fetch(config: FetchConfig) -> Result<()> {
    info!("Fetching {} to {}", config.url, config.output.display());

    if let Some(parent) = config.output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let client = TransferClient::new(config.client_config())
        .context("Failed to create transfer client")?;

    let display = Arc::new(Mutex::new(ProgressDisplay::new(config.is_quiet())));
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.add_listener(Arc::new(CliListener {
        display: display.clone(),
        terminal: tx,
    }));
    client.start();

    client
        .enqueue(&config.url, &config.output, config.headers())
        .await
        .context("Failed to enqueue download")?;

    let terminal = rx
        .recv()
        .await
        .ok_or_else(|| anyhow::anyhow!("transfer ended without a terminal event"))?;

    let display = display.lock().unwrap();
    let result = match terminal.status {
        TransferStatus::Completed => {
            display.print_complete(&TransferStats {
                downloaded: terminal.downloaded_bytes,
                total: terminal.total_bytes,
                bytes_per_second: 0,
                eta_millis: 0,
                progress: 1.0,
            })?;
            Ok(())
        }
        TransferStatus::Failed => {
            let code = terminal
                .error
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            display.print_error(&format!("transfer failed: {}", code))?;
            Err(anyhow::anyhow!("transfer failed: {}", code))
        }
        other => Err(anyhow::anyhow!("unexpected terminal status: {:?}", other)),
    };

    client.stop();
    result
}
