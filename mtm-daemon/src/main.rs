//! mtmd - manufacturing-test signal override daemon
//!
//! Hosts the signal override engine behind a Unix domain socket for the
//! upstream command-dispatch layer. Runs privileged: it drives LED, GPIO,
//! and fan-control services on behalf of an authorized factory operator,
//! and guarantees every forced test state reverts after a bounded idle
//! period.
//!
//! # Security Model
//! - **Privilege**: runs as root to reach the system bus control services
//! - **Socket**: Unix domain socket with owner-only permissions (0600)
//! - **Validation**: all request parameters re-validated server-side
//! - **Audit**: peer credential logging (UID/GID/PID) for all operations
//! - **Safety**: a global revert timer bounds every outstanding override

mod bus;
mod server;

use std::path::Path;
use tracing::{debug, error, info, warn};

use mtm_core::{EngineConfig, OverrideEngine, DEFAULT_CONFIG_PATH};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Platform Paths
// ============================================================================

fn get_default_socket_path() -> &'static str {
    if Path::new("/run").exists() {
        "/run/mtmd.sock"
    } else {
        "/var/run/mtmd.sock"
    }
}

// ============================================================================
// Security Hardening
// ============================================================================

/// Set restrictive umask
fn set_secure_umask() {
    // 0077 = owner has all permissions, group/other have none
    // SAFETY: umask is always safe to call - it simply sets the file creation mask.
    unsafe { libc::umask(0o077) };
    debug!("Umask set to 0077");
}

/// Change to root directory (prevent directory-based attacks)
fn secure_working_directory() {
    if std::env::set_current_dir("/").is_err() {
        warn!("Could not chdir to /");
    }
}

/// Verify we're running as root
fn verify_privileges() -> Result<(), &'static str> {
    // SAFETY: geteuid/getuid are always safe - they just return the process's user IDs.
    let euid = unsafe { libc::geteuid() };
    let uid = unsafe { libc::getuid() };

    if euid != 0 {
        return Err("Daemon must run as root (euid=0) to reach the control services");
    }

    if uid != 0 && euid == 0 {
        warn!("Running as setuid root - this is not recommended");
    }

    info!("Running as root (uid={}, euid={})", uid, euid);
    Ok(())
}

/// Validate socket path for security
fn validate_socket_path(path: &str) -> Result<(), String> {
    let p = Path::new(path);

    if !p.is_absolute() {
        return Err("Socket path must be absolute".into());
    }

    if path.contains("..") {
        return Err("Socket path contains path traversal".into());
    }

    if path.contains('\0') {
        return Err("Socket path contains null byte".into());
    }

    let safe_dirs = ["/run/", "/var/run/", "/tmp/"];
    if !safe_dirs.iter().any(|d| path.starts_with(d)) {
        return Err(format!("Socket path must be under {:?}", safe_dirs));
    }

    // Refuse to reuse a symlink (symlink attack prevention)
    if p.exists()
        && p.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    {
        return Err("Socket path is a symlink - refusing for security".into());
    }

    Ok(())
}

// ============================================================================
// Cleanup
// ============================================================================

fn cleanup(socket_path: &str) {
    if Path::new(socket_path).exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("Failed to remove socket: {}", e);
        }
    }
    info!("Cleanup complete");
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("mtmd {} - manufacturing-test signal override daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    mtmd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -s, --socket PATH   Socket path (default: auto-detected)");
    eprintln!("    -c, --config PATH   Config file (default: {})", DEFAULT_CONFIG_PATH);
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    MTMD_LOG            Log level (trace, debug, info, warn, error)");
}

fn print_version() {
    println!("mtmd {}", VERSION);
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 0: panic handler so a crash is visible in the journal
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
    }));

    // PHASE 1: pre-initialization hardening
    set_secure_umask();
    secure_working_directory();

    // PHASE 2: parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut socket_path = get_default_socket_path().to_string();
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            "-s" | "--socket" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --socket requires a path argument");
                    std::process::exit(1);
                }
                socket_path = args[i].clone();
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = args[i].clone();
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    // PHASE 3: logging to the systemd journal, stdout fallback
    let log_level = std::env::var("MTMD_LOG").unwrap_or_else(|_| "info".to_string());
    let mut use_journald = Path::new("/run/systemd/journal/socket").exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
                use_journald = false;
                tracing_subscriber::fmt()
                    .with_target(false)
                    .with_level(true)
                    .with_env_filter(&log_level)
                    .init();
            }
        }
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_env_filter(&log_level)
            .init();
    }

    info!("STARTUP: mtmd {} starting", VERSION);
    info!(
        "STARTUP: Logging to {}",
        if use_journald { "systemd journal" } else { "stdout" }
    );

    // PHASE 4: privilege and path checks
    if let Err(e) = verify_privileges() {
        error!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = validate_socket_path(&socket_path) {
        error!("Invalid socket path: {}", e);
        std::process::exit(1);
    }

    // PHASE 5: signal handler for clean shutdown
    let socket_path_clone = socket_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - shutting down");
        cleanup(&socket_path_clone);
        std::process::exit(0);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    // PHASE 6: engine configuration
    let config = match EngineConfig::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config {}: {}", config_path, e);
            std::process::exit(1);
        }
    };
    info!(
        "STARTUP: Socket path: {}, revert timeout: {}s",
        socket_path, config.revert_timeout_secs
    );

    // PHASE 7: engine + server on the single dispatch loop
    let engine = OverrideEngine::new(bus::BusctlBus::new(), &config);
    let result = server::run_server(&socket_path, engine).await;

    cleanup(&socket_path);

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
