use arpguard::config;
use arpguard::telemetry::{init_logging, MetricsRegistry};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "arpguard")]
#[command(about = "A hardened ARP engine with conflict detection and RARP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the responder daemon
    Run {
        /// Path to arpguard.lock file
        #[arg(short, long, default_value = "arpguard.lock")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate arpguard.lock from arpguard.toml
    Generate {
        /// Path to arpguard.toml
        #[arg(short, long, default_value = "arpguard.toml")]
        config: PathBuf,

        /// Output path for arpguard.lock
        #[arg(short, long, default_value = "arpguard.lock")]
        output: PathBuf,
    },
    /// Validate arpguard.toml without generating a lock file
    Validate {
        /// Path to arpguard.toml
        #[arg(short, long, default_value = "arpguard.toml")]
        config: PathBuf,
    },
}

fn main() {
    // RUST_LOG env var takes priority
    init_logging(None);

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Generate {
                config: config_path,
                output,
            } => {
                if let Err(e) = cmd_config_generate(&config_path, &output) {
                    eprintln!("[ERROR] {}", e);
                    std::process::exit(1);
                }
            }
            ConfigAction::Validate {
                config: config_path,
            } => {
                if let Err(e) = cmd_config_validate(&config_path) {
                    eprintln!("[ERROR] {}", e);
                    std::process::exit(1);
                }
            }
        },
        Some(Commands::Run { config: lock_path }) => {
            if let Err(e) = cmd_run(&lock_path) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
        None => {
            info!("arpguard starting...");
            if let Err(e) = cmd_run(&PathBuf::from("arpguard.lock")) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn cmd_run(lock_path: &PathBuf) -> Result<(), String> {
    use arpguard::capture::AfPacketSocket;
    use arpguard::engine::Engine;
    use std::collections::HashMap;
    use std::time::{Duration, Instant};
    use tokio::runtime::Runtime;
    use tokio::time::interval;
    use tracing::{error, warn};

    info!("Loading {}...", lock_path.display());

    let lock =
        config::load_lock(lock_path).map_err(|e| format!("Failed to load lock file: {}", e))?;
    let mut runtime_config = lock.to_config();

    // Resolve MACs left as "auto" in the lock
    for (name, iface) in runtime_config.interfaces.iter_mut() {
        if iface.mac.is_none() {
            iface.mac = Some(read_interface_mac(name)?);
        }
    }

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let metrics = Arc::new(MetricsRegistry::new());
        let mut engine = Engine::from_config(&runtime_config, metrics)
            .map_err(|e| format!("Failed to build engine: {}", e))?;

        let mut sockets: HashMap<String, AfPacketSocket> = HashMap::new();
        for name in engine.interface_names() {
            info!("Binding to interface {}...", name);
            let socket = AfPacketSocket::bind(&name).map_err(|e| {
                format!(
                    "Failed to bind to {}: {}. Run with root privileges.",
                    name, e
                )
            })?;
            sockets.insert(name, socket);
        }

        let interface_names = engine.interface_names();
        if interface_names.is_empty() {
            return Err("No interfaces configured".to_string());
        }

        info!("Engine started, processing packets...");

        let epoch = Instant::now();
        let mut tick_timer = interval(Duration::from_millis(200));

        // TODO: multiplex receive across all interfaces; packets are
        // currently read from the first configured interface only
        let iface_name = interface_names[0].clone();
        let mut buf = vec![0u8; 2048];

        loop {
            tokio::select! {
                _ = tick_timer.tick() => {
                    let now = epoch.elapsed().as_millis() as u64;
                    for (out_iface, frame) in engine.tick(now) {
                        if let Some(socket) = sockets.get_mut(&out_iface) {
                            if let Err(e) = socket.send(without_fcs(&frame)).await {
                                warn!("Failed to send on {}: {}", out_iface, e);
                            }
                        }
                    }
                }
                result = async {
                    match sockets.get_mut(&iface_name) {
                        Some(socket) => socket.recv(&mut buf).await,
                        None => Err(arpguard::Error::InterfaceNotFound { name: iface_name.clone() }),
                    }
                } => {
                    match result {
                        Ok(rx_info) => {
                            let now = epoch.elapsed().as_millis() as u64;
                            // The kernel strips the FCS on receive; restore
                            // it so the codec's framing checks apply
                            let frame = with_fcs(&buf[..rx_info.len]);
                            if let Some(reply) = engine.step(&iface_name, &frame, now) {
                                if let Some(socket) = sockets.get_mut(&iface_name) {
                                    if let Err(e) = socket.send(without_fcs(&reply)).await {
                                        warn!("Failed to send on {}: {}", iface_name, e);
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            error!("Receive error: {}", e);
                        }
                    }
                }
            }
        }
    })
}

/// Append a computed FCS to a kernel-delivered frame.
fn with_fcs(frame: &[u8]) -> Vec<u8> {
    let mut out = frame.to_vec();
    out.extend_from_slice(&arpguard::protocol::crc::crc32(frame).to_le_bytes());
    out
}

/// Strip the FCS before handing a frame to the NIC, which appends its own.
fn without_fcs(frame: &[u8]) -> &[u8] {
    &frame[..frame.len().saturating_sub(4)]
}

fn read_interface_mac(name: &str) -> Result<String, String> {
    let path = format!("/sys/class/net/{}/address", name);
    std::fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| format!("Failed to read MAC for {}: {}", name, e))
}

fn cmd_config_generate(config_path: &PathBuf, output_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let content = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let lock = config::generate_lock(&cfg, &content);

    let lock_toml =
        toml::to_string_pretty(&lock).map_err(|e| format!("Failed to serialize lock: {}", e))?;

    let output = format!(
        "# Generated by arpguard - DO NOT EDIT\n# Source: {} (sha256: {})\n\n{}",
        config_path.display(),
        &lock.source_hash[..16],
        lock_toml
    );

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
