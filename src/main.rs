use clap::{Parser, Subcommand};
use shardnet::config::Settings;
use shardnet_core::file::{self, FileLayerConfig};
use shardnet_core::membership;
use shardnet_core::{AesGcmCipher, Node, PeerAddress};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A peer-to-peer content-addressed file store node.
#[derive(Parser)]
#[clap(version)]
struct Args {
    /// Overrides the data directory from config.toml / the built-in default.
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Overrides the listen host.
    #[clap(long, global = true)]
    host: Option<String>,

    /// Overrides the listen port. `0` lets the OS pick one.
    #[clap(long, global = true)]
    port: Option<u16>,

    /// Encrypts uploaded parts with a per-file AES-256-GCM key.
    #[clap(long, global = true)]
    encrypt: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy)]
struct PeerArg(PeerAddress);

impl FromStr for PeerArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got {s:?}"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port in {s:?}"))?;
        Ok(PeerArg(PeerAddress::new(host, port)))
    }
}

impl std::fmt::Debug for PeerArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Starts a node and keeps it listening until Ctrl+C.
    Serve {
        /// Known peer to join the network through (`host:port`).
        #[clap(long)]
        join: Option<PeerArg>,
    },
    /// Connects this node to a peer (`host:port`), then exits.
    Connect { peer: PeerArg },
    /// Walks the gossip network starting from `seed` (`host:port`), then exits.
    Join { seed: PeerArg },
    /// Disconnects from every currently-known peer, then exits.
    Leave,
    /// Uploads a local file, splitting and replicating it across peers.
    Upload {
        /// Path of the file to upload.
        path: PathBuf,
        /// How many peers each part is replicated to.
        #[clap(long)]
        replication: Option<usize>,
        /// Part size in bytes.
        #[clap(long)]
        chunk_size: Option<usize>,
    },
    /// Downloads a previously uploaded file by its basename.
    Download {
        /// The basename the file was uploaded under.
        basename: String,
        /// Where to write the reassembled file.
        out_path: PathBuf,
    },
    /// Removes a previously uploaded file from the network.
    Remove { basename: String },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (cmd_chunk_size, cmd_replication) = match &args.cmd {
        Command::Upload {
            chunk_size,
            replication,
            ..
        } => (*chunk_size, *replication),
        _ => (None, None),
    };

    let data_dir = args
        .data_dir
        .clone()
        .or(settings.data_dir)
        .unwrap_or_else(shardnet::config::default_data_dir);
    let host = args
        .host
        .clone()
        .or(settings.host)
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.port.or(settings.port).unwrap_or(0);

    let node = match Node::bind(host, port, data_dir) {
        Ok(n) => n,
        Err(e) => {
            log::error!("failed to start node: {e}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("node listening on {}", node.local_addr());

    let cipher = if args.encrypt { Some(AesGcmCipher) } else { None };
    let file_cfg = FileLayerConfig {
        chunk_size: cmd_chunk_size
            .or(settings.chunk_size)
            .unwrap_or(FileLayerConfig::default().chunk_size),
        replication: cmd_replication
            .or(settings.replication_factor)
            .unwrap_or(FileLayerConfig::default().replication),
    };

    let result = run(&node, args.cmd, &file_cfg, cipher.as_ref());

    if !matches!(result, Ok(true)) {
        node.shutdown();
    }

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Runs one subcommand. Returns `Ok(true)` for `Serve`, which already
/// shuts the node down itself once its Ctrl+C handler fires.
fn run(
    node: &Node,
    cmd: Command,
    file_cfg: &FileLayerConfig,
    cipher: Option<&AesGcmCipher>,
) -> Result<bool, shardnet_core::Error> {
    match cmd {
        Command::Serve { join } => {
            if let Some(PeerArg(seed)) = join {
                membership::join_network(node.registry(), seed);
            }
            wait_for_ctrl_c(node);
            Ok(true)
        }
        Command::Connect { peer: PeerArg(p) } => {
            membership::send_connect(node.registry(), &p)?;
            println!("connected to {p}");
            Ok(false)
        }
        Command::Join { seed: PeerArg(seed) } => {
            membership::join_network(node.registry(), seed);
            println!("known peers: {}", node.registry().len());
            Ok(false)
        }
        Command::Leave => {
            membership::leave_network(node.registry());
            Ok(false)
        }
        Command::Upload { path, .. } => {
            file::upload_file(node, &path, file_cfg, cipher.map(|c| c as _))?;
            println!("uploaded {}", path.display());
            Ok(false)
        }
        Command::Download { basename, out_path } => {
            file::download_file(node, &basename, &out_path, cipher.map(|c| c as _))?;
            println!("downloaded {basename} to {}", out_path.display());
            Ok(false)
        }
        Command::Remove { basename } => {
            file::remove_file(node, &basename)?;
            println!("removed {basename}");
            Ok(false)
        }
    }
}

/// Blocks until Ctrl+C, then shuts the node down. Used only by `serve`.
fn wait_for_ctrl_c(node: &Node) {
    let triggered = Arc::new(AtomicBool::new(false));
    let flag = triggered.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        log::warn!("failed to install Ctrl+C handler: {e}");
    }
    while !triggered.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
    log::info!("shutting down");
    node.shutdown();
}
