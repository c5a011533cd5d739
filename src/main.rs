//! layerfs - Cached overlay of one directory tree on top of another
//!
//! Usage:
//!   layerfs init                 - Write a config file and create the overlay directory
//!   layerfs cat <path>           - Print a file, promoting it into the overlay
//!   layerfs ls <path>            - List a directory merged from both layers
//!   layerfs stat <path>          - Show file metadata
//!   layerfs classify <path>      - Show the cache state of a path
//!   layerfs warm <paths...>      - Promote paths into the overlay ahead of use

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use layerfs::{
    config::Config,
    fs::{self as vfs, overlay::OverlayFs, File, Filesystem},
    metadata::{FileInfo, FileType},
    Error, Result,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "layerfs")]
#[command(version)]
#[command(about = "Cached overlay of one directory tree on top of another")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "~/.config/layerfs/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base directory (overrides the config file)
    #[arg(long, global = true)]
    base: Option<PathBuf>,

    /// Overlay directory (overrides the config file)
    #[arg(long, global = true)]
    overlay: Option<PathBuf>,

    /// Seconds an overlay copy is trusted, 0 = forever (overrides the config file)
    #[arg(long, global = true)]
    cache_duration: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the overlay directory
    Init,

    /// Print a file through the overlay
    Cat {
        /// Path inside the layered tree
        path: PathBuf,
    },

    /// List a directory merged from both layers
    Ls {
        /// Path inside the layered tree
        #[arg(default_value = "/")]
        path: PathBuf,

        /// Entries fetched per listing call (0 = all at once)
        #[arg(long, default_value_t = 0)]
        page: i64,
    },

    /// Show file metadata
    Stat {
        /// Path inside the layered tree
        path: PathBuf,
    },

    /// Show the cache state of a path
    Classify {
        /// Path inside the layered tree
        path: PathBuf,
    },

    /// Promote paths into the overlay ahead of use
    Warm {
        /// Paths inside the layered tree
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);

    // Run the command
    if let Err(e) = run_command(&cli, &config_path) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli, config_path: &Path) -> Result<()> {
    if let Commands::Init = cli.command {
        return cmd_init(cli, config_path);
    }

    let config = load_config(cli, config_path)?;
    let fs = config.open_filesystem()?;
    debug!("Opened {} (cache duration {:?})", fs.name(), fs.cache_duration());

    match &cli.command {
        Commands::Init => Ok(()),
        Commands::Cat { path } => cmd_cat(&fs, path),
        Commands::Ls { path, page } => cmd_ls(&fs, path, *page),
        Commands::Stat { path } => cmd_stat(&fs, path),
        Commands::Classify { path } => cmd_classify(&fs, path),
        Commands::Warm { paths } => cmd_warm(&fs, paths),
    }
}

/// Config file (or defaults plus environment when there is none), then flags
fn load_config(cli: &Cli, config_path: &Path) -> Result<Config> {
    let mut config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        debug!("No config file at {:?}, using defaults", config_path);
        Config::from_env()
    };

    apply_flags(cli, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_flags(cli: &Cli, config: &mut Config) {
    if let Some(base) = &cli.base {
        config.base_dir = expand_tilde(base);
    }
    if let Some(overlay) = &cli.overlay {
        config.overlay_dir = expand_tilde(overlay);
    }
    if let Some(secs) = cli.cache_duration {
        config.cache_duration_secs = secs;
    }
}

fn cmd_init(cli: &Cli, config_path: &Path) -> Result<()> {
    info!("Initializing layerfs...");

    let mut config = Config::from_env();
    apply_flags(cli, &mut config);
    config.validate()?;

    // Ensure config directory exists
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save(config_path)?;
    config.ensure_directories()?;

    info!("Configuration saved to {:?}", config_path);
    info!("Base directory: {:?}", config.base_dir);
    info!("Overlay directory: {:?}", config.overlay_dir);

    Ok(())
}

fn cmd_cat(fs: &OverlayFs, path: &Path) -> Result<()> {
    let mut file = fs.open(path)?;
    let mut stdout = std::io::stdout().lock();
    let mut buf = [0u8; 32 * 1024];

    let copied = loop {
        match file.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if let Err(e) = stdout.write_all(&buf[..n]) {
                    break Err(Error::Io(e));
                }
            }
            Err(e) => break Err(e),
        }
    };

    let closed = file.close();
    stdout.flush()?;
    copied?;
    closed
}

fn cmd_ls(fs: &OverlayFs, path: &Path, page: i64) -> Result<()> {
    let mut dir = fs.open(path)?;

    let listed = loop {
        match vfs::read_dir(dir.as_mut(), page) {
            Ok(entries) => {
                for entry in &entries {
                    println!("{}", format_info(entry.info()));
                }
                if page <= 0 {
                    break Ok(());
                }
            }
            Err(e) if e.is_end_of_listing() => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let closed = dir.close();
    listed?;
    closed
}

fn cmd_stat(fs: &OverlayFs, path: &Path) -> Result<()> {
    let info = vfs::stat(fs, path)?;

    println!("Name:     {}", info.name);
    println!("Type:     {}", kind_name(info.kind));
    println!("Size:     {}", info.size);
    println!("Mode:     {:o}", info.mode);
    println!("Modified: {}", format_time(&info));

    Ok(())
}

fn cmd_classify(fs: &OverlayFs, path: &Path) -> Result<()> {
    let (state, _) = fs.classify(path)?;
    println!("{}: {}", path.display(), state);
    Ok(())
}

fn cmd_warm(fs: &OverlayFs, paths: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in paths {
        match fs.promote(path) {
            Ok(()) => info!("Promoted {}", path.display()),
            Err(e) => {
                warn!("Failed to promote {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(Error::Internal(format!(
            "{} of {} paths could not be promoted",
            failed,
            paths.len()
        )));
    }
    Ok(())
}

fn kind_name(kind: FileType) -> &'static str {
    match kind {
        FileType::RegularFile => "file",
        FileType::Directory => "directory",
        FileType::Symlink => "symlink",
    }
}

fn format_time(info: &FileInfo) -> String {
    let modified: DateTime<Local> = info.modified.into();
    modified.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_info(info: &FileInfo) -> String {
    let kind = match info.kind {
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::RegularFile => '-',
    };
    format!(
        "{} {:>10} {} {}",
        kind,
        info.size,
        format_time(info),
        info.name
    )
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
