use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tftp_client::consumer::FileConsumer;
use tftp_client::{EngineConfig, Engine, TftpUri};

/// Fetches a single file over TFTP, TFTM (RFC 2090 multicast), or MTFTP.
#[derive(Parser, Debug)]
#[command(name = "tftp-fetch", version, about)]
struct Cli {
    /// Target, e.g. tftp://10.0.0.1/boot/pxelinux.0, tftm://host/file,
    /// mtftp://host/file
    uri: String,

    /// Where to write the received file
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Path to an EngineConfig TOML file; defaults are used if omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preferred block size (RFC 2348), overriding the config default
    #[arg(long)]
    blksize: Option<usize>,

    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => tftp_client::config::load_config(path)?,
        None => EngineConfig::default(),
    };
    if let Some(blksize) = cli.blksize {
        config.default_block_size = blksize;
    }
    tftp_client::config::validate_config(&config)?;

    let uri = TftpUri::parse(&cli.uri)?;
    let consumer = FileConsumer::create(&cli.output).await?;

    Engine::run(uri, config, Box::new(consumer)).await?;

    println!("wrote {}", cli.output.display());
    Ok(())
}
