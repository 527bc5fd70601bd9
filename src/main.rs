use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// Use the library module
use regpull::fetch;

#[derive(Parser)]
#[command(name = "regpull")]
#[command(about = "Pull an image from a Docker Registry v2 API into a loadable tar archive")]
struct Cli {
    /// Image reference in the form registry/repository[:tag] (e.g., gcr.io/distroless/cc:latest)
    image: String,
    /// Output archive path (e.g., image.tar)
    output: PathBuf,
    /// Layer cache directory (default: ~/.regpull/layers)
    #[arg(long, env = "REGPULL_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
    /// Talk to the registry over plain http:// instead of https://
    #[arg(long)]
    plain_http: bool,
    /// Path to CA certificate PEM file for TLS validation
    #[arg(long)]
    cacert: Option<PathBuf>,
    /// Ignore SSL certificate verification
    #[arg(short = 'k', long = "insecure-tls")]
    insecure_tls: bool,
    /// Per-request timeout in seconds (default: 300)
    #[arg(long, default_value = "300")]
    timeout: u64,
    /// Skip sha256 verification of downloaded blobs
    #[arg(long)]
    no_verify: bool,
    /// Registry username presented to the token service
    #[arg(short = 'u', long, env = "REGPULL_USERNAME")]
    username: Option<String>,
    /// Registry password presented to the token service (or use REGPULL_PASSWORD env)
    #[arg(short = 'p', long, env = "REGPULL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            // Usage errors exit with 1 rather than clap's default of 2
            let _ = e.print();
            std::process::exit(1);
        }
    };

    init_tracing(cli.debug);

    match (&cli.username, &cli.password) {
        (Some(_), None) | (None, Some(_)) => {
            eprintln!("Error: registry authentication requires both --username and --password");
            std::process::exit(1);
        }
        _ => {}
    }

    let options = fetch::PullOptions {
        http: fetch::HttpClientOptions {
            insecure_tls: cli.insecure_tls,
            cacert: cli.cacert,
            timeout_secs: cli.timeout,
        },
        cache_dir: cli.cache_dir.unwrap_or_else(fetch::default_cache_dir),
        plain_http: cli.plain_http,
        verify_digests: !cli.no_verify,
        username: cli.username,
        password: cli.password,
    };

    match fetch::pull_image(&cli.image, &cli.output, &options).await {
        Ok(summary) => {
            println!("Pulled {}", summary.reference);
            println!("  Config: {}", summary.config);
            println!(
                "  Layers: {} ({} cached, {} downloaded)",
                summary.layers.len(),
                summary.layers_from_cache,
                summary.layers_downloaded
            );
            println!("  Archive: {}", cli.output.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
