use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Caching proxy for package-manager downloads",
    long_about = "A caching proxy for package downloads on a local network.\n\
                  \n\
                  Point your package manager at this proxy (e.g. a proxy= line in\n\
                  dnf.conf) and every fetched file is stored once under the cache\n\
                  directory and served from there for all later requests. Repository\n\
                  metadata files are re-fetched after a configurable retention window\n\
                  so clients keep seeing updates; package content is kept forever."
)]
pub struct CliArgs {
    /// Address the proxy listens on
    #[arg(
        short,
        long,
        default_value = "0.0.0.0:3142",
        help = "Address and port the proxy listens on"
    )]
    pub listen: SocketAddr,

    /// Directory cached downloads are stored under
    #[arg(
        short,
        long,
        default_value = "/var/cache/pakio",
        help = "Directory the cached files are stored under, mirroring the remote hierarchy"
    )]
    pub cache_dir: PathBuf,

    /// Log verbosity, 0 (silence) to 4 (debug)
    #[arg(
        short = 'v',
        long,
        default_value = "3",
        value_parser = clap::value_parser!(u8).range(0..=4),
        help = "Log verbosity: 0 = silence, 1 = error, 2 = warn, 3 = info, 4 = debug"
    )]
    pub log_level: u8,

    /// Disable colorized log output
    #[arg(long, help = "Disable ANSI colors in terminal log output")]
    pub no_color: bool,

    /// Metadata file names that expire (repeatable)
    #[arg(
        long = "md-file",
        value_name = "NAME",
        help = "File name treated as repository metadata, subject to expiry (can be used multiple times; default: repomd.xml)"
    )]
    pub md_files: Vec<String>,

    /// Minutes a cached metadata file stays fresh
    #[arg(
        long,
        default_value = "360",
        value_name = "MINUTES",
        help = "How many minutes to keep metadata files before re-fetching them"
    )]
    pub md_keep: u64,

    /// Seconds to wait on another worker's download of the same file
    #[arg(
        long,
        default_value = "60",
        value_name = "SECONDS",
        help = "Upper bound in seconds on waiting for a concurrent download of the same file"
    )]
    pub wait_timeout: u64,

    /// Overall timeout in seconds for upstream requests
    #[arg(
        long,
        default_value = "0",
        help = "Overall timeout in seconds for upstream HTTP requests. Use 0 for unlimited."
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// User agent for upstream requests
    #[arg(long, help = "Override the user agent sent with upstream requests")]
    pub user_agent: Option<String>,
}
