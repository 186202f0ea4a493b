//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Resumable, checksum-verified bulk downloads from cookie-authenticated data hosts.
///
/// Tasks come from positional URLs or a task list (`URL [CHECKSUM]` per line,
/// or a JSON array). Interrupted downloads resume on the next run.
#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (use --input for a task list with checksums)
    #[arg(value_name = "URLS")]
    pub urls: Vec<String>,

    /// Task list file (`-` reads stdin)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Directory downloads are written to [default: current directory]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Netscape cookie file holding the saved session [default: ~/.bulk_download_cookiejar.txt]
    #[arg(long, value_name = "FILE", conflicts_with = "no_cookie_jar")]
    pub cookie_jar: Option<PathBuf>,

    /// Keep the session in memory only
    #[arg(long)]
    pub no_cookie_jar: bool,

    /// Endpoint used to check whether the saved session is still valid
    #[arg(long, value_name = "URL")]
    pub probe_url: Option<Url>,

    /// Identity provider username (falls back to BULKFETCH_USERNAME)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
