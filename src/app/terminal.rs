use crate::app::config::FileConfig;
use crate::cli::Args;

/// Log level used when `RUST_LOG` is unset.
///
/// Priority: `-q` > `-v`/`-vv` > config `verbosity` > info.
pub(crate) fn resolve_default_log_level(args: &Args, config: &FileConfig) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => config.verbosity.map_or("info", |verbosity| verbosity.log_level()),
        1 => "debug",
        _ => "trace",
    }
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!is_dumb_terminal())
        .with_env_filter(filter)
        .try_init();
}
