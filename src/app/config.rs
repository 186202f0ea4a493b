//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use url::Url;

/// File configuration for bulkfetch defaults (`key = value`, TOML subset).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FileConfig {
    /// Default output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Netscape cookie file holding the saved session.
    pub cookie_jar: Option<PathBuf>,
    /// Endpoint probed to validate the saved session.
    pub probe_url: Option<Url>,
    /// Account name for the identity provider.
    pub username: Option<String>,
    /// Download client connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Download client read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Probe/login request timeout in seconds.
    pub probe_timeout_secs: Option<u64>,
    /// Minimum spacing between progress redraws in milliseconds.
    pub progress_interval_ms: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub(crate) fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        validate_timeout_secs("probe_timeout_secs", self.probe_timeout_secs)?;

        if let Some(interval) = self.progress_interval_ms
            && !(10..=10_000).contains(&interval)
        {
            bail!(
                "Invalid config value for `progress_interval_ms`: {interval}. Expected range: 10..=10000"
            );
        }
        if let Some(username) = &self.username
            && username.trim().is_empty()
        {
            bail!("Invalid config value for `username`: must not be empty");
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when neither `RUST_LOG` nor a CLI flag decides.
    #[must_use]
    pub(crate) fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bulkfetch/config.toml`
/// 2. `$HOME/.config/bulkfetch/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bulkfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bulkfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path; a missing file yields defaults.
pub(crate) fn load_default_file_config() -> Result<FileConfig> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "cookie_jar" => {
                cfg.cookie_jar = Some(expand_home(&parse_string_literal(value).with_context(invalid)?));
            }
            "probe_url" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.probe_url = Some(Url::parse(&parsed).with_context(invalid)?);
            }
            "username" => {
                cfg.username = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "probe_timeout_secs" => {
                cfg.probe_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "progress_interval_ms" => {
                cfg.progress_interval_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Expands a leading `~/` against `$HOME`.
pub(crate) fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), env_var_non_empty_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(raw),
    }
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_all_fields() {
        let raw = r#"
# bulkfetch defaults
output_dir = "/data/granules"
cookie_jar = "/tmp/jar.txt"   # session cookies
probe_url = "https://urs.example.org/profile"
username = "alice"
connect_timeout_secs = 15
read_timeout_secs = 600
probe_timeout_secs = 5
progress_interval_ms = 500
verbosity = "verbose"
"#;
        let cfg = parse_config_str(raw).unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/data/granules")));
        assert_eq!(cfg.cookie_jar, Some(PathBuf::from("/tmp/jar.txt")));
        assert_eq!(
            cfg.probe_url.unwrap().as_str(),
            "https://urs.example.org/profile"
        );
        assert_eq!(cfg.username.as_deref(), Some("alice"));
        assert_eq!(cfg.connect_timeout_secs, Some(15));
        assert_eq!(cfg.read_timeout_secs, Some(600));
        assert_eq!(cfg.probe_timeout_secs, Some(5));
        assert_eq!(cfg.progress_interval_ms, Some(500));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
    }

    #[test]
    fn test_parse_config_empty_is_default() {
        assert_eq!(parse_config_str("\n# nothing\n").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_parse_config_hash_inside_string_is_kept() {
        let cfg = parse_config_str(r#"output_dir = "/data/#1""#).unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/data/#1")));
    }

    #[test]
    fn test_parse_config_unknown_key_errors() {
        let err = parse_config_str("concurrency = 4").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_parse_config_missing_equals_errors() {
        let err = parse_config_str("output_dir").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_config_unquoted_string_errors() {
        assert!(parse_config_str("username = alice").is_err());
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_timeout() {
        let err = parse_config_str("read_timeout_secs = 0").unwrap_err();
        assert!(format!("{err:#}").contains("read_timeout_secs"));
        assert!(parse_config_str("connect_timeout_secs = -1").is_err());
    }

    #[test]
    fn test_parse_config_rejects_invalid_probe_url() {
        assert!(parse_config_str(r#"probe_url = "not a url""#).is_err());
    }

    #[test]
    fn test_parse_config_rejects_unknown_verbosity() {
        assert!(parse_config_str(r#"verbosity = "loud""#).is_err());
    }

    #[test]
    fn test_verbosity_log_levels() {
        assert_eq!(VerbositySetting::Default.log_level(), "info");
        assert_eq!(VerbositySetting::Quiet.log_level(), "error");
        assert_eq!(VerbositySetting::Debug.log_level(), "trace");
    }
}
