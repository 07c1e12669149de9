use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use mixer_tonic_core::mixer::Dictionary;
use std::{path::PathBuf, sync::Arc};

/// Runtime configuration for the `mixer-server` binary.
///
/// Every setting can be given as a flag or through the environment (and
/// therefore a `.env` file). The defaults suit a sidecar-facing deployment
/// with many mostly idle streams.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mixer-server",
    version,
    about = "A gRPC service for streaming attribute checks, reports and quotas"
)]
pub struct CliArgs {
    /// Number of pool workers executing requests concurrently, across all
    /// streams.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 1024)]
    pub num_workers: usize,

    /// Capacity of each stream's response buffer.
    ///
    /// Workers wait for space once this many responses are queued for a
    /// client that is slow to read.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 64)]
    pub stream_buffer_size: usize,

    /// Maximum number of requests from one stream executing at once. `0`
    /// disables the limit.
    ///
    /// When the limit is hit the stream stops reading until a request
    /// finishes, pushing back on the client through HTTP/2 flow control.
    ///
    /// Environment variable: `MAX_INFLIGHT_PER_STREAM`
    #[arg(long, env = "MAX_INFLIGHT_PER_STREAM", default_value_t = 0)]
    pub max_inflight_per_stream: usize,

    /// Seconds open streams get to finish on shutdown before the worker pool
    /// is stopped.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// File with the global attribute dictionary, one word per line.
    ///
    /// Defaults to the built-in list of well-known attribute names.
    ///
    /// Environment variable: `DICTIONARY_FILE`
    #[arg(long, env = "DICTIONARY_FILE")]
    pub dictionary_file: Option<PathBuf>,

    /// Validity duration, in milliseconds, of a successful check.
    ///
    /// Environment variable: `CHECK_EXPIRATION_MS`
    #[arg(long, env = "CHECK_EXPIRATION_MS", default_value_t = 5000)]
    pub check_expiration_ms: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:9091" or "/tmp/mixer.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:9091"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub num_workers: usize,
    pub stream_buffer_size: usize,
    pub max_inflight_per_stream: usize,
    pub shutdown_timeout: Duration,
    pub dictionary: Arc<Dictionary>,
    pub check_expiration: Duration,
    pub server_addr: String,
    pub uds: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        let dictionary = match &args.dictionary_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let dictionary = parse_dictionary(&raw);
                if dictionary.is_empty() {
                    bail!("DICTIONARY_FILE {} has no words", path.display());
                }
                dictionary
            }
            None => Dictionary::well_known(),
        };

        Ok(Self {
            num_workers: args.num_workers,
            stream_buffer_size: args.stream_buffer_size,
            max_inflight_per_stream: args.max_inflight_per_stream,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            dictionary: Arc::new(dictionary),
            check_expiration: Duration::from_millis(args.check_expiration_ms),
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}

/// One word per line; blank lines and `#` comments are skipped.
fn parse_dictionary(raw: &str) -> Dictionary {
    Dictionary::new(
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["mixer-server"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::try_from(args(&[])).unwrap();
        assert!(config.num_workers > 0);
        assert_eq!(config.dictionary.len(), Dictionary::well_known().len());
    }

    #[test]
    fn rejects_zero_workers() {
        let err = ServerConfig::try_from(args(&["--num-workers", "0"])).unwrap_err();
        assert!(err.to_string().contains("NUM_WORKERS"));
    }

    #[test]
    fn rejects_zero_stream_buffer() {
        let err = ServerConfig::try_from(args(&["--stream-buffer-size", "0"])).unwrap_err();
        assert!(err.to_string().contains("STREAM_BUFFER_SIZE"));
    }

    #[test]
    fn rejects_missing_dictionary_file() {
        let result = ServerConfig::try_from(args(&[
            "--dictionary-file",
            "/nonexistent/mixer/dictionary.txt",
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn loads_dictionary_file() {
        let path = std::env::temp_dir().join(format!("mixer-dict-{}.txt", std::process::id()));
        std::fs::write(&path, "# global words\nsource.name\n\n  target.name  \n").unwrap();

        let config =
            ServerConfig::try_from(args(&["--dictionary-file", path.to_str().unwrap()])).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.dictionary.len(), 2);
        assert_eq!(config.dictionary.index_of("source.name"), Some(0));
        assert_eq!(config.dictionary.index_of("target.name"), Some(1));
    }

    #[test]
    fn durations_are_converted() {
        let config = ServerConfig::try_from(args(&[
            "--check-expiration-ms",
            "250",
            "--shutdown-timeout",
            "7",
        ]))
        .unwrap();
        assert_eq!(config.check_expiration, Duration::from_millis(250));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(7));
    }
}
