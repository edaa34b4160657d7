use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "nbzip")]
#[command(about = "Zip a working directory and stream progress to the browser", long_about = None)]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Serve the current directory on the default port
    nbzip

    # Serve a notebook directory behind a proxy prefix
    nbzip --root ~/notebooks --base-path /user/alice

    # Keep idle proxies from closing long streams
    nbzip --keep-alive-secs 15

    # Load settings from a file (CLI flags still win)
    nbzip --config ./nbzip.toml

ENDPOINTS:
    GET <base>/zip-download                   Status page
    GET <base>/zip-download/api?baseUrl=...   Progress stream (text/event-stream)")]
pub struct Cli {
    /// Address to listen on [default: 127.0.0.1:8888]
    #[arg(long, env = "NBZIP_BIND")]
    pub bind: Option<SocketAddr>,

    /// Directory to archive [default: .]
    #[arg(long, env = "NBZIP_ROOT")]
    pub root: Option<PathBuf>,

    /// Archive file name, written inside the root [default: notebook.zip]
    #[arg(long, env = "NBZIP_ARCHIVE_NAME")]
    pub archive_name: Option<String>,

    /// URL prefix the routes are mounted under [default: /]
    #[arg(long, env = "NBZIP_BASE_PATH")]
    pub base_path: Option<String>,

    /// Send a keep-alive comment when no progress arrives for this many seconds
    #[arg(long, env = "NBZIP_KEEP_ALIVE_SECS")]
    pub keep_alive_secs: Option<u64>,

    /// TOML config file [default: <config dir>/nbzip/config.toml if present]
    #[arg(long, env = "NBZIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default log filter for the chosen verbosity; `RUST_LOG` takes precedence.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "nbzip=info,tower_http=info",
            1 => "nbzip=debug,tower_http=debug",
            _ => "nbzip=trace,tower_http=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "nbzip",
            "--bind",
            "0.0.0.0:9000",
            "--root",
            "/srv/notebooks",
            "--archive-name",
            "bundle.zip",
            "--keep-alive-secs",
            "15",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.bind, Some("0.0.0.0:9000".parse().unwrap()));
        assert_eq!(cli.root, Some(PathBuf::from("/srv/notebooks")));
        assert_eq!(cli.archive_name.as_deref(), Some("bundle.zip"));
        assert_eq!(cli.keep_alive_secs, Some(15));
        assert_eq!(cli.log_filter(), "nbzip=trace,tower_http=trace");
    }

    #[test]
    fn test_parse_rejects_bad_bind() {
        assert!(Cli::try_parse_from(["nbzip", "--bind", "not-an-addr"]).is_err());
    }
}
