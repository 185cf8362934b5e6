use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "camsrv", version, about = "Camera transcoding supervisor")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the supervisor and its control API
    Serve(ServeArgs),
    /// Send a command to a running server
    Ctl {
        /// Base URL of the server
        #[arg(long, env = "CAMSRV_SERVER", default_value = "http://127.0.0.1:5559")]
        server: String,
        #[command(subcommand)]
        action: CtlAction,
    },
}

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Camera configuration file (TOML)
    #[arg(short, long, env = "CAMSRV_CONFIG")]
    pub config: PathBuf,

    #[arg(long, env = "API_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(short, long, env = "API_PORT", default_value_t = 5559)]
    pub port: u16,

    /// Also write daily-rolling log files here
    #[arg(long, env = "CAMSRV_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Days to keep rolled log files
    #[arg(long, env = "CAMSRV_LOG_RETENTION_DAYS", default_value_t = 7)]
    pub log_retention_days: i64,

    /// Allow cross-origin requests
    #[arg(long, env = "API_ENABLE_CORS")]
    pub cors: bool,
}

#[derive(Debug, Subcommand)]
pub enum CtlAction {
    Start { cam_id: u32 },
    Stop { cam_id: u32 },
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let args = Args::try_parse_from([
            "camsrv", "serve", "--config", "cams.toml", "--port", "6000",
        ])
        .unwrap();
        let Commands::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.config, PathBuf::from("cams.toml"));
        assert_eq!(serve.port, 6000);
        assert!(!serve.cors);
    }

    #[test]
    fn test_parse_ctl() {
        let args = Args::try_parse_from([
            "camsrv", "ctl", "--server", "http://h:1", "start", "7",
        ])
        .unwrap();
        let Commands::Ctl { server, action } = args.command else {
            panic!("expected ctl");
        };
        assert_eq!(server, "http://h:1");
        assert!(matches!(action, CtlAction::Start { cam_id: 7 }));
    }
}
