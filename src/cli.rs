use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

use crate::config::LivepadConfig;
use crate::convert::ConversionTarget;
use crate::session::TickPolicy;

#[derive(Parser, Debug)]
#[command(name = "livepad")]
#[command(version)]
#[command(about = "Live HTML/CSS/JS preview server with a triple-pane browser editor")]
pub struct Args {
    /// Config file (defaults to ./livepad.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind the web UI to
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the web UI server
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Do not open a browser window on start
    #[arg(long)]
    pub no_open: bool,

    /// Start sessions with live mode off (manual render only)
    #[arg(long)]
    pub no_live: bool,

    /// Fallback tick period in milliseconds; 0 disables it
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Only re-render on a tick when the buffers changed
    #[arg(long)]
    pub tick_when_stale: bool,

    /// Initial HTML buffer
    #[arg(long)]
    pub html: Option<PathBuf>,

    /// Initial CSS buffer
    #[arg(long)]
    pub css: Option<PathBuf>,

    /// Initial JS buffer
    #[arg(long)]
    pub js: Option<PathBuf>,

    /// Compose the buffers once into this file and exit
    #[arg(long, value_name = "PATH")]
    pub render_to: Option<PathBuf>,

    /// Generate a conversion package and exit
    #[arg(long, value_enum)]
    pub convert: Option<ConversionTarget>,

    /// Application name for --convert
    #[arg(long, default_value = "MyApp")]
    pub app_name: String,

    /// Application version for --convert
    #[arg(long, default_value = "1.0.0")]
    pub app_version: String,

    /// Application description for --convert
    #[arg(long, default_value = "")]
    pub app_description: String,

    /// Output path for --convert (defaults to {app}-{target}.zip)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Print a project review of the buffers and exit
    #[arg(long)]
    pub review: bool,

    /// Print shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(long, short)]
    pub verbose: bool,
}

impl Args {
    /// Fold command-line overrides into a loaded config.
    pub fn apply_to(&self, config: &mut LivepadConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.no_open {
            config.server.open_browser = false;
        }
        if self.no_live {
            config.preview.live_mode = false;
        }
        if let Some(ms) = self.tick_ms {
            config.preview.tick_ms = ms;
        }
        if self.tick_when_stale {
            config.preview.tick_policy = TickPolicy::WhenStale;
        }
    }

    /// True when a one-shot mode was requested instead of serving.
    pub fn is_one_shot(&self) -> bool {
        self.render_to.is_some() || self.convert.is_some() || self.review || self.completions.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["livepad"]);
        assert!(args.config.is_none());
        assert!(args.port.is_none());
        assert!(!args.no_open);
        assert!(!args.no_live);
        assert!(!args.review);
        assert_eq!(args.app_name, "MyApp");
        assert_eq!(args.app_version, "1.0.0");
        assert!(!args.is_one_shot());
    }

    #[test]
    fn test_args_parse_serve_flags() {
        let args = Args::parse_from([
            "livepad",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--no-open",
            "--no-live",
            "--tick-ms",
            "250",
        ]);
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(9000));
        assert!(args.no_open);
        assert!(args.no_live);
        assert_eq!(args.tick_ms, Some(250));
    }

    #[test]
    fn test_args_short_port() {
        let args = Args::parse_from(["livepad", "-p", "3000"]);
        assert_eq!(args.port, Some(3000));
    }

    #[test]
    fn test_args_parse_convert() {
        let args = Args::parse_from([
            "livepad",
            "--convert",
            "apk",
            "--app-name",
            "Atlas",
            "--output",
            "out.zip",
        ]);
        assert_eq!(args.convert, Some(ConversionTarget::Apk));
        assert_eq!(args.app_name, "Atlas");
        assert_eq!(args.output, Some(PathBuf::from("out.zip")));
        assert!(args.is_one_shot());
    }

    #[test]
    fn test_each_one_shot_flag_skips_serving() {
        for argv in [
            &["livepad", "--review"][..],
            &["livepad", "--render-to", "out.html"][..],
            &["livepad", "--convert", "web"][..],
            &["livepad", "--completions", "bash"][..],
        ] {
            assert!(Args::parse_from(argv).is_one_shot(), "{argv:?}");
        }
        assert!(!Args::parse_from(["livepad", "--no-open", "--port", "9000"]).is_one_shot());
    }

    #[test]
    fn test_args_reject_unknown_target() {
        assert!(Args::try_parse_from(["livepad", "--convert", "dmg"]).is_err());
    }

    #[test]
    fn test_args_render_to_is_one_shot() {
        let args = Args::parse_from(["livepad", "--html", "a.html", "--render-to", "out.html"]);
        assert_eq!(args.html, Some(PathBuf::from("a.html")));
        assert!(args.is_one_shot());
    }

    #[test]
    fn test_args_completions() {
        let args = Args::parse_from(["livepad", "--completions", "bash"]);
        assert_eq!(args.completions, Some(Shell::Bash));
    }

    #[test]
    fn test_apply_overrides_config() {
        let args = Args::parse_from([
            "livepad",
            "--port",
            "9100",
            "--no-open",
            "--no-live",
            "--tick-ms",
            "0",
            "--tick-when-stale",
        ]);
        let mut config = LivepadConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.server.port, 9100);
        assert!(!config.server.open_browser);
        assert!(!config.preview.live_mode);
        assert_eq!(config.preview.tick_period(), None);
        assert_eq!(config.preview.tick_policy, TickPolicy::WhenStale);
    }

    #[test]
    fn test_apply_without_flags_keeps_config() {
        let args = Args::parse_from(["livepad"]);
        let mut config = LivepadConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config, LivepadConfig::default());
    }
}
