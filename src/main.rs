use std::path::Path;

use clap::{CommandFactory, Parser};
use colored::*;
use tracing_subscriber::EnvFilter;

use livepad::archive;
use livepad::buffer::{Snapshot, SourceKind};
use livepad::cli::Args;
use livepad::convert::{self, AppMeta};
use livepad::review;
use livepad::templates::ProjectTemplate;
use livepad::web;
use livepad::{FileTarget, LiveSession, LivepadConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(verbose: bool) {
    let default = if verbose { "livepad=debug" } else { "livepad=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// Starting buffers: the default project, with any `--html/--css/--js`
/// file replacing its pane.
fn initial_sources(args: &Args) -> Result<Snapshot, BoxError> {
    let mut sources = ProjectTemplate::Default.snapshot();
    let files = [
        (SourceKind::Html, &args.html),
        (SourceKind::Css, &args.css),
        (SourceKind::Js, &args.js),
    ];
    for (kind, path) in files {
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {} ({kind}): {e}", path.display()))?;
            match kind {
                SourceKind::Html => sources.html = text,
                SourceKind::Css => sources.css = text,
                SourceKind::Js => sources.js = text,
            }
        }
    }
    Ok(sources)
}

fn render_once(sources: Snapshot, path: &Path) -> Result<(), BoxError> {
    let mut session = LiveSession::new("CLI", sources, Box::new(FileTarget::new(path)));
    if !session.render_now() {
        let reason = session
            .drain_notices()
            .into_iter()
            .map(|n| n.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(reason.into());
    }
    eprintln!("{}", format!("  rendered {}", path.display()).bright_green());
    Ok(())
}

/// Run whichever one-shot mode `args` asked for.
fn one_shot(args: &Args, config: &LivepadConfig, sources: Snapshot) -> Result<(), BoxError> {
    if let Some(path) = &args.render_to {
        return render_once(sources, path);
    }

    if args.review {
        println!("{}", review::review(&sources));
        return Ok(());
    }

    if let Some(target) = args.convert {
        let meta = AppMeta::new(&args.app_name, &args.app_version, &args.app_description);
        let pkg = convert::convert(Some(target), &meta, &sources, &config.package.settings())?;
        let bytes = archive::write_package(&pkg)?;
        let out = args
            .output
            .clone()
            .unwrap_or_else(|| pkg.archive_name().into());
        std::fs::write(&out, &bytes)?;
        eprintln!(
            "{}",
            format!("  {} package written to {} ({} bytes)", target, out.display(), bytes.len())
                .bright_green()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "livepad", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(args.verbose);

    let mut config = LivepadConfig::discover(args.config.as_deref())?;
    args.apply_to(&mut config);
    let sources = initial_sources(&args)?;

    if args.is_one_shot() {
        return one_shot(&args, &config, sources);
    }

    web::serve(config, sources).await
}
