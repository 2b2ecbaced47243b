//! Watch command - development server with live reload

use std::{path::Path, sync::Arc, time::Duration};

use color_eyre::eyre::{Result, WrapErr};
use inkpress_core::BuildMode;
use inkpress_generator::{Assembler, BuildContext, BuildError};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::{net::TcpListener, sync::mpsc};

use super::load_config;
use crate::{
    scheduler::{Rebuild, WatchScheduler},
    server::{ServerState, create_router},
};

/// Rebuilds the site in memory and hands it to the dev server.
struct SiteRebuild {
    assembler: Assembler,
    state: Arc<ServerState>,
}

impl Rebuild for SiteRebuild {
    type Output = BuildContext;
    type Error = BuildError;

    async fn rebuild(&self) -> Result<BuildContext, BuildError> {
        println!("  Rebuilding...");
        self.assembler.assemble(BuildMode::Watch).await
    }

    async fn install(&self, context: BuildContext) {
        let stats = context.stats();
        println!(
            "  ✓ Rebuilt {} files ({} posts) in {}ms",
            stats.files, stats.posts, stats.duration_ms
        );
        self.state.install(Arc::new(context)).await;
    }
}

/// Whether a filesystem event should trigger a rebuild. Only reads are ignored.
fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

/// Run the watch command.
///
/// Serves the site from memory and rebuilds on source changes.
pub async fn run(config_path: &Path, port: Option<u16>, open_browser: bool) -> Result<()> {
    tracing::info!(?config_path, ?port, "Starting watch mode");

    let config = load_config(config_path)?;
    let port = port.unwrap_or(config.watch.port);
    let debounce = Duration::from_millis(config.watch.debounce_ms);
    let source_dir = config.paths.source_dir.clone();

    let assembler = Assembler::new(config).wrap_err("Failed to prepare build")?;
    let state = Arc::new(ServerState::new());

    // A full channel already holds a pending change, so dropping is lossless.
    let (tx, rx) = mpsc::channel::<()>(16);
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) if is_relevant(&event.kind) => {
                tracing::trace!(paths = ?event.paths, "source changed");
                let _ = tx.try_send(());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "file watcher error"),
        },
        notify::Config::default(),
    )
    .wrap_err("Failed to create file watcher")?;

    watcher
        .watch(&source_dir, RecursiveMode::Recursive)
        .wrap_err_with(|| format!("Failed to watch {}", source_dir.display()))?;
    tracing::debug!(dir = %source_dir.display(), "Watching source directory");

    let app = create_router(state.clone());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    println!();
    println!("  Dev server running at http://{addr}");
    println!("  Press Ctrl+C to stop");
    println!();

    if open_browser {
        let _ = open::that(format!("http://{addr}"));
    }

    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let scheduler = WatchScheduler::new(debounce).build_on_start(true);
    let rebuilder = SiteRebuild { assembler, state };
    scheduler
        .run(rebuilder, rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
            }
        })
        .await;

    drop(watcher);
    server.abort();
    println!();
    println!("  Stopped");

    Ok(())
}
