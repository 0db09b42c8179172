// serve.rs — Run the context server and reload modules as they change on disk.
//
// Every module directory under `modules_dir` is activated at startup. A
// filesystem watcher then feeds changed paths into the lifecycle actor: a
// module whose directory still exists is reloaded, one whose directory is
// gone is deactivated. Bursts of events are coalesced per module.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ctx_definitions::ModuleId;
use ctx_server::{ContextServer, DirectoryModule, LifecycleActor, LifecycleHandle, ServerConfig};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Quiet period before a burst of filesystem events is applied.
const DEBOUNCE: Duration = Duration::from_millis(300);

pub fn execute(config: ServerConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let modules_dir = config.modules_dir.clone();
    std::fs::create_dir_all(&modules_dir)
        .with_context(|| format!("failed to create {}", modules_dir.display()))?;

    let server = Arc::new(ContextServer::new(config).context("failed to open context server")?);
    let (handle, actor) = LifecycleActor::spawn(server.clone());

    for module in DirectoryModule::discover(&modules_dir)? {
        activate(&handle, module).await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            for path in event.paths {
                let _ = tx.send(path);
            }
        }
        Err(e) => tracing::warn!(error = %e, "module watcher error"),
    })
    .context("failed to create module watcher")?;
    watcher
        .watch(&modules_dir, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", modules_dir.display()))?;

    tracing::info!(modules_dir = %modules_dir.display(), "context server running");
    println!(
        "Serving {} goal(s) from {}. Press Ctrl-C to stop.",
        server.goals().get_goal_metadatas()?.len(),
        modules_dir.display()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(path) = rx.recv() => {
                let mut changed = BTreeSet::new();
                changed.extend(module_name(&modules_dir, &path));
                // Drain the rest of the burst.
                while let Ok(Some(path)) = tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                    changed.extend(module_name(&modules_dir, &path));
                }
                for name in changed {
                    reload(&handle, &modules_dir, &name).await;
                }
            }
        }
    }

    tracing::info!("shutting down");
    drop(watcher);
    drop(handle);
    let _ = actor.await;
    Ok(())
}

async fn activate(handle: &LifecycleHandle, module: DirectoryModule) {
    let root = module.root().to_path_buf();
    match handle.activate(module).await {
        Ok(report) => {
            for failure in &report.load.failures {
                tracing::warn!(module = %report.load.module_id, "{}", failure);
            }
            println!(
                "Activated {} ({} definition(s), {} goal(s) installed, {} disabled)",
                report.load.module_id,
                report.load.loaded.values().sum::<usize>(),
                report.goals_installed.len(),
                report.goals_disabled.len()
            );
        }
        Err(e) => tracing::error!(module = %root.display(), error = %e, "module activation failed"),
    }
}

async fn reload(handle: &LifecycleHandle, modules_dir: &Path, name: &str) {
    let root = modules_dir.join(name);
    if root.is_dir() {
        match DirectoryModule::open(&root) {
            Ok(module) => activate(handle, module).await,
            Err(e) => tracing::error!(module = name, error = %e, "module open failed"),
        }
        return;
    }
    match handle.deactivate(ModuleId::new(name)).await {
        Ok(report) => println!(
            "Deactivated {} ({} goal(s) disabled)",
            report.module_id,
            report.goals_disabled.len()
        ),
        Err(e) => tracing::error!(module = name, error = %e, "module deactivation failed"),
    }
}

/// The module a changed path belongs to: its first component below
/// `modules_dir`.
fn module_name(modules_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(modules_dir).ok()?;
    let first = relative.components().next()?;
    Some(first.as_os_str().to_string_lossy().into_owned())
}
