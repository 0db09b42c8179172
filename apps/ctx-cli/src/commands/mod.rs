pub mod goal;
pub mod matching;
pub mod serve;
pub mod tags;
pub mod types;

use anyhow::Context;
use ctx_server::{ContextServer, DirectoryModule, ServerConfig};

/// Open the server and activate every module under the modules directory.
pub fn open_server(config: &ServerConfig) -> anyhow::Result<ContextServer> {
    let server = ContextServer::new(config.clone()).context("failed to open context server")?;
    let modules = DirectoryModule::discover(&config.modules_dir)
        .with_context(|| format!("failed to scan {}", config.modules_dir.display()))?;
    for module in &modules {
        let report = server.activate(module)?;
        for failure in &report.load.failures {
            eprintln!("warning: {}", failure);
        }
    }
    Ok(server)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}
