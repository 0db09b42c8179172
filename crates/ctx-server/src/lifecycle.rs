// lifecycle.rs — LifecycleActor: module activation as messages.
//
// Module lifecycle events (a module directory appeared, changed or went
// away) are delivered as `LifecycleCommand`s on a tokio channel. One actor
// task consumes them in order and applies each to the ContextServer, so a
// reload never interleaves with another module's activation. The registry
// and goal work is synchronous file I/O and runs on the blocking pool.

use std::sync::Arc;

use ctx_definitions::{ModuleId, ModuleSource};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ServerError;
use crate::server::{ActivationReport, ContextServer, DeactivationReport};

/// Pending commands before senders start waiting.
const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, ServerError>>;

/// A module lifecycle event.
pub enum LifecycleCommand {
    /// Load or reload a module.
    Activate {
        module: Box<dyn ModuleSource>,
        reply: Option<Reply<ActivationReport>>,
    },
    /// Retract a module.
    Deactivate {
        module_id: ModuleId,
        reply: Option<Reply<DeactivationReport>>,
    },
}

/// The single task that applies lifecycle commands.
pub struct LifecycleActor {
    server: Arc<ContextServer>,
    commands: mpsc::Receiver<LifecycleCommand>,
}

impl LifecycleActor {
    /// Spawn the actor on the current tokio runtime. It stops once every
    /// handle has been dropped and the queue is drained.
    pub fn spawn(server: Arc<ContextServer>) -> (LifecycleHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = Self { server, commands: rx };
        let task = tokio::spawn(actor.run());
        (LifecycleHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        tracing::debug!("lifecycle actor started");
        while let Some(command) = self.commands.recv().await {
            match command {
                LifecycleCommand::Activate { module, reply } => {
                    let server = self.server.clone();
                    let result = run_blocking(move || server.activate(module.as_ref())).await;
                    respond("activate", reply, result);
                }
                LifecycleCommand::Deactivate { module_id, reply } => {
                    let server = self.server.clone();
                    let result = run_blocking(move || server.deactivate(&module_id)).await;
                    respond("deactivate", reply, result);
                }
            }
        }
        tracing::debug!("lifecycle actor stopped");
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, ServerError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("lifecycle command panicked: {}", e);
            Err(ServerError::LifecycleStopped)
        }
    }
}

fn respond<T>(action: &str, reply: Option<Reply<T>>, result: Result<T, ServerError>) {
    match reply {
        Some(reply) => {
            // The caller may have stopped waiting; the work is done either way.
            let _ = reply.send(result);
        }
        None => {
            if let Err(e) = result {
                tracing::error!("module {} failed: {}", action, e);
            }
        }
    }
}

/// Sends commands to a running [`LifecycleActor`].
#[derive(Clone)]
pub struct LifecycleHandle {
    commands: mpsc::Sender<LifecycleCommand>,
}

impl LifecycleHandle {
    /// Activate a module and wait for the outcome.
    pub async fn activate(&self, module: impl ModuleSource + 'static) -> Result<ActivationReport, ServerError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::Activate {
            module: Box::new(module),
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| ServerError::LifecycleStopped)?
    }

    /// Deactivate a module and wait for the outcome.
    pub async fn deactivate(&self, module_id: ModuleId) -> Result<DeactivationReport, ServerError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::Deactivate {
            module_id,
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| ServerError::LifecycleStopped)?
    }

    /// Queue a command without waiting for it to apply.
    pub async fn send(&self, command: LifecycleCommand) -> Result<(), ServerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServerError::LifecycleStopped)
    }
}
