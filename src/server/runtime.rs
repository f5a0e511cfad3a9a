//! The dispatch loop
//!
//! Reads messages from a [`Transport`], handles each on its own task, and
//! writes responses back as they complete. Handler concurrency is bounded
//! inside the [`Dispatcher`]; ordering between independent requests is not
//! preserved.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::dispatcher::Dispatcher;
use super::transport::Transport;
use crate::error::Result;

/// Drives a [`Dispatcher`] over a [`Transport`].
#[derive(Debug)]
pub struct DispatchRuntime {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchRuntime {
    /// Creates a runtime serving `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serves until the transport's input ends or `shutdown` fires.
    ///
    /// At end of input every in-flight request still completes and gets its
    /// response. On shutdown in-flight requests are aborted.
    ///
    /// # Errors
    ///
    /// Currently infallible; send failures are logged per response.
    pub async fn run(
        &self,
        transport: Arc<dyn Transport>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut tasks = JoinSet::new();
        let mut inbound = transport.receive();

        tracing::info!(
            tools = self.dispatcher.registry().len(),
            "Dispatch runtime started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(in_flight = tasks.len(), "Shutdown requested");
                    tasks.abort_all();
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                }
                line = inbound.next() => {
                    let Some(line) = line else {
                        tracing::info!(in_flight = tasks.len(), "Input closed");
                        break;
                    };
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let transport = Arc::clone(&transport);
                    tasks.spawn(async move {
                        if let Some(response) = dispatcher.handle_message(&line).await {
                            if let Err(e) = transport.send(response).await {
                                tracing::error!(error = %e, "Failed to send response");
                            }
                        }
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        tracing::info!("Dispatch runtime stopped");
        Ok(())
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(error = %e, "Request task failed"),
    }
}
