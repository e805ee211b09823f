use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant as TokioInstant, sleep_until};

use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::engine::DispatchEngine;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{CoapRequest, Disposition, ExchangeKey};
use crate::registry::ResourceId;
use crate::resource::{Reply, Resource};

// Default command channel capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

enum Command {
    Request {
        request: CoapRequest,
        endpoint: Endpoint,
        reply: oneshot::Sender<Disposition>,
    },
    Resume {
        key: ExchangeKey,
        value: Reply,
        reply: oneshot::Sender<Option<(Endpoint, Disposition)>>,
    },
    Register {
        resource: Resource,
        reply: oneshot::Sender<Result<ResourceId>>,
    },
    Changed {
        id: ResourceId,
    },
    Delete {
        id: ResourceId,
        delay: Duration,
    },
}

fn loop_closed() -> Error {
    Error::new(ErrorKind::Runtime, "engine loop closed")
}

/// A cloneable handle submitting work to a running [`Server`].
///
/// Transports and slow handlers hold one each; the loop exits once every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Dispatches one decoded request.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine loop has exited.
    pub async fn handle_request(
        &self,
        request: CoapRequest,
        endpoint: Endpoint,
    ) -> Result<Disposition> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Request {
                request,
                endpoint,
                reply: tx,
            })
            .await
            .map_err(|_| loop_closed())?;
        rx.await.map_err(|_| loop_closed())
    }

    /// Completes a deferred exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine loop has exited.
    pub async fn resume(
        &self,
        key: ExchangeKey,
        value: Reply,
    ) -> Result<Option<(Endpoint, Disposition)>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Resume {
                key,
                value,
                reply: tx,
            })
            .await
            .map_err(|_| loop_closed())?;
        rx.await.map_err(|_| loop_closed())
    }

    /// Registers a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is rejected or the engine loop
    /// has exited.
    pub async fn register(&self, resource: Resource) -> Result<ResourceId> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Register {
                resource,
                reply: tx,
            })
            .await
            .map_err(|_| loop_closed())?;
        rx.await.map_err(|_| loop_closed())?
    }

    /// Signals that a resource's state changed outside a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine loop has exited.
    pub async fn resource_changed(&self, id: ResourceId) -> Result<()> {
        self.commands
            .send(Command::Changed { id })
            .await
            .map_err(|_| loop_closed())
    }

    /// Marks a resource for deletion after a delay.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine loop has exited.
    pub async fn schedule_delete(&self, id: ResourceId, delay: Duration) -> Result<()> {
        self.commands
            .send(Command::Delete { id, delay })
            .await
            .map_err(|_| loop_closed())
    }
}

/// The engine's command loop.
///
/// The [`DispatchEngine`] is synchronous and single-owner; the loop owns
/// it and serializes requests, resumptions, and timer events arriving
/// from any number of [`EngineHandle`]s.
pub struct Server {
    engine: DispatchEngine,
    commands: mpsc::Sender<Command>,
    inbox: mpsc::Receiver<Command>,
}

impl Server {
    /// Creates a [`Server`] around an engine.
    #[must_use]
    pub fn new(engine: DispatchEngine) -> Self {
        Self::with_capacity(engine, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a [`Server`] with a custom command channel capacity.
    #[must_use]
    pub fn with_capacity(engine: DispatchEngine, capacity: usize) -> Self {
        let (commands, inbox) = mpsc::channel(capacity);
        Self {
            engine,
            commands,
            inbox,
        }
    }

    /// Creates a handle to the loop.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            commands: self.commands.clone(),
        }
    }

    /// Transforms the server into a [`GracefulShutdownServer`].
    ///
    /// The [`Future`] passed as input manages the graceful shutdown of
    /// the loop.
    #[must_use]
    #[inline]
    pub fn with_graceful_shutdown<F>(self, signal: F) -> GracefulShutdownServer<F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        GracefulShutdownServer {
            engine: self.engine,
            inbox: self.inbox,
            signal,
        }
    }

    /// Runs the loop until every [`EngineHandle`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop fails.
    pub async fn run(self) -> Result<()> {
        self.with_graceful_shutdown(std::future::pending())
            .run()
            .await
    }
}

/// A server with graceful shutdown.
///
/// Aside from the graceful shutdown functionality, it behaves the same as
/// [`Server`].
pub struct GracefulShutdownServer<F> {
    // Engine owned by the loop.
    engine: DispatchEngine,
    // Command inbox.
    inbox: mpsc::Receiver<Command>,
    // Graceful shutdown signal.
    signal: F,
}

impl<F> GracefulShutdownServer<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    /// Runs the loop with graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop fails.
    pub async fn run(self) -> Result<()> {
        let Self {
            mut engine,
            mut inbox,
            signal,
        } = self;
        tokio::pin!(signal);

        info!("Starting engine loop...");
        loop {
            let deadline = engine.next_deadline().map(TokioInstant::from_std);
            tokio::select! {
                () = &mut signal => {
                    info!("Engine loop shutting down");
                    break;
                }
                command = inbox.recv() => {
                    let Some(command) = command else {
                        debug!("every handle dropped, stopping the loop");
                        break;
                    };
                    serve(&mut engine, command);
                }
                () = wait(deadline) => {
                    engine.run_pending(std::time::Instant::now());
                }
            }
        }
        Ok(())
    }
}

async fn wait(deadline: Option<TokioInstant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn serve(engine: &mut DispatchEngine, command: Command) {
    match command {
        Command::Request {
            request,
            endpoint,
            reply,
        } => {
            let disposition = engine.handle_request(&request, &endpoint);
            if reply.send(disposition).is_err() {
                warn!("requester went away before the response");
            }
        }
        Command::Resume { key, value, reply } => {
            let outcome = engine.resume(&key, value);
            let _ = reply.send(outcome);
        }
        Command::Register { resource, reply } => {
            let _ = reply.send(engine.register(resource));
        }
        Command::Changed { id } => engine.resource_changed(id),
        Command::Delete { id, delay } => engine.schedule_delete(id, delay),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use ocre::status::Status;

    use crate::endpoint::Endpoint;
    use crate::engine::{DispatchEngine, EngineConfig};
    use crate::message::CoapRequest;
    use crate::resource::{Reply, Resource};

    use super::Server;

    fn unicast() -> Endpoint {
        Endpoint::unicast("192.168.1.20:5683".parse().unwrap())
    }

    #[tokio::test]
    async fn test_loop_serves_requests() {
        let server = Server::new(DispatchEngine::new(EngineConfig::new()));
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        handle
            .register(Resource::new(0, "/light").on_get(|_| Reply::ok(json!({"on": false}))))
            .await
            .unwrap();

        let disposition = handle
            .handle_request(CoapRequest::get("/light"), unicast())
            .await
            .unwrap();
        let response = disposition.response().unwrap();
        assert_eq!(response.code, Status::Ok.coap_code());
        assert_eq!(response.json().unwrap(), json!({"on": false}));

        // The loop exits once the last handle is gone.
        drop(handle);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let server = Server::new(DispatchEngine::new(EngineConfig::new()));
        let handle = server.handle();
        let (stop, signal) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(
            server
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .run(),
        );

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();

        // Commands sent after shutdown report a closed loop.
        assert!(
            handle
                .handle_request(CoapRequest::get("/light"), unicast())
                .await
                .is_err()
        );
    }
}
