//! Background bundler thread.
//!
//! [`PlaygroundBundler`] is single-threaded: builds interleave cooperatively
//! on one `LocalSet`. [`BundlerWorker`] owns that thread and hands out a
//! cloneable, `Send` handle that forwards requests over a channel.

use crate::compiler::ComponentCompiler;
use crate::config::BundlerConfig;
use crate::playground::PlaygroundBundler;
use crate::protocol::{WorkerRequest, WorkerResponse};
use anyhow::bail;
use futures::channel::{mpsc, mpsc::Sender, oneshot};
use futures::{SinkExt, StreamExt};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

pub enum WorkerCommand {
    Handle {
        request: WorkerRequest,
        responder: oneshot::Sender<WorkerResponse>,
    },
}

#[derive(Clone)]
pub struct BundlerWorker {
    sender: Sender<WorkerCommand>,
    _handle: Arc<JoinHandle<Result<(), anyhow::Error>>>,
}

impl BundlerWorker {
    pub fn new(config: BundlerConfig, compiler: Arc<dyn ComponentCompiler>) -> Self {
        Self::with_factory(move || Ok(PlaygroundBundler::new(config, compiler)?))
    }

    /// Starts the worker thread, building the bundler on it with `factory`.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<PlaygroundBundler, anyhow::Error> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<WorkerCommand>(32);

        let handle = Arc::new(thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let local = tokio::task::LocalSet::new();

            let served = local.block_on(&runtime, async {
                let bundler = Rc::new(factory()?);
                while let Some(cmd) = receiver.next().await {
                    match cmd {
                        WorkerCommand::Handle { request, responder } => {
                            let bundler = bundler.clone();
                            tokio::task::spawn_local(async move {
                                let response = bundler.handle(request).await;
                                responder.send(response).ok();
                            });
                        }
                    }
                }
                Ok::<_, anyhow::Error>(())
            });

            // Let builds still in flight deliver their responses.
            runtime.block_on(local);
            served
        }));

        Self {
            sender,
            _handle: handle,
        }
    }

    pub async fn handle(&self, request: WorkerRequest) -> Result<WorkerResponse, anyhow::Error> {
        let (resp_tx, resp_rx) = oneshot::channel::<WorkerResponse>();
        let cmd = WorkerCommand::Handle {
            request,
            responder: resp_tx,
        };

        let mut sender = self.sender.clone();
        match sender.send(cmd).await {
            Ok(_) => {
                // All good
            }
            Err(err) => {
                bail!("Failed to send compile request: {}", err.to_string())
            }
        }

        match resp_rx.await {
            Ok(response) => Ok(response),
            Err(err) => bail!("Failed to retrieve compile result: {}", err.to_string()),
        }
    }

    pub async fn compile(
        &self,
        uid: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<WorkerResponse, anyhow::Error> {
        self.handle(WorkerRequest::Compile {
            uid: uid.into(),
            source: source.into(),
        })
        .await
    }
}
