//! The component skeleton: a component is a tokio task consuming one input
//! channel, returning a close reason through a oneshot when it stops.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use signals_core::error::Error;

pub enum CloseReason {
    Complete,
    Fault(Error),
}

/// The channel ends a component keeps while running.
pub trait Ports: Send {
    type Frame: Send;

    fn create() -> (Self, PortsHandle<Self::Frame>)
    where
        Self: Sized;

    fn close(self, reason: CloseReason);
}

/// The channel ends the rest of the system keeps.
pub struct PortsHandle<F> {
    input_tx: mpsc::Sender<F>,
    close_rx: Option<oneshot::Receiver<CloseReason>>,
}

impl<F> PortsHandle<F> {
    pub fn sender(&self) -> mpsc::Sender<F> {
        self.input_tx.clone()
    }

    pub async fn send(&self, frame: F) {
        if self.input_tx.send(frame).await.is_err() {
            warn!("Component input closed, frame dropped");
        }
    }

    /// Wait for the component to stop. Panics when awaited twice.
    pub async fn wait(&mut self) {
        let rx = self
            .close_rx
            .take()
            .expect("component already awaited");
        match rx.await {
            Ok(CloseReason::Complete) | Err(_) => (),
            Ok(CloseReason::Fault(e)) => {
                error!("Component stopped with error: {}", e);
            }
        }
    }
}

pub struct ConsumerPorts<F> {
    rx: mpsc::Receiver<F>,
    close: oneshot::Sender<CloseReason>,
}

impl<F: Send> ConsumerPorts<F> {
    pub async fn recv(&mut self) -> Option<F> {
        self.rx.recv().await
    }
}

impl<F: Send> Ports for ConsumerPorts<F> {
    type Frame = F;

    fn create() -> (Self, PortsHandle<F>) {
        let (input_tx, input_rx) = mpsc::channel(32);
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                rx: input_rx,
                close: close_tx,
            },
            PortsHandle {
                input_tx,
                close_rx: Some(close_rx),
            },
        )
    }

    fn close(self, reason: CloseReason) {
        if self.close.send(reason).is_err() {
            warn!("Close reason dropped, handle is gone");
        }
    }
}

#[async_trait]
pub trait Component<P, C>
where
    P: Ports + 'static,
    C: Send + 'static,
{
    fn name() -> &'static str;

    fn start(context: C) -> PortsHandle<P::Frame> {
        info!("Starting component: {}", Self::name());
        let (ports, handle) = P::create();
        tokio::spawn(async move {
            Self::run(ports, context).await;
        });
        handle
    }

    async fn run(ports: P, context: C);
}
