//! Serving, readiness and worker supervision.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, atomic::Ordering},
};

use bytes::Bytes;
use futures::FutureExt;
use log::{debug, info};

use super::{Connection, handlers};
use crate::{
    adapter::{MessageHandler, MessageKind},
    command::CommandName,
    error::{ConnectionError, Result},
    panic::format_panic,
};

impl Connection {
    /// Start the connection.
    ///
    /// Registers the built-in command handlers, announces the connection to
    /// the packet handler, wires inbound messages, starts the background
    /// workers and sends the `version` handshake. Returns once the transport
    /// is ready; use [`wait_ready`](Self::wait_ready) to wait for the
    /// handshake itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::AlreadyServing`] on a second call and
    /// [`ConnectionError::Closed`] if the connection was closed first.
    pub async fn serve(self: &Arc<Self>) -> Result<()> {
        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyServing);
        }
        handlers::install_defaults(&self.dispatcher)?;
        self.dispatcher.seal();

        {
            let mut state = self.close_state.lock().await;
            if state.closed {
                return Err(ConnectionError::Closed);
            }
            if let Some(handler) = &self.packet_handler {
                handler.register_socket(self).await;
                state.registered = true;
            }
        }

        self.adapter.set_message_handler(self.message_handler());
        self.start_keepalive();

        let conn = Arc::clone(self);
        self.spawn_worker("transport", async move {
            match conn.adapter.serve().await {
                Ok(()) => debug!("transport finished: id={}", conn.id),
                Err(e) => conn.close_error(e.into()).await,
            }
            conn.close().await;
        });

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                debug!("connection closed before transport became ready: id={}", self.id);
                return Ok(());
            }
            () = self.adapter.wait_ready() => {}
        }

        let conn = Arc::clone(self);
        self.spawn_worker("fragment-cleanup", async move { conn.run_fragment_cleanup().await });

        if let Some(handle) = &self.iface {
            let conn = Arc::clone(self);
            let iface = Arc::clone(handle.iface());
            self.spawn_worker("interface-reader", async move {
                conn.run_interface_reader(iface).await;
            });
        }

        let conn = Arc::clone(self);
        self.spawn_worker("welcome", async move { conn.send_welcome().await });

        info!(
            "connection serving: id={}, max_message_size={:?}",
            self.id,
            self.adapter.max_message_size()
        );
        Ok(())
    }

    /// Resolve once the handshake completed or the connection closed.
    ///
    /// Returns immediately if that already happened.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Resolve once every background worker has exited.
    ///
    /// Workers only exit after [`close`](Self::close), so this is normally
    /// awaited after closing or to observe a close triggered by the peer.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn message_handler(self: &Arc<Self>) -> MessageHandler {
        let weak = Arc::downgrade(self);
        Arc::new(move |kind: MessageKind, payload: Bytes| {
            let weak = weak.clone();
            async move {
                if let Some(conn) = weak.upgrade() {
                    match kind {
                        MessageKind::Data => conn.handle_data(payload).await,
                        MessageKind::Control => conn.handle_control(payload).await,
                    }
                }
            }
            .boxed()
        })
    }

    async fn send_welcome(self: Arc<Self>) {
        let params = self.version_parameters();
        match self.send_command(CommandName::VERSION, &params).await {
            Ok(_) => {
                self.welcome_sent.store(true, Ordering::SeqCst);
                self.mark_ready_if_handshaken();
            }
            Err(e) => self.close_error(e).await,
        }
    }

    /// Flip readiness once our handshake went out and the peer's came in.
    pub(super) fn mark_ready_if_handshaken(&self) {
        if self.welcome_sent.load(Ordering::SeqCst) && self.remote_protocol_version().is_determined()
        {
            let was_ready = self.ready.send_replace(true);
            if !was_ready && !self.is_closing() {
                info!(
                    "connection ready: id={}, remote_protocol_version={}",
                    self.id,
                    self.remote_protocol_version()
                );
            }
        }
    }

    /// Spawn `work` on the connection's tracker, closing the connection if
    /// it panics.
    pub(super) fn spawn_worker<F>(self: &Arc<Self>, name: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let conn = Arc::clone(self);
        self.tracker.spawn(async move {
            if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
                let message = format_panic(panic).to_string();
                tracing::error!(
                    panic = %message,
                    worker = name,
                    connection = %conn.id,
                    "connection worker panicked"
                );
                conn.close_error(ConnectionError::WorkerPanic(message)).await;
            }
        });
    }
}
