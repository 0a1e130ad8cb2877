//! Idempotent teardown.

use std::sync::atomic::Ordering;

use log::{debug, info, warn};

use super::Connection;
use crate::error::ConnectionError;

impl Connection {
    /// Close the connection and release its resources.
    ///
    /// Safe to call any number of times from any task, including the
    /// connection's own workers: each resource is released exactly once and
    /// every [`wait_ready`](Self::wait_ready) caller is released. Does not
    /// wait for workers to exit; see [`wait`](Self::wait).
    ///
    /// A [`PacketHandler`](crate::registry::PacketHandler) must not call
    /// `close` from `unregister_socket`.
    pub async fn close(&self) {
        let mut state = self.close_state.lock().await;
        self.closing.store(true, Ordering::SeqCst);

        if state.adapter_open {
            state.adapter_open = false;
            self.adapter.close().await;
        }
        if state.iface_open {
            state.iface_open = false;
            if let Some(handle) = &self.iface {
                handle.iface().close().await;
            }
        }
        if state.shutdown_open {
            state.shutdown_open = false;
            self.shutdown.cancel();
        }
        if state.registered {
            state.registered = false;
            if let Some(handler) = &self.packet_handler {
                handler.unregister_socket(self).await;
            }
        }

        self.ready.send_replace(true);
        self.fragments.clear();
        self.dispatcher.cancel_pending();
        self.tracker.close();

        if !state.closed {
            state.closed = true;
            info!("connection closed: id={}", self.id);
        }
    }

    /// Close the connection because of `err`.
    ///
    /// The first caller logs the error and tries to tell the peer with an
    /// `error` command; the connection closes whether or not that send
    /// succeeds.
    pub async fn close_error(&self, err: ConnectionError) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            warn!("closing connection on error: id={}, error={err}", self.id);
            if let Err(send_err) = self.send_error(&err.to_string()).await {
                debug!(
                    "failed to notify peer of error: id={}, error={send_err}",
                    self.id
                );
            }
        }
        self.close().await;
    }
}
