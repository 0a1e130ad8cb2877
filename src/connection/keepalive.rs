//! Ping/pong keepalive.

use std::sync::Arc;

use log::debug;
use tokio::time::{Instant, MissedTickBehavior, interval};

use super::Connection;
use crate::{command::CommandName, error::ConnectionError};

impl Connection {
    pub(super) fn start_keepalive(self: &Arc<Self>) {
        let ping = self.ping_config();
        if !ping.is_enabled() {
            debug!("keepalive disabled: id={}", self.id);
            return;
        }
        *self.last_pong.lock().expect("lock poisoned") = Instant::now();
        let conn = Arc::clone(self);
        self.spawn_worker("keepalive", async move { conn.run_keepalive().await });
    }

    async fn run_keepalive(self: Arc<Self>) {
        let mut ticker = interval(self.ping_config().interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let timeout = self.ping_config().timeout;
            let silent_for = self.last_pong.lock().expect("lock poisoned").elapsed();
            if !timeout.is_zero() && silent_for > timeout {
                self.close_error(ConnectionError::PingTimeout(timeout)).await;
                return;
            }
            if let Err(e) = self.send_command(CommandName::PING, &()).await {
                debug!("failed to send ping: id={}, error={e}", self.id);
            }
        }
    }

    pub(super) fn record_pong(&self) { *self.last_pong.lock().expect("lock poisoned") = Instant::now(); }
}
