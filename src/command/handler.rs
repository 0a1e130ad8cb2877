use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use super::{Command, CommandError};
use crate::connection::Connection;

/// Outcome of a command handler.
///
/// `Ok(Some(result))` and `Err(_)` are answered with a `reply` when the
/// command carried an id; `Ok(None)` sends nothing.
pub type HandlerResult = Result<Option<Value>, CommandError>;

/// Handles one named control command.
///
/// Handlers run on the transport's delivery path and must not wait for
/// further inbound messages (such as the reply to a request); spawn that
/// work instead.
///
/// Any `async fn(Arc<Connection>, Command) -> HandlerResult` implements
/// this trait.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn handle(&self, conn: Arc<Connection>, command: Command) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(Arc<Connection>, Command) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, conn: Arc<Connection>, command: Command) -> HandlerResult {
        (self)(conn, command).await
    }
}
