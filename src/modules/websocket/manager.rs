/// Connection Manager
///
/// Single entry point for "deliver to user X wherever X is connected".
/// Local connections live in the `ConnectionHub` actor; users connected to
/// another process are reached through their `user:{id}` bus channel, which
/// every process subscribes to for the users it holds.
use actix::Addr;
use futures_util::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::{CountConnections, Deliver, DeliveryOutcome, Register, Unregister};
use super::fanout::{user_channel, FanoutBus};
use super::message::ServerFrame;
use super::presence::PresenceRegistry;
use super::server::ConnectionHub;
use crate::{
    api::error,
    constants::{CLIENT_TIMEOUT, HEARTBEAT_INTERVAL},
    utils::AuthValidator,
};

/// Handle for one authenticated connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub user_id: i64,
    pub conn_id: Uuid,
}

#[derive(Clone)]
pub struct ConnectionManager {
    hub: Addr<ConnectionHub>,
    presence: Arc<dyn PresenceRegistry>,
    bus: Arc<dyn FanoutBus>,
    auth: Arc<dyn AuthValidator>,
    presence_ttl: u64,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl ConnectionManager {
    pub fn with_dependencies(
        hub: Addr<ConnectionHub>,
        presence: Arc<dyn PresenceRegistry>,
        bus: Arc<dyn FanoutBus>,
        auth: Arc<dyn AuthValidator>,
        presence_ttl: u64,
    ) -> Self {
        ConnectionManager {
            hub,
            presence,
            bus,
            auth,
            presence_ttl,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            client_timeout: CLIENT_TIMEOUT,
        }
    }

    pub fn with_heartbeat(mut self, interval: Duration, client_timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.client_timeout = client_timeout;
        self
    }

    /// Ping interval and the silence after which a socket is dropped.
    pub fn heartbeat(&self) -> (Duration, Duration) {
        (self.heartbeat_interval, self.client_timeout)
    }

    /// Authenticates the token and registers `tx` as the user's connection on
    /// this process. The bus subscription is live before this returns.
    pub async fn connect(
        &self,
        token: &str,
        tx: mpsc::UnboundedSender<String>,
    ) -> Result<Connection, error::SystemError> {
        let user_id = self.auth.decode(token)?;
        let conn_id = Uuid::now_v7();

        let forwarder = match self.bus.subscribe(&user_channel(user_id)).await {
            Ok(mut stream) => {
                let relay = tx.clone();
                Some(actix_web::rt::spawn(async move {
                    while let Some(payload) = stream.next().await {
                        if relay.send(payload).is_err() {
                            break;
                        }
                    }
                }))
            }
            Err(e) => {
                tracing::warn!(
                    "Fanout subscription failed for user {user_id}, cross-process delivery disabled: {e}"
                );
                None
            }
        };

        let abort = forwarder.as_ref().map(|task| task.abort_handle());
        if let Err(e) = self.hub.send(Register { user_id, conn_id, tx, forwarder }).await {
            if let Some(abort) = abort {
                abort.abort();
            }
            return Err(error::SystemError::InternalError(Box::new(e)));
        }

        if let Err(e) = self.presence.mark_online(user_id, self.presence_ttl).await {
            tracing::warn!("Could not mark user {user_id} online: {e}");
        }

        tracing::info!("User {user_id} connected ({conn_id})");
        Ok(Connection { user_id, conn_id })
    }

    /// Idempotent. A connection that was already superseded leaves presence untouched.
    pub async fn disconnect(&self, connection: Connection) {
        let removed = match self
            .hub
            .send(Unregister { user_id: connection.user_id, conn_id: connection.conn_id })
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!("Connection hub unreachable on disconnect: {e}");
                false
            }
        };

        if !removed {
            return;
        }

        if let Err(e) = self.presence.mark_offline(connection.user_id).await {
            tracing::warn!("Could not mark user {} offline: {e}", connection.user_id);
        }
        tracing::info!("User {} disconnected ({})", connection.user_id, connection.conn_id);
    }

    /// Returns true only when the frame was written to a connection on this process.
    /// Failures are logged, never returned.
    pub async fn deliver(&self, user_id: i64, frame: &ServerFrame) -> bool {
        let payload = match frame.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Could not serialize frame for user {user_id}: {e}");
                return false;
            }
        };

        match self.hub.send(Deliver { user_id, payload: payload.clone() }).await {
            Ok(DeliveryOutcome::Delivered) => true,
            Ok(DeliveryOutcome::WriteFailed) => {
                tracing::warn!("Local write to user {user_id} failed");
                false
            }
            Ok(DeliveryOutcome::NotHere) => {
                if let Err(e) = self.bus.publish(&user_channel(user_id), payload).await {
                    tracing::warn!("Publish to user {user_id} failed: {e}");
                }
                false
            }
            Err(e) => {
                tracing::error!("Connection hub unreachable on deliver: {e}");
                false
            }
        }
    }

    pub async fn refresh_presence(&self, user_id: i64) {
        if let Err(e) = self.presence.refresh(user_id, self.presence_ttl).await {
            tracing::warn!("Could not refresh presence for user {user_id}: {e}");
        }
    }

    pub async fn local_connection_count(&self) -> usize {
        self.hub.send(CountConnections).await.unwrap_or_default()
    }
}
