/// Connection Hub Actor
///
/// Owns the table of live connections held by this process, keyed by user.
/// One connection per user per process: a newer connection supersedes the
/// older one, whose socket loop sees its outbound channel close and exits.
use actix::prelude::*;
use std::collections::HashMap;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use super::events::*;

struct LocalConnection {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<String>,
    forwarder: Option<JoinHandle<()>>,
}

impl LocalConnection {
    fn shutdown(self) {
        if let Some(forwarder) = self.forwarder {
            forwarder.abort();
        }
        // dropping tx ends the socket loop's outbound stream
    }
}

#[derive(Default)]
pub struct ConnectionHub {
    connections: HashMap<i64, LocalConnection>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for ConnectionHub {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Connection hub started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for (_, connection) in self.connections.drain() {
            connection.shutdown();
        }
        tracing::info!("Connection hub stopped");
    }
}

impl Handler<Register> for ConnectionHub {
    type Result = ();

    fn handle(&mut self, msg: Register, _: &mut Context<Self>) {
        let connection =
            LocalConnection { conn_id: msg.conn_id, tx: msg.tx, forwarder: msg.forwarder };

        if let Some(previous) = self.connections.insert(msg.user_id, connection) {
            tracing::info!(
                "User {} reconnected: connection {} supersedes {}",
                msg.user_id,
                msg.conn_id,
                previous.conn_id
            );
            previous.shutdown();
        } else {
            tracing::debug!("User {} connected ({})", msg.user_id, msg.conn_id);
        }
    }
}

impl Handler<Unregister> for ConnectionHub {
    type Result = bool;

    fn handle(&mut self, msg: Unregister, _: &mut Context<Self>) -> Self::Result {
        match self.connections.get(&msg.user_id) {
            Some(current) if current.conn_id == msg.conn_id => {
                if let Some(connection) = self.connections.remove(&msg.user_id) {
                    connection.shutdown();
                }
                tracing::debug!("User {} disconnected ({})", msg.user_id, msg.conn_id);
                true
            }
            _ => false,
        }
    }
}

impl Handler<Deliver> for ConnectionHub {
    type Result = DeliveryOutcome;

    fn handle(&mut self, msg: Deliver, _: &mut Context<Self>) -> Self::Result {
        let Some(connection) = self.connections.get(&msg.user_id) else {
            return DeliveryOutcome::NotHere;
        };

        match connection.tx.send(msg.payload) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(_) => DeliveryOutcome::WriteFailed,
        }
    }
}

impl Handler<CountConnections> for ConnectionHub {
    type Result = usize;

    fn handle(&mut self, _: CountConnections, _: &mut Context<Self>) -> Self::Result {
        self.connections.len()
    }
}
