/// Connection Hub Events
///
/// Messages accepted by the `ConnectionHub` actor. They are the only way to
/// touch the per-process connection table.
use actix::prelude::*;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

/// Event: a connection authenticated; replaces any older connection of the same user.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Register {
    pub user_id: i64,
    pub conn_id: Uuid,
    /// Outbound frames, drained by the socket loop
    pub tx: mpsc::UnboundedSender<String>,
    /// Bus → socket relay, aborted when the connection leaves the table
    pub forwarder: Option<JoinHandle<()>>,
}

/// Event: a connection closed. Returns whether it was still the registered one.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct Unregister {
    pub user_id: i64,
    pub conn_id: Uuid,
}

/// Event: write a serialized frame to the user's local connection, if any.
#[derive(Message)]
#[rtype(result = "DeliveryOutcome")]
pub struct Deliver {
    pub user_id: i64,
    pub payload: String,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct CountConnections;

#[derive(Debug, Clone, Copy, PartialEq, Eq, MessageResponse)]
pub enum DeliveryOutcome {
    Delivered,
    /// The user is connected here but the socket is gone
    WriteFailed,
    NotHere,
}
