/// WebSocket HTTP Handler
///
/// Upgrades `GET /api/chat/ws?token=...` and runs one loop per connection:
/// - Inbound:  Client → WebSocket → ClientFrame → ChatService
/// - Outbound: ConnectionHub / fanout forwarder → mpsc channel → WebSocket → Client
/// - Heartbeat: ping + presence refresh; silent clients are dropped
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::{AggregatedMessage, CloseCode, CloseReason};
use serde::Deserialize;
use std::time::Instant;
use tokio::sync::mpsc;

use super::manager::{Connection, ConnectionManager};
use super::message::{error_frame, ClientFrame, SendTarget};
use crate::{
    api::error,
    modules::chat::{
        repository::ChatRepository,
        service::ChatService,
    },
};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: String,
}

pub async fn websocket_handler<S>(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    manager: web::Data<ConnectionManager>,
    chat_service: web::Data<ChatService<S>>,
) -> Result<HttpResponse, Error>
where
    S: ChatRepository + 'static,
{
    tracing::debug!("WebSocket upgrade request from {:?}", req.peer_addr());

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    let connection = match manager.connect(&query.token, tx).await {
        Ok(connection) => connection,
        Err(e) => {
            let reason = match e {
                error::SystemError::Unauthorized(_) => {
                    tracing::warn!("Rejected WebSocket connection: {e}");
                    CloseReason { code: CloseCode::Policy, description: Some("Invalid token".into()) }
                }
                _ => {
                    tracing::error!("WebSocket connection setup failed: {e}");
                    CloseReason { code: CloseCode::Error, description: None }
                }
            };
            actix_web::rt::spawn(async move {
                let _ = session.close(Some(reason)).await;
            });
            return Ok(response);
        }
    };

    actix_web::rt::spawn(run_connection(
        session,
        msg_stream.aggregate_continuations(),
        rx,
        connection,
        manager.get_ref().clone(),
        chat_service.into_inner(),
    ));

    Ok(response)
}

async fn run_connection<S>(
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::AggregatedMessageStream,
    mut rx: mpsc::UnboundedReceiver<String>,
    connection: Connection,
    manager: ConnectionManager,
    chat_service: std::sync::Arc<ChatService<S>>,
) where
    S: ChatRepository + 'static,
{
    let (heartbeat_interval, client_timeout) = manager.heartbeat();
    let mut last_seen = Instant::now();
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + heartbeat_interval,
        heartbeat_interval,
    );

    let close_reason = loop {
        tokio::select! {
            // === INBOUND: Client → Server ===
            msg = msg_stream.recv() => {
                match msg {
                    Some(Ok(AggregatedMessage::Text(text))) => {
                        last_seen = Instant::now();
                        if let Some(reply) =
                            dispatch_frame(&chat_service, connection.user_id, &text).await
                        {
                            if session.text(reply).await.is_err() {
                                break None;
                            }
                        }
                    }

                    Some(Ok(AggregatedMessage::Binary(_))) => {
                        last_seen = Instant::now();
                        if session.text(error_frame("Invalid JSON")).await.is_err() {
                            break None;
                        }
                    }

                    Some(Ok(AggregatedMessage::Ping(data))) => {
                        last_seen = Instant::now();
                        if session.pong(&data).await.is_err() {
                            break None;
                        }
                    }

                    Some(Ok(AggregatedMessage::Pong(_))) => {
                        last_seen = Instant::now();
                    }

                    Some(Ok(AggregatedMessage::Close(reason))) => {
                        tracing::debug!("Close frame from user {}: {:?}", connection.user_id, reason);
                        break reason;
                    }

                    Some(Err(e)) => {
                        tracing::error!("WebSocket protocol error: {}", e);
                        break None;
                    }

                    None => break None,
                }
            }

            // === OUTBOUND: Server → Client ===
            outbound = rx.recv() => {
                match outbound {
                    Some(json) => {
                        if session.text(json).await.is_err() {
                            tracing::warn!("Write to user {} failed", connection.user_id);
                            break None;
                        }
                    }
                    // the hub dropped our sender: a newer connection took over
                    None => {
                        break Some(CloseReason {
                            code: CloseCode::Normal,
                            description: Some("Superseded by a newer connection".into()),
                        });
                    }
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > client_timeout {
                    tracing::info!("User {} timed out", connection.user_id);
                    break None;
                }
                if session.ping(b"").await.is_err() {
                    break None;
                }
                manager.refresh_presence(connection.user_id).await;
            }
        }
    };

    manager.disconnect(connection).await;
    let _ = session.close(close_reason).await;
    tracing::debug!("WebSocket loop for user {} finished", connection.user_id);
}

/// Handles one inbound text frame; returns the error frame to send back, if any.
pub async fn dispatch_frame<S>(
    chat_service: &ChatService<S>,
    user_id: i64,
    text: &str,
) -> Option<String>
where
    S: ChatRepository,
{
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!("Bad frame from user {user_id}: {e}");
            return Some(error_frame(&e.to_string()));
        }
    };

    let result = match frame {
        ClientFrame::Send { target: SendTarget::Chat(chat_id), draft } => {
            chat_service.send_to_chat(chat_id, user_id, draft, true).await.map(|_| ())
        }
        ClientFrame::Send { target: SendTarget::Receiver(receiver_id), draft } => {
            chat_service.send_message(user_id, receiver_id, draft, true).await.map(|_| ())
        }
        ClientFrame::Read { chat_id } => chat_service.mark_read(chat_id, user_id).await.map(|_| ()),
    };

    match result {
        Ok(()) => None,
        Err(e) => Some(error_frame(&error::Error::from(e).message())),
    }
}
