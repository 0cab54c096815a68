use actix_web::web;

use crate::modules::chat::{handle, repository::ChatRepository};
use crate::modules::websocket::handler::websocket_handler;

/// Token-in-query WebSocket endpoint; registered outside the Bearer scope.
pub fn ws_configure<S>(cfg: &mut web::ServiceConfig)
where
    S: ChatRepository,
{
    cfg.service(web::resource("/chat/ws").route(web::get().to(websocket_handler::<S>)));
}

pub fn configure<S>(cfg: &mut web::ServiceConfig)
where
    S: ChatRepository,
{
    cfg.service(
        web::scope("/chat")
            .service(web::resource("/list").route(web::get().to(handle::list_chats::<S>)))
            .service(
                web::resource("/messages/{chat_id}")
                    .route(web::post().to(handle::send_message::<S>)),
            )
            .service(
                web::resource("/upload/{chat_id}/{media_type}")
                    .route(web::post().to(handle::upload_media::<S>)),
            )
            .service(
                web::resource("/{chat_id}/messages").route(web::get().to(handle::get_messages::<S>)),
            )
            .service(web::resource("/{chat_id}/read").route(web::post().to(handle::mark_read::<S>))),
    );
}
