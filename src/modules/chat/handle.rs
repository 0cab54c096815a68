use actix_multipart::Multipart;
use actix_web::{web, HttpRequest};
use futures_util::TryStreamExt;

use crate::api::{error, success};
use crate::constants::MAX_MEDIA_SIZE;
use crate::middlewares::get_user_id;
use crate::modules::chat::{
    model::{ChatSummary, HistoryQuery, MessageDraft, UploadMediaResponse},
    repository::ChatRepository,
    schema::{MessageEntity, MessageType},
    service::ChatService,
};
use crate::utils::{ValidatedJson, ValidatedQuery};

pub async fn list_chats<S>(
    chat_service: web::Data<ChatService<S>>,
    req: HttpRequest,
) -> Result<success::Success<Vec<ChatSummary>>, error::Error>
where
    S: ChatRepository,
{
    let user_id = get_user_id(&req)?;
    let chats = chat_service.list_chats(user_id).await?;
    Ok(success::Success::ok(Some(chats)).message("Chats retrieved successfully"))
}

pub async fn send_message<S>(
    chat_service: web::Data<ChatService<S>>,
    chat_id: web::Path<i64>,
    draft: ValidatedJson<MessageDraft>,
    req: HttpRequest,
) -> Result<success::Success<MessageEntity>, error::Error>
where
    S: ChatRepository,
{
    let sender_id = get_user_id(&req)?;
    let message =
        chat_service.send_to_chat(chat_id.into_inner(), sender_id, draft.0, false).await?;
    Ok(success::Success::created(Some(message)).message("Message sent successfully"))
}

pub async fn get_messages<S>(
    chat_service: web::Data<ChatService<S>>,
    chat_id: web::Path<i64>,
    query: ValidatedQuery<HistoryQuery>,
    req: HttpRequest,
) -> Result<success::Success<Vec<MessageEntity>>, error::Error>
where
    S: ChatRepository,
{
    let user_id = get_user_id(&req)?;
    let HistoryQuery { limit, before_id } = query.0;
    let messages =
        chat_service.get_messages(chat_id.into_inner(), user_id, limit, before_id).await?;
    Ok(success::Success::ok(Some(messages)).message("Messages retrieved successfully"))
}

pub async fn mark_read<S>(
    chat_service: web::Data<ChatService<S>>,
    chat_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<success::Success<Vec<MessageEntity>>, error::Error>
where
    S: ChatRepository,
{
    let reader_id = get_user_id(&req)?;
    let updated = chat_service.mark_read(chat_id.into_inner(), reader_id).await?;
    Ok(success::Success::ok(Some(updated)).message("Messages marked as read"))
}

/// Multipart upload; the first field carrying a filename is stored.
pub async fn upload_media<S>(
    chat_service: web::Data<ChatService<S>>,
    path: web::Path<(i64, MessageType)>,
    mut payload: Multipart,
    req: HttpRequest,
) -> Result<success::Success<UploadMediaResponse>, error::Error>
where
    S: ChatRepository,
{
    let sender_id = get_user_id(&req)?;
    let (chat_id, media_type) = path.into_inner();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| error::Error::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let Some(filename) =
            field.content_disposition().and_then(|cd| cd.get_filename()).map(str::to_string)
        else {
            continue;
        };

        let content_type = field.content_type().map(|m| m.essence_str().to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| error::Error::bad_request(format!("Invalid multipart body: {e}")))?
        {
            if bytes.len() + chunk.len() > MAX_MEDIA_SIZE {
                return Err(error::Error::bad_request(format!(
                    "File size exceeds maximum allowed size of {MAX_MEDIA_SIZE} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let uploaded = chat_service
            .upload_media(chat_id, sender_id, media_type, &filename, content_type, bytes)
            .await?;

        return Ok(success::Success::created(Some(uploaded)).message("File uploaded successfully"));
    }

    Err(error::Error::bad_request("No file found in request"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middlewares::authentication;
    use crate::modules::chat::route;
    use crate::test::{access_token, auth_validator, ChatHarness, MemoryChatStore};
    use actix_web::{http::StatusCode, middleware::from_fn, test, App};
    use serde_json::Value;

    const A: i64 = 1;
    const B: i64 = 2;
    const C: i64 = 3;

    macro_rules! init_app {
        ($h:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from($h.service.clone()))
                    .app_data(web::Data::from(auth_validator()))
                    .service(
                        web::scope("/api").service(
                            web::scope("")
                                .wrap(from_fn(authentication))
                                .configure(route::configure::<MemoryChatStore>),
                        ),
                    ),
            )
            .await
        };
    }

    fn bearer(user_id: i64) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", access_token(user_id)))
    }

    #[actix_web::test]
    async fn test_send_then_fetch_history() {
        let h = ChatHarness::new();
        h.befriend(A, B);
        let chat = h.service.get_or_create_chat(A, B).await.unwrap();
        let app = init_app!(h);

        let req = test::TestRequest::post()
            .uri(&format!("/api/chat/messages/{}", chat.id))
            .insert_header(bearer(A))
            .set_json(serde_json::json!({"content": "hello", "type": "text"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["content"], "hello");
        assert_eq!(body["data"]["status"], "sent");

        let req = test::TestRequest::get()
            .uri(&format!("/api/chat/{}/messages?limit=10", chat.id))
            .insert_header(bearer(B))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["sender_id"], A);

        let req = test::TestRequest::get()
            .uri("/api/chat/list")
            .insert_header(bearer(B))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["counterpart_id"], A);
        assert_eq!(body["data"][0]["unread_count"], 1);

        let req = test::TestRequest::post()
            .uri(&format!("/api/chat/{}/read", chat.id))
            .insert_header(bearer(B))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["status"], "read");
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let h = ChatHarness::new();
        h.befriend(A, B);
        let chat = h.service.get_or_create_chat(A, B).await.unwrap();
        let app = init_app!(h);

        let req = test::TestRequest::get()
            .uri(&format!("/api/chat/{}/messages", chat.id))
            .insert_header(bearer(C))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "You are not a member of this chat");

        let req = test::TestRequest::post()
            .uri("/api/chat/999/read")
            .insert_header(bearer(A))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri(&format!("/api/chat/{}/messages?limit=0", chat.id))
            .insert_header(bearer(A))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri(&format!("/api/chat/messages/{}", chat.id))
            .insert_header(bearer(A))
            .set_json(serde_json::json!({"content": ""}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert!(h.store.snapshot().await.messages.is_empty());
    }

    #[actix_web::test]
    async fn test_multipart_upload() {
        let h = ChatHarness::new();
        h.befriend(A, B);
        let chat = h.service.get_or_create_chat(A, B).await.unwrap();
        let app = init_app!(h);

        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{boundary}--\r\n"
        );

        let req = test::TestRequest::post()
            .uri(&format!("/api/chat/upload/{}/image", chat.id))
            .insert_header(bearer(A))
            .insert_header((
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json["data"]["type"], "image");

        let keys = h.blobs.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with(&format!("chat_images/{A}/{}/", chat.id)));
        let (bytes, content_type) = h.blobs.object(&keys[0]).unwrap();
        assert_eq!(bytes, b"PNGDATA");
        assert_eq!(content_type, "image/png");
    }
}
