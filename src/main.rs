use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    self, middleware::{from_fn, Logger}, web, App, HttpResponse, HttpServer,
};
use std::sync::{Arc, LazyLock};

use crate::{
    configs::{connect_database, connect_redis, RedisCache},
    middlewares::authentication,
    modules::{
        chat::{repository_pg::ChatRepositoryPg, service::ChatSvc},
        friend::{repository_pg::FriendRepositoryPg, service::FriendshipGate},
        media::{LocalBlobStore, UploadConfig},
        websocket::{
            fanout::RedisFanoutBus, manager::ConnectionManager, presence::RedisPresenceRegistry,
            server::ConnectionHub,
        },
    },
    utils::{AuthValidator, JwtAuthValidator},
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
#[cfg(test)]
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    log::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check(manager: web::Data<ConnectionManager>) -> HttpResponse {
    let connections = manager.local_connection_count().await;
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "connections": connections }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let redis_pool =
        connect_redis().map_err(|_| std::io::Error::other("Redis connection error"))?;

    let auth: Arc<dyn AuthValidator> = Arc::new(JwtAuthValidator::new(ENV.jwt_secret.clone()));
    let presence = Arc::new(RedisPresenceRegistry::new(redis_pool.clone()));
    let bus = Arc::new(
        RedisFanoutBus::new(&ENV.redis_url, redis_pool.clone())
            .map_err(|_| std::io::Error::other("Redis pub/sub client error"))?,
    );

    let gate = Arc::new(FriendshipGate::with_dependencies(
        Arc::new(FriendRepositoryPg::new(db_pool.clone())),
        Arc::new(RedisCache::new(redis_pool.clone())),
        ENV.friendship_cache_ttl,
    ));

    if let Err(e) = gate.clone().watch_link_changes(bus.as_ref()).await {
        log::warn!("Link change subscription failed, cached links expire by TTL only: {e}");
    }

    let hub = ConnectionHub::new().start();
    let connection_manager = ConnectionManager::with_dependencies(
        hub,
        presence.clone(),
        bus,
        auth.clone(),
        ENV.presence_ttl,
    );

    let chat_service: ChatSvc = ChatSvc::with_dependencies(
        Arc::new(ChatRepositoryPg::new(db_pool.clone())),
        gate,
        connection_manager.clone(),
        presence,
        Arc::new(LocalBlobStore::new(ENV.upload_dir.as_str(), ENV.upload_base_url.as_str())),
        UploadConfig::default(),
    );
    let chat_service = web::Data::new(chat_service);
    let connection_manager = web::Data::new(connection_manager);
    let auth = web::Data::from(auth);

    log::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&ENV.frontend_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(chat_service.clone())
            .app_data(connection_manager.clone())
            .app_data(auth.clone())
            .service(health_check)
            .service(
                web::scope("/api")
                    .configure(modules::chat::route::ws_configure::<ChatRepositoryPg>)
                    .service(
                        web::scope("")
                            .wrap(from_fn(authentication))
                            .configure(modules::chat::route::configure::<ChatRepositoryPg>),
                    ),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
