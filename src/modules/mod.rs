pub mod chat {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod friend {
    pub mod schema;
    pub mod repository;
    pub mod repository_pg;
    pub mod service;
}

pub mod media;
pub mod websocket;
