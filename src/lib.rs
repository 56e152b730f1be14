pub mod api;
pub mod auth;
pub mod feed;
pub mod models;
pub mod presence;
pub mod realtime;
pub mod store;
