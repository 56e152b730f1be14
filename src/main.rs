use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;

use picstream::api;
use picstream::auth::AuthService;
use picstream::feed::FeedAggregator;
use picstream::presence::PresenceRegistry;
use picstream::realtime::NotificationDispatcher;
use picstream::store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "picstream.db".to_string());
    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("JWT_SECRET not set, using insecure default");
        "dev-secret-change-me".to_string()
    });

    let store = Arc::new(Store::new(&db_path).expect("failed to open database"));
    let auth = Arc::new(AuthService::new(jwt_secret));
    let presence = Arc::new(PresenceRegistry::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(presence.clone()));
    let feed = Arc::new(FeedAggregator::new(store.clone()));

    log::info!("starting server on port {} (db: {})", port, db_path);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(auth.clone()))
            .app_data(web::Data::new(presence.clone()))
            .app_data(web::Data::new(dispatcher.clone()))
            .app_data(web::Data::new(feed.clone()))
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
