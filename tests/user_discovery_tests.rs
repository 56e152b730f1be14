use actix_web::{test, web, App};
use std::sync::Arc;

use picstream::api;
use picstream::auth::AuthService;
use picstream::feed::FeedAggregator;
use picstream::models::User;
use picstream::presence::PresenceRegistry;
use picstream::realtime::NotificationDispatcher;
use picstream::store::Store;

fn services() -> (
    Arc<Store>,
    Arc<AuthService>,
    Arc<PresenceRegistry>,
    Arc<NotificationDispatcher>,
    Arc<FeedAggregator>,
) {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth = Arc::new(AuthService::new("test-secret".to_string()));
    let presence = Arc::new(PresenceRegistry::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(presence.clone()));
    let feed = Arc::new(FeedAggregator::new(store.clone()));
    (store, auth, presence, dispatcher, feed)
}

fn create_test_user_with_token(
    store: &Arc<Store>,
    auth: &Arc<AuthService>,
    username: &str,
) -> (User, String) {
    let mut user = User {
        id: String::new(),
        username: username.to_string(),
        email: format!("{}@test.com", username),
        password_hash: auth.hash_password("testpass123").unwrap(),
        bio: String::new(),
        avatar_url: String::new(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.create_user(&mut user).unwrap();
    let token = auth.issue_token(&user.id).unwrap();
    (user, token)
}

macro_rules! init_app {
    ($store:expr, $auth:expr, $presence:expr, $dispatcher:expr, $feed:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($store.clone()))
                .app_data(web::Data::new($auth.clone()))
                .app_data(web::Data::new($presence.clone()))
                .app_data(web::Data::new($dispatcher.clone()))
                .app_data(web::Data::new($feed.clone()))
                .configure(api::configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_check_username_availability() {
    let (store, auth, presence, dispatcher, feed) = services();
    create_test_user_with_token(&store, &auth, "alice");
    let app = init_app!(store, auth, presence, dispatcher, feed);

    let req = test::TestRequest::get()
        .uri("/api/v1/user/check-username?username=alice")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/user/check-username?username=brand_new")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"], true);
}

#[actix_web::test]
async fn test_check_username_requires_value() {
    let (store, auth, presence, dispatcher, feed) = services();
    let app = init_app!(store, auth, presence, dispatcher, feed);

    let req = test::TestRequest::get()
        .uri("/api/v1/user/check-username?username=%20")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_list_all_users() {
    let (store, auth, presence, dispatcher, feed) = services();
    create_test_user_with_token(&store, &auth, "bob");
    create_test_user_with_token(&store, &auth, "alice");
    let app = init_app!(store, auth, presence, dispatcher, feed);

    let req = test::TestRequest::get().uri("/api/v1/user/all").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "alice");
    assert_eq!(users[1]["username"], "bob");
    // listing carries public identity only
    assert!(users[0].get("email").is_none());
}

#[actix_web::test]
async fn test_search_users_by_substring() {
    let (store, auth, presence, dispatcher, feed) = services();
    create_test_user_with_token(&store, &auth, "alice");
    create_test_user_with_token(&store, &auth, "malice");
    create_test_user_with_token(&store, &auth, "bob");
    let app = init_app!(store, auth, presence, dispatcher, feed);

    let req = test::TestRequest::get()
        .uri("/api/v1/user/search?q=lic")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "alice");
    assert_eq!(users[1]["username"], "malice");

    let req = test::TestRequest::get()
        .uri("/api/v1/user/search?q=%20")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_suggested_excludes_self_and_followed() {
    let (store, auth, presence, dispatcher, feed) = services();
    let (alice, token) = create_test_user_with_token(&store, &auth, "alice");
    let (bob, _) = create_test_user_with_token(&store, &auth, "bob");
    create_test_user_with_token(&store, &auth, "carol");
    store.toggle_follow(&alice.id, &bob.id).unwrap();
    let app = init_app!(store, auth, presence, dispatcher, feed);

    let req = test::TestRequest::get()
        .uri("/api/v1/user/suggested")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["username"], "carol");
}

#[actix_web::test]
async fn test_suggested_requires_auth() {
    let (store, auth, presence, dispatcher, feed) = services();
    let app = init_app!(store, auth, presence, dispatcher, feed);

    let req = test::TestRequest::get()
        .uri("/api/v1/user/suggested")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}
