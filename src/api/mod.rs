use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::{AuthError, AuthService, AuthUser};
use crate::feed::{summarize, FeedAggregator};
use crate::models::*;
use crate::presence::{ConnectionHandle, PresenceRegistry};
use crate::realtime::{NotificationDispatcher, ReactionKind};
use crate::store::{Store, StoreError, ToggleOutcome};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Error bodies carry the same envelope as success bodies, and the
    // transport status always equals the envelope's statusCode.
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ApiResponse::<serde_json::Value> {
            status_code: status.as_u16(),
            data: None,
            message: self.to_string(),
            success: false,
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::InvalidInput(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::MissingToken => {
                ApiError::Auth(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn respond<T: Serialize>(body: ApiResponse<T>) -> HttpResponse {
    let status = StatusCode::from_u16(body.status_code).unwrap_or(StatusCode::OK);
    HttpResponse::build(status).json(body)
}

// ==================== User handlers ====================

async fn register(
    store: web::Data<Arc<Store>>,
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.username.trim().is_empty() || body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation(
            "username, email and password are required".to_string(),
        ));
    }

    let mut user = User {
        id: String::new(),
        username: body.username.trim().to_string(),
        email: body.email.trim().to_string(),
        password_hash: auth.hash_password(&body.password)?,
        bio: String::new(),
        avatar_url: String::new(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.create_user(&mut user)?;
    log::info!("registered user {} ({})", user.username, user.id);

    Ok(respond(ApiResponse::created(
        user,
        "Account created successfully.",
    )))
}

async fn login(
    store: web::Data<Arc<Store>>,
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation(
            "email and password are required".to_string(),
        ));
    }

    let user = store
        .get_user_by_email(body.email.trim())
        .map_err(|_| ApiError::Auth("incorrect email or password".to_string()))?;
    if !auth.verify_password(&body.password, &user.password_hash)? {
        return Err(ApiError::Auth("incorrect email or password".to_string()));
    }

    let token = auth.issue_token(&user.id)?;
    let message = format!("Welcome back {}", user.username);
    Ok(respond(ApiResponse::ok(LoginResponse { token, user }, message)))
}

async fn logout() -> Result<HttpResponse, ApiError> {
    // bearer tokens are stateless; logout is a client-side discard
    Ok(respond(ApiResponse::message_only("Logged out successfully.")))
}

async fn get_profile(
    store: web::Data<Arc<Store>>,
    feed: web::Data<Arc<FeedAggregator>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let user = store.get_user(&user_id)?;
    let profile = ProfileView {
        followers: store.followers_of(&user.id)?,
        following: store.following_of(&user.id)?,
        bookmarks: store.bookmarks_of(&user.id)?,
        posts: feed.list_user_posts(&user.id)?,
        user,
    };
    Ok(respond(ApiResponse::ok(profile, "Profile fetched.")))
}

async fn edit_profile(
    store: web::Data<Arc<Store>>,
    auth_user: AuthUser,
    body: web::Json<EditProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let user = store.update_profile(
        &auth_user.user_id,
        body.bio.as_deref(),
        body.avatar_url.as_deref(),
    )?;
    Ok(respond(ApiResponse::ok(user, "Profile updated.")))
}

async fn follow_or_unfollow(
    store: web::Data<Arc<Store>>,
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let target_id = path.into_inner();
    if auth_user.user_id == target_id {
        return Err(ApiError::Validation(
            "you cannot follow or unfollow yourself".to_string(),
        ));
    }
    let actor = store.get_user(&auth_user.user_id)?;
    let target = store.get_user(&target_id)?;

    let outcome = store.toggle_follow(&actor.id, &target.id)?;
    let verdict = match outcome {
        ToggleOutcome::Added => {
            dispatcher.notify_follow(&actor, &target.id);
            "follow"
        }
        ToggleOutcome::Removed => "unfollow",
    };
    let message = match outcome {
        ToggleOutcome::Added => format!("Followed {}", target.username),
        ToggleOutcome::Removed => format!("Unfollowed {}", target.username),
    };
    Ok(respond(ApiResponse::ok(verdict, message)))
}

async fn followers(
    store: web::Data<Arc<Store>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    store.get_user(&user_id)?;
    let users = resolve_users(&store, store.followers_of(&user_id)?)?;
    Ok(respond(ApiResponse::ok(users, "Followers fetched.")))
}

async fn followings(
    store: web::Data<Arc<Store>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    store.get_user(&user_id)?;
    let users = resolve_users(&store, store.following_of(&user_id)?)?;
    Ok(respond(ApiResponse::ok(users, "Followings fetched.")))
}

fn resolve_users(store: &Store, ids: Vec<String>) -> Result<Vec<AuthorSummary>, ApiError> {
    ids.iter()
        .map(|id| Ok(summarize(&store.get_user(id)?)))
        .collect()
}

#[derive(Debug, Deserialize)]
struct UsernameQuery {
    username: String,
}

async fn check_username(
    store: web::Data<Arc<Store>>,
    query: web::Query<UsernameQuery>,
) -> Result<HttpResponse, ApiError> {
    let username = query.into_inner().username;
    if username.trim().is_empty() {
        return Err(ApiError::Validation("username is required".to_string()));
    }
    let taken = store.username_taken(username.trim())?;
    let message = if taken {
        "Username is already taken."
    } else {
        "Username is available."
    };
    Ok(respond(ApiResponse::ok(!taken, message)))
}

async fn list_all_users(store: web::Data<Arc<Store>>) -> Result<HttpResponse, ApiError> {
    let users: Vec<AuthorSummary> = store.list_users()?.iter().map(summarize).collect();
    Ok(respond(ApiResponse::ok(users, "Users fetched.")))
}

async fn suggested_users(
    store: web::Data<Arc<Store>>,
    auth_user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let users: Vec<AuthorSummary> = store
        .suggested_users(&auth_user.user_id, 10)?
        .iter()
        .map(summarize)
        .collect();
    Ok(respond(ApiResponse::ok(users, "Suggested users fetched.")))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

async fn search_users(
    store: web::Data<Arc<Store>>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner().q;
    if q.trim().is_empty() {
        return Err(ApiError::Validation("search query is required".to_string()));
    }
    let users: Vec<AuthorSummary> = store.search_users(q.trim())?.iter().map(summarize).collect();
    Ok(respond(ApiResponse::ok(users, "Users fetched.")))
}

// ==================== Post handlers ====================

async fn add_post(
    store: web::Data<Arc<Store>>,
    feed: web::Data<Arc<FeedAggregator>>,
    auth_user: AuthUser,
    body: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.image_url.trim().is_empty() {
        return Err(ApiError::Validation("image URL is required".to_string()));
    }

    let mut post = Post {
        id: String::new(),
        author_id: auth_user.user_id.clone(),
        caption: body.caption,
        image_url: body.image_url.trim().to_string(),
        created_at: chrono::Utc::now(),
    };
    store.create_post(&mut post)?;
    let view = feed.post_view(&post.id)?;
    Ok(respond(ApiResponse::created(view, "New post added.")))
}

async fn all_posts(feed: web::Data<Arc<FeedAggregator>>) -> Result<HttpResponse, ApiError> {
    let posts = feed.list_posts()?;
    Ok(respond(ApiResponse::ok(posts, "Posts fetched.")))
}

async fn user_posts(
    feed: web::Data<Arc<FeedAggregator>>,
    auth_user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let posts = feed.list_user_posts(&auth_user.user_id)?;
    Ok(respond(ApiResponse::ok(posts, "Posts fetched.")))
}

async fn delete_post(
    store: web::Data<Arc<Store>>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let post = store.get_post(&post_id)?;
    if post.author_id != auth_user.user_id {
        return Err(ApiError::Auth(
            "only the author can delete a post".to_string(),
        ));
    }
    store.delete_post(&post_id)?;
    Ok(respond(ApiResponse::message_only("Post deleted.")))
}

async fn like_post(
    store: web::Data<Arc<Store>>,
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let post = store.get_post(&post_id)?;
    let actor = store.get_user(&auth_user.user_id)?;

    store.like_post(&post.id, &actor.id)?;
    // fires on every call, changed or not
    dispatcher.notify_reaction(ReactionKind::Like, &actor, &post.author_id, &post.id);
    Ok(respond(ApiResponse::message_only("Post liked.")))
}

async fn dislike_post(
    store: web::Data<Arc<Store>>,
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let post = store.get_post(&post_id)?;
    let actor = store.get_user(&auth_user.user_id)?;

    store.unlike_post(&post.id, &actor.id)?;
    dispatcher.notify_reaction(ReactionKind::Dislike, &actor, &post.author_id, &post.id);
    Ok(respond(ApiResponse::message_only("Post disliked.")))
}

async fn add_comment(
    store: web::Data<Arc<Store>>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<AddCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let text = body.into_inner().text;
    if text.trim().is_empty() {
        return Err(ApiError::Validation("comment text is required".to_string()));
    }
    let post = store.get_post(&post_id)?;
    let author = store.get_user(&auth_user.user_id)?;

    let mut comment = Comment {
        id: String::new(),
        post_id: post.id,
        author_id: author.id.clone(),
        text: text.trim().to_string(),
        created_at: chrono::Utc::now(),
    };
    store.create_comment(&mut comment)?;

    let view = CommentView {
        id: comment.id,
        text: comment.text,
        author: summarize(&author),
        created_at: comment.created_at,
    };
    Ok(respond(ApiResponse::created(view, "Comment added.")))
}

async fn all_comments(
    store: web::Data<Arc<Store>>,
    feed: web::Data<Arc<FeedAggregator>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    store.get_post(&post_id)?;
    let comments = feed.comment_views(&post_id)?;
    Ok(respond(ApiResponse::ok(comments, "Comments fetched.")))
}

async fn bookmark_post(
    store: web::Data<Arc<Store>>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let post = store.get_post(&post_id)?;
    let outcome = store.toggle_bookmark(&auth_user.user_id, &post.id)?;
    let (verdict, message) = match outcome {
        ToggleOutcome::Added => ("saved", "Post bookmarked."),
        ToggleOutcome::Removed => ("unsaved", "Post removed from bookmarks."),
    };
    Ok(respond(ApiResponse::ok(verdict, message)))
}

// ==================== Message handlers ====================

async fn send_message(
    store: web::Data<Arc<Store>>,
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    let receiver_id = path.into_inner();
    let text = body.into_inner().text_message;
    if text.trim().is_empty() {
        return Err(ApiError::Validation("message text is required".to_string()));
    }
    if auth_user.user_id == receiver_id {
        return Err(ApiError::Validation(
            "you cannot message yourself".to_string(),
        ));
    }
    let receiver = store.get_user(&receiver_id)?;

    let conversation = store.get_or_create_conversation(&auth_user.user_id, &receiver.id)?;
    let message = store.append_message(
        &conversation.id,
        &auth_user.user_id,
        &receiver.id,
        text.trim(),
    )?;
    dispatcher.notify_new_message(&message);
    Ok(respond(ApiResponse::created(message, "Message sent.")))
}

async fn get_messages(
    store: web::Data<Arc<Store>>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let other_id = path.into_inner();
    // no conversation yet reads as an empty history, not an error
    let messages = store.messages_between(&auth_user.user_id, &other_id)?;
    Ok(respond(ApiResponse::ok(messages, "Messages fetched.")))
}

// ==================== Realtime ====================

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// Upgrade to a websocket, bind it to the user from the handshake query,
/// and keep presence in sync with the connection's lifetime.
async fn ws_connect(
    req: HttpRequest,
    body: web::Payload,
    presence: web::Data<Arc<PresenceRegistry>>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = match query.into_inner().user_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(ApiError::Validation("userId query parameter is required".to_string()).into()),
    };

    let (response, session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(tx);
    let connection_id = handle.connection_id.clone();
    presence.register(&user_id, handle);
    log::info!("ws connected: user={} conn={}", user_id, connection_id);

    // push loop: registry events out to the socket
    let mut push_session = session.clone();
    actix_web::rt::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("failed to serialize realtime event: {}", e);
                    continue;
                }
            };
            if push_session.text(text).await.is_err() {
                break;
            }
        }
    });

    // read loop: only control frames matter; close tears down presence
    let presence = presence.into_inner();
    actix_web::rt::spawn(async move {
        let mut session = session;
        while let Some(Ok(msg)) = msg_stream.next().await {
            match msg {
                actix_ws::Message::Ping(bytes) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                actix_ws::Message::Close(_) => break,
                _ => {}
            }
        }
        presence.unregister(&user_id, &connection_id);
        log::info!("ws disconnected: user={} conn={}", user_id, connection_id);
        let _ = session.close(None).await;
    });

    Ok(response)
}

async fn health(presence: web::Data<Arc<PresenceRegistry>>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "onlineUsers": presence.online_user_ids().len(),
    }))
}

// ==================== Routes ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::scope("/user")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/logout", web::get().to(logout))
                    .route("/profile/edit", web::post().to(edit_profile))
                    .route("/check-username", web::get().to(check_username))
                    .route("/all", web::get().to(list_all_users))
                    .route("/suggested", web::get().to(suggested_users))
                    .route("/search", web::get().to(search_users))
                    .route("/followorunfollow/{id}", web::post().to(follow_or_unfollow))
                    .route("/{id}/profile", web::get().to(get_profile))
                    .route("/{id}/followers", web::get().to(followers))
                    .route("/{id}/followings", web::get().to(followings)),
            )
            .service(
                web::scope("/post")
                    .route("/add", web::post().to(add_post))
                    .route("/allposts", web::get().to(all_posts))
                    .route("/userposts/all", web::get().to(user_posts))
                    .route("/delete/{id}", web::delete().to(delete_post))
                    .route("/{id}/like", web::get().to(like_post))
                    .route("/{id}/dislike", web::get().to(dislike_post))
                    .route("/{id}/comment/all", web::get().to(all_comments))
                    .route("/{id}/comment", web::post().to(add_comment))
                    .route("/{id}/bookmark", web::get().to(bookmark_post)),
            )
            .service(
                web::scope("/message")
                    .route("/{receiver_id}", web::post().to(send_message))
                    .route("/{receiver_id}", web::get().to(get_messages)),
            ),
    )
    .route("/ws", web::get().to(ws_connect))
    .route("/health", web::get().to(health));
}
