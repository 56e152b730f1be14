use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which way a toggle operation flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                bio TEXT DEFAULT '',
                avatar_url TEXT DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follows (
                follower_id TEXT NOT NULL,
                followee_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (follower_id, followee_id),
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (followee_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                caption TEXT DEFAULT '',
                image_url TEXT DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS post_likes (
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id),
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS bookmarks (
                user_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, post_id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (post_id) REFERENCES posts(id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                pair_key TEXT UNIQUE NOT NULL,
                participant_a TEXT NOT NULL,
                participant_b TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            );

            CREATE INDEX IF NOT EXISTS idx_follows_followee ON follows(followee_id);
            CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        let result = conn.execute(
            r#"INSERT INTO users (id, username, email, password_hash, bio, avatar_url, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &user.id,
                &user.username,
                &user.email,
                &user.password_hash,
                &user.bio,
                &user.avatar_url,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(format!(
                    "username or email already taken: {}",
                    user.username
                )))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], |row| {
            self.row_to_user(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("User {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            |row| self.row_to_user(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", email))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn update_profile(
        &self,
        id: &str,
        bio: Option<&str>,
        avatar_url: Option<&str>,
    ) -> StoreResult<User> {
        {
            let conn = self.conn.lock().unwrap();
            let now = Utc::now().to_rfc3339();
            let rows = conn.execute(
                r#"UPDATE users SET bio = COALESCE(?1, bio),
                   avatar_url = COALESCE(?2, avatar_url), updated_at = ?3 WHERE id = ?4"#,
                params![bio, avatar_url, now, id],
            )?;
            if rows == 0 {
                return Err(StoreError::NotFound(format!("User {}", id)));
            }
        }
        self.get_user(id)
    }

    pub fn username_taken(&self, username: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY username ASC")?;
        let rows = stmt.query_map([], |row| self.row_to_user(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn search_users(&self, query: &str) -> StoreResult<Vec<User>> {
        let pattern = format!(
            "%{}%",
            query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM users WHERE username LIKE ?1 ESCAPE '\\' ORDER BY username ASC",
        )?;
        let rows = stmt.query_map(params![pattern], |row| self.row_to_user(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Users the given user does not follow yet, themselves excluded.
    pub fn suggested_users(&self, user_id: &str, limit: u32) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM users
               WHERE id != ?1
                 AND id NOT IN (SELECT followee_id FROM follows WHERE follower_id = ?1)
               ORDER BY created_at DESC, rowid DESC LIMIT ?2"#,
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| self.row_to_user(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn row_to_user(&self, row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            bio: row.get("bio")?,
            avatar_url: row.get("avatar_url")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    // ==================== Social Graph ====================

    /// Toggle the follow relation. The relation is a single row, so both the
    /// "following" and "followers" views always agree; the toggle is one
    /// conditional insert-or-delete under the connection lock.
    /// Precondition: `follower != followee` (validated at the API layer).
    pub fn toggle_follow(&self, follower: &str, followee: &str) -> StoreResult<ToggleOutcome> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
            params![follower, followee, now],
        )?;
        if inserted == 1 {
            Ok(ToggleOutcome::Added)
        } else {
            conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                params![follower, followee],
            )?;
            Ok(ToggleOutcome::Removed)
        }
    }

    pub fn following_of(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT followee_id FROM follows WHERE follower_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn followers_of(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT follower_id FROM follows WHERE followee_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn is_following(&self, follower: &str, followee: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
            params![follower, followee],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ==================== Post Operations ====================

    pub fn create_post(&self, post: &mut Post) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        post.id = Uuid::new_v4().to_string();
        post.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO posts (id, author_id, caption, image_url, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &post.id,
                &post.author_id,
                &post.caption,
                &post.image_url,
                post.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM posts WHERE id = ?1", params![id], |row| {
            self.row_to_post(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Post {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM posts ORDER BY created_at DESC, rowid DESC")?;
        let rows = stmt.query_map([], |row| self.row_to_post(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_posts_by_author(&self, author_id: &str) -> StoreResult<Vec<Post>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM posts WHERE author_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![author_id], |row| self.row_to_post(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete a post and cascade its comments, likes and bookmarks.
    pub fn delete_post(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?;
        tx.execute("DELETE FROM post_likes WHERE post_id = ?1", params![id])?;
        tx.execute("DELETE FROM bookmarks WHERE post_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        tx.commit()?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Post {}", id)));
        }
        Ok(())
    }

    fn row_to_post(&self, row: &rusqlite::Row) -> rusqlite::Result<Post> {
        Ok(Post {
            id: row.get("id")?,
            author_id: row.get("author_id")?,
            caption: row.get("caption")?,
            image_url: row.get("image_url")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Reactions ====================

    /// Set-add: repeating is a no-op. Returns whether the like was new.
    pub fn like_post(&self, post_id: &str, user_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![post_id, user_id, now],
        )?;
        Ok(inserted == 1)
    }

    /// Set-remove: removing an absent like is a no-op.
    pub fn unlike_post(&self, post_id: &str, user_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        Ok(removed == 1)
    }

    pub fn likes_of_post(&self, post_id: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![post_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Same atomic insert-or-delete shape as `toggle_follow`.
    pub fn toggle_bookmark(&self, user_id: &str, post_id: &str) -> StoreResult<ToggleOutcome> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO bookmarks (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, post_id, now],
        )?;
        if inserted == 1 {
            Ok(ToggleOutcome::Added)
        } else {
            conn.execute(
                "DELETE FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
            )?;
            Ok(ToggleOutcome::Removed)
        }
    }

    pub fn bookmarks_of(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT post_id FROM bookmarks WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ==================== Comments ====================

    pub fn create_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        comment.id = Uuid::new_v4().to_string();
        comment.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO comments (id, post_id, author_id, text, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &comment.id,
                &comment.post_id,
                &comment.author_id,
                &comment.text,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Comments for a post, most recent first.
    pub fn comments_for_post(&self, post_id: &str) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM comments WHERE post_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![post_id], |row| self.row_to_comment(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn row_to_comment(&self, row: &rusqlite::Row) -> rusqlite::Result<Comment> {
        Ok(Comment {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            author_id: row.get("author_id")?,
            text: row.get("text")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Conversations & Messages ====================

    /// Resolve or create the single conversation for an unordered pair.
    /// Creation is an idempotent upsert keyed by the canonical pair key, so
    /// two racing first messages resolve to the same row; the UNIQUE
    /// constraint backs this up even across processes.
    pub fn get_or_create_conversation(&self, a: &str, b: &str) -> StoreResult<Conversation> {
        if a == b {
            return Err(StoreError::InvalidInput(
                "conversation requires two distinct participants".to_string(),
            ));
        }
        let (pa, pb) = if a <= b { (a, b) } else { (b, a) };
        let key = pair_key(a, b);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT OR IGNORE INTO conversations (id, pair_key, participant_a, participant_b, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                Uuid::new_v4().to_string(),
                &key,
                pa,
                pb,
                Utc::now().to_rfc3339(),
            ],
        )?;
        conn.query_row(
            "SELECT * FROM conversations WHERE pair_key = ?1",
            params![&key],
            |row| self.row_to_conversation(row),
        )
        .map_err(StoreError::Database)
    }

    pub fn find_conversation(&self, a: &str, b: &str) -> StoreResult<Option<Conversation>> {
        let key = pair_key(a, b);
        let conn = self.conn.lock().unwrap();
        let conversation = conn
            .query_row(
                "SELECT * FROM conversations WHERE pair_key = ?1",
                params![&key],
                |row| self.row_to_conversation(row),
            )
            .optional()?;
        Ok(conversation)
    }

    /// Append a message. The timestamp is clamped so it never decreases
    /// within a conversation; the row itself is the only record of
    /// membership (no embedded message array to keep in sync).
    pub fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        receiver_id: &str,
        body: &str,
    ) -> StoreResult<Message> {
        let conn = self.conn.lock().unwrap();
        let last: Option<String> = conn
            .query_row(
                "SELECT created_at FROM messages WHERE conversation_id = ?1 ORDER BY rowid DESC LIMIT 1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;

        let mut created_at = Utc::now();
        if let Some(prev) = last {
            let prev = parse_datetime(prev);
            if prev > created_at {
                created_at = prev;
            }
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            message: body.to_string(),
            created_at,
        };
        conn.execute(
            r#"INSERT INTO messages (id, conversation_id, sender_id, receiver_id, body, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &message.id,
                &message.conversation_id,
                &message.sender_id,
                &message.receiver_id,
                &message.message,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(message)
    }

    /// Messages in append order. rowid breaks timestamp ties.
    pub fn messages_for_conversation(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| self.row_to_message(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Ordered history for a pair; empty when they never talked (not an error).
    pub fn messages_between(&self, a: &str, b: &str) -> StoreResult<Vec<Message>> {
        match self.find_conversation(a, b)? {
            Some(conversation) => self.messages_for_conversation(&conversation.id),
            None => Ok(Vec::new()),
        }
    }

    fn row_to_conversation(&self, row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: row.get("id")?,
            pair_key: row.get("pair_key")?,
            participant_a: row.get("participant_a")?,
            participant_b: row.get("participant_b")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    fn row_to_message(&self, row: &rusqlite::Row) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            sender_id: row.get("sender_id")?,
            receiver_id: row.get("receiver_id")?,
            message: row.get("body")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }
}

/// Order-independent key for a user pair.
fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(username: &str) -> User {
        User {
            id: String::new(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "hash".to_string(),
            bio: String::new(),
            avatar_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_post(store: &Store, author_id: &str) -> Post {
        let mut post = Post {
            id: String::new(),
            author_id: author_id.to_string(),
            caption: "caption".to_string(),
            image_url: "https://img.example.com/1.jpg".to_string(),
            created_at: Utc::now(),
        };
        store.create_post(&mut post).unwrap();
        post
    }

    #[test]
    fn test_create_and_get_user() {
        let store = Store::in_memory().unwrap();
        let mut user = test_user("alice");
        store.create_user(&mut user).unwrap();
        assert!(!user.id.is_empty());

        let retrieved = store.get_user(&user.id).unwrap();
        assert_eq!(retrieved.username, "alice");
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let store = Store::in_memory().unwrap();
        let mut user = test_user("alice");
        store.create_user(&mut user).unwrap();

        let mut dup = test_user("alice");
        match store.create_user(&mut dup) {
            Err(StoreError::Conflict(_)) => {}
            other => panic!("expected conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_follow_involution() {
        let store = Store::in_memory().unwrap();
        let mut a = test_user("alice");
        let mut b = test_user("bob");
        store.create_user(&mut a).unwrap();
        store.create_user(&mut b).unwrap();

        assert_eq!(
            store.toggle_follow(&a.id, &b.id).unwrap(),
            ToggleOutcome::Added
        );
        assert!(store.is_following(&a.id, &b.id).unwrap());

        assert_eq!(
            store.toggle_follow(&a.id, &b.id).unwrap(),
            ToggleOutcome::Removed
        );
        assert!(!store.is_following(&a.id, &b.id).unwrap());
        assert!(store.following_of(&a.id).unwrap().is_empty());
        assert!(store.followers_of(&b.id).unwrap().is_empty());
    }

    #[test]
    fn test_follow_symmetry() {
        let store = Store::in_memory().unwrap();
        let mut a = test_user("alice");
        let mut b = test_user("bob");
        let mut c = test_user("carol");
        store.create_user(&mut a).unwrap();
        store.create_user(&mut b).unwrap();
        store.create_user(&mut c).unwrap();

        store.toggle_follow(&a.id, &b.id).unwrap();
        store.toggle_follow(&c.id, &b.id).unwrap();
        store.toggle_follow(&b.id, &a.id).unwrap();
        store.toggle_follow(&c.id, &b.id).unwrap(); // carol unfollows bob again

        let users = [&a.id, &b.id, &c.id];
        for x in &users {
            for y in &users {
                let forward = store.following_of(x).unwrap().contains(&y.to_string());
                let backward = store.followers_of(y).unwrap().contains(&x.to_string());
                assert_eq!(forward, backward, "asymmetry between {} and {}", x, y);
            }
        }
        assert_eq!(store.followers_of(&b.id).unwrap(), vec![a.id.clone()]);
    }

    #[test]
    fn test_like_idempotence() {
        let store = Store::in_memory().unwrap();
        let mut a = test_user("alice");
        store.create_user(&mut a).unwrap();
        let post = test_post(&store, &a.id);

        assert!(store.like_post(&post.id, &a.id).unwrap());
        assert!(!store.like_post(&post.id, &a.id).unwrap());
        assert_eq!(store.likes_of_post(&post.id).unwrap(), vec![a.id.clone()]);

        assert!(store.unlike_post(&post.id, &a.id).unwrap());
        assert!(!store.unlike_post(&post.id, &a.id).unwrap());
        assert!(store.likes_of_post(&post.id).unwrap().is_empty());
    }

    #[test]
    fn test_bookmark_toggle() {
        let store = Store::in_memory().unwrap();
        let mut a = test_user("alice");
        store.create_user(&mut a).unwrap();
        let post = test_post(&store, &a.id);

        assert_eq!(
            store.toggle_bookmark(&a.id, &post.id).unwrap(),
            ToggleOutcome::Added
        );
        assert_eq!(store.bookmarks_of(&a.id).unwrap(), vec![post.id.clone()]);
        assert_eq!(
            store.toggle_bookmark(&a.id, &post.id).unwrap(),
            ToggleOutcome::Removed
        );
        assert!(store.bookmarks_of(&a.id).unwrap().is_empty());
    }

    #[test]
    fn test_single_conversation_per_pair() {
        let store = Store::in_memory().unwrap();
        let first = store.get_or_create_conversation("alice", "bob").unwrap();
        let second = store.get_or_create_conversation("bob", "alice").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.participant_a, "alice");
        assert_eq!(first.participant_b, "bob");
    }

    #[test]
    fn test_self_conversation_rejected_as_invalid_input() {
        let store = Store::in_memory().unwrap();
        match store.get_or_create_conversation("alice", "alice") {
            Err(StoreError::InvalidInput(_)) => {}
            other => panic!("expected invalid input, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_message_ordering_non_decreasing() {
        let store = Store::in_memory().unwrap();
        let conversation = store.get_or_create_conversation("alice", "bob").unwrap();

        for i in 0..20 {
            store
                .append_message(&conversation.id, "alice", "bob", &format!("msg {}", i))
                .unwrap();
        }

        let messages = store.messages_for_conversation(&conversation.id).unwrap();
        assert_eq!(messages.len(), 20);
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.message, format!("msg {}", i));
        }
    }

    #[test]
    fn test_messages_between_without_conversation_is_empty() {
        let store = Store::in_memory().unwrap();
        let messages = store.messages_between("alice", "bob").unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_username_taken() {
        let store = Store::in_memory().unwrap();
        assert!(!store.username_taken("alice").unwrap());
        let mut user = test_user("alice");
        store.create_user(&mut user).unwrap();
        assert!(store.username_taken("alice").unwrap());
        assert!(!store.username_taken("alic").unwrap());
    }

    #[test]
    fn test_search_users_by_substring() {
        let store = Store::in_memory().unwrap();
        for name in ["alice", "malice", "bob"] {
            let mut user = test_user(name);
            store.create_user(&mut user).unwrap();
        }

        let hits: Vec<String> = store
            .search_users("lic")
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(hits, vec!["alice", "malice"]);

        // LIKE wildcards in the query are literals, not patterns
        assert!(store.search_users("%").unwrap().is_empty());
    }

    #[test]
    fn test_suggested_excludes_self_and_followed() {
        let store = Store::in_memory().unwrap();
        let mut a = test_user("alice");
        let mut b = test_user("bob");
        let mut c = test_user("carol");
        store.create_user(&mut a).unwrap();
        store.create_user(&mut b).unwrap();
        store.create_user(&mut c).unwrap();
        store.toggle_follow(&a.id, &b.id).unwrap();

        let suggested: Vec<String> = store
            .suggested_users(&a.id, 10)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(suggested, vec!["carol"]);
    }

    #[test]
    fn test_delete_post_cascades() {
        let store = Store::in_memory().unwrap();
        let mut a = test_user("alice");
        let mut b = test_user("bob");
        store.create_user(&mut a).unwrap();
        store.create_user(&mut b).unwrap();
        let post = test_post(&store, &a.id);

        store.like_post(&post.id, &b.id).unwrap();
        store.toggle_bookmark(&b.id, &post.id).unwrap();
        let mut comment = Comment {
            id: String::new(),
            post_id: post.id.clone(),
            author_id: b.id.clone(),
            text: "nice".to_string(),
            created_at: Utc::now(),
        };
        store.create_comment(&mut comment).unwrap();

        store.delete_post(&post.id).unwrap();

        assert!(matches!(
            store.get_post(&post.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(store.comments_for_post(&post.id).unwrap().is_empty());
        assert!(store.likes_of_post(&post.id).unwrap().is_empty());
        assert!(store.bookmarks_of(&b.id).unwrap().is_empty());
    }
}
