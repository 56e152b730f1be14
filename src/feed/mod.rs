use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{AuthorSummary, Comment, CommentView, Post, PostView, User};
use crate::store::{Store, StoreResult};

/// Read-side composition of posts with their author identity, like set and
/// comments. Works entirely from the derived tables, so it can never
/// disagree with the write side.
pub struct FeedAggregator {
    store: Arc<Store>,
}

impl FeedAggregator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Global feed, newest post first.
    pub fn list_posts(&self) -> StoreResult<Vec<PostView>> {
        let posts = self.store.list_posts()?;
        self.compose(posts)
    }

    /// One author's posts, newest first.
    pub fn list_user_posts(&self, author_id: &str) -> StoreResult<Vec<PostView>> {
        let posts = self.store.list_posts_by_author(author_id)?;
        self.compose(posts)
    }

    /// A single post, fully composed.
    pub fn post_view(&self, post_id: &str) -> StoreResult<PostView> {
        let post = self.store.get_post(post_id)?;
        let mut views = self.compose(vec![post])?;
        Ok(views.remove(0))
    }

    pub fn comment_views(&self, post_id: &str) -> StoreResult<Vec<CommentView>> {
        let comments = self.store.comments_for_post(post_id)?;
        let mut authors = HashMap::new();
        comments
            .into_iter()
            .map(|c| self.comment_view(c, &mut authors))
            .collect()
    }

    fn compose(&self, posts: Vec<Post>) -> StoreResult<Vec<PostView>> {
        let mut authors: HashMap<String, AuthorSummary> = HashMap::new();
        posts
            .into_iter()
            .map(|post| {
                let author = self.author_summary(&post.author_id, &mut authors)?;
                let likes = self.store.likes_of_post(&post.id)?;
                let comments = self
                    .store
                    .comments_for_post(&post.id)?
                    .into_iter()
                    .map(|c| self.comment_view(c, &mut authors))
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(PostView {
                    id: post.id,
                    caption: post.caption,
                    image_url: post.image_url,
                    author,
                    likes,
                    comments,
                    created_at: post.created_at,
                })
            })
            .collect()
    }

    fn comment_view(
        &self,
        comment: Comment,
        authors: &mut HashMap<String, AuthorSummary>,
    ) -> StoreResult<CommentView> {
        let author = self.author_summary(&comment.author_id, authors)?;
        Ok(CommentView {
            id: comment.id,
            text: comment.text,
            author,
            created_at: comment.created_at,
        })
    }

    fn author_summary(
        &self,
        user_id: &str,
        cache: &mut HashMap<String, AuthorSummary>,
    ) -> StoreResult<AuthorSummary> {
        if let Some(summary) = cache.get(user_id) {
            return Ok(summary.clone());
        }
        let user = self.store.get_user(user_id)?;
        let summary = summarize(&user);
        cache.insert(user_id.to_string(), summary.clone());
        Ok(summary)
    }
}

pub fn summarize(user: &User) -> AuthorSummary {
    AuthorSummary {
        id: user.id.clone(),
        username: user.username.clone(),
        avatar_url: user.avatar_url.clone(),
    }
}
