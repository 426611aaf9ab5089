use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{BlogError, Result};
use crate::models::{Comment, Post, POSTS_PER_PAGE};

/// Title sent by the "Update title" action.
pub const UPDATED_TITLE: &str = "REACT QUERY FOREVER!!!!";

/// The four network calls the reader makes. None of them keep local state.
pub trait BlogApi: Send + Sync {
    fn fetch_posts(&self, page: u32) -> Result<Vec<Post>>;
    fn fetch_comments(&self, post_id: u32) -> Result<Vec<Comment>>;
    fn delete_post(&self, post_id: u32) -> Result<()>;
    fn update_post(&self, post_id: u32) -> Result<Post>;
}

/// PATCH response. The mock backend echoes only the patched fields for
/// unknown ids, so everything is optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedPost {
    #[serde(default)]
    id: Option<u32>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    user_id: Option<u32>,
}

pub struct BlogClient {
    client: Client,
    base_url: String,
}

impl BlogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("blog_em_reader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // Turns a non-2xx answer into `BlogError::Status` before the body is read.
    fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BlogError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            })
        }
    }
}

impl BlogApi for BlogClient {
    fn fetch_posts(&self, page: u32) -> Result<Vec<Post>> {
        let url = self.url("/posts");
        debug!(page, "fetching posts");

        let response = self
            .client
            .get(&url)
            .query(&[("_limit", POSTS_PER_PAGE), ("_page", page)])
            .send()?;

        let posts: Vec<Post> = Self::check_status(response)?.json()?;
        debug!(page, count = posts.len(), "fetched posts");
        Ok(posts)
    }

    fn fetch_comments(&self, post_id: u32) -> Result<Vec<Comment>> {
        let url = self.url("/comments");
        debug!(post_id, "fetching comments");

        let response = self
            .client
            .get(&url)
            .query(&[("postId", post_id)])
            .send()?;

        let comments: Vec<Comment> = Self::check_status(response)?.json()?;
        debug!(post_id, count = comments.len(), "fetched comments");
        Ok(comments)
    }

    fn delete_post(&self, post_id: u32) -> Result<()> {
        let url = self.url(&format!("/posts/{post_id}"));
        debug!(post_id, "deleting post");

        let response = self.client.delete(&url).send()?;
        Self::check_status(response)?;
        Ok(())
    }

    fn update_post(&self, post_id: u32) -> Result<Post> {
        let url = self.url(&format!("/posts/{post_id}"));
        debug!(post_id, "updating post title");

        let response = self
            .client
            .patch(&url)
            .json(&json!({ "title": UPDATED_TITLE }))
            .send()?;

        let updated: UpdatedPost = Self::check_status(response)?.json()?;
        Ok(Post {
            id: updated.id.unwrap_or(post_id),
            title: updated.title.unwrap_or_else(|| UPDATED_TITLE.to_string()),
            body: updated.body,
            user_id: updated.user_id,
        })
    }
}
