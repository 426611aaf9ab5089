use serde::{Deserialize, Serialize};

/// Highest page the posts list can show.
pub const MAX_POST_PAGE: u32 = 10;

/// Posts requested per page.
pub const POSTS_PER_PAGE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u32,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: u32,
    pub email: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identifies one entry of the query cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// One page of the posts list.
    Posts(u32),
    /// Comments belonging to a post.
    Comments(u32),
}

/// Payload stored under a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    Posts(Vec<Post>),
    Comments(Vec<Comment>),
}

impl QueryData {
    pub fn posts(&self) -> Option<&[Post]> {
        match self {
            Self::Posts(posts) => Some(posts),
            Self::Comments(_) => None,
        }
    }

    pub fn comments(&self) -> Option<&[Comment]> {
        match self {
            Self::Comments(comments) => Some(comments),
            Self::Posts(_) => None,
        }
    }
}
