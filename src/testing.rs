//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::blog_client::{BlogApi, UPDATED_TITLE};
use crate::error::{BlogError, Result};
use crate::models::{Comment, Post};
use crate::query_cache::QueryCache;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `cache` until no fetch is in flight.
pub fn settle<K, V>(cache: &mut QueryCache<K, V>)
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        cache.poll();
        if !cache.has_pending() {
            return;
        }
        assert!(Instant::now() < deadline, "cache did not settle in time");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Polls until `done` holds, panicking after a timeout.
pub fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn post(id: u32, title: &str) -> Post {
    Post {
        id,
        title: title.to_string(),
        body: "..".to_string(),
        user_id: None,
    }
}

/// In-memory backend that counts every call.
#[derive(Default)]
pub struct FakeApi {
    pub posts: Mutex<HashMap<u32, Vec<Post>>>,
    pub posts_calls: Mutex<HashMap<u32, usize>>,
    pub comments_calls: Mutex<HashMap<u32, usize>>,
    pub delete_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub fail_deletes: Mutex<bool>,
    delete_gate: Mutex<Option<Receiver<()>>>,
}

impl FakeApi {
    pub fn with_page(page: u32, posts: Vec<Post>) -> Self {
        let api = Self::default();
        api.posts.lock().unwrap().insert(page, posts);
        api
    }

    pub fn posts_calls(&self, page: u32) -> usize {
        self.posts_calls.lock().unwrap().get(&page).copied().unwrap_or(0)
    }

    pub fn comments_calls(&self, post_id: u32) -> usize {
        self.comments_calls
            .lock()
            .unwrap()
            .get(&post_id)
            .copied()
            .unwrap_or(0)
    }

    /// Makes the next delete block until the returned sender fires.
    pub fn gate_deletes(&self) -> Sender<()> {
        let (tx, rx) = channel();
        *self.delete_gate.lock().unwrap() = Some(rx);
        tx
    }
}

impl BlogApi for FakeApi {
    fn fetch_posts(&self, page: u32) -> Result<Vec<Post>> {
        *self.posts_calls.lock().unwrap().entry(page).or_default() += 1;
        Ok(self
            .posts
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_comments(&self, post_id: u32) -> Result<Vec<Comment>> {
        *self.comments_calls.lock().unwrap().entry(post_id).or_default() += 1;
        Ok(vec![Comment {
            id: post_id * 100,
            email: format!("reader{post_id}@example.com"),
            body: "nice post".to_string(),
            post_id: Some(post_id),
            name: None,
        }])
    }

    fn delete_post(&self, post_id: u32) -> Result<()> {
        // Taken out first so other calls never wait on the lock.
        let gate = self.delete_gate.lock().unwrap().take();
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = gate {
            gate.recv().ok();
        }
        if *self.fail_deletes.lock().unwrap() {
            return Err(BlogError::Status {
                status: 500,
                url: format!("/posts/{post_id}"),
            });
        }
        Ok(())
    }

    fn update_post(&self, post_id: u32) -> Result<Post> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Ok(post(post_id, UPDATED_TITLE))
    }
}
