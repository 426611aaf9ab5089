//! View state of the posts screen: which page is shown, which post is
//! selected, and the query/mutation bindings hanging off those two.

use std::sync::Arc;
use tracing::{debug, info};

use crate::blog_client::BlogApi;
use crate::config::{SelectionPolicy, Settings};
use crate::models::{Comment, Post, QueryData, QueryKey, MAX_POST_PAGE};
use crate::mutation::Mutation;
use crate::query::{Query, QueryResult};
use crate::query_cache::{QueryCache, RepaintNotifier};

pub type BlogCache = QueryCache<QueryKey, QueryData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Progress,
    Failure,
    Done,
}

/// Inline status line shown under the post actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub text: String,
}

impl Banner {
    fn new(kind: BannerKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

pub struct PostsView {
    api: Arc<dyn BlogApi>,
    current_page: u32,
    selected_post: Option<Post>,
    selection_policy: SelectionPolicy,
    posts_query: Query<QueryKey>,
    comments_query: Query<QueryKey>,
    // Page whose next page has already been prefetched.
    prefetched_for: Option<u32>,
    pub delete_mutation: Mutation<u32, ()>,
    pub update_mutation: Mutation<u32, Post>,
}

fn posts_fetch(api: &Arc<dyn BlogApi>, page: u32) -> impl Fn() -> crate::error::Result<QueryData> + Send + 'static {
    let api = api.clone();
    move || api.fetch_posts(page).map(QueryData::Posts)
}

fn comments_fetch(api: &Arc<dyn BlogApi>, post_id: u32) -> impl Fn() -> crate::error::Result<QueryData> + Send + 'static {
    let api = api.clone();
    move || api.fetch_comments(post_id).map(QueryData::Comments)
}

impl PostsView {
    pub fn new(api: Arc<dyn BlogApi>, settings: &Settings) -> Self {
        let delete_api = api.clone();
        let update_api = api.clone();
        Self {
            current_page: 1,
            selected_post: None,
            selection_policy: settings.selection_policy,
            posts_query: Query::new(settings.posts_stale_time),
            comments_query: Query::new(settings.comments_stale_time),
            prefetched_for: None,
            delete_mutation: Mutation::new("delete_post", move |id: u32| delete_api.delete_post(id)),
            update_mutation: Mutation::new("update_post", move |id: u32| update_api.update_post(id)),
            api,
        }
    }

    pub fn set_notifier(&mut self, notifier: RepaintNotifier) {
        self.delete_mutation.set_notifier(notifier.clone());
        self.update_mutation.set_notifier(notifier);
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn can_go_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn can_go_next(&self) -> bool {
        self.current_page < MAX_POST_PAGE
    }

    pub fn previous_page(&mut self) {
        self.go_to_page(self.current_page.saturating_sub(1));
    }

    pub fn next_page(&mut self) {
        self.go_to_page(self.current_page.saturating_add(1));
    }

    /// Moves to `page`, clamped to the valid range.
    pub fn go_to_page(&mut self, page: u32) {
        let page = page.clamp(1, MAX_POST_PAGE);
        if page == self.current_page {
            return;
        }
        debug!(from = self.current_page, to = page, "page changed");
        self.current_page = page;
        if self.selection_policy == SelectionPolicy::ClearOnPageChange {
            self.clear_selection();
        }
    }

    pub fn selected_post(&self) -> Option<&Post> {
        self.selected_post.as_ref()
    }

    /// Selecting a post always resets both mutations, so banners from the
    /// previous selection never show on the new one.
    pub fn select_post(&mut self, post: Post) {
        info!(post_id = post.id, "post selected");
        self.delete_mutation.reset();
        self.update_mutation.reset();
        self.selected_post = Some(post);
    }

    pub fn clear_selection(&mut self) {
        if self.selected_post.take().is_some() {
            self.delete_mutation.reset();
            self.update_mutation.reset();
            self.comments_query.unsubscribe();
        }
    }

    /// Per-frame bookkeeping: drains finished mutations and prefetches the
    /// next page once per page transition. Returns whether anything changed.
    pub fn sync(&mut self, cache: &mut BlogCache) -> bool {
        let mut changed = self.delete_mutation.poll();
        changed |= self.update_mutation.poll();

        if self.prefetched_for != Some(self.current_page) {
            self.prefetched_for = Some(self.current_page);
            if self.current_page < MAX_POST_PAGE {
                let next_page = self.current_page + 1;
                cache.prefetch(
                    QueryKey::Posts(next_page),
                    self.posts_query.stale_time(),
                    posts_fetch(&self.api, next_page),
                );
            }
        }
        changed
    }

    pub fn posts(&mut self, cache: &mut BlogCache) -> QueryResult<Vec<Post>> {
        let page = self.current_page;
        self.posts_query
            .observe(cache, QueryKey::Posts(page), posts_fetch(&self.api, page))
            .map(|data| data.posts().map(<[Post]>::to_vec).unwrap_or_default())
    }

    /// Comments of the selected post, or `None` when nothing is selected.
    pub fn comments(&mut self, cache: &mut BlogCache) -> Option<QueryResult<Vec<Comment>>> {
        let post_id = self.selected_post.as_ref()?.id;
        let result = self.comments_query.observe(
            cache,
            QueryKey::Comments(post_id),
            comments_fetch(&self.api, post_id),
        );
        Some(result.map(|data| data.comments().map(<[Comment]>::to_vec).unwrap_or_default()))
    }

    /// Called on frames where the post list, and with it the detail, is not
    /// shown. The comments subscription lapses so showing the detail again
    /// refetches stale comments.
    pub fn hide_detail(&mut self) {
        self.comments_query.unsubscribe();
    }

    /// Refetches the current page and, if a post is selected, its comments.
    pub fn refresh(&mut self, cache: &mut BlogCache) {
        info!(page = self.current_page, "refreshing");
        self.posts_query
            .refetch(cache, posts_fetch(&self.api, self.current_page));
        if let Some(post_id) = self.selected_post.as_ref().map(|post| post.id) {
            self.comments_query
                .refetch(cache, comments_fetch(&self.api, post_id));
        }
    }

    pub fn delete_selected(&mut self) {
        if let Some(post_id) = self.selected_post.as_ref().map(|post| post.id) {
            self.delete_mutation.trigger(post_id);
        }
    }

    pub fn update_selected(&mut self) {
        if let Some(post_id) = self.selected_post.as_ref().map(|post| post.id) {
            self.update_mutation.trigger(post_id);
        }
    }

    pub fn delete_banner(&self) -> Option<Banner> {
        let mutation = &self.delete_mutation;
        if mutation.is_pending() {
            Some(Banner::new(BannerKind::Progress, "Deleting the post"))
        } else if let Some(err) = mutation.error() {
            Some(Banner::new(BannerKind::Failure, format!("Error deleting the post: {err}")))
        } else if mutation.is_success() {
            // The backend is a mock, so nothing is actually removed.
            Some(Banner::new(BannerKind::Done, "Post has (not) been deleted"))
        } else {
            None
        }
    }

    pub fn update_banner(&self) -> Option<Banner> {
        let mutation = &self.update_mutation;
        if mutation.is_pending() {
            Some(Banner::new(BannerKind::Progress, "Updating the post"))
        } else if let Some(err) = mutation.error() {
            Some(Banner::new(BannerKind::Failure, format!("Error updating the post: {err}")))
        } else if mutation.is_success() {
            Some(Banner::new(BannerKind::Done, "Post has (not) been updated"))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::testing::{post, settle, wait_until, FakeApi};
    use std::time::Duration;

    fn settings() -> Settings {
        Settings {
            retry: RetryPolicy::NONE,
            posts_stale_time: Duration::from_secs(60),
            comments_stale_time: Duration::from_secs(60),
            ..Settings::default()
        }
    }

    fn setup(api: FakeApi, settings: &Settings) -> (Arc<FakeApi>, PostsView, BlogCache) {
        let api = Arc::new(api);
        let view = PostsView::new(api.clone(), settings);
        let cache = QueryCache::new(settings.gc_time, settings.retry);
        (api, view, cache)
    }

    fn frame(view: &mut PostsView, cache: &mut BlogCache) -> QueryResult<Vec<Post>> {
        cache.poll();
        view.sync(cache);
        view.posts(cache)
    }

    #[test]
    fn page_buttons_disable_at_boundaries() {
        let (_, mut view, _) = setup(FakeApi::default(), &settings());
        assert!(!view.can_go_previous());
        assert!(view.can_go_next());

        for _ in 0..20 {
            view.next_page();
        }
        assert_eq!(view.current_page(), MAX_POST_PAGE);
        assert!(view.can_go_previous());
        assert!(!view.can_go_next());

        view.go_to_page(0);
        assert_eq!(view.current_page(), 1);
        view.previous_page();
        assert_eq!(view.current_page(), 1);

        for page in 2..MAX_POST_PAGE {
            view.go_to_page(page);
            assert!(view.can_go_previous() && view.can_go_next());
        }
    }

    #[test]
    fn lists_posts_and_loads_comments_for_selection() {
        let (api, mut view, mut cache) = setup(
            FakeApi::with_page(1, vec![post(1, "A")]),
            &settings(),
        );

        assert!(frame(&mut view, &mut cache).is_loading);
        settle(&mut cache);
        let posts = frame(&mut view, &mut cache);
        let titles: Vec<_> = posts.data.unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["A".to_string()]);

        assert!(view.comments(&mut cache).is_none());
        view.select_post(post(1, "A"));
        assert!(view.comments(&mut cache).unwrap().is_loading);
        settle(&mut cache);

        let comments = view.comments(&mut cache).unwrap();
        assert_eq!(comments.data.unwrap()[0].email, "reader1@example.com");
        assert_eq!(api.comments_calls(1), 1);
    }

    #[test]
    fn prefetches_next_page_once_per_transition() {
        let (api, mut view, mut cache) = setup(FakeApi::default(), &settings());

        for _ in 0..5 {
            frame(&mut view, &mut cache);
        }
        settle(&mut cache);
        assert_eq!(api.posts_calls(2), 1);

        // Page 2 was prefetched, so moving there is served from the cache.
        view.next_page();
        let result = frame(&mut view, &mut cache);
        assert!(!result.is_loading);
        settle(&mut cache);
        for _ in 0..5 {
            frame(&mut view, &mut cache);
        }
        assert_eq!(api.posts_calls(2), 1);
        assert_eq!(api.posts_calls(3), 1);
    }

    #[test]
    fn prefetch_reruns_on_each_transition_when_stale() {
        let settings = Settings {
            posts_stale_time: Duration::ZERO,
            ..settings()
        };
        let (api, mut view, mut cache) = setup(FakeApi::default(), &settings);

        frame(&mut view, &mut cache);
        settle(&mut cache);
        view.next_page();
        frame(&mut view, &mut cache);
        settle(&mut cache);
        view.previous_page();
        for _ in 0..3 {
            frame(&mut view, &mut cache);
        }
        settle(&mut cache);

        // Two transitions into page 1, one prefetch of page 2 each, plus the
        // subscription fetch when page 2 was shown.
        assert_eq!(api.posts_calls(2), 3);
    }

    #[test]
    fn never_prefetches_past_last_page() {
        let (api, mut view, mut cache) = setup(FakeApi::default(), &settings());
        view.go_to_page(MAX_POST_PAGE);
        for _ in 0..3 {
            frame(&mut view, &mut cache);
        }
        settle(&mut cache);
        assert_eq!(api.posts_calls(MAX_POST_PAGE), 1);
        assert_eq!(api.posts_calls(MAX_POST_PAGE + 1), 0);
    }

    #[test]
    fn selecting_another_post_resets_mutations() {
        let api = FakeApi::default();
        *api.fail_deletes.lock().unwrap() = true;
        let (_, mut view, mut cache) = setup(api, &settings());

        view.select_post(post(1, "A"));
        view.delete_selected();
        view.update_selected();
        wait_until(|| {
            view.sync(&mut cache);
            !view.delete_mutation.is_pending() && !view.update_mutation.is_pending()
        });
        assert!(view.delete_mutation.is_error());
        assert!(view.update_mutation.is_success());
        assert_eq!(view.delete_banner().unwrap().kind, BannerKind::Failure);
        assert!(view
            .delete_banner()
            .unwrap()
            .text
            .starts_with("Error deleting the post: request to /posts/1 failed with status 500"));
        assert_eq!(
            view.update_banner(),
            Some(Banner::new(BannerKind::Done, "Post has (not) been updated"))
        );

        view.select_post(post(2, "B"));
        assert!(view.delete_mutation.is_idle());
        assert!(view.update_mutation.is_idle());
        assert_eq!(view.delete_banner(), None);
        assert_eq!(view.update_banner(), None);
    }

    #[test]
    fn delete_goes_pending_then_settles() {
        let api = FakeApi::default();
        let release = api.gate_deletes();
        let (api, mut view, mut cache) = setup(api, &settings());

        view.select_post(post(1, "A"));
        view.delete_selected();
        assert!(view.delete_mutation.is_pending());
        assert_eq!(
            view.delete_banner(),
            Some(Banner::new(BannerKind::Progress, "Deleting the post"))
        );
        assert!(!view.delete_mutation.is_success() && !view.delete_mutation.is_error());

        release.send(()).unwrap();
        wait_until(|| {
            view.sync(&mut cache);
            !view.delete_mutation.is_pending()
        });
        assert!(view.delete_mutation.is_success());
        assert!(!view.delete_mutation.is_error());
        assert_eq!(api.delete_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn second_delete_is_not_held_up_by_a_blocked_one() {
        let api = FakeApi::default();
        let release = api.gate_deletes();
        let (api, mut view, mut cache) = setup(api, &settings());

        view.select_post(post(1, "A"));
        view.delete_selected();
        wait_until(|| api.delete_calls.load(std::sync::atomic::Ordering::SeqCst) == 1);

        // The first call is still parked on the gate.
        view.delete_selected();
        wait_until(|| {
            view.sync(&mut cache);
            !view.delete_mutation.is_pending()
        });
        assert!(view.delete_mutation.is_success());

        release.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        view.sync(&mut cache);
        assert!(view.delete_mutation.is_success());
        assert_eq!(api.delete_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn comments_refetch_when_detail_reappears_after_loading_page() {
        let settings = Settings {
            comments_stale_time: Duration::from_millis(30),
            ..settings()
        };
        let (api, mut view, mut cache) = setup(FakeApi::with_page(1, vec![post(1, "A")]), &settings);

        frame(&mut view, &mut cache);
        settle(&mut cache);
        view.select_post(post(1, "A"));
        view.comments(&mut cache);
        settle(&mut cache);
        assert_eq!(api.comments_calls(1), 1);

        // Page 3 was never prefetched, so the list shows "Loading..." and
        // the detail is not rendered.
        view.go_to_page(3);
        assert!(frame(&mut view, &mut cache).is_loading);
        view.hide_detail();
        settle(&mut cache);
        std::thread::sleep(Duration::from_millis(50));

        view.go_to_page(1);
        assert!(!frame(&mut view, &mut cache).is_loading);
        let comments = view.comments(&mut cache).unwrap();
        assert!(comments.is_fetching);
        settle(&mut cache);
        assert_eq!(api.comments_calls(1), 2);

        // Staying on screen does not refetch again.
        view.comments(&mut cache);
        view.comments(&mut cache);
        assert_eq!(api.comments_calls(1), 2);
    }

    #[test]
    fn selection_survives_paging_by_default() {
        let (_, mut view, _) = setup(FakeApi::default(), &settings());
        view.select_post(post(1, "A"));
        view.next_page();
        assert_eq!(view.selected_post().map(|p| p.id), Some(1));
    }

    #[test]
    fn clear_on_page_change_policy_drops_selection() {
        let settings = Settings {
            selection_policy: SelectionPolicy::ClearOnPageChange,
            ..settings()
        };
        let (_, mut view, _) = setup(FakeApi::default(), &settings);
        view.select_post(post(1, "A"));
        view.update_selected();
        view.next_page();
        assert!(view.selected_post().is_none());
        assert!(view.update_mutation.is_idle());
    }

    #[test]
    fn refresh_refetches_current_page() {
        let (api, mut view, mut cache) = setup(FakeApi::default(), &settings());
        frame(&mut view, &mut cache);
        settle(&mut cache);
        view.refresh(&mut cache);
        settle(&mut cache);
        assert_eq!(api.posts_calls(1), 2);
    }
}
