use anyhow::anyhow;
use eframe::egui;
use egui::{Color32, CornerRadius, RichText, ScrollArea, Stroke, Ui, ViewportBuilder};
use std::sync::Arc;
use tracing::info;

mod blog_client;
mod config;
mod error;
mod models;
mod mutation;
mod posts_view;
mod query;
mod query_cache;
mod telemetry;
#[cfg(test)]
mod testing;

use crate::blog_client::{BlogApi, BlogClient};
use crate::config::Settings;
use crate::models::{Comment, Post};
use crate::posts_view::{Banner, BannerKind, BlogCache, PostsView};
use crate::query::QueryResult;
use crate::query_cache::{QueryCache, RepaintNotifier};

const DARK_MODE_KEY: &str = "is_dark_mode";

fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    telemetry::init(&settings.log_level)?;
    info!(base_url = %settings.base_url, "starting blog reader");

    let api: Arc<dyn BlogApi> =
        Arc::new(BlogClient::new(&settings.base_url, settings.request_timeout)?);

    let options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([960.0, 760.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("Blog 'em Ipsum"),
        ..Default::default()
    };

    eframe::run_native(
        "Blog 'em Ipsum",
        options,
        Box::new(move |cc| {
            let ctx = cc.egui_ctx.clone();
            let notifier: RepaintNotifier = Arc::new(move || ctx.request_repaint());
            let mut app = BlogReaderApp::new(api, &settings, notifier);

            if let Some(storage) = cc.storage {
                if let Some(theme_str) = storage.get_string(DARK_MODE_KEY) {
                    if let Ok(is_dark_mode) = theme_str.parse::<bool>() {
                        app.set_dark_mode(is_dark_mode);
                    }
                }
            }

            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow!("reader window failed: {e}"))
}

struct AppTheme {
    background: Color32,
    card_background: Color32,
    text: Color32,
    secondary_text: Color32,
    highlight: Color32,
    accent: Color32,
    separator: Color32,
    error: Color32,
    success: Color32,
    button_background: Color32,
    button_foreground: Color32,
    button_active_background: Color32,
    button_hover_background: Color32,
}

impl AppTheme {
    fn dark() -> Self {
        Self {
            background: Color32::from_rgb(18, 18, 18),
            card_background: Color32::from_rgb(30, 30, 30),
            text: Color32::from_rgb(240, 240, 240),
            secondary_text: Color32::from_rgb(180, 180, 180),
            highlight: Color32::from_rgb(100, 181, 246),
            accent: Color32::from_rgb(144, 202, 249),
            separator: Color32::from_rgb(60, 60, 60),
            error: Color32::from_rgb(239, 83, 80),
            success: Color32::from_rgb(76, 175, 80),
            button_background: Color32::from_rgb(66, 66, 66),
            button_foreground: Color32::from_rgb(240, 240, 240),
            button_active_background: Color32::from_rgb(30, 136, 229),
            button_hover_background: Color32::from_rgb(80, 80, 80),
        }
    }

    fn light() -> Self {
        Self {
            background: Color32::from_rgb(245, 245, 245),
            card_background: Color32::from_rgb(255, 255, 255),
            text: Color32::from_rgb(20, 20, 20),
            secondary_text: Color32::from_rgb(90, 90, 90),
            highlight: Color32::from_rgb(21, 101, 192),
            accent: Color32::from_rgb(0, 0, 255),
            separator: Color32::from_rgb(200, 200, 200),
            error: Color32::from_rgb(198, 40, 40),
            success: Color32::from_rgb(30, 110, 40),
            button_background: Color32::from_rgb(235, 235, 235),
            button_foreground: Color32::from_rgb(20, 20, 20),
            button_active_background: Color32::from_rgb(21, 101, 192),
            button_hover_background: Color32::from_rgb(210, 210, 210),
        }
    }

    fn apply_to_ctx(&self, ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();

        // Surfaces
        style.visuals.panel_fill = self.background;
        style.visuals.window_fill = self.card_background;
        style.visuals.window_stroke = Stroke::new(1.0, self.separator);
        style.visuals.widgets.noninteractive.bg_fill = self.card_background;
        style.visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, self.text);

        // Links and status text
        style.visuals.hyperlink_color = self.accent;
        style.visuals.error_fg_color = self.error;
        style.visuals.warn_fg_color = self.secondary_text;

        // Buttons
        style.visuals.widgets.inactive.bg_fill = self.button_background;
        style.visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, self.button_foreground);
        style.visuals.widgets.active.bg_fill = self.button_active_background;
        style.visuals.widgets.active.fg_stroke = Stroke::new(1.0, self.button_foreground);
        style.visuals.widgets.hovered.bg_fill = self.button_hover_background;
        style.visuals.widgets.hovered.fg_stroke = Stroke::new(1.0, self.button_foreground);

        // Selected post in the list
        style.visuals.selection.bg_fill = self.highlight;
        style.visuals.selection.stroke = Stroke::new(1.0, self.highlight);

        // Rounding
        style.visuals.window_corner_radius = CornerRadius::same(8);
        style.visuals.widgets.noninteractive.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.inactive.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.hovered.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.active.corner_radius = CornerRadius::same(4);

        ctx.set_style(style);
    }

    fn banner_color(&self, kind: BannerKind) -> Color32 {
        match kind {
            BannerKind::Progress => self.secondary_text,
            BannerKind::Failure => self.error,
            BannerKind::Done => self.success,
        }
    }
}

struct BlogReaderApp {
    cache: BlogCache,
    view: PostsView,
    theme: AppTheme,
    is_dark_mode: bool,
    needs_repaint: bool,
}

impl BlogReaderApp {
    fn new(api: Arc<dyn BlogApi>, settings: &Settings, notifier: RepaintNotifier) -> Self {
        let mut cache = QueryCache::new(settings.gc_time, settings.retry);
        cache.set_notifier(notifier.clone());

        let mut view = PostsView::new(api, settings);
        view.set_notifier(notifier);

        Self {
            cache,
            view,
            theme: AppTheme::dark(),
            is_dark_mode: true,
            needs_repaint: false,
        }
    }

    fn set_dark_mode(&mut self, is_dark_mode: bool) {
        self.is_dark_mode = is_dark_mode;
        self.theme = if is_dark_mode {
            AppTheme::dark()
        } else {
            AppTheme::light()
        };
        self.needs_repaint = true;
    }

    fn process_keyboard_shortcuts(&mut self, ctx: &egui::Context) {
        let (left, right, escape, refresh) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::ArrowLeft),
                i.key_pressed(egui::Key::ArrowRight),
                i.key_pressed(egui::Key::Escape),
                i.key_pressed(egui::Key::F5),
            )
        });

        if left && self.view.can_go_previous() {
            self.view.previous_page();
            self.needs_repaint = true;
        }
        if right && self.view.can_go_next() {
            self.view.next_page();
            self.needs_repaint = true;
        }
        if escape {
            self.view.clear_selection();
            self.needs_repaint = true;
        }
        if refresh {
            self.view.refresh(&mut self.cache);
        }
    }

    fn round_button(&self, ui: &mut Ui, icon: &str) -> egui::Response {
        let response = ui.add(
            egui::Button::new(
                RichText::new(icon)
                    .color(self.theme.button_foreground)
                    .size(20.0),
            )
            .min_size(egui::Vec2::new(32.0, 32.0))
            .corner_radius(CornerRadius::same(16))
            .fill(self.theme.button_background),
        );
        if response.hovered() {
            ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
        }
        response
    }

    fn render_header(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.heading(
                RichText::new("Blog 'em Ipsum")
                    .color(self.theme.highlight)
                    .size(24.0),
            );

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let theme_icon = if self.is_dark_mode { "☀" } else { "☾" };
                let theme_btn = self.round_button(ui, theme_icon).on_hover_text(if self.is_dark_mode {
                    "Switch to Light Mode"
                } else {
                    "Switch to Dark Mode"
                });
                if theme_btn.clicked() {
                    self.set_dark_mode(!self.is_dark_mode);
                }

                ui.add_space(8.0);

                let refresh_btn = self.round_button(ui, "↻").on_hover_text("Refresh (F5)");
                if refresh_btn.clicked() {
                    self.view.refresh(&mut self.cache);
                }
            });
        });
        ui.add_space(8.0);
    }

    fn render_posts(&mut self, ui: &mut Ui) {
        let result = self.view.posts(&mut self.cache);

        if result.is_loading {
            ui.label(RichText::new("Loading...").color(self.theme.secondary_text));
            self.view.hide_detail();
            return;
        }
        if let Some(err) = result.error.as_ref().filter(|_| result.is_error) {
            ui.label(RichText::new(err.user_message()).color(self.theme.error));
            self.view.hide_detail();
            return;
        }

        let posts = result.data.clone().unwrap_or_default();
        let selected_id = self.view.selected_post().map(|post| post.id);
        let mut clicked: Option<Post> = None;

        for post in &posts {
            let is_selected = selected_id == Some(post.id);
            let title = RichText::new(&post.title)
                .color(if is_selected { self.theme.highlight } else { self.theme.text })
                .size(16.0);
            let response = ui.selectable_label(is_selected, title);
            if response.hovered() {
                ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
            }
            if response.clicked() {
                clicked = Some(post.clone());
            }
        }

        if let Some(post) = clicked {
            self.view.select_post(post);
            self.needs_repaint = true;
        }

        ui.add_space(8.0);
        self.render_pagination_controls(ui, &result);
        ui.separator();
        self.render_post_detail(ui);
    }

    fn render_pagination_controls(&mut self, ui: &mut Ui, result: &QueryResult<Vec<Post>>) {
        ui.horizontal(|ui| {
            let prev_enabled = self.view.can_go_previous();
            let prev_btn = ui.add_enabled(
                prev_enabled,
                egui::Button::new(RichText::new("Previous page").color(if prev_enabled {
                    self.theme.button_foreground
                } else {
                    self.theme.secondary_text
                }))
                .corner_radius(CornerRadius::same(4))
                .fill(self.theme.button_background),
            );
            if prev_btn.clicked() {
                self.view.previous_page();
                self.needs_repaint = true;
            }

            ui.label(
                RichText::new(format!("Page {}", self.view.current_page()))
                    .color(self.theme.text)
                    .size(14.0),
            );

            let next_enabled = self.view.can_go_next();
            let next_btn = ui.add_enabled(
                next_enabled,
                egui::Button::new(RichText::new("Next page").color(if next_enabled {
                    self.theme.button_foreground
                } else {
                    self.theme.secondary_text
                }))
                .corner_radius(CornerRadius::same(4))
                .fill(self.theme.button_background),
            );
            if next_btn.clicked() {
                self.view.next_page();
                self.needs_repaint = true;
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(freshness_label(result).color(self.theme.secondary_text).size(12.0));
            });
        });
    }

    fn render_banner(&self, ui: &mut Ui, banner: Option<Banner>) {
        if let Some(banner) = banner {
            ui.label(RichText::new(banner.text).color(self.theme.banner_color(banner.kind)));
        }
    }

    fn render_post_detail(&mut self, ui: &mut Ui) {
        let Some(post) = self.view.selected_post().cloned() else {
            return;
        };

        egui::Frame::new()
            .fill(self.theme.card_background)
            .stroke(Stroke::new(1.0, self.theme.separator))
            .corner_radius(CornerRadius::same(6))
            .inner_margin(egui::Margin::same(12))
            .show(ui, |ui| {
                ui.label(
                    RichText::new(&post.title)
                        .color(self.theme.accent)
                        .size(20.0)
                        .strong(),
                );

                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        self.view.delete_selected();
                    }
                    if ui.button("Update title").clicked() {
                        self.view.update_selected();
                    }
                });
                self.render_banner(ui, self.view.delete_banner());
                self.render_banner(ui, self.view.update_banner());

                ui.add_space(6.0);
                ui.label(RichText::new(&post.body).color(self.theme.text));
                ui.add_space(6.0);
                ui.label(RichText::new("Comments").color(self.theme.text).size(16.0).strong());

                if let Some(result) = self.view.comments(&mut self.cache) {
                    self.render_comments(ui, &result);
                }
            });
    }

    fn render_comments(&self, ui: &mut Ui, result: &QueryResult<Vec<Comment>>) {
        if result.is_loading {
            ui.label(RichText::new("Loading...").color(self.theme.secondary_text));
            return;
        }
        if let Some(err) = result.error.as_ref().filter(|_| result.is_error) {
            ui.label(RichText::new(err.user_message()).color(self.theme.error));
            return;
        }

        for comment in result.data.as_deref().unwrap_or_default() {
            ui.horizontal_wrapped(|ui| {
                ui.label(RichText::new(format!("{}:", comment.email)).color(self.theme.highlight));
                ui.label(RichText::new(&comment.body).color(self.theme.text));
            });
        }
        ui.label(freshness_label(result).color(self.theme.secondary_text).size(12.0));
    }
}

fn freshness_label<V>(result: &QueryResult<V>) -> RichText {
    let updated = result
        .fetched_at
        .map(|at| format!("Updated {}", at.format("%H:%M:%S")))
        .unwrap_or_default();
    if result.is_fetching {
        RichText::new(format!("{updated} (refreshing…)"))
    } else {
        RichText::new(updated)
    }
}

impl eframe::App for BlogReaderApp {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        storage.set_string(DARK_MODE_KEY, self.is_dark_mode.to_string());
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.theme.apply_to_ctx(ctx);

        // Results first, so this frame renders what has landed.
        if self.cache.poll() > 0 {
            self.needs_repaint = true;
        }
        if self.view.sync(&mut self.cache) {
            self.needs_repaint = true;
        }

        self.process_keyboard_shortcuts(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_header(ui);
            ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    self.render_posts(ui);
                });
        });

        self.cache.collect_garbage();

        if self.needs_repaint {
            ctx.request_repaint();
            self.needs_repaint = false;
        }
    }
}
