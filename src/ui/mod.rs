mod render_util;

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div,
    img, px,
};
use gpui_component::{
    Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use crate::{
    config::PreviewConfig,
    error::AppError,
    overlay::{MarkerStyle, OverlayState, PreviewGeometry, VideoGravity},
    pipeline::{CaptureController, FrameOutputs, NokhwaSource, PointSlot, start_worker},
    types::{Frame, SampleBuffer},
};
use render_util::frame_to_image;

const PREVIEW_WIDTH: f32 = 960.0;
const PREVIEW_HEIGHT: f32 = 720.0;
const OVERLAY_TINT: u32 = 0xffffff20;

pub fn launch_ui(app: &mut App, config: PreviewConfig) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Hand Pose Preview".into()),
            appears_transparent: false,
            traffic_light_position: None,
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| PreviewView::new(config));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct PreviewView {
    config: PreviewConfig,
    controller: CaptureController<NokhwaSource>,
    preview_rx: Receiver<Frame>,
    samples_rx: Option<Receiver<SampleBuffer>>,
    points: PointSlot,
    errors_tx: Sender<AppError>,
    errors_rx: Receiver<AppError>,
    worker: Option<thread::JoinHandle<()>>,
    latest_image: Option<Arc<RenderImage>>,
    frame_size: (u32, u32),
    overlay: OverlayState,
    error: Option<AppError>,
}

/// Action offered by the toggle button. Follows the session itself, which a
/// failure can stop without the view going away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionToggle {
    Pause,
    Resume,
}

impl SessionToggle {
    fn for_session(running: bool) -> Self {
        if running {
            SessionToggle::Pause
        } else {
            SessionToggle::Resume
        }
    }

    fn label(self) -> &'static str {
        match self {
            SessionToggle::Pause => "Pause",
            SessionToggle::Resume => "Resume",
        }
    }
}

impl PreviewView {
    fn new(config: PreviewConfig) -> Self {
        let (preview_tx, preview_rx) = bounded(1);
        let (samples_tx, samples_rx) = bounded(1);
        let (errors_tx, errors_rx) = unbounded();
        let controller = CaptureController::new(
            NokhwaSource,
            config.preferred_camera.clone(),
            FrameOutputs {
                preview: preview_tx,
                samples: samples_tx,
                errors: errors_tx.clone(),
            },
        );

        let mut view = Self {
            config,
            controller,
            preview_rx,
            samples_rx: Some(samples_rx),
            points: PointSlot::default(),
            errors_tx,
            errors_rx,
            worker: None,
            latest_image: None,
            frame_size: (0, 0),
            overlay: OverlayState::default(),
            error: None,
        };
        view.appear();
        view
    }

    fn appear(&mut self) {
        let stopper = match self.controller.appear() {
            Ok(session) => session.stopper(),
            Err(err) => {
                log::error!("{}: {}", err.title(), err.detail());
                self.error = Some(err);
                return;
            }
        };
        self.error = None;

        if self.worker.is_some() {
            return;
        }
        let Some(samples_rx) = self.samples_rx.take() else {
            log::warn!("missing sample receiver for worker");
            return;
        };
        match start_worker(
            self.config.clone(),
            samples_rx,
            stopper,
            self.points.clone(),
            self.errors_tx.clone(),
        ) {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => log::error!("failed to spawn hand pose worker: {err}"),
        }
    }

    fn disappear(&mut self) {
        self.controller.disappear();
    }

    fn session_running(&self) -> bool {
        self.controller
            .session()
            .is_some_and(|session| session.is_running())
    }

    fn poll_errors(&mut self) {
        while let Ok(err) = self.errors_rx.try_recv() {
            log::error!("{}: {}", err.title(), err.detail());
            self.error = Some(err);
        }
    }

    fn poll_preview(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let mut latest = None;
        while let Ok(frame) = self.preview_rx.try_recv() {
            latest = Some(frame);
        }
        let Some(frame) = latest else {
            return;
        };

        self.frame_size = (frame.width, frame.height);
        if let Some(image) = frame_to_image(&frame) {
            if let Some(old_image) = self.latest_image.replace(image) {
                // Free the previous texture; the sprite atlas otherwise keeps every frame.
                cx.drop_image(old_image, Some(window));
            }
        }
    }

    fn poll_points(&mut self) {
        let Some(points) = self.points.take() else {
            return;
        };
        let geometry = PreviewGeometry {
            view_width: PREVIEW_WIDTH,
            view_height: PREVIEW_HEIGHT,
            frame_width: self.frame_size.0,
            frame_height: self.frame_size.1,
            gravity: self.config.gravity,
        };
        let style = MarkerStyle {
            radius: self.config.marker_radius,
            color: self.config.marker_color,
        };
        self.overlay.show_points(&points, &geometry, style);
    }

    fn render_preview(&self) -> AnyElement {
        let fit = match self.config.gravity {
            VideoGravity::ResizeAspectFill => ObjectFit::Cover,
            VideoGravity::ResizeAspect => ObjectFit::Contain,
            VideoGravity::Resize => ObjectFit::Fill,
        };

        let mut shell = div()
            .relative()
            .w(px(PREVIEW_WIDTH))
            .h(px(PREVIEW_HEIGHT))
            .overflow_hidden()
            .rounded_lg()
            .bg(gpui::rgb(0x000000));

        shell = match &self.latest_image {
            Some(image) => shell.child(img(image.clone()).size_full().object_fit(fit)),
            None => shell.child(
                div()
                    .size_full()
                    .flex()
                    .items_center()
                    .justify_center()
                    .text_sm()
                    .text_color(gpui::rgb(0x8b95a5))
                    .child("Waiting for camera..."),
            ),
        };

        let overlay = self.overlay.markers().iter().map(|marker| {
            let r = marker.radius;
            div()
                .absolute()
                .left(px(marker.center.x - r))
                .top(px(marker.center.y - r))
                .w(px(r * 2.0))
                .h(px(r * 2.0))
                .rounded_full()
                .bg(gpui::rgb(marker.color))
        });

        shell
            .child(
                div()
                    .absolute()
                    .top_0()
                    .left_0()
                    .size_full()
                    .bg(gpui::rgba(OVERLAY_TINT))
                    .children(overlay),
            )
            .into_any_element()
    }

    fn render_status(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let camera_label = self
            .controller
            .session()
            .map(|s| s.device().label.clone())
            .unwrap_or_else(|| "no camera".to_string());
        let status = if self.session_running() {
            format!(
                "{camera_label} {}x{}, {} keypoints",
                self.frame_size.0,
                self.frame_size.1,
                self.overlay.markers().len()
            )
        } else {
            format!("{camera_label} (stopped)")
        };

        let toggle = SessionToggle::for_session(self.session_running());
        h_flex()
            .justify_between()
            .items_center()
            .gap_2()
            .w(px(PREVIEW_WIDTH))
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xa0aab8))
                    .child(status),
            )
            .child(
                Button::new(SharedString::from("session-toggle"))
                    .primary()
                    .label(toggle.label())
                    .on_click(cx.listener(|this, _, _, cx| {
                        match SessionToggle::for_session(this.session_running()) {
                            SessionToggle::Pause => this.disappear(),
                            SessionToggle::Resume => this.appear(),
                        }
                        cx.notify();
                    })),
            )
            .into_any_element()
    }

    fn render_error(&self) -> Option<AnyElement> {
        let err = self.error.as_ref()?;
        Some(
            h_flex()
                .gap_2()
                .items_center()
                .p_3()
                .w(px(PREVIEW_WIDTH))
                .rounded_lg()
                .bg(gpui::rgba(0xef444433))
                .border_1()
                .border_color(gpui::rgba(0xef4444ff))
                .child(
                    div()
                        .text_sm()
                        .font_semibold()
                        .text_color(gpui::rgb(0xfca5a5))
                        .child(err.title()),
                )
                .child(
                    div()
                        .text_xs()
                        .text_color(gpui::rgb(0xfca5a5))
                        .child(err.detail().to_string()),
                )
                .into_any_element(),
        )
    }
}

impl Render for PreviewView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> impl IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.poll_errors();
        self.poll_preview(window, cx);
        self.poll_points();

        let mut body = v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .gap_3()
            .p_4()
            .bg(gpui::rgb(0x0f1419))
            .child(self.render_preview())
            .child(self.render_status(cx));
        if let Some(error) = self.render_error() {
            body = body.child(error);
        }
        body
    }
}

impl Drop for PreviewView {
    fn drop(&mut self) {
        self.disappear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_session_offers_resume() {
        assert_eq!(SessionToggle::for_session(true), SessionToggle::Pause);
        assert_eq!(SessionToggle::for_session(false), SessionToggle::Resume);
        assert_eq!(SessionToggle::for_session(false).label(), "Resume");
    }
}
