use iced::{
    mouse, time,
    widget::{
        button,
        canvas::{self, Action, Canvas, Event, Frame, Geometry, Path, Stroke, Text},
        column, image, pick_list, row, scrollable, stack, text, Column, Container,
    },
    Alignment, Color, ContentFit, Element, Length, Pixels, Point, Rectangle, Renderer,
    Subscription, Task, Theme,
};
use lightcore::notify::Notification;
use lightcore::LightColor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BRIDGE: &str = "http://127.0.0.1:9000";
const VIEW_WIDTH: f32 = 640.0;
const VIEW_HEIGHT: f32 = 360.0;
const DEFAULT_FRAME: (u32, u32) = (1280, 720);
const RING_RADIUS: f32 = 10.0;

fn main() -> iced::Result {
    iced::application(Visualizer::boot, Visualizer::update, Visualizer::view)
        .title(application_title)
        .subscription(application_subscription)
        .theme(application_theme)
        .run()
}

fn application_title(_: &Visualizer) -> String {
    "Panel Light Check".into()
}

fn application_subscription(_: &Visualizer) -> Subscription<Message> {
    time::every(Duration::from_secs(1)).map(|_| Message::Tick)
}

fn application_theme(_: &Visualizer) -> Theme {
    Theme::Dark
}

#[derive(Debug)]
struct Visualizer {
    status: Option<StatusPayload>,
    frame: Option<image::Handle>,
    selected: Option<String>,
    message: String,
    history: Vec<String>,
    /// Set once the station has accepted a drag begin.
    dragging: bool,
}

#[derive(Debug, Clone)]
enum Message {
    Tick,
    StatusFetched(Result<StatusPayload, String>),
    FrameFetched(Result<Option<Vec<u8>>, String>),
    LayoutSelected(String),
    Command(Command),
    CommandDone(Result<String, String>),
    Drag(DragPhase, i32, i32),
    DragStarted(Result<String, String>),
    DragUpdated(Result<String, String>),
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Start,
    Stop,
    Reset,
    Save,
}

impl Command {
    fn path(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Reset => "reset",
            Command::Save => "save",
        }
    }
}

impl Visualizer {
    fn boot() -> (Self, Task<Message>) {
        (
            Visualizer {
                status: None,
                frame: None,
                selected: None,
                message: "Waiting for the station...".into(),
                history: Vec::new(),
                dragging: false,
            },
            Task::perform(fetch_status(), Message::StatusFetched),
        )
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => Task::batch([
                Task::perform(fetch_status(), Message::StatusFetched),
                Task::perform(fetch_frame(), Message::FrameFetched),
            ]),
            Message::StatusFetched(Ok(status)) => {
                if state.selected.is_none() {
                    state.selected = status.layout.clone();
                }
                state.message = match (&status.layout, status.complete) {
                    (Some(layout), true) if status.reset_pending => {
                        format!("{}: all lights passed, reset pending", layout)
                    }
                    (Some(layout), _) => format!(
                        "{}: {}/{} lights passed{}",
                        layout,
                        status.lights.iter().filter(|light| light.success).count(),
                        status.lights.len(),
                        if status.running { "" } else { " (stopped)" }
                    ),
                    (None, _) => "No layout selected".into(),
                };
                state.status = Some(status);
                Task::none()
            }
            Message::StatusFetched(Err(err)) => {
                state.message = format!("Station unreachable: {err}");
                Task::none()
            }
            Message::FrameFetched(Ok(bytes)) => {
                state.frame = bytes.map(image::Handle::from_bytes);
                Task::none()
            }
            Message::FrameFetched(Err(_)) => Task::none(),
            Message::LayoutSelected(layout) => {
                state.selected = Some(layout.clone());
                Task::perform(
                    post_json("reset", LayoutRequest { layout }),
                    Message::CommandDone,
                )
            }
            Message::Command(command) => {
                let Some(layout) = state.selected.clone() else {
                    state.message = "Select a layout first".into();
                    return Task::none();
                };
                Task::perform(
                    post_json(command.path(), LayoutRequest { layout }),
                    Message::CommandDone,
                )
            }
            Message::CommandDone(Ok(message)) => {
                state.push_history(message);
                Task::perform(fetch_status(), Message::StatusFetched)
            }
            Message::CommandDone(Err(err)) => {
                state.push_history(format!("Error: {err}"));
                Task::none()
            }
            Message::Drag(DragPhase::Begin, x, y) => Task::perform(
                post_json("drag", DragRequest { phase: DragPhase::Begin, x, y }),
                Message::DragStarted,
            ),
            Message::Drag(DragPhase::Move, x, y) => {
                if !state.dragging {
                    return Task::none();
                }
                Task::perform(
                    post_json("drag", DragRequest { phase: DragPhase::Move, x, y }),
                    Message::DragUpdated,
                )
            }
            Message::Drag(DragPhase::End, x, y) => {
                // Sent even when the begin reply is still in flight.
                state.dragging = false;
                Task::perform(
                    post_json("drag", DragRequest { phase: DragPhase::End, x, y }),
                    Message::DragUpdated,
                )
            }
            Message::DragStarted(Ok(message)) => {
                state.dragging = true;
                state.push_history(message);
                Task::none()
            }
            Message::DragStarted(Err(_)) => {
                state.dragging = false;
                Task::none()
            }
            Message::DragUpdated(Ok(_)) => Task::none(),
            Message::DragUpdated(Err(err)) => {
                state.dragging = false;
                state.push_history(format!("Drag error: {err}"));
                Task::none()
            }
        }
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let layouts = state
            .status
            .as_ref()
            .map(|status| status.layouts.clone())
            .unwrap_or_default();
        let lights = state
            .status
            .as_ref()
            .map(|status| status.lights.clone())
            .unwrap_or_default();
        let frame_size = state
            .status
            .as_ref()
            .and_then(|status| status.frame_size)
            .unwrap_or(DEFAULT_FRAME);

        let controls = row![
            pick_list(layouts, state.selected.clone(), Message::LayoutSelected)
                .placeholder("Layout"),
            button("Start").on_press(Message::Command(Command::Start)),
            button("Stop").on_press(Message::Command(Command::Stop)),
            button("Reset").on_press(Message::Command(Command::Reset)),
            button("Save positions").on_press(Message::Command(Command::Save)),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let overlay = Canvas::new(PanelMap {
            lights: lights.clone(),
            frame_size,
            has_frame: state.frame.is_some(),
            dragging: state.dragging,
        })
        .width(Length::Fixed(VIEW_WIDTH))
        .height(Length::Fixed(VIEW_HEIGHT));

        let view_port: Element<'_, Message> = match &state.frame {
            Some(handle) => stack![
                image(handle.clone())
                    .width(Length::Fixed(VIEW_WIDTH))
                    .height(Length::Fixed(VIEW_HEIGHT))
                    .content_fit(ContentFit::Fill),
                overlay,
            ]
            .into(),
            None => overlay.into(),
        };

        let light_list = if lights.is_empty() {
            Column::new().push(text("No lights").size(12))
        } else {
            lights
                .iter()
                .fold(Column::new().spacing(4), |col, light| {
                    let state_text = if light.success {
                        "Success"
                    } else if light.wrong {
                        "Failed"
                    } else {
                        "--"
                    };
                    col.push(
                        text(format!(
                            "{} ({}) @ {},{}: {}",
                            light.label, light.expected, light.x, light.y, state_text
                        ))
                        .size(14)
                        .color(status_color(light)),
                    )
                })
        };

        let events = state
            .status
            .as_ref()
            .map(|status| status.events.clone())
            .unwrap_or_default();
        let event_list = if events.is_empty() {
            Column::new().push(text("No pass/fail events yet").size(12))
        } else {
            events
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, event| {
                    col.push(text(describe_event(event)).size(12))
                })
        };

        let history_list = if state.history.is_empty() {
            Column::new().push(text("No activity yet").size(12))
        } else {
            state
                .history
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, entry| {
                    col.push(text(entry.clone()).size(12))
                })
        };

        let panel_column = column![
            text("Panel").size(26),
            controls,
            text(&state.message).size(14),
            view_port,
            text("Drag a ring to move its sample point, then save.").size(12),
        ]
        .spacing(10)
        .padding(16);

        let status_column = column![
            text("Lights").size(26),
            Container::new(light_list).padding(6),
            text("Events").size(16),
            Container::new(scrollable(event_list).height(Length::Fixed(160.0))).padding(6),
            text("Activity log").size(16),
            Container::new(scrollable(history_list).height(Length::Fixed(120.0))).padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fill);

        Container::new(
            row![panel_column, status_column]
                .spacing(20)
                .align_y(Alignment::Start)
                .padding(20),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
    }

    fn push_history(&mut self, entry: String) {
        self.history.push(entry);
        if self.history.len() > 20 {
            self.history.remove(0);
        }
    }
}

fn describe_event(event: &Notification) -> String {
    match event {
        Notification::Success {
            layout_id, message, ..
        } => format!("[{}] {}", layout_id, message),
        Notification::Failure {
            layout_id, label, ..
        } => format!("[{}] {} shows the wrong color", layout_id, label),
    }
}

fn status_color(light: &LightPayload) -> Color {
    if light.success {
        Color::from_rgb(0.2, 0.85, 0.3)
    } else if light.wrong {
        Color::from_rgb(0.95, 0.25, 0.2)
    } else {
        Color::from_rgb(0.3, 0.55, 1.0)
    }
}

fn expected_color(color: LightColor) -> Color {
    match color {
        LightColor::Red => Color::from_rgb(0.9, 0.1, 0.1),
        LightColor::Yellow => Color::from_rgb(0.95, 0.85, 0.1),
        LightColor::Green => Color::from_rgb(0.1, 0.8, 0.2),
        LightColor::Blue => Color::from_rgb(0.1, 0.3, 0.95),
        LightColor::White => Color::WHITE,
    }
}

async fn fetch_status() -> Result<StatusPayload, String> {
    let response = reqwest::get(format!("{BRIDGE}/status"))
        .await
        .map_err(|e| e.to_string())?;
    response
        .json::<StatusPayload>()
        .await
        .map_err(|e| e.to_string())
}

async fn fetch_frame() -> Result<Option<Vec<u8>>, String> {
    let response = reqwest::get(format!("{BRIDGE}/frame"))
        .await
        .map_err(|e| e.to_string())?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(Some(bytes.to_vec()))
}

async fn post_json<T: Serialize>(path: &str, body: T) -> Result<String, String> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{BRIDGE}/{path}"))
        .json(&body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = response.status();
    let reply = response
        .json::<CommandReply>()
        .await
        .unwrap_or_else(|_| CommandReply {
            message: status.to_string(),
        });
    if status.is_success() {
        Ok(reply.message)
    } else {
        Err(format!("{}: {}", status, reply.message))
    }
}

#[derive(Debug, Serialize)]
struct LayoutRequest {
    layout: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum DragPhase {
    Begin,
    Move,
    End,
}

#[derive(Debug, Serialize)]
struct DragRequest {
    phase: DragPhase,
    x: i32,
    y: i32,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    layouts: Vec<String>,
    #[serde(default)]
    layout: Option<String>,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    complete: bool,
    #[serde(default)]
    reset_pending: bool,
    #[serde(default)]
    frame_size: Option<(u32, u32)>,
    #[serde(default)]
    lights: Vec<LightPayload>,
    #[serde(default)]
    events: Vec<Notification>,
}

#[derive(Debug, Clone, Deserialize)]
struct LightPayload {
    label: String,
    x: i32,
    y: i32,
    expected: LightColor,
    #[serde(default)]
    wrong: bool,
    #[serde(default)]
    success: bool,
}

/// Sample points drawn over the live frame; dragging a ring moves it on the
/// station.
struct PanelMap {
    lights: Vec<LightPayload>,
    frame_size: (u32, u32),
    has_frame: bool,
    /// Whether the station holds an active drag for this client.
    dragging: bool,
}

impl PanelMap {
    fn scale(&self, bounds: Rectangle) -> (f32, f32) {
        (
            bounds.width / self.frame_size.0.max(1) as f32,
            bounds.height / self.frame_size.1.max(1) as f32,
        )
    }

    fn to_frame(&self, bounds: Rectangle, point: Point) -> (i32, i32) {
        let (sx, sy) = self.scale(bounds);
        ((point.x / sx).round() as i32, (point.y / sy).round() as i32)
    }
}

#[derive(Default)]
struct DragState {
    pressed: bool,
}

impl canvas::Program<Message> for PanelMap {
    type State = DragState;

    fn update(
        &self,
        state: &mut Self::State,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<Action<Message>> {
        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let position = cursor.position_in(bounds)?;
                let (x, y) = self.to_frame(bounds, position);
                state.pressed = true;
                Some(Action::publish(Message::Drag(DragPhase::Begin, x, y)).and_capture())
            }
            Event::Mouse(mouse::Event::CursorMoved { .. }) if state.pressed && self.dragging => {
                let position = cursor.position_in(bounds)?;
                let (x, y) = self.to_frame(bounds, position);
                Some(Action::publish(Message::Drag(DragPhase::Move, x, y)).and_capture())
            }
            Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) if state.pressed => {
                state.pressed = false;
                Some(Action::publish(Message::Drag(DragPhase::End, 0, 0)).and_capture())
            }
            _ => None,
        }
    }

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        if !self.has_frame {
            frame.fill_rectangle(
                Point::ORIGIN,
                bounds.size(),
                Color::from_rgb(0.03, 0.03, 0.05),
            );
        }

        let (sx, sy) = self.scale(bounds);
        for light in &self.lights {
            let center = Point::new(light.x as f32 * sx, light.y as f32 * sy);
            let ring = Path::new(|builder| builder.circle(center, (RING_RADIUS * sx).max(4.0)));
            frame.stroke(
                &ring,
                Stroke::default()
                    .with_width(2.0)
                    .with_color(status_color(light)),
            );
            let dot = Path::new(|builder| builder.circle(center, 2.5));
            frame.fill(&dot, expected_color(light.expected));
            frame.fill_text(Text {
                content: light.label.clone(),
                position: Point::new(center.x + 10.0, center.y - 18.0),
                color: Color::from_rgb(0.85, 0.85, 0.9),
                size: Pixels(12.0),
                ..Text::default()
            });
        }

        vec![frame.into_geometry()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visualizer() -> Visualizer {
        Visualizer::boot().0
    }

    #[test]
    fn missed_drag_begin_leaves_drag_inactive() {
        let mut state = visualizer();
        let _ = Visualizer::update(
            &mut state,
            Message::DragStarted(Err("400 Bad Request: no sample point near the pointer".into())),
        );
        assert!(!state.dragging);
        let _ = Visualizer::update(&mut state, Message::Drag(DragPhase::Move, 10, 10));
        let _ = Visualizer::update(&mut state, Message::Drag(DragPhase::End, 0, 0));
        assert!(!state.dragging);
        assert!(state.history.is_empty());
    }

    #[test]
    fn accepted_drag_runs_until_release() {
        let mut state = visualizer();
        let _ = Visualizer::update(&mut state, Message::DragStarted(Ok("dragging LIGHT 1".into())));
        assert!(state.dragging);
        assert_eq!(state.history, vec!["dragging LIGHT 1".to_string()]);

        let _ = Visualizer::update(&mut state, Message::DragUpdated(Ok("moved".into())));
        assert!(state.dragging);
        assert_eq!(state.history.len(), 1);

        let _ = Visualizer::update(&mut state, Message::Drag(DragPhase::End, 0, 0));
        assert!(!state.dragging);
    }
}
