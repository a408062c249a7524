use crate::gui_bridge::model::{DragPhase, DragRequest, LayoutRequest};
use crate::workflow::runner::Runner;
use image::ImageFormat;
use log::{info, warn};
use serde_json::json;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

fn command_reply(result: anyhow::Result<String>) -> WithStatus<Json> {
    match result {
        Ok(message) => warp::reply::with_status(
            warp::reply::json(&json!({"status": "ok", "message": message})),
            StatusCode::OK,
        ),
        Err(err) => {
            warn!("command failed: {:#}", err);
            warp::reply::with_status(
                warp::reply::json(&json!({"status": "error", "message": format!("{:#}", err)})),
                StatusCode::BAD_REQUEST,
            )
        }
    }
}

/// Runs a runner command off the async workers; some commands join threads.
async fn blocking_command<F>(runner: Arc<Runner>, command: F) -> Result<WithStatus<Json>, Rejection>
where
    F: FnOnce(&Runner) -> anyhow::Result<String> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || command(runner.as_ref()))
        .await
        .unwrap_or_else(|err| Err(anyhow::anyhow!("command task failed: {}", err)));
    Ok(command_reply(result))
}

/// HTTP routes of the control surface.
pub fn routes(
    runner: Arc<Runner>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let runner_filter = warp::any().map(move || runner.clone());

    let status_route = warp::path("status")
        .and(warp::get())
        .and(runner_filter.clone())
        .map(|runner: Arc<Runner>| warp::reply::json(&runner.status()));

    let frame_route = warp::path("frame")
        .and(warp::get())
        .and(runner_filter.clone())
        .map(|runner: Arc<Runner>| {
            let Some(frame) = runner.sink().latest_frame() else {
                return warp::reply::with_status(Vec::new(), StatusCode::NOT_FOUND).into_response();
            };
            let mut bytes = Cursor::new(Vec::new());
            match frame.write_to(&mut bytes, ImageFormat::Png) {
                Ok(()) => warp::reply::with_header(bytes.into_inner(), "content-type", "image/png")
                    .into_response(),
                Err(err) => {
                    warn!("encoding frame failed: {}", err);
                    warp::reply::with_status(Vec::new(), StatusCode::INTERNAL_SERVER_ERROR)
                        .into_response()
                }
            }
        });

    let start_route = warp::path("start")
        .and(warp::post())
        .and(warp::body::json())
        .and(runner_filter.clone())
        .and_then(|request: LayoutRequest, runner: Arc<Runner>| {
            blocking_command(runner, move |runner| {
                runner.start_detection(&request.layout)?;
                Ok(format!("detection started for {}", request.layout))
            })
        });

    let stop_route = warp::path("stop")
        .and(warp::post())
        .and(runner_filter.clone())
        .and_then(|runner: Arc<Runner>| {
            blocking_command(runner, |runner| {
                Ok(match runner.stop_detection() {
                    Some(summary) => format!("detection stopped after {} frames", summary.frames),
                    None => "detection was not running".to_string(),
                })
            })
        });

    let reset_route = warp::path("reset")
        .and(warp::post())
        .and(warp::body::json())
        .and(runner_filter.clone())
        .and_then(|request: LayoutRequest, runner: Arc<Runner>| {
            blocking_command(runner, move |runner| {
                runner.reset_test(&request.layout)?;
                Ok(format!("test reset for {}", request.layout))
            })
        });

    let save_route = warp::path("save")
        .and(warp::post())
        .and(warp::body::json())
        .and(runner_filter.clone())
        .and_then(|request: LayoutRequest, runner: Arc<Runner>| {
            blocking_command(runner, move |runner| {
                runner.save_positions(&request.layout)?;
                Ok(format!("positions saved for {}", request.layout))
            })
        });

    let drag_route = warp::path("drag")
        .and(warp::post())
        .and(warp::body::json())
        .and(runner_filter)
        .map(|request: DragRequest, runner: Arc<Runner>| {
            let result = match request.phase {
                DragPhase::Begin => runner
                    .begin_drag_at(request.x, request.y)
                    .map(|label| format!("dragging {}", label))
                    .ok_or_else(|| anyhow::anyhow!("no sample point near the pointer")),
                DragPhase::Move => runner
                    .drag_to(request.x, request.y)
                    .map(|_| "moved".to_string()),
                DragPhase::End => {
                    runner.end_drag();
                    Ok("drag ended".to_string())
                }
            };
            command_reply(result)
        });

    status_route
        .or(frame_route)
        .or(start_route)
        .or(stop_route)
        .or(reset_route)
        .or(save_route)
        .or(drag_route)
}

/// Serves the control routes until `shutdown` resolves.
pub async fn serve<S>(runner: Arc<Runner>, address: SocketAddr, shutdown: S)
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(runner)).bind_with_graceful_shutdown(address, shutdown);
    info!("control bridge listening on {}", bound);
    server.await;
}
