//! HTTP surface for the warehouse dashboard: an HTML page with metric
//! tiles and a temperature chart, plus a JSON endpoint for the raw rows.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tracing::info;

use etl_core::dashboard::{Dashboard, DashboardView, SeriesPoint};

#[derive(Clone)]
struct AppState {
    dashboard: Arc<Dashboard>,
}

pub fn create_router(dashboard: Arc<Dashboard>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/api/recent", get(recent_rows))
        .route("/health", get(health))
        .with_state(AppState { dashboard })
}

pub async fn serve(dashboard: Arc<Dashboard>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard address {addr}"))?;

    info!(%addr, "Dashboard listening");

    axum::serve(listener, create_router(dashboard))
        .await
        .context("Dashboard server failed")?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn recent_rows(State(state): State<AppState>) -> Response {
    match state.dashboard.recent_rows().await {
        Ok(rows) => Json(rows.as_ref().clone()).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

/// Errors render as a visible banner on the page itself; the server keeps
/// running regardless.
async fn dashboard_page(State(state): State<AppState>) -> Html<String> {
    let body = match state.dashboard.view().await {
        Ok(view) => render_view(&view),
        Err(err) => format!(
            r#"<p class="error">Error querying the warehouse: {}</p>"#,
            escape(&err.to_string())
        ),
    };

    Html(page(&body))
}

fn page(body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
         <title>Weather Data Dashboard</title>\
         <style>\
         body{{font-family:sans-serif;margin:2rem;}}\
         .metrics{{display:flex;gap:1.5rem;}}\
         .metric{{border:1px solid #ccc;border-radius:8px;padding:1rem;min-width:10rem;}}\
         .metric .value{{font-size:1.6rem;font-weight:bold;}}\
         .error{{color:#b00020;}}\
         .warning{{color:#8a6d00;}}\
         table{{border-collapse:collapse;margin-top:1rem;}}\
         td,th{{border:1px solid #ccc;padding:0.3rem 0.6rem;}}\
         </style></head><body>\
         <h1>Live Weather Analytics Pipeline</h1>\
         <p>Data flowing from the weather API into object storage, the warehouse, and here.</p>\
         {body}\
         </body></html>"
    )
}

fn render_view(view: &DashboardView) -> String {
    match view {
        DashboardView::Empty => {
            r#"<p class="warning">No data found in the warehouse yet. Run the pipeline!</p>"#
                .to_string()
        }
        DashboardView::Data { latest, series, rows } => {
            let mut html = String::new();

            html.push_str(&format!(
                r#"<div class="metrics">
                   <div class="metric"><div>Latest City</div><div class="value">{}</div></div>
                   <div class="metric"><div>Temperature</div><div class="value">{:.1} &deg;C</div></div>
                   <div class="metric"><div>Humidity</div><div class="value">{}%</div></div>
                   <div class="metric"><div>Wind Speed</div><div class="value">{} m/s</div></div>
                   </div>"#,
                escape(&latest.city),
                latest.temperature,
                latest.humidity,
                latest.wind_speed,
            ));

            html.push_str(&format!(
                "<h2>Temperature Trend (Last {} Entries)</h2>",
                rows.len()
            ));
            html.push_str(&svg_chart(series));

            html.push_str("<h2>Raw Data from the Warehouse</h2><table>");
            html.push_str(
                "<tr><th>City</th><th>Temperature</th><th>Humidity</th>\
                 <th>Description</th><th>Wind Speed</th><th>Timestamp</th></tr>",
            );
            for row in rows {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{:.1}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&row.city),
                    row.temperature,
                    row.humidity,
                    escape(&row.weather_description),
                    row.wind_speed,
                    row.timestamp.to_rfc3339(),
                ));
            }
            html.push_str("</table>");

            html
        }
    }
}

/// Temperature line chart as an inline SVG polyline.
fn svg_chart(series: &[SeriesPoint]) -> String {
    const WIDTH: f64 = 640.0;
    const HEIGHT: f64 = 220.0;
    const PAD: f64 = 20.0;

    let temps: Vec<f64> = series.iter().map(|point| point.temperature).collect();
    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if (max - min).abs() < f64::EPSILON { 1.0 } else { max - min };

    let points: Vec<String> = temps
        .iter()
        .enumerate()
        .map(|(i, temp)| {
            let x = if temps.len() > 1 {
                PAD + (i as f64 / (temps.len() - 1) as f64) * (WIDTH - 2.0 * PAD)
            } else {
                WIDTH / 2.0
            };
            let y = PAD + (1.0 - (temp - min) / span) * (HEIGHT - 2.0 * PAD);
            format!("{x:.1},{y:.1}")
        })
        .collect();

    format!(
        r##"<svg viewBox="0 0 {WIDTH} {HEIGHT}" width="{WIDTH}" height="{HEIGHT}">
           <polyline fill="none" stroke="#1a73e8" stroke-width="2" points="{}"/>
           </svg>"##,
        points.join(" ")
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
