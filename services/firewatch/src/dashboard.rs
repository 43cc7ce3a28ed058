//! Web dashboard with device cards, a map, and JSON API endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;

use crate::projector::{CardValue, DeviceCard, MapMarker, Projector};
use crate::session::current_epoch_ms;
use crate::state::StateHandle;

/// Dashboard application state
#[derive(Clone)]
pub struct DashboardState {
    pub state: StateHandle,
    pub projector: Arc<Projector>,
}

/// Build the dashboard axum router
pub fn build_router(state: StateHandle, projector: Arc<Projector>) -> Router {
    let dashboard_state = DashboardState { state, projector };

    Router::new()
        .route("/", get(index_handler))
        .route("/api/cards", get(cards_handler))
        .route("/api/markers", get(markers_handler))
        .route("/api/map", get(map_handler))
        .route("/api/status", get(status_handler))
        .route("/health", get(health_handler))
        .with_state(dashboard_state)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn card_value(value: &CardValue) -> String {
    match value {
        CardValue::Number(n) => n.to_string(),
        CardValue::Text(t) => escape_html(t),
    }
}

fn render_card(card: &DeviceCard) -> String {
    let tiles: String = card
        .fields
        .iter()
        .map(|f| {
            let alert = matches!(&f.value, CardValue::Text(t) if t == "Terdeteksi");
            let (color, bg) = if alert {
                ("#721c24", "#f8d7da")
            } else {
                ("#212529", "#f8f9fa")
            };
            format!(
                r#"<div style="padding: 0.5rem; border-radius: 0.25rem; color: {}; background-color: {};">
                    <div style="font-size: 0.8em; font-weight: 600;">{}</div>
                    <div style="font-size: 1.2em;">{}</div>
                    <div style="font-size: 0.75em; color: #6c757d;">{}</div>
                </div>"#,
                color,
                bg,
                f.title,
                card_value(&f.value),
                f.description
            )
        })
        .collect();

    format!(
        r#"<div style="border: 1px solid #dee2e6; border-radius: 0.5rem; padding: 1rem; margin-bottom: 1rem;">
            <h3 style="margin-top: 0;">{}</h3>
            <div style="display: grid; grid-template-columns: repeat(3, 1fr); gap: 0.5rem;">{}</div>
        </div>"#,
        escape_html(&card.heading),
        tiles
    )
}

fn render_marker_row(marker: &MapMarker) -> String {
    let popup: Vec<String> = marker
        .popup
        .iter()
        .map(|l| format!("{}: {}", l.label, escape_html(&l.value)))
        .collect();
    format!(
        r#"<tr style="border-bottom: 1px solid #dee2e6;">
            <td style="padding: 0.5rem;">{}</td>
            <td style="padding: 0.5rem;">{:.5}, {:.5}</td>
            <td style="padding: 0.5rem;">{}</td>
        </tr>"#,
        escape_html(&marker.title),
        marker.position.latitude,
        marker.position.longitude,
        popup.join("<br>")
    )
}

async fn index_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;
    let projector = &dashboard.projector;

    let cards = projector.project_cards(&state.store);
    let markers = projector.project_markers(&state.store);
    let center = projector.project_map_center(&state.store);

    let card_html: String = if cards.is_empty() {
        r#"<p style="color: #6c757d;">No devices have reported yet.</p>"#.to_string()
    } else {
        cards.iter().map(render_card).collect()
    };
    let marker_rows: String = markers.iter().map(render_marker_row).collect();
    let banner_html = match &state.banner {
        Some(banner) => format!(
            r#"<div id="banner" style="padding: 0.75rem; margin-bottom: 1rem; border-radius: 0.25rem; color: #721c24; background-color: #f8d7da;">{}</div>"#,
            escape_html(&banner.message)
        ),
        None => r#"<div id="banner" style="display: none;"></div>"#.to_string(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Firewatch Dashboard</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
</head>
<body style="font-family: system-ui, sans-serif; max-width: 1100px; margin: 0 auto; padding: 1rem;">
    <h1>Firewatch Dashboard</h1>
    <p>Connection: <strong id="connection">{connection}</strong></p>
    {banner_html}
    <section>
        <h2>Map</h2>
        <div id="map" style="height: 400px;" data-lat="{lat}" data-lng="{lng}"></div>
        <table style="width: 100%; border-collapse: collapse; margin-top: 1rem;">
            <thead>
                <tr style="border-bottom: 2px solid #dee2e6;">
                    <th style="padding: 0.5rem; text-align: left;">Device</th>
                    <th style="padding: 0.5rem; text-align: left;">Position</th>
                    <th style="padding: 0.5rem; text-align: left;">Status</th>
                </tr>
            </thead>
            <tbody id="marker-body">{marker_rows}</tbody>
        </table>
    </section>
    <section>
        <h2>Devices</h2>
        <div id="cards">{card_html}</div>
    </section>
    <script>
        const mapEl = document.getElementById('map');
        let map = null;
        let layer = null;
        if (window.L) {{
            map = L.map('map').setView([parseFloat(mapEl.dataset.lat), parseFloat(mapEl.dataset.lng)], 13);
            L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
                attribution: '&copy; OpenStreetMap contributors'
            }}).addTo(map);
            layer = L.layerGroup().addTo(map);
        }}
        function escapeHtml(s) {{
            return String(s).replace(/[&<>"']/g, c => ({{'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}})[c]);
        }}
        function refreshData() {{
            fetch('/api/map')
                .then(r => r.json())
                .then(data => {{
                    if (layer) {{
                        layer.clearLayers();
                        data.markers.forEach(m => {{
                            const popup = m.popup.map(l => `<b>${{l.label}}:</b> ${{escapeHtml(l.value)}}`).join('<br>');
                            L.marker([m.position.latitude, m.position.longitude], {{title: m.title}})
                                .bindPopup(popup)
                                .addTo(layer);
                        }});
                    }}
                    document.getElementById('marker-body').innerHTML = data.markers.map(m => `<tr style="border-bottom: 1px solid #dee2e6;">
                        <td style="padding: 0.5rem;">${{escapeHtml(m.title)}}</td>
                        <td style="padding: 0.5rem;">${{m.position.latitude.toFixed(5)}}, ${{m.position.longitude.toFixed(5)}}</td>
                        <td style="padding: 0.5rem;">${{m.popup.map(l => l.label + ': ' + escapeHtml(l.value)).join('<br>')}}</td>
                    </tr>`).join('');
                }});
            fetch('/api/cards')
                .then(r => r.json())
                .then(cards => {{
                    document.getElementById('cards').innerHTML = cards.map(c => `<div style="border: 1px solid #dee2e6; border-radius: 0.5rem; padding: 1rem; margin-bottom: 1rem;">
                        <h3 style="margin-top: 0;">${{escapeHtml(c.heading)}}</h3>
                        <div style="display: grid; grid-template-columns: repeat(3, 1fr); gap: 0.5rem;">
                        ${{c.fields.map(f => `<div style="padding: 0.5rem; border-radius: 0.25rem; background-color: ${{f.value === 'Terdeteksi' ? '#f8d7da' : '#f8f9fa'}};">
                            <div style="font-size: 0.8em; font-weight: 600;">${{f.title}}</div>
                            <div style="font-size: 1.2em;">${{escapeHtml(f.value)}}</div>
                            <div style="font-size: 0.75em; color: #6c757d;">${{f.description}}</div>
                        </div>`).join('')}}
                        </div>
                    </div>`).join('');
                }});
            fetch('/api/status')
                .then(r => r.json())
                .then(status => {{
                    document.getElementById('connection').textContent = status.connection;
                    const banner = document.getElementById('banner');
                    if (status.banner) {{
                        banner.textContent = status.banner.message;
                        banner.style.cssText = 'padding: 0.75rem; margin-bottom: 1rem; border-radius: 0.25rem; color: #721c24; background-color: #f8d7da;';
                    }} else {{
                        banner.style.cssText = 'display: none;';
                    }}
                }});
        }}
        setInterval(refreshData, 5000);
    </script>
</body>
</html>"#,
        connection = state.connection,
        banner_html = banner_html,
        lat = center.latitude,
        lng = center.longitude,
        marker_rows = marker_rows,
        card_html = card_html,
    );

    Html(html)
}

async fn cards_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;
    axum::Json(dashboard.projector.project_cards(&state.store))
}

async fn markers_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;
    axum::Json(dashboard.projector.project_markers(&state.store))
}

async fn map_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;
    let projector = &dashboard.projector;

    axum::Json(serde_json::json!({
        "center": projector.project_map_center(&state.store),
        "markers": projector.project_markers(&state.store),
    }))
}

async fn status_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;

    axum::Json(serde_json::json!({
        "connection": state.connection.to_string(),
        "banner": state.banner,
        "device_count": state.store.len(),
        "messages_processed": state.messages_processed,
        "last_message_epoch_ms": state.last_message_epoch_ms,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "now_epoch_ms": current_epoch_ms(),
    }))
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
