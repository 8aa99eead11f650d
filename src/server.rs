use crate::config::AppConfig;
use crate::data;
use crate::html::INDEX_HTML;
use crate::join::{lookup_name, SpatialIndex};
use crate::state::{AppState, Command, Effect, Selection, Viewport};
use crate::table::TableView;
use crate::types::{DistrictName, FeatureCollection, MetricField};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub struct AppContext {
    pub state: Mutex<AppState>,
    pub index: SpatialIndex,
    pub client: reqwest::Client,
    pub config: AppConfig,
}

type ApiError = (StatusCode, String);

#[derive(Serialize)]
pub struct ViewResponse {
    overlay: geojson::FeatureCollection,
    viewport: Viewport,
    viewport_changed: bool,
    field: MetricField,
    selection: Selection,
    last_sync: Option<String>,
    tooltip: Option<String>,
    popup: Option<String>,
}

#[derive(Serialize)]
pub struct OptionsResponse {
    districts: Vec<String>,
    fields: Vec<MetricField>,
    tile_url: String,
}

#[derive(Deserialize)]
pub struct FilterRequest {
    selected: Vec<String>,
}

#[derive(Deserialize)]
pub struct FieldRequest {
    field: String,
}

#[derive(Deserialize)]
pub struct DistrictRequest {
    district: String,
}

#[derive(Deserialize)]
pub struct PointerRequest {
    district: String,
    entered: bool,
}

#[derive(Deserialize)]
pub struct TableRequest {
    visible: bool,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct QueryResponse {
    district: String,
    data: Option<HashMap<String, String>>,
}

pub fn build_context(config: AppConfig, geometry: FeatureCollection) -> Result<Arc<AppContext>> {
    info!("Building spatial index for {} districts", geometry.len());
    let index = SpatialIndex::new(&geometry);
    let client = data::http_client(config.server.fetch_timeout_secs)?;

    Ok(Arc::new(AppContext {
        state: Mutex::new(AppState::new(geometry, config.clone())),
        index,
        client,
        config,
    }))
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/view", get(view_handler))
        .route("/api/options", get(options_handler))
        .route("/api/table", get(table_handler).post(table_visibility_handler))
        .route("/api/query", get(query_handler))
        .route("/api/filter", post(filter_handler))
        .route("/api/field", post(field_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/select", post(select_handler))
        .route("/api/pointer", post(pointer_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn start_server(config: AppConfig, geometry: FeatureCollection) -> Result<()> {
    let port = config.server.port;
    let ctx = build_context(config, geometry)?;

    if !initial_sync(&ctx).await {
        warn!("First sheet fetch failed; serving geometry without data until a refresh succeeds");
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

/// Runs the first refresh to completion so the page never opens on an empty map.
/// Returns whether the sheet was loaded.
pub async fn initial_sync(ctx: &AppContext) -> bool {
    let effects = ctx.state.lock().await.dispatch(Command::Refresh);
    run_effects(ctx, effects).await;
    ctx.state.lock().await.store().last_sync_label().is_some()
}

/// Carries out fetches requested by the state and feeds their outcome back in.
pub async fn run_effects(ctx: &AppContext, effects: Vec<Effect>) -> Vec<Effect> {
    let mut done = Vec::new();
    for effect in effects {
        match effect {
            Effect::Fetch { sequence } => {
                let fetched = match data::fetch_csv(&ctx.client, &ctx.config.input.sheet_csv_url).await {
                    Ok(text) => data::parse_csv(&text, &ctx.config.input.join_column_csv),
                    Err(e) => Err(e),
                };
                let command = match fetched {
                    Ok(rows) => Command::RefreshCompleted { sequence, rows, at: Local::now() },
                    Err(e) => Command::RefreshFailed { sequence, error: format!("{:#}", e) },
                };
                done.extend(ctx.state.lock().await.dispatch(command));
            }
            other => done.push(other),
        }
    }
    done
}

fn view(state: &AppState, effects: &[Effect]) -> ViewResponse {
    let mut tooltip = None;
    let mut popup = None;
    let mut viewport_changed = false;
    for effect in effects {
        match effect {
            Effect::ShowTooltip(t) => tooltip = Some(t.text.clone()),
            Effect::OpenPopup(p) => popup = Some(p.html()),
            Effect::ViewportChanged(_) => viewport_changed = true,
            _ => {}
        }
    }

    ViewResponse {
        overlay: state.renderer().to_geojson(),
        viewport: state.viewport().clone(),
        viewport_changed,
        field: state.field(),
        selection: state.selection().clone(),
        last_sync: state.store().last_sync_label(),
        tooltip,
        popup,
    }
}

async fn apply(ctx: &AppContext, command: Command) -> ViewResponse {
    let mut state = ctx.state.lock().await;
    let effects = state.dispatch(command);
    view(&state, &effects)
}

fn parse_district(raw: &str) -> Result<DistrictName, ApiError> {
    DistrictName::parse(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn view_handler(State(ctx): State<Arc<AppContext>>) -> Json<ViewResponse> {
    let state = ctx.state.lock().await;
    let mut response = view(&state, &[]);
    response.viewport_changed = true;
    Json(response)
}

async fn options_handler(State(ctx): State<Arc<AppContext>>) -> Json<OptionsResponse> {
    let state = ctx.state.lock().await;
    Json(OptionsResponse {
        districts: state.filter_options(),
        fields: MetricField::ALL.to_vec(),
        tile_url: ctx.config.map.tile_url.clone(),
    })
}

async fn table_handler(State(ctx): State<Arc<AppContext>>) -> Json<TableView> {
    let state = ctx.state.lock().await;
    let table = state.table();
    Json(TableView {
        rows: table.rows.clone(),
        visible: table.visible,
    })
}

async fn table_visibility_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<TableRequest>,
) -> Json<ViewResponse> {
    let command = if req.visible { Command::ShowTable } else { Command::HideTable };
    Json(apply(&ctx, command).await)
}

async fn query_handler(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let state = ctx.state.lock().await;
    let response = ctx.index
        .locate(state.geometry(), params.lon, params.lat)
        .map(|feature| QueryResponse {
            district: feature.name.to_string(),
            data: lookup_name(state.store().rows(), &feature.name).map(|row| row.fields.clone()),
        });
    Json(response)
}

async fn filter_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<FilterRequest>,
) -> Json<ViewResponse> {
    let selection = Selection::from_values(req.selected.as_slice());
    Json(apply(&ctx, Command::SetFilter(selection)).await)
}

async fn field_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<FieldRequest>,
) -> Result<Json<ViewResponse>, ApiError> {
    let field: MetricField = req.field.parse()
        .map_err(|e: crate::types::FieldParseError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(apply(&ctx, Command::SetField(field)).await))
}

async fn refresh_handler(State(ctx): State<Arc<AppContext>>) -> Json<ViewResponse> {
    let requested = ctx.state.lock().await.dispatch(Command::Refresh);
    let effects = run_effects(&ctx, requested).await;
    let state = ctx.state.lock().await;
    Json(view(&state, &effects))
}

async fn select_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<DistrictRequest>,
) -> Result<Json<ViewResponse>, ApiError> {
    let name = parse_district(&req.district)?;
    Ok(Json(apply(&ctx, Command::SelectDistrict(name)).await))
}

async fn pointer_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<PointerRequest>,
) -> Result<Json<ViewResponse>, ApiError> {
    let name = parse_district(&req.district)?;
    let command = if req.entered { Command::PointerEnter(name) } else { Command::PointerLeave(name) };
    Ok(Json(apply(&ctx, command).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_csv;
    use crate::types::{DistrictFeature, DistrictGeometry};
    use geo::polygon;

    const SHEET: &str = "District,Temperature,Population,Births,Deaths\nAdilabad,31,1,2,3\nHyderabad,34,4,5,6\n";

    fn context() -> Arc<AppContext> {
        context_with(AppConfig::default())
    }

    fn context_with(config: AppConfig) -> Arc<AppContext> {
        let square = |n: &str, lon: f64| DistrictFeature {
            name: DistrictName::parse(n).unwrap(),
            geometry: DistrictGeometry::Polygon(polygon![
                (x: lon, y: 17.0),
                (x: lon + 1.0, y: 17.0),
                (x: lon + 1.0, y: 18.0),
                (x: lon, y: 18.0),
                (x: lon, y: 17.0),
            ]),
        };
        let geometry = FeatureCollection::new(vec![square("Adilabad", 78.0), square("Hyderabad", 79.0)]);
        build_context(config, geometry).unwrap()
    }

    /// Serves `SHEET` over HTTP on an ephemeral local port.
    async fn sheet_server() -> SocketAddr {
        let app = Router::new().route("/sheet.csv", get(|| async { SHEET }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn load(ctx: &AppContext) {
        let mut state = ctx.state.lock().await;
        let sequence = state.store().latest_issued() + 1;
        state.dispatch(Command::Refresh);
        let rows = parse_csv(SHEET, "District").unwrap();
        state.dispatch(Command::RefreshCompleted { sequence, rows, at: Local::now() });
    }

    #[tokio::test]
    async fn filter_fits_viewport_to_selection() {
        let ctx = context();
        load(&ctx).await;

        let Json(view) = filter_handler(
            State(ctx.clone()),
            Json(FilterRequest { selected: vec!["Hyderabad".into()] }),
        )
        .await;

        assert!(view.viewport_changed);
        assert_eq!(view.overlay.features.len(), 1);
        assert!(matches!(view.viewport, Viewport::FitBounds { .. }));
    }

    #[tokio::test]
    async fn pointer_returns_tooltip_for_field() {
        let ctx = context();
        load(&ctx).await;

        let Json(view) = field_handler(State(ctx.clone()), Json(FieldRequest { field: "Births".into() }))
            .await
            .unwrap();
        assert!(!view.viewport_changed);

        let Json(view) = pointer_handler(
            State(ctx.clone()),
            Json(PointerRequest { district: "adilabad".into(), entered: true }),
        )
        .await
        .unwrap();
        assert_eq!(view.tooltip.as_deref(), Some("Adilabad, Births: 2"));
    }

    #[tokio::test]
    async fn bad_input_is_rejected() {
        let ctx = context();
        let err = field_handler(State(ctx.clone()), Json(FieldRequest { field: "Rainfall".into() }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = select_handler(State(ctx), Json(DistrictRequest { district: " ".into() }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn select_opens_popup() {
        let ctx = context();
        load(&ctx).await;
        let Json(view) = select_handler(State(ctx), Json(DistrictRequest { district: "Hyderabad".into() }))
            .await
            .unwrap();
        assert_eq!(
            view.popup.as_deref(),
            Some("<b>Hyderabad</b><hr>Temp: 34<br>Pop: 4<br>Births: 5<br>Deaths: 6")
        );
    }

    #[tokio::test]
    async fn query_locates_district_with_data() {
        let ctx = context();
        load(&ctx).await;

        let Json(hit) = query_handler(State(ctx.clone()), Query(QueryParams { lat: 17.5, lon: 79.5 })).await;
        let hit = hit.unwrap();
        assert_eq!(hit.district, "Hyderabad");
        assert_eq!(hit.data.unwrap()["Temperature"], "34");

        let Json(miss) = query_handler(State(ctx), Query(QueryParams { lat: 10.0, lon: 79.5 })).await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn options_list_sentinel_first() {
        let ctx = context();
        let Json(options) = options_handler(State(ctx)).await;
        assert_eq!(options.districts, vec!["all", "Adilabad", "Hyderabad"]);
        assert_eq!(options.fields.len(), 5);
    }

    #[tokio::test]
    async fn table_toggle_round_trip() {
        let ctx = context();
        load(&ctx).await;
        table_visibility_handler(State(ctx.clone()), Json(TableRequest { visible: true })).await;
        let Json(table) = table_handler(State(ctx)).await;
        assert!(table.visible);
        assert_eq!(table.rows.len(), 2);
    }

    #[tokio::test]
    async fn initial_sync_mounts_overlay_before_first_view() {
        let addr = sheet_server().await;
        let mut config = AppConfig::default();
        config.input.sheet_csv_url = format!("http://{}/sheet.csv", addr);
        let ctx = context_with(config);

        assert!(initial_sync(&ctx).await);

        let Json(view) = view_handler(State(ctx.clone())).await;
        assert_eq!(view.overlay.features.len(), 2);
        assert!(view.last_sync.is_some());
        let Json(table) = table_handler(State(ctx)).await;
        assert_eq!(table.rows.len(), 2);
    }

    #[tokio::test]
    async fn initial_sync_reports_unreachable_sheet() {
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = closed.local_addr().unwrap();
        drop(closed);

        let mut config = AppConfig::default();
        config.input.sheet_csv_url = format!("http://{}/sheet.csv", addr);
        let ctx = context_with(config);

        assert!(!initial_sync(&ctx).await);
        let Json(view) = view_handler(State(ctx)).await;
        assert!(view.last_sync.is_none());
    }

    #[tokio::test]
    async fn view_json_matches_page_contract() {
        let mut config = AppConfig::default();
        config.input.join_column_shape = "dist_name".to_string();
        let ctx = context_with(config);
        load(&ctx).await;

        let Json(view) = filter_handler(
            State(ctx.clone()),
            Json(FilterRequest { selected: vec!["Hyderabad".into()] }),
        )
        .await;
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["viewport_changed"], true);
        assert!(json["last_sync"].is_string());
        assert!(json["tooltip"].is_null());
        assert!(json["popup"].is_null());
        assert_eq!(json["field"], "none");

        let viewport = &json["viewport"];
        assert_eq!(viewport["kind"], "fitBounds");
        assert!(viewport["southWest"].is_array());
        assert!(viewport["northEast"].is_array());
        assert!(viewport.get("south_west").is_none());

        let properties = &json["overlay"]["features"][0]["properties"];
        assert_eq!(properties["district"], "Hyderabad");
        assert!(properties.get("dist_name").is_none());
        assert_eq!(properties["state"], "base");
        assert_eq!(properties["style"]["fillColor"], "#3498db");
    }
}
