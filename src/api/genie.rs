use axum::{Json, extract::State, http::HeaderMap, http::StatusCode};

use crate::AppState;
use crate::genie::chart_spec::{self, ChartHydration};
use crate::normalized::GenieCoordinates;

/// POST /api/genie/chart - hydrate a chart reference into a chart spec and
/// table preview.
pub async fn hydrate_chart(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(coords): Json<GenieCoordinates>,
) -> Result<Json<ChartHydration>, (StatusCode, String)> {
    if !coords.is_complete() {
        return Err((
            StatusCode::BAD_REQUEST,
            "spaceId, conversationId, messageId and attachmentId are required".to_string(),
        ));
    }

    if let Some(hit) = state.chart_cache.get(&coords) {
        tracing::debug!(message_id = %coords.message_id, "Chart hydration cache hit");
        return Ok(Json(hit));
    }

    tracing::info!(
        name: "genie.chart.hydrate",
        space_id = %coords.space_id,
        conversation_id = %coords.conversation_id,
        message_id = %coords.message_id,
        attachment_id = %coords.attachment_id,
        "Hydrating chart"
    );

    let genie = state.genie.with_token_source(state.token_source_for(&headers));
    let result = genie.query_result(&coords).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch Genie query result");
        (
            StatusCode::BAD_GATEWAY,
            format!("Failed to fetch chart data from Genie: {e}"),
        )
    })?;

    let hydration = chart_spec::hydrate(&result, state.config.genie.table_preview_limit)
        .map_err(|e| {
            tracing::warn!(error = %e, "Query result cannot be charted");
            (StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    state.chart_cache.purge_expired();
    state.chart_cache.insert(coords, hydration.clone());
    Ok(Json(hydration))
}
