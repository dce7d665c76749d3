use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::{ApiError, AppState};
use crate::version::catalog::CatalogStore;
use crate::version::checker::{check_client_version, list_records_for};
use crate::version::types::{ClientPlatform, ClientVersionQuery, VersionDecision, VersionRecord};

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub platform: Option<String>,
    pub version: Option<String>,
    pub build: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub platform: Option<String>,
}

impl CheckParams {
    fn into_query(self) -> Result<ClientVersionQuery, ApiError> {
        let platform = parse_platform(self.platform.as_deref())?
            .ok_or_else(|| ApiError::BadRequest("missing platform".to_string()))?;
        let version = self
            .version
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing version".to_string()))?;
        let build = match self.build.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid build number: {raw:?}")))?,
            ),
        };

        Ok(ClientVersionQuery {
            platform,
            current_version: version,
            current_build_number: build,
        })
    }
}

fn parse_platform(raw: Option<&str>) -> Result<Option<ClientPlatform>, ApiError> {
    raw.filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<ClientPlatform>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))
        })
        .transpose()
}

/// Catalog reads go through SQLite, so they run off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

pub async fn check_version<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<CheckParams>,
) -> Result<Json<VersionDecision>, ApiError> {
    let query = params.into_query()?;
    let store = Arc::clone(&state.store);
    let gate = state.gate;

    let decision = run_blocking(move || {
        check_client_version(store.as_ref(), &gate, &query, Utc::now()).map_err(ApiError::from)
    })
    .await?;

    Ok(Json(decision))
}

pub async fn list_versions<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<VersionRecord>>, ApiError> {
    let platform = parse_platform(params.platform.as_deref())?;
    let store = Arc::clone(&state.store);

    let records =
        run_blocking(move || list_records_for(store.as_ref(), platform).map_err(ApiError::from))
            .await?;

    Ok(Json(records))
}
