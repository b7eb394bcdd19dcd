use std::collections::BTreeMap;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use shared::protocol::API_PREFIX;
use shared::types::ServiceReport;
use crate::watch::registry::RegistryHandle;

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route(&format!("{}/services", API_PREFIX), get(get_services))
        .route(&format!("{}/services/:handle", API_PREFIX), get(get_service))
        .with_state(state)
}

async fn get_index() -> Html<String> {
    Html(format!(
        r#"<html>
    <h1>WoofWoof v.{version}</h1>
    <p>Watchdog for the services on your action bus.</p>

    <h2>Find your service reports here:</h2>
    <ul>
        <li><a href="{prefix}/services">{prefix}/services</a></li>
    </ul>
</html>
"#,
        version = env!("CARGO_PKG_VERSION"),
        prefix = API_PREFIX,
    ))
}

async fn get_services(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, ServiceReport>>, StatusCode> {
    state
        .registry
        .report_all()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to build reports: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_service(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<ServiceReport>, StatusCode> {
    state
        .registry
        .report_one(handle)
        .await
        .map_err(|e| {
            tracing::error!("Failed to build report: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use shared::types::Action;
    use crate::config::{ServiceConfig, WatchConfig};
    use crate::watch::registry::Registry;

    fn state() -> (AppState, mpsc::Sender<Action>, JoinHandle<()>) {
        let services = vec![ServiceConfig {
            handle: "alpha".to_string(),
            topic: "v1/alpha".to_string(),
            watches: vec![WatchConfig {
                group: "fetch".to_string(),
                request: "FETCH_REQUEST".to_string(),
                success: "FETCH_SUCCESS".to_string(),
                error: "FETCH_ERROR".to_string(),
            }],
        }];
        let (tx, rx) = mpsc::channel(8);
        let (registry, task) = RegistryHandle::spawn(Registry::new(&services), rx);
        (AppState { registry }, tx, task)
    }

    #[tokio::test]
    async fn test_services_report_shape() {
        let (state, _tx, _task) = state();
        let Json(reports) = get_services(State(state)).await.unwrap();

        let value = serde_json::to_value(&reports).unwrap();
        assert_eq!(value["alpha"]["handle"], json!("alpha"));
        assert_eq!(value["alpha"]["manifest"], json!(null));
        assert_eq!(value["alpha"]["last_heartbeat"], json!(null));
        assert_eq!(value["alpha"]["groups"]["fetch"]["response_latency"], json!(null));
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        let (state, _tx, _task) = state();
        let result = get_service(State(state), Path("gamma".to_string())).await;

        assert_eq!(result.err(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_reports_served_until_registry_shutdown() {
        let (state, tx, task) = state();

        // The action stream closes first at shutdown; reports keep working
        drop(tx);
        let in_flight = tokio::spawn(get_services(State(state.clone())));
        assert!(in_flight.await.unwrap().is_ok());

        state.registry.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(
            get_services(State(state)).await.err(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[tokio::test]
    async fn test_index_names_report_endpoint() {
        let Html(page) = get_index().await;
        assert!(page.contains("/v1/services"));
        assert!(page.contains(env!("CARGO_PKG_VERSION")));
    }
}
