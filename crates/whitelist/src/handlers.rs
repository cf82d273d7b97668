//! JSON-RPC 网关 HTTP 处理器

use crate::{
    config::WhitelistServiceConfig,
    error::WhitelistError,
    metrics::{NONCE_LOOKUPS_TOTAL, observe_rpc_request},
    service::NonceLookupService,
    storage::{WhitelistStore, open_existing_store},
    types::{RpcResponse, TransactionCountRequest},
};
use axum::{
    Router,
    body::Bytes,
    extract::{Json, State},
    routing::{get, post},
};
use std::time::Instant;
use tracing::{debug, info};

/// 网关服务状态
#[derive(Clone)]
pub struct GatewayState {
    pub lookup: NonceLookupService,
}

impl GatewayState {
    pub fn new(store: WhitelistStore) -> Self {
        Self {
            lookup: NonceLookupService::new(store),
        }
    }
}

/// 从配置创建网关状态
///
/// 数据库文件或 whitelist 表不存在时返回 `SchemaMissing`，调用方应拒绝启动。
pub async fn create_gateway_state(
    service_config: &WhitelistServiceConfig,
    db_path: &std::path::Path,
) -> Result<GatewayState, WhitelistError> {
    info!("Initializing gateway state from {}", db_path.display());

    let store = open_existing_store(db_path, service_config.max_connections).await?;
    info!(
        "Whitelist store ready: backend={}, entries={}",
        store.backend_name(),
        store.entry_count().await?
    );

    Ok(GatewayState::new(store))
}

/// 创建网关路由
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/health", get(health_check_handler))
        .with_state(state)
}

async fn rpc_handler(
    State(app_state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<RpcResponse>, WhitelistError> {
    let start_time = Instant::now();

    let result = handle_rpc(&app_state, &body).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    observe_rpc_request(status, start_time.elapsed().as_secs_f64());

    result.map(Json)
}

async fn handle_rpc(app_state: &GatewayState, body: &[u8]) -> Result<RpcResponse, WhitelistError> {
    let request = TransactionCountRequest::from_body(body)?;
    debug!(
        "eth_getTransactionCount for {} (block tag {:?})",
        request.address, request.block_tag
    );

    let nonce = app_state.lookup.resolve(&request.address).await?;
    let outcome = if nonce.is_valid() { "valid" } else { "absent" };
    NONCE_LOOKUPS_TOTAL.with_label_values(&[outcome]).inc();

    Ok(RpcResponse::new(nonce.into_rpc_result()))
}

async fn health_check_handler(
    State(app_state): State<GatewayState>,
) -> Result<Json<serde_json::Value>, WhitelistError> {
    debug!("Health check requested");

    let store = app_state.lookup.store();
    let entry_count = store.entry_count().await?;

    let response = serde_json::json!({
        "status": "healthy",
        "service": "whitelist",
        "backend": store.backend_name(),
        "entry_count": entry_count,
        "timestamp": chrono::Utc::now().timestamp(),
    });

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::create_store;
    use crate::types::WhitelistEntry;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use chrono::{Duration, Utc};
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    const ACTIVE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const EXPIRED: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    async fn create_test_app() -> (Router, TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("whitelist.sqlite");
        let store = create_store(&db_path, 2).await.unwrap();

        let now = Utc::now();
        store
            .insert_if_absent(&WhitelistEntry::new(
                ACTIVE,
                "0x4000",
                now - Duration::hours(1),
                now + Duration::hours(1),
            ))
            .await
            .unwrap();
        store
            .insert_if_absent(&WhitelistEntry::new(
                EXPIRED,
                "0x4000",
                now - Duration::days(2),
                now - Duration::days(1),
            ))
            .await
            .unwrap();
        drop(store);

        let state = create_gateway_state(&WhitelistServiceConfig::default(), &db_path)
            .await
            .unwrap();
        (create_router(state), temp_dir)
    }

    fn rpc_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_state_requires_schema() {
        let temp_dir = tempdir().unwrap();
        let result = create_gateway_state(
            &WhitelistServiceConfig::default(),
            &temp_dir.path().join("missing.sqlite"),
        )
        .await;
        assert!(matches!(result, Err(WhitelistError::SchemaMissing(_))));
    }

    #[tokio::test]
    async fn test_active_address_returns_stored_nonce() {
        let (app, _temp_dir) = create_test_app().await;

        let body = format!(
            r#"{{"jsonrpc":"2.0","id":42,"method":"eth_getTransactionCount","params":["{}","latest"]}}"#,
            ACTIVE.to_uppercase().replacen("0X", "0x", 1)
        );
        let response = app.oneshot(rpc_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let response: RpcResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(response, RpcResponse::new("0x4000".into()));
    }

    #[tokio::test]
    async fn test_expired_and_unknown_addresses_return_zero() {
        let (app, _temp_dir) = create_test_app().await;

        for address in [EXPIRED, "0x1111111111111111111111111111111111111111"] {
            let body = format!(
                r#"{{"method":"eth_getTransactionCount","params":["{address}","latest"]}}"#
            );
            let response = app.clone().oneshot(rpc_request(&body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let value: serde_json::Value =
                serde_json::from_slice(&body_bytes(response).await).unwrap();
            assert_eq!(value["jsonrpc"], "2.0");
            assert_eq!(value["id"], 1);
            assert_eq!(value["result"], "0x0");
        }
    }

    #[tokio::test]
    async fn test_other_method_is_not_found() {
        let (app, _temp_dir) = create_test_app().await;

        let body = format!(r#"{{"method":"eth_getBalance","params":["{ACTIVE}","latest"]}}"#);
        let response = app.oneshot(rpc_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_address_is_bad_request() {
        let (app, _temp_dir) = create_test_app().await;

        let response = app
            .oneshot(rpc_request(
                r#"{"method":"eth_getTransactionCount","params":["",""]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (app, _temp_dir) = create_test_app().await;

        for body in ["", "not json", r#"{"method":"eth_getTransactionCount"}"#] {
            let response = app.clone().oneshot(rpc_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body:?}");
        }
    }

    #[tokio::test]
    async fn test_get_on_rpc_route_is_rejected() {
        let (app, _temp_dir) = create_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _temp_dir) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["backend"], "SQLite");
        assert_eq!(value["entry_count"], 2);
    }
}
