//! API Server
//!
//! Builds the router with its middleware stack and serves it until a
//! shutdown signal arrives.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
    websocket::WebSocketManager,
};
use crate::config::ServerConfig;
use crate::events::BroadcastHub;
use crate::room::RoomOrchestrator;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: ServerConfig,
    orchestrator: RoomOrchestrator,
    hub: BroadcastHub,
}

impl ApiServer {
    pub fn new(config: ServerConfig, orchestrator: RoomOrchestrator, hub: BroadcastHub) -> Self {
        Self {
            config,
            orchestrator,
            hub,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr = self.socket_addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, origins = ?self.config.allowed_origins, "bingo room server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("server stopped");
        Ok(())
    }

    /// Router with request ids, CORS, timeout and tracing applied
    pub fn create_app(&self) -> axum::Router {
        let state = Arc::new(AppState {
            orchestrator: self.orchestrator.clone(),
            websocket_manager: Arc::new(WebSocketManager::new(self.hub.clone())),
        });

        create_router(state)
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(create_cors_layer(&self.config.allowed_origins))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received terminate signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BingoConfig;
    use crate::room::types::{RoomConfig, UserProfile};
    use crate::store::{MemoryDurableStore, MemoryEphemeralStore, RoomStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tower::ServiceExt;

    async fn app() -> axum::Router {
        let mut config = BingoConfig::fast();
        config.auto_start_countdown = false;
        let durable = Arc::new(MemoryDurableStore::new());
        durable.upsert_user(UserProfile::new("p1").with_balance(1_000));
        let store = RoomStore::new(durable, Arc::new(MemoryEphemeralStore::new()), config.ttl.clone());
        store
            .durable()
            .save_room_config(RoomConfig::generated("r1", "Test", 100, 3, &mut StdRng::seed_from_u64(1)))
            .await
            .unwrap();
        let hub = BroadcastHub::default();
        let orchestrator = RoomOrchestrator::new(config.clone(), store, Arc::new(hub.clone()));
        ApiServer::new(config.server, orchestrator, hub).create_app()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_has_request_id() {
        let response = app()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_bet_then_snapshot() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(
                Request::post("/rooms/r1/bets")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"cardId":2,"playerId":"p1","username":"alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["population"], 1);

        let response = app
            .oneshot(Request::get("/rooms/r1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["data"]["players"][0]["username"], "alice");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(Request::get("/rooms/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "ROOM_NOT_FOUND");

        let response = app
            .oneshot(
                Request::delete("/rooms/r1/bets/1?playerId=p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
