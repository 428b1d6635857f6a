//! HTTP server with deferred startup.
//!
//! `new()` takes the shared read-side state, `start()` binds the listener and
//! `serve()` answers requests until the shutdown future resolves. Binding
//! before serving lets the caller learn an OS-assigned port first.

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    dead_letters_handler, health_handler, liveness_handler, readiness_handler, stats_handler,
    AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Owns the HTTP read side: stats, dead letters and health probes.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, state: AppState) -> Self {
        Self {
            config,
            listener: None,
            state,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Assembles the router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /aggregation/stats` -- price aggregate
    /// - `GET /aggregation/dead-letters` -- recent dead letters
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/aggregation/stats", get(stats_handler))
            .route("/aggregation/dead-letters", get(dead_letters_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(self.state.clone())
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "HTTP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains.
    ///
    /// After the shutdown future resolves the controller moves to `Draining`
    /// and this waits up to `drain_timeout` for in-flight orders.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = self.shutdown_controller();

        controller.set_ready();
        info!("serving HTTP read side");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        controller.trigger_shutdown();
        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("all in-flight orders drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with orders still in flight"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::network::handlers::test_state;
    use crate::network::HealthState;

    fn module() -> (NetworkModule, Arc<crate::aggregator::Aggregator>) {
        let (state, aggregator) = test_state();
        (
            NetworkModule::new(NetworkConfig::default(), state),
            aggregator,
        )
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn stats_route_serves_aggregate() {
        let (module, aggregator) = module();
        aggregator.update(10.0);
        aggregator.update(20.0);

        let (status, json) = get_json(module.build_router(), "/aggregation/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalOrders"], 2);
        assert_eq!(json["totalValue"], "30.00");
        assert_eq!(json["runningAveragePrice"], "15.00");
    }

    #[tokio::test]
    async fn dead_letter_route_serves_log() {
        let (module, _) = module();
        let (status, json) = get_json(module.build_router(), "/aggregation/dead-letters").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalSeen"], 0);
        assert!(json["entries"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn readiness_route_is_unavailable_before_serve() {
        let (module, _) = module();
        let (status, _) = get_json(module.build_router(), "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (module, _) = module();
        let response = module
            .build_router()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let (mut module, _) = module();
        let config = NetworkConfig {
            host: "127.0.0.1".to_string(),
            ..NetworkConfig::default()
        };
        module.config = config;
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let (module, _) = module();
        let result = module.serve(std::future::ready(())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn serve_stops_and_drains_on_shutdown() {
        let (mut module, _) = module();
        module.config.host = "127.0.0.1".to_string();
        let controller = module.shutdown_controller();
        module.start().await.unwrap();

        module.serve(std::future::ready(())).await.unwrap();

        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
