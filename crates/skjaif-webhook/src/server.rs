//! The HTTP server exposing the conversion gateway.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use kube::core::conversion::ConversionReview;
use snafu::{ResultExt, Snafu};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::gateway::ConversionGateway;

#[derive(Debug, Snafu)]
pub enum ConversionWebhookError {
    #[snafu(display("failed to bind to socket address {socket_addr}"))]
    BindListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },

    #[snafu(display("failed to run conversion webhook server"))]
    RunServer { source: std::io::Error },
}

/// Options of the [`ConversionWebhookServer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionWebhookOptions {
    /// The socket address the server binds to.
    pub socket_addr: SocketAddr,
}

impl Default for ConversionWebhookOptions {
    fn default() -> Self {
        Self {
            socket_addr: ConversionWebhookServer::DEFAULT_SOCKET_ADDRESS,
        }
    }
}

/// A ready-to-use CRD conversion webhook server.
///
/// It expects POST requests carrying a `ConversionReview` on
/// `/convert/{CRD_NAME}` and additionally serves `/health`. TLS termination
/// is left to the platform.
pub struct ConversionWebhookServer {
    router: Router,
    options: ConversionWebhookOptions,
}

impl ConversionWebhookServer {
    pub const DEFAULT_SOCKET_ADDRESS: SocketAddr =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8443);

    pub fn new(gateway: ConversionGateway, options: ConversionWebhookOptions) -> Self {
        Self {
            router: Self::router(gateway),
            options,
        }
    }

    /// The route the API server posts conversion reviews to, eg.
    /// `/convert/svartskjaifs.skjaif.skjaiferator.no`.
    pub fn conversion_route(gateway: &ConversionGateway) -> String {
        format!("/convert/{crd_name}", crd_name = gateway.registry().crd_name())
    }

    /// Builds the router without binding to any socket.
    pub fn router(gateway: ConversionGateway) -> Router {
        let route = Self::conversion_route(&gateway);
        tracing::debug!(route, "registering route for conversion webhook");

        Router::new()
            .route(&route, post(convert))
            .layer(TraceLayer::new_for_http())
            // The health route is below the trace layer so as not to be instrumented
            .route("/health", get(|| async { "ok" }))
            .with_state(gateway)
    }

    /// Runs the server until `shutdown` completes.
    #[instrument(name = "run_conversion_webhook_server", skip_all, fields(socket_addr = %self.options.socket_addr))]
    pub async fn run<F>(self, shutdown: F) -> Result<(), ConversionWebhookError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let socket_addr = self.options.socket_addr;
        let listener = TcpListener::bind(socket_addr)
            .await
            .context(BindListenerSnafu { socket_addr })?;

        tracing::info!("starting conversion webhook server");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .context(RunServerSnafu)
    }
}

async fn convert(
    State(gateway): State<ConversionGateway>,
    Json(review): Json<ConversionReview>,
) -> Json<ConversionReview> {
    Json(gateway.review(review))
}
