use std::net::SocketAddr;

use anyhow::Result;
use axum::ServiceExt;
use axum::extract::Request;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::endpoints;
use crate::state::ServiceState;
use crate::web::middleware as m;

/// The arenaload web application.
#[derive(Debug)]
pub struct App {
    router: axum::Router,
    graceful_shutdown: bool,
}

impl App {
    /// Creates a new application router for the given service state.
    ///
    /// Use [`serve`](Self::serve) to run the server future, or [`router`](Self::router) to drive
    /// the application directly.
    pub fn new(state: ServiceState) -> Self {
        // Layers added first are called first on requests.
        let middleware = ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(m::handle_panic))
            .layer(m::set_server_header())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(m::make_http_span)
                    .on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
            );

        let router = endpoints::routes().layer(middleware).with_state(state);

        App {
            router,
            graceful_shutdown: false,
        }
    }

    /// Enables or disables graceful shutdown for the server.
    ///
    /// By default, graceful shutdown is disabled.
    pub fn graceful_shutdown(mut self, enable: bool) -> Self {
        self.graceful_shutdown = enable;
        self
    }

    /// Returns the router with all routes and middleware applied.
    pub fn router(self) -> axum::Router {
        self.router
    }

    /// Runs the web server until graceful shutdown is triggered.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let Self {
            router,
            graceful_shutdown,
        } = self;

        let service =
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(router);

        if graceful_shutdown {
            let guard = elegant_departure::get_shutdown_guard();
            axum::serve(listener, service)
                .with_graceful_shutdown(guard.wait_owned())
                .await?;
        } else {
            axum::serve(listener, service).await?;
        }

        Ok(())
    }
}
