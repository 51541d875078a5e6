//! Server assembly and startup.
//!
//! # Responsibilities
//! - Resolve listen and backend addresses from the TLS flags
//! - Load the shared TLS credential set, refusing to start without it
//! - Build the resource tree: proxy root, `/_ui` static files, `/_api` application
//! - Wire up middleware (request ID, tracing)
//! - Serve the primary listener (TLS or plain) and the WebSocket listener
//!
//! # Design Decisions
//! - Everything that can fail is done in [`ServerAssembler::new`], before
//!   any socket is bound
//! - The resource tree is built once and never changes
//! - Shutdown stops both listeners; the primary one drains within a grace period

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::FrontdoorConfig;
use crate::http::application::{Application, ApplicationBridge};
use crate::http::request::{RequestIdGenerator, X_REQUEST_ID};
use crate::http::websocket::{BroadcastHandler, WebSocketServer};
use crate::lifecycle::{BlockingPool, Shutdown, StartupError};
use crate::net::tls::{load_server_config, TlsError, TlsPolicy};
use crate::net::Listener;
use crate::observability::metrics;
use crate::proxy::{BackendTarget, ForwardingConnectionFactory, ProxyNode};

/// Everything needed to start serving, validated up front.
pub struct ServerAssembler {
    config: FrontdoorConfig,
    policy: TlsPolicy,
    listen_addr: SocketAddr,
    websocket_addr: SocketAddr,
    backend: BackendTarget,
    server_tls: Option<RustlsConfig>,
    router: Router,
}

impl ServerAssembler {
    /// Resolve addresses, load TLS material and build the resource tree.
    ///
    /// Missing or unreadable TLS material for an enabled direction is fatal;
    /// there is no fallback to plaintext.
    pub fn new(config: FrontdoorConfig, application: Arc<dyn Application>) -> Result<Self, StartupError> {
        let policy = TlsPolicy::from_config(&config.tls);

        let ip: IpAddr = config
            .server
            .bind_address
            .parse()
            .map_err(|_| StartupError::BindAddress(config.server.bind_address.clone()))?;
        let listen_addr = SocketAddr::new(ip, config.server.listen_port(policy.client_facing));
        let websocket_addr = SocketAddr::new(ip, config.server.websocket_port);

        let backend = BackendTarget::new(
            config.backend.host.clone(),
            config.backend.port_for(policy.backend_facing),
        );

        let (server_tls, factory) = match Self::load_tls(&policy, &config) {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::error!(
                    severity = "critical",
                    error = %err,
                    client_facing = policy.client_facing,
                    backend_facing = policy.backend_facing,
                    "TLS is enabled but its key or certificate is unusable, refusing to start"
                );
                return Err(err.into());
            }
        };

        let root = ProxyNode::root(
            backend.clone(),
            policy.backend_facing,
            config.server.max_body_bytes,
            Arc::new(factory),
        );
        let pool = BlockingPool::new(config.server.worker_threads);
        let api = ApplicationBridge::new(application, pool, config.server.max_body_bytes);
        let router = build_router(&config, root, api);

        Ok(Self {
            config,
            policy,
            listen_addr,
            websocket_addr,
            backend,
            server_tls,
            router,
        })
    }

    fn load_tls(
        policy: &TlsPolicy,
        config: &FrontdoorConfig,
    ) -> Result<(Option<RustlsConfig>, ForwardingConnectionFactory), TlsError> {
        policy.require_material()?;

        let server_tls = match (policy.client_facing, &policy.certificate, &policy.private_key) {
            (false, _, _) => None,
            (true, Some(cert), Some(key)) => Some(load_server_config(cert, key)?),
            (true, _, _) => {
                return Err(TlsError::MissingMaterial {
                    direction: "client-facing",
                    missing: "certificate",
                })
            }
        };

        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let factory = ForwardingConnectionFactory::new(policy, connect_timeout)?;
        Ok((server_tls, factory))
    }

    /// Address the primary listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn websocket_addr(&self) -> SocketAddr {
        self.websocket_addr
    }

    /// Where proxied requests go.
    pub fn backend_target(&self) -> &BackendTarget {
        &self.backend
    }

    pub fn tls_policy(&self) -> &TlsPolicy {
        &self.policy
    }

    /// The assembled resource tree with its middleware.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Start metrics, bind both listeners and serve until `shutdown` fires.
    pub async fn run(
        self,
        broadcast: Arc<dyn BroadcastHandler>,
        shutdown: &Shutdown,
    ) -> Result<(), StartupError> {
        self.start_metrics();
        let primary = bind(self.listen_addr).await?;
        let websocket = bind(self.websocket_addr).await?;
        self.serve(primary, websocket, broadcast, shutdown).await
    }

    /// Start the Prometheus endpoint if enabled. A failure here is logged,
    /// never fatal.
    fn start_metrics(&self) {
        let observability = &self.config.observability;
        if !observability.metrics_enabled {
            return;
        }
        match observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(err) = metrics::init_metrics(addr) {
                    tracing::error!(error = %err, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    /// Serve on already bound listeners.
    pub async fn serve(
        self,
        primary: TcpListener,
        websocket: TcpListener,
        broadcast: Arc<dyn BroadcastHandler>,
        shutdown: &Shutdown,
    ) -> Result<(), StartupError> {
        let primary_addr = primary.local_addr()?;
        let websocket_addr = websocket.local_addr()?;
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);

        tracing::info!(
            address = %primary_addr,
            tls = self.server_tls.is_some(),
            backend = %self.backend,
            backend_tls = self.policy.backend_facing,
            "Listening for connections"
        );
        tracing::info!(
            url = %format!("ws://{}:{}", self.config.server.bind_address, websocket_addr.port()),
            "WebSocket endpoint ready"
        );

        let websocket = WebSocketServer::new(
            Listener::from_tcp(websocket, self.config.server.max_websocket_connections),
            broadcast,
        );
        let websocket_task = tokio::spawn(websocket.run(shutdown.signalled()));

        let result = match self.server_tls {
            None => serve_plain(primary, self.router, shutdown, grace).await,
            Some(tls) => serve_tls(primary, tls, self.router, shutdown, grace).await,
        };

        websocket_task.abort();
        tracing::info!("HTTP server stopped");
        result
    }
}

/// Proxy root, with `/_ui` and `/_api` as fixed children.
fn build_router(config: &FrontdoorConfig, root: ProxyNode, api: ApplicationBridge) -> Router {
    Router::new()
        .nest_service("/_ui", ServeDir::new(&config.server.static_dir))
        .nest_service("/_api", api.into_router())
        .fallback(proxy_handler)
        .with_state(Arc::new(root))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), RequestIdGenerator))
}

async fn proxy_handler(State(root): State<Arc<ProxyNode>>, request: Request<Body>) -> Response {
    let node = root.resolve(request.uri().path());
    node.handle(request).await
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: &Shutdown,
    grace: Duration,
) -> Result<(), StartupError> {
    let signalled = shutdown.signalled();
    let serving = async move { axum::serve(listener, router).with_graceful_shutdown(signalled).await };
    let deadline = shutdown.signalled();

    tokio::select! {
        result = serving => result?,
        _ = async move {
            deadline.await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, dropping open connections");
        }
    }
    Ok(())
}

async fn serve_tls(
    listener: TcpListener,
    tls: RustlsConfig,
    router: Router,
    shutdown: &Shutdown,
    grace: Duration,
) -> Result<(), StartupError> {
    let handle = axum_server::Handle::new();
    let signalled = shutdown.signalled();
    let trigger = handle.clone();
    tokio::spawn(async move {
        signalled.await;
        trigger.graceful_shutdown(Some(grace));
    });

    axum_server::from_tcp_rustls(listener.into_std()?, tls)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}
