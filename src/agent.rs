//! Hijacking agents: pooled HTTP clients whose connector redirects hosts.
//!
//! [`HttpAgent`] and [`HttpsAgent`] share one implementation and differ only
//! in the connector stack their [`Transport`] builds. Pooling, keep-alive
//! and request scheduling are hyper-util's; only host selection at connect
//! time is changed.

use crate::connector::HijackConnector;
use crate::error::HijackResult;
use crate::mapping::{MappingConfig, SharedMapping};
use crate::metrics::{AgentStats, StatsSnapshot};
use crate::tls_utils;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Builder, Client};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Default keepalive timeout (60 seconds)
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connection timeout (10 seconds)
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default max idle connections per host
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 10;

/// Request body type accepted by agents
pub type Body = Full<Bytes>;

/// Which hostname the encrypted agent presents for SNI and verifies the
/// server certificate against when a connection is hijacked.
///
/// `Replacement` authenticates the server you are actually talking to, not
/// that it claims to be the original host. `Original` keeps the original
/// identity, so the replacement must hold a certificate for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyAgainst {
    #[default]
    Replacement,
    Original,
}

/// Base agent settings, passed through to the hyper-util client and connector.
///
/// The three tuning fields only shape the default client and TCP connector.
/// A caller-supplied `client` builder or `connector` is used as given, so
/// every setting hyper-util recognises stays reachable.
#[derive(Clone)]
pub struct AgentOptions {
    /// TCP keepalive and pool idle timeout
    pub keepalive_timeout: Duration,
    /// Connect timeout of the underlying TCP connector
    pub connection_timeout: Duration,
    /// Max idle pooled connections per host
    pub max_idle_connections: usize,
    pub verify_against: VerifyAgainst,
    /// TLS client config; native roots when unset
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
    /// Base client builder; replaces the pool defaults above when set
    pub client: Option<Builder>,
    /// Base TCP connector; replaces the keepalive and connect timeout above
    pub connector: Option<HttpConnector>,
}

impl AgentOptions {
    /// Use `builder` as the base client configuration
    pub fn with_client_builder(mut self, builder: Builder) -> Self {
        self.client = Some(builder);
        self
    }

    /// Use `connector` as the base TCP connector
    pub fn with_connector(mut self, connector: HttpConnector) -> Self {
        self.connector = Some(connector);
        self
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
            verify_against: VerifyAgainst::default(),
            tls_config: None,
            client: None,
            connector: None,
        }
    }
}

impl fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentOptions")
            .field("keepalive_timeout", &self.keepalive_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .field("max_idle_connections", &self.max_idle_connections)
            .field("verify_against", &self.verify_against)
            .field("custom_tls", &self.tls_config.is_some())
            .field("client", &self.client)
            .field("connector", &self.connector)
            .finish()
    }
}

/// Connector stack of an agent variant
pub trait Transport: Send + Sync + 'static {
    type Connector: Connect + Clone + Send + Sync + 'static;

    /// Scheme this transport serves
    const SCHEME: &'static str;

    fn connector(
        options: &AgentOptions,
        mapping: &SharedMapping,
        stats: &Arc<AgentStats>,
    ) -> Self::Connector;
}

/// Plaintext transport: TCP only
#[derive(Debug)]
pub struct Plain;

/// Encrypted transport: TCP wrapped in rustls
#[derive(Debug)]
pub struct Tls;

fn tcp_connector(options: &AgentOptions) -> HttpConnector {
    if let Some(connector) = &options.connector {
        return connector.clone();
    }

    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(options.keepalive_timeout));
    http_connector.set_connect_timeout(Some(options.connection_timeout));
    http_connector
}

impl Transport for Plain {
    type Connector = HijackConnector<HttpConnector>;

    const SCHEME: &'static str = "http";

    fn connector(
        options: &AgentOptions,
        mapping: &SharedMapping,
        stats: &Arc<AgentStats>,
    ) -> Self::Connector {
        HijackConnector::new(tcp_connector(options), mapping.clone(), Arc::clone(stats))
    }
}

impl Transport for Tls {
    type Connector = HijackConnector<HttpsConnector<HijackConnector<HttpConnector>>>;

    const SCHEME: &'static str = "https";

    /// Hijacking above TLS makes SNI and verification use the replacement
    /// host; hijacking below TLS only moves the TCP socket.
    fn connector(
        options: &AgentOptions,
        mapping: &SharedMapping,
        stats: &Arc<AgentStats>,
    ) -> Self::Connector {
        let mut http_connector = tcp_connector(options);
        http_connector.enforce_http(false);

        let mut tls_config = match &options.tls_config {
            Some(config) => config.as_ref().clone(),
            None => tls_utils::default_client_config(),
        };
        // hyper-rustls sets ALPN itself
        tls_config.alpn_protocols.clear();

        let hijack = |inner: HttpConnector| {
            HijackConnector::new(inner, mapping.clone(), Arc::clone(stats))
        };
        let below_tls = match options.verify_against {
            VerifyAgainst::Original => hijack(http_connector),
            VerifyAgainst::Replacement => HijackConnector::inert(http_connector),
        };

        let https_connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_only()
            .enable_all_versions()
            .wrap_connector(below_tls);

        match options.verify_against {
            VerifyAgainst::Replacement => {
                HijackConnector::new(https_connector, mapping.clone(), Arc::clone(stats))
            }
            VerifyAgainst::Original => HijackConnector::inert(https_connector),
        }
    }
}

/// Pooled client type of an agent
pub type AgentClient<T> = Client<<T as Transport>::Connector, Body>;

/// A pooled HTTP client that redirects new connections per its mapping
pub struct HijackingAgent<T: Transport> {
    options: AgentOptions,
    mapping: SharedMapping,
    stats: Arc<AgentStats>,
    connector: T::Connector,
    client: RwLock<AgentClient<T>>,
    _transport: PhantomData<T>,
}

/// Plaintext hijacking agent
pub type HttpAgent = HijackingAgent<Plain>;

/// Encrypted hijacking agent
pub type HttpsAgent = HijackingAgent<Tls>;

impl<T: Transport> HijackingAgent<T> {
    /// Create a passthrough agent with default options
    pub fn new() -> Self {
        Self::with_options(AgentOptions::default())
    }

    /// Create a passthrough agent with custom base-agent options
    pub fn with_options(options: AgentOptions) -> Self {
        let mapping = SharedMapping::default();
        let stats = Arc::new(AgentStats::new());
        let connector = T::connector(&options, &mapping, &stats);
        let client = Self::build_client(&options, connector.clone());

        Self {
            options,
            mapping,
            stats,
            connector,
            client: RwLock::new(client),
            _transport: PhantomData,
        }
    }

    /// Builder-style mapping assignment
    pub fn with_mapping(self, mapping: impl Into<MappingConfig>) -> Self {
        self.set_mapping(mapping);
        self
    }

    fn build_client(options: &AgentOptions, connector: T::Connector) -> AgentClient<T> {
        if let Some(builder) = &options.client {
            return builder.build(connector);
        }

        Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(options.max_idle_connections)
            .pool_idle_timeout(options.keepalive_timeout)
            .build(connector)
    }

    /// Replace the mapping.
    ///
    /// Idle pooled connections are dropped so the next request resolves
    /// against the new mapping. In-flight requests are unaffected.
    pub fn set_mapping(&self, mapping: impl Into<MappingConfig>) {
        self.mapping.set(Some(mapping.into()));
        self.reset_pool();
    }

    /// Disable hijacking; the agent becomes a passthrough agent
    pub fn clear_mapping(&self) {
        self.mapping.set(None);
        self.reset_pool();
    }

    pub fn mapping(&self) -> Option<MappingConfig> {
        self.mapping.get()
    }

    /// Start a fresh connection pool
    pub fn reset_pool(&self) {
        let client = Self::build_client(&self.options, self.connector.clone());
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = client;
        debug!("Connection pool reset for {} agent", T::SCHEME);
    }

    /// The pooled client, usable anywhere a hyper-util client is accepted
    pub fn client(&self) -> AgentClient<T> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn verify_against(&self) -> VerifyAgainst {
        self.options.verify_against
    }

    pub fn scheme(&self) -> &'static str {
        T::SCHEME
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Send a request through the agent's pool
    pub async fn request(&self, req: Request<Body>) -> HijackResult<Response<Incoming>> {
        let client = self.client();
        Ok(client.request(req).await?)
    }

    /// Send a GET request
    pub async fn get(&self, uri: Uri) -> HijackResult<Response<Incoming>> {
        let client = self.client();
        Ok(client.get(uri).await?)
    }
}

impl<T: Transport> Default for HijackingAgent<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> fmt::Debug for HijackingAgent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HijackingAgent")
            .field("scheme", &T::SCHEME)
            .field("options", &self.options)
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}
