//! Connector layer that swaps the destination host of new connections.
//!
//! [`HijackConnector`] wraps any hyper-util connector. The pooled client
//! calls it only when it needs a fresh connection, so the mapping is
//! evaluated once per physical socket, not once per request.

use crate::error::{BoxError, HijackError, HijackResult};
use crate::mapping::{ResolvedHost, SharedMapping};
use crate::metrics::AgentStats;
use hyper::Uri;
use hyper::http::uri::{Authority, PathAndQuery};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;
use tracing::{debug, info};

/// Future returned by [`HijackConnector`].
pub type Connecting<R> = Pin<Box<dyn Future<Output = Result<R, BoxError>> + Send>>;

/// Wraps a base connector and redirects it according to a shared mapping.
#[derive(Clone, Debug)]
pub struct HijackConnector<C> {
    inner: C,
    mapping: Option<SharedMapping>,
    stats: Arc<AgentStats>,
}

impl<C> HijackConnector<C> {
    pub fn new(inner: C, mapping: SharedMapping, stats: Arc<AgentStats>) -> Self {
        Self {
            inner,
            mapping: Some(mapping),
            stats,
        }
    }

    /// A connector that never rewrites.
    ///
    /// Used for the layer of a stacked connector that is not responsible
    /// for hijacking, so the mapping is consulted only once per connection.
    pub fn inert(inner: C) -> Self {
        Self {
            inner,
            mapping: None,
            stats: Arc::new(AgentStats::new()),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.mapping.is_none()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Compute the URI the base connector should be handed for `dst`.
    pub fn redirect(&self, dst: &Uri) -> HijackResult<Uri> {
        let Some(mapping) = &self.mapping else {
            return Ok(dst.clone());
        };

        let host = bare_host(dst)?;
        let resolved = match mapping.resolve(host) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.stats.record_resolver_error();
                return Err(e);
            }
        };

        match resolved {
            ResolvedHost::Original(_) => {
                self.stats.record_passthrough();
                debug!("Passthrough connection: {}", dst);
                Ok(dst.clone())
            }
            ResolvedHost::Replaced {
                original,
                replacement,
            } => {
                let target = replace_host(dst, &original, &replacement)?;
                self.stats.record_hijacked();
                info!("Hijacked connection: {} -> {}", dst, target);
                Ok(target)
            }
        }
    }
}

impl<C> Service<Uri> for HijackConnector<C>
where
    C: Service<Uri>,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Connecting<C::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::<BoxError>::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let target = match self.redirect(&dst) {
            Ok(target) => target,
            Err(e) => {
                let err: BoxError = e.into();
                return Box::pin(std::future::ready(Err::<C::Response, _>(err)));
            }
        };

        let connecting = self.inner.call(target);
        Box::pin(async move { connecting.await.map_err(Into::<BoxError>::into) })
    }
}

/// Host of `uri` as used for mapping lookups: no port, no IPv6 brackets
fn bare_host(uri: &Uri) -> HijackResult<&str> {
    let host = uri.host().ok_or_else(|| HijackError::MissingHost {
        uri: uri.to_string(),
    })?;
    Ok(host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host))
}

/// Rebuild `uri` with `replacement` as host, keeping scheme, port and path
fn replace_host(uri: &Uri, original: &str, replacement: &str) -> HijackResult<Uri> {
    let invalid = |reason: String| HijackError::InvalidHost {
        original: original.to_string(),
        replacement: replacement.to_string(),
        reason,
    };

    let host = if replacement.contains(':') && !replacement.starts_with('[') {
        format!("[{}]", replacement)
    } else {
        replacement.to_string()
    };
    let authority = match uri.port_u16() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    };
    let authority: Authority = authority.parse().map_err(|e| invalid(format!("{}", e)))?;

    let mut parts = uri.clone().into_parts();
    parts.authority = Some(authority);
    if parts.scheme.is_some() && parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts).map_err(|e| invalid(format!("{}", e)))
}
