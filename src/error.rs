/// Error types for host hijacking
use thiserror::Error;

/// Boxed error used at the connector boundary, matching hyper-util's connect errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for hijacking agent operations
#[derive(Error, Debug)]
pub enum HijackError {
    /// The mapping function failed while resolving a host
    #[error("Domain resolver failed for host {host}: {source}")]
    Resolver {
        host: String,
        #[source]
        source: BoxError,
    },

    /// The replacement host cannot be used as a URI authority.
    ///
    /// This is the only failure the hijacking layer adds to the base
    /// connector's own errors: a replacement has to become part of a `Uri`
    /// before any socket is opened, and `Uri` rejects a malformed authority.
    #[error("Invalid replacement host {replacement} for {original}: {reason}")]
    InvalidHost {
        original: String,
        replacement: String,
        reason: String,
    },

    /// Request URI carries no host to resolve
    #[error("Request URI has no host: {uri}")]
    MissingHost { uri: String },

    /// Request URI could not be parsed or rebuilt
    #[error("Invalid request URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Scheme other than http or https
    #[error("Unsupported scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate errors
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Errors from the underlying client stack (refused, DNS, TLS handshake)
    #[error("Upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// Response body errors
    #[error("Failed to read response body: {0}")]
    Body(#[from] hyper::Error),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Certificate-related errors
#[derive(Error, Debug)]
pub enum CertificateError {
    /// Certificate file not found
    #[error("Certificate file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load certificate
    #[error("Failed to load certificate from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// PEM file parsed but held no certificates
    #[error("No certificates found in {path}")]
    NoCertificates { path: String },
}

/// Result type alias for convenience
pub type HijackResult<T> = Result<T, HijackError>;

/// Find the [`HijackError`] that aborted a connection, if any.
///
/// Connector failures travel through hyper-util as boxed sources, so a
/// request error has to be unwound to see whether the resolver, rather
/// than the network, stopped it.
///
/// # Example
///
/// ```rust
/// use host_hijack::error::{HijackError, hijack_cause};
///
/// let err = HijackError::MissingHost { uri: "/".to_string() };
/// assert!(hijack_cause(&err).is_some());
/// ```
pub fn hijack_cause<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a HijackError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(hijack) = e.downcast_ref::<HijackError>() {
            match hijack {
                // The transport error wraps the real cause, keep unwinding
                HijackError::Request(_) => {}
                _ => return Some(hijack),
            }
        }
        current = e.source();
    }
    None
}
