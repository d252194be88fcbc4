use crate::agent::{HijackingAgent, Transport};
use crate::error::{HijackError, HijackResult};
use crate::global;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Response, Uri};
use tracing::{debug, warn};

fn parse_uri(url: &str) -> HijackResult<Uri> {
    url.parse::<Uri>().map_err(|e| HijackError::InvalidUri {
        uri: url.to_string(),
        reason: e.to_string(),
    })
}

/// Collect a streamed response into memory
pub async fn read_body(resp: Response<Incoming>) -> HijackResult<Response<Bytes>> {
    let (parts, body) = resp.into_parts();
    let body_bytes = body.collect().await?.to_bytes();
    debug!("Response body size: {} bytes", body_bytes.len());
    Ok(Response::from_parts(parts, body_bytes))
}

/// GET `url` through an explicit agent and collect the body
pub async fn fetch_with<T: Transport>(
    agent: &HijackingAgent<T>,
    url: &str,
) -> HijackResult<Response<Bytes>> {
    let uri = parse_uri(url)?;
    debug!("Fetching {} via {} agent", uri, agent.scheme());

    let resp = agent.get(uri).await?;
    if !resp.status().is_success() {
        warn!("Non-success status {} from {}", resp.status(), url);
    }
    read_body(resp).await
}

/// GET `url` through the process-wide default agent for its scheme
pub async fn fetch(url: &str) -> HijackResult<Response<Bytes>> {
    let uri = parse_uri(url)?;
    match uri.scheme_str() {
        Some("http") => {
            let agent = global::http_agent();
            fetch_with(&*agent, url).await
        }
        Some("https") => {
            let agent = global::https_agent();
            fetch_with(&*agent, url).await
        }
        other => Err(HijackError::UnsupportedScheme {
            scheme: other.unwrap_or_default().to_string(),
        }),
    }
}
