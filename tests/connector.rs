use host_hijack::connector::HijackConnector;
use host_hijack::error::{HijackError, hijack_cause};
use host_hijack::mapping::{MappingConfig, SharedMapping};
use host_hijack::metrics::AgentStats;
use hyper::Uri;
use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower_service::Service;

/// Base connector that records the URIs it is asked to connect to
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Uri>>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Uri> {
        self.seen.lock().unwrap().clone()
    }
}

impl Service<Uri> for Recorder {
    type Response = Uri;
    type Error = Infallible;
    type Future = Ready<Result<Uri, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        self.seen.lock().unwrap().push(dst.clone());
        ready(Ok(dst))
    }
}

fn connector_with(
    mapping: MappingConfig,
) -> (HijackConnector<Recorder>, Recorder, Arc<AgentStats>) {
    let recorder = Recorder::default();
    let stats = Arc::new(AgentStats::new());
    let connector = HijackConnector::new(
        recorder.clone(),
        SharedMapping::new(Some(mapping)),
        Arc::clone(&stats),
    );
    (connector, recorder, stats)
}

fn uri(s: &str) -> Uri {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_redirects_host_and_keeps_port() {
    let (mut connector, recorder, stats) =
        connector_with(MappingConfig::from([("alpha.test", "beta.test")]));

    let connected = connector.call(uri("http://alpha.test:8080/")).await.unwrap();

    assert_eq!(connected, uri("http://beta.test:8080/"));
    assert_eq!(recorder.seen(), vec![uri("http://beta.test:8080/")]);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.connections, 1);
    assert_eq!(snapshot.hijacked, 1);
}

#[tokio::test]
async fn test_redirect_without_explicit_port() {
    let (mut connector, _, _) =
        connector_with(MappingConfig::from([("alpha.test", "beta.test")]));

    let connected = connector.call(uri("https://alpha.test/")).await.unwrap();
    assert_eq!(connected.host(), Some("beta.test"));
    assert_eq!(connected.port_u16(), None);
    assert_eq!(connected.scheme_str(), Some("https"));
}

#[tokio::test]
async fn test_redirect_keeps_path_and_query() {
    let (connector, _, _) = connector_with(MappingConfig::from([("alpha.test", "beta.test")]));

    let target = connector
        .redirect(&uri("http://alpha.test/some/path?q=1"))
        .unwrap();
    assert_eq!(target, uri("http://beta.test/some/path?q=1"));
}

#[tokio::test]
async fn test_unmatched_host_passes_through() {
    let (mut connector, recorder, stats) =
        connector_with(MappingConfig::from([("alpha.test", "beta.test")]));

    let connected = connector.call(uri("http://gamma.test:81/")).await.unwrap();

    assert_eq!(connected, uri("http://gamma.test:81/"));
    assert_eq!(recorder.seen().len(), 1);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.passthrough, 1);
    assert_eq!(snapshot.hijacked, 0);
}

#[tokio::test]
async fn test_ipv6_replacement_is_bracketed() {
    let (connector, _, _) = connector_with(MappingConfig::from([("alpha.test", "::1")]));

    let target = connector.redirect(&uri("http://alpha.test:8080/")).unwrap();
    assert_eq!(target, uri("http://[::1]:8080/"));
}

#[tokio::test]
async fn test_ipv6_original_is_looked_up_without_brackets() {
    let (connector, _, _) = connector_with(MappingConfig::from([("::1", "beta.test")]));

    let target = connector.redirect(&uri("http://[::1]:8080/")).unwrap();
    assert_eq!(target, uri("http://beta.test:8080/"));
}

#[tokio::test]
async fn test_resolver_error_aborts_before_connecting() {
    let (mut connector, recorder, stats) = connector_with(MappingConfig::try_function(|_| {
        Err("lookup table offline".into())
    }));

    let err = connector.call(uri("http://alpha.test/")).await.unwrap_err();

    assert!(recorder.seen().is_empty());
    let cause = hijack_cause(&*err).expect("resolver error in chain");
    assert!(matches!(cause, HijackError::Resolver { host, .. } if host == "alpha.test"));
    assert_eq!(stats.snapshot().resolver_errors, 1);
}

#[tokio::test]
async fn test_invalid_replacement_host() {
    let (mut connector, recorder, _) =
        connector_with(MappingConfig::function(|_| Some("bad host!".to_string())));

    let err = connector.call(uri("http://alpha.test/")).await.unwrap_err();

    assert!(recorder.seen().is_empty());
    let cause = hijack_cause(&*err).unwrap();
    assert!(matches!(
        cause,
        HijackError::InvalidHost { replacement, .. } if replacement == "bad host!"
    ));
}

#[tokio::test]
async fn test_inert_connector_never_rewrites() {
    let recorder = Recorder::default();
    let mut connector = HijackConnector::inert(recorder.clone());
    assert!(connector.is_inert());

    let connected = connector.call(uri("http://alpha.test/")).await.unwrap();
    assert_eq!(connected, uri("http://alpha.test/"));
}

#[tokio::test]
async fn test_mapping_change_applies_to_next_connection() {
    let recorder = Recorder::default();
    let mapping = SharedMapping::default();
    let mut connector = HijackConnector::new(
        recorder.clone(),
        mapping.clone(),
        Arc::new(AgentStats::new()),
    );

    connector.call(uri("http://alpha.test/")).await.unwrap();
    mapping.set(Some(MappingConfig::from([("alpha.test", "beta.test")])));
    connector.call(uri("http://alpha.test/")).await.unwrap();

    assert_eq!(
        recorder.seen(),
        vec![uri("http://alpha.test/"), uri("http://beta.test/")]
    );
}
