//! Host mapping configuration and the domain resolver.
//!
//! A [`MappingConfig`] decides which hostnames are redirected. The variant is
//! fixed when the mapping is built; [`resolve`] then evaluates it uniformly
//! on every connection attempt without caching.

use crate::error::{BoxError, HijackError, HijackResult};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// A key-value store queried by exact hostname.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, host: &str) -> Option<String>;
}

impl KeyValueStore for BTreeMap<String, String> {
    fn get(&self, host: &str) -> Option<String> {
        BTreeMap::get(self, host).cloned()
    }
}

impl KeyValueStore for DashMap<String, String> {
    fn get(&self, host: &str) -> Option<String> {
        DashMap::get(self, host).map(|entry| entry.value().clone())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, host: &str) -> Option<String> {
        (**self).get(host)
    }
}

/// Signature of a resolver function mapping.
pub type ResolverFn = dyn Fn(&str) -> Result<Option<String>, BoxError> + Send + Sync;

/// Which hostnames redirect to which replacement hostnames
#[derive(Clone)]
pub enum MappingConfig {
    /// Exact-match static table
    Table(Arc<HashMap<String, String>>),
    /// Exact-match lookup in a caller-owned store
    Store(Arc<dyn KeyValueStore>),
    /// Evaluated on every connection attempt, never cached
    Function(Arc<ResolverFn>),
}

impl MappingConfig {
    /// Build a static table from `(host, replacement)` pairs
    pub fn table<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Table(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn store<S: KeyValueStore + 'static>(store: S) -> Self {
        Self::Store(Arc::new(store))
    }

    /// Wrap an infallible resolver function
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(move |host: &str| Ok(f(host))))
    }

    /// Wrap a resolver function whose errors abort the connection attempt
    pub fn try_function<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<Option<String>, BoxError> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// Look up the replacement for `host`, if any.
    pub fn lookup(&self, host: &str) -> Result<Option<String>, BoxError> {
        match self {
            Self::Table(table) => Ok(table.get(host).cloned()),
            Self::Store(store) => Ok(store.get(host)),
            Self::Function(f) => f(host),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Store(_) => "store",
            Self::Function(_) => "function",
        }
    }
}

impl fmt::Debug for MappingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(table) => f.debug_tuple("Table").field(table).finish(),
            Self::Store(_) => f.debug_tuple("Store").finish_non_exhaustive(),
            Self::Function(_) => f.debug_tuple("Function").finish_non_exhaustive(),
        }
    }
}

impl From<HashMap<String, String>> for MappingConfig {
    fn from(table: HashMap<String, String>) -> Self {
        Self::Table(Arc::new(table))
    }
}

impl From<BTreeMap<String, String>> for MappingConfig {
    fn from(store: BTreeMap<String, String>) -> Self {
        Self::store(store)
    }
}

impl From<Arc<DashMap<String, String>>> for MappingConfig {
    fn from(store: Arc<DashMap<String, String>>) -> Self {
        Self::Store(store)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for MappingConfig {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self::table(entries)
    }
}

/// Outcome of resolving one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedHost {
    /// No mapping applied, connect to the requested host
    Original(String),
    /// Connect to `replacement` instead of `original`
    Replaced { original: String, replacement: String },
}

impl ResolvedHost {
    /// Host the connection should physically go to
    pub fn host(&self) -> &str {
        match self {
            Self::Original(host) => host,
            Self::Replaced { replacement, .. } => replacement,
        }
    }

    pub fn original(&self) -> &str {
        match self {
            Self::Original(host) => host,
            Self::Replaced { original, .. } => original,
        }
    }

    pub fn is_hijacked(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

/// Resolve `host` against an optional mapping.
///
/// Without a mapping, or on a miss, the host comes back unchanged. A
/// function mapping that fails aborts with [`HijackError::Resolver`].
pub fn resolve(mapping: Option<&MappingConfig>, host: &str) -> HijackResult<ResolvedHost> {
    let Some(mapping) = mapping else {
        return Ok(ResolvedHost::Original(host.to_string()));
    };

    let replacement = mapping
        .lookup(host)
        .map_err(|source| HijackError::Resolver {
            host: host.to_string(),
            source,
        })?;

    match replacement {
        Some(replacement) if replacement != host => Ok(ResolvedHost::Replaced {
            original: host.to_string(),
            replacement,
        }),
        _ => {
            debug!("No {} mapping for host: {}", mapping.kind(), host);
            Ok(ResolvedHost::Original(host.to_string()))
        }
    }
}

/// Mapping slot shared between an agent and its connectors.
///
/// Assigning replaces the previous mapping wholesale. Readers take a cheap
/// clone and release the lock before evaluating it.
#[derive(Clone, Default)]
pub struct SharedMapping {
    slot: Arc<RwLock<Option<MappingConfig>>>,
}

impl SharedMapping {
    pub fn new(mapping: Option<MappingConfig>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(mapping)),
        }
    }

    pub fn set(&self, mapping: Option<MappingConfig>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = mapping;
    }

    pub fn get(&self) -> Option<MappingConfig> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve `host` against the mapping current at this instant
    pub fn resolve(&self, host: &str) -> HijackResult<ResolvedHost> {
        let mapping = self.get();
        resolve(mapping.as_ref(), host)
    }
}

impl fmt::Debug for SharedMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMapping")
            .field("mapping", &self.get())
            .finish()
    }
}
