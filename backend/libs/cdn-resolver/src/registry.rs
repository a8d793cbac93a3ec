//! Static mapping from logical resource ids to their candidate origins.
//!
//! Built once at startup (in code or from a JSON manifest) and shared
//! read-only afterwards.

use crate::error::{ResolverError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Provider label reserved for the bundled local assets
pub const LOCAL_PROVIDER: &str = "local";

/// Placeholder substituted with the resource path in origin templates
pub const PATH_PLACEHOLDER: &str = "{path}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Font,
    Video,
    Style,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Font => "font",
            Self::Video => "video",
            Self::Style => "style",
        }
    }
}

/// One candidate location able to serve a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// Provider label, e.g. "jsdelivr", "github-pages" or "local"
    pub provider: String,
    /// Base URL, or a template containing `{path}`
    pub base_url: String,
}

impl Origin {
    pub fn new(provider: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into(),
        }
    }

    /// Local origin. `sub_path` is appended to the caller's local base path.
    pub fn local(sub_path: impl Into<String>) -> Self {
        Self::new(LOCAL_PROVIDER, sub_path)
    }

    pub fn is_local(&self) -> bool {
        self.provider == LOCAL_PROVIDER
    }

    /// Concrete URL of `path` on this origin
    pub fn url_for(&self, path: &str) -> String {
        if self.base_url.contains(PATH_PLACEHOLDER) {
            self.base_url
                .replace(PATH_PLACEHOLDER, path.trim_start_matches('/'))
        } else {
            join_url(&self.base_url, path)
        }
    }
}

/// Join two URL segments with exactly one `/` between them
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    match (base.is_empty(), path.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => format!("/{}", path),
        (false, false) => format!("{}/{}", base, path),
    }
}

/// A named asset and its candidate origins, in priority order.
///
/// Always carries exactly one local origin.
#[derive(Debug, Clone)]
pub struct LogicalResource {
    id: String,
    kind: ResourceKind,
    path: String,
    origins: Vec<Origin>,
    local_index: usize,
}

impl LogicalResource {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Path appended to each origin's base URL
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn origins(&self) -> &[Origin] {
        &self.origins
    }

    pub fn local_origin(&self) -> &Origin {
        &self.origins[self.local_index]
    }

    /// Remote origins in priority order
    pub fn remote_origins(&self) -> Vec<Origin> {
        self.origins
            .iter()
            .filter(|origin| !origin.is_local())
            .cloned()
            .collect()
    }

    /// URL of the bundled copy under `local_base_path`
    pub fn local_url(&self, local_base_path: &str) -> String {
        let base = join_url(local_base_path, &self.local_origin().base_url);
        join_url(&base, &self.path)
    }
}

/// Declarative form of one registration, as found in a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub id: String,
    pub kind: ResourceKind,
    /// Defaults to the id
    #[serde(default)]
    pub path: Option<String>,
    pub origins: Vec<Origin>,
}

/// JSON manifest listing every resource of a deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryManifest {
    pub resources: Vec<ResourceDefinition>,
}

impl RegistryManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ResolverError::config(format!("Invalid registry manifest: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ResolverError::config(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

/// Registry of logical resources keyed by id
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<LogicalResource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a manifest, stopping at the first invalid entry
    pub fn from_manifest(manifest: RegistryManifest) -> Result<Self> {
        let mut registry = Self::new();
        for definition in manifest.resources {
            registry.register_definition(definition)?;
        }

        info!("Resource registry loaded: {} resources", registry.len());
        Ok(registry)
    }

    /// Register a resource whose path equals its id
    pub fn register(
        &mut self,
        id: impl Into<String>,
        kind: ResourceKind,
        origins: Vec<Origin>,
    ) -> Result<()> {
        self.register_definition(ResourceDefinition {
            id: id.into(),
            kind,
            path: None,
            origins,
        })
    }

    pub fn register_definition(&mut self, definition: ResourceDefinition) -> Result<()> {
        let ResourceDefinition {
            id,
            kind,
            path,
            origins,
        } = definition;

        if id.trim().is_empty() {
            return Err(ResolverError::config("resource id must not be empty"));
        }
        if self.resources.contains_key(&id) {
            return Err(ResolverError::config(format!(
                "resource '{}' is already registered",
                id
            )));
        }
        if origins.is_empty() {
            return Err(ResolverError::config(format!(
                "resource '{}' has no origins",
                id
            )));
        }

        {
            let mut providers = HashSet::new();
            for origin in &origins {
                if !providers.insert(origin.provider.as_str()) {
                    return Err(ResolverError::config(format!(
                        "resource '{}' lists provider '{}' twice",
                        id, origin.provider
                    )));
                }
                if !origin.is_local() {
                    validate_remote_base(&id, origin)?;
                }
            }
        }

        let local_index = origins
            .iter()
            .position(Origin::is_local)
            .ok_or_else(|| {
                ResolverError::config(format!("resource '{}' has no local origin", id))
            })?;

        let path = path.unwrap_or_else(|| id.clone());
        debug!(
            resource = %id,
            kind = kind.as_str(),
            origins = origins.len(),
            "Registered resource"
        );

        self.resources.insert(
            id.clone(),
            Arc::new(LogicalResource {
                id,
                kind,
                path,
                origins,
                local_index,
            }),
        );
        Ok(())
    }

    /// Candidate origins for `id`, in priority order
    pub fn lookup(&self, id: &str) -> Result<&[Origin]> {
        self.resources
            .get(id)
            .map(|resource| resource.origins())
            .ok_or_else(|| ResolverError::not_found(id))
    }

    pub fn get(&self, id: &str) -> Result<Arc<LogicalResource>> {
        self.resources
            .get(id)
            .cloned()
            .ok_or_else(|| ResolverError::not_found(id))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.resources.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn validate_remote_base(id: &str, origin: &Origin) -> Result<()> {
    let probe_url = origin.url_for("probe");
    let parsed = url::Url::parse(&probe_url).map_err(|e| {
        ResolverError::config(format!(
            "resource '{}': origin '{}' has invalid base URL '{}': {}",
            id, origin.provider, origin.base_url, e
        ))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ResolverError::config(format!(
            "resource '{}': origin '{}' uses unsupported scheme '{}'",
            id, origin.provider, other
        ))),
    }
}
