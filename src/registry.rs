//! # Route Registry Module
//!
//! Declarative registration: a [`RouteManifest`] lists paths and the name of
//! the factory serving each one, and [`register_manifest`] binds them through
//! any [`DispatchManager`].
//!
//! ## Manifest Format
//!
//! YAML (`.yaml`/`.yml`) or TOML (`.toml`), chosen by file extension:
//!
//! ```yaml
//! routes:
//!   - path: "/files*"
//!     handler: files
//!   - path: "/jobs"
//!     handler: jobs
//!     kind: pooled
//!     capacity: 8
//!     populate: lazy
//! ```
//!
//! A route naming a handler that is not in the [`FactoryRegistry`] still
//! binds its path, as a degraded registration answering with an
//! `InitializationFailed` error handler. One bad entry never aborts the batch.

use crate::config::DispatchConfig;
use crate::dispatcher::DispatchManager;
use crate::error::DispatchError;
use crate::pool::{HandlerFactory, Populate, Registration};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Pool discipline as written in a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    #[default]
    Singleton,
    Pooled,
}

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub path: String,
    /// Name looked up in the [`FactoryRegistry`]
    pub handler: String,
    #[serde(default)]
    pub kind: RouteKind,
    /// FIFO capacity; falls back to `DispatchConfig::default_capacity`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    /// Falls back to `DispatchConfig::populate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populate: Option<Populate>,
    #[serde(default)]
    pub force: bool,
}

/// A list of routes to register together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteManifest {
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

impl RouteManifest {
    /// Load a manifest, picking the parser from the file extension
    pub fn load(path: &Path) -> Result<Self, DispatchError> {
        let source_path = path.display().to_string();
        let manifest_error = |message: String| DispatchError::Manifest {
            source_path: source_path.clone(),
            message,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let manifest = match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&contents),
            Some("toml") => Self::from_toml_str(&contents),
            other => Err(format!(
                "unsupported manifest extension {:?}; expected yaml, yml or toml",
                other.unwrap_or("")
            )),
        }
        .map_err(manifest_error)?;

        info!(
            manifest = %source_path,
            routes = manifest.routes.len(),
            "Route manifest loaded"
        );
        Ok(manifest)
    }

    /// Parse a YAML manifest
    pub fn from_yaml_str(contents: &str) -> Result<Self, String> {
        serde_yaml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Parse a TOML manifest
    pub fn from_toml_str(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Named handler factories that manifest entries refer to
pub struct FactoryRegistry<H> {
    factories: HashMap<String, Arc<dyn HandlerFactory<H>>>,
}

impl<H> Default for FactoryRegistry<H> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<H> FactoryRegistry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the factory called `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: HandlerFactory<H> + 'static,
    {
        self.insert_shared(name, Arc::new(factory))
    }

    pub fn insert_shared(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HandlerFactory<H>>,
    ) -> &mut Self {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!(handler = %name, "Handler factory replaced");
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn HandlerFactory<H>>> {
        self.factories.get(name).map(Arc::clone)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered factory names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// What [`register_manifest`] did with each route
#[derive(Debug, Default)]
pub struct ManifestReport {
    /// Paths bound to a working pool
    pub registered: Vec<String>,
    /// Paths bound to an error handler because their factory was unknown
    pub degraded: Vec<String>,
    /// Paths the manager refused, with the reason
    pub rejected: Vec<(String, DispatchError)>,
}

impl ManifestReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.degraded.is_empty() && self.rejected.is_empty()
    }
}

/// Turn one manifest entry into a registration
#[must_use]
pub fn route_registration<H: 'static>(
    route: &RouteSpec,
    factories: &FactoryRegistry<H>,
    config: &DispatchConfig,
) -> Registration<H> {
    let registration = match factories.get(&route.handler) {
        Some(factory) => Registration::from_factory(route.path.as_str(), factory),
        None => {
            let name = route.handler.clone();
            Registration::factory(
                route.path.as_str(),
                move |_path: &str| -> anyhow::Result<H> {
                    Err(anyhow::anyhow!("no handler factory named '{}'", name))
                },
            )
        }
    };

    let registration = match route.kind {
        RouteKind::Singleton => registration,
        RouteKind::Pooled => {
            registration.pooled(route.capacity.unwrap_or(config.default_capacity))
        }
    };

    registration
        .populate(route.populate.unwrap_or(config.populate))
        .force(route.force)
}

/// Register every route of `manifest` with `manager`
///
/// Unknown handler names are bound eagerly as degraded paths, whatever the
/// entry's populate mode, so the failure shows up at registration time.
pub fn register_manifest<H: 'static>(
    manager: &dyn DispatchManager<H>,
    manifest: &RouteManifest,
    factories: &FactoryRegistry<H>,
    config: &DispatchConfig,
) -> ManifestReport {
    let mut report = ManifestReport::default();

    for route in &manifest.routes {
        let known = factories.contains(&route.handler);
        let mut registration = route_registration(route, factories, config);
        if !known {
            error!(
                path = %route.path,
                handler = %route.handler,
                "Unknown handler factory; registering degraded path"
            );
            registration = registration.populate(Populate::Eager);
        }

        match manager.register(registration) {
            Ok(()) if known => report.registered.push(route.path.clone()),
            Ok(()) => report.degraded.push(route.path.clone()),
            Err(e) => {
                warn!(path = %route.path, error = %e, "Manifest route rejected");
                report.rejected.push((route.path.clone(), e));
            }
        }
    }

    info!(
        registered = report.registered.len(),
        degraded = report.degraded.len(),
        rejected = report.rejected.len(),
        "Route manifest applied"
    );
    report
}
