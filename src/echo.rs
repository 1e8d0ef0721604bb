use crate::registry::{FactoryRegistry, RouteManifest};
use serde_json::{json, Value};
use std::collections::BTreeSet;

// Example handler: reports which route and factory served a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoHandler {
    handler_name: String,
    route: String,
}

impl EchoHandler {
    #[must_use]
    pub fn new(handler_name: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
            route: route.into(),
        }
    }

    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    #[must_use]
    pub fn respond(&self, request_path: &str) -> Value {
        json!({
            "handler": self.handler_name,
            "route": self.route,
            "path": request_path,
        })
    }
}

/// An echo factory for every handler name the manifest mentions
#[must_use]
pub fn echo_factories(manifest: &RouteManifest) -> FactoryRegistry<EchoHandler> {
    let names: BTreeSet<&str> = manifest
        .routes
        .iter()
        .map(|route| route.handler.as_str())
        .collect();

    let mut factories = FactoryRegistry::new();
    for name in names {
        let handler_name = name.to_string();
        factories.register(name, move |route: &str| -> anyhow::Result<EchoHandler> {
            Ok(EchoHandler::new(handler_name.as_str(), route))
        });
    }
    factories
}
