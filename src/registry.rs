//! Collaborator registry.
//!
//! Built once at startup from probes that try to construct each optional
//! service. A failing probe never fails startup: the handle is recorded as
//! unavailable together with the reason, and one warning is logged.

use crate::collaborators::Capability;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// One optional service, immutable after registration.
#[derive(Clone)]
pub struct CollaboratorHandle {
    pub name: String,
    pub available: bool,
    pub instance: Option<Arc<dyn Capability>>,
    pub unavailable_reason: Option<String>,
}

impl CollaboratorHandle {
    pub fn available(name: &str, instance: Arc<dyn Capability>) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            instance: Some(instance),
            unavailable_reason: None,
        }
    }

    pub fn unavailable(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            available: false,
            instance: None,
            unavailable_reason: Some(reason.into()),
        }
    }

    /// The bound capability, only when available.
    pub fn capability(&self) -> Option<&Arc<dyn Capability>> {
        if self.available {
            self.instance.as_ref()
        } else {
            None
        }
    }
}

impl fmt::Debug for CollaboratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaboratorHandle")
            .field("name", &self.name)
            .field("available", &self.available)
            .field(
                "operations",
                &self.instance.as_ref().map(|i| i.operations().to_vec()),
            )
            .field("unavailable_reason", &self.unavailable_reason)
            .finish()
    }
}

/// Name → handle mapping.
#[derive(Debug, Default, Clone)]
pub struct CollaboratorRegistry {
    handles: BTreeMap<String, CollaboratorHandle>,
}

impl CollaboratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `probe` and record the outcome under `name`.
    pub async fn register<F>(&mut self, name: &str, probe: F) -> CollaboratorHandle
    where
        F: Future<Output = Result<Arc<dyn Capability>>>,
    {
        let handle = match probe.await {
            Ok(instance) => {
                info!("Collaborator {} available", name);
                CollaboratorHandle::available(name, instance)
            }
            Err(e) => {
                warn!("Collaborator {} unavailable: {:#}", name, e);
                CollaboratorHandle::unavailable(name, format!("{:#}", e))
            }
        };

        self.handles.insert(name.to_string(), handle.clone());
        handle
    }

    /// Register an already-constructed capability.
    pub fn insert(&mut self, name: &str, instance: Arc<dyn Capability>) -> CollaboratorHandle {
        let handle = CollaboratorHandle::available(name, instance);
        self.handles.insert(name.to_string(), handle.clone());
        handle
    }

    /// Record a collaborator as intentionally absent.
    pub fn register_absent(&mut self, name: &str, reason: &str) -> CollaboratorHandle {
        warn!("Collaborator {} unavailable: {}", name, reason);
        let handle = CollaboratorHandle::unavailable(name, reason);
        self.handles.insert(name.to_string(), handle.clone());
        handle
    }

    pub fn get(&self, name: &str) -> Option<&CollaboratorHandle> {
        self.handles.get(name)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.get(name).map(|h| h.available).unwrap_or(false)
    }

    pub fn handles(&self) -> impl Iterator<Item = &CollaboratorHandle> {
        self.handles.values()
    }

    pub fn available_count(&self) -> usize {
        self.handles.values().filter(|h| h.available).count()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}
