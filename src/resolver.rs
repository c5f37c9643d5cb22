//! Fallback resolver.
//!
//! Mediates every collaborator call: candidate operations are tried in
//! priority order, failures are logged and skipped, and when nothing
//! produces data a deterministic fallback built from the phase arguments
//! is returned instead.

use crate::collaborators::Capability;
use crate::error::OrchestratorError;
use crate::models::{is_truthy, Phase, PhaseOutput, PhaseStatus};
use serde::Serialize;
use crate::pipeline::context::RunContext;
use crate::registry::{CollaboratorHandle, CollaboratorRegistry};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a caller asks the resolver for.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Label used in logs: the phase key, or `report`.
    pub step: &'static str,
    /// Arguments handed to every candidate operation.
    pub args: Value,
    /// Key under which a non-object result is stored.
    pub result_key: &'static str,
    /// Deterministic substitute data, derived from `args` only.
    pub fallback: Map<String, Value>,
}

/// One collaborator and its candidate operations, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink {
    pub collaborator: &'static str,
    pub operations: &'static [&'static str],
}

impl ChainLink {
    pub const fn new(collaborator: &'static str, operations: &'static [&'static str]) -> Self {
        Self {
            collaborator,
            operations,
        }
    }
}

/// Outcome of a resolution, before it is attached to a phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub status: PhaseStatus,
    /// `collaborator.operation` that produced the data.
    pub source: Option<String>,
    pub data: Map<String, Value>,
}

impl Resolution {
    fn substitute(status: PhaseStatus, request: &ResolveRequest) -> Self {
        Self {
            status,
            source: None,
            data: request.fallback.clone(),
        }
    }

    pub fn is_real(&self) -> bool {
        self.status.is_real()
    }

    pub fn into_output(self, phase: Phase) -> PhaseOutput {
        match (self.status, self.source) {
            (PhaseStatus::Success, Some(source)) => PhaseOutput::success(phase, source, self.data),
            (status, source) => PhaseOutput {
                source,
                ..PhaseOutput::new(phase, status, self.data)
            },
        }
    }
}

enum Attempt {
    Produced(Value),
    Empty,
    Failed(OrchestratorError),
}

/// Resolves phases against the collaborator registry.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    registry: Arc<CollaboratorRegistry>,
}

impl FallbackResolver {
    pub fn new(registry: Arc<CollaboratorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CollaboratorRegistry {
        &self.registry
    }

    /// Try `candidates` against a single handle.
    pub async fn resolve(
        &self,
        handle: Option<&CollaboratorHandle>,
        candidates: &[&str],
        request: &ResolveRequest,
        ctx: &RunContext,
    ) -> Resolution {
        let Some((name, capability)) = handle.and_then(|h| h.capability().map(|c| (&h.name, c)))
        else {
            debug!(step = request.step, "Collaborator unavailable, using fallback");
            return Resolution::substitute(PhaseStatus::Unavailable, request);
        };

        match self
            .try_candidates(name, capability.as_ref(), candidates, request, ctx)
            .await
        {
            Some(output) => output,
            None => {
                warn!(
                    step = request.step,
                    "No operation of {} produced data, using fallback", name
                );
                Resolution::substitute(PhaseStatus::Fallback, request)
            }
        }
    }

    /// Try several collaborators in priority order.
    ///
    /// Yields `unavailable` when no collaborator in the chain is available,
    /// `fallback` when at least one was available but none produced data.
    pub async fn resolve_chain(
        &self,
        chain: &[ChainLink],
        request: &ResolveRequest,
        ctx: &RunContext,
    ) -> Resolution {
        let mut any_available = false;

        for link in chain {
            let Some(handle) = self.registry.get(link.collaborator) else {
                continue;
            };
            let Some(capability) = handle.capability() else {
                continue;
            };
            any_available = true;

            if let Some(output) = self
                .try_candidates(&handle.name, capability.as_ref(), link.operations, request, ctx)
                .await
            {
                return output;
            }
        }

        let status = if any_available {
            PhaseStatus::Fallback
        } else {
            PhaseStatus::Unavailable
        };
        debug!(step = request.step, %status, "Chain exhausted");
        Resolution::substitute(status, request)
    }

    async fn try_candidates(
        &self,
        name: &str,
        capability: &dyn Capability,
        candidates: &[&str],
        request: &ResolveRequest,
        ctx: &RunContext,
    ) -> Option<Resolution> {
        for operation in candidates {
            if !capability.supports(operation) {
                debug!(collaborator = name, operation, "Operation not exposed, skipping");
                continue;
            }

            let op_id = format!("{}.{}", name, operation);
            let Some(_token) = ctx.guard.try_enter(&op_id) else {
                warn!(
                    operation = %op_id,
                    depth = ctx.guard.depth(&op_id),
                    max_depth = ctx.guard.max_depth(),
                    "Recursion prevented"
                );
                ctx.note_recursion_prevented();
                continue;
            };

            match self.attempt(name, capability, operation, request, ctx).await {
                Attempt::Produced(value) => {
                    info!(step = request.step, operation = %op_id, "Collaborator returned data");
                    return Some(Resolution {
                        status: PhaseStatus::Success,
                        data: wrap_result(value, request.result_key),
                        source: Some(op_id),
                    });
                }
                Attempt::Empty => {
                    debug!(operation = %op_id, "Empty result, trying next candidate");
                }
                Attempt::Failed(e) => {
                    warn!("{}", e);
                }
            }
        }

        None
    }

    async fn attempt(
        &self,
        name: &str,
        capability: &dyn Capability,
        operation: &str,
        request: &ResolveRequest,
        ctx: &RunContext,
    ) -> Attempt {
        let failed = |reason: String| {
            Attempt::Failed(OrchestratorError::OperationFailed {
                collaborator: name.to_string(),
                operation: operation.to_string(),
                reason,
            })
        };

        let call = AssertUnwindSafe(capability.invoke(operation, &request.args)).catch_unwind();
        let outcome = match ctx.operation_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => return failed(format!("timed out after {:?}", deadline)),
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(value)) => {
                if let Some(status) = reported_failure(&value) {
                    return failed(format!("collaborator reported status '{}'", status));
                }
                if is_truthy(&value) {
                    Attempt::Produced(value)
                } else {
                    Attempt::Empty
                }
            }
            Ok(Err(e)) => failed(format!("{:#}", e)),
            Err(_) => failed("operation panicked".to_string()),
        }
    }
}

/// A collaborator may tag its own result with a non-success status.
fn reported_failure(value: &Value) -> Option<&str> {
    value
        .get("status")
        .and_then(Value::as_str)
        .filter(|s| *s != "success")
}

/// Objects become the phase data directly; anything else is stored under `key`.
fn wrap_result(value: Value, key: &str) -> Map<String, Value> {
    match value {
        Value::Object(mut map) => {
            map.remove("status");
            map
        }
        other => {
            let mut map = Map::new();
            map.insert(key.to_string(), other);
            map
        }
    }
}
