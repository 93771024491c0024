//! Tool handlers
//!
//! Each backend family contributes a list of [`Operation`] descriptors and
//! owns one [`ConfirmationTracker`] built from its destructive set.

pub mod container_ops;
pub mod network_ops;
pub mod vm_ops;

use crate::confirmation::ConfirmationTracker;
use crate::gate::{Operation, Params};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Bind an action function to its backend
fn bind<B, F, Fut>(backend: &Arc<B>, f: F) -> impl Fn(Params) -> Fut + Send + Sync + 'static
where
    B: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<B>, Params) -> Fut + Send + Sync + 'static,
{
    let backend = backend.clone();
    move |params| f(backend.clone(), params)
}

/// Operations of one backend family and their confirmation tracker
#[derive(Debug)]
pub struct OperationFamily {
    pub name: &'static str,
    pub tracker: ConfirmationTracker,
    pub operations: Vec<Operation>,
}

impl OperationFamily {
    pub fn new(name: &'static str, tracker: ConfirmationTracker, operations: Vec<Operation>) -> Self {
        for destructive in tracker.destructive_operations() {
            if !operations.iter().any(|op| op.name == destructive) {
                warn!(
                    family = name,
                    operation = destructive,
                    "Destructive operation is not provided by this family"
                );
            }
        }
        Self {
            name,
            tracker,
            operations,
        }
    }

    /// Whether `op` requires confirmation in this family
    pub fn is_destructive(&self, op: &Operation) -> bool {
        self.tracker.needs_confirmation(op.name)
    }
}

/// Lookup table across all families
#[derive(Debug, Default)]
pub struct OperationRegistry {
    families: Vec<OperationFamily>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a family; operations whose name is already registered are dropped
    pub fn register(&mut self, mut family: OperationFamily) {
        let mut seen: HashSet<&'static str> = self
            .families
            .iter()
            .flat_map(|f| f.operations.iter().map(|op| op.name))
            .collect();

        family.operations.retain(|op| {
            let fresh = seen.insert(op.name);
            if !fresh {
                warn!(operation = op.name, family = family.name, "Duplicate operation ignored");
            }
            fresh
        });
        self.families.push(family);
    }

    pub fn with(mut self, family: OperationFamily) -> Self {
        self.register(family);
        self
    }

    /// Find an operation by tool name
    pub fn find(&self, name: &str) -> Option<(&OperationFamily, &Operation)> {
        self.families.iter().find_map(|family| {
            family
                .operations
                .iter()
                .find(|op| op.name == name)
                .map(|op| (family, op))
        })
    }

    /// All operations with their family, in registration order
    pub fn operations(&self) -> impl Iterator<Item = (&OperationFamily, &Operation)> {
        self.families
            .iter()
            .flat_map(|family| family.operations.iter().map(move |op| (family, op)))
    }

    pub fn families(&self) -> &[OperationFamily] {
        &self.families
    }
}
