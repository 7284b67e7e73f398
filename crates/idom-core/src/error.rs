use thiserror::Error;

use crate::NodeId;

/// Programmer mistakes. These are not meant to be handled: the panicking entry
/// points format them into the panic message, the `try_*` variants hand them
/// back so callers can assert on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("element `{key}` already has a skip handler; only one may be attached")]
    DuplicateSkipHandler { key: String },
    #[error("element `{key}` already has an after-patch handler; only one may be attached")]
    DuplicateAfterPatchHandler { key: String },
    #[error("logonly was requested but no logger is attached to the renderer")]
    LogOnlyWithoutLogger,
    #[error("cannot transition a {kind} renderer back to the default renderer")]
    NotWrapping { kind: &'static str },
    #[error("key stack discipline violated: {0}")]
    KeyDiscipline(#[from] KeyDisciplineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyDisciplineError {
    #[error("scope popped while {outstanding} call key(s) are still pushed")]
    ScopeWithOutstandingCalls { outstanding: usize },
    #[error("call key popped without a matching push")]
    UnmatchedCallPop,
    #[error("the root key scope cannot be popped")]
    RootScopePopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("a patch transaction is already open")]
    TransactionOpen,
    #[error("no patch transaction is open")]
    NoTransaction,
    #[error("node {id} missing")]
    Missing { id: NodeId },
    #[error("node {id} is detached from the host tree")]
    Detached { id: NodeId },
    #[error("{open} element(s) left open at the end of the patch")]
    Unbalanced { open: usize },
    #[error("element `{key}` has not been rendered into the host tree")]
    Unmounted { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("delegate `{name}` (variant `{variant}`) already registered at priority {priority}")]
    DuplicatePriority {
        name: String,
        variant: String,
        priority: i32,
    },
}
