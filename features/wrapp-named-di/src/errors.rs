use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::{signature::Category, types::DynError};

/// Errors while extracting the signature of a producer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// A plain value was handed over where a producer was expected
    #[error("Expected a producer, got a plain value of type '{0}'")]
    NotCallable(&'static str),
    /// The producer declares no parameter list to extract dependencies from
    #[error("Cannot extract dependencies from native producer '{0}'")]
    UnsupportedNative(String),
}

/// Errors while resolving a single registered producer
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// Resolving would revisit a producer already on the dependency path
    #[error("'{0}' has circular dependencies")]
    CircularDependency(String),
    /// A declared dependency has no producer
    #[error("'{dependency}' is not registered (required by '{required_by}')")]
    NotRegistered {
        dependency: String,
        required_by: String,
    },
    /// A custom invocation context was handed to a class or closure
    #[error("{category} '{key}' cannot be called with a custom context")]
    ContextNotAllowed { key: String, category: Category },
    /// The producer itself failed
    #[error("Producer for '{key}' failed - error: {error}")]
    ProducerFailed { key: String, error: Arc<DynError> },
}

/// Errors while reading resolved parameters inside a producer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("No parameter at position {0}")]
    Missing(usize),
    #[error("Parameter {0} is a group, not a single value")]
    NotAValue(usize),
    #[error("Parameter {0} is a single value, not a group")]
    NotAGroup(usize),
    #[error("Group has no field '{0}'")]
    MissingField(String),
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// Errors surfaced by the [Container](crate::container::Container)
#[derive(Error, Debug, Clone)]
pub enum ContainerError {
    #[error("Invalid key '{0}'")]
    InvalidKey(String),
    #[error("Error while registering key '{0}': Duplicate key")]
    DuplicateKey(String),
    #[error("Error while resolving '{0}': Not registered")]
    NotRegistered(String),
    #[error("Error while registering key '{0}': Producer has circular dependencies")]
    CircularDependency(String),
    #[error("Error while preparing '{key}': {source}")]
    NotCallable {
        key: String,
        #[source]
        source: SignatureError,
    },
    #[error("Error while preparing '{key}': {source}")]
    UnsupportedNative {
        key: String,
        #[source]
        source: SignatureError,
    },
    #[error("Expected 1 or 2 arguments for '{operation}'. Got {got}")]
    InvalidArity { operation: &'static str, got: usize },
    #[error("Argument {position} of '{operation}' must be {expected}")]
    InvalidArgument {
        operation: &'static str,
        position: usize,
        expected: &'static str,
    },
    #[error("Error while resolving '{key}': {source}")]
    ResolutionFailed {
        key: String,
        #[source]
        source: ResolveError,
    },
    #[error("'{key}' resolved to '{actual_type}', required '{required_type}'")]
    DowncastFailed {
        key: String,
        required_type: &'static str,
        actual_type: &'static str,
    },
    #[error("Invalid import: {0}")]
    InvalidImport(String),
    #[error("Failed to load module {}: {error}", .path.display())]
    ImportFailed { path: PathBuf, error: Arc<DynError> },
}

impl ContainerError {
    /// Attaches the key being registered to a signature failure
    pub(crate) fn from_signature(key: impl Into<String>, source: SignatureError) -> Self {
        let key = key.into();
        match source {
            SignatureError::NotCallable(_) => ContainerError::NotCallable { key, source },
            SignatureError::UnsupportedNative(_) => ContainerError::UnsupportedNative { key, source },
        }
    }

    pub(crate) fn resolution(key: impl Into<String>, source: ResolveError) -> Self {
        ContainerError::ResolutionFailed {
            key: key.into(),
            source,
        }
    }
}
