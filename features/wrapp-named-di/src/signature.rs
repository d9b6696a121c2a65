//! Signature extraction
//!
//! Classifies a producer by how it is invoked and turns its declared
//! parameter list into the ordered dependency names the resolver requests.

use std::fmt::Display;

use crate::{
    errors::SignatureError,
    producer::{Export, Parameter, Producer},
};

/// How a producer is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Constructed, never given a context
    Class,
    /// Called, optionally bound to a context
    Function,
    /// Called, context rejected
    NoContextFunction,
}
impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Category::Class => "Class",
            Category::Function => "Function",
            Category::NoContextFunction => "Closure",
        })
    }
}

/// One injected parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
    Simple(String),
    Group(Vec<String>),
}
impl DependencyRef {
    pub fn names(&self) -> &[String] {
        match self {
            DependencyRef::Simple(name) => std::slice::from_ref(name),
            DependencyRef::Group(names) => names,
        }
    }
}

pub type DependencySpec = Vec<DependencyRef>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub category: Category,
    pub dependencies: DependencySpec,
}
impl Signature {
    pub fn of(producer: &Producer) -> Result<Signature, SignatureError> {
        let category = match producer {
            Producer::Class(_) => Category::Class,
            Producer::Function(_) => Category::Function,
            Producer::Closure(_) => Category::NoContextFunction,
            Producer::Native(native) => {
                return Err(SignatureError::UnsupportedNative(native.name.clone()))
            }
        };

        let dependencies = producer
            .parameters()
            .map(dependency_spec)
            .unwrap_or_default();

        Ok(Signature {
            category,
            dependencies,
        })
    }

    /// Every dependency name, groups flattened, first occurrence order
    pub fn dependency_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.dependencies.iter().flat_map(DependencyRef::names) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

/// Extracts the signature of anything handed to the container
pub fn extract(target: &Export) -> Result<Signature, SignatureError> {
    Signature::of(target.callable()?)
}

/// Maps declared parameters to dependency references
///
/// Defaulted and rest parameters are skipped, not rejected.
pub fn dependency_spec(parameters: &[Parameter]) -> DependencySpec {
    parameters
        .iter()
        .filter_map(|parameter| match parameter {
            Parameter::Named(name) => Some(DependencyRef::Simple(name.clone())),
            Parameter::Pattern(bindings) => {
                let mut names: Vec<String> = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    if !names.contains(&binding.source) {
                        names.push(binding.source.clone());
                    }
                }
                Some(DependencyRef::Group(names))
            }
            Parameter::Defaulted(name) | Parameter::Rest(name) => {
                tracing::trace!("Skipping non-injectable parameter '{name}'");
                None
            }
        })
        .collect()
}
