//! Untyped call surface
//!
//! Script bindings and module loaders hand the container positional argument
//! lists instead of typed calls. These are checked for arity and shape here
//! and then forwarded to the typed [Container] methods.

use crate::{
    container::Container,
    errors::ContainerError,
    producer::{Export, Producer},
    resolver::Resolution,
    types::Instance,
};

/// One positional argument
#[derive(Debug, Clone)]
pub enum Argument {
    Key(String),
    Export(Export),
    Mapping(Vec<(String, Export)>),
}
impl From<&str> for Argument {
    fn from(key: &str) -> Self {
        Argument::Key(key.to_string())
    }
}
impl From<Producer> for Argument {
    fn from(producer: Producer) -> Self {
        Argument::Export(Export::Producer(producer))
    }
}
impl From<Instance> for Argument {
    fn from(value: Instance) -> Self {
        Argument::Export(Export::Value(value))
    }
}
impl From<Export> for Argument {
    fn from(export: Export) -> Self {
        Argument::Export(export)
    }
}
impl From<Vec<(String, Export)>> for Argument {
    fn from(mapping: Vec<(String, Export)>) -> Self {
        Argument::Mapping(mapping)
    }
}

/// Splits a list into one or two arguments
enum Arity {
    One(Argument),
    Two(Argument, Argument),
}
impl Arity {
    fn of(operation: &'static str, args: Vec<Argument>) -> Result<Arity, ContainerError> {
        let got = args.len();
        let mut args = args.into_iter();
        match (args.next(), args.next(), args.next()) {
            (Some(first), None, None) => Ok(Arity::One(first)),
            (Some(first), Some(second), None) => Ok(Arity::Two(first, second)),
            _ => Err(ContainerError::InvalidArity { operation, got }),
        }
    }
}

fn invalid(operation: &'static str, position: usize, expected: &'static str) -> ContainerError {
    ContainerError::InvalidArgument {
        operation,
        position,
        expected,
    }
}

/// The value an export stands for when it is used as data
pub(crate) fn into_value(export: Export) -> Instance {
    match export {
        Export::Value(value) => value,
        Export::Producer(producer) => Instance::new(producer),
    }
}

impl Container {
    /// `register(mapping)` or `register(key, producer)`
    pub fn register_args(&mut self, args: Vec<Argument>) -> Result<(), ContainerError> {
        const OPERATION: &str = "register";
        match Arity::of(OPERATION, args)? {
            Arity::One(Argument::Mapping(mapping)) => self.register_exports(mapping),
            Arity::One(_) => Err(invalid(OPERATION, 1, "a mapping of keys to producers")),
            Arity::Two(Argument::Key(key), Argument::Export(export)) => {
                self.register_exports([(key, export)])
            }
            Arity::Two(Argument::Key(_), _) => Err(invalid(OPERATION, 2, "a producer")),
            Arity::Two(_, _) => Err(invalid(OPERATION, 1, "a key")),
        }
    }

    /// `literal(mapping)` or `literal(key, value)`
    ///
    /// A producer handed over as a literal is stored as a value, not invoked.
    pub fn literal_args(&mut self, args: Vec<Argument>) -> Result<(), ContainerError> {
        const OPERATION: &str = "literal";
        match Arity::of(OPERATION, args)? {
            Arity::One(Argument::Mapping(mapping)) => self.literal_all(
                mapping
                    .into_iter()
                    .map(|(key, export)| (key, into_value(export))),
            ),
            Arity::One(_) => Err(invalid(OPERATION, 1, "a mapping of keys to values")),
            Arity::Two(Argument::Key(key), Argument::Export(export)) => {
                self.literal_all([(key, into_value(export))])
            }
            Arity::Two(Argument::Key(_), _) => Err(invalid(OPERATION, 2, "a value")),
            Arity::Two(_, _) => Err(invalid(OPERATION, 1, "a key")),
        }
    }

    /// `invoke(producer)` or `invoke(context, producer)`
    pub fn invoke_args(&self, args: Vec<Argument>) -> Result<Resolution, ContainerError> {
        const OPERATION: &str = "invoke";
        let (context, target) = match Arity::of(OPERATION, args)? {
            Arity::One(Argument::Export(target)) => (None, target),
            Arity::Two(Argument::Export(context), Argument::Export(target)) => {
                (Some(into_value(context)), target)
            }
            Arity::One(_) => return Err(invalid(OPERATION, 1, "a producer")),
            Arity::Two(Argument::Export(_), _) => return Err(invalid(OPERATION, 2, "a producer")),
            Arity::Two(_, _) => return Err(invalid(OPERATION, 1, "a context value")),
        };

        self.invoke_export(context, target)
    }
}
