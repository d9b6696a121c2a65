//! Wrapp Named DI resolves producers registered under string keys.
//!
//! Every producer declares its parameters by name. Resolving a key resolves
//! the producers named by its parameters first, then calls it with their
//! values. Results are memoized, so each producer runs at most once.
//!
//! The crate is split into three parts:
//! 1. [Producer]: Classes, closures and functions with a declared parameter list
//! 2. [Container]: Registers producers and values and resolves them
//! 3. [import]: Registers the exports of files found by glob patterns
//!
//! # Examples
//!
//! ```rust
//! use wrapp_named_di::{ArgError, Container, Parameter, Producer};
//!
//! let mut container = Container::new();
//! container.literal("host", "localhost".to_string()).unwrap();
//! container.literal("port", 8080_u16).unwrap();
//! container
//!     .register(
//!         "address",
//!         Producer::closure([Parameter::fields(["host", "port"])], |args| {
//!             let group = args.group(0)?;
//!             let host = group.get_as::<String>("host")?;
//!             let port = group.get_as::<u16>("port")?;
//!             Ok::<_, ArgError>(format!("{host}:{port}"))
//!         }),
//!     )
//!     .unwrap();
//!
//! let address = futures::executor::block_on(container.get_as::<String>("address")).unwrap();
//! assert_eq!(*address, "localhost:8080");
//! ```

pub mod container;
pub mod dynamic;
pub mod errors;
pub mod import;
pub mod producer;
pub mod registry;
pub mod resolver;
pub mod signature;
pub mod types;

pub use container::{Container, INVOKE_KEY};
pub use dynamic::Argument;
pub use errors::{ArgError, ContainerError, ResolveError, SignatureError};
pub use import::{
    ImportLoader, ImportOptions, JsonModuleSource, Module, ModuleSource, RegisterExports,
    RegisterLiterals,
};
pub use producer::{
    Args, Class, Export, FieldBinding, Group, Object, Param, Parameter, Produced, Producer,
};
pub use resolver::{PendingValue, Resolution, Resolver};
pub use signature::{Category, DependencyRef, Signature};
pub use types::{DynError, Injectable, Instance, TypeInfo};
