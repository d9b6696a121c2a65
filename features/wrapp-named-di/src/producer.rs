use std::{fmt::Debug, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    errors::{ArgError, SignatureError},
    types::{DynError, Injectable, Instance},
};

/// A declared formal parameter of a producer
///
/// Dependencies are declared, not inferred: the parameter list is what the
/// signature extractor turns into a [DependencySpec](crate::signature::DependencySpec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    /// Injects the value registered under this name
    Named(String),
    /// Injects a [Group] built from the source names of the bindings
    Pattern(Vec<FieldBinding>),
    /// A parameter with a default value - not injected
    Defaulted(String),
    /// A rest parameter - not injected
    Rest(String),
}
impl Parameter {
    pub fn named(name: impl Into<String>) -> Self {
        Parameter::Named(name.into())
    }

    /// Pattern binding each name without renaming
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Parameter::Pattern(names.into_iter().map(FieldBinding::new).collect())
    }

    pub fn pattern(bindings: impl IntoIterator<Item = FieldBinding>) -> Self {
        Parameter::Pattern(bindings.into_iter().collect())
    }

    pub fn defaulted(name: impl Into<String>) -> Self {
        Parameter::Defaulted(name.into())
    }

    pub fn rest(name: impl Into<String>) -> Self {
        Parameter::Rest(name.into())
    }
}
impl From<&str> for Parameter {
    fn from(name: &str) -> Self {
        Parameter::named(name)
    }
}
impl From<String> for Parameter {
    fn from(name: String) -> Self {
        Parameter::Named(name)
    }
}

/// One field of a [Parameter::Pattern], optionally bound to a local alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub source: String,
    pub alias: Option<String>,
}
impl FieldBinding {
    pub fn new(source: impl Into<String>) -> Self {
        FieldBinding {
            source: source.into(),
            alias: None,
        }
    }

    pub fn aliased(source: impl Into<String>, alias: impl Into<String>) -> Self {
        FieldBinding {
            source: source.into(),
            alias: Some(alias.into()),
        }
    }
}

/// Anything usable as a parameter list
///
/// `()` declares no parameters.
pub trait IntoParameters {
    fn into_parameters(self) -> Vec<Parameter>;
}
impl IntoParameters for () {
    fn into_parameters(self) -> Vec<Parameter> {
        Vec::new()
    }
}
impl<S: Into<Parameter>> IntoParameters for Vec<S> {
    fn into_parameters(self) -> Vec<Parameter> {
        self.into_iter().map(Into::into).collect()
    }
}
impl<S: Into<Parameter>, const N: usize> IntoParameters for [S; N] {
    fn into_parameters(self) -> Vec<Parameter> {
        self.into_iter().map(Into::into).collect()
    }
}

/// A single resolved parameter handed to a producer
#[derive(Debug, Clone)]
pub enum Param {
    Value(Instance),
    Group(Group),
}

/// Record of named values built for a [Parameter::Pattern]
///
/// Fields keep declaration order.
#[derive(Debug, Clone, Default)]
pub struct Group {
    fields: Vec<(String, Instance)>,
}
impl Group {
    pub(crate) fn from_fields(fields: Vec<(String, Instance)>) -> Self {
        Group { fields }
    }

    pub fn get(&self, name: &str) -> Result<&Instance, ArgError> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, instance)| instance)
            .ok_or_else(|| ArgError::MissingField(name.to_string()))
    }

    pub fn get_as<T: Injectable>(&self, name: &str) -> Result<Arc<T>, ArgError> {
        downcast_arg(self.get(name)?)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(field, _)| field.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Resolved parameters in declaration order
#[derive(Debug, Clone, Default)]
pub struct Args {
    params: Vec<Param>,
}
impl Args {
    pub(crate) fn new(params: Vec<Param>) -> Self {
        Args { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn param(&self, position: usize) -> Result<&Param, ArgError> {
        self.params.get(position).ok_or(ArgError::Missing(position))
    }

    /// The raw value at `position`
    pub fn instance(&self, position: usize) -> Result<&Instance, ArgError> {
        match self.param(position)? {
            Param::Value(instance) => Ok(instance),
            Param::Group(_) => Err(ArgError::NotAValue(position)),
        }
    }

    /// The value at `position`, downcast to `T`
    pub fn get<T: Injectable>(&self, position: usize) -> Result<Arc<T>, ArgError> {
        downcast_arg(self.instance(position)?)
    }

    pub fn group(&self, position: usize) -> Result<&Group, ArgError> {
        match self.param(position)? {
            Param::Group(group) => Ok(group),
            Param::Value(_) => Err(ArgError::NotAGroup(position)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }
}

fn downcast_arg<T: Injectable>(instance: &Instance) -> Result<Arc<T>, ArgError> {
    instance
        .downcast()
        .map_err(|actual_type| ArgError::DowncastFailed {
            required_type: std::any::type_name::<T>(),
            actual_type,
        })
}

/// What invoking a producer yields - a value now, or one on a later turn
pub enum Produced {
    Ready(Instance),
    Pending(BoxFuture<'static, Result<Instance, DynError>>),
}
impl Debug for Produced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Produced::Ready(instance) => f.debug_tuple("Ready").field(instance).finish(),
            Produced::Pending(_) => f.write_str("Pending"),
        }
    }
}
impl Produced {
    fn pending<Fut, T, E>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        Produced::Pending(
            async move { future.await.map(Instance::new).map_err(Into::into) }.boxed(),
        )
    }
}

type ClassBody = Arc<dyn Fn(Args) -> Result<Instance, DynError> + Send + Sync>;
type ClosureBody = Arc<dyn Fn(Args) -> Result<Produced, DynError> + Send + Sync>;
type FunctionBody =
    Arc<dyn Fn(Args, Option<Instance>) -> Result<Produced, DynError> + Send + Sync>;

/// Explicit constructor of a [Class]
#[derive(Clone)]
pub struct Constructor {
    pub(crate) parameters: Vec<Parameter>,
    body: ClassBody,
}

/// Instance of a class whose chain declares no constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub class: String,
}

/// A class-like producer
///
/// Classes are always constructed, never called with a context. A class
/// without its own constructor inherits the nearest one up its parent chain.
#[derive(Clone)]
pub struct Class {
    name: String,
    constructor: Option<Constructor>,
    parent: Option<Arc<Class>>,
}
impl Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("constructor", &self.constructor.as_ref().map(|c| &c.parameters))
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .finish()
    }
}
impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Class {
            name: name.into(),
            constructor: None,
            parent: None,
        }
    }

    pub fn extends(mut self, parent: Arc<Class>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn constructor<F, T, E>(mut self, parameters: impl IntoParameters, body: F) -> Self
    where
        F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        self.constructor = Some(Constructor {
            parameters: parameters.into_parameters(),
            body: Arc::new(move |args| body(args).map(Instance::new).map_err(Into::into)),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Class>> {
        self.parent.as_ref()
    }

    /// First explicit constructor walking from this class to its ancestors
    pub fn nearest_constructor(&self) -> Option<&Constructor> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(constructor) = &current.constructor {
                return Some(constructor);
            }
            class = current.parent.as_deref();
        }
        None
    }

    pub(crate) fn construct(&self, args: Args) -> Result<Instance, DynError> {
        match self.nearest_constructor() {
            Some(constructor) => (constructor.body)(args),
            None => Ok(Instance::new(Object {
                class: self.name.clone(),
            })),
        }
    }
}

/// A function-like producer without a rebindable context
#[derive(Clone)]
pub struct Closure {
    pub(crate) parameters: Vec<Parameter>,
    body: ClosureBody,
}
impl Closure {
    pub(crate) fn call(&self, args: Args) -> Result<Produced, DynError> {
        (self.body)(args)
    }
}

/// A function-like producer that may be bound to a custom context
#[derive(Clone)]
pub struct Function {
    pub(crate) parameters: Vec<Parameter>,
    body: FunctionBody,
}
impl Function {
    pub(crate) fn call(&self, args: Args, context: Option<Instance>) -> Result<Produced, DynError> {
        (self.body)(args, context)
    }
}

/// An invocable producer with no declared parameter list
#[derive(Clone)]
pub struct Native {
    pub(crate) name: String,
    body: ClosureBody,
}
impl Native {
    pub(crate) fn call(&self, args: Args) -> Result<Produced, DynError> {
        (self.body)(args)
    }
}

/// A unit of computation yielding a value once its dependencies are resolved
#[derive(Clone)]
pub enum Producer {
    Class(Arc<Class>),
    Closure(Arc<Closure>),
    Function(Arc<Function>),
    Native(Arc<Native>),
}
impl Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Producer::Class(class) => class.fmt(f),
            Producer::Closure(closure) => f
                .debug_tuple("Closure")
                .field(&closure.parameters)
                .finish(),
            Producer::Function(function) => f
                .debug_tuple("Function")
                .field(&function.parameters)
                .finish(),
            Producer::Native(native) => f.debug_tuple("Native").field(&native.name).finish(),
        }
    }
}
impl From<Class> for Producer {
    fn from(class: Class) -> Self {
        Producer::Class(Arc::new(class))
    }
}
impl From<Arc<Class>> for Producer {
    fn from(class: Arc<Class>) -> Self {
        Producer::Class(class)
    }
}

impl Producer {
    pub fn class(class: Class) -> Self {
        class.into()
    }

    /// Synchronous closure - rejects a custom context
    pub fn closure<F, T, E>(parameters: impl IntoParameters, body: F) -> Self
    where
        F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        Producer::Closure(Arc::new(Closure {
            parameters: parameters.into_parameters(),
            body: Arc::new(move |args| {
                body(args)
                    .map(|value| Produced::Ready(Instance::new(value)))
                    .map_err(Into::into)
            }),
        }))
    }

    /// Asynchronous closure - rejects a custom context
    pub fn async_closure<F, Fut, T, E>(parameters: impl IntoParameters, body: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        Producer::Closure(Arc::new(Closure {
            parameters: parameters.into_parameters(),
            body: Arc::new(move |args| Ok(Produced::pending(body(args)))),
        }))
    }

    /// Synchronous function observing the optional invocation context
    pub fn function<F, T, E>(parameters: impl IntoParameters, body: F) -> Self
    where
        F: Fn(Args, Option<Instance>) -> Result<T, E> + Send + Sync + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        Producer::Function(Arc::new(Function {
            parameters: parameters.into_parameters(),
            body: Arc::new(move |args, context| {
                body(args, context)
                    .map(|value| Produced::Ready(Instance::new(value)))
                    .map_err(Into::into)
            }),
        }))
    }

    /// Asynchronous function observing the optional invocation context
    pub fn async_function<F, Fut, T, E>(parameters: impl IntoParameters, body: F) -> Self
    where
        F: Fn(Args, Option<Instance>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        Producer::Function(Arc::new(Function {
            parameters: parameters.into_parameters(),
            body: Arc::new(move |args, context| Ok(Produced::pending(body(args, context)))),
        }))
    }

    /// Invocable body without a declared parameter list
    ///
    /// Its dependencies cannot be extracted, so the container refuses it.
    pub fn native<F, T, E>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        Producer::Native(Arc::new(Native {
            name: name.into(),
            body: Arc::new(move |args| {
                body(args)
                    .map(|value| Produced::Ready(Instance::new(value)))
                    .map_err(Into::into)
            }),
        }))
    }

    /// Zero-dependency closure always yielding the same instance
    pub fn value(instance: Instance) -> Self {
        Producer::Closure(Arc::new(Closure {
            parameters: Vec::new(),
            body: Arc::new(move |_| Ok(Produced::Ready(instance.clone()))),
        }))
    }

    /// The declared parameter list - `None` for natives
    ///
    /// For classes this is the nearest constructor's list.
    pub fn parameters(&self) -> Option<&[Parameter]> {
        match self {
            Producer::Class(class) => Some(
                class
                    .nearest_constructor()
                    .map(|constructor| constructor.parameters.as_slice())
                    .unwrap_or_default(),
            ),
            Producer::Closure(closure) => Some(closure.parameters.as_slice()),
            Producer::Function(function) => Some(function.parameters.as_slice()),
            Producer::Native(_) => None,
        }
    }
}

/// Anything handed to the container from outside the typed surface
#[derive(Debug, Clone)]
pub enum Export {
    Producer(Producer),
    Value(Instance),
}
impl Export {
    /// The producer, or [SignatureError::NotCallable] for a plain value
    pub fn callable(&self) -> Result<&Producer, SignatureError> {
        match self {
            Export::Producer(producer) => Ok(producer),
            Export::Value(value) => Err(SignatureError::NotCallable(value.info.type_name)),
        }
    }
}
impl From<Producer> for Export {
    fn from(producer: Producer) -> Self {
        Export::Producer(producer)
    }
}
impl From<Instance> for Export {
    fn from(value: Instance) -> Self {
        Export::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[test]
    fn subclass_inherits_nearest_constructor() {
        let base = Arc::new(Class::new("Base").constructor(["a"], |args| {
            Ok::<_, ArgError>(*args.get::<u8>(0)? + 1)
        }));
        let middle = Arc::new(Class::new("Middle").extends(base));
        let leaf = Class::new("Leaf").extends(middle);

        let ctor = leaf.nearest_constructor().expect("inherited");
        assert_eq!(ctor.parameters, vec![Parameter::named("a")]);

        let built = leaf
            .construct(Args::new(vec![Param::Value(Instance::new(1_u8))]))
            .unwrap();
        assert_eq!(*built.downcast::<u8>().unwrap(), 2);
    }

    #[test]
    fn class_without_constructor_builds_bare_object() {
        let class = Class::new("Plain");
        let built = class.construct(Args::default()).unwrap();
        assert_eq!(
            *built.downcast::<Object>().unwrap(),
            Object {
                class: "Plain".to_string()
            }
        );
    }

    #[test]
    fn args_report_shape_mismatches() {
        let group = Group::from_fields(vec![("a".to_string(), Instance::new(1_i32))]);
        let args = Args::new(vec![Param::Value(Instance::new(1_i32)), Param::Group(group)]);

        assert_eq!(*args.get::<i32>(0).unwrap(), 1);
        assert_eq!(args.group(0).unwrap_err(), ArgError::NotAGroup(0));
        assert_eq!(args.instance(1).unwrap_err(), ArgError::NotAValue(1));
        assert_eq!(args.param(2).unwrap_err(), ArgError::Missing(2));
        assert_eq!(*args.group(1).unwrap().get_as::<i32>("a").unwrap(), 1);
        assert_eq!(
            args.group(1).unwrap().get("b").unwrap_err(),
            ArgError::MissingField("b".to_string())
        );
        assert!(matches!(
            args.get::<String>(0),
            Err(ArgError::DowncastFailed { actual_type: "i32", .. })
        ));
    }

    #[test]
    fn value_producer_yields_same_instance() {
        let instance = Instance::new("literal");
        let Producer::Closure(closure) = Producer::value(instance.clone()) else {
            panic!("literal must be a closure");
        };
        match closure.call(Args::default()).unwrap() {
            Produced::Ready(produced) => assert!(produced.ptr_eq(&instance)),
            Produced::Pending(_) => panic!("literal must be ready"),
        }
    }

    #[test]
    fn parameter_lists_from_mixed_inputs() {
        assert!(().into_parameters().is_empty());
        assert_eq!(
            vec!["a", "b"].into_parameters(),
            vec![Parameter::named("a"), Parameter::named("b")]
        );
        let producer = Producer::closure(
            [Parameter::named("a"), Parameter::fields(["b", "c"])],
            |_| Ok::<_, Infallible>(()),
        );
        assert_eq!(producer.parameters().map(<[Parameter]>::len), Some(2));
        assert!(Producer::native("n", |_| Ok::<_, Infallible>(()))
            .parameters()
            .is_none());
    }
}
