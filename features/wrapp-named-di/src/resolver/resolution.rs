use std::{fmt::Debug, future::IntoFuture};

use futures::{
    future::{self, BoxFuture, Shared},
    FutureExt,
};

use crate::{errors::ResolveError, types::Instance};

/// Handle to a computation still in flight
///
/// Every clone observes the same computation and its single result.
pub type PendingValue = Shared<BoxFuture<'static, Result<Instance, ResolveError>>>;

/// Outcome of a resolve call - available now or on a later turn
#[derive(Clone)]
pub enum Resolution {
    Ready(Instance),
    Pending(PendingValue),
}
impl Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Ready(instance) => f.debug_tuple("Ready").field(instance).finish(),
            Resolution::Pending(_) => f.write_str("Pending"),
        }
    }
}
impl Resolution {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending(_))
    }

    /// The value, if it was available synchronously
    pub fn ready(&self) -> Option<&Instance> {
        match self {
            Resolution::Ready(instance) => Some(instance),
            Resolution::Pending(_) => None,
        }
    }

    /// True if both are the same in-flight computation
    pub fn same_pending(&self, other: &Resolution) -> bool {
        match (self, other) {
            (Resolution::Pending(a), Resolution::Pending(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}
impl IntoFuture for Resolution {
    type Output = Result<Instance, ResolveError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Resolution::Ready(instance) => future::ready(Ok(instance)).boxed(),
            Resolution::Pending(pending) => pending.boxed(),
        }
    }
}
