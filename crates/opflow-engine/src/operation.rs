//! Operation and sequence descriptors.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use opflow_core::{Definition, Result};
use semver::Version;

use crate::bundle::Bundle;

/// Future returned by a handler.
pub type HandlerFuture<O> = BoxFuture<'static, Result<O>>;

type Handler<I, O, D> = Arc<dyn Fn(Bundle, D, I) -> HandlerFuture<O> + Send + Sync>;

/// Definition plus handler, shared by operations and sequences.
struct Unit<I, O, D> {
    def: Definition,
    handler: Handler<I, O, D>,
}

impl<I, O, D> Unit<I, O, D> {
    fn new<F, Fut>(def: Definition, handler: F) -> Self
    where
        I: 'static,
        O: 'static,
        D: 'static,
        F: Fn(Bundle, D, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self {
            def,
            handler: Arc::new(move |bundle, deps, input| handler(bundle, deps, input).boxed()),
        }
    }
}

impl<I, O, D> Clone for Unit<I, O, D> {
    fn clone(&self) -> Self {
        Self {
            def: self.def.clone(),
            handler: self.handler.clone(),
        }
    }
}

/// A named, versioned unit of work with a single handler.
///
/// Operations are built once and shared; cloning only bumps a reference count.
pub struct Operation<I, O, D> {
    unit: Unit<I, O, D>,
}

impl<I, O, D> Operation<I, O, D> {
    /// Create a new operation.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        version: Version,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        I: 'static,
        O: 'static,
        D: 'static,
        F: Fn(Bundle, D, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self {
            unit: Unit::new(Definition::new(name, version, description), handler),
        }
    }

    /// The operation's definition.
    pub fn def(&self) -> &Definition {
        &self.unit.def
    }

    pub(crate) fn handler(&self) -> &Handler<I, O, D> {
        &self.unit.handler
    }
}

impl<I, O, D> Clone for Operation<I, O, D> {
    fn clone(&self) -> Self {
        Self {
            unit: self.unit.clone(),
        }
    }
}

impl<I, O, D> fmt::Debug for Operation<I, O, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("def", &self.unit.def).finish()
    }
}

/// A named, versioned unit of work whose handler runs other operations and
/// sequences through the engine.
pub struct Sequence<I, O, D> {
    unit: Unit<I, O, D>,
}

impl<I, O, D> Sequence<I, O, D> {
    /// Create a new sequence.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        version: Version,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        I: 'static,
        O: 'static,
        D: 'static,
        F: Fn(Bundle, D, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self {
            unit: Unit::new(Definition::new(name, version, description), handler),
        }
    }

    /// The sequence's definition.
    pub fn def(&self) -> &Definition {
        &self.unit.def
    }

    pub(crate) fn handler(&self) -> &Handler<I, O, D> {
        &self.unit.handler
    }
}

impl<I, O, D> Clone for Sequence<I, O, D> {
    fn clone(&self) -> Self {
        Self {
            unit: self.unit.clone(),
        }
    }
}

impl<I, O, D> fmt::Debug for Sequence<I, O, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence").field("def", &self.unit.def).finish()
    }
}
