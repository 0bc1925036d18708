//! Context creation and request scoping.

use super::context::ClsContext;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// How request ids are produced for new contexts.
#[derive(Clone, Default)]
pub enum IdGenerator {
    /// Random UUID v4.
    #[default]
    Uuid,
    /// Random UUID v4 (simple form) behind a fixed prefix, e.g. `req_<hex>`.
    Prefixed(String),
    /// Caller-supplied generator.
    Custom(Arc<dyn Fn() -> String + Send + Sync>),
}

impl IdGenerator {
    pub fn generate(&self) -> String {
        match self {
            Self::Uuid => uuid::Uuid::new_v4().to_string(),
            Self::Prefixed(prefix) => format!("{}{}", prefix, uuid::Uuid::new_v4().simple()),
            Self::Custom(generator) => generator(),
        }
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid => write!(f, "Uuid"),
            Self::Prefixed(prefix) => f.debug_tuple("Prefixed").field(prefix).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Options for the CLS service.
#[derive(Debug, Clone, Default)]
pub struct ClsOptions {
    pub id_generator: IdGenerator,
}

impl ClsOptions {
    pub fn with_id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }
}

/// Creates request contexts.
#[derive(Debug, Clone, Default)]
pub struct ClsService {
    options: ClsOptions,
}

impl ClsService {
    pub fn new(options: ClsOptions) -> Self {
        Self { options }
    }

    /// A fresh, empty context with a newly generated id.
    pub fn enter(&self) -> ClsContext {
        ClsContext::new(self.options.id_generator.generate())
    }

    /// Run `f` inside a fresh context.
    pub async fn run<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(ClsContext) -> Fut,
        Fut: Future<Output = T>,
    {
        self.run_with(self.enter(), f).await
    }

    /// Run `f` inside an existing context, e.g. one handed over from another task.
    pub async fn run_with<F, Fut, T>(&self, ctx: ClsContext, f: F) -> T
    where
        F: FnOnce(ClsContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let span = tracing::debug_span!("cls", request_id = %ctx.id());
        f(ctx).instrument(span).await
    }
}
