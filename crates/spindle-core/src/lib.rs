//! # Spindle Core
//!
//! The data model and execution substrate of the Spindle dispatch engine.
//!
//! ## Layers
//!
//! ### Foundation
//!
//! What every dispatch stage works on:
//! - **Request / Response**: the immutable inbound [`Request`] and the
//!   [`Response`] under construction, with its committed flag
//! - **Context**: per-request [`RequestContext`] and [`DispatchStage`]
//! - **Descriptors**: [`HandlerMethod`] and [`Param`], built once at startup
//! - **Entities**: per-request [`RequestEntity`] / [`ResponseEntity`]
//! - **Values**: type-erased [`Value`] and the [`HandledValue`] tri-state
//! - **Ordering**: the total `(order, registration)` order of plug-ins
//!
//! ### Scheduler
//!
//! Named worker pools ([`Scheduler`]) with bounded, direct hand-off or
//! unbounded queues, timeouts, and rejection reporting.
//!
//! ### Errors
//!
//! The [`DispatchError`] taxonomy and its status mapping.
//!
//! ```text
//!  transport ──▶ Dispatcher ──▶ Route Table
//!                    │
//!                    ▼
//!               Scheduler ──▶ resolvers ──▶ handler ──▶ resolvers ──▶ Response
//!                    │                                     │
//!                    └────────────▶ Exception Chain ◀──────┘
//! ```

pub mod error;
pub mod foundation;
pub mod scheduler;

pub use error::{
    BoxError, DispatchError, DispatchResult, HttpError, MismatchReason, Rejection,
    RejectionReason, ResolveError,
};
pub use foundation::{
    DispatchStage, HandledValue, HandlerMethod, MediaType, Metadata, Param, ParamSource, ParamSpec,
    PathMatch, Request, RequestContext, RequestEntity, RequestSignature, Response, ResponseEntity,
    TypeInfo, Value,
};
pub use scheduler::{
    QueueKind, RequestTask, Scheduler, SchedulerConfig, Schedulers, TaskError, TaskHandle,
};

pub use bytes::Bytes;
pub use futures::future::BoxFuture;
pub use http;

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::*;
    pub use super::foundation::*;
    pub use super::scheduler::{
        QueueKind, RequestTask, Scheduler, SchedulerConfig, Schedulers, TaskError,
    };
}
