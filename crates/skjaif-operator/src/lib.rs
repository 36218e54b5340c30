//! The reconciliation controller of the `SvartSkjaif` operator.
//!
//! The [`Reconciler`](reconciler::Reconciler) reads stored Hub objects
//! through an [`ObjectStore`](store::ObjectStore) and writes back the
//! [`NormalizedFields`](normalize::NormalizedFields) wherever an object has
//! drifted. [`controller::run`] hosts it in a Kubernetes controller, while
//! [`Reconciler::drive`](reconciler::Reconciler::drive) consumes any stream
//! of watch events, which is how the in-memory store is exercised in tests.
pub mod backoff;
pub mod cli;
pub mod controller;
pub mod logging;
pub mod normalize;
pub mod reconciler;
pub mod signal;
pub mod store;
