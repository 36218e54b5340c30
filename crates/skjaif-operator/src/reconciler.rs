//! Drives stored `SvartSkjaif` objects towards their [`NormalizedFields`].
//!
//! A single invocation of [`Reconciler::reconcile`] moves one object through
//! the following states:
//!
//! ```text
//! Observed ──► Evaluated ──► Converged
//!    ▲             │
//!    │             ▼
//!    └──(retry)── Corrected (single conditional write)
//! ```
//!
//! The write is conditioned on the resource version read in `Observed`. A
//! conflicting write sends the invocation back to `Observed` right away, a
//! transient store failure does the same after a delay chosen by the
//! [`BackoffPolicy`]. Both are bounded by [`RetryLimits`]. Permanent failures
//! are returned to the caller without retrying.
use std::{pin::pin, sync::Arc};

use futures::{Stream, StreamExt};
use skjaif_crd::{SchemaRegistry, v1beta1::SvartSkjaif};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use strum::{EnumDiscriminants, IntoStaticStr};
use tokio::sync::watch;
use tracing::instrument;

use crate::{
    backoff::{BackoffPolicy, ExponentialBackoff},
    normalize::{Correction, NormalizedFields},
    store::{ObjectIdentity, ObjectStore, StoreError, WatchEvent},
};

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;
pub const DEFAULT_MAX_TRANSIENT_RETRIES: u32 = 5;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("gave up on {identity} after {retries} conflicting writes"))]
    ConflictRetriesExhausted {
        source: StoreError,
        identity: ObjectIdentity,
        retries: u32,
    },

    #[snafu(display("gave up on {identity} after {retries} transient store failures"))]
    TransientRetriesExhausted {
        source: StoreError,
        identity: ObjectIdentity,
        retries: u32,
    },

    #[snafu(display("failed to fetch {identity}"))]
    FetchObject {
        source: StoreError,
        identity: ObjectIdentity,
    },

    #[snafu(display("failed to write corrections to {identity}"))]
    WriteObject {
        source: StoreError,
        identity: ObjectIdentity,
    },

    #[snafu(display("{identity} disappeared after it was fetched"))]
    ObjectVanished { identity: ObjectIdentity },

    #[snafu(display("{identity} has no resource version, refusing to write unconditionally"))]
    MissingResourceVersion { identity: ObjectIdentity },
}

impl Error {
    pub fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}

/// The result of a successful reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The object already had the normalized values, nothing was written.
    Converged,

    /// The listed corrections were written in a single update.
    Corrected { corrections: Vec<Correction> },

    /// The object did not exist (anymore) when it was fetched.
    NotFound,

    /// The invocation was cancelled before it wrote anything.
    Cancelled,
}

/// Upper bounds for the retries of a single invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryLimits {
    pub max_conflict_retries: u32,
    pub max_transient_retries: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            max_transient_retries: DEFAULT_MAX_TRANSIENT_RETRIES,
        }
    }
}

/// Cooperative cancellation shared between the reconciler and its owner.
///
/// Clones observe the same state. Once cancelled, it stays cancelled.
#[derive(Clone, Debug)]
pub struct Cancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes once [`Self::cancel`] has been called on any clone.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();

        async move {
            // The sender lives as long as any clone of this handle, which
            // includes `self`
            receiver.wait_for(|cancelled| *cancelled).await.ok();
        }
    }
}

/// The result of reconciling the identity of a single watch event.
#[derive(Debug)]
pub struct Report {
    pub event: WatchEvent,
    pub result: Result<Outcome>,
}

pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
    registry: Arc<SchemaRegistry>,
    normalized: NormalizedFields,
    limits: RetryLimits,
    backoff: Arc<dyn BackoffPolicy>,
}

impl<S> Reconciler<S>
where
    S: ObjectStore + ?Sized,
{
    /// Creates a reconciler enforcing the default [`NormalizedFields`] with
    /// the default [`RetryLimits`] and an [`ExponentialBackoff`].
    pub fn new(store: Arc<S>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            store,
            registry,
            normalized: NormalizedFields::default(),
            limits: RetryLimits::default(),
            backoff: Arc::new(ExponentialBackoff::default()),
        }
    }

    pub fn with_normalized(mut self, normalized: NormalizedFields) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn with_retry_limits(mut self, limits: RetryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn normalized(&self) -> &NormalizedFields {
        &self.normalized
    }

    /// Reconciles the object identified by `identity`.
    ///
    /// At most one successful write happens per invocation. No write happens
    /// once `cancellation` is cancelled.
    #[instrument(skip_all, fields(object = %identity))]
    pub async fn reconcile(
        &self,
        identity: &ObjectIdentity,
        cancellation: &Cancellation,
    ) -> Result<Outcome> {
        let mut conflicts = 0;
        let mut transient_failures = 0;
        let mut fetched = false;

        loop {
            if cancellation.is_cancelled() {
                tracing::info!("reconciliation cancelled before fetching object");
                return Ok(Outcome::Cancelled);
            }

            let object = match self.store.get(identity).await {
                Ok(Some(object)) => object,
                Ok(None) | Err(StoreError::NotFound { .. }) => {
                    ensure!(!fetched, ObjectVanishedSnafu { identity: identity.clone() });
                    tracing::debug!("object does not exist, nothing to reconcile");
                    return Ok(Outcome::NotFound);
                }
                Err(source @ StoreError::Transient { .. }) => {
                    transient_failures += 1;
                    if !self.back_off(identity, source, transient_failures, cancellation).await? {
                        return Ok(Outcome::Cancelled);
                    }
                    continue;
                }
                Err(source) => {
                    return Err(source).context(FetchObjectSnafu { identity: identity.clone() });
                }
            };
            fetched = true;

            let expected_version = object
                .metadata
                .resource_version
                .clone()
                .context(MissingResourceVersionSnafu { identity: identity.clone() })?;

            let corrections = self.normalized.evaluate(&self.registry, &object.spec);
            if corrections.is_empty() {
                tracing::debug!("object has converged");
                return Ok(Outcome::Converged);
            }

            let corrected = apply_corrections(object, &corrections);

            if cancellation.is_cancelled() {
                tracing::info!("reconciliation cancelled before writing corrections");
                return Ok(Outcome::Cancelled);
            }

            match self.store.update(&corrected, &expected_version).await {
                Ok(_) => {
                    tracing::info!(corrections = corrections.len(), "wrote normalized spec");
                    return Ok(Outcome::Corrected { corrections });
                }
                Err(source @ StoreError::Conflict { .. }) => {
                    conflicts += 1;
                    if conflicts > self.limits.max_conflict_retries {
                        return Err(source).context(ConflictRetriesExhaustedSnafu {
                            identity: identity.clone(),
                            retries: self.limits.max_conflict_retries,
                        });
                    }

                    tracing::debug!(
                        conflicts,
                        error = &source as &dyn std::error::Error,
                        "object was modified concurrently, fetching it again"
                    );
                }
                Err(source @ StoreError::Transient { .. }) => {
                    transient_failures += 1;
                    if !self.back_off(identity, source, transient_failures, cancellation).await? {
                        return Ok(Outcome::Cancelled);
                    }
                }
                Err(StoreError::NotFound { .. }) => {
                    return ObjectVanishedSnafu { identity: identity.clone() }.fail();
                }
                Err(source) => {
                    return Err(source).context(WriteObjectSnafu { identity: identity.clone() });
                }
            }
        }
    }

    /// Sleeps before retry number `attempt` after a transient failure.
    ///
    /// Returns `false` if the invocation was cancelled while waiting.
    async fn back_off(
        &self,
        identity: &ObjectIdentity,
        source: StoreError,
        attempt: u32,
        cancellation: &Cancellation,
    ) -> Result<bool> {
        if attempt > self.limits.max_transient_retries {
            return Err(source).context(TransientRetriesExhaustedSnafu {
                identity: identity.clone(),
                retries: self.limits.max_transient_retries,
            });
        }

        let delay = self.backoff.delay(attempt);
        tracing::warn!(
            attempt,
            delay = %humantime::format_duration(delay),
            error = &source as &dyn std::error::Error,
            "transient store failure, retrying after delay"
        );

        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                tracing::info!("reconciliation cancelled while backing off");
                Ok(false)
            }
            () = tokio::time::sleep(delay) => Ok(true),
        }
    }

    /// Reconciles the identities of `events` one after another, skipping
    /// events rejected by `predicate`, and hands every [`Report`] to `report`.
    ///
    /// Stops when the stream ends or `cancellation` is cancelled, so it can
    /// run for the lifetime of an endless stream such as
    /// [`ObjectStore::watch`]. Failed reconciliations are reported and do not
    /// stop the loop, errors of the stream itself are logged and skipped.
    #[instrument(skip_all)]
    pub async fn drive<E, P, R>(
        &self,
        events: E,
        mut predicate: P,
        mut report: R,
        cancellation: &Cancellation,
    ) where
        E: Stream<Item = Result<WatchEvent, StoreError>>,
        P: FnMut(&WatchEvent) -> bool,
        R: FnMut(Report),
    {
        let mut events = pin!(events);

        loop {
            let event = tokio::select! {
                biased;
                () = cancellation.cancelled() => break,
                event = events.next() => event,
            };

            let event = match event {
                Some(Ok(event)) => event,
                Some(Err(error)) => {
                    tracing::warn!(
                        error = &error as &dyn std::error::Error,
                        "failed to receive watch event"
                    );
                    continue;
                }
                None => break,
            };

            if !predicate(&event) {
                tracing::trace!(object = %event.identity, kind = %event.kind, "skipping event");
                continue;
            }

            let result = self.reconcile(&event.identity, cancellation).await;
            match &result {
                Ok(outcome) => tracing::debug!(object = %event.identity, ?outcome, "reconciled object"),
                Err(error) => tracing::error!(
                    object = %event.identity,
                    error = error as &dyn std::error::Error,
                    "failed to reconcile object"
                ),
            }

            report(Report { event, result });
        }
    }
}

/// Applies `corrections` to the working copy `object`, logging each of them.
fn apply_corrections(mut object: SvartSkjaif, corrections: &[Correction]) -> SvartSkjaif {
    for correction in corrections {
        tracing::info!(
            field = %correction.field,
            observed = %correction.observed,
            normalized = %correction.normalized,
            "normalizing field"
        );
        correction.apply(&mut object.spec);
    }

    tracing::info!(
        kaffe = %object.spec.kaffe,
        kopp = %object.spec.kopp,
        vann = %object.spec.vann,
        "final spec state"
    );

    object
}
