//! Runs the [`Reconciler`] inside a Kubernetes controller.
//!
//! The [`kube::runtime::Controller`] watches the Hub API and makes sure no
//! two reconciliations of the same object run at the same time. Different
//! objects are reconciled concurrently.
use std::{sync::Arc, time::Duration};

use futures::{FutureExt, StreamExt};
use kube::{
    Resource,
    runtime::{
        Controller,
        controller::{self, Action},
        reflector::ObjectRef,
        watcher,
    },
};
use skjaif_crd::v1beta1::SvartSkjaif;
use snafu::{OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    reconciler::{self, Cancellation, Outcome, Reconciler},
    store::{KubeStore, ObjectIdentity},
};

pub const CONTROLLER_NAME: &str = "svartskjaif";

/// The delay after which an object whose reconciliation failed is retried.
pub const ERROR_REQUEUE_DELAY: Duration = Duration::from_secs(10);

/// [`std::error::Error`] extensions that help report reconciliation errors.
pub trait ReconcilerError: std::error::Error {
    /// `PascalCase`d name for the error category
    ///
    /// This can typically be implemented by delegating to
    /// [`strum::EnumDiscriminants`] and [`strum::IntoStaticStr`].
    fn category(&self) -> &'static str;
}

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("object has no name"))]
    ObjectHasNoName,

    #[snafu(display("failed to reconcile object"))]
    Reconcile { source: reconciler::Error },
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        match self {
            Self::Reconcile { source } => source.category(),
            _ => ErrorDiscriminants::from(self).into(),
        }
    }
}

pub struct Context {
    pub reconciler: Reconciler<KubeStore>,
    pub cancellation: Cancellation,
}

/// Runs the controller until `context.cancellation` is cancelled.
pub async fn run(context: Context) {
    let api = context.reconciler.store().watched_api();
    let shutdown = context.cancellation.cancelled().boxed().shared();

    Controller::new(api, watcher::Config::default())
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, Arc::new(context))
        .for_each(|result| async move {
            report_controller_reconciled(CONTROLLER_NAME, &result);
        })
        .await;
}

async fn reconcile(object: Arc<SvartSkjaif>, context: Arc<Context>) -> Result<Action, Error> {
    let identity = ObjectIdentity::of(&object).context(ObjectHasNoNameSnafu)?;

    let outcome = context
        .reconciler
        .reconcile(&identity, &context.cancellation)
        .await
        .context(ReconcileSnafu)?;

    if let Outcome::Corrected { corrections } = &outcome {
        // The write causes a watch event of its own, which triggers the next
        // reconciliation
        tracing::debug!(corrections = corrections.len(), "awaiting confirmation of corrections");
    }

    Ok(Action::await_change())
}

fn error_policy(_object: Arc<SvartSkjaif>, _error: &Error, _context: Arc<Context>) -> Action {
    Action::requeue(ERROR_REQUEUE_DELAY)
}

/// Reports the controller reconciliation result to the current
/// [`tracing::Subscriber`].
pub fn report_controller_reconciled<K, ReconcileErr, QueueErr>(
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<ReconcileErr, QueueErr>>,
) where
    K: Resource,
    ReconcileErr: ReconcilerError + 'static,
    QueueErr: std::error::Error + 'static,
{
    match result {
        Ok((object, _)) => {
            tracing::info!(
                controller.name = controller_name,
                object = %object,
                "reconciled object"
            );
        }
        Err(controller::Error::ReconcilerFailed(error, object)) => {
            tracing::error!(
                controller.name = controller_name,
                object = %object,
                error.category = error.category(),
                error = error as &dyn std::error::Error,
                "failed to reconcile object",
            );
        }
        Err(error) => {
            tracing::error!(
                controller.name = controller_name,
                error = error as &dyn std::error::Error,
                "failed to run reconciliation",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn category_delegates_to_reconciler_error() {
        let error = Error::Reconcile {
            source: reconciler::Error::ObjectVanished {
                identity: ObjectIdentity::new("kitchen", "morning"),
            },
        };
        assert_eq!(error.category(), "ObjectVanished");

        let error = Error::Reconcile {
            source: reconciler::Error::ConflictRetriesExhausted {
                source: StoreError::NotFound {
                    identity: ObjectIdentity::new("kitchen", "morning"),
                },
                identity: ObjectIdentity::new("kitchen", "morning"),
                retries: 5,
            },
        };
        assert_eq!(error.category(), "ConflictRetriesExhausted");

        assert_eq!(Error::ObjectHasNoName.category(), "ObjectHasNoName");
    }
}
