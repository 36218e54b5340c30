use async_trait::async_trait;
use futures::{StreamExt, future, stream::BoxStream};
use kube::{
    Api, Client,
    api::PostParams,
    runtime::{WatchStreamExt, watcher},
};
use skjaif_crd::v1beta1::SvartSkjaif;

use snafu::IntoError as _;

use super::{
    ConflictSnafu, NotFoundSnafu, ObjectIdentity, ObjectStore, PermanentSnafu, StoreError,
    TransientSnafu, WatchEvent, WatchSnafu,
};

/// An [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    watch_namespace: Option<String>,
}

impl KubeStore {
    /// Creates a store watching `watch_namespace`, or all namespaces if
    /// [`None`].
    pub fn new(client: Client, watch_namespace: Option<String>) -> Self {
        Self {
            client,
            watch_namespace,
        }
    }

    /// The API watched by this store, all reads and writes of the controller
    /// go through it as well.
    pub fn watched_api(&self) -> Api<SvartSkjaif> {
        match &self.watch_namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn api_for(&self, identity: &ObjectIdentity) -> Api<SvartSkjaif> {
        match &identity.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Maps an API error onto the store error classes the reconciler acts on.
fn classify(error: kube::Error, identity: &ObjectIdentity, expected_version: &str) -> StoreError {
    let identity = identity.clone();

    let code = match &error {
        kube::Error::Api(response) => response.code,
        // Anything not answered by the API server (connection resets,
        // timeouts, ...) may succeed when tried again
        _ => return TransientSnafu { identity }.into_error(Box::new(error)),
    };

    match code {
        404 => NotFoundSnafu { identity }.build(),
        409 => ConflictSnafu {
            identity,
            expected_version,
        }
        .build(),
        429 | 500.. => TransientSnafu { identity }.into_error(Box::new(error)),
        _ => PermanentSnafu { identity }.into_error(Box::new(error)),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, identity: &ObjectIdentity) -> Result<Option<SvartSkjaif>, StoreError> {
        self.api_for(identity)
            .get_opt(&identity.name)
            .await
            .map_err(|error| classify(error, identity, ""))
    }

    async fn update(
        &self,
        object: &SvartSkjaif,
        expected_version: &str,
    ) -> Result<SvartSkjaif, StoreError> {
        let identity = ObjectIdentity::of(object).ok_or_else(|| {
            PermanentSnafu {
                identity: ObjectIdentity {
                    namespace: object.metadata.namespace.clone(),
                    name: String::new(),
                },
            }
            .into_error("object has no name".into())
        })?;

        // The API server rejects the replace with 409 Conflict if the stored
        // resource version differs
        let mut object = object.clone();
        object.metadata.resource_version = Some(expected_version.to_owned());

        self.api_for(&identity)
            .replace(&identity.name, &PostParams::default(), &object)
            .await
            .map_err(|error| classify(error, &identity, expected_version))
    }

    fn watch(&self) -> BoxStream<'static, Result<WatchEvent, StoreError>> {
        watcher(self.watched_api(), watcher::Config::default())
            .default_backoff()
            .filter_map(|event| {
                future::ready(match event {
                    Ok(watcher::Event::Apply(object) | watcher::Event::InitApply(object)) => {
                        ObjectIdentity::of(&object).map(|identity| Ok(WatchEvent::applied(identity)))
                    }
                    Ok(watcher::Event::Delete(object)) => {
                        ObjectIdentity::of(&object).map(|identity| Ok(WatchEvent::deleted(identity)))
                    }
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
                    Err(error) => Some(Err(WatchSnafu.into_error(Box::new(error)))),
                })
            })
            .boxed()
    }
}
