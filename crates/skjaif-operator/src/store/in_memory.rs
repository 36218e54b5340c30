use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use skjaif_crd::v1beta1::SvartSkjaif;
use tokio::sync::{Mutex, broadcast};

use snafu::{IntoError as _, ensure};

use super::{
    ConflictSnafu, NotFoundSnafu, ObjectIdentity, ObjectStore, PermanentSnafu, StoreError,
    TransientSnafu, WatchEvent,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A fault the [`InMemoryStore`] injects into the next call to
/// [`ObjectStore::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateFault {
    /// Another writer modifies the object right before the update.
    Conflict,

    /// The update fails with [`StoreError::Transient`].
    Transient,

    /// The update fails with [`StoreError::Permanent`].
    Permanent,

    /// The object is deleted right before the update.
    Vanish,

    /// Another writer modifies the object right before the update and it is
    /// deleted right after the update was rejected.
    ConflictThenDelete,
}

/// A fault the [`InMemoryStore`] injects into the next call to
/// [`ObjectStore::get`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchFault {
    /// The read fails with [`StoreError::Transient`].
    Transient,

    /// The read fails with [`StoreError::Permanent`].
    Permanent,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectIdentity, SvartSkjaif>,
    last_resource_version: u64,
    writes: usize,
    faults: VecDeque<UpdateFault>,
    fetch_faults: VecDeque<FetchFault>,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.last_resource_version += 1;
        self.last_resource_version.to_string()
    }

    /// Stores `object`, bumping the resource version and, if the spec changed,
    /// the generation.
    fn store(&mut self, identity: ObjectIdentity, mut object: SvartSkjaif) -> SvartSkjaif {
        let generation = match self.objects.get(&identity) {
            Some(current) if current.spec == object.spec => current.metadata.generation,
            Some(current) => Some(current.metadata.generation.unwrap_or_default() + 1),
            None => Some(1),
        };

        object.metadata.generation = generation;
        object.metadata.resource_version = Some(self.next_resource_version());
        self.objects.insert(identity, object.clone());
        object
    }
}

/// An [`ObjectStore`] keeping all objects in memory.
///
/// It behaves like the API server where the reconciler can observe it:
/// resource versions are checked on update, the generation is bumped on spec
/// changes and every stored change is announced on [`ObjectStore::watch`].
/// It additionally counts the writes issued through [`ObjectStore::update`]
/// and can inject [`UpdateFault`]s and [`FetchFault`]s.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<State>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::default(),
            events,
        }
    }

    /// Creates or replaces an object the way an external actor would.
    ///
    /// Writes done through this method are not counted by [`Self::writes`].
    pub async fn apply(&self, object: SvartSkjaif) -> Option<SvartSkjaif> {
        let identity = ObjectIdentity::of(&object)?;
        let stored = self.state.lock().await.store(identity.clone(), object);
        self.announce(WatchEvent::applied(identity));
        Some(stored)
    }

    /// Deletes an object the way an external actor would.
    pub async fn delete(&self, identity: &ObjectIdentity) -> Option<SvartSkjaif> {
        let deleted = self.state.lock().await.objects.remove(identity)?;
        self.announce(WatchEvent::deleted(identity.clone()));
        Some(deleted)
    }

    /// Returns the currently stored version of the object.
    pub async fn object(&self, identity: &ObjectIdentity) -> Option<SvartSkjaif> {
        self.state.lock().await.objects.get(identity).cloned()
    }

    /// The number of successful writes issued through [`ObjectStore::update`].
    pub async fn writes(&self) -> usize {
        self.state.lock().await.writes
    }

    /// Queues `fault` to be injected into the next update. Faults are
    /// consumed in the order they were queued, one per update.
    pub async fn inject(&self, fault: UpdateFault) {
        self.state.lock().await.faults.push_back(fault);
    }

    /// Queues `fault` to be injected into the next read. Faults are consumed
    /// in the order they were queued, one per read.
    pub async fn inject_fetch(&self, fault: FetchFault) {
        self.state.lock().await.fetch_faults.push_back(fault);
    }

    fn announce(&self, event: WatchEvent) {
        // Nobody listening is fine, events are not buffered for late watchers
        self.events.send(event).ok();
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, identity: &ObjectIdentity) -> Result<Option<SvartSkjaif>, StoreError> {
        let mut state = self.state.lock().await;
        let identity = identity.clone();

        match state.fetch_faults.pop_front() {
            Some(FetchFault::Transient) => {
                Err(TransientSnafu { identity }.into_error("injected transient failure".into()))
            }
            Some(FetchFault::Permanent) => {
                Err(PermanentSnafu { identity }.into_error("injected permanent failure".into()))
            }
            None => Ok(state.objects.get(&identity).cloned()),
        }
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

        let mut state = self.state.lock().await;

        match state.faults.pop_front() {
            Some(UpdateFault::ConflictThenDelete) => {
                if state.objects.remove(&identity).is_some() {
                    self.announce(WatchEvent::deleted(identity.clone()));
                }
                return ConflictSnafu {
                    identity,
                    expected_version,
                }
                .fail();
            }
            Some(UpdateFault::Conflict) => {
                if let Some(mut current) = state.objects.get(&identity).cloned() {
                    current.metadata.resource_version = Some(state.next_resource_version());
                    state.objects.insert(identity.clone(), current);
                }
            }
            Some(UpdateFault::Vanish) => {
                if state.objects.remove(&identity).is_some() {
                    self.announce(WatchEvent::deleted(identity.clone()));
                }
            }
            Some(UpdateFault::Transient) => {
                return Err(
                    TransientSnafu { identity }.into_error("injected transient failure".into())
                );
            }
            Some(UpdateFault::Permanent) => {
                return Err(
                    PermanentSnafu { identity }.into_error("injected permanent failure".into())
                );
            }
            None => {}
        }

        let Some(current) = state.objects.get(&identity) else {
            return NotFoundSnafu { identity }.fail();
        };

        ensure!(
            current.metadata.resource_version.as_deref() == Some(expected_version),
            ConflictSnafu {
                identity,
                expected_version,
            }
        );

        let stored = state.store(identity.clone(), object.clone());
        state.writes += 1;
        drop(state);

        self.announce(WatchEvent::applied(identity));
        Ok(stored)
    }

    fn watch(&self) -> BoxStream<'static, Result<WatchEvent, StoreError>> {
        let receiver = self.events.subscribe();

        futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "watch fell behind, events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
