//! A legacy `v1alpha1` object travels through the conversion gateway into the
//! store and is normalized by the reconciler.
use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use skjaif_crd::{SchemaRegistry, v1beta1};
use skjaif_operator::{
    backoff::NoBackoff,
    reconciler::{Cancellation, Outcome, Reconciler},
    store::{InMemoryStore, ObjectIdentity, ObjectStore, UpdateFault},
};
use skjaif_webhook::ConversionGateway;

fn legacy_object() -> serde_json::Value {
    json!({
        "apiVersion": "skjaif.skjaiferator.no/v1alpha1",
        "kind": "SvartSkjaif",
        "metadata": {"name": "morning", "namespace": "kitchen"},
        "spec": {"container": {"kaffe": "melk", "kopp": "krus", "vann": "kaldt"}}
    })
}

async fn store_through_gateway(registry: &Arc<SchemaRegistry>, store: &InMemoryStore) {
    let gateway = ConversionGateway::new(Arc::clone(registry));
    let mut converted = gateway
        .convert("skjaif.skjaiferator.no/v1beta1", vec![legacy_object()])
        .expect("legacy object must convert to the hub");

    assert_eq!(
        converted[0]["spec"],
        json!({"kaffe": "melk", "kopp": "krus", "vann": "kaldt"})
    );

    let hub: v1beta1::SvartSkjaif =
        serde_json::from_value(converted.remove(0)).expect("gateway must produce a hub object");
    store.apply(hub).await.expect("object has a name");
}

#[tokio::test]
async fn legacy_object_is_normalized_and_converges() {
    let registry = Arc::new(SchemaRegistry::new());
    let store = Arc::new(InMemoryStore::new());
    let identity = ObjectIdentity::new("kitchen", "morning");

    store_through_gateway(&registry, &store).await;

    let reconciler = Reconciler::new(Arc::clone(&store), registry).with_backoff(NoBackoff);
    let cancellation = Cancellation::new();

    let outcome = reconciler
        .reconcile(&identity, &cancellation)
        .await
        .expect("first cycle must succeed");
    assert!(matches!(outcome, Outcome::Corrected { .. }));
    assert_eq!(store.writes().await, 1);

    let stored = store.object(&identity).await.expect("object must exist");
    assert_eq!(stored.spec, v1beta1::SvartSkjaifSpec {
        kaffe: "svart".to_owned(),
        kopp: "mummi".to_owned(),
        vann: "varmt".to_owned(),
    });

    let outcome = reconciler
        .reconcile(&identity, &cancellation)
        .await
        .expect("second cycle must succeed");
    assert_eq!(outcome, Outcome::Converged);
    assert_eq!(store.writes().await, 1);
}

#[tokio::test]
async fn watch_driven_cycle_with_concurrent_writer() {
    let registry = Arc::new(SchemaRegistry::new());
    let store = Arc::new(InMemoryStore::new());
    let events = store.watch();

    store_through_gateway(&registry, &store).await;
    store.inject(UpdateFault::Conflict).await;

    let reconciler = Reconciler::new(Arc::clone(&store), registry).with_backoff(NoBackoff);
    let mut reports = Vec::new();
    reconciler
        .drive(
            events.take(2),
            |_| true,
            |report| reports.push(report),
            &Cancellation::new(),
        )
        .await;

    assert_eq!(reports.len(), 2);
    assert!(matches!(
        reports[0].result,
        Ok(Outcome::Corrected { .. })
    ));
    assert!(matches!(reports[1].result, Ok(Outcome::Converged)));
    assert_eq!(store.writes().await, 1);
}
