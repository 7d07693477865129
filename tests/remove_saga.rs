mod common;

use common::{Cluster, RecordingStore};
use sdspkg::{Error, Remover};

#[test]
fn rm_deletes_container_job_specs_and_hysds_ios() {
    let cluster = Cluster::scenario();
    let store = RecordingStore::new();
    let blob = cluster.path("source/container-c1.tar.gz");
    assert!(blob.exists());

    let summary = Remover::new(cluster.catalogs(), &store).remove("C1").unwrap();
    assert_eq!(summary.documents_deleted, 5);
    assert_eq!(summary.blobs_removed, 1);

    assert_eq!(cluster.mozart.len(), 0);
    assert_eq!(cluster.grq.len(), 0);
    assert_eq!(cluster.mozart.deleted() + cluster.grq.deleted(), 5);
    assert!(!blob.exists());
    assert_eq!(store.count("rm "), 1);
    // dependency images may be shared with other packages
    assert!(cluster.path("source/base.tar").exists());
}

#[test]
fn rm_plan_orders_container_last() {
    let cluster = Cluster::scenario();
    let store = RecordingStore::new();
    let plan = Remover::new(cluster.catalogs(), &store).plan("C1").unwrap();

    let steps: Vec<String> = plan.steps.iter().map(|s| s.to_string()).collect();
    assert!(steps[0].starts_with("remove blob file://"));
    assert_eq!(
        &steps[1..],
        &[
            "delete hysds_ios/H1 from mozart",
            "delete job_specs/J1 from mozart",
            "delete hysds_ios/H2 from grq",
            "delete job_specs/J2 from mozart",
            "delete containers/C1 from mozart",
        ]
    );
    // planning is read only
    assert_eq!(store.calls(), 0);
    assert_eq!(cluster.mozart.len() + cluster.grq.len(), 5);
}

#[test]
fn rm_of_unknown_container_is_not_found() {
    let cluster = Cluster::scenario();
    let store = RecordingStore::new();

    let err = Remover::new(cluster.catalogs(), &store)
        .remove("nope")
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{:?}", err);
    assert!(err.is_handled());
    assert_eq!(store.calls(), 0);
    assert_eq!(cluster.mozart.deleted() + cluster.grq.deleted(), 0);
    assert_eq!(cluster.mozart.len() + cluster.grq.len(), 5);
}

#[test]
fn interrupted_rm_finishes_on_rerun() {
    let cluster = Cluster::scenario();
    let store = RecordingStore::new();
    let remover = Remover::new(cluster.catalogs(), &store);

    // H1 goes, then the catalog drops out before J1
    cluster.mozart.fail_deletes_after(1);
    let err = remover.remove("C1").unwrap_err();
    assert!(matches!(err, Error::Upstream { .. }), "{:?}", err);
    assert_eq!(cluster.mozart.deleted(), 1);
    assert!(cluster.mozart.doc("containers", "C1").is_some());

    cluster.mozart.heal();
    remover.remove("C1").unwrap();
    assert_eq!(cluster.mozart.len() + cluster.grq.len(), 0);
    assert_eq!(cluster.mozart.deleted() + cluster.grq.deleted(), 5);

    let again = remover.remove("C1").unwrap_err();
    assert!(matches!(again, Error::NotFound { .. }), "{:?}", again);
}
