/*!
# NSQD DevKit - Stubs et Utilitaires pour les tests de l'exporter

Bibliothèque facilitant les tests de nsqd-exporter sans nsqd réel:
- Stub HTTP nsqd scriptable (snapshot, erreur HTTP, blocage, JSON invalide)
- Builders de snapshots au format JSON de `/stats?format=json`
*/

pub mod nsqd_stub;
pub mod snapshot_builder;

pub use nsqd_stub::{NsqdStub, StubMode};
pub use snapshot_builder::SnapshotBuilder;

/// Init logging pour tests (idempotent)
pub fn init_test_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}
