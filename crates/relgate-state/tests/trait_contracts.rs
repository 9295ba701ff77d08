//! Trait contract tests for ArtifactStore and PackageRegistry.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using in-memory fakes. Any conforming implementation must pass these.

use relgate_state::fakes::{MemoryArtifactStore, MemoryPackageRegistry};
use relgate_state::storage_traits::*;
use relgate_state::{ArtifactFile, StorageError};

fn sdist(version: &str, content: &[u8]) -> ArtifactFile {
    ArtifactFile::from_bytes(format!("dist/pkg-{}.tar.gz", version), content).unwrap()
}

fn wheel(version: &str, content: &[u8]) -> ArtifactFile {
    ArtifactFile::from_bytes(format!("dist/pkg-{}-py3-none-any.whl", version), content).unwrap()
}

// ===========================================================================
// ArtifactStore contract tests
// ===========================================================================

#[tokio::test]
async fn store_upload_then_list() {
    let store = MemoryArtifactStore::new();
    let artifacts = vec![sdist("1.0.0", b"s"), wheel("1.0.0", b"w")];

    let receipt = store.upload("pkg-abc", &artifacts).await.unwrap();
    assert_eq!(receipt.key, "pkg-abc");
    assert!(!receipt.reused);

    let listed = store.list("pkg-abc").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].filename, "pkg-1.0.0.tar.gz");
}

#[tokio::test]
async fn store_upload_is_idempotent_per_key() {
    let store = MemoryArtifactStore::new();
    let artifacts = vec![sdist("1.0.0", b"s")];

    store.upload("pkg-abc", &artifacts).await.unwrap();
    let again = store.upload("pkg-abc", &artifacts).await.unwrap();

    assert!(again.reused);
    assert_eq!(store.list("pkg-abc").await.unwrap().len(), 1);
}

#[tokio::test]
async fn store_keys_are_isolated() {
    let store = MemoryArtifactStore::new();
    store.upload("run-a", &[sdist("1.0.0", b"a")]).await.unwrap();
    store.upload("run-b", &[sdist("1.0.0", b"b")]).await.unwrap();

    let a = store.list("run-a").await.unwrap();
    let b = store.list("run-b").await.unwrap();
    assert_ne!(a[0].digest, b[0].digest);
}

#[tokio::test]
async fn store_list_unknown_key() {
    let store = MemoryArtifactStore::new();
    let err = store.list("nope").await.unwrap_err();
    assert!(matches!(err, StorageError::KeyNotFound { .. }));
}

// ===========================================================================
// PackageRegistry contract tests
// ===========================================================================

#[tokio::test]
async fn registry_lookup_absent_then_identical() {
    let registry = MemoryPackageRegistry::new();
    let creds = Credentials::new("token");
    let file = wheel("2.0.1", b"w");

    assert_eq!(registry.lookup(&file).await.unwrap(), RegistryLookup::Absent);
    registry.upload(&file, &creds).await.unwrap();
    assert_eq!(
        registry.lookup(&file).await.unwrap(),
        RegistryLookup::Identical
    );
}

#[tokio::test]
async fn registry_lookup_detects_mismatch() {
    let registry = MemoryPackageRegistry::new();
    registry.seed("pkg-2.0.1.tar.gz", ContentDigest::from_bytes(b"old"));

    let lookup = registry.lookup(&sdist("2.0.1", b"new")).await.unwrap();
    assert!(matches!(lookup, RegistryLookup::Mismatch { existing: Some(_) }));
}

#[tokio::test]
async fn registry_rejects_duplicate_upload() {
    let registry = MemoryPackageRegistry::new();
    let creds = Credentials::new("token");
    let file = sdist("2.0.1", b"s");

    registry.upload(&file, &creds).await.unwrap();
    let err = registry.upload(&file, &creds).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));
}

#[tokio::test]
async fn registry_rejects_wrong_token() {
    let registry = MemoryPackageRegistry::new().with_required_token("right");
    let err = registry
        .upload(&sdist("2.0.1", b"s"), &Credentials::new("wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Unauthorized { .. }));
    assert!(!registry.contains("pkg-2.0.1.tar.gz"));
}
