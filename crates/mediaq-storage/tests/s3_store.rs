//! S3 client integration tests.
//!
//! Run against MinIO with the `S3_*` variables set and an existing bucket
//! named by `S3_TEST_BUCKET` (default `media`).

use mediaq_storage::{ObjectStore, S3ObjectStore, StorageError};
use tempfile::TempDir;

fn test_bucket() -> String {
    std::env::var("S3_TEST_BUCKET").unwrap_or_else(|_| "media".to_string())
}

#[tokio::test]
#[ignore = "requires MinIO"]
async fn test_put_get_overwrite() {
    let store = S3ObjectStore::from_env().expect("Failed to create client");
    let bucket = test_bucket();
    store
        .check_connectivity(&bucket)
        .await
        .expect("Bucket not reachable");

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("clip_thumb.jpg");
    let key = "thumbnails/integration/clip.mp4_thumb.jpg";

    tokio::fs::write(&local, b"first").await.unwrap();
    store.put_object(&bucket, key, &local).await.unwrap();
    tokio::fs::write(&local, b"second").await.unwrap();
    store.put_object(&bucket, key, &local).await.unwrap();
    assert!(store.exists(&bucket, key).await.unwrap());

    let downloaded = dir.path().join("out").join("thumb.jpg");
    store.get_object(&bucket, key, &downloaded).await.unwrap();
    assert_eq!(tokio::fs::read(&downloaded).await.unwrap(), b"second");
}

#[tokio::test]
#[ignore = "requires MinIO"]
async fn test_missing_bucket() {
    let store = S3ObjectStore::from_env().expect("Failed to create client");
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("clip_thumb.jpg");
    tokio::fs::write(&local, b"jpeg").await.unwrap();

    let err = store
        .put_object("mediaq-no-such-bucket", "thumbnails/x_thumb.jpg", &local)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)), "{err}");
}
