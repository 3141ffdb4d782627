// src/upload.rs

use std::sync::Arc;

use futures::future::try_join_all;
use url::Url;
use uuid::Uuid;

use crate::{error::AppError, models::image::ImageFile, storage::ObjectStore};

/// Uploads local images and hands back their public URLs. Callers never see
/// the bucket layout.
#[derive(Clone)]
pub struct ImageUploadService {
    store: Arc<dyn ObjectStore>,
}

impl ImageUploadService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Uploads one post image under a fresh key owned by `owner_id`.
    pub async fn upload(&self, file: &ImageFile, owner_id: Uuid) -> Result<Url, AppError> {
        self.put(&fresh_key(owner_id, "", file), file).await
    }

    /// Uploads all files concurrently. Resolves once every upload has
    /// finished, with URLs in the same order as `files`; the first failure
    /// wins and the remaining uploads are dropped.
    pub async fn upload_all(
        &self,
        files: &[ImageFile],
        owner_id: Uuid,
    ) -> Result<Vec<Url>, AppError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let urls = try_join_all(files.iter().map(|file| self.upload(file, owner_id))).await?;
        tracing::debug!("Uploaded {} image(s) for {}", urls.len(), owner_id);
        Ok(urls)
    }

    /// Every profile picture gets its own key. The previous picture stays
    /// untouched until the profile row points at the new URL.
    pub async fn upload_profile_picture(
        &self,
        file: &ImageFile,
        owner_id: Uuid,
    ) -> Result<Url, AppError> {
        self.put(&fresh_key(owner_id, "profile-", file), file).await
    }

    async fn put(&self, key: &str, file: &ImageFile) -> Result<Url, AppError> {
        self.store
            .put(key, &file.bytes, &file.mime_type(), false)
            .await
            .map_err(|e| {
                tracing::error!("Failed to upload {}: {}", file.file_name, e);
                match e {
                    AppError::Upload(_) => e,
                    other => AppError::Upload(other.to_string()),
                }
            })?;

        self.store.public_url(key)
    }
}

fn fresh_key(owner_id: Uuid, prefix: &str, file: &ImageFile) -> String {
    format!(
        "{owner_id}/{prefix}{}-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        file.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    fn service() -> (Arc<MemoryObjectStore>, ImageUploadService) {
        let store = Arc::new(MemoryObjectStore::default());
        (store.clone(), ImageUploadService::new(store))
    }

    #[tokio::test]
    async fn upload_all_preserves_order() {
        let (store, uploads) = service();
        let owner = Uuid::new_v4();
        let files = vec![
            ImageFile::new("a.png", b"A".to_vec()),
            ImageFile::new("b.jpg", b"B".to_vec()),
            ImageFile::new("c.gif", b"C".to_vec()),
        ];

        let urls = uploads.upload_all(&files, owner).await.unwrap();

        assert_eq!(urls.len(), 3);
        for (url, file) in urls.iter().zip(&files) {
            let key = url.path().trim_start_matches("/storage/");
            assert!(key.starts_with(&owner.to_string()));
            assert_eq!(store.get(key).unwrap().bytes, file.bytes);
        }
    }

    #[tokio::test]
    async fn upload_all_fails_fast() {
        let (store, uploads) = service();
        store.fail_after(1);
        let files = vec![
            ImageFile::new("a.png", b"A".to_vec()),
            ImageFile::new("b.png", b"B".to_vec()),
        ];

        let result = uploads.upload_all(&files, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::Upload(_))));
    }

    #[tokio::test]
    async fn profile_picture_never_overwrites_the_previous_one() {
        let (store, uploads) = service();
        let owner = Uuid::new_v4();

        let first = uploads
            .upload_profile_picture(&ImageFile::new("me.png", b"1".to_vec()), owner)
            .await
            .unwrap();
        let second = uploads
            .upload_profile_picture(&ImageFile::new("me2.png", b"2".to_vec()), owner)
            .await
            .unwrap();

        assert_ne!(first, second);
        let first_key = first.path().trim_start_matches("/storage/");
        let second_key = second.path().trim_start_matches("/storage/");
        assert!(first_key.starts_with(&format!("{owner}/profile-")));
        assert!(second_key.ends_with(".png"));
        assert_eq!(store.get(first_key).unwrap().bytes, b"1".to_vec());
        assert_eq!(store.get(second_key).unwrap().bytes, b"2".to_vec());
        assert_eq!(store.keys().len(), 2);
    }
}
