use crate::config::StorageConfig;
use crate::error::AppError;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;
use uuid::Uuid;

/// Signed URLs are good for an hour, like the upload forms expect.
const URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Issues pre-signed S3 URLs for user uploads. The bucket is never exposed
/// directly; callers get a time-limited URL plus the object key, and the
/// `uploads/{user_id}/` prefix convention ties keys to their owner.
#[derive(Clone)]
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl ObjectStorage {
    pub async fn connect(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "tutorlink-config",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: config.bucket.clone(),
        }
    }

    /// New object key under the caller's ownership prefix.
    pub fn object_key(user_id: &str, file_name: &str) -> String {
        format!("uploads/{}/{}-{}", user_id, Uuid::new_v4(), file_name)
    }

    /// The ownership check for download/delete: a user only touches keys
    /// under their own prefix.
    pub fn key_owned_by(key: &str, user_id: &str) -> bool {
        key.starts_with(&format!("uploads/{user_id}/"))
    }

    pub fn expiry_secs() -> u64 {
        URL_EXPIRY.as_secs()
    }

    pub async fn upload_url(&self, key: &str, content_type: &str) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(URL_EXPIRY)
            .map_err(|err| AppError::Internal(format!("presigning config: {err}")))?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|err| AppError::Internal(format!("failed to sign upload url: {err}")))?;
        Ok(request.uri().to_string())
    }

    pub async fn download_url(&self, key: &str) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(URL_EXPIRY)
            .map_err(|err| AppError::Internal(format!("presigning config: {err}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| AppError::Internal(format!("failed to sign download url: {err}")))?;
        Ok(request.uri().to_string())
    }

    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| AppError::Internal(format!("failed to delete object: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_lives_under_owner_prefix() {
        let key = ObjectStorage::object_key("user-1", "notes.pdf");
        assert!(key.starts_with("uploads/user-1/"));
        assert!(key.ends_with("-notes.pdf"));
    }

    #[test]
    fn test_key_ownership() {
        assert!(ObjectStorage::key_owned_by("uploads/user-1/abc-n.pdf", "user-1"));
        assert!(!ObjectStorage::key_owned_by("uploads/user-2/abc-n.pdf", "user-1"));
        // A bare prefix match is not enough
        assert!(!ObjectStorage::key_owned_by("uploads/user-11/abc-n.pdf", "user-1"));
        assert!(!ObjectStorage::key_owned_by("other/user-1/abc-n.pdf", "user-1"));
    }

    #[test]
    fn test_keys_are_unique_per_upload() {
        let a = ObjectStorage::object_key("user-1", "notes.pdf");
        let b = ObjectStorage::object_key("user-1", "notes.pdf");
        assert_ne!(a, b);
    }
}
