use std::time::{SystemTime, UNIX_EPOCH};

use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
    ObjectIdentifier, VersioningConfiguration,
};

/// Regions where `CreateBucket` must not carry a location constraint.
const DEFAULT_BUCKET_REGION: &str = "us-east-1";

/// High-level object-storage operations over one owned S3 client.
#[derive(Debug, Clone)]
pub struct BucketStore {
    client: aws_sdk_s3::Client,
}

impl BucketStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &aws_sdk_s3::Client {
        &self.client
    }

    /// Create a bucket with a unique suffixed name, adding the location
    /// constraint required outside us-east-1. Returns the bucket name.
    pub async fn create_bucket(&self, prefix: &str) -> Result<String, String> {
        let bucket_name = unique_bucket_name(prefix);
        let region = self
            .client
            .config()
            .region()
            .map(|region| region.as_ref().to_string());

        let mut request = self.client.create_bucket().bucket(&bucket_name);
        if let Some(region) = region.filter(|region| region != DEFAULT_BUCKET_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|error| format!("failed to create bucket {bucket_name}: {error}"))?;
        Ok(bucket_name)
    }

    /// Keys of every object in the bucket, following pagination.
    pub async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, String> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token)
                .send()
                .await
                .map_err(|error| format!("failed to list objects in {bucket}: {error}"))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => return Ok(keys),
            }
        }
    }

    /// Server-side copy of one object between buckets.
    pub async fn copy_object(
        &self,
        from_bucket: &str,
        to_bucket: &str,
        key: &str,
    ) -> Result<(), String> {
        self.client
            .copy_object()
            .copy_source(format!("{from_bucket}/{key}"))
            .bucket(to_bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                format!("failed to copy {key} from {from_bucket} to {to_bucket}: {error}")
            })
    }

    pub async fn enable_versioning(&self, bucket: &str) -> Result<(), String> {
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map(|_| ())
            .map_err(|error| format!("failed to enable versioning on {bucket}: {error}"))
    }

    /// Delete several keys in one batched request. Returns the number of keys
    /// submitted.
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<usize, String> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut identifiers = Vec::with_capacity(keys.len());
        for key in keys {
            identifiers.push(
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|error| format!("invalid object key {key}: {error}"))?,
            );
        }

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .build()
            .map_err(|error| format!("failed to build delete request: {error}"))?;

        self.client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|error| format!("failed to delete objects from {bucket}: {error}"))?;
        Ok(keys.len())
    }
}

/// Bucket name with a short time-derived suffix, so repeated runs with the
/// same prefix do not collide.
pub fn unique_bucket_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("{}-{:08x}", prefix.trim_end_matches('-'), (nanos & 0xffff_ffff) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_name_keeps_prefix_and_appends_hex_suffix() {
        let name = unique_bucket_name("analytics");
        let (prefix, suffix) = name
            .rsplit_once('-')
            .expect("name should contain a suffix separator");

        assert_eq!(prefix, "analytics");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn bucket_name_strips_trailing_dash_from_prefix() {
        let name = unique_bucket_name("analytics-");
        assert!(name.starts_with("analytics-"));
        assert!(!name.starts_with("analytics--"));
    }
}
