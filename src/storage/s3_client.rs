// S3 upload gateway
// Small files go up in a single PUT; anything at or above the multipart
// threshold is sent in fixed-size parts with a progress tick per part.

use super::{UploadError, UploadFile, UploadGateway, UploadProgress};
use crate::config::StorageConfig;
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::{debug, error, info};

pub const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;
const TRANSFER_FAILED: &str = "Failed to upload file to S3";

pub struct S3UploadGateway {
    bucket: Box<Bucket>,
    key_prefix: String,
}

impl S3UploadGateway {
    pub fn new(config: &StorageConfig) -> Result<Self, UploadError> {
        let region = match &config.s3_endpoint {
            Some(endpoint) => Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .s3_region
                .parse()
                .map_err(|e| UploadError::Unexpected(format!("invalid S3 region: {}", e)))?,
        };

        let credentials = match (&config.s3_access_key_id, &config.s3_secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(Some(access_key.as_str()), Some(secret_key.as_str()), None, None, None)
            }
            _ => Credentials::default(),
        }
        .map_err(|e| UploadError::Unexpected(format!("S3 credentials unavailable: {}", e)))?;

        let mut bucket: Box<Bucket> = Bucket::new(&config.s3_bucket, region, credentials)
            .map_err(|e| UploadError::Unexpected(format!("S3 bucket setup failed: {}", e)))?
            .into();
        if config.s3_endpoint.is_some() {
            bucket = bucket.with_path_style().into();
        }

        Ok(Self {
            bucket,
            key_prefix: config.key_prefix.clone(),
        })
    }

    pub fn object_key(&self, file_name: &str) -> String {
        object_key(&self.key_prefix, file_name)
    }

    async fn put_single(&self, key: &str, file: &UploadFile) -> Result<(), UploadError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &file.bytes, &file.content_type)
            .await
            .map_err(transfer_failed)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            error!(key, status, "S3 rejected upload");
            return Err(UploadError::Transfer(TRANSFER_FAILED.to_string()));
        }
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        file: &UploadFile,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<(), UploadError> {
        let total = file.size();
        let upload = self
            .bucket
            .initiate_multipart_upload(key, &file.content_type)
            .await
            .map_err(transfer_failed)?;
        let upload_id = upload.upload_id;

        let mut parts = Vec::new();
        let mut loaded = 0u64;
        for (idx, chunk) in file.bytes.chunks(MULTIPART_THRESHOLD).enumerate() {
            let part_number = (idx + 1) as u32;
            let part = match self
                .bucket
                .put_multipart_chunk(chunk.to_vec(), key, part_number, &upload_id, &file.content_type)
                .await
            {
                Ok(part) => part,
                Err(e) => {
                    if let Err(abort) = self.bucket.abort_upload(key, &upload_id).await {
                        error!(key, error = %abort, "Failed to abort multipart upload");
                    }
                    return Err(transfer_failed(e));
                }
            };
            parts.push(part);

            loaded += chunk.len() as u64;
            debug!(key, part_number, loaded, total, "Uploaded part");
            if let Some(tick) = UploadProgress::new(loaded, total) {
                on_progress(tick);
            }
        }

        self.bucket
            .complete_multipart_upload(key, &upload_id, parts)
            .await
            .map_err(transfer_failed)?;
        Ok(())
    }
}

#[async_trait]
impl UploadGateway for S3UploadGateway {
    async fn upload(
        &self,
        file: UploadFile,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<String, UploadError> {
        let key = self.object_key(&file.name);
        let total = file.size();
        info!(key = %key, bytes = total, "Uploading dataset");

        if file.bytes.len() < MULTIPART_THRESHOLD {
            if let Some(tick) = UploadProgress::new(0, total) {
                on_progress(tick);
            }
            self.put_single(&key, &file).await?;
            if let Some(tick) = UploadProgress::new(total, total) {
                on_progress(tick);
            }
        } else {
            self.put_multipart(&key, &file, on_progress).await?;
        }

        info!(key = %key, "Dataset uploaded");
        Ok(key)
    }
}

fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}

fn transfer_failed(err: s3::error::S3Error) -> UploadError {
    error!(error = %err, "S3 upload error");
    UploadError::Transfer(TRANSFER_FAILED.to_string())
}
