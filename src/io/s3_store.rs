use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::OriginStore;
use crate::error::IoError;

/// S3-backed implementation of [`OriginStore`].
///
/// Objects are addressed by their origin key inside a single bucket.
#[derive(Clone)]
pub struct S3OriginStore {
    client: Client,
    bucket: String,
}

impl S3OriginStore {
    /// Create a new store for the given bucket.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

/// Map an SDK failure to `IoError`.
///
/// Never yields `NotFound`: a bare 404 can also mean a missing bucket or a
/// misrouted endpoint, and only a typed answer may become a negative cache
/// entry.
fn classify<E>(err: SdkError<E, HttpResponse>) -> IoError
where
    E: std::error::Error + 'static,
{
    let err_str = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => IoError::Connection(err_str),
        _ => IoError::S3(err_str),
    }
}

/// `GetObject` failures: only `NoSuchKey` confirms the key is absent.
fn classify_get(err: SdkError<GetObjectError, HttpResponse>, location: String) -> IoError {
    if err.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
        return IoError::NotFound(location);
    }
    classify(err)
}

#[async_trait]
impl OriginStore for S3OriginStore {
    async fn get(&self, key: &str, buf: &mut Vec<u8>) -> Result<(), IoError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get(e, self.location(key)))?;

        buf.clear();
        if let Some(len) = resp.content_length() {
            buf.reserve(len.max(0) as usize);
        }

        resp.body
            .into_async_read()
            .read_to_end(buf)
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), IoError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                IoError::S3(format!(
                    "couldn't upload {} to {}: {}",
                    key, self.bucket, e
                ))
            })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), IoError> {
        // DeleteObject succeeds for missing keys on AWS, so existence is
        // checked first to be able to answer 404.
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    return IoError::NotFound(self.location(key));
                }
                classify(e)
            })?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.bucket
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
