//! AWS S3 object store
//!
//! Supports AWS S3 and S3-compatible storage (MinIO, Wasabi, DigitalOcean
//! Spaces). Large copies use multipart uploads; copies within the store stage
//! each part with `UploadPartCopy` so no bytes pass through this process.

use crate::store::ObjectStore;
use crate::types::{ListKind, ListOptions, MultipartSession, ObjectMetadata, ObjectRef, StagedPart};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloud_proxy_core::utils::format_byte_range;
use cloud_proxy_core::{CloudProvider, Error, Result, SecureString};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// S3 accepts at most 10,000 parts per upload
pub const S3_MAX_PARTS: u32 = 10_000;

/// Object store backed by S3
pub struct S3Store {
    client: Client,
    account: String,
}

impl S3Store {
    /// Wrap an existing client
    pub fn new(client: Client, account: impl Into<String>) -> Self {
        Self {
            client,
            account: account.into(),
        }
    }

    /// Create an S3 client with optional region, endpoint and static keys
    pub async fn connect(
        region: Option<&str>,
        endpoint: Option<&str>,
        static_keys: Option<(&str, &SecureString)>,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some((access_key_id, secret_access_key)) = static_keys {
            s3_config_builder = s3_config_builder.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key.expose(),
                None,
                None,
                "cloud-proxy-static",
            ));
        }

        // Configure custom endpoint for S3-compatible storage
        if let Some(endpoint_url) = endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint_url);
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint_url)
                .force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let region = s3_config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| {
                Error::configuration(
                    "no AWS region configured; set 'region' on the connection or AWS_REGION",
                )
            })?;

        let account = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => format!("s3:{region}"),
        };
        Ok(Self::new(Client::from_conf(s3_config), account))
    }

    fn upload_id(session: &MultipartSession) -> &str {
        &session.session_id
    }
}

fn to_chrono(time: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

fn to_sdk_metadata(metadata: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn copy_source(source: &ObjectRef) -> String {
    format!("{}/{}", source.container, source.key)
}

fn part_number(index: u32) -> Result<i32> {
    i32::try_from(index)
        .map_err(|_| Error::configuration(format!("part number {index} out of range")))
}

#[async_trait]
impl ObjectStore for S3Store {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    fn account(&self) -> &str {
        &self.account
    }

    fn max_parts(&self) -> u32 {
        S3_MAX_PARTS
    }

    async fn get_metadata(&self, object: &ObjectRef) -> Result<ObjectMetadata> {
        let resp = self
            .client
            .head_object()
            .bucket(&object.container)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| Error::provider("head_object", object.to_string(), e))?;

        Ok(ObjectMetadata {
            content_length: resp.content_length.unwrap_or(0).max(0) as u64,
            last_modified: resp.last_modified.as_ref().and_then(to_chrono),
            etag: resp.e_tag,
            content_type: resp.content_type,
            user: resp.metadata.unwrap_or_default().into_iter().collect(),
        })
    }

    async fn read_range(&self, object: &ObjectRef, offset: u64, count: u64) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&object.container)
            .key(&object.key)
            .range(format_byte_range(offset, count))
            .send()
            .await
            .map_err(|e| Error::provider("get_object_range", object.to_string(), e))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::provider("get_object_range", object.to_string(), e))?;
        Ok(body.into_bytes())
    }

    async fn open_multipart(
        &self,
        destination: &ObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> Result<MultipartSession> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&destination.container)
            .key(&destination.key)
            .set_metadata(to_sdk_metadata(metadata))
            .send()
            .await
            .map_err(|e| Error::provider("create_multipart_upload", destination.to_string(), e))?;

        let upload_id = resp.upload_id.ok_or_else(|| {
            Error::provider(
                "create_multipart_upload",
                destination.to_string(),
                "response carried no upload id",
            )
        })?;

        Ok(MultipartSession {
            session_id: upload_id,
            destination: destination.clone(),
            metadata: metadata.clone(),
        })
    }

    async fn stage_part(
        &self,
        session: &MultipartSession,
        index: u32,
        data: Bytes,
    ) -> Result<StagedPart> {
        let target = &session.destination;
        let resp = self
            .client
            .upload_part()
            .bucket(&target.container)
            .key(&target.key)
            .upload_id(Self::upload_id(session))
            .part_number(part_number(index)?)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Error::provider("upload_part", target.to_string(), e))?;

        let etag = resp.e_tag.ok_or_else(|| {
            Error::provider("upload_part", target.to_string(), "response carried no ETag")
        })?;
        Ok(StagedPart { index, token: etag })
    }

    async fn stage_part_copy(
        &self,
        session: &MultipartSession,
        index: u32,
        source: &ObjectRef,
        offset: u64,
        count: u64,
    ) -> Result<StagedPart> {
        let target = &session.destination;
        let resp = self
            .client
            .upload_part_copy()
            .bucket(&target.container)
            .key(&target.key)
            .upload_id(Self::upload_id(session))
            .part_number(part_number(index)?)
            .copy_source(copy_source(source))
            .copy_source_range(format_byte_range(offset, count))
            .send()
            .await
            .map_err(|e| Error::provider("upload_part_copy", target.to_string(), e))?;

        let etag = resp
            .copy_part_result
            .and_then(|r| r.e_tag)
            .ok_or_else(|| {
                Error::provider(
                    "upload_part_copy",
                    target.to_string(),
                    "response carried no ETag",
                )
            })?;
        Ok(StagedPart { index, token: etag })
    }

    async fn commit(&self, session: &MultipartSession, parts: &[StagedPart]) -> Result<()> {
        let target = &session.destination;
        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            completed.push(
                CompletedPart::builder()
                    .e_tag(&part.token)
                    .part_number(part_number(part.index)?)
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(&target.container)
            .key(&target.key)
            .upload_id(Self::upload_id(session))
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Error::provider("complete_multipart_upload", target.to_string(), e))?;

        info!("Completed multipart upload to s3://{}", target);
        Ok(())
    }

    async fn abort(&self, session: &MultipartSession) -> Result<()> {
        let target = &session.destination;
        self.client
            .abort_multipart_upload()
            .bucket(&target.container)
            .key(&target.key)
            .upload_id(Self::upload_id(session))
            .send()
            .await
            .map_err(|e| Error::provider("abort_multipart_upload", target.to_string(), e))?;

        debug!("Aborted multipart upload to s3://{}", target);
        Ok(())
    }

    async fn copy_object(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&destination.container)
            .key(&destination.key)
            .copy_source(copy_source(source))
            .send()
            .await
            .map_err(|e| Error::provider("copy_object", destination.to_string(), e))?;

        debug!("Copied s3://{} to s3://{}", source, destination);
        Ok(())
    }

    async fn get_object(&self, object: &ObjectRef) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&object.container)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| Error::provider("get_object", object.to_string(), e))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::provider("get_object", object.to_string(), e))?;
        Ok(body.into_bytes())
    }

    async fn put_object(
        &self,
        object: &ObjectRef,
        data: Bytes,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}", data.len(), object);
        self.client
            .put_object()
            .bucket(&object.container)
            .key(&object.key)
            .body(ByteStream::from(data))
            .set_metadata(to_sdk_metadata(metadata))
            .send()
            .await
            .map_err(|e| Error::provider("put_object", object.to_string(), e))?;
        Ok(())
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&object.container)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| Error::provider("delete_object", object.to_string(), e))?;

        debug!("Deleted s3://{}", object);
        Ok(())
    }

    async fn list(&self, container: &str, options: &ListOptions) -> Result<Vec<String>> {
        let max = options.limit();
        let mut items = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(container)
                .max_keys(i32::try_from(max).unwrap_or(i32::MAX))
                .delimiter("/")
                .set_prefix(options.prefix.clone());

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let resp = request
                .send()
                .await
                .map_err(|e| Error::provider("list_objects_v2", container, e))?;

            match options.kind {
                ListKind::Files => items.extend(
                    resp.contents
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|object| object.key),
                ),
                ListKind::Folders => items.extend(
                    resp.common_prefixes
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|prefix| prefix.prefix),
                ),
            }

            if items.len() >= max {
                items.truncate(max);
                break;
            }
            if resp.is_truncated == Some(true) {
                continuation_token = resp.next_continuation_token;
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!("Listed {} entries in s3://{}", items.len(), container);
        Ok(items)
    }
}
