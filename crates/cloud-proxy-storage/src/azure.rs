//! Azure Blob Storage object store
//!
//! Talks to the Blob REST API directly. Multipart sessions map onto block
//! blobs: each part is an uncommitted block and commit is a Put Block List.
//! Uncommitted blocks expire on the service side, so aborting a session
//! releases nothing locally.

use crate::store::ObjectStore;
use crate::types::{ListKind, ListOptions, MultipartSession, ObjectMetadata, ObjectRef, StagedPart};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloud_proxy_core::azure::AzureAccess;
use cloud_proxy_core::utils::{format_byte_range, normalize_metadata_key};
use cloud_proxy_core::{CloudProvider, Error, HttpStatusError, Result};
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, Response};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Block blobs accept at most 50,000 blocks
pub const AZURE_MAX_PARTS: u32 = 50_000;

const API_VERSION: &str = "2021-08-06";
const META_PREFIX: &str = "x-ms-meta-";

static BLOB_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<Blob>\s*<Name>([^<]*)</Name>").expect("blob name regex is valid")
});
static PREFIX_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<BlobPrefix>\s*<Name>([^<]*)</Name>").expect("blob prefix regex is valid")
});
static NEXT_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<NextMarker>([^<]+)</NextMarker>").expect("next marker regex is valid")
});

/// Object store backed by Azure Blob Storage
pub struct AzureBlobStore {
    endpoint: Url,
    access: AzureAccess,
    http: reqwest::Client,
}

impl AzureBlobStore {
    /// Create a store for the account at `endpoint`
    pub fn new(endpoint: Url, access: AzureAccess) -> Self {
        Self::with_client(endpoint, access, reqwest::Client::new())
    }

    pub fn with_client(endpoint: Url, access: AzureAccess, http: reqwest::Client) -> Self {
        Self {
            endpoint,
            access,
            http,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn container_url(&self, container: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| Error::configuration(format!("invalid blob endpoint: {}", self.endpoint)))?
            .pop_if_empty()
            .push(container);
        Ok(url)
    }

    fn blob_url(&self, object: &ObjectRef) -> Result<Url> {
        let mut url = self.container_url(&object.container)?;
        url.path_segments_mut()
            .map_err(|_| Error::configuration(format!("invalid blob endpoint: {}", self.endpoint)))?
            .extend(object.key.split('/'));
        Ok(url)
    }

    async fn request(&self, method: Method, url: &Url) -> Result<RequestBuilder> {
        let builder = self.access.authorize(&self.http, method, url.as_str()).await?;
        Ok(builder
            .header("x-ms-version", API_VERSION)
            .header("x-ms-date", http_date(Utc::now())))
    }

    /// Source URL and authorization header value for a server-side copy
    async fn copy_source(&self, source: &ObjectRef) -> Result<(String, Option<String>)> {
        let url = self.blob_url(source)?;
        match &self.access {
            AzureAccess::Sas(sas) => Ok((format!("{url}?{}", sas.expose()), None)),
            AzureAccess::Bearer(provider) => {
                let token = provider.token().await?;
                Ok((url.to_string(), Some(format!("Bearer {}", token.expose()))))
            }
        }
    }
}

/// RFC 1123 date as required by `x-ms-date`
fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Block ids must all have the same length within one blob
fn block_id(session_id: &str, index: u32) -> String {
    BASE64.encode(format!("{session_id}{index:05}"))
}

fn with_metadata(
    mut builder: RequestBuilder,
    metadata: &BTreeMap<String, String>,
) -> RequestBuilder {
    for (key, value) in metadata {
        builder = builder.header(format!("{META_PREFIX}{key}"), value);
    }
    builder
}

fn block_list_xml(parts: &[StagedPart]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for part in parts {
        xml.push_str("<Latest>");
        xml.push_str(&part.token);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn metadata_from_headers(headers: &HeaderMap) -> ObjectMetadata {
    let user = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((normalize_metadata_key(key), value.to_string()))
        })
        .collect();

    ObjectMetadata {
        content_length: header_str(headers, "content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        last_modified: header_str(headers, "last-modified")
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|d| d.with_timezone(&Utc)),
        etag: header_str(headers, "etag").map(str::to_string),
        content_type: header_str(headers, "content-type").map(str::to_string),
        user,
    }
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Names and continuation marker from one List Blobs page
fn parse_list_page(body: &str, kind: ListKind) -> (Vec<String>, Option<String>) {
    let re = match kind {
        ListKind::Files => &*BLOB_NAME_RE,
        ListKind::Folders => &*PREFIX_NAME_RE,
    };
    let names = re
        .captures_iter(body)
        .map(|c| unescape_xml(&c[1]))
        .collect();
    let marker = NEXT_MARKER_RE
        .captures(body)
        .map(|c| unescape_xml(&c[1]));
    (names, marker)
}

async fn send(
    builder: RequestBuilder,
    operation: &'static str,
    target: impl Into<String>,
) -> Result<Response> {
    let target = target.into();
    let response = builder
        .send()
        .await
        .map_err(|e| Error::provider(operation, target.clone(), e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::provider(
        operation,
        target,
        HttpStatusError::new(status.as_u16(), body),
    ))
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Azure
    }

    fn account(&self) -> &str {
        self.endpoint.as_str()
    }

    fn max_parts(&self) -> u32 {
        AZURE_MAX_PARTS
    }

    async fn get_metadata(&self, object: &ObjectRef) -> Result<ObjectMetadata> {
        let url = self.blob_url(object)?;
        let response = send(
            self.request(Method::HEAD, &url).await?,
            "get_blob_properties",
            object.to_string(),
        )
        .await?;
        Ok(metadata_from_headers(response.headers()))
    }

    async fn read_range(&self, object: &ObjectRef, offset: u64, count: u64) -> Result<Bytes> {
        let url = self.blob_url(object)?;
        let builder = self
            .request(Method::GET, &url)
            .await?
            .header("x-ms-range", format_byte_range(offset, count));
        let response = send(builder, "get_blob_range", object.to_string()).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::provider("get_blob_range", object.to_string(), e))
    }

    async fn open_multipart(
        &self,
        destination: &ObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> Result<MultipartSession> {
        // Blocks are staged against the blob directly; the id only namespaces block ids
        Ok(MultipartSession {
            session_id: uuid::Uuid::new_v4().to_string(),
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
        let id = block_id(&session.session_id, index);
        let mut url = self.blob_url(&session.destination)?;
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", &id);

        let builder = self
            .request(Method::PUT, &url)
            .await?
            .body(data);
        send(builder, "put_block", session.destination.to_string()).await?;
        Ok(StagedPart { index, token: id })
    }

    async fn stage_part_copy(
        &self,
        session: &MultipartSession,
        index: u32,
        source: &ObjectRef,
        offset: u64,
        count: u64,
    ) -> Result<StagedPart> {
        let id = block_id(&session.session_id, index);
        let mut url = self.blob_url(&session.destination)?;
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", &id);

        let (source_url, source_auth) = self.copy_source(source).await?;
        let mut builder = self
            .request(Method::PUT, &url)
            .await?
            .header("content-length", 0)
            .header("x-ms-copy-source", source_url)
            .header("x-ms-source-range", format_byte_range(offset, count));
        if let Some(auth) = source_auth {
            builder = builder.header("x-ms-copy-source-authorization", auth);
        }
        send(builder, "put_block_from_url", session.destination.to_string()).await?;
        Ok(StagedPart { index, token: id })
    }

    async fn commit(&self, session: &MultipartSession, parts: &[StagedPart]) -> Result<()> {
        let mut url = self.blob_url(&session.destination)?;
        url.query_pairs_mut().append_pair("comp", "blocklist");

        let builder = self
            .request(Method::PUT, &url)
            .await?
            .header("content-type", "application/xml")
            .body(block_list_xml(parts));
        send(
            with_metadata(builder, &session.metadata),
            "put_block_list",
            session.destination.to_string(),
        )
        .await?;

        debug!(
            destination = %session.destination,
            blocks = parts.len(),
            "Committed block list"
        );
        Ok(())
    }

    async fn abort(&self, session: &MultipartSession) -> Result<()> {
        debug!(
            destination = %session.destination,
            session = %session.session_id,
            "Abandoning uncommitted blocks"
        );
        Ok(())
    }

    async fn copy_object(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        let url = self.blob_url(destination)?;
        let (source_url, source_auth) = self.copy_source(source).await?;
        let mut builder = self
            .request(Method::PUT, &url)
            .await?
            .header("content-length", 0)
            .header("x-ms-copy-source", source_url)
            .header("x-ms-requires-sync", "true");
        if let Some(auth) = source_auth {
            builder = builder.header("x-ms-copy-source-authorization", auth);
        }
        send(builder, "copy_blob_from_url", destination.to_string()).await?;
        debug!("Copied {} to {}", source, destination);
        Ok(())
    }

    async fn get_object(&self, object: &ObjectRef) -> Result<Bytes> {
        let url = self.blob_url(object)?;
        let response = send(
            self.request(Method::GET, &url).await?,
            "get_blob",
            object.to_string(),
        )
        .await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::provider("get_blob", object.to_string(), e))
    }

    async fn put_object(
        &self,
        object: &ObjectRef,
        data: Bytes,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        debug!("Uploading {} bytes to {}", data.len(), object);
        let url = self.blob_url(object)?;
        let builder = self
            .request(Method::PUT, &url)
            .await?
            .header("x-ms-blob-type", "BlockBlob")
            .body(data);
        send(with_metadata(builder, metadata), "put_blob", object.to_string()).await?;
        Ok(())
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<()> {
        let url = self.blob_url(object)?;
        send(
            self.request(Method::DELETE, &url).await?,
            "delete_blob",
            object.to_string(),
        )
        .await?;
        debug!("Deleted {}", object);
        Ok(())
    }

    async fn list(&self, container: &str, options: &ListOptions) -> Result<Vec<String>> {
        let max = options.limit();
        let mut items = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.container_url(container)?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("restype", "container")
                    .append_pair("comp", "list")
                    .append_pair("delimiter", "/")
                    .append_pair("maxresults", &(max - items.len()).to_string());
                if let Some(prefix) = &options.prefix {
                    query.append_pair("prefix", prefix);
                }
                if let Some(marker) = &marker {
                    query.append_pair("marker", marker);
                }
            }

            let response = send(self.request(Method::GET, &url).await?, "list_blobs", container)
                .await?;
            let body = response
                .text()
                .await
                .map_err(|e| Error::provider("list_blobs", container, e))?;

            let (names, next) = parse_list_page(&body, options.kind);
            items.extend(names);

            if items.len() >= max {
                items.truncate(max);
                break;
            }
            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        debug!("Listed {} entries in {}", items.len(), container);
        Ok(items)
    }
}
