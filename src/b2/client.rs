//! Backblaze B2 API Client
//!
//! Provides authenticated access to one B2 bucket: file listing, download,
//! upload, version deletion and server-side copy.

use base64::Engine;
use reqwest::{Client, Response};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::errors::B2Error;
use super::types::{
    FileInfo, ListFileNamesRequest, ListFileVersionsRequest, ListFileVersionsResponse, ListFilesResponse,
    UploadUrl,
};

/// B2 API base URL for authorization (v3 for nested apiInfo structure)
const B2_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retries for retryable errors
const MAX_RETRIES: u32 = 3;

/// Page size for b2_list_file_names
const LIST_PAGE_SIZE: u32 = 1000;

/// Content type that asks B2 to infer the MIME type from the file name
const AUTO_CONTENT_TYPE: &str = "b2/x-auto";

/// Delay before each retry, in milliseconds
const BACKOFF_MS: [u64; MAX_RETRIES as usize] = [500, 1000, 2000];

/// Health status values
const HEALTH_HEALTHY: u8 = 0;
const HEALTH_DEGRADED: u8 = 1;
const HEALTH_UNHEALTHY: u8 = 2;

/// Auth state that can be refreshed (interior mutability)
struct AuthState {
    auth_token: String,
    api_url: String,
    download_url: String,
}

/// B2 API client for making authenticated requests
#[derive(Clone)]
pub struct B2Client {
    /// HTTP client for making requests
    http_client: Client,
    /// B2 account ID
    account_id: String,
    /// Mutable auth state (refreshable on 401)
    auth_state: Arc<RwLock<AuthState>>,
    /// Stored credentials for re-authorization
    key_id: String,
    key: String,
    /// Bucket ID to operate on
    bucket_id: String,
    /// Bucket name (for downloads and display)
    bucket_name: String,
    /// Connection health (0=healthy, 1=degraded, 2=unhealthy)
    health: Arc<AtomicU8>,
}

/// Response from b2_authorize_account API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    account_id: String,
    authorization_token: String,
    api_info: ApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInfo {
    storage_api: StorageApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageApiInfo {
    api_url: String,
    download_url: String,
}

/// Response from b2_list_buckets API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketInfo {
    bucket_id: String,
    bucket_name: String,
}

/// Response from a successful file upload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_id: String,
    file_name: String,
    content_length: u64,
    content_type: String,
    upload_timestamp: u64,
}

/// Turn a non-2xx response into a classified error
async fn check_status(response: Response) -> Result<Response, B2Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(B2Error::from_status(status.as_u16(), &body))
}

/// Percent-encode a file name for URLs and the X-Bz-File-Name header.
/// Slashes stay literal as B2 expects.
fn encode_file_name(file_name: &str) -> String {
    file_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn backoff_delay(attempt: u32) -> u64 {
    BACKOFF_MS.get(attempt as usize).copied().unwrap_or(2000)
}

/// Run an authorization step, retrying only transient failures
///
/// Used before a client exists, so there is no token to refresh and no
/// health to record.
async fn retry_transient<F, Fut, T>(step: &str, f: F) -> Result<T, B2Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, B2Error>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                let delay = backoff_delay(attempt);
                warn!(
                    step = step,
                    attempt = attempt + 1,
                    max = MAX_RETRIES,
                    delay_ms = delay,
                    error = %e,
                    "Retrying B2 authorization"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl B2Client {
    /// Get current auth token
    fn auth_token(&self) -> String {
        self.auth_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .auth_token
            .clone()
    }

    /// Get current API URL
    fn api_url(&self) -> String {
        self.auth_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .api_url
            .clone()
    }

    /// Get current download URL
    fn download_url(&self) -> String {
        self.auth_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .download_url
            .clone()
    }

    /// Call b2_authorize_account with Basic auth
    async fn authorize_account(
        http_client: &Client,
        key_id: &str,
        key: &str,
    ) -> Result<AuthorizeAccountResponse, B2Error> {
        let credentials = format!("{}:{}", key_id, key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        let auth_header = format!("Basic {}", encoded);

        let response = http_client
            .get(B2_AUTH_URL)
            .header("Authorization", &auth_header)
            .send()
            .await?;

        let auth_response = check_status(response)
            .await?
            .json::<AuthorizeAccountResponse>()
            .await?;
        Ok(auth_response)
    }

    /// Refresh the auth token by re-authorizing with B2
    pub async fn refresh_auth(&self) -> Result<(), B2Error> {
        info!("Refreshing B2 auth token...");

        let auth_response = Self::authorize_account(&self.http_client, &self.key_id, &self.key).await?;

        let mut state = self
            .auth_state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        state.auth_token = auth_response.authorization_token;
        state.api_url = auth_response.api_info.storage_api.api_url;
        state.download_url = auth_response.api_info.storage_api.download_url;

        info!("B2 auth token refreshed successfully");
        Ok(())
    }

    /// Execute an operation with retry logic and exponential backoff
    async fn with_retry<F, Fut, T>(&self, operation: &str, path: &str, f: F) -> Result<T, B2Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, B2Error>>,
    {
        let mut attempt = 0;

        loop {
            let e = match f().await {
                Ok(result) => {
                    self.health.store(HEALTH_HEALTHY, Ordering::Relaxed);
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !e.is_retryable() || attempt == MAX_RETRIES {
                match e {
                    B2Error::Network(_) | B2Error::Timeout => {
                        self.health.store(HEALTH_UNHEALTHY, Ordering::Relaxed)
                    }
                    B2Error::RateLimited | B2Error::Server(_, _) => {
                        self.health.store(HEALTH_DEGRADED, Ordering::Relaxed)
                    }
                    _ => {}
                }
                debug!(operation = operation, path = path, error = %e, "B2 operation failed");
                return Err(e);
            }

            // Handle auth expiry by refreshing token
            if matches!(e, B2Error::AuthExpired) && attempt == 0 {
                warn!(operation = operation, "Auth expired, refreshing token...");
                if let Err(refresh_err) = self.refresh_auth().await {
                    error!(error = %refresh_err, "Failed to refresh auth token");
                }
            }

            let delay = backoff_delay(attempt);
            warn!(
                operation = operation,
                path = path,
                attempt = attempt + 1,
                max = MAX_RETRIES,
                delay_ms = delay,
                error = %e,
                "Retrying B2 operation"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    /// Get connection health status string
    pub fn health_status(&self) -> &'static str {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_HEALTHY => "healthy",
            HEALTH_DEGRADED => "degraded",
            _ => "unhealthy",
        }
    }

    /// Authorize with B2 and create a new client for the specified bucket
    ///
    /// # Arguments
    /// * `key_id` - B2 application key ID
    /// * `key` - B2 application key
    /// * `bucket_name` - Name of the bucket to access
    pub async fn authorize(key_id: &str, key: &str, bucket_name: &str) -> Result<Self, B2Error> {
        info!(bucket = bucket_name, "Authorizing with B2 API...");

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| B2Error::Request(format!("Failed to create HTTP client: {}", e)))?;

        let auth_response = retry_transient("authorize_account", || {
            Self::authorize_account(&http_client, key_id, key)
        })
        .await?;

        let api_url = auth_response.api_info.storage_api.api_url;
        let download_url = auth_response.api_info.storage_api.download_url;
        debug!(api_url = %api_url, download_url = %download_url, "B2 authorization successful");

        let mut client = Self {
            http_client,
            account_id: auth_response.account_id,
            auth_state: Arc::new(RwLock::new(AuthState {
                auth_token: auth_response.authorization_token,
                api_url,
                download_url,
            })),
            key_id: key_id.to_string(),
            key: key.to_string(),
            bucket_id: String::new(),
            bucket_name: bucket_name.to_string(),
            health: Arc::new(AtomicU8::new(HEALTH_HEALTHY)),
        };

        let bucket_id = retry_transient("list_buckets", || client.get_bucket_id(bucket_name)).await?;
        client.bucket_id = bucket_id;

        info!(bucket_name = bucket_name, bucket_id = %client.bucket_id, "B2 client ready");
        Ok(client)
    }

    /// Look up bucket ID from bucket name
    async fn get_bucket_id(&self, bucket_name: &str) -> Result<String, B2Error> {
        let url = format!("{}/b2api/v2/b2_list_buckets", self.api_url());

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.auth_token())
            .json(&serde_json::json!({
                "accountId": self.account_id,
                "bucketName": bucket_name
            }))
            .send()
            .await?;

        let list_response: ListBucketsResponse = check_status(response).await?.json().await?;

        list_response
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == bucket_name)
            .map(|b| b.bucket_id)
            .ok_or_else(|| B2Error::NotFound(format!("bucket '{}'", bucket_name)))
    }

    /// Fetch one page of b2_list_file_names
    async fn list_page(&self, request: &ListFileNamesRequest) -> Result<ListFilesResponse, B2Error> {
        let url = format!("{}/b2api/v2/b2_list_file_names", self.api_url());

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.auth_token())
            .json(request)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// List files in the bucket with optional prefix and delimiter
    ///
    /// # Arguments
    /// * `prefix` - Optional path prefix to filter results
    /// * `delimiter` - Optional delimiter for directory-style listing (usually "/")
    pub async fn list_file_names(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<Vec<FileInfo>, B2Error> {
        let mut all_files = Vec::new();
        let mut request = ListFileNamesRequest {
            bucket_id: self.bucket_id.clone(),
            prefix: prefix.map(String::from),
            delimiter: delimiter.map(String::from),
            max_file_count: LIST_PAGE_SIZE,
            start_file_name: None,
        };

        loop {
            debug!(prefix = ?prefix, delimiter = ?delimiter, start = ?request.start_file_name, "Listing files from B2");

            let page = self
                .with_retry("list_file_names", prefix.unwrap_or(""), || self.list_page(&request))
                .await?;
            all_files.extend(page.files);

            match page.next_file_name {
                Some(next) => request.start_file_name = Some(next),
                None => break,
            }
        }

        debug!(count = all_files.len(), "Listed files from B2");
        Ok(all_files)
    }

    /// Every stored version of exactly `file_name`, newest first
    ///
    /// Includes hide markers. Versions of longer names sharing the prefix are
    /// dropped.
    pub async fn list_file_versions(&self, file_name: &str) -> Result<Vec<FileInfo>, B2Error> {
        let url = format!("{}/b2api/v2/b2_list_file_versions", self.api_url());
        let mut versions = Vec::new();
        let mut request = ListFileVersionsRequest {
            bucket_id: self.bucket_id.clone(),
            prefix: Some(file_name.to_string()),
            max_file_count: LIST_PAGE_SIZE,
            start_file_name: None,
            start_file_id: None,
        };

        let url = url.as_str();
        loop {
            let body = &request;
            let page = self
                .with_retry("list_file_versions", file_name, || async move {
                    let response = self
                        .http_client
                        .post(url)
                        .header("Authorization", &self.auth_token())
                        .json(body)
                        .send()
                        .await?;
                    Ok::<_, B2Error>(check_status(response).await?.json::<ListFileVersionsResponse>().await?)
                })
                .await?;

            versions.extend(page.files.into_iter().filter(|f| f.file_name == file_name));

            match (page.next_file_name, page.next_file_id) {
                (Some(name), Some(id)) if name == file_name => {
                    request.start_file_name = Some(name);
                    request.start_file_id = Some(id);
                }
                _ => break,
            }
        }

        debug!(file = file_name, count = versions.len(), "Listed file versions");
        Ok(versions)
    }

    /// Look up the live version of a file by exact name
    ///
    /// Starts the listing at the name itself so a single one-entry page
    /// answers the question.
    pub async fn find_file(&self, file_name: &str) -> Result<Option<FileInfo>, B2Error> {
        let request = ListFileNamesRequest {
            bucket_id: self.bucket_id.clone(),
            prefix: Some(file_name.to_string()),
            delimiter: None,
            max_file_count: 1,
            start_file_name: Some(file_name.to_string()),
        };

        let page = self
            .with_retry("find_file", file_name, || self.list_page(&request))
            .await?;

        Ok(page
            .files
            .into_iter()
            .find(|f| f.file_name == file_name && f.is_live_file()))
    }

    /// Get the bucket ID
    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    /// Get the bucket name
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// Download file content from B2
    ///
    /// # Arguments
    /// * `file_name` - Full file path within the bucket
    pub async fn download_file(&self, file_name: &str) -> Result<Vec<u8>, B2Error> {
        let bytes = self
            .with_retry("download_file", file_name, || async move {
                let url = format!(
                    "{}/file/{}/{}",
                    self.download_url(),
                    self.bucket_name,
                    encode_file_name(file_name)
                );
                debug!(file = file_name, url = %url, "Downloading file from B2");

                let response = self
                    .http_client
                    .get(&url)
                    .header("Authorization", &self.auth_token())
                    .send()
                    .await?;
                Ok::<_, B2Error>(check_status(response).await?.bytes().await?)
            })
            .await?;

        info!(file = file_name, size = bytes.len(), "Downloaded file from B2");
        Ok(bytes.to_vec())
    }

    /// Get an upload URL for uploading files to B2
    async fn get_upload_url(&self) -> Result<UploadUrl, B2Error> {
        let url = format!("{}/b2api/v2/b2_get_upload_url", self.api_url());

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.auth_token())
            .json(&serde_json::json!({ "bucketId": self.bucket_id }))
            .send()
            .await?;

        let upload_url: UploadUrl = check_status(response).await?.json().await?;
        debug!(url = %upload_url.upload_url, "Got B2 upload URL");
        Ok(upload_url)
    }

    /// Upload a file to B2
    ///
    /// Gets an upload URL, calculates SHA1 hash, and uploads file content.
    /// B2 infers the content type from the file name.
    pub async fn upload_file(&self, file_name: &str, data: &[u8]) -> Result<FileInfo, B2Error> {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let hash = format!("{:x}", hasher.finalize());

        info!(file = file_name, size = data.len(), "Uploading file to B2");

        let hash = hash.as_str();
        let upload_response = self
            .with_retry("upload_file", file_name, || async move {
                // Upload URLs are single-writer; fetch a fresh one per attempt
                let upload_url = self.get_upload_url().await?;
                let response = self
                    .http_client
                    .post(&upload_url.upload_url)
                    .header("Authorization", &upload_url.authorization_token)
                    .header("X-Bz-File-Name", encode_file_name(file_name))
                    .header("Content-Type", AUTO_CONTENT_TYPE)
                    .header("Content-Length", data.len())
                    .header("X-Bz-Content-Sha1", hash)
                    .body(data.to_vec())
                    .send()
                    .await?;
                Ok::<_, B2Error>(check_status(response).await?.json::<UploadResponse>().await?)
            })
            .await?;

        info!(
            file = file_name,
            file_id = %upload_response.file_id,
            "File uploaded to B2"
        );

        Ok(FileInfo {
            file_name: upload_response.file_name,
            content_length: upload_response.content_length,
            upload_timestamp: upload_response.upload_timestamp,
            action: "upload".to_string(),
            file_id: Some(upload_response.file_id),
            content_type: Some(upload_response.content_type),
        })
    }

    /// Delete a file version from B2 (permanent delete)
    ///
    /// # Arguments
    /// * `file_name` - Full file path within the bucket
    /// * `file_id` - B2 file ID (from find_file or upload response)
    pub async fn delete_file(&self, file_name: &str, file_id: &str) -> Result<(), B2Error> {
        info!(file = file_name, file_id = file_id, "Deleting file from B2");

        self.with_retry("delete_file", file_name, || async move {
            let url = format!("{}/b2api/v2/b2_delete_file_version", self.api_url());
            let response = self
                .http_client
                .post(&url)
                .header("Authorization", &self.auth_token())
                .json(&serde_json::json!({
                    "fileName": file_name,
                    "fileId": file_id
                }))
                .send()
                .await?;
            check_status(response).await?;
            Ok::<_, B2Error>(())
        })
        .await?;

        info!(file = file_name, "File deleted from B2");
        Ok(())
    }

    /// Copy a file within B2 (server-side, no download/upload)
    ///
    /// # Arguments
    /// * `source_file_id` - File ID of the source file
    /// * `dest_file_name` - Destination file path within the bucket
    pub async fn copy_file(&self, source_file_id: &str, dest_file_name: &str) -> Result<FileInfo, B2Error> {
        info!(
            source_id = source_file_id,
            dest = dest_file_name,
            "Copying file in B2"
        );

        let file_info = self
            .with_retry("copy_file", dest_file_name, || async move {
                let url = format!("{}/b2api/v2/b2_copy_file", self.api_url());
                let response = self
                    .http_client
                    .post(&url)
                    .header("Authorization", &self.auth_token())
                    .json(&serde_json::json!({
                        "sourceFileId": source_file_id,
                        "fileName": dest_file_name
                    }))
                    .send()
                    .await?;
                Ok::<_, B2Error>(check_status(response).await?.json::<FileInfo>().await?)
            })
            .await?;

        info!(dest = dest_file_name, "File copied in B2");
        Ok(file_info)
    }
}
