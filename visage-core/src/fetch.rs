//! Remote image fetch pipeline.
//!
//! External collaborator to the training core: queries the user-management
//! API for users awaiting enrollment and downloads their face images into
//! the per-user folder layout the trainer consumes. Transient API failures
//! retry with exponential backoff; per-image download failures are soft.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, VisageError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const INITIAL_INTERVAL: Duration = Duration::from_millis(200);
const MAX_INTERVAL: Duration = Duration::from_secs(2);

/// Configuration for the fetch pipeline, constructed at the CLI boundary
/// and passed by value.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-management API endpoint (POST).
    pub api_url: String,
    /// Request headers to send with the API call.
    pub headers: HashMap<String, String>,
    /// Log what would be downloaded without touching the network or disk.
    pub dry_run: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient API errors.
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            headers: HashMap::new(),
            dry_run: false,
            timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
        }
    }
}

/// API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: ApiData,
}

#[derive(Debug, Default, Deserialize)]
struct ApiData {
    #[serde(default)]
    users: HashMap<String, ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Name", default = "unknown_name")]
    name: String,
    #[serde(default)]
    images: Vec<ApiImage>,
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
    /// Original file name on the remote side.
    image: String,
}

/// Downloaded-image metadata for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Image")]
    pub images: Vec<PathBuf>,
}

/// Per-user download metadata, keyed by user id. Ordered so the metadata
/// JSON is stable across runs.
pub type UserImageData = BTreeMap<String, UserRecord>;

/// Folder name for one user under the training root.
///
/// Spaces in the display name become underscores, matching the
/// `{userId}_{name}` convention the trainer parses back.
pub fn user_folder_name(user_id: &str, name: &str) -> String {
    format!("{}_{}", user_id, name.replace(' ', "_"))
}

/// HTTP client for the user-management API.
pub struct FetchClient {
    client: Client,
    config: FetchConfig,
}

impl FetchClient {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisageError::FetchError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Fetch pending users and download their images under `output_base`.
    ///
    /// Returns metadata for every pending user, including users whose
    /// downloads partially failed (those failures are logged and skipped).
    #[instrument(level = "info", skip(self), fields(api_url = %self.config.api_url, dry_run = self.config.dry_run))]
    pub async fn fetch_and_download(&self, output_base: &Path) -> Result<UserImageData> {
        info!("Fetching user data from API");
        let response = self.fetch_users().await?;

        if response.status != "success" {
            return Err(VisageError::FetchError(format!(
                "API returned non-success status: {}",
                response.status
            )));
        }

        fs::create_dir_all(output_base)?;

        let mut user_data = UserImageData::new();
        for (user_id, user) in pending_users(response.data.users) {
            info!(%user_id, name = %user.name, images = user.images.len(), "Processing user");
            let folder = output_base.join(user_folder_name(&user_id, &user.name));
            if !self.config.dry_run {
                fs::create_dir_all(&folder)?;
            }

            let mut saved_paths = Vec::new();
            for img in &user.images {
                match self.download_image(img, &folder).await {
                    Ok(Some(path)) => saved_paths.push(path),
                    Ok(None) => {} // dry run
                    Err(e) => {
                        warn!(url = %img.url, error = %e, "Failed to download or process image");
                    }
                }
            }

            user_data.insert(
                user_id,
                UserRecord {
                    name: user.name,
                    status: user.status.to_lowercase(),
                    images: saved_paths,
                },
            );
        }

        Ok(user_data)
    }

    /// POST the user query, retrying transient failures with backoff.
    async fn fetch_users(&self) -> Result<ApiResponse> {
        let headers = build_header_map(&self.config.headers)?;
        let backoff = ExponentialBackoff {
            initial_interval: INITIAL_INTERVAL,
            max_interval: MAX_INTERVAL,
            max_elapsed_time: Some(self.config.timeout * self.config.max_retries),
            ..Default::default()
        };

        retry_notify(
            backoff,
            || {
                let headers = headers.clone();
                async move { self.fetch_users_once(headers).await }
            },
            |err: VisageError, duration: Duration| {
                warn!(error = %err, retry_after_ms = duration.as_millis() as u64, "Retry scheduled");
            },
        )
        .await
    }

    async fn fetch_users_once(
        &self,
        headers: HeaderMap,
    ) -> std::result::Result<ApiResponse, backoff::Error<VisageError>> {
        let response = self
            .client
            .post(&self.config.api_url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                if is_transient_error(&e) {
                    backoff::Error::transient(VisageError::FetchError(format!(
                        "Transient error (will retry): {e}"
                    )))
                } else {
                    backoff::Error::permanent(VisageError::FetchError(format!(
                        "API request failed: {e}"
                    )))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let err = VisageError::FetchError(format!("API returned status: {status}"));
            return if is_transient_status(status) {
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            };
        }

        response.json().await.map_err(|e| {
            backoff::Error::permanent(VisageError::FetchError(format!(
                "Failed to parse API response: {e}"
            )))
        })
    }

    /// Download one image, sniff its real format, and save it under the
    /// user folder. Returns `None` in dry-run mode.
    async fn download_image(&self, img: &ApiImage, folder: &Path) -> Result<Option<PathBuf>> {
        if self.config.dry_run {
            debug!(url = %img.url, "DRY-RUN: would download");
            return Ok(None);
        }

        debug!(url = %img.url, "Downloading image");
        let bytes = self
            .client
            .get(&img.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        // Trust the decoded format over the remote file name extension.
        let format = image::guess_format(&bytes)?;
        let decoded = image::load_from_memory(&bytes)?;

        let ext = format.extensions_str().first().copied().unwrap_or("png");
        let stem = Path::new(&img.image)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let path = folder.join(format!("{stem}.{ext}"));

        decoded.save(&path)?;
        info!(path = %path.display(), "Downloaded and saved image");
        Ok(Some(path))
    }
}

/// Keep only users awaiting enrollment; everyone else is skipped.
///
/// The API reports status capitalization inconsistently, so the comparison
/// is case-insensitive.
fn pending_users(
    users: HashMap<String, ApiUser>,
) -> impl Iterator<Item = (String, ApiUser)> {
    users.into_iter().filter(|(user_id, user)| {
        let pending = user.status.eq_ignore_ascii_case("pending");
        if !pending {
            debug!(%user_id, status = %user.status, "Skipping non-pending user");
        }
        pending
    })
}

/// Drop metadata references to images that no longer exist on disk.
///
/// Training deletes images in which no face was found; the metadata written
/// after a run must only list files that survived.
pub fn prune_missing_images(user_data: &mut UserImageData) {
    for record in user_data.values_mut() {
        record.images.retain(|path| path.exists());
    }
}

/// Write the per-user download metadata as pretty-printed JSON.
pub fn write_metadata(path: &Path, user_data: &UserImageData) -> Result<()> {
    let json = serde_json::to_string_pretty(user_data)
        .map_err(|e| VisageError::SerializationError(e.to_string()))?;
    fs::write(path, json)?;
    info!(path = %path.display(), users = user_data.len(), "Saved user image metadata");
    Ok(())
}

fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name: HeaderName = name
            .parse()
            .map_err(|_| VisageError::FetchError(format!("Invalid header name: {name}")))?;
        let value: HeaderValue = value
            .parse()
            .map_err(|_| VisageError::FetchError(format!("Invalid header value for {name}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_api_response() {
        let json = r#"{
            "status": "success",
            "data": {
                "users": {
                    "42": {
                        "Status": "Pending",
                        "Name": "Jane Doe",
                        "images": [
                            {"url": "https://cdn.example/a.jpg", "image": "a.jpg"}
                        ]
                    },
                    "43": {
                        "Status": "approved",
                        "Name": "Bob",
                        "images": []
                    }
                }
            }
        }"#;

        let response: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, "success");
        assert_eq!(response.data.users.len(), 2);

        let jane = &response.data.users["42"];
        assert!(jane.status.eq_ignore_ascii_case("pending"));
        assert_eq!(jane.images[0].image, "a.jpg");
    }

    #[test]
    fn test_parse_response_with_missing_fields() {
        let json = r#"{"status": "success", "data": {"users": {"9": {}}}}"#;
        let response: ApiResponse = serde_json::from_str(json).unwrap();
        let user = &response.data.users["9"];
        assert_eq!(user.name, "Unknown");
        assert_eq!(user.status, "");
        assert!(user.images.is_empty());
    }

    #[test]
    fn test_pending_users_filters_by_status() {
        let json = r#"{
            "status": "success",
            "data": {
                "users": {
                    "42": {"Status": "Pending", "Name": "Jane"},
                    "43": {"Status": "approved", "Name": "Bob"},
                    "44": {"Status": "pending", "Name": "Carol"},
                    "45": {"Status": "", "Name": "Dan"}
                }
            }
        }"#;
        let response: ApiResponse = serde_json::from_str(json).unwrap();

        let mut kept: Vec<String> = pending_users(response.data.users)
            .map(|(user_id, _)| user_id)
            .collect();
        kept.sort();
        assert_eq!(kept, ["42", "44"]);
    }

    #[test]
    fn test_user_folder_name_replaces_spaces() {
        assert_eq!(user_folder_name("42", "Jane Doe"), "42_Jane_Doe");
        assert_eq!(user_folder_name("7", "Solo"), "7_Solo");
    }

    #[test]
    fn test_prune_missing_images() {
        let temp = TempDir::new().unwrap();
        let kept = temp.path().join("kept.png");
        fs::write(&kept, b"x").unwrap();

        let mut data = UserImageData::new();
        data.insert(
            "1".into(),
            UserRecord {
                name: "Jane".into(),
                status: "pending".into(),
                images: vec![kept.clone(), temp.path().join("deleted.png")],
            },
        );

        prune_missing_images(&mut data);
        assert_eq!(data["1"].images, vec![kept]);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("user-data.json");

        let mut data = UserImageData::new();
        data.insert(
            "42".into(),
            UserRecord {
                name: "Jane_Doe".into(),
                status: "pending".into(),
                images: vec![PathBuf::from("shared/train_images/42_Jane_Doe/a.png")],
            },
        );
        write_metadata(&path, &data).unwrap();

        let restored: UserImageData =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_download_image_dry_run_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let client = FetchClient::new(FetchConfig {
            api_url: "https://api.example/users".into(),
            dry_run: true,
            ..FetchConfig::default()
        })
        .unwrap();

        let img = ApiImage {
            url: "https://cdn.example/a.jpg".into(),
            image: "a.jpg".into(),
        };
        let saved = client.download_image(&img, temp.path()).await.unwrap();
        assert!(saved.is_none());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_build_header_map_rejects_invalid_name() {
        let mut headers = HashMap::new();
        headers.insert("bad header\n".to_string(), "value".to_string());
        assert!(build_header_map(&headers).is_err());
    }

    #[test]
    fn test_build_header_map_accepts_content_type() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let map = build_header_map(&headers).unwrap();
        assert_eq!(map["content-type"], "application/json");
    }
}
