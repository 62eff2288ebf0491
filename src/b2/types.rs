//! B2 API types
//!
//! Request and response bodies for the Backblaze B2 native API.

use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a number that might be encoded as a string or null.
/// B2 API sometimes returns numeric fields as strings (e.g. "1536964279000")
/// and may return null for folder/hide entries.
fn deserialize_flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct FlexibleU64Visitor;

    impl<'de> de::Visitor<'de> for FlexibleU64Visitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a u64, a string containing a u64, or null")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| de::Error::custom("negative value for u64"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value.parse::<u64>().map_err(de::Error::custom)
        }

        fn visit_none<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(FlexibleU64Visitor)
}

/// B2 file/folder information from API responses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Full file path within the bucket
    pub file_name: String,
    /// File size in bytes (0 for folders)
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub content_length: u64,
    /// Upload timestamp in milliseconds since epoch
    #[serde(default, deserialize_with = "deserialize_flexible_u64")]
    pub upload_timestamp: u64,
    /// Action type: "upload", "folder", "hide", "start"
    pub action: String,
    /// Optional file ID (null for folder entries)
    #[serde(default)]
    pub file_id: Option<String>,
    /// Content type (MIME type, null for folder entries)
    #[serde(default)]
    pub content_type: Option<String>,
}

impl FileInfo {
    /// Check if this entry represents a directory
    pub fn is_directory(&self) -> bool {
        self.action == "folder" || self.file_name.ends_with('/')
    }

    /// Whether this is a live file version (not a folder or hide marker)
    pub fn is_live_file(&self) -> bool {
        self.action == "upload" && !self.is_directory()
    }
}

/// Response from b2_list_file_names API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesResponse {
    /// List of files in the response
    pub files: Vec<FileInfo>,
    /// Next file name for pagination (None if no more files)
    pub next_file_name: Option<String>,
}

/// Request body for b2_list_file_names API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileNamesRequest {
    pub bucket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    pub max_file_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<String>,
}

/// Request body for b2_list_file_versions API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileVersionsRequest {
    pub bucket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub max_file_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<String>,
}

/// Response from b2_list_file_versions API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileVersionsResponse {
    /// Versions sorted by name, newest first within a name
    pub files: Vec<FileInfo>,
    pub next_file_name: Option<String>,
    pub next_file_id: Option<String>,
}

/// Error body returned by every failing B2 call
#[derive(Debug, Default, Deserialize)]
pub struct B2ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Upload URL from B2 (for uploading files)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrl {
    pub upload_url: String,
    pub authorization_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_upload_file() {
        let json = r#"{
            "fileName": "photos/alice.jpg",
            "contentLength": 12345,
            "uploadTimestamp": 1536964279000,
            "action": "upload",
            "fileId": "4_abc123",
            "contentType": "image/jpeg"
        }"#;
        let info: FileInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.file_name, "photos/alice.jpg");
        assert_eq!(info.content_length, 12345);
        assert!(info.is_live_file());
        assert_eq!(info.file_id, Some("4_abc123".to_string()));
    }

    #[test]
    fn test_deserialize_folder_and_hide_entries() {
        let json = r#"{
            "files": [
                {
                    "fileName": "photos/cats/",
                    "contentLength": 0,
                    "uploadTimestamp": 0,
                    "action": "folder",
                    "fileId": null,
                    "contentType": null
                },
                {
                    "fileName": "photos/old.png",
                    "contentLength": "0",
                    "uploadTimestamp": "1536964288000",
                    "action": "hide",
                    "fileId": "4_def456"
                }
            ],
            "nextFileName": "photos/zebra.png"
        }"#;
        let resp: ListFilesResponse = serde_json::from_str(json).unwrap();
        assert!(resp.files[0].is_directory());
        assert!(!resp.files[0].is_live_file());
        assert!(!resp.files[1].is_live_file());
        assert_eq!(resp.files[1].upload_timestamp, 1536964288000);
        assert_eq!(resp.next_file_name.as_deref(), Some("photos/zebra.png"));
    }

    #[test]
    fn test_list_request_serialization() {
        let request = ListFileNamesRequest {
            bucket_id: "test-bucket".to_string(),
            prefix: Some("folder/".to_string()),
            delimiter: Some("/".to_string()),
            max_file_count: 100,
            start_file_name: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"bucketId\""));
        assert!(json.contains("\"delimiter\""));
        assert!(!json.contains("startFileName"));
    }

    #[test]
    fn test_error_body() {
        let body: B2ErrorBody =
            serde_json::from_str(r#"{"status": 400, "code": "file_not_present", "message": "gone"}"#)
                .unwrap();
        assert_eq!(body.code, "file_not_present");
        assert_eq!(body.message, "gone");
    }

    #[test]
    fn test_deserialize_list_versions() {
        let json = r#"{
            "files": [
                {"fileName": "a/b.txt", "contentLength": 3, "action": "upload", "fileId": "v2", "uploadTimestamp": 2000},
                {"fileName": "a/b.txt", "contentLength": 0, "action": "hide", "fileId": "v1h", "uploadTimestamp": 1500},
                {"fileName": "a/b.txt", "contentLength": 5, "action": "upload", "fileId": "v1", "uploadTimestamp": 1000}
            ],
            "nextFileName": "a/b.txt",
            "nextFileId": "v0"
        }"#;
        let resp: ListFileVersionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.files.len(), 3);
        assert_eq!(resp.files[1].action, "hide");
        assert_eq!(resp.next_file_id.as_deref(), Some("v0"));

        let request = ListFileVersionsRequest {
            bucket_id: "bkt".to_string(),
            prefix: Some("a/b.txt".to_string()),
            max_file_count: 100,
            start_file_name: None,
            start_file_id: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"prefix\":\"a/b.txt\""));
        assert!(!json.contains("startFileId"));
    }
}
