use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Request};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::danbooru::grabber::{PageRequest, SearchClient};
use crate::danbooru::store::ImageFetch;

/// Error types for remote requests
#[derive(Error, Debug)]
pub(crate) enum SenderError {
    #[error("failed to build the http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to decode the response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
}

/// Result type for remote requests
pub(crate) type SenderResult<T> = Result<T, SenderError>;

/// One post record as the search endpoint returns it.
///
/// Every field the pipeline relies on is optional: the remote omits fields
/// on restricted posts, and a missing field makes that post malformed, not
/// the run. Fields the pipeline does not model are kept in `extra` so the
/// metadata artifact reproduces the full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PostEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) file_ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) tag_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) rating: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

/// One tag record from the tag metadata endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TagEntry {
    pub(crate) name: String,
    pub(crate) post_count: u64,
}

/// Owns the blocking client and the base url every endpoint shares.
#[derive(Debug, Clone)]
pub(crate) struct RequestSender {
    client: Client,
    base_url: String,
}

impl RequestSender {
    pub(crate) fn new(base_url: &str) -> SenderResult<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(SenderError::Client)?;
        Ok(RequestSender {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    // Credential pairs go through the client's form encoding, unlike the
    // raw search urls.
    fn status_request(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Request, reqwest::Error> {
        self.client.get(url).query(query).build()
    }

    /// Sends a GET with the given query pairs and reports only the response
    /// status.
    pub(crate) fn get_status(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<StatusCode, reqwest::Error> {
        let request = self.status_request(url, query)?;
        Ok(self.client.execute(request)?.status())
    }

    /// Downloads a url into memory, failing on any non-success status.
    pub(crate) fn get_bytes(&self, url: &str) -> SenderResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| SenderError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::Status {
                url: url.to_string(),
                status,
            });
        }
        let bytes = response.bytes().map_err(|source| SenderError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> SenderResult<T> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| SenderError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::Status {
                url: url.to_string(),
                status,
            });
        }
        response.json::<T>().map_err(|source| SenderError::Decode {
            url: url.to_string(),
            source,
        })
    }

    fn count_url(&self, tag: &str) -> String {
        format!("{}/tags.json?search[name]={}", self.base_url, tag)
    }

    // The tag expression keeps its literal `+` separators; percent-encoding
    // them breaks the server's tag parsing.
    fn search_url(&self, request: &PageRequest) -> String {
        format!(
            "{}/posts.json?tags={}&limit={}&page={}",
            self.base_url, request.tags, request.limit, request.page
        )
    }
}

impl SearchClient for RequestSender {
    fn tag_post_count(&self, tag: &str) -> SenderResult<u64> {
        let entries: Vec<TagEntry> = self.get_json(&self.count_url(tag))?;
        match entries.first() {
            Some(entry) => {
                trace!("Tag \"{}\" reports {} posts.", entry.name, entry.post_count);
                Ok(entry.post_count)
            }
            None => Ok(0),
        }
    }

    fn search_page(&self, request: &PageRequest) -> SenderResult<Vec<PostEntry>> {
        self.get_json(&self.search_url(request))
    }
}

impl ImageFetch for RequestSender {
    fn fetch_image(&self, url: &str) -> SenderResult<Vec<u8>> {
        self.get_bytes(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_entries_tolerate_missing_fields() {
        let entry: PostEntry = serde_json::from_str(r#"{"id": 41, "rating": "g"}"#).unwrap();
        assert_eq!(entry.id, Some(41));
        assert_eq!(entry.rating.as_deref(), Some("g"));
        assert!(entry.file_url.is_none());
        assert!(entry.file_ext.is_none());
    }

    #[test]
    fn post_entries_round_trip_unmodelled_fields() {
        let raw = r#"{"id": 41, "file_url": "http://x/a.jpg", "score": 17, "source": "somewhere"}"#;
        let entry: PostEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.extra["score"], serde_json::json!(17));

        let encoded = serde_json::to_string(&entry).unwrap();
        let round_tripped: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(round_tripped["id"], serde_json::json!(41));
        assert_eq!(round_tripped["score"], serde_json::json!(17));
        assert_eq!(round_tripped["source"], serde_json::json!("somewhere"));
        assert!(round_tripped.get("tag_string").is_none());
    }

    #[test]
    fn urls_keep_the_expression_separators_literal() {
        let sender = RequestSender::new("https://testbooru.donmai.us/").unwrap();
        let request = PageRequest {
            tags: "landscape+rating:g+id:>12+order:id".to_string(),
            limit: 200,
            page: 3,
        };
        assert_eq!(
            sender.search_url(&request),
            "https://testbooru.donmai.us/posts.json?tags=landscape+rating:g+id:>12+order:id&limit=200&page=3"
        );
        assert_eq!(
            sender.count_url("landscape"),
            "https://testbooru.donmai.us/tags.json?search[name]=landscape"
        );
    }

    #[test]
    fn credential_queries_are_encoded_unlike_search_urls() {
        let sender = RequestSender::new("https://testbooru.donmai.us").unwrap();
        let request = sender
            .status_request(
                "https://testbooru.donmai.us/users.json",
                &[("login", "who&am=i"), ("api_key", "abc#123")],
            )
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://testbooru.donmai.us/users.json?login=who%26am%3Di&api_key=abc%23123"
        );
    }
}
