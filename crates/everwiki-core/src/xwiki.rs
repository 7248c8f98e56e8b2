//! XWiki REST client
//!
//! Writes converted pages through the XWiki REST API using the nested-page
//! layout: a page `Space.Sub.Name` lives at
//! `/rest/wikis/{wiki}/spaces/Space/spaces/Sub/spaces/Name/pages/WebHome`.
//!
//! Every write is preceded by the configured rate-limit delay. Requests are
//! never retried.

use std::thread;
use std::time::Duration;

use quick_xml::escape::escape;
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::models::ConvertedPage;

/// XWiki XML namespace
const XWIKI_NS: &str = "http://www.xwiki.org";

/// Longest response body kept in error messages
const MAX_ERROR_BODY: usize = 500;

/// Connection settings for one wiki
#[derive(Debug, Clone)]
pub struct XWikiSettings {
    /// Wiki root, e.g. `https://yourwiki.xwiki.cloud`
    pub base_url: String,
    /// Wiki name in REST paths (`xwiki` for the main wiki)
    pub wiki_name: String,
    pub username: String,
    pub password: String,
    /// Delay before each write request
    pub rate_limit: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for XWikiSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            wiki_name: "xwiki".to_string(),
            username: String::new(),
            password: String::new(),
            rate_limit: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// An attachment the wiki did not accept
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentFailure {
    pub filename: String,
    pub reason: String,
}

/// Outcome of a page upload that the wiki accepted
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    /// Dot-separated page reference
    pub reference: String,
    /// Browser URL of the page
    pub page_url: String,
    pub attachments_uploaded: usize,
    pub attachments_failed: Vec<AttachmentFailure>,
    /// Why the tag list was rejected, if it was
    pub tags_error: Option<String>,
}

impl UploadReport {
    /// True when the page, every attachment and the tags were stored
    pub fn is_complete(&self) -> bool {
        self.attachments_failed.is_empty() && self.tags_error.is_none()
    }
}

/// Destination the import pipeline uploads pages to
pub trait Uploader {
    /// Upload a page with its attachments and tags
    fn upload(&self, page: ConvertedPage) -> Result<UploadReport, UploadError>;

    /// Whether a page already exists at `space.page_name`
    fn page_exists(&self, space: &str, page_name: &str) -> Result<bool, UploadError>;
}

/// Blocking XWiki REST client
pub struct XWikiClient {
    client: Client,
    base: Url,
    wiki_name: String,
    username: String,
    password: String,
    rate_limit: Duration,
}

impl XWikiClient {
    pub fn new(settings: &XWikiSettings) -> Result<Self, UploadError> {
        let raw = settings.base_url.trim();
        let base = Url::parse(raw.trim_end_matches('/')).map_err(|e| UploadError::InvalidUrl {
            url: raw.to_string(),
            details: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(UploadError::InvalidUrl {
                url: raw.to_string(),
                details: "URL must start with http:// or https://".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("everwiki/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| UploadError::Http {
                url: raw.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base,
            wiki_name: settings.wiki_name.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            rate_limit: settings.rate_limit,
        })
    }

    /// Base URL with extra path segments appended (percent-encoded)
    fn url_with<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `/rest/wikis/{wiki}`
    pub fn rest_url(&self) -> Url {
        self.url_with(["rest", "wikis", self.wiki_name.as_str()])
    }

    /// REST URL of a page's `WebHome` document
    pub fn page_rest_url(&self, space: &str, page_name: &str) -> Url {
        self.url_with(page_segments(&self.wiki_name, space, page_name))
    }

    fn attachment_url(&self, space: &str, page_name: &str, filename: &str) -> Url {
        let mut segments = page_segments(&self.wiki_name, space, page_name);
        segments.extend(["attachments", filename]);
        self.url_with(segments)
    }

    fn tags_url(&self, space: &str, page_name: &str) -> Url {
        let mut segments = page_segments(&self.wiki_name, space, page_name);
        segments.push("tags");
        self.url_with(segments)
    }

    /// Browser URL: `{base}/wiki/{wiki}/{A}/{B}/{page}`
    pub fn view_url(&self, space: &str, page_name: &str) -> Url {
        let mut segments = vec!["wiki", self.wiki_name.as_str()];
        segments.extend(space.split('.').filter(|s| !s.is_empty()));
        segments.push(page_name);
        self.url_with(segments)
    }

    fn throttle(&self) {
        if !self.rate_limit.is_zero() {
            thread::sleep(self.rate_limit);
        }
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder, url: &Url) -> Result<Response, UploadError> {
        request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|source| UploadError::Http {
                url: url.to_string(),
                source,
            })
    }

    fn put(&self, url: &Url, content_type: &str, body: Vec<u8>) -> Result<Response, UploadError> {
        self.throttle();
        debug!("PUT {} ({}, {} bytes)", url, content_type, body.len());
        self.send(
            self.client
                .put(url.clone())
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body),
            url,
        )
    }

    /// Check that the REST root answers for these credentials
    pub fn test_connection(&self) -> Result<(), UploadError> {
        let url = self.rest_url();
        debug!("GET {}", url);
        let response = self.send(
            self.client
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "application/json"),
            &url,
        )?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(UploadError::ConnectionFailed {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// Delete a page; `false` when it did not exist
    pub fn delete_page(&self, space: &str, page_name: &str) -> Result<bool, UploadError> {
        let url = self.page_rest_url(space, page_name);
        self.throttle();
        debug!("DELETE {}", url);
        let response = self.send(self.client.delete(url.clone()), &url)?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(rejected(format!("{}.{}", space, page_name), status, response)),
        }
    }

    fn put_page(&self, page: &ConvertedPage) -> Result<(), UploadError> {
        let url = self.page_rest_url(&page.space, &page.page_name);
        let response = self.put(
            &url,
            "application/xml; charset=UTF-8",
            page_xml(&page.title, &page.content).into_bytes(),
        )?;

        let status = response.status();
        if is_write_success(status) {
            Ok(())
        } else {
            Err(rejected(page.reference(), status, response))
        }
    }

    fn put_tags(&self, space: &str, page_name: &str, tags: &[String]) -> Result<(), String> {
        let url = self.tags_url(space, page_name);
        let response = self
            .put(&url, "application/xml; charset=UTF-8", tags_xml(tags).into_bytes())
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if is_write_success(status) {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }
}

impl Uploader for XWikiClient {
    fn upload(&self, page: ConvertedPage) -> Result<UploadReport, UploadError> {
        let reference = page.reference();
        self.put_page(&page)?;

        let mut report = UploadReport {
            reference: reference.clone(),
            page_url: self.view_url(&page.space, &page.page_name).to_string(),
            attachments_uploaded: 0,
            attachments_failed: Vec::new(),
            tags_error: None,
        };

        for attachment in page.attachments {
            let url = self.attachment_url(&page.space, &page.page_name, &attachment.filename);
            let outcome = self
                .put(&url, &attachment.mime_type, attachment.data)
                .map(|response| response.status());

            match outcome {
                Ok(status) if is_write_success(status) => report.attachments_uploaded += 1,
                Ok(status) => {
                    warn!("Attachment {} of {} rejected: HTTP {}", attachment.filename, reference, status);
                    report.attachments_failed.push(AttachmentFailure {
                        filename: attachment.filename,
                        reason: format!("HTTP {}", status.as_u16()),
                    });
                }
                Err(e) => {
                    warn!("Attachment {} of {} failed: {}", attachment.filename, reference, e);
                    report.attachments_failed.push(AttachmentFailure {
                        filename: attachment.filename,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !page.tags.is_empty() {
            if let Err(reason) = self.put_tags(&page.space, &page.page_name, &page.tags) {
                warn!("Tags of {} rejected: {}", reference, reason);
                report.tags_error = Some(reason);
            }
        }

        if !self.page_exists(&page.space, &page.page_name)? {
            return Err(UploadError::VerificationFailed { page: reference });
        }

        info!("Uploaded {} ({} attachments)", reference, report.attachments_uploaded);
        Ok(report)
    }

    fn page_exists(&self, space: &str, page_name: &str) -> Result<bool, UploadError> {
        let url = self.page_rest_url(space, page_name);
        debug!("GET {}", url);
        let response = self.send(
            self.client
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "application/xml"),
            &url,
        )?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(rejected(format!("{}.{}", space, page_name), status, response)),
        }
    }
}

/// Path segments of a page's `WebHome` below the base URL
fn page_segments<'s>(wiki_name: &'s str, space: &'s str, page_name: &'s str) -> Vec<&'s str> {
    let mut segments = vec!["rest", "wikis", wiki_name];
    for part in space.split('.').filter(|s| !s.is_empty()) {
        segments.extend(["spaces", part]);
    }
    segments.extend(["spaces", page_name, "pages", "WebHome"]);
    segments
}

fn is_write_success(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED
    )
}

fn rejected(page: String, status: StatusCode, response: Response) -> UploadError {
    let body: String = response
        .text()
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY)
        .collect();
    UploadError::PageRejected {
        page,
        status: status.as_u16(),
        body,
    }
}

/// Page document for `PUT .../pages/WebHome`
pub fn page_xml(title: &str, content: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<page xmlns=\"{}\">\n  <title>{}</title>\n  <syntax>xwiki/2.1</syntax>\n  <content>{}</content>\n</page>",
        XWIKI_NS,
        escape(title),
        escape(content)
    )
}

/// Tag list document for `PUT .../tags`
pub fn tags_xml(tags: &[String]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tags xmlns=\"{}\">\n",
        XWIKI_NS
    );
    for tag in tags {
        xml.push_str(&format!("  <tag><name>{}</name></tag>\n", escape(tag.as_str())));
    }
    xml.push_str("</tags>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> XWikiClient {
        XWikiClient::new(&XWikiSettings {
            base_url: base_url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_page_urls() {
        let client = client("https://wiki.example.com/");

        assert_eq!(
            client.page_rest_url("ImportedNotes.Travel", "Trip-Plan").as_str(),
            "https://wiki.example.com/rest/wikis/xwiki/spaces/ImportedNotes/spaces/Travel/spaces/Trip-Plan/pages/WebHome"
        );
        assert_eq!(
            client.view_url("ImportedNotes.Travel", "Trip-Plan").as_str(),
            "https://wiki.example.com/wiki/xwiki/ImportedNotes/Travel/Trip-Plan"
        );
        assert_eq!(
            client.rest_url().as_str(),
            "https://wiki.example.com/rest/wikis/xwiki"
        );
    }

    #[test]
    fn test_urls_are_percent_encoded() {
        let client = client("https://wiki.example.com/xwiki");
        let url = client.attachment_url("Notes", "Q&A", "my file#1.png");
        assert_eq!(
            url.as_str(),
            "https://wiki.example.com/xwiki/rest/wikis/xwiki/spaces/Notes/spaces/Q&A/pages/WebHome/attachments/my%20file%231.png"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = XWikiClient::new(&XWikiSettings {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(err, Err(UploadError::InvalidUrl { .. })));

        let err = XWikiClient::new(&XWikiSettings {
            base_url: "ftp://wiki.example.com".to_string(),
            ..Default::default()
        });
        assert!(matches!(err, Err(UploadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_page_xml_escapes() {
        let xml = page_xml("A & <B>", "**x** < y");
        assert!(xml.contains("<title>A &amp; &lt;B&gt;</title>"));
        assert!(xml.contains("<syntax>xwiki/2.1</syntax>"));
        assert!(xml.contains("<content>**x** &lt; y</content>"));
        assert!(xml.contains("xmlns=\"http://www.xwiki.org\""));
    }

    #[test]
    fn test_tags_xml() {
        let xml = tags_xml(&["home".to_string(), "r&d".to_string()]);
        assert!(xml.contains("<tag><name>home</name></tag>"));
        assert!(xml.contains("<tag><name>r&amp;d</name></tag>"));
    }

    #[test]
    fn test_report_completeness() {
        let mut report = UploadReport {
            reference: "S.P".into(),
            page_url: String::new(),
            attachments_uploaded: 1,
            attachments_failed: Vec::new(),
            tags_error: None,
        };
        assert!(report.is_complete());
        report.tags_error = Some("HTTP 500".into());
        assert!(!report.is_complete());
    }
}
