//! XWiki client against a local stub HTTP server

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use everwiki_core::models::{Attachment, ConvertedPage};
use everwiki_core::{UploadError, Uploader, XWikiClient, XWikiSettings};

#[derive(Debug, Clone)]
struct Request {
    method: String,
    path: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

type Requests = Arc<Mutex<Vec<Request>>>;

/// Serve each connection with the status `respond` picks for it
fn spawn_stub<F>(respond: F) -> (String, Requests)
where
    F: Fn(&Request) -> u16 + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            if let Some(request) = read_request(&stream) {
                let status = respond(&request);
                seen.lock().unwrap().push(request);
                write_response(stream, status);
            }
        }
    });

    (base, requests)
}

fn read_request(stream: &TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0;
    let mut authorization = None;
    let mut content_type = None;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim().to_string();
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.parse().unwrap_or(0),
                "authorization" => authorization = Some(value),
                "content-type" => content_type = Some(value),
                _ => {}
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(Request {
        method,
        path,
        authorization,
        content_type,
        body,
    })
}

fn write_response(mut stream: TcpStream, status: u16) {
    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: text/plain\r\nContent-Length: 4\r\nConnection: close\r\n\r\nstub",
        status
    );
    let _ = stream.write_all(response.as_bytes());
}

fn client(base: &str) -> XWikiClient {
    XWikiClient::new(&XWikiSettings {
        base_url: base.to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        rate_limit: Duration::ZERO,
        timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .unwrap()
}

fn page() -> ConvertedPage {
    ConvertedPage {
        source_id: "0123456789abcdef".to_string(),
        title: "Trip & Plan".to_string(),
        space: "ImportedNotes.Travel".to_string(),
        page_name: "TripPlan".to_string(),
        content: "Pack **bags**".to_string(),
        tags: vec!["travel".to_string()],
        attachments: vec![Attachment::from_data(
            b"hello".to_vec(),
            "image/png",
            Some("map.png".to_string()),
        )],
        created: None,
        updated: None,
        warnings: Vec::new(),
    }
}

const PAGE_PATH: &str =
    "/rest/wikis/xwiki/spaces/ImportedNotes/spaces/Travel/spaces/TripPlan/pages/WebHome";

#[test]
fn test_upload_sends_page_attachments_tags_then_verifies() {
    let (base, requests) = spawn_stub(|request| match request.method.as_str() {
        "PUT" => 201,
        _ => 200,
    });

    let report = client(&base).upload(page()).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.reference, "ImportedNotes.Travel.TripPlan");
    assert_eq!(report.attachments_uploaded, 1);
    assert_eq!(
        report.page_url,
        format!("{}/wiki/xwiki/ImportedNotes/Travel/TripPlan", base)
    );

    let requests = requests.lock().unwrap();
    let calls: Vec<(&str, &str)> = requests
        .iter()
        .map(|r| (r.method.as_str(), r.path.as_str()))
        .collect();
    assert_eq!(
        calls,
        vec![
            ("PUT", PAGE_PATH),
            ("PUT", &*format!("{}/attachments/map.png", PAGE_PATH)),
            ("PUT", &*format!("{}/tags", PAGE_PATH)),
            ("GET", PAGE_PATH),
        ]
    );

    let page_body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(page_body.contains("<title>Trip &amp; Plan</title>"));
    assert!(page_body.contains("<syntax>xwiki/2.1</syntax>"));
    assert!(requests[0]
        .authorization
        .as_deref()
        .is_some_and(|auth| auth.starts_with("Basic ")));

    assert_eq!(requests[1].content_type.as_deref(), Some("image/png"));
    assert_eq!(requests[1].body, b"hello");

    let tags_body = String::from_utf8(requests[2].body.clone()).unwrap();
    assert!(tags_body.contains("travel"));
}

#[test]
fn test_rejected_page_aborts_upload() {
    let (base, requests) = spawn_stub(|_| 403);

    let err = client(&base).upload(page()).unwrap_err();
    assert!(matches!(err, UploadError::PageRejected { status: 403, .. }));
    assert!(err.recovery_suggestion().is_some());
    // Nothing after the page write
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[test]
fn test_attachment_failure_is_reported_not_fatal() {
    let (base, _requests) = spawn_stub(|request| {
        if request.path.contains("/attachments/") {
            500
        } else if request.method == "PUT" {
            201
        } else {
            200
        }
    });

    let report = client(&base).upload(page()).unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.attachments_uploaded, 0);
    assert_eq!(report.attachments_failed.len(), 1);
    assert_eq!(report.attachments_failed[0].filename, "map.png");
    assert!(report.tags_error.is_none());
}

#[test]
fn test_missing_page_after_write_fails_verification() {
    let (base, _requests) = spawn_stub(|request| match request.method.as_str() {
        "PUT" => 202,
        _ => 404,
    });

    let err = client(&base).upload(page()).unwrap_err();
    assert!(matches!(err, UploadError::VerificationFailed { .. }));
}

#[test]
fn test_page_exists_and_delete() {
    let (base, _requests) = spawn_stub(|request| {
        match (request.method.as_str(), request.path.contains("Known")) {
            ("GET", true) => 200,
            ("GET", false) => 404,
            ("DELETE", true) => 204,
            _ => 404,
        }
    });
    let client = client(&base);

    assert!(client.page_exists("Notes", "Known").unwrap());
    assert!(!client.page_exists("Notes", "Other").unwrap());
    assert!(client.delete_page("Notes", "Known").unwrap());
    assert!(!client.delete_page("Notes", "Other").unwrap());
}

#[test]
fn test_connection_check() {
    let (base, requests) = spawn_stub(|_| 200);
    client(&base).test_connection().unwrap();
    assert_eq!(requests.lock().unwrap()[0].path, "/rest/wikis/xwiki");

    let (base, _requests) = spawn_stub(|_| 401);
    let err = client(&base).test_connection().unwrap_err();
    assert!(matches!(err, UploadError::ConnectionFailed { status: 401, .. }));
}
