//! Streaming parser for WebDAV PROPFIND multistatus responses.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use std::str;

/// One entry (file or collection) from a PROPFIND listing. `href` is the
/// decoded server path, including the DAV namespace prefix.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub href: String,
    pub name: String,
    pub size: i64,
    pub is_directory: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

#[derive(Debug, Default)]
struct ResponseAccumulator {
    href: String,
    displayname: String,
    content_length: Option<i64>,
    last_modified: Option<String>,
    etag: Option<String>,
    is_collection: bool,
}

/// Parses a multistatus body into entries, directories included. Entries
/// without a 200-class propstat are dropped.
pub fn parse_propfind_response(xml_text: &str) -> Result<Vec<RemoteEntry>> {
    let mut reader = Reader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ResponseAccumulator> = None;
    let mut current_element = String::new();
    let mut in_response = false;
    let mut in_propstat = false;
    let mut in_resourcetype = false;
    let mut status_ok = false;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = local_name(&e)?;
                match name.as_str() {
                    "response" => {
                        in_response = true;
                        current = Some(ResponseAccumulator::default());
                    }
                    "propstat" => in_propstat = true,
                    "resourcetype" => in_resourcetype = true,
                    "collection" if in_resourcetype => {
                        if let Some(ref mut resp) = current {
                            resp.is_collection = true;
                        }
                    }
                    _ => current_element = name,
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape()?.to_string();
                if in_response && !text.trim().is_empty() {
                    if let Some(ref mut resp) = current {
                        match current_element.as_str() {
                            "href" => resp.href = text.trim().to_string(),
                            "displayname" => resp.displayname = text.trim().to_string(),
                            "getcontentlength" => resp.content_length = text.trim().parse().ok(),
                            "getlastmodified" => resp.last_modified = Some(text.trim().to_string()),
                            "getetag" => resp.etag = Some(text.trim().to_string()),
                            "status" if in_propstat => {
                                if text.contains("200") {
                                    status_ok = true;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name_end(&e)?;
                match name.as_str() {
                    "response" => {
                        if let Some(resp) = current.take() {
                            if status_ok && !resp.href.is_empty() {
                                entries.push(finish_entry(resp));
                            }
                        }
                        in_response = false;
                        status_ok = false;
                    }
                    "propstat" => in_propstat = false,
                    "resourcetype" => in_resourcetype = false,
                    _ => {}
                }
                current_element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("XML parsing error: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn finish_entry(resp: ResponseAccumulator) -> RemoteEntry {
    let decoded_href = urlencoding::decode(&resp.href)
        .map(|c| c.into_owned())
        .unwrap_or(resp.href);

    let name = if resp.displayname.is_empty() {
        decoded_href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string()
    } else {
        resp.displayname
    };

    RemoteEntry {
        href: decoded_href,
        name,
        size: resp.content_length.unwrap_or(0),
        is_directory: resp.is_collection,
        last_modified: parse_http_date(resp.last_modified.as_deref().unwrap_or("")),
        etag: resp.etag,
    }
}

fn local_name(e: &BytesStart) -> Result<String> {
    let qname = e.name();
    let local = qname.local_name();
    let name = str::from_utf8(local.as_ref())
        .map_err(|e| anyhow!("Invalid UTF-8 in element name: {}", e))?;
    Ok(name.to_string())
}

fn local_name_end(e: &BytesEnd) -> Result<String> {
    let qname = e.name();
    let local = qname.local_name();
    let name = str::from_utf8(local.as_ref())
        .map_err(|e| anyhow!("Invalid UTF-8 in element name: {}", e))?;
    Ok(name.to_string())
}

fn parse_http_date(date_str: &str) -> Option<DateTime<Utc>> {
    if date_str.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(date_str)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}
