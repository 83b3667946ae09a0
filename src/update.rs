use log::{debug, info, trace};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::auth::Session;
use crate::error::Result;

#[derive(Serialize, Debug)]
struct Comment<'a> {
    body: &'a str,
}

pub fn comment_url(host: &str, api_path: &str, ticket: &str) -> String {
    format!("{}{}{}/comment", host, api_path, ticket)
}

/// Append `comment` to `ticket`.
pub fn update_ticket(session: &Session, api_path: &str, ticket: &str, comment: &str) -> Result<()> {
    info!("[update] updating ticket {}", ticket);
    let url = comment_url(session.host(), api_path, ticket);
    debug!("[update] {}", url);

    let body = Comment { body: comment };
    trace!("[update] data: {:?}", body);

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-atlassian-token"),
        HeaderValue::from_static("no-check"),
    );
    session.post_json(&url, headers, &body)
}

/// Post the same comment to every ticket, stopping at the first failure.
/// Tickets updated before a failure stay updated.
pub fn update_tickets(session: &Session, api_path: &str, tickets: &[String], comment: &str) -> Result<()> {
    for ticket in tickets {
        update_ticket(session, api_path, ticket, comment)?;
    }
    info!("[update] updated {} ticket(s)", tickets.len());
    Ok(())
}
