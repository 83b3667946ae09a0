use log::{debug, info, trace, warn};
use mailparse::ParsedMail;
use regex::Regex;
use std::sync::OnceLock;

use crate::config::Config;
use crate::error::Result;
use crate::message::Message;

/// Recipient headers, in the order they are checked for the tracked address.
const RECIPIENT_HEADERS: [&str; 3] = ["To", "Cc", "Bcc"];

static TICKET: OnceLock<Regex> = OnceLock::new();
static SENDER: OnceLock<Regex> = OnceLock::new();

fn ticket_re() -> &'static Regex {
    TICKET.get_or_init(|| Regex::new(r"[A-Z]+-[0-9]+").expect("Invalid regex"))
}

fn sender_re() -> &'static Regex {
    SENDER.get_or_init(|| Regex::new(r"(?:^|[\s<])([^\s<>@]+)@").expect("Invalid regex"))
}

/// What a message addressed to Jira asks us to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Local part of the From address, unless FROM is configured.
    pub sender: Option<String>,
    pub tickets: Vec<String>,
    pub comment: String,
}

impl Submission {
    pub fn is_actionable(&self) -> bool {
        !self.comment.is_empty() && !self.tickets.is_empty()
    }
}

/// Inspect `msg` and, if it was sent to the tracked address, strip that
/// address from the recipients and return what should be posted.
pub fn process(msg: &mut Message, config: &Config) -> Result<Option<Submission>> {
    info!("[filter] parsing input");

    let Some(tracked) = config.tracked_address.as_deref() else {
        warn!("[filter] no JIRA address configured, passing message through");
        return Ok(None);
    };
    let pattern = address_pattern(tracked);

    if !strip_tracked_address(msg, &pattern) {
        info!(
            "[filter] address ({}) does not match our Jira address ({}), ignoring",
            msg.header("To").unwrap_or(""),
            tracked
        );
        return Ok(None);
    }

    let sender = match &config.sender {
        Some(_) => None,
        None => {
            let sender = msg.header("From").and_then(sender_identity);
            debug!("[filter] From: {}", sender.as_deref().unwrap_or("<unknown>"));
            sender
        }
    };

    let tickets = msg.header("Subject").map(parse_subject).unwrap_or_default();
    debug!("[filter] tickets found in Subject: {}", tickets.join(", "));

    let comment = comment_text(&msg.mime()?);
    trace!("[filter] comment: {}", comment);

    Ok(Some(Submission {
        sender,
        tickets,
        comment,
    }))
}

/// Case-insensitive match of `address` delimited by whitespace, `<`, `>`, `,`
/// or the ends of the text.
pub fn address_pattern(address: &str) -> Regex {
    let pattern = format!(r"(?i)(?:^|[\s<,]){}(?:$|[\s>,])", regex::escape(address));
    Regex::new(&pattern).expect("escaped address is a valid regex")
}

/// Remove the tracked address from the first of To, Cc, Bcc that contains it.
/// A header left without any address is deleted. Returns whether one matched.
fn strip_tracked_address(msg: &mut Message, pattern: &Regex) -> bool {
    for name in RECIPIENT_HEADERS {
        let Some(value) = msg.raw_header(name) else {
            continue;
        };
        let Some(stripped) = remove_address(&value, pattern) else {
            continue;
        };

        if stripped.contains('@') {
            debug!("[filter] {}: {}", name, stripped);
            msg.replace_header(name, &stripped);
        } else {
            debug!("[filter] {} had no other recipients, removing it", name);
            msg.remove_header(name);
        }
        return true;
    }
    false
}

/// Drop every entry of a recipient list that matches `pattern`.
/// `None` when nothing matched.
pub fn remove_address(value: &str, pattern: &Regex) -> Option<String> {
    if !pattern.is_match(value) {
        return None;
    }
    let kept = split_addresses(value)
        .into_iter()
        .filter(|entry| !pattern.is_match(entry))
        .collect::<Vec<_>>();
    Some(kept.join(", "))
}

/// Split a recipient list on commas that are not inside quotes or `<...>`.
fn split_addresses(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut quoted = false;
    let mut angle = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '<' if !quoted => angle = true,
            '>' if !quoted => angle = false,
            ',' if !quoted && !angle => {
                entries.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(value[start..].trim());
    entries.retain(|e| !e.is_empty());
    entries
}

/// The part of the address before `@`: `Jane <jdoe@example.com>` gives `jdoe`.
/// The last address wins, so an `@` inside the display name is skipped.
pub fn sender_identity(from: &str) -> Option<String> {
    sender_re()
        .captures_iter(from)
        .last()
        .map(|caps| caps[1].to_string())
}

/// Ticket keys like `FOO-123` in first-seen order, without duplicates.
pub fn parse_subject(subject: &str) -> Vec<String> {
    trace!("[filter] subject: {}", subject.trim_end());
    let mut tickets: Vec<String> = Vec::new();
    for m in ticket_re().find_iter(subject) {
        if !tickets.iter().any(|t| t == m.as_str()) {
            tickets.push(m.as_str().to_string());
        }
    }
    tickets
}

/// The body of a single-part message, or the first text/plain part of a
/// multipart one. Empty if there is none.
pub fn comment_text(mail: &ParsedMail) -> String {
    if mail.subparts.is_empty() {
        return mail.get_body().unwrap_or_default();
    }
    match find_plain_part(mail) {
        Some(text) => text,
        None => {
            debug!("[filter] multipart message without a text/plain part");
            String::new()
        }
    }
}

fn find_plain_part(mail: &ParsedMail) -> Option<String> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            return mail.get_body().ok();
        }
        return None;
    }
    mail.subparts.iter().find_map(find_plain_part)
}
