use log::debug;
use mailparse::ParsedMail;
use std::io::{self, Write};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    /// Value bytes exactly as they appeared in the input, folding included.
    raw: Vec<u8>,
    /// RFC 2047 decoded, unfolded value.
    value: String,
}

/// An email read from stdin.
///
/// Headers can be rewritten; the body is never touched. A message whose
/// headers were not changed is written back byte for byte.
#[derive(Debug)]
pub struct Message {
    raw: Vec<u8>,
    headers: Vec<Header>,
    body_offset: usize,
    line_ending: &'static str,
    modified: bool,
}

impl Message {
    pub fn parse(mut raw: Vec<u8>) -> Result<Self> {
        // mbox envelope line ("From sender date"); it is never written back
        if is_envelope_line(&raw) {
            let end = raw
                .iter()
                .position(|&b| b == b'\n')
                .map_or(raw.len(), |i| i + 1);
            debug!(
                "[filter] dropping envelope line: {}",
                String::from_utf8_lossy(&raw[..end]).trim_end()
            );
            raw = raw.split_off(end);
        }

        let (parsed, body_offset) = mailparse::parse_headers(&raw)?;
        let headers = parsed
            .iter()
            .map(|h| Header {
                name: h.get_key(),
                raw: h.get_value_raw().to_vec(),
                value: h.get_value(),
            })
            .collect::<Vec<_>>();

        let line_ending = if raw[..body_offset].windows(2).any(|w| w == b"\r\n") {
            "\r\n"
        } else {
            "\n"
        };

        debug!(
            "[filter] parsed {} headers, body is {} bytes",
            headers.len(),
            raw.len() - body_offset
        );

        Ok(Self {
            raw,
            headers,
            body_offset,
            line_ending,
            modified: false,
        })
    }

    /// Decoded value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.find(name).map(|h| h.value.as_str())
    }

    /// Undecoded value of the first header called `name`. 8-bit bytes that
    /// are not UTF-8 show up as U+FFFD here but are kept in the output.
    pub fn raw_header(&self, name: &str) -> Option<String> {
        self.find(name)
            .map(|h| String::from_utf8_lossy(&h.raw).into_owned())
    }

    pub fn replace_header(&mut self, name: &str, value: &str) {
        if let Some(h) = self
            .headers
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(name))
        {
            h.raw = value.as_bytes().to_vec();
            h.value = value.to_string();
            self.modified = true;
        }
    }

    /// Remove every header called `name`.
    pub fn remove_header(&mut self, name: &str) {
        let before = self.headers.len();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        if self.headers.len() != before {
            self.modified = true;
        }
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// MIME structure of the message, for body extraction.
    pub fn mime(&self) -> Result<ParsedMail<'_>> {
        Ok(mailparse::parse_mail(&self.raw)?)
    }

    pub fn body(&self) -> &[u8] {
        &self.raw[self.body_offset..]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        if !self.modified {
            return self.raw.clone();
        }
        let mut out = Vec::with_capacity(self.raw.len());
        for h in &self.headers {
            out.extend_from_slice(h.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(&h.raw);
            out.extend_from_slice(self.line_ending.as_bytes());
        }
        out.extend_from_slice(self.line_ending.as_bytes());
        out.extend_from_slice(self.body());
        out
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        out.write_all(&self.to_bytes())?;
        out.flush()
    }

    fn find(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.name.eq_ignore_ascii_case(name))
    }
}

/// An mbox `From sender date` line, as opposed to a `From:` or `From :` header.
fn is_envelope_line(raw: &[u8]) -> bool {
    raw.starts_with(b"From ")
        && raw[5..].iter().find(|b| !b.is_ascii_whitespace()) != Some(&b':')
}
