use crate::fetcher::Fetcher;
use crate::types::{AggregatorError, BackendType, Post, Result, Tribune};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Display;
use tracing::{debug, warn};

/// Fields every delimited-text row must carry: id, time, info, login, message.
const TSV_FIELDS: usize = 5;

const BOARD: &[u8] = b"board";
const POST: &[u8] = b"post";

/// Turns one tribune's raw backend body into posts stamped with the tribune name.
pub struct FeedParser<'a> {
    tribune: &'a str,
}

impl<'a> FeedParser<'a> {
    pub fn new(tribune: &'a str) -> Self {
        Self { tribune }
    }

    /// Parse `content` in the given format and sort the result by id.
    pub fn parse_feed(&self, backend_type: BackendType, content: &str) -> Result<Vec<Post>> {
        let mut posts = match backend_type {
            BackendType::Tsv => self.parse_tsv(content),
            BackendType::Xml => self.parse_xml(content)?,
        };

        posts.sort_by_key(|post| post.id);
        debug!("Parsed {} posts from {}", posts.len(), self.tribune);
        Ok(posts)
    }

    /// Rows with fewer than five fields or a non-integer id are skipped; they never fail
    /// the whole feed. Quote characters are plain data. Records end at `\n` only.
    pub fn parse_tsv(&self, content: &str) -> Vec<Post> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(content.as_bytes());

        let mut posts = Vec::new();

        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable {} row: {}", self.tribune, e);
                    continue;
                }
            };

            if record.len() < TSV_FIELDS {
                continue;
            }

            let id = match record[0].trim().parse::<i64>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping {} row with id {:?}: {}", self.tribune, &record[0], e);
                    continue;
                }
            };

            let mut message = &record[4];
            if record.len() == TSV_FIELDS {
                message = message.strip_suffix('\r').unwrap_or(message);
            }

            posts.push(Post {
                id,
                time: record[1].to_string(),
                info: record[2].to_string(),
                login: record[3].to_string(),
                message: message.to_string(),
                tribune: self.tribune.to_string(),
            });
        }

        posts
    }

    /// Read a `<board>` document. Markup nested inside `info`, `login` or `message` is
    /// dropped and its surrounding text kept; unknown elements are skipped. A document that
    /// is malformed, truncated or rooted at anything but `<board>` fails as a whole.
    pub fn parse_xml(&self, content: &str) -> Result<Vec<Post>> {
        let mut reader = Reader::from_str(content);

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) if e.local_name().as_ref() == BOARD => {
                    return self.read_board(&mut reader);
                }
                Event::Empty(e) if e.local_name().as_ref() == BOARD => return Ok(Vec::new()),
                Event::Start(e) | Event::Empty(e) => {
                    return Err(AggregatorError::Xml(format!(
                        "expected <board>, found <{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                Event::Eof => return Err(AggregatorError::Xml("no <board> element".to_string())),
                _ => {}
            }
        }
    }

    fn read_board(&self, reader: &mut Reader<&[u8]>) -> Result<Vec<Post>> {
        let mut posts = Vec::new();

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) if e.local_name().as_ref() == POST => {
                    let mut post = self.new_post(&e)?;
                    read_post_children(reader, &mut post)?;
                    posts.push(post);
                }
                Event::Empty(e) if e.local_name().as_ref() == POST => posts.push(self.new_post(&e)?),
                Event::Start(e) => {
                    reader.read_to_end(e.name()).map_err(xml_error)?;
                }
                Event::End(_) => return Ok(posts),
                Event::Eof => return Err(truncated()),
                _ => {}
            }
        }
    }

    /// A post from the `id` and `time` attributes of its start tag. A missing or empty `id`
    /// reads as 0; any other non-integer `id` is an error.
    fn new_post(&self, start: &BytesStart) -> Result<Post> {
        let mut post = Post {
            id: 0,
            time: String::new(),
            info: String::new(),
            login: String::new(),
            message: String::new(),
            tribune: self.tribune.to_string(),
        };

        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let value = attr.unescape_value().map_err(xml_error)?;

            match attr.key.local_name().as_ref() {
                b"id" => {
                    let id = value.trim();
                    if !id.is_empty() {
                        post.id = id.parse().map_err(|e| {
                            AggregatorError::Xml(format!("post id {:?}: {}", id, e))
                        })?;
                    }
                }
                b"time" => post.time = value.into_owned(),
                _ => {}
            }
        }

        Ok(post)
    }
}

fn read_post_children(reader: &mut Reader<&[u8]>, post: &mut Post) -> Result<()> {
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let text = read_text(reader)?;
                if let Some(field) = post_field(post, e.local_name().as_ref()) {
                    *field = text;
                }
            }
            Event::Empty(e) => {
                if let Some(field) = post_field(post, e.local_name().as_ref()) {
                    field.clear();
                }
            }
            Event::End(_) => return Ok(()),
            Event::Eof => return Err(truncated()),
            _ => {}
        }
    }
}

fn post_field<'p>(post: &'p mut Post, name: &[u8]) -> Option<&'p mut String> {
    match name {
        b"info" => Some(&mut post.info),
        b"login" => Some(&mut post.login),
        b"message" => Some(&mut post.message),
        _ => None,
    }
}

/// Character data of the current element up to its end tag, nested elements skipped.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(xml_error)?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::Start(e) => {
                reader.read_to_end(e.name()).map_err(xml_error)?;
            }
            Event::End(_) => return Ok(text),
            Event::Eof => return Err(truncated()),
            _ => {}
        }
    }
}

fn xml_error(e: impl Display) -> AggregatorError {
    AggregatorError::Xml(e.to_string())
}

fn truncated() -> AggregatorError {
    AggregatorError::Xml("document ends before </board>".to_string())
}

/// Fetch and parse one tribune's feed: the full backend adapter contract.
pub async fn poll(fetcher: &Fetcher, tribune: &Tribune) -> Result<Vec<Post>> {
    let content = fetcher.fetch_feed(&tribune.backend_url).await?;
    FeedParser::new(&tribune.name).parse_feed(tribune.backend_type, &content)
}
