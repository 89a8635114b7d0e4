//! Header/body projections of a stored article.
//!
//! An article is stored once, verbatim. The header block and the body are
//! derived at read time by wrapping the file reader:
//!
//! - [`HeadReader`] yields every line before the first blank line and then
//!   reports end-of-stream.
//! - [`BodyReader`] discards everything up to and including the first blank
//!   line and then hands reads straight to the source.
//!
//! A blank line is a bare `\n` or `\r\n`. Both readers are forward-only and
//! single-pass: they never seek and never hold more than the source's own
//! buffer. Reading a view twice means reopening the file.

use std::fmt;
use std::io::{self, BufRead, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which projection of an article to serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    /// The whole article (`ARTICLE`).
    #[serde(rename = "ARTICLE")]
    Full,
    /// The header block only (`HEAD`).
    #[serde(rename = "HEAD")]
    HeadersOnly,
    /// The body only (`BODY`).
    #[serde(rename = "BODY")]
    BodyOnly,
}

impl ViewKind {
    /// All accepted kinds, in the order they are listed to callers.
    pub const ALL: [ViewKind; 3] = [Self::HeadersOnly, Self::Full, Self::BodyOnly];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "ARTICLE",
            Self::HeadersOnly => "HEAD",
            Self::BodyOnly => "BODY",
        }
    }

    /// Wrap `source` in the reader for this projection.
    pub fn apply<R: BufRead>(self, source: R) -> View<R> {
        match self {
            Self::Full => View::Full(source),
            Self::HeadersOnly => View::Head(HeadReader::new(source)),
            Self::BodyOnly => View::Body(BodyReader::new(source)),
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a view name is not one of `HEAD`, `ARTICLE`, `BODY`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid view kind {0:?}")]
pub struct ParseViewKindError(pub String);

impl FromStr for ViewKind {
    type Err = ParseViewKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARTICLE" => Ok(Self::Full),
            "HEAD" => Ok(Self::HeadersOnly),
            "BODY" => Ok(Self::BodyOnly),
            other => Err(ParseViewKindError(other.to_string())),
        }
    }
}

/// Position of a scan relative to the header/body boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scan {
    /// At the first byte of a line.
    LineStart,
    /// Inside a non-blank line.
    InLine,
    /// A line began with `\r`; the next byte decides whether it is blank.
    HeldCr,
    /// The blank line has been consumed.
    Boundary,
    /// Source ended before any blank line.
    Exhausted,
}

/// Yields the header block of an article: every line before the first blank
/// line. The blank line itself is not emitted.
pub struct HeadReader<R> {
    inner: R,
    scan: Scan,
}

impl<R: BufRead> HeadReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            scan: Scan::LineStart,
        }
    }
}

impl<R: BufRead> Read for HeadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match self.scan {
                Scan::Boundary | Scan::Exhausted => break,
                Scan::LineStart => {
                    let first = self.inner.fill_buf()?.first().copied();
                    match first {
                        None => self.scan = Scan::Exhausted,
                        Some(b'\n') => {
                            self.inner.consume(1);
                            self.scan = Scan::Boundary;
                        }
                        Some(b'\r') => {
                            self.inner.consume(1);
                            self.scan = Scan::HeldCr;
                        }
                        Some(_) => self.scan = Scan::InLine,
                    }
                }
                Scan::HeldCr => {
                    let first = self.inner.fill_buf()?.first().copied();
                    match first {
                        Some(b'\n') => {
                            self.inner.consume(1);
                            self.scan = Scan::Boundary;
                        }
                        // A lone `\r` opening a line is content; give it back.
                        Some(_) => {
                            buf[written] = b'\r';
                            written += 1;
                            self.scan = Scan::InLine;
                        }
                        None => {
                            buf[written] = b'\r';
                            written += 1;
                            self.scan = Scan::Exhausted;
                        }
                    }
                }
                Scan::InLine => {
                    let avail = self.inner.fill_buf()?;
                    if avail.is_empty() {
                        self.scan = Scan::Exhausted;
                        continue;
                    }
                    let line_end = avail.iter().position(|&b| b == b'\n').map(|i| i + 1);
                    let take = line_end.unwrap_or(avail.len()).min(buf.len() - written);
                    buf[written..written + take].copy_from_slice(&avail[..take]);
                    self.inner.consume(take);
                    written += take;
                    if line_end == Some(take) {
                        self.scan = Scan::LineStart;
                    }
                }
            }
        }
        Ok(written)
    }
}

/// Yields the body of an article: everything after the first blank line.
/// Yields nothing if the article has no blank line.
pub struct BodyReader<R> {
    inner: R,
    scan: Scan,
}

impl<R: BufRead> BodyReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            scan: Scan::LineStart,
        }
    }

    /// Skip forward until the boundary or the end of the source.
    fn seek_boundary(&mut self) -> io::Result<()> {
        loop {
            match self.scan {
                Scan::Boundary | Scan::Exhausted => return Ok(()),
                Scan::LineStart | Scan::HeldCr => {
                    let held_cr = self.scan == Scan::HeldCr;
                    let first = self.inner.fill_buf()?.first().copied();
                    self.scan = match first {
                        None => Scan::Exhausted,
                        Some(b'\n') => {
                            self.inner.consume(1);
                            Scan::Boundary
                        }
                        Some(b'\r') if !held_cr => {
                            self.inner.consume(1);
                            Scan::HeldCr
                        }
                        Some(_) => Scan::InLine,
                    };
                }
                Scan::InLine => {
                    let avail = self.inner.fill_buf()?;
                    if avail.is_empty() {
                        self.scan = Scan::Exhausted;
                        continue;
                    }
                    match avail.iter().position(|&b| b == b'\n') {
                        Some(i) => {
                            self.inner.consume(i + 1);
                            self.scan = Scan::LineStart;
                        }
                        None => {
                            let len = avail.len();
                            self.inner.consume(len);
                        }
                    }
                }
            }
        }
    }
}

impl<R: BufRead> Read for BodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.seek_boundary()?;
        match self.scan {
            Scan::Boundary => self.inner.read(buf),
            _ => Ok(0),
        }
    }
}

/// A projection of an article selected at runtime by [`ViewKind`].
pub enum View<R> {
    Full(R),
    Head(HeadReader<R>),
    Body(BodyReader<R>),
}

impl<R: BufRead> Read for View<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Full(r) => r.read(buf),
            Self::Head(r) => r.read(buf),
            Self::Body(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;
    use proptest::prelude::*;

    fn render(kind: ViewKind, doc: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        kind.apply(doc).read_to_end(&mut out).unwrap();
        out
    }

    /// Same as `render` but with a one-byte source buffer and one-byte reads,
    /// so every `\r\n` straddles a buffer boundary.
    fn render_bytewise(kind: ViewKind, doc: &[u8]) -> Vec<u8> {
        let mut view = kind.apply(BufReader::with_capacity(1, doc));
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match view.read(&mut byte).unwrap() {
                0 => break,
                _ => out.push(byte[0]),
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // ViewKind
    // -----------------------------------------------------------------------

    #[test]
    fn parse_wire_names() {
        assert_eq!("HEAD".parse::<ViewKind>().unwrap(), ViewKind::HeadersOnly);
        assert_eq!("ARTICLE".parse::<ViewKind>().unwrap(), ViewKind::Full);
        assert_eq!("BODY".parse::<ViewKind>().unwrap(), ViewKind::BodyOnly);
        assert!("head".parse::<ViewKind>().is_err());
        assert!("STAT".parse::<ViewKind>().is_err());
        assert!("".parse::<ViewKind>().is_err());
    }

    #[test]
    fn wire_names_round_trip_through_display() {
        for kind in ViewKind::ALL {
            assert_eq!(kind.to_string().parse::<ViewKind>().unwrap(), kind);
        }
    }

    // -----------------------------------------------------------------------
    // Projections
    // -----------------------------------------------------------------------

    #[test]
    fn split_simple_article() {
        let doc = b"Subject: hi\n\nHello world";
        assert_eq!(render(ViewKind::HeadersOnly, doc), b"Subject: hi\n");
        assert_eq!(render(ViewKind::BodyOnly, doc), b"Hello world");
        assert_eq!(render(ViewKind::Full, doc), doc);
    }

    #[test]
    fn no_separator_is_all_header() {
        let doc = b"just one line";
        assert_eq!(render(ViewKind::HeadersOnly, doc), doc);
        assert!(render(ViewKind::BodyOnly, doc).is_empty());
    }

    #[test]
    fn crlf_separator() {
        let doc = b"From: a@b\r\nSubject: x\r\n\r\nline 1\r\n\r\nline 2\r\n";
        assert_eq!(
            render(ViewKind::HeadersOnly, doc),
            b"From: a@b\r\nSubject: x\r\n"
        );
        assert_eq!(render(ViewKind::BodyOnly, doc), b"line 1\r\n\r\nline 2\r\n");
    }

    #[test]
    fn only_first_blank_line_splits() {
        let doc = b"A: 1\n\nfirst\n\nsecond\n";
        assert_eq!(render(ViewKind::HeadersOnly, doc), b"A: 1\n");
        assert_eq!(render(ViewKind::BodyOnly, doc), b"first\n\nsecond\n");
    }

    #[test]
    fn leading_blank_line_means_empty_headers() {
        let doc = b"\nbody only";
        assert!(render(ViewKind::HeadersOnly, doc).is_empty());
        assert_eq!(render(ViewKind::BodyOnly, doc), b"body only");
    }

    #[test]
    fn lone_carriage_return_is_content() {
        let doc = b"A: 1\n\rX: 2\n\nbody";
        assert_eq!(render(ViewKind::HeadersOnly, doc), b"A: 1\n\rX: 2\n");
        assert_eq!(render(ViewKind::BodyOnly, doc), b"body");
    }

    #[test]
    fn trailing_carriage_return_is_kept() {
        let doc = b"A: 1\n\r";
        assert_eq!(render(ViewKind::HeadersOnly, doc), b"A: 1\n\r");
        assert!(render(ViewKind::BodyOnly, doc).is_empty());
    }

    #[test]
    fn empty_source() {
        for kind in ViewKind::ALL {
            assert!(render(kind, b"").is_empty());
        }
    }

    #[test]
    fn head_stops_reading_at_boundary() {
        let doc: &[u8] = b"A: 1\n\nrest of the article";
        let mut source = BufReader::new(doc);
        let mut head = Vec::new();
        HeadReader::new(&mut source).read_to_end(&mut head).unwrap();
        assert_eq!(head, b"A: 1\n");

        // The source is left positioned at the start of the body.
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"rest of the article");
    }

    #[test]
    fn exhausted_view_keeps_returning_eof() {
        let mut view = ViewKind::HeadersOnly.apply(&b"A: 1\n\nbody"[..]);
        let mut out = Vec::new();
        view.read_to_end(&mut out).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(view.read(&mut buf).unwrap(), 0);
        assert_eq!(view.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn bytewise_reads_match_bulk_reads() {
        let docs: [&[u8]; 5] = [
            b"Subject: hi\r\n\r\nHello\r\n",
            b"A: 1\n\rB: 2\n\nbody",
            b"\r\n\r\n",
            b"no newline at all",
            b"A: 1\r",
        ];
        for doc in docs {
            for kind in ViewKind::ALL {
                assert_eq!(render_bytewise(kind, doc), render(kind, doc), "{kind} of {doc:?}");
            }
        }
    }

    proptest! {
        #[test]
        fn head_and_body_rebuild_the_article(
            headers in proptest::collection::vec("[A-Za-z-]{1,12}: [ -~]{0,30}", 0..6),
            body in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let mut doc = Vec::new();
            for h in &headers {
                doc.extend_from_slice(h.as_bytes());
                doc.push(b'\n');
            }
            doc.push(b'\n');
            doc.extend_from_slice(&body);

            let head = render(ViewKind::HeadersOnly, &doc);
            let tail = render(ViewKind::BodyOnly, &doc);

            let mut rebuilt = head.clone();
            rebuilt.push(b'\n');
            rebuilt.extend_from_slice(&tail);
            prop_assert_eq!(&rebuilt, &doc);
            prop_assert_eq!(tail, body);
            prop_assert_eq!(render_bytewise(ViewKind::HeadersOnly, &doc), head);
        }
    }
}
