//! Streaming N-Triples reader.
//!
//! Lines look like `<subject> <predicate> <object> .`. Fields are split on ASCII
//! whitespace, only the first three are used, and one pair of angle brackets is
//! stripped from each. Blank lines and `#` comment lines are skipped.
//!
//! [`TripleReader::next_triple`] lends the current line's fields without
//! allocating; the [`Iterator`] impl yields owned [`RawTriple`]s.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

use crate::config::MalformedPolicy;
use crate::error::InputError;

/// Local name of the predicate that asserts an entity's type.
pub const TYPE_LOCAL_NAME: &str = "type";

/// An owned (subject, predicate, object) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl RawTriple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

/// A triple borrowed from the reader's line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripleRef<'a> {
    pub subject: &'a str,
    pub predicate: &'a str,
    pub object: &'a str,
}

impl TripleRef<'_> {
    pub fn into_owned(self) -> RawTriple {
        RawTriple::new(self.subject, self.predicate, self.object)
    }

    /// Whether the predicate's local name is `type`.
    pub fn is_type_assertion(&self) -> bool {
        local_name(self.predicate) == TYPE_LOCAL_NAME
    }
}

/// Strip one pair of enclosing angle brackets, if present.
pub fn strip_iri(token: &str) -> &str {
    token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token)
}

/// The part of an IRI after its last `#`, or the whole IRI.
pub fn local_name(iri: &str) -> &str {
    iri.rsplit('#').next().unwrap_or(iri)
}

enum Scan {
    Comment,
    Short(usize),
    Fields([Range<usize>; 3]),
}

fn scan_fields(line: &str) -> Scan {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Scan::Comment;
    }

    let base = line.as_ptr() as usize;
    let mut spans: [Range<usize>; 3] = [0..0, 0..0, 0..0];
    let mut count = 0;
    for token in line.split_ascii_whitespace().take(3) {
        let start = token.as_ptr() as usize - base;
        spans[count] = start..start + token.len();
        count += 1;
    }
    if count < 3 {
        Scan::Short(count)
    } else {
        Scan::Fields(spans)
    }
}

/// Line-oriented triple reader over any buffered source.
pub struct TripleReader<R> {
    reader: R,
    source: String,
    policy: MalformedPolicy,
    raw: Vec<u8>,
    buf: String,
    line_no: usize,
    triples: usize,
    skipped: usize,
}

impl TripleReader<BufReader<File>> {
    /// Open a triple file. Fails with `MissingInputFile` if it does not exist.
    pub fn open(path: &Path, policy: MalformedPolicy) -> Result<Self, InputError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InputError::MissingInputFile {
                    path: path.display().to_string(),
                }
            } else {
                InputError::Io {
                    path: path.display().to_string(),
                    source: e,
                }
            }
        })?;
        Ok(Self::from_reader(
            BufReader::with_capacity(1 << 20, file),
            path.display().to_string(),
            policy,
        ))
    }
}

impl<R: BufRead> TripleReader<R> {
    /// Wrap an already-open reader. `source` names it in errors and logs.
    pub fn from_reader(reader: R, source: impl Into<String>, policy: MalformedPolicy) -> Self {
        Self {
            reader,
            source: source.into(),
            policy,
            raw: Vec::new(),
            buf: String::new(),
            line_no: 0,
            triples: 0,
            skipped: 0,
        }
    }

    /// Read the next triple, skipping comments and (under `Skip`) short or
    /// undecodable lines.
    pub fn next_triple(&mut self) -> Result<Option<TripleRef<'_>>, InputError> {
        let spans = loop {
            self.raw.clear();
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.raw)
                .map_err(|e| InputError::Io {
                    path: self.source.clone(),
                    source: e,
                })?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            match std::str::from_utf8(&self.raw) {
                Ok(text) => self.buf.push_str(text),
                Err(_) => match self.policy {
                    MalformedPolicy::Fail => {
                        return Err(InputError::InvalidEncoding {
                            path: self.source.clone(),
                            line: self.line_no,
                        });
                    }
                    MalformedPolicy::Skip => {
                        tracing::warn!(
                            source = %self.source,
                            line = self.line_no,
                            "skipping triple line that is not valid UTF-8"
                        );
                        self.skipped += 1;
                        continue;
                    }
                },
            }

            match scan_fields(&self.buf) {
                Scan::Comment => continue,
                Scan::Short(fields) => match self.policy {
                    MalformedPolicy::Fail => {
                        return Err(InputError::MalformedLine {
                            path: self.source.clone(),
                            line: self.line_no,
                            fields,
                        });
                    }
                    MalformedPolicy::Skip => {
                        tracing::warn!(
                            source = %self.source,
                            line = self.line_no,
                            fields,
                            "skipping malformed triple line"
                        );
                        self.skipped += 1;
                    }
                },
                Scan::Fields(spans) => break spans,
            }
        };

        self.triples += 1;
        let line = self.buf.as_str();
        Ok(Some(TripleRef {
            subject: strip_iri(&line[spans[0].clone()]),
            predicate: strip_iri(&line[spans[1].clone()]),
            object: strip_iri(&line[spans[2].clone()]),
        }))
    }

    /// Name of the source, as used in errors.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Lines consumed so far, comments included.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Triples yielded so far.
    pub fn triples_read(&self) -> usize {
        self.triples
    }

    /// Malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for TripleReader<R> {
    type Item = Result<RawTriple, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_triple().map(|t| t.map(TripleRef::into_owned)).transpose()
    }
}

/// Per-source read counters, summed across a stage's inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub files: usize,
    pub lines: usize,
    pub triples: usize,
    pub skipped: usize,
}

impl ReadStats {
    /// Fold a finished reader's counters into the totals.
    pub fn absorb<R>(&mut self, reader: &TripleReader<R>) {
        self.files += 1;
        self.lines += reader.line_no;
        self.triples += reader.triples;
        self.skipped += reader.skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str, policy: MalformedPolicy) -> TripleReader<&[u8]> {
        TripleReader::from_reader(text.as_bytes(), "test.nt", policy)
    }

    #[test]
    fn parses_bracketed_fields_and_ignores_trailing_tokens() {
        let mut r = reader(
            "<http://x/A> <http://x/p> <http://x/B> .\n",
            MalformedPolicy::Fail,
        );
        let t = r.next_triple().unwrap().unwrap();
        assert_eq!(t.subject, "http://x/A");
        assert_eq!(t.predicate, "http://x/p");
        assert_eq!(t.object, "http://x/B");
        assert!(r.next_triple().unwrap().is_none());
    }

    #[test]
    fn splits_on_any_ascii_whitespace() {
        let mut r = reader("<a>\t<b>   <c>\t.\r\n", MalformedPolicy::Fail);
        let t = r.next_triple().unwrap().unwrap();
        assert_eq!((t.subject, t.predicate, t.object), ("a", "b", "c"));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let text = "# started 2022-09-01\n\n<a> <b> <c> .\n   \n# completed\n";
        let triples: Vec<_> = reader(text, MalformedPolicy::Fail)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(triples, vec![RawTriple::new("a", "b", "c")]);
    }

    #[test]
    fn short_line_fails_under_fail_policy() {
        let mut r = reader("<a> <b> <c> .\n<a> <b>\n", MalformedPolicy::Fail);
        r.next_triple().unwrap();
        let err = r.next_triple().unwrap_err();
        assert!(matches!(
            err,
            InputError::MalformedLine {
                line: 2,
                fields: 2,
                ..
            }
        ));
    }

    #[test]
    fn short_line_is_counted_under_skip_policy() {
        let mut r = reader("<a> <b>\n<x> <y> <z> .\n<q>\n", MalformedPolicy::Skip);
        let triples: Vec<_> = r.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(triples, vec![RawTriple::new("x", "y", "z")]);
        assert_eq!(r.skipped(), 2);
        assert_eq!(r.lines_read(), 3);
        assert_eq!(r.triples_read(), 1);
    }

    #[test]
    fn invalid_utf8_line_follows_policy() {
        let bytes: &[u8] = b"<a> <b> <c> .\n<x\xff> <y> <z> .\n<d> <e> <f> .\n";

        let mut r = TripleReader::from_reader(bytes, "test.nt", MalformedPolicy::Skip);
        let triples: Vec<_> = r.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(
            triples,
            vec![RawTriple::new("a", "b", "c"), RawTriple::new("d", "e", "f")]
        );
        assert_eq!(r.skipped(), 1);
        assert_eq!(r.lines_read(), 3);

        let mut r = TripleReader::from_reader(bytes, "test.nt", MalformedPolicy::Fail);
        r.next_triple().unwrap();
        let err = r.next_triple().unwrap_err();
        assert!(matches!(err, InputError::InvalidEncoding { line: 2, .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = TripleReader::open(Path::new("/nonexistent/kgd.nt"), MalformedPolicy::Fail)
            .err()
            .unwrap();
        assert!(matches!(err, InputError::MissingInputFile { .. }));
    }

    #[test]
    fn local_name_takes_fragment() {
        assert_eq!(
            local_name("http://www.w3.org/1999/02/22-rdf-syntax-ns#type"),
            "type"
        );
        assert_eq!(
            local_name("http://dbpedia.org/ontology/birthPlace"),
            "http://dbpedia.org/ontology/birthPlace"
        );
        assert_eq!(strip_iri("plain"), "plain");
        assert_eq!(strip_iri("<x>"), "x");
    }
}
