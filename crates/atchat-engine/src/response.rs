//! Final-response classification and response payload types.
//!
//! Every AT command exchange ends with a final response line. The common
//! set is fixed by 27.007 (`OK`, `ERROR`, the dial results) plus the
//! code-carrying error forms:
//!
//! ```text
//! OK
//! ERROR
//! +CME ERROR: 100
//! +CMS ERROR: 38
//! ```
//!
//! [`TerminatorTable`] turns such a line into a [`FinalResponse`]. The
//! intermediate lines collected before the final, plus an optional raw
//! PDU payload, form an [`AtResponse`]. Unsolicited lines are delivered
//! as [`Notification`]s.
//!
//! [`FieldReader`] is a cursor over one response line's comma-separated
//! fields (`+CREG: 0,1` style), with quoted strings, omitted fields,
//! numeric ranges and parenthesised lists.

use atchat_core::{FinalKind, FinalResponse};

// ============================================================================
// Terminator table
// ============================================================================

#[derive(Debug, Clone)]
struct Terminator {
    marker: String,
    kind: FinalKind,
    prefix: bool,
    success: bool,
}

/// Default entries, in match order. The three error forms carry a code
/// after the marker and are matched by prefix; everything else must
/// match the whole line.
const DEFAULT_TERMINATORS: &[(FinalKind, bool)] = &[
    (FinalKind::Ok, false),
    (FinalKind::Error, false),
    (FinalKind::NoDialtone, false),
    (FinalKind::Busy, false),
    (FinalKind::NoCarrier, false),
    (FinalKind::Connect, false),
    (FinalKind::NoAnswer, false),
    (FinalKind::CmsError, true),
    (FinalKind::CmeError, true),
    (FinalKind::ExtError, true),
];

/// The set of lines that terminate a command exchange.
///
/// Starts with the standard 27.007 set. Custom markers can be appended
/// (checked after the defaults) and default entries can be disabled, e.g.
/// `NO CARRIER` while a voice call is being set up would otherwise
/// terminate the wrong command.
#[derive(Debug, Clone)]
pub struct TerminatorTable {
    entries: Vec<Terminator>,
}

impl TerminatorTable {
    pub fn new() -> Self {
        let entries = DEFAULT_TERMINATORS
            .iter()
            .filter_map(|&(kind, prefix)| {
                kind.marker().map(|marker| Terminator {
                    marker: marker.to_string(),
                    kind,
                    prefix,
                    success: kind.is_success(),
                })
            })
            .collect();

        TerminatorTable { entries }
    }

    /// Append a custom terminator, matched after the default entries.
    ///
    /// With `prefix` set the marker matches any line it starts; otherwise
    /// the whole line must equal it. Classified lines get
    /// [`FinalKind::Custom`] and the given `success` flag.
    pub fn add(&mut self, marker: impl Into<String>, prefix: bool, success: bool) {
        self.entries.push(Terminator {
            marker: marker.into(),
            kind: FinalKind::Custom,
            prefix,
            success,
        });
    }

    /// Disable a default entry. Custom entries are unaffected.
    pub fn blacklist(&mut self, kind: FinalKind) {
        if kind == FinalKind::Custom {
            return;
        }
        self.entries.retain(|t| t.kind != kind);
    }

    /// Classify `line` as a final response, or `None` if no entry matches.
    pub fn classify(&self, line: &str) -> Option<FinalResponse> {
        for t in &self.entries {
            let matched = if t.prefix {
                line.starts_with(&t.marker)
            } else {
                line == t.marker
            };
            if !matched {
                continue;
            }

            let response = match t.kind {
                FinalKind::Custom => FinalResponse::custom(line, t.success),
                kind => FinalResponse::new(kind, error_code(line, &t.marker, kind), line),
            };
            return Some(response);
        }

        None
    }
}

impl Default for TerminatorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the numeric code following a code-carrying error marker.
///
/// `Some(0)` when the marker matched but the tail is not numeric, which
/// covers verbose mode (`AT+CMEE=2` makes the modem spell the error out).
fn error_code(line: &str, marker: &str, kind: FinalKind) -> Option<u16> {
    if !matches!(
        kind,
        FinalKind::CmeError | FinalKind::CmsError | FinalKind::ExtError
    ) {
        return None;
    }

    let tail = line[marker.len()..].trim_start_matches(' ');
    let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
    Some(tail[..digits].parse().unwrap_or(0))
}

// ============================================================================
// Response payloads
// ============================================================================

/// Everything a single command exchange produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtResponse {
    /// Intermediate response lines, in arrival order. Empty for commands
    /// that answer with a bare final (`ATE0` and friends), and for
    /// listing submissions whose lines were streamed instead.
    pub lines: Vec<String>,
    /// The classified final response line.
    pub final_response: FinalResponse,
    /// Raw payload line captured after a prefix-matched intermediate,
    /// for commands built with `expect_pdu`.
    pub pdu: Option<String>,
}

impl AtResponse {
    /// Whether the final response reports success.
    pub fn success(&self) -> bool {
        self.final_response.success
    }

    /// A [`FieldReader`] over the first line starting with `prefix`.
    pub fn reader<'a>(&'a self, prefix: &str) -> Option<FieldReader<'a>> {
        self.lines
            .iter()
            .find_map(|line| FieldReader::new(line, prefix))
    }

    /// [`FieldReader`]s over every line starting with `prefix`, in order.
    pub fn readers<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = FieldReader<'a>> {
        self.lines
            .iter()
            .filter_map(move |line| FieldReader::new(line, prefix))
    }
}

/// One unsolicited result code delivered to a notification registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The notification line, framing stripped.
    pub line: String,
    /// Raw payload line following the notification, for registrations
    /// made with `register_pdu_notification` (`+CMT:` style).
    pub pdu: Option<String>,
}

impl Notification {
    /// A [`FieldReader`] positioned after `prefix`.
    pub fn reader(&self, prefix: &str) -> Option<FieldReader<'_>> {
        FieldReader::new(&self.line, prefix)
    }
}

// ============================================================================
// Field reader
// ============================================================================

/// Scan to `delim` at nesting depth zero, treating `(...)` groups as
/// opaque. Returns the position of the delimiter, or the end of the line.
fn skip_until(line: &str, start: usize, delim: u8) -> usize {
    let bytes = line.as_bytes();
    let mut i = start;

    while i < bytes.len() {
        if bytes[i] == delim {
            return i;
        }

        if bytes[i] != b'(' {
            i += 1;
            continue;
        }

        i = skip_until(line, i + 1, b')');
        if i < bytes.len() {
            i += 1;
        }
    }

    i
}

/// Cursor over the comma-separated fields of one response line.
///
/// ```
/// use atchat_engine::response::FieldReader;
///
/// let mut r = FieldReader::new("+CREG: 0,1", "+CREG:").unwrap();
/// assert_eq!(r.number(), Some(0));
/// assert_eq!(r.number(), Some(1));
/// assert_eq!(r.number(), None);
/// ```
///
/// Every successful accessor consumes its field and the following comma
/// plus spaces; a failed accessor leaves the position untouched.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> FieldReader<'a> {
    /// Position a reader after `prefix`, skipping the spaces that follow
    /// it. Returns `None` if the line does not start with `prefix`. An
    /// empty prefix matches any line at position zero.
    pub fn new(line: &'a str, prefix: &str) -> Option<Self> {
        if prefix.is_empty() {
            return Some(FieldReader { line, pos: 0 });
        }

        if !line.starts_with(prefix) {
            return None;
        }

        let mut reader = FieldReader {
            line,
            pos: prefix.len(),
        };
        reader.skip_spaces();
        Some(reader)
    }

    fn byte(&self, i: usize) -> Option<u8> {
        self.line.as_bytes().get(i).copied()
    }

    fn skip_spaces(&mut self) {
        while self.byte(self.pos) == Some(b' ') {
            self.pos += 1;
        }
    }

    /// Step past the comma ending the current field, then past spaces.
    fn skip_to_next_field(&mut self, from: usize) {
        self.pos = from;
        if self.byte(self.pos) == Some(b',') {
            self.pos += 1;
        }
        self.skip_spaces();
    }

    fn digits_end(&self, from: usize) -> usize {
        let bytes = self.line.as_bytes();
        let mut end = from;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        end
    }

    /// Read an unsigned decimal field.
    pub fn number(&mut self) -> Option<u32> {
        let end = self.digits_end(self.pos);
        if end == self.pos {
            return None;
        }

        let value = self.line[self.pos..end].parse().ok()?;
        self.skip_to_next_field(end);
        Some(value)
    }

    /// Read a quoted string field, returning its content, or an empty
    /// string for an omitted field (`,,`).
    pub fn string(&mut self) -> Option<&'a str> {
        if self.byte(self.pos) == Some(b',') {
            let end = self.pos;
            self.skip_to_next_field(end);
            return Some("");
        }

        if self.byte(self.pos) != Some(b'"') {
            return None;
        }

        let start = self.pos + 1;
        let end = start + self.line[start..].find('"')?;
        let content = &self.line[start..end];
        self.skip_to_next_field(end + 1);
        Some(content)
    }

    /// Read a `low-high` range field. A bare value reads as
    /// `(value, value)`.
    pub fn range(&mut self) -> Option<(u32, u32)> {
        let mut pos = self.pos;
        while self.byte(pos) == Some(b' ') {
            pos += 1;
        }

        let end = self.digits_end(pos);
        if end == pos {
            return None;
        }
        let low: u32 = self.line[pos..end].parse().ok()?;

        let (high, end) = match self.byte(end) {
            Some(b'-') => {
                let start = end + 1;
                let end = self.digits_end(start);
                if end == start {
                    return None;
                }
                (self.line[start..end].parse().ok()?, end)
            }
            // Bare value: the field ends here.
            Some(b',') | Some(b')') | None => (low, end),
            _ => return None,
        };

        self.skip_to_next_field(end);
        Some((low, high))
    }

    /// Skip one field of any shape. Parenthesised groups are skipped
    /// whole; commas inside them do not end the field.
    pub fn skip(&mut self) -> bool {
        let skipped_to = skip_until(self.line, self.pos, b',');

        if skipped_to == self.pos && self.byte(skipped_to) != Some(b',') {
            return false;
        }

        self.skip_to_next_field(skipped_to);
        true
    }

    /// Step into a `(`-opened list.
    pub fn open_list(&mut self) -> bool {
        if self.byte(self.pos) != Some(b'(') {
            return false;
        }

        self.pos += 1;
        self.skip_spaces();
        true
    }

    /// Step out of a `)`-closed list and past the following separator.
    pub fn close_list(&mut self) -> bool {
        if self.byte(self.pos) != Some(b')') {
            return false;
        }

        self.skip_to_next_field(self.pos + 1);
        true
    }

    /// The unparsed tail of the line.
    pub fn remainder(&self) -> &'a str {
        &self.line[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Terminator classification
    // ---------------------------------------------------------------

    #[test]
    fn classify_ok() {
        let table = TerminatorTable::new();
        let f = table.classify("OK").unwrap();
        assert_eq!(f.kind, FinalKind::Ok);
        assert!(f.success);
        assert_eq!(f.code, None);
        assert_eq!(f.line, "OK");
    }

    #[test]
    fn classify_error() {
        let table = TerminatorTable::new();
        let f = table.classify("ERROR").unwrap();
        assert_eq!(f.kind, FinalKind::Error);
        assert!(!f.success);
    }

    #[test]
    fn classify_dial_results() {
        let table = TerminatorTable::new();
        assert_eq!(table.classify("NO DIALTONE").unwrap().kind, FinalKind::NoDialtone);
        assert_eq!(table.classify("BUSY").unwrap().kind, FinalKind::Busy);
        assert_eq!(table.classify("NO CARRIER").unwrap().kind, FinalKind::NoCarrier);
        assert_eq!(table.classify("NO ANSWER").unwrap().kind, FinalKind::NoAnswer);
        let connect = table.classify("CONNECT").unwrap();
        assert_eq!(connect.kind, FinalKind::Connect);
        assert!(connect.success);
    }

    #[test]
    fn classify_cme_error_with_code() {
        let table = TerminatorTable::new();
        let f = table.classify("+CME ERROR: 100").unwrap();
        assert_eq!(f.kind, FinalKind::CmeError);
        assert!(!f.success);
        assert_eq!(f.code, Some(100));
    }

    #[test]
    fn classify_cms_error_with_code() {
        let table = TerminatorTable::new();
        let f = table.classify("+CMS ERROR: 38").unwrap();
        assert_eq!(f.kind, FinalKind::CmsError);
        assert_eq!(f.code, Some(38));
    }

    #[test]
    fn classify_verbose_cme_error_codes_zero() {
        let table = TerminatorTable::new();
        let f = table.classify("+CME ERROR: SIM busy").unwrap();
        assert_eq!(f.kind, FinalKind::CmeError);
        assert_eq!(f.code, Some(0));
    }

    #[test]
    fn plain_markers_match_whole_line_only() {
        let table = TerminatorTable::new();
        assert!(table.classify("OKAY").is_none());
        assert!(table.classify("ERRORS: 3").is_none());
        // CONNECT with a speed suffix is not the exact marker.
        assert!(table.classify("CONNECT 9600").is_none());
    }

    #[test]
    fn intermediate_lines_do_not_classify() {
        let table = TerminatorTable::new();
        assert!(table.classify("+CREG: 0,1").is_none());
        assert!(table.classify("").is_none());
    }

    #[test]
    fn custom_terminator_prefix_match() {
        let mut table = TerminatorTable::new();
        table.add("CONNECT ", true, true);
        let f = table.classify("CONNECT 9600").unwrap();
        assert_eq!(f.kind, FinalKind::Custom);
        assert!(f.success);
        assert_eq!(f.line, "CONNECT 9600");
    }

    #[test]
    fn custom_terminator_checked_after_defaults() {
        let mut table = TerminatorTable::new();
        table.add("OK", false, false);
        // The default exact OK still wins.
        let f = table.classify("OK").unwrap();
        assert_eq!(f.kind, FinalKind::Ok);
        assert!(f.success);
    }

    #[test]
    fn blacklisted_terminator_stops_matching() {
        let mut table = TerminatorTable::new();
        table.blacklist(FinalKind::NoCarrier);
        assert!(table.classify("NO CARRIER").is_none());
        assert!(table.classify("OK").is_some());
    }

    #[test]
    fn blacklist_custom_is_a_no_op() {
        let mut table = TerminatorTable::new();
        table.add("VOICE", false, true);
        table.blacklist(FinalKind::Custom);
        assert!(table.classify("VOICE").is_some());
    }

    // ---------------------------------------------------------------
    // AtResponse
    // ---------------------------------------------------------------

    fn ok_response(lines: &[&str]) -> AtResponse {
        AtResponse {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            final_response: FinalResponse::new(FinalKind::Ok, None, "OK"),
            pdu: None,
        }
    }

    #[test]
    fn response_success_follows_final() {
        assert!(ok_response(&[]).success());

        let failed = AtResponse {
            lines: Vec::new(),
            final_response: FinalResponse::new(FinalKind::Busy, None, "BUSY"),
            pdu: None,
        };
        assert!(!failed.success());
    }

    #[test]
    fn response_reader_finds_first_matching_line() {
        let resp = ok_response(&["+CSQ: 23,0", "+CREG: 0,1"]);
        let mut r = resp.reader("+CREG:").unwrap();
        assert_eq!(r.number(), Some(0));
        assert_eq!(r.number(), Some(1));

        assert!(resp.reader("+COPS:").is_none());
    }

    #[test]
    fn response_readers_walk_every_match() {
        let resp = ok_response(&["+CMGL: 1,1,,24", "+CMGL: 2,0,,30", "+CSQ: 9,0"]);
        let ids: Vec<u32> = resp
            .readers("+CMGL:")
            .filter_map(|mut r| r.number())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    // ---------------------------------------------------------------
    // FieldReader -- positioning
    // ---------------------------------------------------------------

    #[test]
    fn reader_requires_prefix() {
        assert!(FieldReader::new("+CREG: 0,1", "+CREG:").is_some());
        assert!(FieldReader::new("+CREG: 0,1", "+COPS:").is_none());
    }

    #[test]
    fn reader_empty_prefix_matches_anything() {
        let mut r = FieldReader::new("0,1", "").unwrap();
        assert_eq!(r.number(), Some(0));
        assert_eq!(r.number(), Some(1));
    }

    #[test]
    fn reader_skips_spaces_after_prefix() {
        let mut r = FieldReader::new("+CSQ:   23,99", "+CSQ:").unwrap();
        assert_eq!(r.number(), Some(23));
        assert_eq!(r.number(), Some(99));
    }

    // ---------------------------------------------------------------
    // FieldReader -- fields
    // ---------------------------------------------------------------

    #[test]
    fn number_stops_at_non_digit() {
        let mut r = FieldReader::new("+CREG: 2,5", "+CREG:").unwrap();
        assert_eq!(r.number(), Some(2));
        assert_eq!(r.number(), Some(5));
        assert_eq!(r.number(), None);
    }

    #[test]
    fn number_fails_without_digits_and_keeps_position() {
        let mut r = FieldReader::new("+COPS: \"op\"", "+COPS:").unwrap();
        assert_eq!(r.number(), None);
        assert_eq!(r.string(), Some("op"));
    }

    #[test]
    fn string_quoted() {
        let mut r = FieldReader::new("+COPS: 0,0,\"Example Tel\"", "+COPS:").unwrap();
        assert_eq!(r.number(), Some(0));
        assert_eq!(r.number(), Some(0));
        assert_eq!(r.string(), Some("Example Tel"));
    }

    #[test]
    fn string_omitted_field_is_empty() {
        // +CMGL: 1,1,,24 -- the alpha field is omitted.
        let mut r = FieldReader::new("+CMGL: 1,1,,24", "+CMGL:").unwrap();
        assert_eq!(r.number(), Some(1));
        assert_eq!(r.number(), Some(1));
        assert_eq!(r.string(), Some(""));
        assert_eq!(r.number(), Some(24));
    }

    #[test]
    fn string_unterminated_fails() {
        let mut r = FieldReader::new("+COPS: \"oops", "+COPS:").unwrap();
        assert_eq!(r.string(), None);
    }

    #[test]
    fn string_unquoted_fails() {
        let mut r = FieldReader::new("+COPS: bare", "+COPS:").unwrap();
        assert_eq!(r.string(), None);
    }

    #[test]
    fn string_keeps_commas_inside_quotes() {
        let mut r = FieldReader::new("+CUSD: 0,\"a,b\",15", "+CUSD:").unwrap();
        assert_eq!(r.number(), Some(0));
        assert_eq!(r.string(), Some("a,b"));
        assert_eq!(r.number(), Some(15));
    }

    #[test]
    fn range_pair() {
        let mut r = FieldReader::new("(0-255)", "").unwrap();
        assert!(r.open_list());
        assert_eq!(r.range(), Some((0, 255)));
        assert!(r.close_list());
    }

    #[test]
    fn range_bare_value() {
        let mut r = FieldReader::new("+CSCA: 5,7", "+CSCA:").unwrap();
        assert_eq!(r.range(), Some((5, 5)));
        assert_eq!(r.range(), Some((7, 7)));
    }

    #[test]
    fn range_missing_high_fails() {
        let mut r = FieldReader::new("(0-)", "").unwrap();
        assert!(r.open_list());
        assert_eq!(r.range(), None);
    }

    #[test]
    fn skip_plain_field() {
        let mut r = FieldReader::new("+CREG: 0,1", "+CREG:").unwrap();
        assert!(r.skip());
        assert_eq!(r.number(), Some(1));
    }

    #[test]
    fn skip_parenthesised_group_whole() {
        let mut r = FieldReader::new("+COPS: (2,\"A\",\"B\"),42", "+COPS:").unwrap();
        assert!(r.skip());
        assert_eq!(r.number(), Some(42));
    }

    #[test]
    fn skip_empty_field() {
        let mut r = FieldReader::new("+CMGL: 1,,2", "+CMGL:").unwrap();
        assert_eq!(r.number(), Some(1));
        assert!(r.skip());
        assert_eq!(r.number(), Some(2));
    }

    #[test]
    fn skip_at_end_of_line_fails() {
        let mut r = FieldReader::new("+CREG: 1", "+CREG:").unwrap();
        assert_eq!(r.number(), Some(1));
        assert!(!r.skip());
    }

    #[test]
    fn list_walk() {
        let mut r = FieldReader::new("+CNMI: (0-3),(0,1),(2)", "+CNMI:").unwrap();
        assert!(r.open_list());
        assert_eq!(r.range(), Some((0, 3)));
        assert!(r.close_list());

        assert!(r.open_list());
        assert_eq!(r.number(), Some(0));
        assert_eq!(r.number(), Some(1));
        assert!(r.close_list());

        assert!(r.open_list());
        assert_eq!(r.number(), Some(2));
        assert!(r.close_list());
    }

    #[test]
    fn open_list_requires_paren() {
        let mut r = FieldReader::new("+CREG: 0", "+CREG:").unwrap();
        assert!(!r.open_list());
        assert_eq!(r.number(), Some(0));
    }

    #[test]
    fn remainder_returns_unparsed_tail() {
        let mut r = FieldReader::new("+CMT: \"+123456\",\"22/08/19\"", "+CMT:").unwrap();
        assert_eq!(r.string(), Some("+123456"));
        assert_eq!(r.remainder(), "\"22/08/19\"");
    }

    // ---------------------------------------------------------------
    // Notification
    // ---------------------------------------------------------------

    #[test]
    fn notification_reader() {
        let n = Notification {
            line: "+CREG: 1,5".to_string(),
            pdu: None,
        };
        let mut r = n.reader("+CREG:").unwrap();
        assert_eq!(r.number(), Some(1));
        assert_eq!(r.number(), Some(5));
    }
}
