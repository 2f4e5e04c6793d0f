//! Incremental scanners for modem response framing.
//!
//! A modem speaking 27.007 frames everything it sends in CRLF pairs:
//!
//! ```text
//! <CR><LF>+CREG: 0,1<CR><LF>
//! <CR><LF>OK<CR><LF>
//! ```
//!
//! but the stream also carries command echo (`ATE0...<CR>`), the `"> "`
//! prompt used by `+CMGS`-style commands, raw PDU payload lines, stray PPP
//! frames after a data call collapses, and assorted firmware glitches. The
//! [`Syntax`] trait classifies that stream one unit at a time without ever
//! blocking: the caller feeds whatever bytes it has, the scanner reports
//! how many of them it consumed and what, if anything, completed.
//!
//! The scanner deliberately never copies or slices content. Callers
//! accumulate the consumed bytes themselves and, once a unit completes,
//! recover its content with [`strip_framing`]. Feeding one byte at a time
//! yields exactly the same unit sequence as feeding bulk chunks.
//!
//! Two dialects are provided: [`GsmV1Syntax`] for compliant modems and
//! [`PermissiveSyntax`] for firmware with sloppy framing (missing LFs,
//! bare-CR lines).

/// What the scanner found at the end of a `feed` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxResult {
    /// No unit boundary yet; feed more bytes.
    Unsure,
    /// A complete response line (leading and trailing framing included in
    /// the consumed bytes).
    Line,
    /// A complete response line that continued a multiline response
    /// without its own leading CRLF.
    MultiLine,
    /// A complete raw payload line (only after a [`SyntaxHint::Pdu`]).
    Pdu,
    /// A `"> "` prompt (or a bare-CRLF short prompt after
    /// [`SyntaxHint::ShortPrompt`]).
    Prompt,
    /// Bytes that form no recognizable unit: command echo, PPP framing,
    /// doubled CRs. The consumed bytes should be discarded.
    Unrecognized,
}

/// Advance knowledge the engine can give the scanner about the next unit.
///
/// Hints are one-shot nudges applied before the next byte is examined;
/// the scanner falls back to its normal states once the unit completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxHint {
    /// The next line is a raw PDU payload, not a response line.
    Pdu,
    /// The next line may arrive without its own leading CRLF (multiline
    /// responses from modems that skip the separator).
    MultiLine,
    /// The next prompt is a bare `\r\n` rather than `"> "`.
    ShortPrompt,
}

/// An incremental response scanner for one modem dialect.
pub trait Syntax: Send {
    /// Examine `bytes`, consuming from the front, and stop at the first
    /// completed unit.
    ///
    /// Returns the number of bytes consumed and the classification.
    /// [`SyntaxResult::Unsure`] with every byte consumed means more input
    /// is needed; `Unsure` with bytes left over means the scanner
    /// reinterpreted its state and the remainder should be fed again.
    /// The consumed count never extends past the end of a reported unit.
    fn feed(&mut self, bytes: &[u8]) -> (usize, SyntaxResult);

    /// Steer the state machine before the next unit.
    fn set_hint(&mut self, hint: SyntaxHint);

    /// Return to the idle state, forgetting any partial unit.
    fn reset(&mut self);
}

/// Strip leading and trailing CR/LF framing from a completed unit.
///
/// This is the companion to [`Syntax::feed`]: a `Line` unit consumed as
/// `\r\n+CREG: 0,1\r\n` has the content `+CREG: 0,1`.
pub fn strip_framing(unit: &[u8]) -> &[u8] {
    let start = unit
        .iter()
        .position(|&b| b != b'\r' && b != b'\n')
        .unwrap_or(unit.len());
    let end = unit
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(start, |p| p + 1);
    &unit[start..end]
}

// ============================================================================
// GSMV1 dialect
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GsmV1State {
    Idle,
    InitialCr,
    InitialLf,
    Response,
    ResponseString,
    TerminatorCr,
    GuessMultiline,
    Multiline,
    MultilineTerminatorCr,
    PduCheckExtraCr,
    PduCheckExtraLf,
    Pdu,
    PduCr,
    Prompt,
    Echo,
    PppData,
    ShortPrompt,
    ShortPromptCr,
}

/// Strict 27.007 framing: lines are `\r\n...\r\n`, prompts are `"> "`.
///
/// Tolerates the quirks seen on real compliant modems: command echo is
/// consumed up to the terminating `\r` (or the Ctrl-Z ending a PDU echo)
/// and reported [`SyntaxResult::Unrecognized`]; `~`-delimited PPP frames
/// are skipped the same way; an extra CRLF injected between a response
/// line and its PDU payload is absorbed; quoted string fields may contain
/// bare CR/LF without ending the line.
#[derive(Debug)]
pub struct GsmV1Syntax {
    state: GsmV1State,
}

impl GsmV1Syntax {
    pub fn new() -> Self {
        GsmV1Syntax {
            state: GsmV1State::Idle,
        }
    }
}

impl Default for GsmV1Syntax {
    fn default() -> Self {
        Self::new()
    }
}

impl Syntax for GsmV1Syntax {
    fn feed(&mut self, bytes: &[u8]) -> (usize, SyntaxResult) {
        use GsmV1State as S;

        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];

            match self.state {
                S::Idle => {
                    self.state = match byte {
                        b'\r' => S::InitialCr,
                        b'~' => S::PppData,
                        _ => S::Echo,
                    };
                }

                S::InitialCr => {
                    if byte == b'\n' {
                        self.state = S::InitialLf;
                    } else if byte == b'\r' {
                        // Doubled CR glitch, drop both.
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Unrecognized);
                    } else {
                        self.state = S::Echo;
                    }
                }

                S::InitialLf => {
                    self.state = match byte {
                        b'\r' => S::TerminatorCr,
                        b'>' => S::Prompt,
                        b'"' => S::ResponseString,
                        _ => S::Response,
                    };
                }

                S::Response => {
                    if byte == b'\r' {
                        self.state = S::TerminatorCr;
                    } else if byte == b'"' {
                        self.state = S::ResponseString;
                    }
                }

                S::ResponseString => {
                    if byte == b'"' {
                        self.state = S::Response;
                    }
                }

                S::TerminatorCr => {
                    self.state = S::Idle;
                    return if byte == b'\n' {
                        (i + 1, SyntaxResult::Line)
                    } else {
                        (i, SyntaxResult::Unrecognized)
                    };
                }

                S::GuessMultiline => {
                    self.state = if byte == b'\r' {
                        S::InitialCr
                    } else {
                        S::Multiline
                    };
                }

                S::Multiline => {
                    if byte == b'\r' {
                        self.state = S::MultilineTerminatorCr;
                    }
                }

                S::MultilineTerminatorCr => {
                    self.state = S::Idle;
                    return if byte == b'\n' {
                        (i + 1, SyntaxResult::MultiLine)
                    } else {
                        (i, SyntaxResult::Unrecognized)
                    };
                }

                // Some otherwise compliant modems insert an extra CRLF
                // between the response line and the PDU, making them two
                // separate lines. Absorb it.
                S::PduCheckExtraCr => {
                    self.state = if byte == b'\r' {
                        S::PduCheckExtraLf
                    } else {
                        S::Pdu
                    };
                }

                S::PduCheckExtraLf => {
                    self.state = S::Pdu;
                    return if byte == b'\n' {
                        (i + 1, SyntaxResult::Unrecognized)
                    } else {
                        (i, SyntaxResult::Unrecognized)
                    };
                }

                S::Pdu => {
                    if byte == b'\r' {
                        self.state = S::PduCr;
                    }
                }

                S::PduCr => {
                    self.state = S::Idle;
                    return if byte == b'\n' {
                        (i + 1, SyntaxResult::Pdu)
                    } else {
                        (i, SyntaxResult::Unrecognized)
                    };
                }

                S::Prompt => {
                    if byte == b' ' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Prompt);
                    }
                    // Not a prompt after all; rescan this byte as line
                    // content.
                    self.state = S::Response;
                    return (i, SyntaxResult::Unsure);
                }

                S::Echo => {
                    // Ctrl-Z ends the echo of a PDU submission.
                    if byte == 26 || byte == b'\r' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Unrecognized);
                    }
                }

                S::PppData => {
                    if byte == b'~' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Unrecognized);
                    }
                }

                S::ShortPrompt => {
                    self.state = if byte == b'\r' {
                        S::ShortPromptCr
                    } else {
                        S::Echo
                    };
                }

                S::ShortPromptCr => {
                    if byte == b'\n' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Prompt);
                    }
                    self.state = S::Response;
                    return (i, SyntaxResult::Unsure);
                }
            }

            i += 1;
        }

        (i, SyntaxResult::Unsure)
    }

    fn set_hint(&mut self, hint: SyntaxHint) {
        self.state = match hint {
            SyntaxHint::Pdu => GsmV1State::PduCheckExtraCr,
            SyntaxHint::MultiLine => GsmV1State::GuessMultiline,
            SyntaxHint::ShortPrompt => GsmV1State::ShortPrompt,
        };
    }

    fn reset(&mut self) {
        self.state = GsmV1State::Idle;
    }
}

// ============================================================================
// Permissive dialect
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermissiveState {
    Idle,
    Response,
    ResponseString,
    GuessPdu,
    Pdu,
    Prompt,
    GuessShortPrompt,
    ShortPrompt,
}

/// Relaxed framing for modems that omit LFs or leading separators.
///
/// Any leading CR/LF bytes are skipped, a line ends at the first bare
/// `\r`, and multiline responses need no hint at all. Echo suppression is
/// up to the caller (run `ATE0` first); there is no PPP frame skipping.
#[derive(Debug)]
pub struct PermissiveSyntax {
    state: PermissiveState,
}

impl PermissiveSyntax {
    pub fn new() -> Self {
        PermissiveSyntax {
            state: PermissiveState::Idle,
        }
    }
}

impl Default for PermissiveSyntax {
    fn default() -> Self {
        Self::new()
    }
}

impl Syntax for PermissiveSyntax {
    fn feed(&mut self, bytes: &[u8]) -> (usize, SyntaxResult) {
        use PermissiveState as S;

        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];

            match self.state {
                S::Idle => {
                    if byte == b'\r' || byte == b'\n' {
                        // inter-line filler
                    } else if byte == b'>' {
                        self.state = S::Prompt;
                    } else {
                        self.state = S::Response;
                    }
                }

                S::Response => {
                    if byte == b'\r' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Line);
                    } else if byte == b'"' {
                        self.state = S::ResponseString;
                    }
                }

                S::ResponseString => {
                    if byte == b'"' {
                        self.state = S::Response;
                    }
                }

                S::GuessPdu => {
                    if byte != b'\r' && byte != b'\n' {
                        self.state = S::Pdu;
                    }
                }

                S::Pdu => {
                    if byte == b'\r' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Pdu);
                    }
                }

                S::Prompt => {
                    if byte == b' ' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Prompt);
                    }
                    self.state = S::Response;
                    return (i, SyntaxResult::Unsure);
                }

                S::GuessShortPrompt => {
                    if byte == b'\n' {
                        // skip
                    } else if byte == b'\r' {
                        self.state = S::ShortPrompt;
                    } else {
                        self.state = S::Response;
                    }
                }

                S::ShortPrompt => {
                    if byte == b'\n' {
                        self.state = S::Idle;
                        return (i + 1, SyntaxResult::Prompt);
                    }
                    self.state = S::Response;
                    return (i, SyntaxResult::Unsure);
                }
            }

            i += 1;
        }

        (i, SyntaxResult::Unsure)
    }

    fn set_hint(&mut self, hint: SyntaxHint) {
        match hint {
            SyntaxHint::Pdu => self.state = PermissiveState::GuessPdu,
            SyntaxHint::ShortPrompt => self.state = PermissiveState::GuessShortPrompt,
            // Lines need no leading CRLF in this dialect, so there is
            // nothing to prime.
            SyntaxHint::MultiLine => {}
        }
    }

    fn reset(&mut self) {
        self.state = PermissiveState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive a scanner the way the engine does: accumulate consumed bytes
    /// and cut a unit whenever the result is not `Unsure`.
    fn scan(syntax: &mut dyn Syntax, bytes: &[u8]) -> Vec<(SyntaxResult, Vec<u8>)> {
        let mut units = Vec::new();
        let mut unit = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            let (consumed, result) = syntax.feed(rest);
            unit.extend_from_slice(&rest[..consumed]);
            rest = &rest[consumed..];

            match result {
                SyntaxResult::Unsure => {
                    if rest.is_empty() {
                        break;
                    }
                }
                other => units.push((other, std::mem::take(&mut unit))),
            }
        }

        units
    }

    fn content(unit: &[u8]) -> &str {
        std::str::from_utf8(strip_framing(unit)).unwrap()
    }

    // ------------------------------------------------------------------
    // strip_framing
    // ------------------------------------------------------------------

    #[test]
    fn strip_framing_both_ends() {
        assert_eq!(strip_framing(b"\r\n+CREG: 0,1\r\n"), b"+CREG: 0,1");
        assert_eq!(strip_framing(b"OK\r\n"), b"OK");
        assert_eq!(strip_framing(b"\r\n"), b"");
        assert_eq!(strip_framing(b""), b"");
    }

    // ------------------------------------------------------------------
    // GSMV1
    // ------------------------------------------------------------------

    #[test]
    fn gsmv1_simple_line() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"\r\nOK\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Line);
        assert_eq!(content(&units[0].1), "OK");
    }

    #[test]
    fn gsmv1_two_lines_one_chunk() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"\r\n+CREG: 0,1\r\n\r\nOK\r\n");
        assert_eq!(units.len(), 2);
        assert_eq!(content(&units[0].1), "+CREG: 0,1");
        assert_eq!(content(&units[1].1), "OK");
    }

    #[test]
    fn gsmv1_echo_is_unrecognized() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"ATE0Q0V1\r\r\nOK\r\n");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].0, SyntaxResult::Unrecognized);
        assert_eq!(content(&units[0].1), "ATE0Q0V1");
        assert_eq!(units[1].0, SyntaxResult::Line);
        assert_eq!(content(&units[1].1), "OK");
    }

    #[test]
    fn gsmv1_pdu_echo_ends_at_ctrl_z() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"079100F3\x1a\r\nOK\r\n");
        assert_eq!(units[0].0, SyntaxResult::Unrecognized);
        assert_eq!(units[1].0, SyntaxResult::Line);
    }

    #[test]
    fn gsmv1_prompt() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"\r\n> ");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Prompt);
    }

    #[test]
    fn gsmv1_greater_than_inside_line_is_not_a_prompt() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"\r\n>PIN\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Line);
        assert_eq!(content(&units[0].1), ">PIN");
    }

    #[test]
    fn gsmv1_quoted_string_swallows_crlf() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"\r\n+CUSD: 0,\"line1\r\nline2\",15\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Line);
        assert_eq!(content(&units[0].1), "+CUSD: 0,\"line1\r\nline2\",15");
    }

    #[test]
    fn gsmv1_pdu_hint_plain() {
        let mut s = GsmV1Syntax::new();
        s.set_hint(SyntaxHint::Pdu);
        let units = scan(&mut s, b"07911326040000F0040B91\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Pdu);
        assert_eq!(content(&units[0].1), "07911326040000F0040B91");
    }

    #[test]
    fn gsmv1_pdu_hint_absorbs_extra_crlf() {
        let mut s = GsmV1Syntax::new();
        s.set_hint(SyntaxHint::Pdu);
        let units = scan(&mut s, b"\r\n07911326\r\n");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].0, SyntaxResult::Unrecognized);
        assert_eq!(units[1].0, SyntaxResult::Pdu);
        assert_eq!(content(&units[1].1), "07911326");
    }

    #[test]
    fn gsmv1_multiline_hint_accepts_bare_continuation() {
        let mut s = GsmV1Syntax::new();
        s.set_hint(SyntaxHint::MultiLine);
        let units = scan(&mut s, b"+CMGL: 2,1,,24\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::MultiLine);
        assert_eq!(content(&units[0].1), "+CMGL: 2,1,,24");
    }

    #[test]
    fn gsmv1_multiline_hint_still_takes_framed_line() {
        let mut s = GsmV1Syntax::new();
        s.set_hint(SyntaxHint::MultiLine);
        let units = scan(&mut s, b"\r\nOK\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Line);
        assert_eq!(content(&units[0].1), "OK");
    }

    #[test]
    fn gsmv1_short_prompt_hint() {
        let mut s = GsmV1Syntax::new();
        s.set_hint(SyntaxHint::ShortPrompt);
        let units = scan(&mut s, b"\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Prompt);
    }

    #[test]
    fn gsmv1_ppp_frame_skipped() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"~\xff\x7d\x23\xc0\x21~\r\nNO CARRIER\r\n");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].0, SyntaxResult::Unrecognized);
        assert_eq!(units[1].0, SyntaxResult::Line);
        assert_eq!(content(&units[1].1), "NO CARRIER");
    }

    #[test]
    fn gsmv1_doubled_cr_dropped() {
        let mut s = GsmV1Syntax::new();
        let units = scan(&mut s, b"\r\r");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Unrecognized);
    }

    #[test]
    fn gsmv1_byte_at_a_time_equals_bulk() {
        let stream: &[u8] =
            b"ATE0\r\r\nOK\r\n\r\n+CREG: 1,5\r\n\r\n> \r\n+CMGS: 4\r\n\r\nOK\r\n";

        let mut bulk = GsmV1Syntax::new();
        let expected = scan(&mut bulk, stream);

        let mut single = GsmV1Syntax::new();
        let mut units = Vec::new();
        let mut unit = Vec::new();
        for &b in stream {
            let mut rest = &[b][..];
            while !rest.is_empty() {
                let (consumed, result) = single.feed(rest);
                unit.extend_from_slice(&rest[..consumed]);
                rest = &rest[consumed..];
                if result != SyntaxResult::Unsure {
                    units.push((result, std::mem::take(&mut unit)));
                }
            }
        }

        assert_eq!(units, expected);
    }

    #[test]
    fn gsmv1_reset_forgets_partial_unit() {
        let mut s = GsmV1Syntax::new();
        assert_eq!(s.feed(b"\r\n+CRE"), (6, SyntaxResult::Unsure));
        s.reset();
        let units = scan(&mut s, b"\r\nOK\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(content(&units[0].1), "OK");
    }

    // ------------------------------------------------------------------
    // Permissive
    // ------------------------------------------------------------------

    #[test]
    fn permissive_bare_cr_line() {
        let mut s = PermissiveSyntax::new();
        let units = scan(&mut s, b"OK\r");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Line);
        assert_eq!(content(&units[0].1), "OK");
    }

    #[test]
    fn permissive_skips_leading_framing() {
        let mut s = PermissiveSyntax::new();
        let units = scan(&mut s, b"\r\n\n+CREG: 0,1\r");
        assert_eq!(units.len(), 1);
        assert_eq!(content(&units[0].1), "+CREG: 0,1");
    }

    #[test]
    fn permissive_prompt() {
        let mut s = PermissiveSyntax::new();
        let units = scan(&mut s, b"\r\n> ");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Prompt);
    }

    #[test]
    fn permissive_pdu_hint() {
        let mut s = PermissiveSyntax::new();
        s.set_hint(SyntaxHint::Pdu);
        let units = scan(&mut s, b"\n07911326\r");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Pdu);
        assert_eq!(content(&units[0].1), "07911326");
    }

    #[test]
    fn permissive_short_prompt_hint() {
        let mut s = PermissiveSyntax::new();
        s.set_hint(SyntaxHint::ShortPrompt);
        let units = scan(&mut s, b"\r\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, SyntaxResult::Prompt);
    }

    #[test]
    fn permissive_quoted_string_swallows_cr() {
        let mut s = PermissiveSyntax::new();
        let units = scan(&mut s, b"+CUSD: \"a\rb\"\r");
        assert_eq!(units.len(), 1);
        assert_eq!(content(&units[0].1), "+CUSD: \"a\rb\"");
    }
}
