//! AT command construction.
//!
//! An [`AtCommand`] pairs the command text with the routing knowledge the
//! engine needs while the command is on the wire: which response prefixes
//! belong to it, whether prefix-matched lines are followed by a raw
//! payload, whether the response opens with a bare-CRLF prompt, and an
//! optional per-command deadline.
//!
//! The wire form appends `\r` to the text. A command whose text already
//! embeds a `\r` is a prompt-style submission (`AT+CMGS=<len>\r<pdu>`):
//! it is terminated with Ctrl-Z instead and written one segment at a
//! time, each segment gated on the modem's `"> "` prompt.

use std::time::Duration;

/// SUB terminator ending a prompt-style payload.
const CTRL_Z: u8 = 0x1a;

/// One AT command plus its response-routing options.
///
/// ```
/// use atchat_engine::command::AtCommand;
///
/// let cmd = AtCommand::new("AT+CREG?").prefix("+CREG:");
/// assert_eq!(cmd.text(), "AT+CREG?");
/// ```
#[derive(Debug, Clone)]
pub struct AtCommand {
    text: String,
    prefixes: Vec<String>,
    expect_pdu: bool,
    expect_short_prompt: bool,
    timeout: Option<Duration>,
}

impl AtCommand {
    pub fn new(text: impl Into<String>) -> Self {
        AtCommand {
            text: text.into(),
            prefixes: Vec::new(),
            expect_pdu: false,
            expect_short_prompt: false,
            timeout: None,
        }
    }

    /// Add one valid response prefix.
    ///
    /// With no prefixes configured, every non-final line that arrives
    /// while the command is in flight is treated as part of its
    /// response. With prefixes, non-matching lines fall through to
    /// notification dispatch instead.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Add several valid response prefixes at once.
    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Each prefix-matched response line is followed by a raw payload
    /// line (`+CMGR`/`+CMGL` in PDU mode).
    pub fn expect_pdu(mut self) -> Self {
        self.expect_pdu = true;
        self
    }

    /// The response opens with a bare `\r\n` prompt instead of `"> "`
    /// (`+CPOS` style).
    pub fn expect_short_prompt(mut self) -> Self {
        self.expect_short_prompt = true;
        self
    }

    /// Per-command deadline, overriding the engine default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The command text as given, without the wire terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The bytes to put on the wire: the text plus `\r`, or plus Ctrl-Z
    /// for prompt-style text that already embeds a `\r`.
    pub(crate) fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(self.text.len() + 1);
        wire.extend_from_slice(self.text.as_bytes());
        if self.text.contains('\r') {
            wire.push(CTRL_Z);
        } else {
            wire.push(b'\r');
        }
        wire
    }

    /// Whether `line` belongs to this command's response. A command
    /// without prefixes claims every line.
    pub(crate) fn matches_prefix(&self, line: &str) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        self.prefixes.iter().any(|p| line.starts_with(p.as_str()))
    }

    pub(crate) fn expects_pdu(&self) -> bool {
        self.expect_pdu
    }

    pub(crate) fn expects_short_prompt(&self) -> bool {
        self.expect_short_prompt
    }

    pub(crate) fn deadline_override(&self) -> Option<Duration> {
        self.timeout
    }
}

/// The next write segment of `wire` starting at `written`: up to and
/// including the next `\r`, or the rest of the command.
///
/// A plain command is a single segment. A prompt-style command splits at
/// each embedded `\r`; the engine writes the first segment at dispatch
/// and each further segment when a prompt arrives.
pub(crate) fn next_segment(wire: &[u8], written: usize) -> &[u8] {
    let rest = &wire[written..];
    match rest.iter().position(|&b| b == b'\r') {
        Some(cr) => &rest[..cr + 1],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Wire form
    // ---------------------------------------------------------------

    #[test]
    fn plain_command_terminated_with_cr() {
        let cmd = AtCommand::new("ATE0Q0V1");
        assert_eq!(cmd.to_wire(), b"ATE0Q0V1\r");
    }

    #[test]
    fn prompt_style_command_terminated_with_ctrl_z() {
        let cmd = AtCommand::new("AT+CMGS=18\r0011000A927004207933");
        assert_eq!(cmd.to_wire(), b"AT+CMGS=18\r0011000A927004207933\x1a");
    }

    // ---------------------------------------------------------------
    // Prefix matching
    // ---------------------------------------------------------------

    #[test]
    fn no_prefixes_matches_everything() {
        let cmd = AtCommand::new("AT+CFUN?");
        assert!(cmd.matches_prefix("+CFUN: 1"));
        assert!(cmd.matches_prefix("anything at all"));
    }

    #[test]
    fn prefix_filters_lines() {
        let cmd = AtCommand::new("AT+CREG?").prefix("+CREG:");
        assert!(cmd.matches_prefix("+CREG: 0,1"));
        assert!(!cmd.matches_prefix("+CSQ: 23,0"));
    }

    #[test]
    fn multiple_prefixes() {
        let cmd = AtCommand::new("AT+CPIN?").prefixes(["+CPIN:", "+EPIN:"]);
        assert!(cmd.matches_prefix("+CPIN: READY"));
        assert!(cmd.matches_prefix("+EPIN: 2"));
        assert!(!cmd.matches_prefix("+CREG: 1"));
    }

    // ---------------------------------------------------------------
    // Options
    // ---------------------------------------------------------------

    #[test]
    fn options_default_off() {
        let cmd = AtCommand::new("AT");
        assert!(!cmd.expects_pdu());
        assert!(!cmd.expects_short_prompt());
        assert_eq!(cmd.deadline_override(), None);
    }

    #[test]
    fn options_set_by_builder() {
        let cmd = AtCommand::new("AT+CMGR=1")
            .prefix("+CMGR:")
            .expect_pdu()
            .timeout(Duration::from_secs(20));
        assert!(cmd.expects_pdu());
        assert_eq!(cmd.deadline_override(), Some(Duration::from_secs(20)));
    }

    // ---------------------------------------------------------------
    // Segmentation
    // ---------------------------------------------------------------

    #[test]
    fn single_segment_for_plain_command() {
        let wire = b"ATE0\r";
        assert_eq!(next_segment(wire, 0), b"ATE0\r");
    }

    #[test]
    fn segments_split_at_cr() {
        let wire = b"AT+CMGS=18\r0011payload\x1a";
        let first = next_segment(wire, 0);
        assert_eq!(first, b"AT+CMGS=18\r");
        let second = next_segment(wire, first.len());
        assert_eq!(second, b"0011payload\x1a");
    }

    #[test]
    fn segment_after_everything_written_is_empty() {
        let wire = b"AT\r";
        assert_eq!(next_segment(wire, 3), b"");
    }
}
