//! Core types used throughout atchat.
//!
//! These types describe the 27.007 chat vocabulary (final response
//! classification, command and registration handles) independently of any
//! particular modem vendor.

use std::fmt;
use std::str::FromStr;

/// Opaque identifier for a queued command.
///
/// Returned by the submit path and accepted by cancel. Ids start at 1 and
/// are never reused within one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

impl CommandId {
    /// Create a `CommandId` from a raw counter value.
    pub fn from_raw(raw: u64) -> Self {
        CommandId(raw)
    }

    /// Return the raw counter value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Opaque identifier for a notification registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyId(u64);

impl NotifyId {
    /// Create a `NotifyId` from a raw counter value.
    pub fn from_raw(raw: u64) -> Self {
        NotifyId(raw)
    }

    /// Return the raw counter value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotifyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notify-{}", self.0)
    }
}

/// Classification of a final response line.
///
/// The first seven kinds are the V.25ter / 27.007 result codes matched
/// exactly; the three `*Error` kinds carry a decimal error code after the
/// marker. `Custom` covers terminators registered per-engine for
/// non-standard firmware (e.g. `COMMAND NOT SUPPORT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinalKind {
    /// `OK`
    Ok,
    /// `CONNECT` (data call established).
    Connect,
    /// `ERROR`
    Error,
    /// `NO DIALTONE`
    NoDialtone,
    /// `BUSY`
    Busy,
    /// `NO CARRIER`
    NoCarrier,
    /// `NO ANSWER`
    NoAnswer,
    /// `+CME ERROR: <n>` (mobile equipment error, 27.007 §9.2).
    CmeError,
    /// `+CMS ERROR: <n>` (message service error, 27.005 §3.2.5).
    CmsError,
    /// `+EXT ERROR: <n>` (vendor extension error).
    ExtError,
    /// A terminator registered per-engine.
    Custom,
}

impl FinalKind {
    /// The wire marker for this kind, or `None` for [`FinalKind::Custom`].
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            FinalKind::Ok => Some("OK"),
            FinalKind::Connect => Some("CONNECT"),
            FinalKind::Error => Some("ERROR"),
            FinalKind::NoDialtone => Some("NO DIALTONE"),
            FinalKind::Busy => Some("BUSY"),
            FinalKind::NoCarrier => Some("NO CARRIER"),
            FinalKind::NoAnswer => Some("NO ANSWER"),
            FinalKind::CmeError => Some("+CME ERROR:"),
            FinalKind::CmsError => Some("+CMS ERROR:"),
            FinalKind::ExtError => Some("+EXT ERROR:"),
            FinalKind::Custom => None,
        }
    }

    /// Whether this kind reports command success by default.
    ///
    /// Only `OK` and `CONNECT` do. Custom terminators carry their own
    /// success flag on the [`FinalResponse`] built from them.
    pub fn is_success(&self) -> bool {
        matches!(self, FinalKind::Ok | FinalKind::Connect)
    }
}

impl fmt::Display for FinalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.marker() {
            Some(m) => write!(f, "{m}"),
            None => write!(f, "custom"),
        }
    }
}

/// Error returned when a string cannot be parsed into a [`FinalKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFinalKindError(String);

impl fmt::Display for ParseFinalKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown final response kind: {}", self.0)
    }
}

impl std::error::Error for ParseFinalKindError {}

impl FromStr for FinalKind {
    type Err = ParseFinalKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OK" => Ok(FinalKind::Ok),
            "CONNECT" => Ok(FinalKind::Connect),
            "ERROR" => Ok(FinalKind::Error),
            "NO DIALTONE" => Ok(FinalKind::NoDialtone),
            "BUSY" => Ok(FinalKind::Busy),
            "NO CARRIER" => Ok(FinalKind::NoCarrier),
            "NO ANSWER" => Ok(FinalKind::NoAnswer),
            "+CME ERROR:" | "+CME ERROR" => Ok(FinalKind::CmeError),
            "+CMS ERROR:" | "+CMS ERROR" => Ok(FinalKind::CmsError),
            "+EXT ERROR:" | "+EXT ERROR" => Ok(FinalKind::ExtError),
            _ => Err(ParseFinalKindError(s.to_string())),
        }
    }
}

/// A classified final response line.
///
/// Built by the engine when a line matches the terminator table. A failed
/// final (`ERROR`, `BUSY`, `+CMS ERROR: 38`, ...) is still a normal
/// response delivery, not an [`Error`](crate::error::Error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalResponse {
    /// Which terminal marker matched.
    pub kind: FinalKind,

    /// Decimal error code for the code-carrying kinds.
    ///
    /// `+CME ERROR: 30` yields `Some(30)`; `Some(0)` when the digits are
    /// missing or malformed; `None` for all other kinds.
    pub code: Option<u16>,

    /// The raw final line as received (framing stripped).
    pub line: String,

    /// Whether the modem reported success.
    pub success: bool,
}

impl FinalResponse {
    /// Build a final response for a standard kind, deriving the success
    /// flag from the kind.
    pub fn new(kind: FinalKind, code: Option<u16>, line: impl Into<String>) -> Self {
        FinalResponse {
            kind,
            code,
            line: line.into(),
            success: kind.is_success(),
        }
    }

    /// Build a final response for a custom terminator with an explicit
    /// success flag.
    pub fn custom(line: impl Into<String>, success: bool) -> Self {
        FinalResponse {
            kind: FinalKind::Custom,
            code: None,
            line: line.into(),
            success,
        }
    }
}

impl fmt::Display for FinalResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}
