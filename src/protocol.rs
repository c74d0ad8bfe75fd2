//! Wire framing for the relay protocol.
//!
//! Inbound messages are `<languageCode>|<text>`; only the first `|` is a
//! separator, so the text may itself contain pipes. Broadcasts go out as
//! `MSG|<text>`. Messages are plain UTF-8 with no length prefix; a message
//! split across TCP reads is a known limitation of the protocol, not
//! something this module papers over.

use thiserror::Error;

/// Prefix on every server-to-client broadcast frame.
pub const BROADCAST_PREFIX: &str = "MSG|";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message is missing the '|' language separator")]
    MissingSeparator,
    #[error("message is not valid UTF-8")]
    InvalidUtf8,
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Lowercased, trimmed language code (e.g. "en", "he").
    pub language: String,
    /// The payload text, untouched.
    pub text: String,
}

/// Parse one inbound frame.
///
/// Splits on the first `|` only. The language code is trimmed and
/// lowercased; the text is passed through verbatim.
pub fn parse_inbound(raw: &[u8]) -> Result<InboundMessage, ProtocolError> {
    let raw = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)?;
    let (language, text) = raw
        .split_once('|')
        .ok_or(ProtocolError::MissingSeparator)?;
    Ok(InboundMessage {
        language: language.trim().to_lowercase(),
        text: text.to_string(),
    })
}

/// Frame a finalized message for broadcast.
pub fn frame_broadcast(text: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(BROADCAST_PREFIX.len() + text.len());
    frame.extend_from_slice(BROADCAST_PREFIX.as_bytes());
    frame.extend_from_slice(text.as_bytes());
    frame
}
