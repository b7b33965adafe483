//! Acknowledgements of a handshake request.
//!
//! An accepted request is acknowledged with an empty frame. A rejection
//! carries a human readable message, encoded as `{"error":"..."}` in text or
//! as a bare string in structured form.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;
use crate::handshake::{Encoding, copy_into};

/// The answer to a handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// The request was accepted; application data follows.
    Accept,
    /// The request was refused with a reason.
    Reject(String),
}

#[derive(Serialize, Deserialize)]
struct TextReject {
    error: String,
}

impl Ack {
    /// Creates a rejection.
    pub fn reject(message: impl Into<String>) -> Self {
        Self::Reject(message.into())
    }

    /// Returns true for [`Ack::Accept`].
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Encodes the acknowledgement payload.
    ///
    /// Acceptance is always the empty payload, regardless of encoding.
    pub fn encode(&self, encoding: Encoding) -> ProtocolResult<Vec<u8>> {
        let Self::Reject(message) = self else {
            return Ok(Vec::new());
        };

        match encoding {
            Encoding::Text => Ok(serde_json::to_vec(&TextReject {
                error: message.clone(),
            })?),
            Encoding::Structured => Ok(serde_cbor::to_vec(message)?),
        }
    }

    /// Encodes into `buf`, returning the number of bytes written.
    pub fn encode_into(&self, encoding: Encoding, buf: &mut [u8]) -> ProtocolResult<usize> {
        let bytes = self.encode(encoding)?;
        copy_into(&bytes, buf)
    }

    /// Decodes an acknowledgement to a request sent in `encoding`.
    ///
    /// Never fails: an empty payload is acceptance, and any other payload is
    /// a rejection. The message is taken from a text `{"error":...}` object,
    /// then, for structured requests only, a structured string, and otherwise
    /// from the raw bytes.
    pub fn decode(encoding: Encoding, payload: &[u8]) -> Self {
        if payload.is_empty() {
            return Self::Accept;
        }

        if let Ok(text) = serde_json::from_slice::<TextReject>(payload) {
            return Self::Reject(text.error);
        }

        if encoding == Encoding::Structured
            && let Ok(message) = serde_cbor::from_slice::<String>(payload)
        {
            return Self::Reject(message);
        }

        Self::Reject(String::from_utf8_lossy(payload).into_owned())
    }

    /// Converts into a result carrying the rejection message.
    pub fn into_result(self) -> Result<(), String> {
        match self {
            Self::Accept => Ok(()),
            Self::Reject(message) => Err(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn accept_is_empty_in_both_encodings() {
        assert!(Ack::Accept.encode(Encoding::Text).unwrap().is_empty());
        assert!(Ack::Accept.encode(Encoding::Structured).unwrap().is_empty());
        assert_eq!(Ack::decode(Encoding::Text, b""), Ack::Accept);
        assert_eq!(Ack::decode(Encoding::Structured, b""), Ack::Accept);
    }

    #[test]
    fn text_rejection_shape() {
        let bytes = Ack::reject("Protocol not found").encode(Encoding::Text).unwrap();
        insta::assert_snapshot!(
            String::from_utf8(bytes).unwrap(),
            @r#"{"error":"Protocol not found"}"#
        );
    }

    #[test]
    fn decode_rejections() {
        for encoding in [Encoding::Text, Encoding::Structured] {
            assert_eq!(
                Ack::decode(encoding, br#"{"error":"nope"}"#),
                Ack::reject("nope")
            );
            assert_eq!(
                Ack::decode(encoding, b"plain words"),
                Ack::reject("plain words")
            );
        }

        let structured = Ack::reject("too many servers")
            .encode(Encoding::Structured)
            .unwrap();
        assert_eq!(
            Ack::decode(Encoding::Structured, &structured),
            Ack::reject("too many servers")
        );
    }

    #[test]
    fn raw_text_rejection_is_kept_whole() {
        // 'e' (0x65) is a CBOR header for a five byte text string
        assert_eq!(
            Ack::decode(Encoding::Text, b"error!"),
            Ack::reject("error!")
        );
    }

    #[test]
    fn into_result() {
        assert_eq!(Ack::Accept.into_result(), Ok(()));
        assert_eq!(
            Ack::reject("denied").into_result(),
            Err("denied".to_string())
        );
        assert!(Ack::Accept.is_accept());
        assert!(!Ack::reject("x").is_accept());
    }

    #[test]
    fn encode_into_reports_required_size() {
        let mut buf = [0u8; 4];
        let result = Ack::reject("does not fit").encode_into(Encoding::Text, &mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::BufferTooSmall { capacity: 4, .. })
        ));
        assert_eq!(Ack::Accept.encode_into(Encoding::Text, &mut buf).unwrap(), 0);
    }
}
