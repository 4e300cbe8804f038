//! Status codes (§6) and their optional verbose text (§4.9, §9 "supplemented
//! features").
//!
//! Every status is a single byte with the high bit set, mirroring CoAP's
//! class-and-detail encoding without pulling in a CoAP dependency: the
//! upper nibble (minus the high bit) is the class, the lower nibble the
//! detail.

/// A ThingSet status code. The discriminants are exactly the wire bytes
/// from §6, so `status as u8` is always the byte to put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Created = 0x81,
    Deleted = 0x82,
    Valid = 0x83,
    Changed = 0x84,
    Content = 0x85,
    Export = 0x86,

    BadRequest = 0xA0,
    Unauthorized = 0xA1,
    Forbidden = 0xA3,
    NotFound = 0xA4,
    MethodNotAllowed = 0xA5,
    RequestIncomplete = 0xA8,
    Conflict = 0xA9,
    TooLarge = 0xAD,
    UnsupportedFormat = 0xAF,

    Internal = 0xC0,
    NotImplemented = 0xC1,

    ResponseTooLarge = 0xE1,
}

impl StatusCode {
    /// Reconstruct a status from its wire byte, if it names one of the 18
    /// values this table recognizes.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x81 => Self::Created,
            0x82 => Self::Deleted,
            0x83 => Self::Valid,
            0x84 => Self::Changed,
            0x85 => Self::Content,
            0x86 => Self::Export,
            0xA0 => Self::BadRequest,
            0xA1 => Self::Unauthorized,
            0xA3 => Self::Forbidden,
            0xA4 => Self::NotFound,
            0xA5 => Self::MethodNotAllowed,
            0xA8 => Self::RequestIncomplete,
            0xA9 => Self::Conflict,
            0xAD => Self::TooLarge,
            0xAF => Self::UnsupportedFormat,
            0xC0 => Self::Internal,
            0xC1 => Self::NotImplemented,
            0xE1 => Self::ResponseTooLarge,
            _ => return None,
        })
    }

    pub fn is_success(self) -> bool {
        (self as u8) & 0xE0 == 0x80
    }

    /// Human-readable description, gated by `VERBOSE_STATUS_MESSAGES`
    /// (§6) at the call site — this table itself is always compiled in,
    /// the engine decides whether to include the text on the wire.
    pub fn description(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Deleted => "Deleted",
            Self::Valid => "Valid",
            Self::Changed => "Changed",
            Self::Content => "Content",
            Self::Export => "Export",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestIncomplete => "Request Entity Incomplete",
            Self::Conflict => "Conflict",
            Self::TooLarge => "Request Entity Too Large",
            Self::UnsupportedFormat => "Unsupported Format",
            Self::Internal => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::ResponseTooLarge => "Response Too Large",
        }
    }
}

impl From<crate::Error> for StatusCode {
    /// Translate a codec-level failure into the status an engine response
    /// should carry (§7: "codec-level errors bubble to the set engine /
    /// response builder, which translate them into ThingSet status
    /// codes").
    fn from(err: crate::Error) -> Self {
        use crate::Error as E;
        match err {
            E::OutOfMemory => Self::Internal,
            E::AlreadyUnref => Self::Internal,
            E::InvalidInput => Self::BadRequest,
            E::TypeMismatch => Self::UnsupportedFormat,
            E::OutOfRange => Self::BadRequest,
            E::TooDeep => Self::BadRequest,
            E::CountMismatch => Self::BadRequest,
            E::Again => Self::Internal,
            E::Incomplete => Self::RequestIncomplete,
            E::TooLarge => Self::TooLarge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_every_byte() {
        for &code in &[
            StatusCode::Created,
            StatusCode::Deleted,
            StatusCode::Valid,
            StatusCode::Changed,
            StatusCode::Content,
            StatusCode::Export,
            StatusCode::BadRequest,
            StatusCode::Unauthorized,
            StatusCode::Forbidden,
            StatusCode::NotFound,
            StatusCode::MethodNotAllowed,
            StatusCode::RequestIncomplete,
            StatusCode::Conflict,
            StatusCode::TooLarge,
            StatusCode::UnsupportedFormat,
            StatusCode::Internal,
            StatusCode::NotImplemented,
            StatusCode::ResponseTooLarge,
        ] {
            assert_eq!(StatusCode::from_byte(code as u8), Some(code));
        }
    }

    #[test]
    fn success_class_is_0x8x() {
        assert!(StatusCode::Content.is_success());
        assert!(!StatusCode::NotFound.is_success());
    }
}
