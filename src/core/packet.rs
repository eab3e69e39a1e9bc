//! TFTP packet model and wire codec.
//!
//! Wire layout per [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350):
//! a 2-byte big-endian opcode followed by per-opcode fields. Request
//! packets carry two NUL-terminated ASCII strings (file name, mode).

use std::fmt;

use thiserror::Error;

/// Maximum payload of a DATA packet. A shorter payload (including an
/// empty one) marks the final block of a transfer.
pub const MAX_BLOCK_SIZE: usize = 512;

/// Reasons a datagram cannot be decoded as a TFTP packet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("packet truncated before a required field")]
    Truncated,
    #[error("unrecognized opcode {0}")]
    UnknownOpcode(u16),
    #[error("NUL terminator not found")]
    MissingTerminator,
}

/// Transfer mode declared in a request packet.
///
/// Unrecognized mode strings decode to [`Mode::Unknown`] rather than
/// failing the parse; `Unknown` serializes to the token `unknown`,
/// which no conforming peer will accept as a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Netascii,
    Octet,
    Mail,
    Unknown,
}

impl Mode {
    fn from_token(token: &str) -> Mode {
        if token.eq_ignore_ascii_case("netascii") {
            Mode::Netascii
        } else if token.eq_ignore_ascii_case("octet") {
            Mode::Octet
        } else if token.eq_ignore_ascii_case("binary") {
            // binary is the historical name for octet
            Mode::Octet
        } else if token == "mail" {
            Mode::Mail
        } else {
            Mode::Unknown
        }
    }

    fn as_token(self) -> &'static str {
        match self {
            Mode::Netascii => "netascii",
            Mode::Octet => "octet",
            Mode::Mail => "mail",
            Mode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// TFTP error codes carried by ERROR packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Undefined,
    FileNotFound,
    AccessViolation,
    DiskFullOrAllocationExceeded,
    IllegalTftpOperation,
    UnknownTransferId,
    FileAlreadyExists,
    NoSuchUser,
}

impl ErrorCode {
    fn from_u16(code: u16) -> ErrorCode {
        match code {
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFullOrAllocationExceeded,
            4 => ErrorCode::IllegalTftpOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            _ => ErrorCode::Undefined,
        }
    }

    fn as_u16(self) -> u16 {
        match self {
            ErrorCode::Undefined => 0,
            ErrorCode::FileNotFound => 1,
            ErrorCode::AccessViolation => 2,
            ErrorCode::DiskFullOrAllocationExceeded => 3,
            ErrorCode::IllegalTftpOperation => 4,
            ErrorCode::UnknownTransferId => 5,
            ErrorCode::FileAlreadyExists => 6,
            ErrorCode::NoSuchUser => 7,
        }
    }
}

/// The five TFTP packet types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Read request (opcode 1).
    Rrq { filename: String, mode: Mode },
    /// Write request (opcode 2).
    Wrq { filename: String, mode: Mode },
    /// File data block (opcode 3).
    Data { block: u16, data: Vec<u8> },
    /// Block acknowledgement (opcode 4).
    Ack { block: u16 },
    /// Error report (opcode 5).
    Error { code: ErrorCode, message: String },
}

impl Packet {
    /// Short opcode name, for log messages.
    pub fn op(&self) -> &'static str {
        match self {
            Packet::Rrq { .. } => "RRQ",
            Packet::Wrq { .. } => "WRQ",
            Packet::Data { .. } => "DATA",
            Packet::Ack { .. } => "ACK",
            Packet::Error { .. } => "ERROR",
        }
    }

    /// Serialize to wire bytes. Total for every constructible packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Packet::Rrq { filename, mode } => {
                put_u16(&mut out, 1);
                put_cstr(&mut out, filename);
                put_cstr(&mut out, mode.as_token());
            }
            Packet::Wrq { filename, mode } => {
                put_u16(&mut out, 2);
                put_cstr(&mut out, filename);
                put_cstr(&mut out, mode.as_token());
            }
            Packet::Data { block, data } => {
                put_u16(&mut out, 3);
                put_u16(&mut out, *block);
                out.extend_from_slice(data);
            }
            Packet::Ack { block } => {
                put_u16(&mut out, 4);
                put_u16(&mut out, *block);
            }
            Packet::Error { code, message } => {
                put_u16(&mut out, 5);
                put_u16(&mut out, code.as_u16());
                put_cstr(&mut out, message);
            }
        }
        out
    }

    /// Parse a datagram into a packet.
    pub fn decode(bytes: &[u8]) -> Result<Packet, FormatError> {
        let mut pos = 0;
        let opcode = read_u16(bytes, &mut pos)?;
        match opcode {
            1 => {
                let filename = read_cstr(bytes, &mut pos)?;
                let mode = Mode::from_token(&read_cstr(bytes, &mut pos)?);
                Ok(Packet::Rrq { filename, mode })
            }
            2 => {
                let filename = read_cstr(bytes, &mut pos)?;
                let mode = Mode::from_token(&read_cstr(bytes, &mut pos)?);
                Ok(Packet::Wrq { filename, mode })
            }
            3 => {
                let block = read_u16(bytes, &mut pos)?;
                Ok(Packet::Data {
                    block,
                    data: bytes[pos..].to_vec(),
                })
            }
            4 => {
                let block = read_u16(bytes, &mut pos)?;
                Ok(Packet::Ack { block })
            }
            5 => {
                let code = ErrorCode::from_u16(read_u16(bytes, &mut pos)?);
                let message = read_cstr(bytes, &mut pos)?;
                Ok(Packet::Error { code, message })
            }
            other => Err(FormatError::UnknownOpcode(other)),
        }
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn read_u16(buf: &[u8], pos: &mut usize) -> Result<u16, FormatError> {
    let end = pos.checked_add(2).ok_or(FormatError::Truncated)?;
    if end > buf.len() {
        return Err(FormatError::Truncated);
    }
    let value = u16::from_be_bytes([buf[*pos], buf[*pos + 1]]);
    *pos = end;
    Ok(value)
}

/// Read one NUL-terminated ASCII string, advancing the shared cursor past
/// the terminator so consecutive strings in one buffer parse sequentially.
pub(crate) fn read_cstr(buf: &[u8], pos: &mut usize) -> Result<String, FormatError> {
    let start = *pos;
    loop {
        match buf.get(*pos) {
            None => return Err(FormatError::MissingTerminator),
            Some(0) => break,
            Some(_) => *pos += 1,
        }
    }
    let s = String::from_utf8_lossy(&buf[start..*pos]).into_owned();
    *pos += 1;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_cstr_single_string() {
        let buf = [65, 66, 0];
        let mut pos = 0;
        assert_eq!(read_cstr(&buf, &mut pos).unwrap(), "AB");
        assert_eq!(pos, 3);
    }

    #[test]
    fn read_cstr_multiple_strings() {
        let buf = [65, 66, 0, 67, 68, 0, 69, 70, 0];
        let mut pos = 0;
        assert_eq!(read_cstr(&buf, &mut pos).unwrap(), "AB");
        assert_eq!(pos, 3);
        assert_eq!(read_cstr(&buf, &mut pos).unwrap(), "CD");
        assert_eq!(pos, 6);
        assert_eq!(read_cstr(&buf, &mut pos).unwrap(), "EF");
        assert_eq!(pos, 9);
    }

    #[test]
    fn read_cstr_lone_terminator_is_empty_string() {
        let buf = [0];
        let mut pos = 0;
        assert_eq!(read_cstr(&buf, &mut pos).unwrap(), "");
        assert_eq!(pos, 1);
    }

    #[test]
    fn read_cstr_without_terminator_fails() {
        let buf = [65, 66];
        let mut pos = 0;
        assert_eq!(
            read_cstr(&buf, &mut pos),
            Err(FormatError::MissingTerminator)
        );
    }

    fn round_trip(packet: Packet) {
        assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn rrq_round_trip() {
        round_trip(Packet::Rrq {
            filename: "asdf/zxcv".to_string(),
            mode: Mode::Octet,
        });
    }

    #[test]
    fn wrq_round_trip() {
        round_trip(Packet::Wrq {
            filename: "qwer/asdf".to_string(),
            mode: Mode::Netascii,
        });
    }

    #[test]
    fn data_round_trip() {
        let data: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
        round_trip(Packet::Data { block: 450, data });
        round_trip(Packet::Data {
            block: 1,
            data: Vec::new(),
        });
    }

    #[test]
    fn ack_round_trip() {
        round_trip(Packet::Ack { block: 333 });
    }

    #[test]
    fn error_round_trip() {
        round_trip(Packet::Error {
            code: ErrorCode::IllegalTftpOperation,
            message: "Oh noes!".to_string(),
        });
    }

    #[test]
    fn rrq_wire_layout() {
        let bytes = Packet::Rrq {
            filename: "f".to_string(),
            mode: Mode::Octet,
        }
        .encode();
        assert_eq!(bytes, b"\x00\x01f\x00octet\x00");
    }

    #[test]
    fn mode_tokens() {
        let parse = |token: &str| {
            let bytes = [b"\x00\x01f\x00" as &[u8], token.as_bytes(), b"\x00"].concat();
            match Packet::decode(&bytes).unwrap() {
                Packet::Rrq { mode, .. } => mode,
                other => panic!("expected RRQ, got {other:?}"),
            }
        };
        assert_eq!(parse("octet"), Mode::Octet);
        assert_eq!(parse("OCTET"), Mode::Octet);
        assert_eq!(parse("binary"), Mode::Octet);
        assert_eq!(parse("NetAscii"), Mode::Netascii);
        assert_eq!(parse("mail"), Mode::Mail);
        // mail is matched case-sensitively; anything else is unknown
        assert_eq!(parse("MAIL"), Mode::Unknown);
        assert_eq!(parse("wharrgarbl"), Mode::Unknown);
    }

    #[test]
    fn unknown_mode_never_serializes_to_a_valid_token() {
        let packet = Packet::Rrq {
            filename: "f".to_string(),
            mode: Mode::Unknown,
        };
        let bytes = packet.encode();
        assert!(bytes.ends_with(b"unknown\x00"));
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn decode_rejects_malformed_datagrams() {
        assert_eq!(Packet::decode(&[]), Err(FormatError::Truncated));
        assert_eq!(Packet::decode(&[0]), Err(FormatError::Truncated));
        assert_eq!(Packet::decode(&[0, 9]), Err(FormatError::UnknownOpcode(9)));
        // ACK missing its block number
        assert_eq!(Packet::decode(&[0, 4, 1]), Err(FormatError::Truncated));
        // RRQ with an unterminated file name
        assert_eq!(
            Packet::decode(b"\x00\x01name-without-nul"),
            Err(FormatError::MissingTerminator)
        );
        // RRQ missing the mode string entirely
        assert_eq!(
            Packet::decode(b"\x00\x01name\x00"),
            Err(FormatError::MissingTerminator)
        );
    }

    #[test]
    fn unknown_error_code_decodes_to_undefined() {
        let bytes = b"\x00\x05\x00\x63whoops\x00";
        assert_eq!(
            Packet::decode(bytes).unwrap(),
            Packet::Error {
                code: ErrorCode::Undefined,
                message: "whoops".to_string(),
            }
        );
    }
}
