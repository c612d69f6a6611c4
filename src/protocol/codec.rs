//! Framing for the memcached text protocol.
//!
//! Requests are written in one shot. Replies are parsed only once a complete
//! reply is buffered; partial input leaves the buffer untouched so the next
//! read can resume from the same position.

use super::types::{Command, Item, Response};
use super::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Text protocol codec for one connection
#[derive(Debug, Clone)]
pub struct MemcacheCodec {
    max_frame_bytes: usize,
}

impl MemcacheCodec {
    /// `max_frame_bytes` bounds how much unparsed reply data may accumulate
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

impl Default for MemcacheCodec {
    fn default() -> Self {
        // Generous enough for a multi-get of several maximum-size items
        Self::new(64 * 1024 * 1024)
    }
}

impl Encoder<Command> for MemcacheCodec {
    type Error = ProtocolError;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match command {
            Command::Store {
                mode,
                key,
                flags,
                exptime,
                data,
            } => {
                let header = format!("{} {} {} {} {}\r\n", mode.verb(), key, flags, exptime, data.len());
                dst.reserve(header.len() + data.len() + CRLF.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(&data);
                dst.put_slice(CRLF);
            }
            Command::Get { keys } => {
                if keys.is_empty() {
                    return Err(ProtocolError::Malformed("get without keys".to_string()));
                }
                dst.put_slice(format!("get {}\r\n", keys.join(" ")).as_bytes());
            }
            Command::Delete { key } => dst.put_slice(format!("delete {key}\r\n").as_bytes()),
            Command::Touch { key, exptime } => {
                dst.put_slice(format!("touch {key} {exptime}\r\n").as_bytes())
            }
            Command::Incr { key, delta } => dst.put_slice(format!("incr {key} {delta}\r\n").as_bytes()),
            Command::Decr { key, delta } => dst.put_slice(format!("decr {key} {delta}\r\n").as_bytes()),
            Command::Version => dst.put_slice(b"version\r\n"),
            Command::FlushAll => dst.put_slice(b"flush_all\r\n"),
        }
        Ok(())
    }
}

impl Decoder for MemcacheCodec {
    type Item = Response;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse_response(src)? {
            Some((response, consumed)) => {
                src.advance(consumed);
                Ok(Some(response))
            }
            None if src.len() > self.max_frame_bytes => Err(ProtocolError::FrameTooLarge(src.len())),
            None => Ok(None),
        }
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == CRLF)
        .map(|offset| from + offset)
}

/// Parse one complete reply, returning it with the number of bytes consumed
fn parse_response(buf: &[u8]) -> Result<Option<(Response, usize)>, ProtocolError> {
    let Some(line_end) = find_crlf(buf, 0) else {
        return Ok(None);
    };
    let line = &buf[..line_end];

    if line.starts_with(b"VALUE ") || line == b"END" {
        return parse_values(buf);
    }

    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::Malformed("reply line is not UTF-8".to_string()))?;
    let consumed = line_end + CRLF.len();

    let response = match text {
        "STORED" => Response::Stored,
        "NOT_STORED" => Response::NotStored,
        "EXISTS" => Response::Exists,
        "NOT_FOUND" => Response::NotFound,
        "DELETED" => Response::Deleted,
        "TOUCHED" => Response::Touched,
        "OK" => Response::Ok,
        "ERROR" => Response::Error(text.to_string()),
        _ if text.starts_with("CLIENT_ERROR") || text.starts_with("SERVER_ERROR") => {
            Response::Error(text.to_string())
        }
        _ if text.starts_with("VERSION ") => Response::Version(text["VERSION ".len()..].to_string()),
        _ if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            let number = text
                .parse::<u64>()
                .map_err(|e| ProtocolError::Malformed(format!("numeric reply '{text}': {e}")))?;
            Response::Number(number)
        }
        _ => return Err(ProtocolError::Malformed(format!("unexpected reply '{text}'"))),
    };

    Ok(Some((response, consumed)))
}

fn parse_values(buf: &[u8]) -> Result<Option<(Response, usize)>, ProtocolError> {
    let mut items = Vec::new();
    let mut pos = 0;

    loop {
        let Some(line_end) = find_crlf(buf, pos) else {
            return Ok(None);
        };
        let line = &buf[pos..line_end];
        pos = line_end + CRLF.len();

        if line == b"END" {
            return Ok(Some((Response::Values(items), pos)));
        }

        let (key, flags, length) = parse_value_header(line)?;
        let (data_end, item_end) = pos
            .checked_add(length)
            .and_then(|end| Some((end, end.checked_add(CRLF.len())?)))
            .ok_or_else(|| {
                ProtocolError::Malformed(format!("value length {length} for '{key}' out of range"))
            })?;
        if buf.len() < item_end {
            return Ok(None);
        }
        if &buf[data_end..item_end] != CRLF {
            return Err(ProtocolError::Malformed(format!(
                "value for '{key}' not terminated by CRLF"
            )));
        }

        items.push(Item {
            key,
            flags,
            data: Bytes::copy_from_slice(&buf[pos..data_end]),
        });
        pos = item_end;
    }
}

/// `VALUE <key> <flags> <bytes> [<cas>]`
fn parse_value_header(line: &[u8]) -> Result<(String, u32, usize), ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::Malformed("VALUE line is not UTF-8".to_string()))?;
    let mut parts = text.split(' ');

    let malformed = || ProtocolError::Malformed(format!("bad VALUE line '{text}'"));
    if parts.next() != Some("VALUE") {
        return Err(malformed());
    }
    let key = parts.next().filter(|k| !k.is_empty()).ok_or_else(malformed)?;
    let flags = parts
        .next()
        .and_then(|f| f.parse::<u32>().ok())
        .ok_or_else(malformed)?;
    let length = parts
        .next()
        .and_then(|l| l.parse::<usize>().ok())
        .ok_or_else(malformed)?;

    Ok((key.to_string(), flags, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::StoreMode;

    fn encode(command: Command) -> BytesMut {
        let mut buf = BytesMut::new();
        MemcacheCodec::default().encode(command, &mut buf).unwrap();
        buf
    }

    fn decode_all(input: &[u8]) -> Vec<Response> {
        let mut codec = MemcacheCodec::default();
        let mut buf = BytesMut::from(input);
        let mut responses = Vec::new();
        while let Some(response) = codec.decode(&mut buf).unwrap() {
            responses.push(response);
        }
        assert!(buf.is_empty(), "trailing bytes: {buf:?}");
        responses
    }

    #[test]
    fn test_encode_set() {
        let buf = encode(Command::Store {
            mode: StoreMode::Set,
            key: "cream_ruby_test_key_0".to_string(),
            flags: 1,
            exptime: 0,
            data: Bytes::from_static(b"0"),
        });
        assert_eq!(&buf[..], b"set cream_ruby_test_key_0 1 0 1\r\n0\r\n");
    }

    #[test]
    fn test_encode_simple_commands() {
        assert_eq!(
            &encode(Command::Get {
                keys: vec!["a".to_string(), "b".to_string()]
            })[..],
            b"get a b\r\n"
        );
        assert_eq!(&encode(Command::Delete { key: "a".to_string() })[..], b"delete a\r\n");
        assert_eq!(
            &encode(Command::Touch {
                key: "a".to_string(),
                exptime: 60
            })[..],
            b"touch a 60\r\n"
        );
        assert_eq!(
            &encode(Command::Incr {
                key: "c".to_string(),
                delta: 5
            })[..],
            b"incr c 5\r\n"
        );
        assert_eq!(&encode(Command::Version)[..], b"version\r\n");
        assert_eq!(&encode(Command::FlushAll)[..], b"flush_all\r\n");
    }

    #[test]
    fn test_encode_get_without_keys_fails() {
        let mut buf = BytesMut::new();
        let result = MemcacheCodec::default().encode(Command::Get { keys: vec![] }, &mut buf);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_status_lines() {
        let responses = decode_all(
            b"STORED\r\nNOT_STORED\r\nDELETED\r\nNOT_FOUND\r\nTOUCHED\r\nOK\r\n42\r\nVERSION 1.6.21\r\n",
        );
        assert_eq!(
            responses,
            vec![
                Response::Stored,
                Response::NotStored,
                Response::Deleted,
                Response::NotFound,
                Response::Touched,
                Response::Ok,
                Response::Number(42),
                Response::Version("1.6.21".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_errors_verbatim() {
        let responses = decode_all(b"ERROR\r\nSERVER_ERROR out of memory storing object\r\n");
        assert_eq!(
            responses,
            vec![
                Response::Error("ERROR".to_string()),
                Response::Error("SERVER_ERROR out of memory storing object".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_values_with_binary_data() {
        let responses = decode_all(b"VALUE a 1 4\r\n\r\n\x00\xff\r\nVALUE b 0 2 99\r\nhi\r\nEND\r\n");
        assert_eq!(
            responses,
            vec![Response::Values(vec![
                Item {
                    key: "a".to_string(),
                    flags: 1,
                    data: Bytes::from_static(b"\r\n\x00\xff"),
                },
                Item {
                    key: "b".to_string(),
                    flags: 0,
                    data: Bytes::from_static(b"hi"),
                },
            ])]
        );
    }

    #[test]
    fn test_decode_miss() {
        assert_eq!(decode_all(b"END\r\n"), vec![Response::Values(vec![])]);
    }

    #[test]
    fn test_partial_input_waits_for_more() {
        let mut codec = MemcacheCodec::default();
        let full = b"VALUE key 1 5\r\nhello\r\nEND\r\n";
        for split in 1..full.len() {
            let mut buf = BytesMut::from(&full[..split]);
            assert_eq!(codec.decode(&mut buf).unwrap(), None, "split at {split}");
            assert_eq!(buf.len(), split);
            buf.extend_from_slice(&full[split..]);
            assert!(matches!(
                codec.decode(&mut buf).unwrap(),
                Some(Response::Values(items)) if items.len() == 1
            ));
        }
    }

    #[test]
    fn test_malformed_replies_rejected() {
        let mut codec = MemcacheCodec::default();
        let mut buf = BytesMut::from(&b"WHAT\r\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::Malformed(_))));

        let mut buf = BytesMut::from(&b"VALUE k x 1\r\na\r\nEND\r\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::Malformed(_))));

        let mut buf = BytesMut::from(&b"VALUE k 0 1\r\nabc\r\nEND\r\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_oversized_value_length_rejected() {
        let mut codec = MemcacheCodec::default();
        let mut buf = BytesMut::from(&b"VALUE k 0 18446744073709551615\r\nabc\r\nEND\r\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::Malformed(_))));

        let near_max = format!("VALUE k 0 {}\r\nabc", usize::MAX - 15);
        let mut buf = BytesMut::from(near_max.as_bytes());
        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_frame_limit() {
        let mut codec = MemcacheCodec::new(16);
        let mut buf = BytesMut::from(&b"VALUE k 0 100\r\n0123456789"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::FrameTooLarge(_))));
    }
}
