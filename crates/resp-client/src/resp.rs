//! RESP2 encoding and decoding.

use loadgen_core::{ClientError, Command, Reply};
use std::io::{self, BufRead};

/// Nesting limit for aggregate replies.
const MAX_DEPTH: usize = 32;

/// Upper bound on a single bulk string (matches the server's proto-max-bulk-len default).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// A decoded RESP value, including error replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Value>>),
}

impl Value {
    /// Convert into a reply, turning error replies (including nested ones)
    /// into classified server errors.
    pub fn into_reply(self) -> Result<Reply, ClientError> {
        match self {
            Value::Simple(s) => Ok(Reply::Status(s)),
            Value::Error(message) => Err(ClientError::server(message)),
            Value::Integer(n) => Ok(Reply::Int(n)),
            Value::Bulk(None) | Value::Array(None) => Ok(Reply::Nil),
            Value::Bulk(Some(bytes)) => Ok(Reply::Bulk(bytes)),
            Value::Array(Some(items)) => items
                .into_iter()
                .map(Value::into_reply)
                .collect::<Result<Vec<_>, _>>()
                .map(Reply::Array),
        }
    }
}

/// Append the wire form of `command` to `out`.
pub fn encode_command(command: &Command, out: &mut Vec<u8>) {
    let args = command.args();
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Read one complete value from `reader`.
pub fn read_value<R: BufRead>(reader: &mut R) -> Result<Value, ClientError> {
    read_value_at(reader, 0)
}

fn read_value_at<R: BufRead>(reader: &mut R, depth: usize) -> Result<Value, ClientError> {
    if depth > MAX_DEPTH {
        return Err(ClientError::Protocol(format!(
            "reply nested deeper than {MAX_DEPTH} levels"
        )));
    }

    let line = read_line(reader)?;
    let (prefix, body) = line
        .split_first()
        .ok_or_else(|| ClientError::Protocol("empty reply line".into()))?;

    match *prefix {
        b'+' => Ok(Value::Simple(String::from_utf8_lossy(body).into_owned())),
        b'-' => Ok(Value::Error(String::from_utf8_lossy(body).into_owned())),
        b':' => Ok(Value::Integer(parse_int(body)?)),
        b'$' => {
            let len = parse_int(body)?;
            if len < 0 {
                return Ok(Value::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(ClientError::Protocol(format!(
                    "bulk length {len} exceeds limit"
                )));
            }
            let mut data = vec![0u8; len as usize + 2];
            reader.read_exact(&mut data)?;
            if !data.ends_with(b"\r\n") {
                return Err(ClientError::Protocol(
                    "bulk string not terminated by CRLF".into(),
                ));
            }
            data.truncate(len as usize);
            Ok(Value::Bulk(Some(data)))
        }
        b'*' => {
            let count = parse_int(body)?;
            if count < 0 {
                return Ok(Value::Array(None));
            }
            let mut items = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                items.push(read_value_at(reader, depth + 1)?);
            }
            Ok(Value::Array(Some(items)))
        }
        // RESP3 null, seen when a proxy negotiates the newer protocol
        b'_' => Ok(Value::Bulk(None)),
        other => Err(ClientError::Protocol(format!(
            "invalid type byte 0x{other:02x}"
        ))),
    }
}

/// Read a CRLF terminated line, without the terminator.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, ClientError> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(ClientError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(ClientError::Protocol("line not terminated by CRLF".into()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_int(body: &[u8]) -> Result<i64, ClientError> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ClientError::Protocol(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(body)
            ))
        })
}
