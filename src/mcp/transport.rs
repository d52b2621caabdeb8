//! MCP stdio wire framing
//!
//! The stdio transport frames each JSON-RPC message as one UTF-8 line:
//! ```text
//! <JSON document>\n
//! ```

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Error;

/// Sanity limit on a single message (10 MB)
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Read the next JSON line from the stream
///
/// Blank lines are skipped. EOF is surfaced as `UnexpectedEof` so the caller
/// can report the server process as gone.
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, Error> {
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed",
            )));
        }

        if bytes_read > MAX_MESSAGE_SIZE {
            return Err(Error::McpProtocol(format!(
                "message too large: {} bytes",
                bytes_read
            )));
        }

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
}

/// Write a JSON message as one newline-terminated line
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    json: &str,
) -> Result<(), Error> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_message() {
        let data = b"{\"test\":true}\n";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        let result = read_message(&mut reader).await.unwrap();
        assert_eq!(result, "{\"test\":true}");
    }

    #[tokio::test]
    async fn test_read_skips_blank_lines() {
        let data = b"\n\n{\"test\":1}\n";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        let result = read_message(&mut reader).await.unwrap();
        assert_eq!(result, "{\"test\":1}");
    }

    #[tokio::test]
    async fn test_read_eof() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        let err = read_message(&mut reader).await.unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_write_message() {
        let mut output = Vec::new();
        write_message(&mut output, "{\"test\":true}").await.unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "{\"test\":true}\n");
    }
}
