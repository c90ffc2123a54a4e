//! Byte-level NDJSON line reading shared by import and validation.
//!
//! Lines are read as raw bytes so that a line which is not valid UTF-8 is a
//! record-level decode failure rather than a read error for the whole stream.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub(crate) struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Next line without its terminator, with its 1-based number. Blank
    /// lines are returned too; callers decide to skip them.
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<(u64, &[u8])>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        let mut line = self.buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
        }
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }
        Ok(Some((self.line_no, line)))
    }
}

pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_raw_lines_with_numbers() {
        let input: &[u8] = b"a\r\n\n\xff\xfe\nlast";
        let mut lines = LineReader::new(input);

        let mut seen = Vec::new();
        while let Some((no, line)) = lines.next_line().await.unwrap() {
            seen.push((no, line.to_vec(), is_blank(line)));
        }
        assert_eq!(
            seen,
            vec![
                (1, b"a".to_vec(), false),
                (2, Vec::new(), true),
                (3, vec![0xff, 0xfe], false),
                (4, b"last".to_vec(), false),
            ]
        );
    }
}
