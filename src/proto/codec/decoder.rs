use bytes::Buf;

use crate::proto::frame::Frame;

/// An incremental decoder that converts bytes to [`Frame`] values.
///
/// The decoder handles streaming input and can decode frames incrementally.
/// Call [`append`](Decoder::append) to add data, then [`decode`](Decoder::decode)
/// to parse frames. Returns `Ok(None)` when more data is needed.
///
/// The internal buffer is the receive remainder: bytes left over after a
/// decoded frame stay in place and seed the next call, so one decoder must
/// persist for the lifetime of its stream to preserve framing.
#[derive(Debug)]
pub struct Decoder {
    buf: bytes::BytesMut,
}

impl Decoder {
    /// Creates a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: bytes::BytesMut::new(),
        }
    }

    /// Appends raw bytes to the internal buffer.
    ///
    /// Call this method when new data arrives from the network.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode a frame from the buffer.
    ///
    /// Returns `Ok(Some(Frame))` if a complete frame was decoded.
    /// Returns `Ok(None)` if more data is needed.
    /// Returns `Err(...)` if the data is malformed.
    pub fn decode(&mut self) -> Result<Option<Frame>, String> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        match self.buf[0] {
            b'+' => self.decode_simple_string(),
            b'-' => self.decode_error(),
            b':' => self.decode_integer(),
            b'$' => self.decode_bulk_string(),
            b'*' => self.decode_array(),
            _ => Err(format!("unknown frame type: {}", self.buf[0] as char)),
        }
    }

    fn decode_simple_string(&mut self) -> Result<Option<Frame>, String> {
        let end = match self.find_crlf() {
            Some(end) => end,
            None => return Ok(None),
        };
        let data = self.buf[1..end].to_vec();
        self.buf.advance(end + 2);
        Ok(Some(Frame::SimpleString(data)))
    }

    fn decode_error(&mut self) -> Result<Option<Frame>, String> {
        let end = match self.find_crlf() {
            Some(end) => end,
            None => return Ok(None),
        };
        let data = self.buf[1..end].to_vec();
        self.buf.advance(end + 2);
        Ok(Some(Frame::Error(data)))
    }

    fn decode_integer(&mut self) -> Result<Option<Frame>, String> {
        let end = match self.find_crlf() {
            Some(end) => end,
            None => return Ok(None),
        };
        let data = self.buf[1..end].to_vec();
        let num = String::from_utf8(data)
            .map_err(|e| e.to_string())?
            .parse::<i64>()
            .map_err(|e| e.to_string())?;
        self.buf.advance(end + 2);
        Ok(Some(Frame::Integer(num)))
    }

    fn decode_bulk_string(&mut self) -> Result<Option<Frame>, String> {
        let end = match self.find_crlf() {
            Some(end) => end,
            None => return Ok(None),
        };
        let len_str = String::from_utf8(self.buf[1..end].to_vec()).map_err(|e| e.to_string())?;
        let len: isize = len_str.parse::<isize>().map_err(|e| e.to_string())?;

        if len == -1 {
            self.buf.advance(end + 2);
            return Ok(Some(Frame::BulkString(None)));
        }

        let len = len as usize;
        if self.buf.len() < end + 2 + len + 2 {
            return Ok(None);
        }
        self.buf.advance(end + 2);

        let data = self.buf[..len].to_vec().into();
        self.buf.advance(len + 2);
        Ok(Some(Frame::BulkString(Some(data))))
    }

    fn decode_array(&mut self) -> Result<Option<Frame>, String> {
        let end = match self.find_crlf() {
            Some(end) => end,
            None => return Ok(None),
        };
        let len_str = String::from_utf8(self.buf[1..end].to_vec()).map_err(|e| e.to_string())?;
        let len: isize = len_str.parse::<isize>().map_err(|e| e.to_string())?;

        if len == -1 {
            self.buf.advance(end + 2);
            return Ok(Some(Frame::Null));
        }

        // Elements are decoded against a lookahead copy so a partial array
        // leaves the buffer untouched for the next append.
        let mut lookahead = Decoder {
            buf: self.buf.clone(),
        };
        lookahead.buf.advance(end + 2);

        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            match lookahead.decode()? {
                Some(frame) => items.push(frame),
                None => return Ok(None),
            }
        }

        self.buf = lookahead.buf;
        Ok(Some(Frame::Array(items)))
    }

    /// Searches for the next CRLF sequence in the buffer.
    fn find_crlf(&self) -> Option<usize> {
        if self.buf.len() < 2 {
            return None;
        }
        for i in 1..self.buf.len() {
            if self.buf[i - 1] == b'\r' && self.buf[i] == b'\n' {
                return Some(i - 1);
            }
        }
        None
    }

    /// Returns true if the buffer holds bytes left over from the last read.
    pub fn has_remainder(&self) -> bool {
        !self.buf.is_empty()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
