use bytes::Bytes;

/// A single wire-protocol frame.
///
/// This enum represents every frame type the protocol defines:
/// - SimpleString: status replies like "OK"
/// - Error: error replies from the server (redirections arrive as these)
/// - Integer: numeric replies
/// - BulkString: binary-safe string data
/// - Array: request argument vectors and array replies
/// - Null: NULL value
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SimpleString(Vec<u8>),
    Error(Vec<u8>),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Vec<Frame>),
    Null,
}

impl Frame {
    /// Attempts to extract a bulk string payload from this frame.
    pub fn to_bulk_string(&self) -> Option<Bytes> {
        match self {
            Frame::BulkString(b) => b.clone(),
            _ => None,
        }
    }

    /// Attempts to extract an array from this frame.
    pub fn to_array(&self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(a) => Some(a.clone()),
            _ => None,
        }
    }

    /// Attempts to extract an integer from this frame.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Frame::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the error payload if this frame is an error reply.
    pub fn as_error(&self) -> Option<&[u8]> {
        match self {
            Frame::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if this frame is Null.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }
}
