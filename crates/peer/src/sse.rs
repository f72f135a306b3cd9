//! SSE buffering for the streamed peer response.
//!
//! Streamed responses arrive as server-sent events, one JSON envelope per
//! `data:` payload.  Incoming body chunks are appended to a buffer and
//! complete events (delimited by `\n\n`) are drained off the front; a
//! trailing partial event stays in the buffer for the next chunk.

/// Pull complete `data:` payloads out of the buffer, in order.
pub(crate) fn drain_data_payloads(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
    }

    payloads
}

/// Flush whatever remains in the buffer as a final event block.
pub(crate) fn flush_remainder(buffer: &mut String) -> Vec<String> {
    if buffer.trim().is_empty() {
        buffer.clear();
        return Vec::new();
    }
    buffer.push_str("\n\n");
    drain_data_payloads(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_single_event() {
        let mut buf = String::from("data: {\"result\":{}}\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["{\"result\":{}}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_event_stays_buffered() {
        let mut buf = String::from("data: first\n\ndata: par");
        assert_eq!(drain_data_payloads(&mut buf), vec!["first"]);
        assert_eq!(buf, "data: par");

        buf.push_str("tial\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["partial"]);
    }

    #[test]
    fn ignores_non_data_lines() {
        let mut buf = String::from("event: update\nid: 3\ndata: payload\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["payload"]);
    }

    #[test]
    fn skips_empty_data_lines() {
        let mut buf = String::from("data:\n\n");
        assert!(drain_data_payloads(&mut buf).is_empty());
    }

    #[test]
    fn flush_remainder_completes_trailing_event() {
        let mut buf = String::from("data: tail");
        assert_eq!(flush_remainder(&mut buf), vec!["tail"]);
        let mut empty = String::from("  \n");
        assert!(flush_remainder(&mut empty).is_empty());
    }
}
