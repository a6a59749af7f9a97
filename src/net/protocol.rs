//! Wire-level framing: the mandatory `[SERVER]: ` response prefix and
//! newline-delimited line extraction from a per-client receive buffer.

/// Every server-originated message carries this prefix.
pub const SERVER_PREFIX: &str = "[SERVER]: ";

/// Wraps `body` in the server prefix, normalizing to exactly one trailing
/// newline regardless of whether `body` already ends with one.
pub fn frame_response(body: &str) -> String {
    let body = body.strip_suffix('\n').unwrap_or(body);
    format!("{SERVER_PREFIX}{body}\n")
}

/// Drains every complete `\n`-terminated line out of `buf` (in order),
/// leaving a trailing partial line, if any, in `buf` for the next read.
pub fn drain_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
            break;
        };
        let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line_bytes).into_owned());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_response_adds_prefix_and_single_trailing_newline() {
        assert_eq!(frame_response("OK ID=1"), "[SERVER]: OK ID=1\n");
        assert_eq!(frame_response("OK ID=1\n"), "[SERVER]: OK ID=1\n");
    }

    #[test]
    fn drain_lines_splits_complete_lines_and_keeps_partial_remainder() {
        let mut buf = b"ACTIVATE t1\nLIST\nDEAC".to_vec();
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["ACTIVATE t1\n", "LIST\n"]);
        assert_eq!(buf, b"DEAC");
    }

    #[test]
    fn drain_lines_returns_nothing_for_a_buffer_with_no_newline() {
        let mut buf = b"partial".to_vec();
        assert!(drain_lines(&mut buf).is_empty());
        assert_eq!(buf, b"partial");
    }
}
