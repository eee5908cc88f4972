//! Parser for `lsof -i -P -n` output.
//!
//! Columns: `COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME [(STATE)]`.
//! The parser is total. Lines it cannot make sense of are dropped one at a time
//! and never affect the rest of the output.

use tracing::trace;

use super::process_name::sanitize_process_name;
use super::{PortRecord, Protocol};

const MIN_COLUMNS: usize = 9;
const COMMAND_COLUMN: usize = 0;
const PID_COLUMN: usize = 1;
const NODE_COLUMN: usize = 7;
const NAME_COLUMN: usize = 8;
const STATE_COLUMN: usize = 9;

/// Parses the full stdout of one `lsof` invocation.
///
/// The first line is the header and is always discarded. Record order follows
/// the input; duplicate lines yield duplicate records.
pub fn parse_lsof_output(output: &str) -> Vec<PortRecord> {
    let mut lines = output.lines();
    if lines.next().is_none() {
        return Vec::new();
    }

    lines.filter_map(parse_lsof_line).collect()
}

/// Parses a single data line, or returns `None` when the line is malformed.
pub fn parse_lsof_line(line: &str) -> Option<PortRecord> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() < MIN_COLUMNS {
        trace!(columns = columns.len(), "skipping short lsof line");
        return None;
    }

    let command = columns[COMMAND_COLUMN];
    let pid = match columns[PID_COLUMN].parse::<u32>() {
        Ok(pid) if pid > 0 => pid,
        _ => {
            trace!(pid = columns[PID_COLUMN], "skipping lsof line with invalid PID");
            return None;
        }
    };

    let port = match extract_port(columns[NAME_COLUMN]) {
        Some(port) => port,
        None => {
            trace!(name = columns[NAME_COLUMN], "skipping lsof line without a port");
            return None;
        }
    };

    let state = columns
        .get(STATE_COLUMN)
        .map(|s| s.trim_matches(|c: char| c == '(' || c == ')'))
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(PortRecord {
        port,
        protocol: detect_protocol(&columns),
        process_name: sanitize_process_name(command),
        pid,
        command: command.to_string(),
        state,
    })
}

/// Reads the NODE column; otherwise any whole `TCP`/`UDP` token, TCP first.
///
/// Tokens are compared whole so that a command or user named `TCPproxy` does
/// not decide the protocol. TCP is the fallback for unexpected input.
fn detect_protocol(columns: &[&str]) -> Protocol {
    match columns.get(NODE_COLUMN).copied() {
        Some("TCP") => return Protocol::Tcp,
        Some("UDP") => return Protocol::Udp,
        _ => {}
    }
    if columns.iter().any(|&c| c == "TCP") {
        Protocol::Tcp
    } else if columns.iter().any(|&c| c == "UDP") {
        Protocol::Udp
    } else {
        Protocol::Tcp
    }
}

/// Returns the last run of digits that directly follows a `:` in the NAME field.
///
/// Handles `*:22`, `127.0.0.1:8080`, `[::1]:631`, `fe80::1:5353` and connected
/// sockets like `10.0.0.2:52144->1.1.1.1:443`. Runs that overflow a port number
/// are treated as absent.
pub fn extract_port(name: &str) -> Option<u16> {
    let bytes = name.as_bytes();
    let mut last: Option<&str> = None;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b':' {
            let start = i + 1;
            let end = bytes[start..]
                .iter()
                .position(|b| !b.is_ascii_digit())
                .map_or(bytes.len(), |offset| start + offset);
            if end > start {
                last = Some(&name[start..end]);
            }
            i = end.max(start);
        } else {
            i += 1;
        }
    }

    last?.parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME";

    #[test]
    fn parses_listening_tcp_socket() {
        let output = format!(
            "{}\nChrome  1234  user  61u  IPv4  0x0  0t0  TCP  127.0.0.1:8080 (LISTEN)\n",
            HEADER
        );
        let records = parse_lsof_output(&output);
        assert_eq!(
            records,
            vec![PortRecord {
                port: 8080,
                protocol: Protocol::Tcp,
                process_name: "Chrome".to_string(),
                pid: 1234,
                command: "Chrome".to_string(),
                state: Some("LISTEN".to_string()),
            }]
        );
    }

    #[test]
    fn parses_udp_without_state() {
        let line = "mDNSRespo 201 _mdnsresponder 8u IPv6 0xabc 0t0 UDP *:5353";
        let record = parse_lsof_line(line).unwrap();
        assert_eq!(record.port, 5353);
        assert_eq!(record.protocol, Protocol::Udp);
        assert_eq!(record.state, None);
    }

    #[test]
    fn protocol_ignores_tcp_inside_other_columns() {
        let line = "TCPproxy 4100 alice 5u IPv4 0x1 0t0 UDP *:5353";
        let record = parse_lsof_line(line).unwrap();
        assert_eq!(record.protocol, Protocol::Udp);
        assert_eq!(record.process_name, "TCPproxy");

        let line = "relay 4101 udpuser 6u IPv4 0x2 0t0 TCP *:7000 (LISTEN)";
        assert_eq!(parse_lsof_line(line).unwrap().protocol, Protocol::Tcp);
    }

    #[test]
    fn header_only_or_empty_input() {
        assert!(parse_lsof_output("").is_empty());
        assert!(parse_lsof_output(HEADER).is_empty());
        assert!(parse_lsof_output(&format!("{}\n", HEADER)).is_empty());
    }

    #[test]
    fn first_line_is_dropped_even_if_it_looks_like_data() {
        let line = "nginx 900 root 6u IPv4 0x1 0t0 TCP *:80 (LISTEN)";
        let output = format!("{}\n{}", line, line);
        assert_eq!(parse_lsof_output(&output).len(), 1);
    }

    #[test]
    fn malformed_lines_are_skipped_independently() {
        let output = [
            HEADER,
            "short line only",
            "node abc user 20u IPv4 0x1 0t0 TCP *:3000 (LISTEN)",
            "node 0 user 20u IPv4 0x1 0t0 TCP *:3000 (LISTEN)",
            "node 77 user 20u IPv4 0x1 0t0 TCP localhost (LISTEN)",
            "node 4100 user 20u IPv4 0x1 0t0 TCP *:3000 (LISTEN)",
            "",
        ]
        .join("\n");
        let records = parse_lsof_output(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, 4100);
        assert_eq!(records[0].port, 3000);
    }

    #[test]
    fn duplicates_are_preserved() {
        let line = "redis 600 user 6u IPv4 0x1 0t0 TCP *:6379 (LISTEN)";
        let output = format!("{}\n{}\n{}\n", HEADER, line, line);
        assert_eq!(parse_lsof_output(&output).len(), 2);
    }

    #[test]
    fn tolerates_crlf_and_extra_whitespace() {
        let output = format!(
            "{}\r\n   sshd\t\t 512 root 3u IPv6 0x1 0t0 TCP [::]:22 (LISTEN)   \r\n",
            HEADER
        );
        let records = parse_lsof_output(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].port, 22);
        assert_eq!(records[0].state.as_deref(), Some("LISTEN"));
    }

    #[test]
    fn unknown_protocol_defaults_to_tcp() {
        let line = "weird 300 user 1u IPv4 0x1 0t0 SCTP 10.0.0.1:9999";
        assert_eq!(parse_lsof_line(line).unwrap().protocol, Protocol::Tcp);
    }

    #[test]
    fn sanitizes_name_but_keeps_command() {
        let line = r"Google\x20Chrome\x20H 888 user 30u IPv4 0x1 0t0 TCP 127.0.0.1:9222 (LISTEN)";
        let record = parse_lsof_line(line).unwrap();
        assert_eq!(record.process_name, "Google Chrome H");
        assert_eq!(record.command, r"Google\x20Chrome\x20H");
    }

    #[test]
    fn extract_port_variants() {
        assert_eq!(extract_port("*:22"), Some(22));
        assert_eq!(extract_port("127.0.0.1:8080"), Some(8080));
        assert_eq!(extract_port("[::1]:631"), Some(631));
        assert_eq!(extract_port("fe80::1:5353"), Some(5353));
        assert_eq!(extract_port("10.0.0.2:52144->1.1.1.1:443"), Some(443));
        assert_eq!(extract_port("*:*"), None);
        assert_eq!(extract_port("localhost"), None);
        assert_eq!(extract_port("*:70000"), None);
    }
}
