//! STOMP 1.2 text frames and heart-beat negotiation.

use std::time::Duration;

use crate::error::FrameError;

/// A bare EOL sent in place of a frame to keep the connection alive.
pub const HEARTBEAT_EOL: &str = "\n";

/// Versions offered in CONNECT.
const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let command = match raw {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "SEND" => Command::Send,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            _ => return None,
        };
        Some(command)
    }

    /// CONNECT and CONNECTED headers are sent verbatim.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

// ---------------------------------------------------------------------------
// Heart-beating
// ---------------------------------------------------------------------------

/// The `heart-beat` header: how often we can send, how often we want to hear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl HeartBeat {
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (outgoing, incoming) = value.split_once(',')?;
        let outgoing = outgoing.trim().parse().ok()?;
        let incoming = incoming.trim().parse().ok()?;
        Some(Self::new(
            Duration::from_millis(outgoing),
            Duration::from_millis(incoming),
        ))
    }

    /// Resolve our settings against the server's CONNECTED header.
    ///
    /// Returns `(send_every, expect_within)`; `None` disables that direction.
    pub fn negotiate(&self, server: &HeartBeat) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: Duration, theirs: Duration| {
            if ours.is_zero() || theirs.is_zero() {
                None
            } else {
                Some(ours.max(theirs))
            }
        };
        (
            pick(self.outgoing, server.incoming),
            pick(self.incoming, server.outgoing),
        )
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup. Repeated headers resolve to the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, heartbeat: HeartBeat, credential: Option<&str>) -> Self {
        let frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", heartbeat.header_value());
        match credential {
            Some(token) => frame.header("Authorization", format!("Bearer {token}")),
            None => frame,
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        // Leading EOLs are heart-beats that shared the websocket message.
        let raw = raw.trim_start_matches(['\r', '\n']);
        if raw.is_empty() {
            return Err(FrameError::Empty);
        }
        let (head, rest) = split_head(raw);
        let head = up_to_nul(head);
        let mut lines = head.lines();
        let command_line = lines.next().ok_or(FrameError::Empty)?;
        let command = Command::parse(command_line.trim_end())
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        // A declared length wins over the NUL terminator: the body may contain NULs.
        let declared = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, len)| len.trim().parse::<usize>().ok());
        let body = match declared {
            Some(len) if len <= rest.len() && rest.is_char_boundary(len) => &rest[..len],
            _ => up_to_nul(rest),
        };

        Ok(Frame {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

/// True for websocket messages carrying only heart-beat EOLs.
pub fn is_heartbeat(raw: &str) -> bool {
    raw.chars().all(|c| c == '\n' || c == '\r')
}

fn up_to_nul(raw: &str) -> &str {
    raw.find('\0').map_or(raw, |end| &raw[..end])
}

/// Split at the blank line that ends the header block.
fn split_head(raw: &str) -> (&str, &str) {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if offset > 0 && (line == "\n" || line == "\r\n") {
            return (&raw[..offset], &raw[offset + line.len()..]);
        }
        offset += line.len();
    }
    (raw, "")
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_carries_heartbeat_and_credential() {
        let hb = HeartBeat::new(Duration::from_secs(4), Duration::from_secs(4));
        let encoded = Frame::connect("localhost", hb, Some("tok")).encode();
        assert!(encoded.starts_with("CONNECT\n"));
        assert!(encoded.contains("heart-beat:4000,4000\n"));
        assert!(encoded.contains("Authorization:Bearer tok\n"));
        assert!(encoded.ends_with("\n\n\0"));
    }

    #[test]
    fn decode_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/signals\nsubscription:sub_1\nmessage-id:9\n\n{\"code\":\"FPT\"}\0";
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("destination"), Some("/topic/signals"));
        assert_eq!(frame.get("subscription"), Some("sub_1"));
        assert_eq!(frame.body, "{\"code\":\"FPT\"}");
    }

    #[test]
    fn decode_tolerates_crlf_and_leading_heartbeats() {
        let raw = "\n\nMESSAGE\r\ndestination:/topic/a\r\n\r\nbody\0\n";
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.get("destination"), Some("/topic/a"));
        assert_eq!(frame.body, "body");
    }

    #[test]
    fn content_length_trims_body() {
        let raw = "MESSAGE\ncontent-length:3\n\nabcdef\0";
        assert_eq!(Frame::decode(raw).unwrap().body, "abc");
    }

    #[test]
    fn content_length_keeps_embedded_nul() {
        let raw = "MESSAGE\ndestination:/topic/a\ncontent-length:5\n\nab\0cd\0";
        assert_eq!(Frame::decode(raw).unwrap().body, "ab\0cd");
    }

    #[test]
    fn body_without_content_length_ends_at_nul() {
        let raw = "MESSAGE\ndestination:/topic/a\n\nab\0cd\0";
        assert_eq!(Frame::decode(raw).unwrap().body, "ab");
    }

    #[test]
    fn header_escaping_survives_encode_decode() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/x")
            .header("note", "a:b\nc\\d");
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.get("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn connected_headers_are_not_unescaped() {
        let frame = Frame::decode("CONNECTED\nserver:x\\y\n\n\0").unwrap();
        assert_eq!(frame.get("server"), Some("x\\y"));
    }

    #[test]
    fn decode_errors() {
        assert_eq!(Frame::decode("\n"), Err(FrameError::Empty));
        assert!(matches!(
            Frame::decode("BOGUS\n\n\0"),
            Err(FrameError::UnknownCommand(_))
        ));
        assert!(matches!(
            Frame::decode("MESSAGE\nno-colon\n\n\0"),
            Err(FrameError::MalformedHeader(_))
        ));
        assert_eq!(
            Frame::decode("MESSAGE\nbad:\\t\n\n\0"),
            Err(FrameError::InvalidEscape)
        );
    }

    #[test]
    fn heartbeat_detection() {
        assert!(is_heartbeat("\n"));
        assert!(is_heartbeat("\r\n"));
        assert!(!is_heartbeat("MESSAGE\n\n\0"));
    }

    #[test]
    fn negotiate_takes_the_slower_side() {
        let ours = HeartBeat::new(Duration::from_millis(4000), Duration::from_millis(4000));
        let server = HeartBeat::parse("10000, 1000").unwrap();
        let (send, expect) = ours.negotiate(&server);
        assert_eq!(send, Some(Duration::from_millis(4000)));
        assert_eq!(expect, Some(Duration::from_millis(10000)));
    }

    #[test]
    fn negotiate_disables_zero_directions() {
        let ours = HeartBeat::new(Duration::from_millis(4000), Duration::from_millis(4000));
        let (send, expect) = ours.negotiate(&HeartBeat::parse("0,0").unwrap());
        assert_eq!(send, None);
        assert_eq!(expect, None);
        assert!(HeartBeat::parse("garbage").is_none());
    }
}
