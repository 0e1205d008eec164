//! Null-delimited text protocol shared by client and server.
//!
//! Every message on the wire is `TOKEN<space>payload\0`. Frames are
//! reassembled from a byte stream by [`RecvBuffer`] and queued for sending
//! by [`OutQueue`]. Both work against plain `Read`/`Write` streams in
//! non-blocking mode, where `WouldBlock` just means "try again next tick".

use std::io::{self, ErrorKind, Read, Write};

use log::debug;

use crate::NAME_BUF_SIZE;

/// Initial receive buffer size in bytes.
pub const RECV_BUF_INITIAL: usize = 500;
/// A receive buffer that would have to grow past this is reset instead.
pub const RECV_BUF_CAP: usize = 10_000;

const DELIMITER: u8 = 0;

/// Command vocabulary. Discriminants are the integer tags; 0 is reserved
/// for raw output with no token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cmd {
    Ping = 1,
    Pong = 2,
    Chat = 3,
    GameFull = 4,
    SetName = 5,
    NameOk = 6,
    MustRename = 7,
    PlayerInput = 8,
    Simulation = 9,
    InitTileData = 10,
    AddBot = 11,
    RemoveBot = 12,
}

impl Cmd {
    pub const ALL: [Cmd; 12] = [
        Cmd::Ping,
        Cmd::Pong,
        Cmd::Chat,
        Cmd::GameFull,
        Cmd::SetName,
        Cmd::NameOk,
        Cmd::MustRename,
        Cmd::PlayerInput,
        Cmd::Simulation,
        Cmd::InitTileData,
        Cmd::AddBot,
        Cmd::RemoveBot,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Cmd::Ping => "PING",
            Cmd::Pong => "PONG",
            Cmd::Chat => "CHAT",
            Cmd::GameFull => "GAME_FULL",
            Cmd::SetName => "SET_NAME",
            Cmd::NameOk => "NAME_OK",
            Cmd::MustRename => "MUST_RENAME",
            Cmd::PlayerInput => "PLAYER_INPUT",
            Cmd::Simulation => "SIMULATION",
            Cmd::InitTileData => "INIT_TILE_DATA",
            Cmd::AddBot => "ADD_BOT",
            Cmd::RemoveBot => "REMOVE_BOT",
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Cmd> {
        Cmd::ALL.into_iter().find(|cmd| cmd.tag() == tag)
    }

    pub fn from_token(token: &str) -> Option<Cmd> {
        Cmd::ALL.into_iter().find(|cmd| cmd.token() == token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown command token {0:?}")]
    UnknownCommand(String),
}

/// One decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: Cmd,
    pub payload: String,
}

/// Appends `TOKEN payload\0` to `buf`.
pub fn push_msg(buf: &mut Vec<u8>, cmd: Cmd, payload: &str) {
    buf.extend_from_slice(cmd.token().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(payload.as_bytes());
    buf.push(DELIMITER);
}

/// Appends a pre-formed blob with no token prefix.
pub fn push_raw(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
    buf.push(DELIMITER);
}

/// Names must be non-empty printable ASCII without whitespace and fit the
/// fixed name buffer.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() < NAME_BUF_SIZE
        && name.bytes().all(|b| (33..=126).contains(&b))
}

/// What one `fill_from` call observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    pub bytes: usize,
    /// The peer closed the stream.
    pub closed: bool,
    /// The buffer hit its cap and was cleared.
    pub overflowed: bool,
}

/// Growable receive buffer that reassembles frames from a byte stream.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: Vec<u8>,
    used: usize,
    cap: usize,
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self::new(RECV_BUF_INITIAL, RECV_BUF_CAP)
    }
}

impl RecvBuffer {
    pub fn new(initial: usize, cap: usize) -> Self {
        Self {
            buf: vec![0; initial.max(1)],
            used: 0,
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.used = 0;
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.buf[..self.used].starts_with(prefix)
    }

    /// Reads everything currently available from `src`.
    ///
    /// Doubles the buffer whenever a read fills it. If doubling would pass
    /// the cap the buffered bytes are dropped and `overflowed` is reported.
    /// `WouldBlock` ends the call without error.
    pub fn fill_from<R: Read>(&mut self, src: &mut R) -> io::Result<FillReport> {
        let mut report = FillReport::default();

        loop {
            match src.read(&mut self.buf[self.used..]) {
                Ok(0) => {
                    report.closed = true;
                    break;
                }
                Ok(n) => {
                    self.used += n;
                    report.bytes += n;

                    if self.used < self.buf.len() {
                        break;
                    }

                    let grown = self.buf.len() * 2;
                    if grown > self.cap {
                        self.used = 0;
                        report.overflowed = true;
                        break;
                    }
                    debug!("receive buffer grown to {} bytes", grown);
                    self.buf.resize(grown, 0);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Splits off every complete frame. A trailing partial frame stays at
    /// the start of the buffer for the next call.
    pub fn drain_frames(&mut self) -> Vec<Result<Frame, ProtocolError>> {
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buf[start..self.used]
            .iter()
            .position(|b| *b == DELIMITER)
        {
            frames.push(parse_frame(&self.buf[start..start + end]));
            start += end + 1;
        }

        if start > 0 {
            self.buf.copy_within(start..self.used, 0);
            self.used -= start;
        }

        frames
    }
}

fn parse_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let text = String::from_utf8_lossy(bytes);
    let (token, payload) = text.split_once(' ').unwrap_or((text.as_ref(), ""));

    match Cmd::from_token(token) {
        Some(cmd) => Ok(Frame {
            cmd,
            payload: payload.to_string(),
        }),
        None => Err(ProtocolError::UnknownCommand(token.to_string())),
    }
}

/// Outbound byte queue, flushed as far as the socket will take it.
#[derive(Debug, Default)]
pub struct OutQueue {
    buf: Vec<u8>,
}

impl OutQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: Cmd, payload: &str) {
        push_msg(&mut self.buf, cmd, payload);
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        push_raw(&mut self.buf, bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes queued bytes until the queue is empty or the socket would
    /// block. Returns how many bytes left the queue.
    pub fn flush_to<W: Write>(&mut self, dst: &mut W) -> io::Result<usize> {
        let mut written = 0;

        while written < self.buf.len() {
            match dst.write(&self.buf[written..]) {
                Ok(0) => {
                    self.buf.drain(..written);
                    return Err(io::Error::new(ErrorKind::WriteZero, "socket accepted no bytes"));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.drain(..written);
                    return Err(e);
                }
            }
        }

        self.buf.drain(..written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio_test::{assert_err, assert_ok};

    /// Hands out its data in fixed-size chunks, then would-block.
    struct Chunked {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for Chunked {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Err(io::Error::new(ErrorKind::WouldBlock, "empty"));
            }
            let n = self.chunk.min(out.len()).min(self.data.len() - self.pos);
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn chunked(data: &[u8], chunk: usize) -> Chunked {
        Chunked {
            data: data.to_vec(),
            pos: 0,
            chunk,
        }
    }

    /// Accepts at most `limit` bytes in total, then would-block.
    struct Throttled {
        out: Vec<u8>,
        limit: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let room = self.limit - self.out.len();
            if room == 0 {
                return Err(io::Error::new(ErrorKind::WouldBlock, "full"));
            }
            let n = room.min(data.len());
            self.out.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_token_tag_mapping_is_one_to_one() {
        for cmd in Cmd::ALL {
            assert_eq!(Cmd::from_tag(cmd.tag()), Some(cmd));
            assert_eq!(Cmd::from_token(cmd.token()), Some(cmd));
        }
        assert_eq!(Cmd::from_tag(0), None);
        assert_eq!(Cmd::from_token("ping"), None);
    }

    #[test]
    fn test_push_msg_layout() {
        let mut buf = Vec::new();
        push_msg(&mut buf, Cmd::SetName, "alice");
        push_msg(&mut buf, Cmd::Ping, "");
        assert_eq!(buf, b"SET_NAME alice\0PING \0");
    }

    #[test]
    fn test_two_frames_then_partial() {
        let mut recv = RecvBuffer::default();
        let mut src = Cursor::new(b"PING \0PONG \0CHA".to_vec());
        let report = assert_ok!(recv.fill_from(&mut src));
        assert_eq!(report.bytes, 15);

        let frames = recv.drain_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().map(|f| f.cmd), Ok(Cmd::Ping));
        assert_eq!(frames[1].as_ref().map(|f| f.cmd), Ok(Cmd::Pong));
        assert_eq!(recv.len(), 3);

        let mut rest = Cursor::new(b"T hi there\0".to_vec());
        assert_ok!(recv.fill_from(&mut rest));
        let frames = recv.drain_frames();
        assert_eq!(
            frames,
            vec![Ok(Frame {
                cmd: Cmd::Chat,
                payload: "hi there".to_string(),
            })]
        );
        assert!(recv.is_empty());
    }

    #[test]
    fn test_unknown_token_is_dropped_alone() {
        let mut recv = RecvBuffer::default();
        assert_ok!(recv.fill_from(&mut Cursor::new(b"BOGUS 1\0NAME_OK \0".to_vec())));

        let frames = recv.drain_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Err(ProtocolError::UnknownCommand("BOGUS".into())));
        assert_eq!(frames[1].as_ref().map(|f| f.cmd), Ok(Cmd::NameOk));
    }

    #[test]
    fn test_token_without_space() {
        let mut recv = RecvBuffer::default();
        assert_ok!(recv.fill_from(&mut Cursor::new(b"ADD_BOT\0".to_vec())));
        let frames = recv.drain_frames();
        assert_eq!(frames[0].as_ref().map(|f| f.cmd), Ok(Cmd::AddBot));
    }

    #[test]
    fn test_buffer_grows_when_read_fills_it() {
        let mut payload = vec![b'a'; 1500];
        payload.push(0);
        let mut recv = RecvBuffer::new(500, RECV_BUF_CAP);
        let mut src = chunked(&payload, usize::MAX);

        let report = assert_ok!(recv.fill_from(&mut src));
        assert_eq!(report.bytes, 1501);
        assert!(!report.overflowed);
        assert_eq!(recv.capacity(), 2000);
        assert_eq!(recv.len(), 1501);
    }

    #[test]
    fn test_buffer_clears_past_cap() {
        let data = vec![b'a'; 20_000];
        let mut recv = RecvBuffer::new(500, RECV_BUF_CAP);
        let mut src = chunked(&data, usize::MAX);

        let report = assert_ok!(recv.fill_from(&mut src));
        assert!(report.overflowed);
        assert!(recv.is_empty());
        assert!(recv.capacity() <= RECV_BUF_CAP);
    }

    #[test]
    fn test_closed_stream_reported() {
        let mut recv = RecvBuffer::default();
        let report = assert_ok!(recv.fill_from(&mut Cursor::new(Vec::new())));
        assert!(report.closed);
    }

    #[test]
    fn test_browser_request_prefix() {
        let mut recv = RecvBuffer::default();
        assert_ok!(recv.fill_from(&mut Cursor::new(b"GET / HTTP/1.1\r\n".to_vec())));
        assert!(recv.starts_with(b"GET"));
    }

    #[test]
    fn test_out_queue_partial_flush_keeps_remainder() {
        let mut queue = OutQueue::new();
        queue.push(Cmd::Chat, "hello");
        let total = queue.len();

        let mut sink = Throttled {
            out: Vec::new(),
            limit: 4,
        };
        let written = assert_ok!(queue.flush_to(&mut sink));
        assert_eq!(written, 4);
        assert_eq!(queue.len(), total - 4);

        sink.limit = 100;
        assert_ok!(queue.flush_to(&mut sink));
        assert!(queue.is_empty());
        assert_eq!(sink.out, b"CHAT hello\0");
    }

    #[test]
    fn test_out_queue_reports_hard_errors() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::ConnectionReset, "reset"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut queue = OutQueue::new();
        queue.push(Cmd::Ping, "");
        assert_err!(queue.flush_to(&mut Broken));
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("alice"));
        assert!(is_valid_name("bot_0"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("two words"));
        assert!(!is_valid_name("tab\tname"));
        assert!(!is_valid_name("ünïcode"));
        assert!(is_valid_name(&"x".repeat(NAME_BUF_SIZE - 1)));
        assert!(!is_valid_name(&"x".repeat(NAME_BUF_SIZE)));
    }
}
