//! Newline-delimited JSON framing over TCP
//!
//! Every message between the coordinator, workers, isolated children and the
//! rendezvous server is one JSON document followed by `\n`.

use crate::error::{HarnessError, HarnessResult};
use rand::RngExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Timeout for connecting to a local listener
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiving half of a connection
pub struct FrameReader {
    inner: BufReader<TcpStream>,
}

impl FrameReader {
    /// Next message; `None` once the peer has closed the connection
    pub fn recv<T: DeserializeOwned>(&mut self) -> HarnessResult<Option<T>> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        serde_json::from_str(&line)
            .map(Some)
            .map_err(|e| HarnessError::protocol(format!("undecodable frame: {}", e)))
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) -> HarnessResult<()> {
        self.inner.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }
}

/// Sending half of a connection
pub struct FrameWriter {
    inner: TcpStream,
}

impl FrameWriter {
    pub fn send<T: Serialize>(&mut self, msg: &T) -> HarnessResult<()> {
        let mut frame =
            serde_json::to_vec(msg).map_err(|e| HarnessError::protocol(format!("unencodable frame: {}", e)))?;
        frame.push(b'\n');
        self.inner.write_all(&frame)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Close both directions; a peer blocked in `recv` sees end of stream
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown(std::net::Shutdown::Both);
    }
}

/// A bidirectional framed connection
pub struct Connection {
    pub reader: FrameReader,
    pub writer: FrameWriter,
}

impl Connection {
    pub fn new(stream: TcpStream) -> HarnessResult<Self> {
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader {
                inner: BufReader::new(stream),
            },
            writer: FrameWriter { inner: writer },
        })
    }

    pub fn connect(address: SocketAddr) -> HarnessResult<Self> {
        let stream = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)?;
        Self::new(stream)
    }

    pub fn send<T: Serialize>(&mut self, msg: &T) -> HarnessResult<()> {
        self.writer.send(msg)
    }

    pub fn recv<T: DeserializeOwned>(&mut self) -> HarnessResult<Option<T>> {
        self.reader.recv()
    }

    pub fn into_parts(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

/// Random shared secret for a listener
pub fn generate_authkey() -> String {
    let mut rng = rand::rng();
    let key: u128 = rng.random();
    format!("{:032x}", key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::net::TcpListener;
    use std::thread;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Msg {
        Ping(u32),
        Text { body: String },
    }

    #[test]
    fn test_frames_cross_a_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = Connection::new(stream).unwrap();
            let first: Msg = conn.recv().unwrap().unwrap();
            conn.send(&first).unwrap();
            let second: Option<Msg> = conn.recv().unwrap();
            second
        });

        let mut client = Connection::connect(address).unwrap();
        client
            .send(&Msg::Text {
                body: "multi\nline".to_string(),
            })
            .unwrap();
        let echoed: Msg = client.recv().unwrap().unwrap();
        assert_eq!(
            echoed,
            Msg::Text {
                body: "multi\nline".to_string()
            }
        );
        client.send(&Msg::Ping(3)).unwrap();
        drop(client);

        assert_eq!(server.join().unwrap(), Some(Msg::Ping(3)));
    }

    #[test]
    fn test_authkeys_differ() {
        let a = generate_authkey();
        let b = generate_authkey();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
