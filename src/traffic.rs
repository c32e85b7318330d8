//! Background traffic generation.
//!
//! Each episode needs traffic on the connection for telemetry to be worth
//! sampling. [`BulkTransfer`] reproduces the file-sender protocol of the
//! measurement setup: connect, announce the payload file name, wait for a
//! short acknowledgement, then stream the file in fixed-size chunks. It
//! runs on its own named thread and owns its socket; the trainer joins
//! the handle at episode end.
//!
//! The generator is behind a trait so the trainer can run against
//! [`NoopTraffic`] in tests.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

/// Spawns one background traffic task per episode.
pub trait TrafficGenerator {
    /// Start the task. The returned handle must be joined before the
    /// next episode starts.
    fn spawn(&self) -> io::Result<TrafficHandle>;
}

/// Join handle for a running traffic task.
#[derive(Debug)]
pub struct TrafficHandle {
    thread: Option<JoinHandle<io::Result<u64>>>,
}

impl TrafficHandle {
    /// Handle that completes immediately (no task spawned).
    pub fn noop() -> Self {
        Self { thread: None }
    }

    /// Block until the task finishes; returns bytes sent.
    pub fn join(mut self) -> io::Result<u64> {
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("traffic thread panicked"))?,
            None => Ok(0),
        }
    }
}

/// Streams a payload file over a fresh TCP connection.
#[derive(Debug, Clone)]
pub struct BulkTransfer {
    /// Server address, `host:port`.
    pub addr: String,
    /// Payload file streamed each episode.
    pub payload: PathBuf,
    /// Chunk size for file reads and socket writes.
    pub chunk_size: usize,
}

impl BulkTransfer {
    /// Create a generator for the given server and payload.
    pub fn new(addr: impl Into<String>, payload: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            addr: addr.into(),
            payload: payload.into(),
            chunk_size,
        }
    }

    fn run(addr: &str, payload: &PathBuf, chunk_size: usize) -> io::Result<u64> {
        let mut stream = TcpStream::connect(addr)?;
        let mut file = File::open(payload)?;

        let name = payload.to_string_lossy();
        stream.write_all(name.as_bytes())?;

        // Short acknowledgement before the payload starts flowing.
        let mut ack = [0u8; 16];
        let n = stream.read(&mut ack)?;
        log::debug!("transfer acknowledged: {}", String::from_utf8_lossy(&ack[..n]));

        let mut chunk = vec![0u8; chunk_size];
        let mut sent = 0u64;
        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            stream.write_all(&chunk[..read])?;
            sent += read as u64;
        }
        Ok(sent)
    }
}

impl TrafficGenerator for BulkTransfer {
    fn spawn(&self) -> io::Result<TrafficHandle> {
        let addr = self.addr.clone();
        let payload = self.payload.clone();
        let chunk_size = self.chunk_size;

        let thread = thread::Builder::new()
            .name("bulk-transfer".into())
            .spawn(move || Self::run(&addr, &payload, chunk_size))?;

        Ok(TrafficHandle {
            thread: Some(thread),
        })
    }
}

/// Generator that produces no traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraffic;

impl TrafficGenerator for NoopTraffic {
    fn spawn(&self) -> io::Result<TrafficHandle> {
        Ok(TrafficHandle::noop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::TcpListener;

    #[test]
    fn noop_handle_joins_immediately() {
        let handle = NoopTraffic.spawn().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }

    #[test]
    fn bulk_transfer_streams_the_payload() {
        let dir = std::env::temp_dir().join("mptcp_tuner_traffic_test");
        std::fs::create_dir_all(&dir).unwrap();
        let payload = dir.join("payload.bin");
        std::fs::write(&payload, vec![0xA5u8; 10_000]).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || -> io::Result<u64> {
            let (mut sock, _) = listener.accept()?;
            // Read the announced file name, acknowledge, then drain.
            let mut name = [0u8; 256];
            let _ = sock.read(&mut name)?;
            sock.write_all(b"ok")?;

            let mut total = 0u64;
            let mut buf = [0u8; 4096];
            loop {
                let n = sock.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                total += n as u64;
            }
            Ok(total)
        });

        let generator = BulkTransfer::new(addr.to_string(), &payload, 1024);
        let sent = generator.spawn().unwrap().join().unwrap();
        assert_eq!(sent, 10_000);

        let received = server.join().unwrap().unwrap();
        assert_eq!(received, 10_000);
        let _ = std::fs::remove_file(&payload);
    }

    #[test]
    fn missing_payload_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and immediately drop the connection.
        let server = thread::spawn(move || {
            let _ = listener.accept();
        });

        let generator = BulkTransfer::new(addr.to_string(), "/does/not/exist", 1024);
        let result = generator.spawn().unwrap().join();
        assert!(result.is_err());
        let _ = server.join();
    }
}
