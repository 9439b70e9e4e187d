//! The pausable, encrypting, (de)compressing duplex a session's two pump
//! threads read and write packets through.
//!
//! Grounded on tetsu's netty-free blocking-I/O model, generalized from
//! `Connection`'s single-direction read/write pair into something that can be
//! split into independent read/write halves: a proxy session owns two TCP
//! sockets (client-facing, server-facing) and pumps each direction on its own
//! thread, so the halves need to travel to different threads without sharing
//! a lock on every packet.

use std::io::{self, prelude::*};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Condvar, Mutex};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::crypto::DefaultStreamCipher;
use crate::errors::*;
use crate::serialization::{Readable, Writable};
use crate::versions::common::VarInt;

struct PauseGate {
    state: Mutex<(bool, bool)>, // (paused, discard)
    cv: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            state: Mutex::new((false, false)),
            cv: Condvar::new(),
        }
    }

    fn pause(&self, discard: bool) {
        let mut state = self.state.lock().unwrap();
        *state = (true, discard);
        self.cv.notify_all();
    }

    fn unpause(&self) {
        let mut state = self.state.lock().unwrap();
        *state = (false, false);
        self.cv.notify_all();
    }

    /// Blocks while paused-and-buffering; returns `true` if the caller
    /// should silently drop the packet it just read instead of delivering it.
    fn gate(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            match *state {
                (false, _) => return false,
                (true, true) => return true,
                (true, false) => state = self.cv.wait(state).unwrap(),
            }
        }
    }
}

/// A handle spectator-join logic uses to freeze/thaw a session's inbound
/// pump without tearing the socket down.
#[derive(Clone)]
pub struct PauseHandle(Arc<PauseGate>);

impl PauseHandle {
    /// Stops packets from being delivered to the pump's caller. When
    /// `discard` is set the socket keeps draining in the background instead
    /// of backing up; when unset, reads block until [`unpause`] is called.
    pub fn pause(&self, discard: bool) {
        self.0.pause(discard);
    }

    pub fn unpause(&self) {
        self.0.unpause();
    }
}

fn decrypt(cipher: &mut Option<DefaultStreamCipher<16>>, data: &mut [u8]) {
    if let Some(c) = cipher {
        c.decrypt(data);
    }
}

fn encrypt(cipher: &mut Option<DefaultStreamCipher<16>>, data: &mut [u8]) {
    if let Some(c) = cipher {
        c.encrypt(data);
    }
}

struct CipherReader<'a> {
    socket: &'a mut TcpStream,
    cipher: &'a mut Option<DefaultStreamCipher<16>>,
}

impl<'a> Read for CipherReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.socket.read(buf)?;
        decrypt(self.cipher, &mut buf[..n]);
        Ok(n)
    }
}

fn compress_threshold_ok(threshold: i32, len: usize) -> bool {
    threshold >= 0 && (len as i32) >= threshold
}

fn read_framed(
    socket: &mut TcpStream,
    cipher: &mut Option<DefaultStreamCipher<16>>,
    compression_threshold: i32,
) -> TetsuResult<Vec<u8>> {
    let mut reader = CipherReader { socket, cipher };
    let len = VarInt::read_from(&mut reader)?.0.max(0) as usize;
    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw)?;

    if compression_threshold < 0 {
        return Ok(raw);
    }

    let mut cursor = io::Cursor::new(&raw);
    let data_length = VarInt::read_from(&mut cursor)?.0;
    let rest = &raw[cursor.position() as usize..];

    if data_length == 0 {
        Ok(rest.to_vec())
    } else {
        let mut out = Vec::with_capacity(data_length as usize);
        ZlibDecoder::new(rest).read_to_end(&mut out)?;
        Ok(out)
    }
}

fn write_framed(
    socket: &mut TcpStream,
    cipher: &mut Option<DefaultStreamCipher<16>>,
    compression_threshold: i32,
    body: &[u8],
) -> TetsuResult<()> {
    let mut frame = Vec::new();

    if compression_threshold >= 0 {
        if compress_threshold_ok(compression_threshold, body.len()) {
            let mut compressed = Vec::new();
            {
                let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
                encoder.write_all(body)?;
                encoder.finish()?;
            }
            VarInt(body.len() as i32).write_to(&mut frame)?;
            frame.extend_from_slice(&compressed);
        } else {
            VarInt(0).write_to(&mut frame)?;
            frame.extend_from_slice(body);
        }
    } else {
        frame.extend_from_slice(body);
    }

    let mut out = Vec::new();
    VarInt(frame.len() as i32).write_to(&mut out)?;
    out.extend_from_slice(&frame);
    encrypt(cipher, &mut out);
    socket.write_all(&out)?;
    Ok(())
}

/// One TCP leg of a session (either client-facing or server-facing), before
/// it's split across the two pump threads. Login/handshake logic drives this
/// directly; once state reaches Play, [`Stream::split`] hands the halves off.
pub struct Stream {
    socket: TcpStream,
    compression_threshold: i32,
    encryptor: Option<DefaultStreamCipher<16>>,
    decryptor: Option<DefaultStreamCipher<16>>,
    pause: Arc<PauseGate>,
}

impl Stream {
    pub fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            compression_threshold: -1,
            encryptor: None,
            decryptor: None,
            pause: Arc::new(PauseGate::new()),
        }
    }

    /// Installs the AES-128/CFB8 shared-secret cipher. Called once, right
    /// after the encryption-response/shared-secret exchange completes.
    pub fn enable_encryption(&mut self, key: &[u8; 16]) -> TetsuResult<()> {
        self.encryptor = Some(DefaultStreamCipher::new(key)?);
        self.decryptor = Some(DefaultStreamCipher::new(key)?);
        Ok(())
    }

    /// Sets the compression threshold negotiated by `SetCompression`. A
    /// negative threshold disables compression.
    pub fn set_compression(&mut self, threshold: i32) {
        self.compression_threshold = threshold;
    }

    pub fn read_packet(&mut self) -> TetsuResult<Vec<u8>> {
        read_framed(
            &mut self.socket,
            &mut self.decryptor,
            self.compression_threshold,
        )
    }

    pub fn write_packet(&mut self, body: &[u8]) -> TetsuResult<()> {
        write_framed(
            &mut self.socket,
            &mut self.encryptor,
            self.compression_threshold,
            body,
        )
    }

    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle(self.pause.clone())
    }

    pub fn shutdown(&self) -> TetsuResult<()> {
        Ok(self.socket.shutdown(Shutdown::Both)?)
    }

    /// Splits the stream into independent halves so the two pump threads
    /// each own only the direction they need. Both halves share the same
    /// underlying socket via [`TcpStream::try_clone`] and the same pause
    /// gate, since a spectator-join freeze only ever applies to reads.
    pub fn split(self) -> TetsuResult<(ReadHalf, WriteHalf)> {
        let read_socket = self.socket.try_clone()?;
        let write_socket = self.socket;
        Ok((
            ReadHalf {
                socket: read_socket,
                decryptor: self.decryptor,
                compression_threshold: self.compression_threshold,
                pause: self.pause,
            },
            WriteHalf {
                socket: write_socket,
                encryptor: self.encryptor,
                compression_threshold: self.compression_threshold,
            },
        ))
    }
}

/// The read-only half of a split [`Stream`].
pub struct ReadHalf {
    socket: TcpStream,
    decryptor: Option<DefaultStreamCipher<16>>,
    compression_threshold: i32,
    pause: Arc<PauseGate>,
}

impl ReadHalf {
    /// Reads the next packet, blocking across a pause/unpause cycle and
    /// silently dropping packets read while paused-with-discard (the state a
    /// spectator's client sits in mid join-ritual so its keepalives don't
    /// pile up on the socket).
    pub fn read_packet(&mut self) -> TetsuResult<Vec<u8>> {
        loop {
            let packet = read_framed(
                &mut self.socket,
                &mut self.decryptor,
                self.compression_threshold,
            )?;
            if !self.pause.gate() {
                return Ok(packet);
            }
        }
    }

    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle(self.pause.clone())
    }

    pub fn shutdown(&self) -> TetsuResult<()> {
        Ok(self.socket.shutdown(Shutdown::Both)?)
    }
}

/// The write-only half of a split [`Stream`]. Cloneable so a broadcast
/// fan-out (one owner session, many spectators) can hold a writer per peer
/// without sharing a lock on the hot path.
pub struct WriteHalf {
    socket: TcpStream,
    encryptor: Option<DefaultStreamCipher<16>>,
    compression_threshold: i32,
}

impl WriteHalf {
    pub fn write_packet(&mut self, body: &[u8]) -> TetsuResult<()> {
        write_framed(
            &mut self.socket,
            &mut self.encryptor,
            self.compression_threshold,
            body,
        )
    }

    pub fn shutdown(&self) -> TetsuResult<()> {
        Ok(self.socket.shutdown(Shutdown::Both)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (client.join().unwrap(), server)
    }

    #[test]
    fn round_trips_uncompressed_unencrypted() {
        let (a, b) = pair();
        let mut client = Stream::new(a);
        let mut server = Stream::new(b);

        client.write_packet(&[0x00, 1, 2, 3]).unwrap();
        let got = server.read_packet().unwrap();
        assert_eq!(got, vec![0x00, 1, 2, 3]);
    }

    #[test]
    fn round_trips_with_compression_below_threshold() {
        let (a, b) = pair();
        let mut client = Stream::new(a);
        let mut server = Stream::new(b);
        client.set_compression(256);
        server.set_compression(256);

        client.write_packet(&[0x00, 1, 2, 3]).unwrap();
        let got = server.read_packet().unwrap();
        assert_eq!(got, vec![0x00, 1, 2, 3]);
    }

    #[test]
    fn round_trips_with_compression_above_threshold() {
        let (a, b) = pair();
        let mut client = Stream::new(a);
        let mut server = Stream::new(b);
        client.set_compression(8);
        server.set_compression(8);

        let body: Vec<u8> = (0..64u16).map(|v| v as u8).collect();
        client.write_packet(&body).unwrap();
        let got = server.read_packet().unwrap();
        assert_eq!(got, body);
    }

    #[test]
    fn round_trips_with_encryption() {
        let (a, b) = pair();
        let mut client = Stream::new(a);
        let mut server = Stream::new(b);
        let key = [7u8; 16];
        client.enable_encryption(&key).unwrap();
        server.enable_encryption(&key).unwrap();

        client.write_packet(&[0x01, 9, 9]).unwrap();
        let got = server.read_packet().unwrap();
        assert_eq!(got, vec![0x01, 9, 9]);
    }

    #[test]
    fn paused_with_discard_drops_packets_until_unpaused() {
        let (a, b) = pair();
        let mut client = Stream::new(a);
        let server = Stream::new(b);
        let (mut read_half, _write_half) = server.split().unwrap();
        let pause = read_half.pause_handle();

        pause.pause(true);
        client.write_packet(&[0xFF]).unwrap();
        client.write_packet(&[0x01, 2]).unwrap();

        // give the writer a moment to land both packets before unpausing
        thread::sleep(std::time::Duration::from_millis(50));
        pause.unpause();

        let got = read_half.read_packet().unwrap();
        assert_eq!(got, vec![0x01, 2]);
    }
}
