//! Acquired media transport.

use crate::errors::BluezError;
use log::debug;
use std::fs::File;
use std::io::Write;
use std::os::fd::OwnedFd;

/// An exclusively held streaming endpoint: the descriptor handed out by the stack plus
/// the MTUs negotiated for each direction.
#[derive(Debug)]
pub struct TransportHandle {
    path: String,
    stream: File,
    read_mtu: u16,
    write_mtu: u16,
}

impl TransportHandle {
    pub fn new(path: impl Into<String>, fd: OwnedFd, read_mtu: u16, write_mtu: u16) -> Self {
        Self {
            path: path.into(),
            stream: File::from(fd),
            read_mtu,
            write_mtu,
        }
    }

    /// Object path of the transport this handle was acquired from.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn read_mtu(&self) -> u16 {
        self.read_mtu
    }

    pub fn write_mtu(&self) -> u16 {
        self.write_mtu
    }

    /// Writes one chunk and returns the number of bytes the OS accepted.
    ///
    /// A chunk larger than the write MTU is rejected before anything is written.
    pub fn write(&mut self, chunk: &[u8]) -> Result<usize, BluezError> {
        if chunk.len() > usize::from(self.write_mtu) {
            return Err(BluezError::ChunkTooLarge {
                len: chunk.len(),
                mtu: self.write_mtu,
            });
        }
        self.stream
            .write(chunk)
            .map_err(|e| BluezError::TransportWriteFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Splits `data` into write-MTU sized chunks and writes each completely.
    pub fn write_all_chunked(&mut self, data: &[u8]) -> Result<usize, BluezError> {
        let mtu = usize::from(self.write_mtu).max(1);
        for chunk in data.chunks(mtu) {
            let mut written = 0;
            while written < chunk.len() {
                match self.write(&chunk[written..])? {
                    0 => {
                        return Err(BluezError::TransportWriteFailed {
                            path: self.path.clone(),
                            reason: "transport closed".to_string(),
                        })
                    }
                    n => written += n,
                }
            }
        }
        debug!("wrote {} bytes to {}", data.len(), self.path);
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    const PATH: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55/sep1/fd0";

    fn handle(write_mtu: u16) -> (TransportHandle, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        (TransportHandle::new(PATH, OwnedFd::from(local), 672, write_mtu), remote)
    }

    #[test]
    fn test_write_within_mtu() {
        let (mut transport, mut remote) = handle(8);
        assert_eq!(transport.write(b"abcdefgh").unwrap(), 8);
        let mut buf = [0u8; 8];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn test_oversized_chunk_writes_nothing() {
        let (mut transport, mut remote) = handle(4);
        let result = transport.write(b"abcde");
        assert!(matches!(result, Err(BluezError::ChunkTooLarge { len: 5, mtu: 4 })));

        remote.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 8];
        let read = remote.read(&mut buf);
        assert!(matches!(read, Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock));
    }

    #[test]
    fn test_write_all_chunked() {
        let (mut transport, mut remote) = handle(3);
        assert_eq!(transport.write_all_chunked(b"0123456").unwrap(), 7);
        let mut buf = [0u8; 7];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123456");
    }

    #[test]
    fn test_mtus() {
        let (transport, _remote) = handle(895);
        assert_eq!(transport.read_mtu(), 672);
        assert_eq!(transport.write_mtu(), 895);
        assert_eq!(transport.path(), PATH);
    }
}
