//! Framing of the desktop host's frame stream.
//!
//! Every packet is a 12-byte big-endian header followed by one compressed
//! image:
//!
//! ```text
//! +--------+-----------+-------------+------------------+
//! | "VRHP" | frame_id  | payload_len | payload (JPEG)   |
//! | 4 B    | u32 BE    | u32 BE      | payload_len B    |
//! +--------+-----------+-------------+------------------+
//! ```

use std::io::{ErrorKind, Read, Write};

use crate::error::{StereoError, StereoResult};

pub const PACKET_MAGIC: [u8; 4] = *b"VRHP";
pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub frame_id: u32,
    pub payload_len: u32,
}

impl PacketHeader {
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> StereoResult<Self> {
        if bytes[..4] != PACKET_MAGIC {
            return Err(StereoError::Packet(format!(
                "bad magic {:02x?}, expected \"VRHP\"",
                &bytes[..4]
            )));
        }
        let frame_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let payload_len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        Ok(Self {
            frame_id,
            payload_len,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&PACKET_MAGIC);
        out[4..8].copy_from_slice(&self.frame_id.to_be_bytes());
        out[8..12].copy_from_slice(&self.payload_len.to_be_bytes());
        out
    }
}

/// One framed compressed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacket {
    pub frame_id: u32,
    pub payload: Vec<u8>,
}

impl FramePacket {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> StereoResult<()> {
        let payload_len = u32::try_from(self.payload.len()).map_err(|_| {
            StereoError::Packet(format!("payload of {} bytes too large", self.payload.len()))
        })?;
        let header = PacketHeader {
            frame_id: self.frame_id,
            payload_len,
        };
        writer.write_all(&header.encode())?;
        writer.write_all(&self.payload)?;
        Ok(())
    }
}

/// Reads consecutive packets from a byte stream.
pub struct PacketReader<R> {
    inner: R,
    max_payload: u32,
}

impl<R: Read> PacketReader<R> {
    pub fn new(inner: R, max_payload: u32) -> Self {
        Self { inner, max_payload }
    }

    /// Read the next packet. Returns `Ok(None)` on a clean end of stream at a
    /// packet boundary; a stream that ends inside a packet is an error.
    pub fn next_packet(&mut self) -> StereoResult<Option<FramePacket>> {
        let mut header = [0u8; HEADER_LEN];
        let filled = read_fully(&mut self.inner, &mut header)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < HEADER_LEN {
            return Err(StereoError::Packet(format!(
                "stream ended inside a header ({filled} of {HEADER_LEN} bytes)"
            )));
        }

        let header = PacketHeader::parse(&header)?;
        if header.payload_len == 0 {
            return Err(StereoError::Packet(format!(
                "frame {} has an empty payload",
                header.frame_id
            )));
        }
        if header.payload_len > self.max_payload {
            return Err(StereoError::Packet(format!(
                "frame {} payload of {} bytes exceeds limit {}",
                header.frame_id, header.payload_len, self.max_payload
            )));
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        let filled = read_fully(&mut self.inner, &mut payload)?;
        if filled < payload.len() {
            return Err(StereoError::Packet(format!(
                "frame {} truncated: {} of {} payload bytes",
                header.frame_id,
                filled,
                payload.len()
            )));
        }

        Ok(Some(FramePacket {
            frame_id: header.frame_id,
            payload,
        }))
    }
}

impl<R: Read> Iterator for PacketReader<R> {
    type Item = StereoResult<FramePacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

/// Fill `buf` as far as the stream allows; returns how many bytes were read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> StereoResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
