use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames a byte stream into raw lines.
///
/// Unlike `LinesCodec` the yielded frame keeps its trailing `\n` (and any
/// `\r` before it) and is never checked for UTF-8, so writing a frame back
/// reproduces the input byte for byte. Bytes left over without a newline
/// when the stream ends are dropped.
#[derive(Debug, Default, Clone)]
pub struct LineCodec {
    // how far into the buffer we already searched for '\n'
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self { next_index: 0 }
    }
}

impl Decoder for LineCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, io::Error> {
        let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');
        match newline {
            Some(offset) => {
                let end = self.next_index + offset + 1;
                self.next_index = 0;
                Ok(Some(buf.split_to(end)))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, io::Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // partial line, never echoed
                buf.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: Bytes, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(line.len());
        dst.put(line);
        Ok(())
    }
}

impl Encoder<BytesMut> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: BytesMut, dst: &mut BytesMut) -> Result<(), io::Error> {
        <Self as Encoder<Bytes>>::encode(self, line.freeze(), dst)
    }
}
