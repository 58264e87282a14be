//! Fixed-frame binary codec.
//!
//! Layout (offsets from frame start, strings NUL-padded):
//!
//! | Tag                 | Payload                                                     |
//! |---------------------|-------------------------------------------------------------|
//! | ConnectRequest (0)  | major@1 minor@2 patch@3                                     |
//! | SymbolRequest (1)   | kind@1, signature@2 (if Function)                           |
//! | SymbolResponse (2)  | found@1 module@2[16] kind@18, signature@19 (if Function)    |
//! | CompileRequest (3)  | arch@1[16] sub@17[16] vendor@33[16] sys@49[16] abi@65[16]   |
//! | ObjectResponse (4)  | module@1[16] path@17[128]                                   |
//! | Kill (255)          | reason@1                                                    |
//!
//! A signature is `name[128] argc args[2*argc] retc rets[2*retc]`, each entry
//! being `mutable type`.
//!
//! [`FrameCodec`] handles framing over byte streams: it hands out whole
//! 1024-byte frames and encodes messages into them.

use std::io;

use fip_signature::{FixedStr, FunctionSignature, PrimitiveType, SignatureError, SignatureList};
use fip_signature::{NAME_FIELD_LEN, TypeSignature};
use thiserror::Error;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::*;
use crate::version::ProtocolVersion;

pub type Frame = [u8; FRAME_SIZE];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("message needs {required} bytes but a frame holds {capacity}")]
    FrameOverflow { required: usize, capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is {len} bytes, expected 1024")]
    ShortFrame { len: usize },

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("unknown symbol kind {0}")]
    UnknownSymbolKind(u8),

    #[error("unknown primitive type {0}")]
    UnknownType(u8),

    #[error("unknown kill reason {0}")]
    UnknownKillReason(u8),

    #[error("payload runs past the frame end at offset {offset}")]
    Truncated { offset: usize },

    #[error("bad string field: {0}")]
    Field(#[from] SignatureError),
}

/// Errors from framed transport.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `message` into a fresh zero-filled frame.
///
/// Messages that would not fit are rejected up front; nothing is truncated.
pub fn encode(message: &Message) -> Result<Frame, EncodeError> {
    let mut frame = [0u8; FRAME_SIZE];
    encode_into(message, &mut frame)?;
    Ok(frame)
}

/// Encode into an existing frame, zero-filling it first.
pub fn encode_into(message: &Message, frame: &mut Frame) -> Result<(), EncodeError> {
    let required = message.encoded_len();
    if required > FRAME_SIZE {
        return Err(EncodeError::FrameOverflow {
            required,
            capacity: FRAME_SIZE,
        });
    }

    frame.fill(0);
    let mut w = FrameWriter { buf: frame, pos: 0 };
    w.put_u8(message.tag() as u8);

    match message {
        Message::ConnectRequest { version } => {
            w.put_u8(version.major);
            w.put_u8(version.minor);
            w.put_u8(version.patch);
        }
        Message::SymbolRequest { symbol } => {
            w.put_symbol(symbol);
        }
        Message::SymbolResponse {
            found,
            module_name,
            symbol,
        } => {
            w.put_u8(u8::from(*found));
            w.put_field(module_name);
            w.put_symbol(symbol);
        }
        Message::CompileRequest { target } => {
            for field in target.fields() {
                w.put_field(field);
            }
        }
        Message::ObjectResponse { module_name, path } => {
            w.put_field(module_name);
            w.put_field(path);
        }
        Message::Kill { reason } => {
            w.put_u8(*reason as u8);
        }
    }

    debug_assert_eq!(w.pos, required);
    Ok(())
}

struct FrameWriter<'a> {
    buf: &'a mut Frame,
    pos: usize,
}

impl FrameWriter<'_> {
    // Callers check encoded_len() first, so writes stay inside the frame.
    fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_field<const N: usize>(&mut self, field: &FixedStr<N>) {
        self.put_bytes(field.padded());
    }

    fn put_list(&mut self, list: &SignatureList) {
        self.put_u8(list.count());
        for entry in list {
            self.put_u8(u8::from(entry.mutable));
            self.put_u8(entry.ty.as_u8());
        }
    }

    fn put_symbol(&mut self, symbol: &SymbolDescriptor) {
        self.put_u8(symbol.kind() as u8);
        if let SymbolDescriptor::Function(signature) = symbol {
            self.put_field(&signature.name);
            self.put_list(&signature.arguments);
            self.put_list(&signature.returns);
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one frame.
pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
    if frame.len() < FRAME_SIZE {
        return Err(DecodeError::ShortFrame { len: frame.len() });
    }
    let mut r = FrameReader {
        buf: &frame[..FRAME_SIZE],
        pos: 0,
    };

    let tag = r.get_u8()?;
    let message = match MessageTag::from_u8(tag).ok_or(DecodeError::UnknownTag(tag))? {
        MessageTag::ConnectRequest => Message::ConnectRequest {
            version: ProtocolVersion::new(r.get_u8()?, r.get_u8()?, r.get_u8()?),
        },
        MessageTag::SymbolRequest => Message::SymbolRequest {
            symbol: r.get_symbol()?,
        },
        MessageTag::SymbolResponse => Message::SymbolResponse {
            found: r.get_u8()? != 0,
            module_name: r.get_field()?,
            symbol: r.get_symbol()?,
        },
        MessageTag::CompileRequest => Message::CompileRequest {
            target: CompileTarget {
                arch: r.get_field()?,
                sub: r.get_field()?,
                vendor: r.get_field()?,
                sys: r.get_field()?,
                abi: r.get_field()?,
            },
        },
        MessageTag::ObjectResponse => Message::ObjectResponse {
            module_name: r.get_field()?,
            path: r.get_field()?,
        },
        MessageTag::Kill => {
            let reason = r.get_u8()?;
            Message::Kill {
                reason: KillReason::from_u8(reason)
                    .ok_or(DecodeError::UnknownKillReason(reason))?,
            }
        }
    };

    Ok(message)
}

struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl FrameReader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], DecodeError> {
        let end = self.pos + len;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        self.pos = end;
        Ok(bytes)
    }

    fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn get_field<const N: usize>(&mut self) -> Result<FixedStr<N>, DecodeError> {
        Ok(FixedStr::from_field(self.take(N)?)?)
    }

    fn get_list(&mut self) -> Result<SignatureList, DecodeError> {
        let count = self.get_u8()? as usize;
        let mut list = SignatureList::with_capacity(count);
        for _ in 0..count {
            let mutable = self.get_u8()? != 0;
            let ty = self.get_u8()?;
            let ty = PrimitiveType::from_u8(ty).ok_or(DecodeError::UnknownType(ty))?;
            // count fits in u8, so the list cannot overflow
            list.push(TypeSignature { mutable, ty })?;
        }
        Ok(list)
    }

    fn get_symbol(&mut self) -> Result<SymbolDescriptor, DecodeError> {
        let kind = self.get_u8()?;
        match SymbolKind::from_u8(kind).ok_or(DecodeError::UnknownSymbolKind(kind))? {
            SymbolKind::Function => Ok(SymbolDescriptor::Function(FunctionSignature {
                name: self.get_field::<NAME_FIELD_LEN>()?,
                arguments: self.get_list()?,
                returns: self.get_list()?,
            })),
            SymbolKind::Data => Ok(SymbolDescriptor::Data),
        }
    }
}

// ---------------------------------------------------------------------------
// Stream framing
// ---------------------------------------------------------------------------

/// Splits a byte stream into whole frames and writes messages as frames.
///
/// Decoding yields raw frames so a malformed payload never desynchronises
/// the stream; callers pass them to [`decode`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_SIZE {
            src.reserve(FRAME_SIZE - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(FRAME_SIZE).freeze()))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = encode(&item)?;
        tracing::trace!(message = item.name(), "Encoding frame");
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
