//! Message types exchanged between the master and interop modules.
//!
//! Every message travels in one fixed 1024-byte frame. The tag byte alone
//! decides which payload follows; see [`crate::bridge::codec`] for offsets.

use std::fmt;
use std::str::FromStr;

use fip_signature::{FixedStr, FunctionSignature, SignatureError};

use crate::version::ProtocolVersion;

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 1024;

/// Width of module-name and target-triple fields, terminator included.
pub const SHORT_FIELD_LEN: usize = 16;

/// Width of artifact path fields, terminator included.
pub const PATH_FIELD_LEN: usize = 128;

pub type ModuleName = FixedStr<SHORT_FIELD_LEN>;
pub type TargetField = FixedStr<SHORT_FIELD_LEN>;
pub type ObjectPath = FixedStr<PATH_FIELD_LEN>;

/// Leading byte of every frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    ConnectRequest = 0,
    SymbolRequest = 1,
    SymbolResponse = 2,
    CompileRequest = 3,
    ObjectResponse = 4,
    Kill = 255,
}

impl MessageTag {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::ConnectRequest),
            1 => Some(Self::SymbolRequest),
            2 => Some(Self::SymbolResponse),
            3 => Some(Self::CompileRequest),
            4 => Some(Self::ObjectResponse),
            255 => Some(Self::Kill),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function = 0,
    /// Reserved for data symbols; carries no payload yet.
    Data = 1,
}

impl SymbolKind {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Function),
            1 => Some(Self::Data),
            _ => None,
        }
    }
}

/// A symbol crossing the language boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolDescriptor {
    Function(FunctionSignature),
    Data,
}

impl SymbolDescriptor {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Self::Function(_) => SymbolKind::Function,
            Self::Data => SymbolKind::Data,
        }
    }

    /// Kind byte plus the signature, when there is one.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Function(signature) => 1 + signature.encoded_len(),
            Self::Data => 1,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionSignature> {
        match self {
            Self::Function(signature) => Some(signature),
            Self::Data => None,
        }
    }
}

impl From<FunctionSignature> for SymbolDescriptor {
    fn from(signature: FunctionSignature) -> Self {
        Self::Function(signature)
    }
}

impl fmt::Display for SymbolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(signature) => write!(f, "{signature}"),
            Self::Data => f.write_str("<data>"),
        }
    }
}

/// Compilation target, one short field per triple component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileTarget {
    pub arch: TargetField,
    pub sub: TargetField,
    pub vendor: TargetField,
    pub sys: TargetField,
    pub abi: TargetField,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target '{0}' must have five '-'-separated parts: arch-sub-vendor-sys-abi")]
    Parts(String),
    #[error("invalid target component: {0}")]
    Field(#[from] SignatureError),
}

impl CompileTarget {
    pub fn new(
        arch: &str,
        sub: &str,
        vendor: &str,
        sys: &str,
        abi: &str,
    ) -> Result<Self, SignatureError> {
        Ok(Self {
            arch: TargetField::new(arch)?,
            sub: TargetField::new(sub)?,
            vendor: TargetField::new(vendor)?,
            sys: TargetField::new(sys)?,
            abi: TargetField::new(abi)?,
        })
    }

    pub fn fields(&self) -> [&TargetField; 5] {
        [&self.arch, &self.sub, &self.vendor, &self.sys, &self.abi]
    }
}

impl FromStr for CompileTarget {
    type Err = TargetError;

    /// Parses `arch-sub-vendor-sys-abi`; components may be empty
    /// (`x86_64--pc-linux-gnu`).
    fn from_str(s: &str) -> Result<Self, TargetError> {
        let parts: Vec<&str> = s.split('-').collect();
        let [arch, sub, vendor, sys, abi] = parts.as_slice() else {
            return Err(TargetError::Parts(s.to_string()));
        };
        Ok(Self::new(arch, sub, vendor, sys, abi)?)
    }
}

impl fmt::Display for CompileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.arch, self.sub, self.vendor, self.sys, self.abi
        )
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Finish = 0,
    VersionMismatch = 1,
}

impl KillReason {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Finish),
            1 => Some(Self::VersionMismatch),
            _ => None,
        }
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Module to master, first frame after connecting.
    ConnectRequest { version: ProtocolVersion },

    /// Master asks every module to resolve a symbol.
    SymbolRequest { symbol: SymbolDescriptor },

    SymbolResponse {
        found: bool,
        module_name: ModuleName,
        symbol: SymbolDescriptor,
    },

    CompileRequest { target: CompileTarget },

    /// Location of an artifact a module produced.
    ObjectResponse {
        module_name: ModuleName,
        path: ObjectPath,
    },

    Kill { reason: KillReason },
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::ConnectRequest { .. } => MessageTag::ConnectRequest,
            Self::SymbolRequest { .. } => MessageTag::SymbolRequest,
            Self::SymbolResponse { .. } => MessageTag::SymbolResponse,
            Self::CompileRequest { .. } => MessageTag::CompileRequest,
            Self::ObjectResponse { .. } => MessageTag::ObjectResponse,
            Self::Kill { .. } => MessageTag::Kill,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectRequest { .. } => "connect_request",
            Self::SymbolRequest { .. } => "symbol_request",
            Self::SymbolResponse { .. } => "symbol_response",
            Self::CompileRequest { .. } => "compile_request",
            Self::ObjectResponse { .. } => "object_response",
            Self::Kill { .. } => "kill",
        }
    }

    /// Number of meaningful bytes in the encoded frame, tag included.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Self::ConnectRequest { .. } => 3,
            Self::SymbolRequest { symbol } => symbol.encoded_len(),
            Self::SymbolResponse { symbol, .. } => 1 + SHORT_FIELD_LEN + symbol.encoded_len(),
            Self::CompileRequest { .. } => 5 * SHORT_FIELD_LEN,
            Self::ObjectResponse { .. } => SHORT_FIELD_LEN + PATH_FIELD_LEN,
            Self::Kill { .. } => 1,
        }
    }

    pub fn symbol_request(signature: FunctionSignature) -> Self {
        Self::SymbolRequest {
            symbol: SymbolDescriptor::Function(signature),
        }
    }

    pub fn kill(reason: KillReason) -> Self {
        Self::Kill { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fip_signature::parse_function_signature;

    #[test]
    fn tags_round_trip_through_u8() {
        for tag in [
            MessageTag::ConnectRequest,
            MessageTag::SymbolRequest,
            MessageTag::SymbolResponse,
            MessageTag::CompileRequest,
            MessageTag::ObjectResponse,
            MessageTag::Kill,
        ] {
            assert_eq!(MessageTag::from_u8(tag as u8), Some(tag));
        }
        assert_eq!(MessageTag::from_u8(5), None);
        assert_eq!(MessageTag::from_u8(254), None);
    }

    #[test]
    fn encoded_len_matches_layout() {
        let sig = parse_function_signature("foo(u8,u16)->i32").unwrap();
        let symbol = SymbolDescriptor::Function(sig);
        // tag + kind + name + argc + 2 args + retc + 1 ret
        assert_eq!(
            Message::SymbolRequest {
                symbol: symbol.clone()
            }
            .encoded_len(),
            1 + 1 + 128 + 1 + 4 + 1 + 2
        );
        assert_eq!(
            Message::SymbolResponse {
                found: true,
                module_name: ModuleName::new("c").unwrap(),
                symbol,
            }
            .encoded_len(),
            1 + 1 + 16 + 1 + 128 + 1 + 4 + 1 + 2
        );
        assert_eq!(Message::kill(KillReason::Finish).encoded_len(), 2);
        assert_eq!(
            Message::ConnectRequest {
                version: ProtocolVersion::new(1, 0, 0)
            }
            .encoded_len(),
            4
        );
        assert_eq!(
            Message::CompileRequest {
                target: CompileTarget::default()
            }
            .encoded_len(),
            81
        );
    }

    #[test]
    fn target_parses_five_parts() {
        let target: CompileTarget = "x86_64--pc-linux-gnu".parse().unwrap();
        assert_eq!(target.arch.as_str(), "x86_64");
        assert!(target.sub.is_empty());
        assert_eq!(target.vendor.as_str(), "pc");
        assert_eq!(target.sys.as_str(), "linux");
        assert_eq!(target.abi.as_str(), "gnu");
        assert_eq!(target.to_string(), "x86_64--pc-linux-gnu");
    }

    #[test]
    fn target_rejects_wrong_shape_and_long_fields() {
        assert!(matches!(
            "x86_64-linux-gnu".parse::<CompileTarget>(),
            Err(TargetError::Parts(_))
        ));
        assert!(matches!(
            "averyveryverylongarch----".parse::<CompileTarget>(),
            Err(TargetError::Field(SignatureError::StringTooLong { .. }))
        ));
    }
}
