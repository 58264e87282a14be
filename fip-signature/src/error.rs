use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("missing parameter list in signature '{0}'")]
    MissingParameterList(String),

    #[error("unmatched parenthesis at byte {position}")]
    UnmatchedParen { position: usize },

    #[error("nested parenthesis at byte {position}")]
    NestedParen { position: usize },

    #[error("signature has no name")]
    MissingName,

    #[error("name is {len} bytes, at most {max} allowed")]
    NameTooLong { len: usize, max: usize },

    #[error("unexpected input after parameter list: '{0}'")]
    TrailingInput(String),

    #[error("signature list is full ({max} entries)")]
    TooManyEntries { max: usize },

    #[error("string of {len} bytes does not fit a field holding {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("string contains an interior NUL byte")]
    InteriorNul,

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, SignatureError>;
