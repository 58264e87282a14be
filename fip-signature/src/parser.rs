//! Textual function-signature parser.
//!
//! Grammar:
//!
//! ```text
//! signature := name "(" [type ("," type)*] ")" ["->" [type ("," type)*]]
//! type      := u8 | u16 | u32 | u64 | i8 | i16 | i32 | i64 | f32 | f64 | bool | str
//! ```
//!
//! Spaces and tabs around names and type tokens are ignored. Parameter lists
//! do not nest. The first error aborts the parse.

use std::ops::Range;
use std::str::FromStr;

use crate::error::{Result, SignatureError};
use crate::types::*;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse the type token found in `source[range]`.
///
/// Surrounding spaces and tabs are trimmed, then the token must match one of
/// the canonical type names exactly. The result is never mutable.
pub fn parse_type_token(source: &str, range: Range<usize>) -> Result<TypeSignature> {
    let bytes = source.as_bytes();
    let token = bytes
        .get(range)
        .ok_or_else(|| SignatureError::UnknownType(String::new()))?;
    let token = trim_blanks(token);

    PrimitiveType::from_name(token)
        .map(TypeSignature::new)
        .ok_or_else(|| SignatureError::UnknownType(String::from_utf8_lossy(token).into_owned()))
}

/// Parse a full `name(args)->returns` signature.
pub fn parse_function_signature(text: &str) -> Result<FunctionSignature> {
    let bytes = text.as_bytes();

    let open = match find_paren(bytes, 0..bytes.len()) {
        Some(i) if bytes[i] == b'(' => i,
        Some(i) => return Err(SignatureError::UnmatchedParen { position: i }),
        None => return Err(SignatureError::MissingParameterList(text.to_string())),
    };
    let close = match find_paren(bytes, open + 1..bytes.len()) {
        Some(i) if bytes[i] == b')' => i,
        Some(i) => return Err(SignatureError::NestedParen { position: i }),
        None => return Err(SignatureError::UnmatchedParen { position: open }),
    };

    let name = parse_name(text, 0..open)?;
    let arguments = parse_type_list(text, open + 1..close)?;

    let tail = trim_range(bytes, close + 1..bytes.len());
    let returns = if tail.is_empty() {
        SignatureList::new()
    } else if bytes[tail.clone()].starts_with(b"->") {
        let list = tail.start + 2..tail.end;
        if let Some(position) = find_paren(bytes, list.clone()) {
            return Err(SignatureError::UnmatchedParen { position });
        }
        parse_type_list(text, list)?
    } else {
        return Err(SignatureError::TrailingInput(text[tail].to_string()));
    };

    Ok(FunctionSignature {
        name,
        arguments,
        returns,
    })
}

impl FromStr for FunctionSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self> {
        parse_function_signature(s)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_blank(b: &u8) -> bool {
    matches!(b, b' ' | b'\t')
}

fn trim_blanks(token: &[u8]) -> &[u8] {
    let start = token.iter().position(|b| !is_blank(b)).unwrap_or(token.len());
    let end = token.iter().rposition(|b| !is_blank(b)).map_or(start, |i| i + 1);
    &token[start..end]
}

fn trim_range(bytes: &[u8], range: Range<usize>) -> Range<usize> {
    let mut start = range.start;
    let mut end = range.end;
    while start < end && is_blank(&bytes[start]) {
        start += 1;
    }
    while end > start && is_blank(&bytes[end - 1]) {
        end -= 1;
    }
    start..end
}

fn find_paren(bytes: &[u8], range: Range<usize>) -> Option<usize> {
    let start = range.start;
    bytes[range]
        .iter()
        .position(|&b| b == b'(' || b == b')')
        .map(|i| start + i)
}

fn parse_name(text: &str, range: Range<usize>) -> Result<SymbolName> {
    let range = trim_range(text.as_bytes(), range);
    if range.is_empty() {
        return Err(SignatureError::MissingName);
    }
    SymbolName::new(&text[range]).map_err(|err| match err {
        SignatureError::StringTooLong { len, max } => SignatureError::NameTooLong { len, max },
        other => other,
    })
}

/// Split `text[range]` on commas and parse each piece left to right.
/// A blank range is an empty list.
fn parse_type_list(text: &str, range: Range<usize>) -> Result<SignatureList> {
    let bytes = text.as_bytes();
    let mut list = SignatureList::new();
    if trim_range(bytes, range.clone()).is_empty() {
        return Ok(list);
    }

    let mut start = range.start;
    for i in range.clone() {
        if bytes[i] == b',' {
            list.push(parse_type_token(text, start..i)?)?;
            start = i + 1;
        }
    }
    list.push(parse_type_token(text, start..range.end)?)?;

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ty: PrimitiveType) -> TypeSignature {
        TypeSignature::new(ty)
    }

    #[test]
    fn type_token_accepts_every_canonical_name() {
        for ty in PrimitiveType::ALL {
            let src = format!(" \t{}\t ", ty.name());
            let parsed = parse_type_token(&src, 0..src.len()).unwrap();
            assert_eq!(parsed, ts(ty));
            assert!(!parsed.mutable);
        }
    }

    #[test]
    fn type_token_is_case_sensitive_without_aliases() {
        for bad in ["I32", "U8", "Bool", "string", "int", "float", "double", "", "u 8"] {
            let err = parse_type_token(bad, 0..bad.len()).unwrap_err();
            assert_eq!(err, SignatureError::UnknownType(bad.trim().to_string()));
        }
    }

    #[test]
    fn type_token_only_reads_its_range() {
        let src = "u8,f64";
        assert_eq!(parse_type_token(src, 3..6).unwrap(), ts(PrimitiveType::F64));
        assert!(parse_type_token(src, 0..6).is_err());
    }

    #[test]
    fn parses_no_args_single_return() {
        let sig = parse_function_signature("foo()->i32").unwrap();
        assert_eq!(sig.name.as_str(), "foo");
        assert!(sig.arguments.is_empty());
        assert_eq!(sig.returns.as_slice(), &[ts(PrimitiveType::I32)]);
    }

    #[test]
    fn parses_args_without_returns() {
        let sig = parse_function_signature("bar(u64,f32)").unwrap();
        assert_eq!(sig.name.as_str(), "bar");
        assert_eq!(
            sig.arguments.as_slice(),
            &[ts(PrimitiveType::U64), ts(PrimitiveType::F32)]
        );
        assert!(sig.returns.is_empty());
    }

    #[test]
    fn preserves_textual_order_and_ignores_blanks() {
        let sig = parse_function_signature("  mix ( bool ,\tstr , i8 ) -> u16 , f64 ").unwrap();
        assert_eq!(sig.name.as_str(), "mix");
        assert_eq!(
            sig.arguments.as_slice(),
            &[
                ts(PrimitiveType::Bool),
                ts(PrimitiveType::Str),
                ts(PrimitiveType::I8)
            ]
        );
        assert_eq!(
            sig.returns.as_slice(),
            &[ts(PrimitiveType::U16), ts(PrimitiveType::F64)]
        );
    }

    #[test]
    fn empty_parens_and_empty_tail_are_empty_lists() {
        let sig = parse_function_signature("noop(  )->").unwrap();
        assert!(sig.arguments.is_empty());
        assert!(sig.returns.is_empty());
    }

    #[test]
    fn rejects_unmatched_and_nested_parens() {
        assert_eq!(
            parse_function_signature("foo(u8").unwrap_err(),
            SignatureError::UnmatchedParen { position: 3 }
        );
        assert_eq!(
            parse_function_signature("foo)u8(").unwrap_err(),
            SignatureError::UnmatchedParen { position: 3 }
        );
        assert_eq!(
            parse_function_signature("foo(u8(i8))").unwrap_err(),
            SignatureError::NestedParen { position: 6 }
        );
        assert_eq!(
            parse_function_signature("foo(u8)->i8)").unwrap_err(),
            SignatureError::UnmatchedParen { position: 11 }
        );
    }

    #[test]
    fn rejects_unknown_and_empty_tokens() {
        assert_eq!(
            parse_function_signature("foo(u8,)").unwrap_err(),
            SignatureError::UnknownType(String::new())
        );
        assert_eq!(
            parse_function_signature("foo()->Int32").unwrap_err(),
            SignatureError::UnknownType("Int32".to_string())
        );
    }

    #[test]
    fn rejects_missing_pieces_and_trailing_input() {
        assert_eq!(
            parse_function_signature("   (u8)").unwrap_err(),
            SignatureError::MissingName
        );
        assert!(matches!(
            parse_function_signature("foo").unwrap_err(),
            SignatureError::MissingParameterList(_)
        ));
        assert_eq!(
            parse_function_signature("foo() i32").unwrap_err(),
            SignatureError::TrailingInput("i32".to_string())
        );
    }

    #[test]
    fn enforces_name_and_list_bounds() {
        let long = format!("{}()", "n".repeat(128));
        assert_eq!(
            parse_function_signature(&long).unwrap_err(),
            SignatureError::NameTooLong { len: 128, max: 127 }
        );
        let exact = format!("{}()", "n".repeat(127));
        assert!(parse_function_signature(&exact).is_ok());

        let args = vec!["u8"; 256].join(",");
        assert_eq!(
            parse_function_signature(&format!("big({args})")).unwrap_err(),
            SignatureError::TooManyEntries { max: 255 }
        );
        let args = vec!["u8"; 255].join(",");
        let sig = parse_function_signature(&format!("big({args})")).unwrap();
        assert_eq!(sig.arguments.count(), 255);
    }

    #[test]
    fn display_output_parses_back() {
        let sig: FunctionSignature = "f ( u8 , str ) -> bool".parse().unwrap();
        let text = sig.to_string();
        insta::assert_snapshot!(text, @"f(u8,str)->bool");
        assert_eq!(text.parse::<FunctionSignature>().unwrap(), sig);
    }

    #[test]
    fn mutable_entries_do_not_read_back() {
        let sig = FunctionSignature::new("poke")
            .unwrap()
            .with_argument(TypeSignature::mutable(PrimitiveType::Str))
            .unwrap();
        let text = sig.to_string();
        insta::assert_snapshot!(text, @"poke(mut str)");
        assert_eq!(
            text.parse::<FunctionSignature>().unwrap_err(),
            SignatureError::UnknownType("mut str".to_string())
        );
    }

    #[test]
    fn error_messages_name_the_offending_token() {
        let err = parse_function_signature("foo(I32)").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"unknown type 'I32'");
    }

    #[test]
    fn serializes_for_tooling() {
        let sig = parse_function_signature("foo()->i32").unwrap();
        let json = serde_json::to_string(&sig).unwrap();
        insta::assert_snapshot!(json, @r#"{"name":"foo","arguments":[],"returns":[{"mutable":false,"type":"i32"}]}"#);
    }
}
