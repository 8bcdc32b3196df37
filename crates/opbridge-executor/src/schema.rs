//! Schema - Operator Signatures
//!
//! Operators describe themselves with a textual signature such as
//!
//! ```text
//! add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor
//! ```
//!
//! `FunctionSchema::parse` turns that into typed arguments with parsed
//! default values, which is what the descriptor cache inspects.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::fmt;

use crate::error::{BridgeError, BridgeResult};
use crate::ivalue::IValue;

// =============================================================================
// Types
// =============================================================================

/// The declared type of an argument or return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    /// `Tensor`
    Tensor,
    /// `int`
    Int,
    /// `float`
    Float,
    /// `bool`
    Bool,
    /// `Scalar`, a number of either kind.
    Scalar,
    /// `str`
    Str,
    /// Any other named type, such as `ScalarType` or `Device`.
    Other(String),
    /// `T?`
    Optional(Box<ArgType>),
    /// `T[]` or `T[N]`.
    List(Box<ArgType>, Option<usize>),
}

impl ArgType {
    /// Parses a type expression, ignoring alias annotations like `Tensor(a!)`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if let Some(inner) = text.strip_suffix('?') {
            return Ok(Self::Optional(Box::new(Self::parse(inner)?)));
        }
        if let Some(body) = text.strip_suffix(']') {
            let open = body
                .rfind('[')
                .ok_or_else(|| format!("unbalanced list type '{text}'"))?;
            let size = &body[open + 1..];
            let size = if size.is_empty() {
                None
            } else {
                Some(
                    size.parse::<usize>()
                        .map_err(|_| format!("bad list size in '{text}'"))?,
                )
            };
            return Ok(Self::List(Box::new(Self::parse(&body[..open])?), size));
        }

        let base = text.split('(').next().unwrap_or(text).trim();
        Ok(match base {
            "Tensor" => Self::Tensor,
            "int" | "SymInt" => Self::Int,
            "float" => Self::Float,
            "bool" => Self::Bool,
            "Scalar" => Self::Scalar,
            "str" => Self::Str,
            "" => return Err("empty type".to_string()),
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor => f.write_str("Tensor"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::Scalar => f.write_str("Scalar"),
            Self::Str => f.write_str("str"),
            Self::Other(name) => f.write_str(name),
            Self::Optional(inner) => write!(f, "{inner}?"),
            Self::List(inner, None) => write!(f, "{inner}[]"),
            Self::List(inner, Some(n)) => write!(f, "{inner}[{n}]"),
        }
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// One declared argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Declared type.
    pub ty: ArgType,
    /// Parsed default value.
    pub default: Option<IValue>,
    /// Declared after `*`.
    pub kwarg_only: bool,
}

/// One declared return value.
#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    /// Optional return name.
    pub name: Option<String>,
    /// Declared type.
    pub ty: ArgType,
}

/// A parsed operator signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSchema {
    /// Operator name.
    pub name: String,
    /// Overload name, empty for the default overload.
    pub overload: String,
    /// Arguments in positional order.
    pub arguments: Vec<Argument>,
    /// Return values.
    pub returns: Vec<Return>,
}

impl FunctionSchema {
    /// Parses `name.overload(args) -> returns`.
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let err = |reason: String| BridgeError::SchemaParse {
            schema: text.to_string(),
            reason,
        };

        let open = text.find('(').ok_or_else(|| err("missing '('".into()))?;
        let close = matching_paren(text, open).ok_or_else(|| err("unbalanced '('".into()))?;

        let full_name = text[..open].trim();
        let (name, overload) = full_name.split_once('.').unwrap_or((full_name, ""));
        if name.is_empty() {
            return Err(err("empty operator name".into()));
        }

        let mut arguments = Vec::new();
        let mut kwarg_only = false;
        for piece in split_top_level(&text[open + 1..close]) {
            if piece == "*" {
                kwarg_only = true;
                continue;
            }
            let mut argument = parse_argument(piece).map_err(err)?;
            argument.kwarg_only = kwarg_only;
            arguments.push(argument);
        }

        let rest = text[close + 1..].trim();
        let returns_text = rest
            .strip_prefix("->")
            .ok_or_else(|| err("missing '->'".into()))?
            .trim();
        let returns = parse_returns(returns_text).map_err(err)?;

        Ok(Self {
            name: name.to_string(),
            overload: overload.to_string(),
            arguments,
            returns,
        })
    }
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices().skip_while(|&(i, _)| i < open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on commas that are not nested in brackets or parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                pieces.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        pieces.push(last);
    }
    pieces
}

fn parse_argument(text: &str) -> Result<Argument, String> {
    let (decl, default) = match text.split_once('=') {
        Some((decl, default)) => (decl.trim(), Some(default.trim())),
        None => (text.trim(), None),
    };
    let (ty, name) = decl
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| format!("argument '{text}' has no name"))?;
    let ty = ArgType::parse(ty)?;
    let default = default.map(|d| parse_default(d, &ty)).transpose()?;
    Ok(Argument {
        name: name.to_string(),
        ty,
        default,
        kwarg_only: false,
    })
}

fn parse_returns(text: &str) -> Result<Vec<Return>, String> {
    let inner = match text.strip_prefix('(') {
        Some(rest) => rest
            .strip_suffix(')')
            .ok_or_else(|| format!("unbalanced returns '{text}'"))?,
        None => text,
    };
    split_top_level(inner)
        .into_iter()
        .map(|piece| {
            let (ty, name) = match piece.rsplit_once(char::is_whitespace) {
                Some((ty, name)) => (ty, Some(name.to_string())),
                None => (piece, None),
            };
            Ok(Return {
                name,
                ty: ArgType::parse(ty)?,
            })
        })
        .collect()
}

// =============================================================================
// Defaults
// =============================================================================

/// Parses a literal default against its declared type.
pub fn parse_default(text: &str, ty: &ArgType) -> Result<IValue, String> {
    if text == "None" {
        return Ok(IValue::None);
    }
    match ty {
        ArgType::Optional(inner) => parse_default(text, inner),
        ArgType::List(elem, size) => parse_list_default(text, elem, *size),
        ArgType::Int => parse_int(text).map(IValue::Int),
        ArgType::Float => parse_float(text).map(IValue::Float),
        ArgType::Bool => parse_bool(text).map(IValue::Bool),
        ArgType::Scalar => {
            if text.contains(['.', 'e', 'E']) || text.contains("inf") || text.contains("nan") {
                parse_float(text).map(IValue::Float)
            } else {
                parse_int(text).map(IValue::Int)
            }
        }
        ArgType::Str => Ok(IValue::Str(unquote(text).to_string())),
        ArgType::Tensor | ArgType::Other(_) => Ok(IValue::Str(text.to_string())),
    }
}

fn parse_list_default(text: &str, elem: &ArgType, size: Option<usize>) -> Result<IValue, String> {
    let items: Vec<&str> = match text.strip_prefix('[') {
        Some(rest) => split_top_level(
            rest.strip_suffix(']')
                .ok_or_else(|| format!("unbalanced list default '{text}'"))?,
        ),
        // A bare value for a sized list is repeated to fill it.
        None => vec![text; size.unwrap_or(1)],
    };
    match elem {
        ArgType::Int => items
            .into_iter()
            .map(parse_int)
            .collect::<Result<_, _>>()
            .map(IValue::IntList),
        ArgType::Float => items
            .into_iter()
            .map(parse_float)
            .collect::<Result<_, _>>()
            .map(IValue::FloatList),
        ArgType::Bool => items
            .into_iter()
            .map(parse_bool)
            .collect::<Result<_, _>>()
            .map(IValue::BoolList),
        other => Err(format!("unsupported list default of {other}")),
    }
}

fn parse_int(text: &str) -> Result<i64, String> {
    text.parse().map_err(|_| format!("bad int literal '{text}'"))
}

fn parse_float(text: &str) -> Result<f64, String> {
    match text {
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => text.parse().map_err(|_| format!("bad float literal '{text}'")),
    }
}

fn parse_bool(text: &str) -> Result<bool, String> {
    match text {
        "True" => Ok(true),
        "False" => Ok(false),
        _ => Err(format!("bad bool literal '{text}'")),
    }
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let schema =
            FunctionSchema::parse("add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor")
                .unwrap();
        assert_eq!(schema.name, "add");
        assert_eq!(schema.overload, "Tensor");
        assert_eq!(schema.arguments.len(), 3);
        assert_eq!(schema.arguments[2].ty, ArgType::Scalar);
        assert_eq!(schema.arguments[2].default, Some(IValue::Int(1)));
        assert!(schema.arguments[2].kwarg_only);
        assert!(!schema.arguments[1].kwarg_only);
        assert_eq!(schema.returns.len(), 1);
        assert_eq!(schema.returns[0].ty, ArgType::Tensor);
    }

    #[test]
    fn test_parse_lists_and_optionals() {
        let schema = FunctionSchema::parse(
            "sum.dim_IntList(Tensor self, int[1]? dim, bool keepdim=False, *, ScalarType? dtype=None) -> Tensor",
        )
        .unwrap();
        assert_eq!(
            schema.arguments[1].ty,
            ArgType::Optional(Box::new(ArgType::List(Box::new(ArgType::Int), Some(1))))
        );
        assert_eq!(schema.arguments[1].default, None);
        assert_eq!(schema.arguments[2].default, Some(IValue::Bool(false)));
        assert_eq!(schema.arguments[3].default, Some(IValue::None));
        assert_eq!(
            schema.arguments[3].ty,
            ArgType::Optional(Box::new(ArgType::Other("ScalarType".into())))
        );
    }

    #[test]
    fn test_parse_alias_annotations_and_tuple_returns() {
        let schema =
            FunctionSchema::parse("transpose.int(Tensor(a) self, int dim0, int dim1) -> Tensor(a)")
                .unwrap();
        assert_eq!(schema.arguments[0].ty, ArgType::Tensor);
        assert_eq!(schema.returns[0].ty, ArgType::Tensor);

        let schema = FunctionSchema::parse("aminmax(Tensor self) -> (Tensor min, Tensor max)").unwrap();
        assert_eq!(schema.overload, "");
        assert_eq!(schema.returns.len(), 2);
        assert_eq!(schema.returns[1].name.as_deref(), Some("max"));
    }

    #[test]
    fn test_list_defaults() {
        assert_eq!(
            parse_default("1", &ArgType::List(Box::new(ArgType::Int), Some(2))).unwrap(),
            IValue::IntList(vec![1, 1])
        );
        assert_eq!(
            parse_default("[0, 1]", &ArgType::List(Box::new(ArgType::Int), None)).unwrap(),
            IValue::IntList(vec![0, 1])
        );
        assert_eq!(
            parse_default("[]", &ArgType::List(Box::new(ArgType::Float), None)).unwrap(),
            IValue::FloatList(vec![])
        );
    }

    #[test]
    fn test_scalar_and_string_defaults() {
        assert_eq!(
            parse_default("0.01", &ArgType::Float).unwrap(),
            IValue::Float(0.01)
        );
        assert_eq!(
            parse_default("1e-05", &ArgType::Scalar).unwrap(),
            IValue::Float(1e-05)
        );
        assert_eq!(
            parse_default("\"mean\"", &ArgType::Str).unwrap(),
            IValue::Str("mean".into())
        );
        assert!(parse_default("maybe", &ArgType::Bool).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(FunctionSchema::parse("add").is_err());
        assert!(FunctionSchema::parse("add(Tensor self").is_err());
        assert!(FunctionSchema::parse("add(Tensor self)").is_err());
        assert!(FunctionSchema::parse("add(Tensor) -> Tensor").is_err());
    }
}
