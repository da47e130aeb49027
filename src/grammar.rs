//! Grammar for the type-expression prose found in the API documentation.
//!
//! ```text
//! expr    := primary ("or" primary)*
//! primary := "array" "[" expr "]"
//!          | "dictionary" "[" expr ("→" | "->") expr "]"
//!          | "{" expr ("," expr)* "}"
//!          | "(" expr ")"
//!          | "defines.inventory"
//!          | literal_string | literal_integer | named
//! ```
//!
//! Parsing happens in two steps: `nom` builds a name-agnostic [`Syntax`] tree,
//! then [`Scope`] resolves names against the known universe of types.
use std::collections::HashSet;

use indexmap::IndexMap;
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while},
    character::complete::{char, digit1, none_of, satisfy},
    combinator::{all_consuming, cut, map, map_res, not, opt, recognize, value},
    error::{context, convert_error, VerboseError},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};

use crate::ir::{INVENTORY_INDEX, TypeExpression};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("failed to parse type expression {input:?}:\n{message}")]
    Syntax { input: String, message: String },
    #[error("unknown type: {name:?}")]
    UnknownType { name: String },
}

/// Raw parse tree: names are not resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Named(String),
    LiteralString(String),
    LiteralInteger(i64),
    Array(Box<Syntax>),
    Dictionary(Box<Syntax>, Box<Syntax>),
    Tuple(Vec<Syntax>),
    Union(Vec<Syntax>),
    Inventory,
}

/// Every documented type and prototype name. Computed once before parsing and
/// shared read-only by all workers.
#[derive(Debug, Clone, Default)]
pub struct KnownNames(HashSet<String>);

/// Types declared inline next to the expression being parsed.
pub type LocalTypes = IndexMap<String, TypeExpression>;

/// Name-resolution context for one expression.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub global: &'a KnownNames,
    pub local: &'a LocalTypes,
}

// ————————————————————————————————————————————————————————————————————————————
// PUBLIC API
// ————————————————————————————————————————————————————————————————————————————

impl KnownNames {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for KnownNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Parse documentation prose into its unresolved syntax tree.
pub fn parse_syntax(input: &str) -> Result<Syntax, ParseError> {
    match all_consuming(terminated(expr, ws))(input) {
        Ok((_, syntax)) => Ok(syntax),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ParseError::Syntax {
            input: input.to_string(),
            message: convert_error(input, e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Syntax {
            input: input.to_string(),
            message: "incomplete input".to_string(),
        }),
    }
}

impl Syntax {
    /// Whether `name` appears anywhere in the tree as a bare name.
    pub fn mentions(&self, name: &str) -> bool {
        match self {
            Syntax::Named(n) => n == name,
            Syntax::Array(content) => content.mentions(name),
            Syntax::Dictionary(keys, values) => keys.mentions(name) || values.mentions(name),
            Syntax::Tuple(members) | Syntax::Union(members) => members.iter().any(|m| m.mentions(name)),
            Syntax::LiteralString(_) | Syntax::LiteralInteger(_) | Syntax::Inventory => false,
        }
    }
}

/// Parse and resolve a type expression in one go.
pub fn parse_type_expression(input: &str, scope: Scope<'_>) -> Result<TypeExpression, ParseError> {
    let syntax = parse_syntax(input)?;
    scope.resolve(&syntax)
}

impl<'a> Scope<'a> {
    pub fn new(global: &'a KnownNames, local: &'a LocalTypes) -> Self {
        Self { global, local }
    }

    pub fn resolve(&self, syntax: &Syntax) -> Result<TypeExpression, ParseError> {
        Ok(match syntax {
            Syntax::Named(name) => self.resolve_name(name)?,
            Syntax::LiteralString(value) => TypeExpression::LiteralString { value: value.clone() },
            Syntax::LiteralInteger(value) => TypeExpression::LiteralInteger { value: *value },
            Syntax::Array(content) => TypeExpression::array(self.resolve(content)?),
            Syntax::Dictionary(keys, values) => {
                TypeExpression::dictionary(self.resolve(keys)?, self.resolve(values)?)
            }
            Syntax::Tuple(members) => TypeExpression::Tuple {
                members: members.iter().map(|m| self.resolve(m)).collect::<Result<_, _>>()?,
            },
            Syntax::Union(members) => TypeExpression::union(
                members.iter().map(|m| self.resolve(m)).collect::<Result<Vec<_>, _>>()?,
            ),
            Syntax::Inventory => TypeExpression::builtin(INVENTORY_INDEX),
        })
    }

    fn resolve_name(&self, name: &str) -> Result<TypeExpression, ParseError> {
        match name {
            "true" => Ok(TypeExpression::LiteralBool { value: true }),
            "false" => Ok(TypeExpression::LiteralBool { value: false }),
            _ if self.global.contains(name) => Ok(TypeExpression::reference(name)),
            _ => self
                .local
                .get(name)
                .cloned()
                .ok_or_else(|| ParseError::UnknownType { name: name.to_string() }),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL PARSERS
// ————————————————————————————————————————————————————————————————————————————

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whitespace, including the no-break spaces the documentation is full of.
fn ws(input: &str) -> Res<'_, &str> {
    take_while(char::is_whitespace)(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    preceded(ws, terminated(tag(word), not(satisfy(is_ident_char))))
}

fn symbol<'a>(c: char) -> impl FnMut(&'a str) -> Res<'a, char> {
    preceded(ws, char(c))
}

fn expr(input: &str) -> Res<'_, Syntax> {
    let (input, first) = primary(input)?;
    let (input, rest) = many0(preceded(keyword("or"), cut(primary)))(input)?;
    if rest.is_empty() {
        Ok((input, first))
    } else {
        let mut members = Vec::with_capacity(rest.len() + 1);
        members.push(first);
        members.extend(rest);
        Ok((input, Syntax::Union(members)))
    }
}

fn primary(input: &str) -> Res<'_, Syntax> {
    preceded(
        ws,
        alt((
            context("array", array),
            context("dictionary", dictionary),
            context("tuple", tuple),
            context("group", group),
            value(Syntax::Inventory, terminated(tag("defines.inventory"), not(satisfy(is_ident_char)))),
            map(string_literal, Syntax::LiteralString),
            map(integer_literal, Syntax::LiteralInteger),
            map(identifier, |name: &str| Syntax::Named(name.to_string())),
        )),
    )(input)
}

fn array(input: &str) -> Res<'_, Syntax> {
    let (input, _) = terminated(tag("array"), symbol('['))(input)?;
    let (input, content) = cut(terminated(expr, symbol(']')))(input)?;
    Ok((input, Syntax::Array(Box::new(content))))
}

fn dictionary(input: &str) -> Res<'_, Syntax> {
    let (input, _) = terminated(tag("dictionary"), symbol('['))(input)?;
    let arrow = preceded(ws, alt((tag("→"), tag("->"))));
    let (input, (keys, values)) =
        cut(terminated(separated_pair(expr, arrow, expr), symbol(']')))(input)?;
    Ok((input, Syntax::Dictionary(Box::new(keys), Box::new(values))))
}

fn tuple(input: &str) -> Res<'_, Syntax> {
    let (input, _) = char('{')(input)?;
    let (input, members) = cut(terminated(separated_list1(symbol(','), expr), symbol('}')))(input)?;
    Ok((input, Syntax::Tuple(members)))
}

fn group(input: &str) -> Res<'_, Syntax> {
    delimited(char('('), cut(expr), cut(symbol(')')))(input)
}

fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

fn string_literal(input: &str) -> Res<'_, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                none_of("\"\\"),
                '\\',
                alt((
                    value('\n', char('n')),
                    value('\r', char('r')),
                    value('\t', char('t')),
                    value('\\', char('\\')),
                    value('"', char('"')),
                )),
            )),
            Option::unwrap_or_default,
        ),
        cut(char('"')),
    )(input)
}

fn integer_literal(input: &str) -> Res<'_, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i64>)(input)
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
