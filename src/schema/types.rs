//! Element type references
//!
//! Column element types are plain values: a (possibly qualified) name plus
//! generic arguments. A `*` argument accepts any concrete argument, which is
//! the only form of variance the engine understands.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("Empty type")]
    Empty,

    #[error("Unexpected character '{found}' at {pos}")]
    UnexpectedChar { pos: usize, found: char },

    #[error("Unexpected end of type text")]
    UnexpectedEnd,
}

/// A generic argument of a [`TypeRef`]
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeArg {
    Star,
    Type { ty: TypeRef, nullable: bool },
}

impl TypeArg {
    /// A non-null argument
    pub fn of(ty: TypeRef) -> Self {
        TypeArg::Type {
            ty,
            nullable: false,
        }
    }

    /// A nullable argument
    pub fn nullable(ty: TypeRef) -> Self {
        TypeArg::Type { ty, nullable: true }
    }

    /// A star accepts anything; concrete arguments are invariant.
    fn accepts(&self, other: &TypeArg) -> bool {
        match self {
            TypeArg::Star => true,
            concrete => concrete == other,
        }
    }
}

/// A column element type such as `Int` or `List<*>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeRef {
    name: String,
    args: Vec<TypeArg>,
}

impl TypeRef {
    /// A type without generic arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A type applied to generic arguments
    pub fn generic(name: impl Into<String>, args: Vec<TypeArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Type name, possibly qualified
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generic arguments in declaration order
    pub fn args(&self) -> &[TypeArg] {
        &self.args
    }

    /// Check whether a value of this type can be used where `target` is expected
    pub fn is_assignable_to(&self, target: &TypeRef) -> bool {
        self.name == target.name
            && self.args.len() == target.args.len()
            && target
                .args
                .iter()
                .zip(&self.args)
                .all(|(expected, actual)| expected.accepts(actual))
    }

    /// The more general of two comparable types, `None` if neither accepts the other
    pub fn join(&self, other: &TypeRef) -> Option<TypeRef> {
        if self.is_assignable_to(other) {
            Some(other.clone())
        } else if other.is_assignable_to(self) {
            Some(self.clone())
        } else {
            None
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.args.is_empty() {
            return Ok(());
        }
        f.write_str("<")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match arg {
                TypeArg::Star => f.write_str("*")?,
                TypeArg::Type { ty, nullable } => {
                    write!(f, "{}", ty)?;
                    if *nullable {
                        f.write_str("?")?;
                    }
                }
            }
        }
        f.write_str(">")
    }
}

impl FromStr for TypeRef {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(s);
        parser.skip_ws();
        if parser.peek().is_none() {
            return Err(TypeParseError::Empty);
        }
        let ty = parser.type_ref()?;
        parser.skip_ws();
        match parser.peek() {
            None => Ok(ty),
            Some((pos, found)) => Err(TypeParseError::UnexpectedChar { pos, found }),
        }
    }
}

impl TryFrom<String> for TypeRef {
    type Error = TypeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        self.chars.peek().copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), TypeParseError> {
        self.skip_ws();
        match self.chars.next() {
            Some((_, c)) if c == wanted => Ok(()),
            Some((pos, found)) => Err(TypeParseError::UnexpectedChar { pos, found }),
            None => Err(TypeParseError::UnexpectedEnd),
        }
    }

    fn type_ref(&mut self) -> Result<TypeRef, TypeParseError> {
        self.skip_ws();
        let mut name = String::new();
        while let Some((_, c)) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == ':' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return match self.peek() {
                Some((pos, found)) => Err(TypeParseError::UnexpectedChar { pos, found }),
                None => Err(TypeParseError::UnexpectedEnd),
            };
        }

        self.skip_ws();
        let mut args = Vec::new();
        if matches!(self.peek(), Some((_, '<'))) {
            self.chars.next();
            loop {
                args.push(self.type_arg()?);
                self.skip_ws();
                match self.chars.next() {
                    Some((_, ',')) => continue,
                    Some((_, '>')) => break,
                    Some((pos, found)) => {
                        return Err(TypeParseError::UnexpectedChar { pos, found })
                    }
                    None => return Err(TypeParseError::UnexpectedEnd),
                }
            }
        }
        Ok(TypeRef { name, args })
    }

    fn type_arg(&mut self) -> Result<TypeArg, TypeParseError> {
        self.skip_ws();
        if matches!(self.peek(), Some((_, '*'))) {
            self.chars.next();
            return Ok(TypeArg::Star);
        }
        let ty = self.type_ref()?;
        self.skip_ws();
        let nullable = if matches!(self.peek(), Some((_, '?'))) {
            self.expect('?')?;
            true
        } else {
            false
        };
        Ok(TypeArg::Type { ty, nullable })
    }
}
