use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::str::FromStr;

/// Token is a parsed token of a JSON pointer.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Token {
    /// Integer index of a JSON array.
    /// If applied to a JSON object, the index may also serve as a property name.
    Index(usize),
    /// JSON object property name without escaping. Never an integer.
    Property(String),
}

impl Token {
    pub fn from_str(s: &str) -> Self {
        if s.starts_with('+') || (s.starts_with('0') && s.len() > 1) {
            Token::Property(s.to_string())
        } else if let Ok(ind) = usize::from_str(s) {
            Token::Index(ind)
        } else {
            Token::Property(s.to_string())
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Index(ind) => write!(f, "{ind}"),
            Token::Property(prop) => {
                write!(f, "{}", prop.replace('~', "~0").replace('/', "~1"))
            }
        }
    }
}

/// Pointer is a parsed JSON pointer: an immutable sequence of tokens
/// addressing a location within a JSON document. The empty Pointer
/// addresses the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pointer(Vec<Token>);

impl Pointer {
    /// Builds an empty Pointer which references the document root.
    pub fn root() -> Pointer {
        Pointer(Vec::new())
    }

    /// Builds a Pointer from the given string, which is an encoded JSON pointer.
    ///
    /// ```
    /// use jsval::ptr::{Pointer, Token};
    ///
    /// let pointer = Pointer::from_str("/foo/ba~1ar/3");
    /// let expected_tokens = vec![
    ///     Token::Property("foo".to_string()),
    ///     Token::Property("ba/ar".to_string()),
    ///     Token::Index(3),
    /// ];
    /// assert_eq!(expected_tokens, pointer.tokens());
    /// ```
    pub fn from_str(s: &str) -> Pointer {
        if s.is_empty() {
            return Pointer(Vec::new());
        }
        Pointer(
            s.split('/')
                .skip(if s.starts_with('/') { 1 } else { 0 })
                .map(|t| Token::from_str(&t.replace("~1", "/").replace("~0", "~")))
                .collect(),
        )
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new Pointer extended with the given token.
    pub fn push(&self, token: Token) -> Pointer {
        let mut tokens = self.0.clone();
        tokens.push(token);
        Pointer(tokens)
    }

    /// Returns a new Pointer extended with a property token.
    pub fn push_prop(&self, prop: &str) -> Pointer {
        self.push(Token::Property(prop.to_string()))
    }

    /// Returns a new Pointer extended with an item index token.
    pub fn push_item(&self, index: usize) -> Pointer {
        self.push(Token::Index(index))
    }

    /// Returns a new Pointer which is `self` followed by all tokens of `other`.
    pub fn concat(&self, other: &Pointer) -> Pointer {
        let mut tokens = self.0.clone();
        tokens.extend(other.0.iter().cloned());
        Pointer(tokens)
    }

    /// Queries the location addressed by this Pointer within the document,
    /// returning None if the location doesn't exist.
    pub fn query<'v>(&self, doc: &'v serde_json::Value) -> Option<&'v serde_json::Value> {
        use serde_json::Value;

        let mut node = doc;
        for token in &self.0 {
            node = match (token, node) {
                (Token::Index(ind), Value::Array(arr)) => arr.get(*ind)?,
                (Token::Index(ind), Value::Object(map)) => map.get(&ind.to_string())?,
                (Token::Property(prop), Value::Object(map)) => map.get(prop)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Encodes this Pointer as a URI fragment, percent-encoding tokens as needed.
    pub fn to_fragment(&self) -> String {
        // RFC 3986 fragment charset, minus '%' which starts an escape.
        const FRAGMENT: &AsciiSet = &CONTROLS
            .add(b' ')
            .add(b'"')
            .add(b'<')
            .add(b'>')
            .add(b'`')
            .add(b'#')
            .add(b'%')
            .add(b'^')
            .add(b'{')
            .add(b'}')
            .add(b'|')
            .add(b'\\');

        let mut s = String::new();
        for token in &self.0 {
            s.push('/');
            s.extend(utf8_percent_encode(&token.to_string(), FRAGMENT));
        }
        s
    }
}

impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for token in &self.0 {
            write!(f, "/{token}")?;
        }
        Ok(())
    }
}
