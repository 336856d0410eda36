use crate::number::Number;
use serde_json::Value;
use std::fmt;

/// Set is a bit-set over the JSON Schema instance types. Integers and
/// fractional numbers are distinguished so that `"type": "integer"` can
/// accept any number having a zero fractional part, while `"number"`
/// is the composite of both.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct Set(u32);

pub const INVALID: Set = Set(0b0000000);
pub const ARRAY: Set = Set(0b0000001);
pub const BOOLEAN: Set = Set(0b0000010);
pub const FRACTIONAL: Set = Set(0b0000100);
pub const INTEGER: Set = Set(0b0001000);
pub const NULL: Set = Set(0b0010000);
pub const OBJECT: Set = Set(0b0100000);
pub const STRING: Set = Set(0b1000000);
// INT_OR_FRAC is a composite for "number". It's not called NUMBER to avoid
// giving the impression that this is a fundamental type.
pub const INT_OR_FRAC: Set = Set(INTEGER.0 | FRACTIONAL.0);

impl std::ops::BitOr for Set {
    type Output = Self;

    #[inline]
    fn bitor(self, other: Self) -> Self::Output {
        Set(self.0 | other.0)
    }
}

impl std::ops::BitAnd for Set {
    type Output = Self;

    #[inline]
    fn bitand(self, other: Self) -> Self::Output {
        Set(self.0 & other.0)
    }
}

impl std::ops::Sub for Set {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self::Output {
        Set(self.0 & !other.0)
    }
}

impl Set {
    #[inline]
    pub fn overlaps(&self, other: Set) -> bool {
        *self & other != INVALID
    }

    /// Returns the `Set` value for a single type with the given name.
    pub fn for_type_name(str_val: &str) -> Option<Set> {
        match str_val {
            "array" => Some(ARRAY),
            "boolean" => Some(BOOLEAN),
            "integer" => Some(INTEGER),
            "null" => Some(NULL),
            "number" => Some(INT_OR_FRAC),
            "object" => Some(OBJECT),
            "string" => Some(STRING),
            _ => None,
        }
    }

    /// Parses a `type` keyword value: a type name, or an array of type names.
    /// Returns None if the value has an unexpected shape or names an
    /// unknown type.
    pub fn from_value(v: &Value) -> Option<Set> {
        match v {
            Value::String(s) => Self::for_type_name(s),
            Value::Array(arr) => {
                let mut set = INVALID;
                for item in arr {
                    set = set | Self::for_type_name(item.as_str()?)?;
                }
                Some(set)
            }
            _ => None,
        }
    }

    /// Classifies an instance value. Numbers with a zero fractional part
    /// classify as INTEGER, which is a subset of "number".
    pub fn of_value(v: &Value) -> Set {
        match v {
            Value::Null => NULL,
            Value::Bool(_) => BOOLEAN,
            Value::String(_) => STRING,
            Value::Array(_) => ARRAY,
            Value::Object(_) => OBJECT,
            Value::Number(n) => {
                if Number::from(n).is_integral() {
                    INTEGER
                } else {
                    FRACTIONAL
                }
            }
        }
    }

    /// Returns an iterator over the type names as static strings.
    pub fn iter(&self) -> Iter {
        Iter {
            types: *self,
            index: 0,
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(String::from).collect()
    }
}

/// Iterator that returns the type names for all of the types in a `Set`.
pub struct Iter {
    types: Set,
    index: usize,
}

impl Iterator for Iter {
    type Item = &'static str;

    fn next(&mut self) -> Option<Self::Item> {
        const ITER_ORDER: &[Set] = &[
            ARRAY,
            BOOLEAN,
            FRACTIONAL,
            INTEGER,
            NULL,
            INT_OR_FRAC, // "number" sorts after "null".
            OBJECT,
            STRING,
        ];

        loop {
            let ty = ITER_ORDER.get(self.index)?;
            self.index += 1;

            // Is |ty| a subset of |types|?
            if *ty - self.types == INVALID {
                match *ty {
                    ARRAY => return Some("array"),
                    BOOLEAN => return Some("boolean"),
                    // A lone FRACTIONAL arises only from instance
                    // classification, where it reads as "number".
                    FRACTIONAL if !self.types.overlaps(INTEGER) => return Some("number"),
                    INTEGER if !self.types.overlaps(FRACTIONAL) => return Some("integer"),
                    FRACTIONAL | INTEGER => (),
                    NULL => return Some("null"),
                    INT_OR_FRAC => return Some("number"),
                    OBJECT => return Some("object"),
                    STRING => return Some("string"),
                    _ => unreachable!(),
                }
            }
        }
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use itertools::Itertools;
        write!(f, "{}", self.iter().format(", "))
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
