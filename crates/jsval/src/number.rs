use std::cmp::Ordering;
use std::fmt::Display;

/// `Number` holds possible numeric types of the JSON object model,
/// with a total ordering across representations so that `1`, `1.0`,
/// and `-1` compare the way JSON Schema equality requires.
#[derive(Debug, Copy, Clone)]
pub enum Number {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}
use Number::*;

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unsigned(n) => write!(f, "{}", n),
            Signed(n) => write!(f, "{}", n),
            Float(n) => write!(f, "{}", n),
        }
    }
}

impl From<&serde_json::Number> for Number {
    fn from(n: &serde_json::Number) -> Self {
        if let Some(n) = n.as_u64() {
            Unsigned(n)
        } else if let Some(n) = n.as_i64() {
            Signed(n)
        } else {
            Float(n.as_f64().unwrap())
        }
    }
}

impl From<Number> for serde_json::Value {
    fn from(n: Number) -> Self {
        match n {
            Unsigned(n) => serde_json::Value::Number(n.into()),
            Signed(n) => serde_json::Value::Number(n.into()),
            Float(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Unsigned(lhs), Unsigned(rhs)) => lhs.cmp(rhs),
            (Unsigned(_), Signed(rhs)) if *rhs < 0 => Ordering::Greater,
            (Unsigned(lhs), Signed(rhs)) => lhs.cmp(&(*rhs as u64)),
            (Unsigned(lhs), Float(rhs)) => f64_cmp(&(*lhs as f64), rhs),

            (Signed(lhs), Unsigned(_)) if *lhs < 0 => Ordering::Less,
            (Signed(lhs), Unsigned(rhs)) => (*lhs as u64).cmp(rhs),
            (Signed(lhs), Signed(rhs)) => lhs.cmp(rhs),
            (Signed(lhs), Float(rhs)) => f64_cmp(&(*lhs as f64), rhs),

            (Float(lhs), Unsigned(rhs)) => f64_cmp(lhs, &(*rhs as f64)),
            (Float(lhs), Signed(rhs)) => f64_cmp(lhs, &(*rhs as f64)),
            (Float(lhs), Float(rhs)) => f64_cmp(lhs, rhs),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Number {}

impl Number {
    /// Is this number an integer, or a float with zero fractional part?
    pub fn is_integral(&self) -> bool {
        match self {
            Unsigned(_) | Signed(_) => true,
            Float(f) => f.fract() == 0.0,
        }
    }

    pub fn is_multiple_of(&self, d: &Self) -> bool {
        match *d {
            Unsigned(d) => match *self {
                Unsigned(n) => n % d == 0,
                Signed(n) => n % (d as i64) == 0,
                Float(n) => (n / (d as f64)).fract() == 0.0,
            },
            Signed(d) => match *self {
                Unsigned(n) => (n as i64) % d == 0,
                Signed(n) => n % d == 0,
                Float(n) => (n / (d as f64)).fract() == 0.0,
            },
            Float(d) => match *self {
                Unsigned(n) => (n as f64 / d).fract() == 0.0,
                Signed(n) => (n as f64 / d).fract() == 0.0,
                Float(n) => (n / d).fract() == 0.0,
            },
        }
    }
}

fn f64_cmp(lhs: &f64, rhs: &f64) -> Ordering {
    lhs.partial_cmp(rhs).unwrap_or_else(|| {
        if lhs.is_nan() && rhs.is_nan() {
            Ordering::Equal
        } else if lhs.is_nan() {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn from(s: &str) -> Number {
        let n: serde_json::Number = serde_json::from_str(s).unwrap();
        Number::from(&n)
    }

    #[test]
    fn test_conversion() {
        assert_eq!(from("1234"), Unsigned(1234));
        assert_eq!(from("-1234"), Signed(-1234));
        assert_eq!(from("12.34"), Float(12.34));
        assert_eq!(from("18446744073709551615"), Unsigned(u64::MAX));
    }

    #[test]
    fn test_integral() {
        assert!(from("10").is_integral());
        assert!(from("-10").is_integral());
        assert!(from("1.0").is_integral());
        assert!(!from("1.5").is_integral());
    }

    #[test]
    fn test_multiple_of() {
        assert!(Unsigned(32).is_multiple_of(&Unsigned(4)));
        assert!(Unsigned(32).is_multiple_of(&Signed(-4)));
        assert!(Unsigned(32).is_multiple_of(&Float(4.0)));
        assert!(!Unsigned(32).is_multiple_of(&Unsigned(5)));

        assert!(Signed(-32).is_multiple_of(&Signed(-4)));
        assert!(Signed(-32).is_multiple_of(&Float(4.0)));
        assert!(!Signed(-32).is_multiple_of(&Float(4.5)));

        assert!(Float(32.0).is_multiple_of(&Unsigned(4)));
        assert!(Float(4.5).is_multiple_of(&Float(1.5)));
        assert!(!Float(32.1).is_multiple_of(&Unsigned(4)));
    }

    #[test]
    fn test_equality_across_representations() {
        assert_eq!(Unsigned(20), Signed(20));
        assert_eq!(Unsigned(20), Float(20.00));
        assert_eq!(Signed(-20), Float(-20.00));
        assert_ne!(Unsigned(20), Float(20.5));
    }

    #[test]
    fn test_ordering() {
        let cases = [
            (Unsigned(10), Unsigned(11)),
            (Signed(-11), Signed(-10)),
            (Float(1.0), Float(1.1)),
            (Unsigned(10), Float(10.1)),
            (Signed(-10), Float(-9.9)),
            (Signed(-1), Unsigned(0)),
            (Signed(i64::MIN), Unsigned(u64::MAX)),
            (Signed(0), Unsigned(10000000000000000000u64)),
        ];
        for (lhs, rhs) in cases {
            assert_eq!(lhs.cmp(&rhs), Ordering::Less);
            assert_eq!(rhs.cmp(&lhs), Ordering::Greater);
        }
    }
}
