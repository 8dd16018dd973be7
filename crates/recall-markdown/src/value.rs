//! Header value types for the restricted front-matter subset.

use std::fmt;

/// A scalar header value.
///
/// Scalars are typed on parse so that round-tripping is stable: `42`
/// parses to an integer and re-emits as `42`, while `"42"` parses to a
/// string and re-emits quoted.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A string value. Emitted unquoted when it is plain, quoted otherwise.
    String(String),
    /// A 64-bit integer.
    Integer(i64),
    /// A floating-point number.
    Float(f64),
    /// A boolean (`true` / `false`).
    Bool(bool),
}

impl Scalar {
    /// The string content if this scalar is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer value if this scalar is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The numeric value, widening integers to floats.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(n) => {
                #[allow(clippy::cast_precision_loss)]
                Some(*n as f64)
            }
            _ => None,
        }
    }

    /// The boolean value if this scalar is a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Parse an unquoted raw token into its most specific scalar type.
    ///
    /// Quoting decisions on emit mirror this: any string that would parse
    /// as a number or boolean is emitted quoted to preserve its type.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Self::Integer(n);
        }
        // Require a decimal point so RFC 3339 timestamps stay strings.
        if raw.contains('.') && !raw.contains(':') {
            if let Ok(f) = raw.parse::<f64>() {
                if f.is_finite() {
                    return Self::Float(f);
                }
            }
        }
        Self::String(raw.to_string())
    }

    /// Whether a string value needs quoting to survive a round trip.
    pub(crate) fn needs_quoting(s: &str) -> bool {
        if s.is_empty() {
            return true;
        }
        if matches!(s, "true" | "false") {
            return true;
        }
        if s.parse::<i64>().is_ok() {
            return true;
        }
        if s.contains('.') && !s.contains(':') && s.parse::<f64>().is_ok() {
            return true;
        }
        s.starts_with(char::is_whitespace)
            || s.ends_with(char::is_whitespace)
            || s.starts_with('"')
            || s.starts_with('[')
            || s.contains('\n')
            || s.contains('\r')
            || s.contains('#')
            || s.contains(": ")
            || s.ends_with(':')
    }
}

impl fmt::Display for Scalar {
    /// Canonical scalar rendering as it appears after `key: `.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => {
                if Self::needs_quoting(s) {
                    write!(f, "{}", quote(s))
                } else {
                    write!(f, "{s}")
                }
            }
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => {
                // Keep a decimal point so the value re-parses as a float.
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A header value: a scalar, a flow list of strings, or a one-level map.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single scalar.
    Scalar(Scalar),
    /// A bracketed flow list of quoted strings.
    List(Vec<String>),
    /// A one-level nested map (insertion-ordered), used by `metadata:`.
    Map(Vec<(String, Scalar)>),
}

impl Value {
    /// The scalar if this value is one.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The list items if this value is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The map entries if this value is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&[(String, Scalar)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Quote and escape a string for header emission.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Unescape the interior of a quoted string.
pub(crate) fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bool_true("true", Scalar::Bool(true))]
    #[case::bool_false("false", Scalar::Bool(false))]
    #[case::integer("42", Scalar::Integer(42))]
    #[case::negative("-7", Scalar::Integer(-7))]
    #[case::float("0.85", Scalar::Float(0.85))]
    #[case::plain("hello", Scalar::String("hello".to_string()))]
    #[case::timestamp(
        "2025-06-01T12:00:00.500Z",
        Scalar::String("2025-06-01T12:00:00.500Z".to_string())
    )]
    fn from_raw_types_values(#[case] raw: &str, #[case] expected: Scalar) {
        assert_eq!(Scalar::from_raw(raw), expected);
    }

    #[rstest]
    #[case::integer_like("42")]
    #[case::bool_like("true")]
    #[case::empty("")]
    #[case::leading_space(" padded")]
    #[case::colon_space("key: value")]
    fn ambiguous_strings_are_quoted(#[case] s: &str) {
        assert!(Scalar::needs_quoting(s));
        let rendered = Scalar::String(s.to_string()).to_string();
        assert!(rendered.starts_with('"'), "{rendered} should be quoted");
    }

    #[test]
    fn plain_strings_stay_unquoted() {
        assert_eq!(Scalar::String("active".into()).to_string(), "active");
        assert_eq!(
            Scalar::String("2025-06-01T12:00:00Z".into()).to_string(),
            "2025-06-01T12:00:00Z"
        );
    }

    #[test]
    fn float_display_keeps_decimal_point() {
        assert_eq!(Scalar::Float(1.0).to_string(), "1.0");
        assert_eq!(Scalar::Float(0.85).to_string(), "0.85");
    }

    #[test]
    fn quote_round_trips_escapes() {
        let original = "a \"quoted\" \\ value\nsecond";
        let quoted = quote(original);
        let inner = &quoted[1..quoted.len() - 1];
        assert_eq!(unescape(inner), original);
    }
}
