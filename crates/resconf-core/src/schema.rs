//! Per-key value casting.
//!
//! A [`Schema`] maps key paths to [`Cast`] implementations. Values written
//! through `update`/`replace` are cast once, at write time; keys without a
//! registered cast pass through unchanged.

use crate::error::{ConfigError, ConfigResult};
use crate::map::value_kind;
use crate::path::KeyPath;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts an incoming leaf value into its stored form.
pub trait Cast: Send + Sync {
    /// Convert `value`, or explain why it cannot be converted.
    fn cast(&self, value: Value) -> Result<Value, String>;

    /// Name of the target type, used in error messages.
    fn target(&self) -> &'static str;
}

/// Integer cast. Accepts integers, integral floats, numeric strings and bools.
#[derive(Debug, Clone, Copy, Default)]
pub struct Int;

impl Cast for Int {
    fn cast(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            Value::Number(n) => n
                .as_f64()
                .and_then(|f| whole_i64(f.trunc()))
                .map(Value::from)
                .ok_or_else(|| format!("{n} is out of range")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| e.to_string()),
            Value::Bool(b) => Ok(Value::from(i64::from(b))),
            other => Err(format!("unsupported {}", value_kind(&other))),
        }
    }

    fn target(&self) -> &'static str {
        "int"
    }
}

/// `f` as an `i64` when it is integral and in range.
fn whole_i64(f: f64) -> Option<i64> {
    // 2^63, the first float past i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then(|| f as i64)
}

/// Floating point cast.
#[derive(Debug, Clone, Copy, Default)]
pub struct Float;

impl Cast for Float {
    fn cast(&self, value: Value) -> Result<Value, String> {
        let f = match &value {
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not representable"))?,
            Value::String(s) => s.trim().parse::<f64>().map_err(|e| e.to_string())?,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => return Err(format!("unsupported {}", value_kind(other))),
        };
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("{f} is not finite"))
    }

    fn target(&self) -> &'static str {
        "float"
    }
}

/// Boolean cast. Strings follow the usual config spellings
/// (`true/false`, `yes/no`, `on/off`, `1/0`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Bool;

impl Cast for Bool {
    fn cast(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().map_or(false, |f| f != 0.0))),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("'{other}' is not a boolean")),
            },
            other => Err(format!("unsupported {}", value_kind(&other))),
        }
    }

    fn target(&self) -> &'static str {
        "bool"
    }
}

/// String cast. Scalars are rendered as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Str;

impl Cast for Str {
    fn cast(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::String(s) => Ok(Value::String(s)),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(format!("unsupported {}", value_kind(&other))),
        }
    }

    fn target(&self) -> &'static str {
        "str"
    }
}

/// Timestamp cast, stored as RFC 3339 text in UTC.
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD[ HH:MM:SS]` strings
/// (taken as UTC) and Unix timestamps in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Datetime;

impl Datetime {
    fn parse(text: &str) -> Result<DateTime<Utc>, String> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(naive.and_utc());
            }
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .ok_or_else(|| format!("'{text}' is not a recognized timestamp"))
    }
}

impl Cast for Datetime {
    fn cast(&self, value: Value) -> Result<Value, String> {
        let dt = match &value {
            Value::String(s) => Self::parse(s)?,
            Value::Number(n) => {
                let secs = n.as_f64().ok_or_else(|| format!("{n} is not representable"))?;
                let floor = secs.floor();
                let nanos = ((secs - floor) * 1e9).round() as u32;
                // Rounding can reach a full second.
                let (whole, nanos) = if nanos >= 1_000_000_000 {
                    (floor + 1.0, 0)
                } else {
                    (floor, nanos)
                };
                whole_i64(whole)
                    .and_then(|whole| DateTime::from_timestamp(whole, nanos))
                    .ok_or_else(|| format!("{n} is out of range"))?
            }
            other => return Err(format!("unsupported {}", value_kind(other))),
        };
        Ok(Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
    }

    fn target(&self) -> &'static str {
        "datetime"
    }
}

/// Lets `null` through unchanged and casts everything else with `C`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nullable<C>(pub C);

impl<C: Cast> Cast for Nullable<C> {
    fn cast(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::Null => Ok(Value::Null),
            other => self.0.cast(other),
        }
    }

    fn target(&self) -> &'static str {
        self.0.target()
    }
}

/// A cast backed by a closure.
pub struct FnCast<F> {
    target: &'static str,
    f: F,
}

impl<F> FnCast<F>
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync,
{
    pub fn new(target: &'static str, f: F) -> Self {
        Self { target, f }
    }
}

impl<F> Cast for FnCast<F>
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync,
{
    fn cast(&self, value: Value) -> Result<Value, String> {
        (self.f)(value)
    }

    fn target(&self) -> &'static str {
        self.target
    }
}

/// Look up a built-in cast by name: `int`, `float`, `bool`, `str`,
/// `datetime`, each optionally suffixed with `?` for the nullable variant.
pub fn builtin(name: &str) -> Option<Arc<dyn Cast>> {
    let (name, nullable) = match name.strip_suffix('?') {
        Some(inner) => (inner, true),
        None => (name, false),
    };
    let cast: Arc<dyn Cast> = match (name, nullable) {
        ("int", false) => Arc::new(Int),
        ("int", true) => Arc::new(Nullable(Int)),
        ("float", false) => Arc::new(Float),
        ("float", true) => Arc::new(Nullable(Float)),
        ("bool", false) => Arc::new(Bool),
        ("bool", true) => Arc::new(Nullable(Bool)),
        ("str", false) => Arc::new(Str),
        ("str", true) => Arc::new(Nullable(Str)),
        ("datetime", false) => Arc::new(Datetime),
        ("datetime", true) => Arc::new(Nullable(Datetime)),
        _ => return None,
    };
    Some(cast)
}

/// Registry of casts keyed by exact path.
#[derive(Clone, Default)]
pub struct Schema {
    casts: HashMap<KeyPath, Arc<dyn Cast>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Schema::register`].
    #[must_use]
    pub fn with(mut self, path: impl Into<KeyPath>, cast: impl Cast + 'static) -> Self {
        self.register(path, cast);
        self
    }

    /// Register `cast` for `path`, replacing any previous cast.
    pub fn register(&mut self, path: impl Into<KeyPath>, cast: impl Cast + 'static) {
        self.casts.insert(path.into(), Arc::new(cast));
    }

    /// Register an already shared cast, e.g. one returned by [`builtin`].
    pub fn register_shared(&mut self, path: impl Into<KeyPath>, cast: Arc<dyn Cast>) {
        self.casts.insert(path.into(), cast);
    }

    pub fn get(&self, path: &KeyPath) -> Option<&dyn Cast> {
        self.casts.get(path).map(|c| c.as_ref())
    }

    pub fn contains(&self, path: &KeyPath) -> bool {
        self.casts.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.casts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.casts.is_empty()
    }

    /// Cast `value` for `path`. Unregistered paths pass through.
    pub fn apply(&self, path: &KeyPath, value: Value) -> ConfigResult<Value> {
        let Some(cast) = self.casts.get(path) else {
            return Ok(value);
        };
        cast.cast(value.clone()).map_err(|reason| ConfigError::Cast {
            path: path.clone(),
            value,
            target: cast.target(),
            reason,
        })
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.casts.iter().map(|(k, c)| (k.to_string(), c.target())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_from_string() {
        assert_eq!(Int.cast(json!("8080")).unwrap(), json!(8080));
        assert_eq!(Int.cast(json!(" -3 ")).unwrap(), json!(-3));
        assert_eq!(Int.cast(json!(3.9)).unwrap(), json!(3));
        assert_eq!(Int.cast(json!(true)).unwrap(), json!(1));
        assert!(Int.cast(json!("xyz")).is_err());
        assert!(Int.cast(json!(1e20)).is_err());
        assert!(Int.cast(json!(-1e19)).is_err());
        assert_eq!(Int.cast(json!(-9.223372036854776e18)).unwrap(), json!(i64::MIN));
        assert!(Int.cast(json!(null)).is_err());
    }

    #[test]
    fn test_float() {
        assert_eq!(Float.cast(json!("1.5")).unwrap(), json!(1.5));
        assert_eq!(Float.cast(json!(2)).unwrap(), json!(2.0));
        assert!(Float.cast(json!([1])).is_err());
    }

    #[test]
    fn test_bool_spellings() {
        assert_eq!(Bool.cast(json!("Yes")).unwrap(), json!(true));
        assert_eq!(Bool.cast(json!("off")).unwrap(), json!(false));
        assert_eq!(Bool.cast(json!(0)).unwrap(), json!(false));
        assert!(Bool.cast(json!("maybe")).is_err());
    }

    #[test]
    fn test_str() {
        assert_eq!(Str.cast(json!(12)).unwrap(), json!("12"));
        assert_eq!(Str.cast(json!(false)).unwrap(), json!("false"));
        assert!(Str.cast(json!(null)).is_err());
    }

    #[test]
    fn test_datetime() {
        assert_eq!(
            Datetime.cast(json!("2024-01-17T10:30:00+02:00")).unwrap(),
            json!("2024-01-17T08:30:00Z")
        );
        assert_eq!(
            Datetime.cast(json!("2024-01-17")).unwrap(),
            json!("2024-01-17T00:00:00Z")
        );
        assert_eq!(Datetime.cast(json!(0)).unwrap(), json!("1970-01-01T00:00:00Z"));
        assert!(Datetime.cast(json!("yesterday")).is_err());
    }

    #[test]
    fn test_datetime_fractional_seconds() {
        assert_eq!(Datetime.cast(json!(-1.5)).unwrap(), json!("1969-12-31T23:59:58.500Z"));
        assert_eq!(Datetime.cast(json!(1.25)).unwrap(), json!("1970-01-01T00:00:01.250Z"));
        assert_eq!(Datetime.cast(json!(0.9999999999)).unwrap(), json!("1970-01-01T00:00:01Z"));
        assert!(Datetime.cast(json!(1e30)).is_err());
    }

    #[test]
    fn test_nullable() {
        assert_eq!(Nullable(Int).cast(json!(null)).unwrap(), json!(null));
        assert_eq!(Nullable(Int).cast(json!("4")).unwrap(), json!(4));
        assert_eq!(Nullable(Int).target(), "int");
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin("int").unwrap().target(), "int");
        assert_eq!(builtin("bool?").unwrap().cast(json!(null)).unwrap(), json!(null));
        assert!(builtin("bool").unwrap().cast(json!(null)).is_err());
        assert!(builtin("uuid").is_none());
    }

    #[test]
    fn test_schema_apply() {
        let schema = Schema::new().with("server.port", Int);
        let path = KeyPath::parse("server.port");
        assert_eq!(schema.apply(&path, json!("8080")).unwrap(), json!(8080));
        assert_eq!(
            schema.apply(&KeyPath::parse("server.host"), json!("x")).unwrap(),
            json!("x")
        );
    }

    #[test]
    fn test_schema_cast_error_names_path_value_target() {
        let schema = Schema::new().with("a", Int);
        match schema.apply(&KeyPath::parse("a"), json!("xyz")) {
            Err(ConfigError::Cast { path, value, target, .. }) => {
                assert_eq!(path, KeyPath::parse("a"));
                assert_eq!(value, json!("xyz"));
                assert_eq!(target, "int");
            }
            other => panic!("Expected Cast error, got {other:?}"),
        }
    }

    #[test]
    fn test_fn_cast() {
        let upper = FnCast::new("upper", |v: Value| match v {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            other => Err(format!("not a string: {other}")),
        });
        let schema = Schema::new().with("name", upper);
        assert_eq!(schema.apply(&KeyPath::parse("name"), json!("abc")).unwrap(), json!("ABC"));
    }
}
