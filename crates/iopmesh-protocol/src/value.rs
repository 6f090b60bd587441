//! Typed IOP values, best-effort conversions, and the wire codec.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{IopError, IopResult};

/// The declared type of an IOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Double,
    String,
    Bool,
    Impulsion,
    Data,
}

impl ValueType {
    pub const ALL: [ValueType; 6] = [
        ValueType::Integer,
        ValueType::Double,
        ValueType::String,
        ValueType::Bool,
        ValueType::Impulsion,
        ValueType::Data,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Impulsion => "impulsion",
            ValueType::Data => "data",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = IopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ValueType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == lowered)
            .ok_or_else(|| IopError::Serialization(format!("unknown value type: {s}")))
    }
}

/// A value held by an IOP. The variant always matches the IOP's [`ValueType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IopValue {
    Integer(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Impulsion,
    Data(Vec<u8>),
}

impl IopValue {
    /// Zero value for a type: 0, 0.0, "", false, impulsion, empty buffer.
    pub fn default_for(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Integer => IopValue::Integer(0),
            ValueType::Double => IopValue::Double(0.0),
            ValueType::String => IopValue::String(String::new()),
            ValueType::Bool => IopValue::Bool(false),
            ValueType::Impulsion => IopValue::Impulsion,
            ValueType::Data => IopValue::Data(Vec::new()),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            IopValue::Integer(_) => ValueType::Integer,
            IopValue::Double(_) => ValueType::Double,
            IopValue::String(_) => ValueType::String,
            IopValue::Bool(_) => ValueType::Bool,
            IopValue::Impulsion => ValueType::Impulsion,
            IopValue::Data(_) => ValueType::Data,
        }
    }

    /// Size in bytes of the wire representation.
    pub fn size(&self) -> usize {
        match self {
            IopValue::Integer(_) | IopValue::Double(_) => 8,
            IopValue::String(s) => s.len(),
            IopValue::Bool(_) => 1,
            IopValue::Impulsion => 0,
            IopValue::Data(bytes) => bytes.len(),
        }
    }

    fn conversion(&self, to: ValueType) -> IopError {
        IopError::Conversion {
            from: self.value_type(),
            to,
        }
    }

    pub fn as_int(&self) -> IopResult<i64> {
        match self {
            IopValue::Integer(i) => Ok(*i),
            IopValue::Double(d) => double_to_int(*d).ok_or_else(|| self.conversion(ValueType::Integer)),
            IopValue::Bool(b) => Ok(i64::from(*b)),
            IopValue::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(i);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(double_to_int)
                    .ok_or_else(|| self.conversion(ValueType::Integer))
            }
            IopValue::Impulsion | IopValue::Data(_) => Err(self.conversion(ValueType::Integer)),
        }
    }

    pub fn as_double(&self) -> IopResult<f64> {
        match self {
            IopValue::Integer(i) => Ok(*i as f64),
            IopValue::Double(d) => Ok(*d),
            IopValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            IopValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.conversion(ValueType::Double)),
            IopValue::Impulsion | IopValue::Data(_) => Err(self.conversion(ValueType::Double)),
        }
    }

    pub fn as_bool(&self) -> IopResult<bool> {
        match self {
            IopValue::Integer(i) => Ok(*i != 0),
            IopValue::Double(d) => Ok(*d != 0.0),
            IopValue::Bool(b) => Ok(*b),
            IopValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    trimmed
                        .parse::<f64>()
                        .map(|d| d != 0.0)
                        .map_err(|_| self.conversion(ValueType::Bool))
                }
            }
            IopValue::Impulsion | IopValue::Data(_) => Err(self.conversion(ValueType::Bool)),
        }
    }

    pub fn as_string(&self) -> IopResult<String> {
        match self {
            IopValue::Integer(i) => Ok(i.to_string()),
            IopValue::Double(d) => Ok(d.to_string()),
            IopValue::Bool(b) => Ok(b.to_string()),
            IopValue::String(s) => Ok(s.clone()),
            IopValue::Impulsion => Ok(String::new()),
            IopValue::Data(_) => Err(self.conversion(ValueType::String)),
        }
    }

    /// Raw bytes of the value, identical to its wire form.
    pub fn as_data(&self) -> Vec<u8> {
        self.to_wire()
    }

    /// Best-effort conversion into another type. Anything converts to an impulsion.
    pub fn convert_to(&self, target: ValueType) -> IopResult<IopValue> {
        if self.value_type() == target {
            return Ok(self.clone());
        }
        Ok(match target {
            ValueType::Integer => IopValue::Integer(self.as_int()?),
            ValueType::Double => IopValue::Double(self.as_double()?),
            ValueType::String => IopValue::String(self.as_string()?),
            ValueType::Bool => IopValue::Bool(self.as_bool()?),
            ValueType::Impulsion => IopValue::Impulsion,
            ValueType::Data => IopValue::Data(self.as_data()),
        })
    }

    /// Encode for the transport: little-endian 8 bytes for numbers, UTF-8 for
    /// strings, one byte for bools, nothing for impulsions, raw data as is.
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            IopValue::Integer(i) => i.to_le_bytes().to_vec(),
            IopValue::Double(d) => d.to_le_bytes().to_vec(),
            IopValue::String(s) => s.as_bytes().to_vec(),
            IopValue::Bool(b) => vec![u8::from(*b)],
            IopValue::Impulsion => Vec::new(),
            IopValue::Data(bytes) => bytes.clone(),
        }
    }

    pub fn from_wire(value_type: ValueType, payload: &[u8]) -> IopResult<IopValue> {
        let malformed = || IopError::Conversion {
            from: ValueType::Data,
            to: value_type,
        };
        match value_type {
            ValueType::Integer => {
                let bytes: [u8; 8] = payload.try_into().map_err(|_| malformed())?;
                Ok(IopValue::Integer(i64::from_le_bytes(bytes)))
            }
            ValueType::Double => {
                let bytes: [u8; 8] = payload.try_into().map_err(|_| malformed())?;
                Ok(IopValue::Double(f64::from_le_bytes(bytes)))
            }
            ValueType::String => String::from_utf8(payload.to_vec())
                .map(IopValue::String)
                .map_err(|_| malformed()),
            ValueType::Bool => match payload {
                [byte] => Ok(IopValue::Bool(*byte != 0)),
                _ => Err(malformed()),
            },
            ValueType::Impulsion => Ok(IopValue::Impulsion),
            ValueType::Data => Ok(IopValue::Data(payload.to_vec())),
        }
    }
}

/// `i64::MAX as f64` rounds up to 2^63, which is already out of range.
fn double_to_int(d: f64) -> Option<i64> {
    let rounded = d.round();
    (rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64)
        .then_some(rounded as i64)
}

impl From<i64> for IopValue {
    fn from(value: i64) -> Self {
        IopValue::Integer(value)
    }
}

impl From<f64> for IopValue {
    fn from(value: f64) -> Self {
        IopValue::Double(value)
    }
}

impl From<bool> for IopValue {
    fn from(value: bool) -> Self {
        IopValue::Bool(value)
    }
}

impl From<&str> for IopValue {
    fn from(value: &str) -> Self {
        IopValue::String(value.to_owned())
    }
}

impl From<String> for IopValue {
    fn from(value: String) -> Self {
        IopValue::String(value)
    }
}

impl From<Vec<u8>> for IopValue {
    fn from(value: Vec<u8>) -> Self {
        IopValue::Data(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_parses_case_insensitively() {
        assert_eq!("INTEGER".parse::<ValueType>().unwrap(), ValueType::Integer);
        assert_eq!(" impulsion ".parse::<ValueType>().unwrap(), ValueType::Impulsion);
        assert!("float".parse::<ValueType>().is_err());
    }

    #[test]
    fn integer_reads_as_string_in_decimal() {
        assert_eq!(IopValue::Integer(-42).as_string().unwrap(), "-42");
    }

    #[test]
    fn non_numeric_string_fails_int_conversion() {
        let err = IopValue::from("hello").as_int().unwrap_err();
        assert_eq!(
            err,
            IopError::Conversion {
                from: ValueType::String,
                to: ValueType::Integer
            }
        );
    }

    #[test]
    fn numeric_strings_convert() {
        assert_eq!(IopValue::from(" 12 ").as_int().unwrap(), 12);
        assert_eq!(IopValue::from("2.6").as_int().unwrap(), 3);
        assert_eq!(IopValue::from("0.25").as_double().unwrap(), 0.25);
        assert!(IopValue::from("TRUE").as_bool().unwrap());
        assert!(!IopValue::from("0").as_bool().unwrap());
    }

    #[test]
    fn double_to_int_rounds_and_rejects_nan() {
        assert_eq!(IopValue::Double(1.4).as_int().unwrap(), 1);
        assert_eq!(IopValue::Double(-1.6).as_int().unwrap(), -2);
        assert!(IopValue::Double(f64::NAN).as_int().is_err());
    }

    #[test]
    fn double_to_int_rejects_values_past_i64_range() {
        let two_pow_63 = 9_223_372_036_854_775_808.0_f64;
        assert_eq!(
            IopValue::Double(two_pow_63).as_int(),
            Err(IopError::Conversion {
                from: ValueType::Double,
                to: ValueType::Integer
            })
        );
        assert!(IopValue::from("9223372036854775808.0").as_int().is_err());
        assert_eq!(IopValue::Double(-two_pow_63).as_int().unwrap(), i64::MIN);
        assert_eq!(
            IopValue::Double(9_223_372_036_854_774_784.0).as_int().unwrap(),
            9_223_372_036_854_774_784
        );
    }

    #[test]
    fn data_does_not_convert_to_scalars() {
        let data = IopValue::Data(vec![1, 2, 3]);
        assert!(data.as_int().is_err());
        assert!(data.as_string().is_err());
        assert_eq!(data.as_data(), vec![1, 2, 3]);
    }

    #[test]
    fn anything_converts_to_impulsion() {
        for value in [IopValue::Integer(3), IopValue::from("x"), IopValue::Data(vec![9])] {
            assert_eq!(value.convert_to(ValueType::Impulsion).unwrap(), IopValue::Impulsion);
        }
    }

    #[test]
    fn wire_form_preserves_values_exactly() {
        let values = [
            IopValue::Integer(i64::MIN),
            IopValue::Double(0.1 + 0.2),
            IopValue::from("héllo wörld"),
            IopValue::Bool(true),
            IopValue::Impulsion,
            IopValue::Data(vec![0, 255, 7, 0]),
        ];
        for value in values {
            let wire = value.to_wire();
            assert_eq!(wire.len(), value.size());
            let back = IopValue::from_wire(value.value_type(), &wire).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn truncated_wire_payload_is_rejected() {
        assert!(IopValue::from_wire(ValueType::Integer, &[1, 2, 3]).is_err());
        assert!(IopValue::from_wire(ValueType::Bool, &[]).is_err());
        assert!(IopValue::from_wire(ValueType::String, &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn value_serde_is_adjacently_tagged() {
        let json = serde_json::to_string(&IopValue::Integer(5)).unwrap();
        assert_eq!(json, r#"{"type":"integer","value":5}"#);
        let back: IopValue = serde_json::from_str(r#"{"type":"impulsion"}"#).unwrap();
        assert_eq!(back, IopValue::Impulsion);
    }
}
