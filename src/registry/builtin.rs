//! Built-in scalar codecs and the default registrations.
//!
//! Lexical forms follow XML Schema Part 2: booleans accept `true/false/1/0`,
//! floating point accepts `INF`, `-INF` and `NaN`, binary data is base64 or
//! hex. Non-string types are whitespace-collapsed before parsing.

use base64::Engine;

use super::{DecoderFactory, EncoderFactory, TypeRegistry};
use crate::namespace::NamespacePrefixStack;
use crate::options::{SoapVersion, LITERAL_STYLE};
use crate::qname::QName;
use crate::value::{Value, ValueShape};
use crate::{Error, Result};

fn invalid(kind: &str, text: &str) -> Error {
    Error::conversion(format!("'{text}' is not a valid {kind}"))
}

fn wrong_value(kind: &str, value: &Value) -> Error {
    Error::conversion(format!("cannot format {value:?} as {kind}"))
}

// ============================================================================
// Parser
// ============================================================================

pub fn parse_string(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    Ok(Value::String(text.to_string()))
}

pub fn parse_boolean(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    match text.trim() {
        "true" | "1" => Ok(Value::Boolean(true)),
        "false" | "0" => Ok(Value::Boolean(false)),
        other => Err(invalid("xsd:boolean", other)),
    }
}

pub fn parse_byte(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    t.parse().map(Value::Byte).map_err(|_| invalid("xsd:byte", t))
}

pub fn parse_short(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    t.parse().map(Value::Short).map_err(|_| invalid("xsd:short", t))
}

pub fn parse_int(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    t.parse().map(Value::Int).map_err(|_| invalid("xsd:int", t))
}

pub fn parse_long(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    t.parse().map(Value::Long).map_err(|_| invalid("xsd:long", t))
}

pub fn parse_float(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    let v = match t {
        "INF" => f32::INFINITY,
        "-INF" => f32::NEG_INFINITY,
        "NaN" => f32::NAN,
        _ => t.parse().map_err(|_| invalid("xsd:float", t))?,
    };
    Ok(Value::Float(v))
}

pub fn parse_double(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    let v = match t {
        "INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        _ => t.parse().map_err(|_| invalid("xsd:double", t))?,
    };
    Ok(Value::Double(v))
}

pub fn parse_decimal(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    let unsigned = t.strip_prefix(['+', '-']).unwrap_or(t);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.len() + frac_part.len() == 0 || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid("xsd:decimal", t));
    }
    Ok(Value::Decimal(t.to_string()))
}

pub fn parse_base64(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map(Value::Bytes)
        .map_err(|_| invalid("xsd:base64Binary", text.trim()))
}

pub fn parse_hex(text: &str, _ns: &NamespacePrefixStack) -> Result<Value> {
    let t = text.trim();
    if !t.len().is_multiple_of(2) {
        return Err(invalid("xsd:hexBinary", t));
    }
    let mut bytes = Vec::with_capacity(t.len() / 2);
    for pair in t.as_bytes().chunks(2) {
        let digits = std::str::from_utf8(pair).map_err(|_| invalid("xsd:hexBinary", t))?;
        let byte = u8::from_str_radix(digits, 16).map_err(|_| invalid("xsd:hexBinary", t))?;
        bytes.push(byte);
    }
    Ok(Value::Bytes(bytes))
}

/// QName-Inhalt wird gegen die aktuellen Prefix-Bindungen aufgelöst.
pub fn parse_qname(text: &str, ns: &NamespacePrefixStack) -> Result<Value> {
    ns.resolve(text).map(Value::QName)
}

// ============================================================================
// Formatter
// ============================================================================

pub fn format_string(value: &Value, _ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(wrong_value("xsd:string", other)),
    }
}

pub fn format_boolean(value: &Value, _ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::Boolean(b) => Ok(b.to_string()),
        other => Err(wrong_value("xsd:boolean", other)),
    }
}

/// Formats every integer variant; narrower values widen losslessly.
pub fn format_integer(value: &Value, _ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::Byte(v) => Ok(v.to_string()),
        Value::Short(v) => Ok(v.to_string()),
        Value::Int(v) => Ok(v.to_string()),
        Value::Long(v) => Ok(v.to_string()),
        other => Err(wrong_value("integer", other)),
    }
}

fn format_f64(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "INF".to_string()
    } else if v == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        v.to_string()
    }
}

pub fn format_float(value: &Value, _ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::Float(v) if v.is_nan() => Ok("NaN".to_string()),
        Value::Float(v) if v.is_infinite() => Ok(format_f64(f64::from(*v))),
        Value::Float(v) => Ok(v.to_string()),
        other => Err(wrong_value("xsd:float", other)),
    }
}

pub fn format_double(value: &Value, ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::Double(v) => Ok(format_f64(*v)),
        Value::Float(_) => format_float(value, ns),
        other => Err(wrong_value("xsd:double", other)),
    }
}

pub fn format_decimal(value: &Value, ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::Decimal(s) => Ok(s.clone()),
        Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) => format_integer(value, ns),
        other => Err(wrong_value("xsd:decimal", other)),
    }
}

pub fn format_base64(value: &Value, _ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::Bytes(bytes) => Ok(base64::engine::general_purpose::STANDARD.encode(bytes)),
        other => Err(wrong_value("xsd:base64Binary", other)),
    }
}

pub fn format_hex(value: &Value, _ns: &NamespacePrefixStack) -> Result<String> {
    use std::fmt::Write;
    match value {
        Value::Bytes(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2);
            for b in bytes {
                let _ = write!(out, "{b:02X}");
            }
            Ok(out)
        }
        other => Err(wrong_value("xsd:hexBinary", other)),
    }
}

/// Benötigt eine Prefix-Bindung für den Namespace des Werts; der Encoder
/// deklariert sie vor dem Start-Tag.
pub fn format_qname(value: &Value, ns: &NamespacePrefixStack) -> Result<String> {
    match value {
        Value::QName(q) if q.uri.is_empty() => Ok(q.local_name.to_string()),
        Value::QName(q) => match ns.get_prefix(&q.uri, true) {
            Some(prefix) => Ok(format!("{prefix}:{}", q.local_name)),
            None => Err(Error::UnresolvablePrefix(q.uri.to_string())),
        },
        other => Err(wrong_value("xsd:QName", other)),
    }
}

// ============================================================================
// Default-Registrierungen
// ============================================================================

type ScalarPair = (
    ValueShape,
    &'static str,
    super::ScalarParser,
    super::ScalarFormatter,
);

/// XSD-Typen mit eigenem Value-Shape (Encode- und Decode-Richtung).
const XSD_PRIMARY: &[ScalarPair] = &[
    (ValueShape::String, "string", parse_string, format_string),
    (ValueShape::Boolean, "boolean", parse_boolean, format_boolean),
    (ValueShape::Byte, "byte", parse_byte, format_integer),
    (ValueShape::Short, "short", parse_short, format_integer),
    (ValueShape::Int, "int", parse_int, format_integer),
    (ValueShape::Long, "long", parse_long, format_integer),
    (ValueShape::Float, "float", parse_float, format_float),
    (ValueShape::Double, "double", parse_double, format_double),
    (ValueShape::Decimal, "decimal", parse_decimal, format_decimal),
    (ValueShape::Bytes, "base64Binary", parse_base64, format_base64),
    (ValueShape::QName, "QName", parse_qname, format_qname),
];

/// Zusätzliche XSD-Namen, die nur auf Decode-Seite indiziert werden.
const XSD_ALIASES: &[ScalarPair] = &[
    (ValueShape::Long, "integer", parse_long, format_integer),
    (ValueShape::Bytes, "hexBinary", parse_hex, format_hex),
    (ValueShape::String, "normalizedString", parse_string, format_string),
    (ValueShape::String, "token", parse_string, format_string),
    (ValueShape::String, "anyURI", parse_string, format_string),
];

/// SOAP-ENC Elementtypen (`soapenc:string`, ...), decode-only.
const ENC_ALIASES: &[ScalarPair] = &[
    (ValueShape::String, "string", parse_string, format_string),
    (ValueShape::Boolean, "boolean", parse_boolean, format_boolean),
    (ValueShape::Byte, "byte", parse_byte, format_integer),
    (ValueShape::Short, "short", parse_short, format_integer),
    (ValueShape::Int, "int", parse_int, format_integer),
    (ValueShape::Long, "long", parse_long, format_integer),
    (ValueShape::Float, "float", parse_float, format_float),
    (ValueShape::Double, "double", parse_double, format_double),
    (ValueShape::Decimal, "decimal", parse_decimal, format_decimal),
    (ValueShape::Bytes, "base64", parse_base64, format_base64),
    (ValueShape::Bytes, "base64Binary", parse_base64, format_base64),
];

/// Fills `registry` with the XSD scalars (literal scope) and, for both SOAP
/// versions, the encoding-namespace scalars plus `Array` and `Struct`.
pub(super) fn register_defaults(registry: &mut TypeRegistry) {
    let literal = registry.get_or_create_mapping(LITERAL_STYLE);
    for (shape, local, parse, format) in XSD_PRIMARY {
        literal.register(
            shape.clone(),
            QName::xsd(local),
            EncoderFactory::Scalar(*format),
            DecoderFactory::Scalar(*parse),
        );
    }
    for (shape, local, parse, format) in XSD_ALIASES {
        literal.register_alias(
            shape.clone(),
            QName::xsd(local),
            EncoderFactory::Scalar(*format),
            DecoderFactory::Scalar(*parse),
        );
    }

    for version in [SoapVersion::V11, SoapVersion::V12] {
        let enc_ns = version.encoding_ns();
        let mapping = registry.get_or_create_mapping(enc_ns);
        for (shape, local, parse, format) in ENC_ALIASES {
            mapping.register_alias(
                shape.clone(),
                QName::new(enc_ns, *local),
                EncoderFactory::Scalar(*format),
                DecoderFactory::Scalar(*parse),
            );
        }
        mapping.register(
            ValueShape::Array,
            version.array_type_name(),
            EncoderFactory::Array,
            DecoderFactory::Array,
        );
        mapping.register(
            ValueShape::Struct(None),
            version.struct_type_name(),
            EncoderFactory::Struct(None),
            DecoderFactory::Struct(None),
        );
    }
}
