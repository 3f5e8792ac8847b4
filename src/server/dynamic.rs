//! Conversion between the host's `DynamicValue` encoding and [`Object`]s.
//!
//! The host sends objects as msgpack maps. A value that is not known until
//! apply is a msgpack extension; only top-level attributes of a block can be
//! unknown here, so they are tracked by name next to the decoded object.

use std::collections::BTreeSet;

use rmpv::Value as Msgpack;
use serde_json::Value;

use crate::framework::Object;
use crate::proto::tfplugin6::DynamicValue;

/// Extension codes marking an unknown value; 12 carries refinements.
const UNKNOWN_EXT: i8 = 0;
const REFINED_UNKNOWN_EXT: i8 = 12;

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("invalid msgpack value: {0}")]
    Msgpack(#[from] rmpv::decode::Error),
    #[error("invalid json value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected an object, found {0}")]
    NotAnObject(String),
    #[error("unsupported value: {0}")]
    Unsupported(String),
}

/// A decoded block value: `None` when the host sent null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub object: Option<Object>,
    /// Attributes whose value is unknown. They are absent from `object`.
    pub unknown: BTreeSet<String>,
}

impl Decoded {
    /// The object, or an empty one for null.
    pub fn into_object(self) -> Object {
        self.object.unwrap_or_default()
    }
}

fn is_unknown(value: &Msgpack) -> bool {
    matches!(value, Msgpack::Ext(code, _) if *code == UNKNOWN_EXT || *code == REFINED_UNKNOWN_EXT)
}

fn unknown_value() -> Msgpack {
    Msgpack::Ext(UNKNOWN_EXT, vec![0])
}

pub fn decode(value: Option<&DynamicValue>) -> Result<Decoded, ValueError> {
    let Some(value) = value else {
        return Ok(Decoded::default());
    };
    if !value.msgpack.is_empty() {
        let root = rmpv::decode::read_value(&mut value.msgpack.as_slice())?;
        return decode_root(root);
    }
    if !value.json.is_empty() {
        return decode_json(&value.json);
    }
    Ok(Decoded::default())
}

/// Decodes a JSON object, as found in stored state.
pub fn decode_json(bytes: &[u8]) -> Result<Decoded, ValueError> {
    match serde_json::from_slice(bytes)? {
        Value::Null => Ok(Decoded::default()),
        Value::Object(object) => Ok(Decoded {
            object: Some(object),
            unknown: BTreeSet::new(),
        }),
        other => Err(ValueError::NotAnObject(other.to_string())),
    }
}

fn decode_root(root: Msgpack) -> Result<Decoded, ValueError> {
    let entries = match root {
        Msgpack::Nil => return Ok(Decoded::default()),
        Msgpack::Map(entries) => entries,
        other => return Err(ValueError::NotAnObject(other.to_string())),
    };

    let mut object = Object::new();
    let mut unknown = BTreeSet::new();
    for (key, value) in entries {
        let key = decode_key(key)?;
        if is_unknown(&value) {
            unknown.insert(key);
        } else {
            object.insert(key, to_json(value)?);
        }
    }
    Ok(Decoded {
        object: Some(object),
        unknown,
    })
}

fn decode_key(key: Msgpack) -> Result<String, ValueError> {
    match key {
        Msgpack::String(key) => key
            .into_str()
            .ok_or_else(|| ValueError::Unsupported("attribute name is not UTF-8".into())),
        other => Err(ValueError::Unsupported(format!("attribute name {other}"))),
    }
}

fn to_json(value: Msgpack) -> Result<Value, ValueError> {
    Ok(match value {
        Msgpack::Nil => Value::Null,
        Msgpack::Boolean(b) => Value::Bool(b),
        Msgpack::Integer(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Value::from(i),
            (None, Some(u)) => Value::from(u),
            (None, None) => return Err(ValueError::Unsupported(n.to_string())),
        },
        Msgpack::F32(f) => float(f64::from(f))?,
        Msgpack::F64(f) => float(f)?,
        Msgpack::String(s) => Value::String(
            s.into_str()
                .ok_or_else(|| ValueError::Unsupported("string is not UTF-8".into()))?,
        ),
        Msgpack::Array(items) => Value::Array(items.into_iter().map(to_json).collect::<Result<_, _>>()?),
        Msgpack::Map(entries) => {
            let mut object = Object::new();
            for (key, value) in entries {
                // Nested unknowns have no slot of their own
                let value = if is_unknown(&value) { Value::Null } else { to_json(value)? };
                object.insert(decode_key(key)?, value);
            }
            Value::Object(object)
        }
        ext @ Msgpack::Ext(..) if is_unknown(&ext) => Value::Null,
        other => return Err(ValueError::Unsupported(other.to_string())),
    })
}

fn float(f: f64) -> Result<Value, ValueError> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ValueError::Unsupported(f.to_string()))
}

fn from_json(value: &Value) -> Msgpack {
    match value {
        Value::Null => Msgpack::Nil,
        Value::Bool(b) => Msgpack::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Msgpack::from(i),
            (None, Some(u)) => Msgpack::from(u),
            (None, None) => Msgpack::F64(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Msgpack::from(s.as_str()),
        Value::Array(items) => Msgpack::Array(items.iter().map(from_json).collect()),
        Value::Object(object) => Msgpack::Map(
            object
                .iter()
                .map(|(key, value)| (Msgpack::from(key.as_str()), from_json(value)))
                .collect(),
        ),
    }
}

/// Encodes `object` as msgpack, writing the `unknown` attributes as unknown
/// values whether or not `object` holds them.
pub fn encode(object: Option<&Object>, unknown: &BTreeSet<String>) -> Result<DynamicValue, ValueError> {
    let root = match object {
        None => Msgpack::Nil,
        Some(object) => {
            let known = object
                .iter()
                .filter(|(name, _)| !unknown.contains(name.as_str()))
                .map(|(name, value)| (Msgpack::from(name.as_str()), from_json(value)));
            let pending = unknown
                .iter()
                .map(|name| (Msgpack::from(name.as_str()), unknown_value()));
            Msgpack::Map(known.chain(pending).collect())
        }
    };

    let mut msgpack = Vec::new();
    rmpv::encode::write_value(&mut msgpack, &root)
        .map_err(|err| ValueError::Unsupported(err.to_string()))?;
    Ok(DynamicValue {
        msgpack,
        json: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Object {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn raw(value: &Msgpack) -> DynamicValue {
        let mut msgpack = Vec::new();
        rmpv::encode::write_value(&mut msgpack, value).unwrap();
        DynamicValue {
            msgpack,
            json: Vec::new(),
        }
    }

    #[test]
    fn test_decodes_host_object() {
        let value = raw(&Msgpack::Map(vec![
            (Msgpack::from("text"), Msgpack::from("qrcode")),
            (Msgpack::from("size"), Msgpack::from(300)),
            (Msgpack::from("invert"), Msgpack::Boolean(true)),
            (Msgpack::from("sensitive_text"), Msgpack::Nil),
            (Msgpack::from("sha256"), Msgpack::Ext(0, vec![0])),
        ]));
        let decoded = decode(Some(&value)).unwrap();
        assert_eq!(
            Value::Object(decoded.object.unwrap()),
            json!({"text": "qrcode", "size": 300, "invert": true, "sensitive_text": null})
        );
        assert_eq!(decoded.unknown, ["sha256".to_string()].into());
    }

    #[test]
    fn test_unknown_bytes_match_host_encoding() {
        let value = encode(Some(&Object::new()), &["sha256".to_string()].into()).unwrap();
        // fixmap(1), fixstr "sha256", fixext1 type 0
        let mut expected = vec![0x81, 0xa6];
        expected.extend_from_slice(b"sha256");
        expected.extend_from_slice(&[0xd4, 0x00, 0x00]);
        assert_eq!(value.msgpack, expected);
    }

    #[test]
    fn test_refined_unknown() {
        let value = raw(&Msgpack::Map(vec![(
            Msgpack::from("text"),
            Msgpack::Ext(12, vec![0x80]),
        )]));
        let decoded = decode(Some(&value)).unwrap();
        assert!(decoded.object.unwrap().is_empty());
        assert!(decoded.unknown.contains("text"));
    }

    #[test]
    fn test_null_and_missing() {
        assert_eq!(decode(None).unwrap(), Decoded::default());
        assert_eq!(decode(Some(&raw(&Msgpack::Nil))).unwrap(), Decoded::default());
        let encoded = encode(None, &BTreeSet::new()).unwrap();
        assert_eq!(encoded.msgpack, vec![0xc0]);
    }

    #[test]
    fn test_round_trip_keeps_unknowns() {
        let state = object(json!({"text": "qrcode", "size": 256, "file": "qr.png", "sha256": null}));
        let unknown: BTreeSet<String> = ["sha256".to_string()].into();
        let decoded = decode(Some(&encode(Some(&state), &unknown).unwrap())).unwrap();
        assert_eq!(decoded.unknown, unknown);
        assert_eq!(
            Value::Object(decoded.into_object()),
            json!({"text": "qrcode", "size": 256, "file": "qr.png"})
        );
    }

    #[test]
    fn test_json_fallback() {
        let value = DynamicValue {
            msgpack: Vec::new(),
            json: br#"{"text":"qrcode"}"#.to_vec(),
        };
        assert_eq!(decode(Some(&value)).unwrap().into_object()["text"], json!("qrcode"));
        assert!(matches!(decode_json(b"[1]"), Err(ValueError::NotAnObject(_))));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(matches!(
            decode(Some(&raw(&Msgpack::from("text")))),
            Err(ValueError::NotAnObject(_))
        ));
    }
}
