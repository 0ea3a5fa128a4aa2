//! AppleScript record-literal encoding.
//!
//! Any `Serialize` value made of strings, numbers, booleans, nested structs
//! and sequences can be turned into the literal syntax UTM's scripting
//! dictionary accepts:
//!
//! ```text
//! {name: "vm", memory: 1024, drives: {{removable: true, source: drive0}}}
//! ```
//!
//! Record keys come from the serde field names, so `#[serde(rename = "cpu cores")]`
//! is the field-to-key table. Struct fields holding their zero value (empty
//! string, `0`, `false`, empty sequence, `None`) are left out so UTM applies
//! its own defaults. Unit enum variants become bare constants (`mode: shared`).

use crate::error::EncodeError;
use serde::ser::{self, Impossible, Serialize};

/// Newtype-struct name marking a script variable reference.
pub(crate) const SCRIPT_VARIABLE: &str = "$utm_vm::record::ScriptVariable";

/// Newtype-struct name marking a host path that was never bound to a variable.
pub(crate) const HOST_PATH: &str = "$utm_vm::record::HostPath";

/// Literal emitted for an absent value that cannot be omitted.
const MISSING_VALUE: &str = "missing value";

/// Encode a value as an AppleScript literal.
///
/// # Errors
/// Returns an error for maps, byte arrays, data-carrying enum variants and
/// drive sources that still point at a host path.
pub fn to_record_string<T>(value: &T) -> Result<String, EncodeError>
where
    T: ?Sized + Serialize,
{
    Ok(value.serialize(Encoder)?.text)
}

/// Quote a string for use inside a script.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Reverse of [`quote`]. Returns `None` if `s` is not a quoted literal.
fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            other => out.push(other),
        }
    }
    Some(out)
}

/// Whether `name` can be used as a bare script identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An encoded value plus whether it is the zero value of its kind.
struct Literal {
    text: String,
    empty: bool,
}

impl Literal {
    fn new(text: impl Into<String>, empty: bool) -> Self {
        Self {
            text: text.into(),
            empty,
        }
    }

    fn missing() -> Self {
        Self::new(MISSING_VALUE, true)
    }
}

struct Encoder;

impl ser::Serializer for Encoder {
    type Ok = Literal;
    type Error = EncodeError;

    type SerializeSeq = ListEncoder;
    type SerializeTuple = ListEncoder;
    type SerializeTupleStruct = ListEncoder;
    type SerializeTupleVariant = Impossible<Literal, EncodeError>;
    type SerializeMap = Impossible<Literal, EncodeError>;
    type SerializeStruct = RecordEncoder;
    type SerializeStructVariant = Impossible<Literal, EncodeError>;

    fn serialize_bool(self, v: bool) -> Result<Literal, EncodeError> {
        Ok(Literal::new(v.to_string(), !v))
    }

    fn serialize_i8(self, v: i8) -> Result<Literal, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Literal, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Literal, EncodeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Literal, EncodeError> {
        Ok(Literal::new(v.to_string(), v == 0))
    }

    fn serialize_u8(self, v: u8) -> Result<Literal, EncodeError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Literal, EncodeError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Literal, EncodeError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Literal, EncodeError> {
        Ok(Literal::new(v.to_string(), v == 0))
    }

    fn serialize_f32(self, v: f32) -> Result<Literal, EncodeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Literal, EncodeError> {
        Ok(Literal::new(format!("{v:.6}"), v == 0.0))
    }

    fn serialize_char(self, v: char) -> Result<Literal, EncodeError> {
        self.serialize_str(v.encode_utf8(&mut [0u8; 4]))
    }

    fn serialize_str(self, v: &str) -> Result<Literal, EncodeError> {
        Ok(Literal::new(quote(v), v.is_empty()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Literal, EncodeError> {
        Err(EncodeError::Unsupported("bytes"))
    }

    fn serialize_none(self) -> Result<Literal, EncodeError> {
        Ok(Literal::missing())
    }

    fn serialize_some<T>(self, value: &T) -> Result<Literal, EncodeError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Literal, EncodeError> {
        Ok(Literal::missing())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Literal, EncodeError> {
        Ok(Literal::missing())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Literal, EncodeError> {
        Ok(Literal::new(variant, false))
    }

    fn serialize_newtype_struct<T>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Literal, EncodeError>
    where
        T: ?Sized + Serialize,
    {
        match name {
            SCRIPT_VARIABLE => {
                let inner = value.serialize(Encoder)?;
                match unquote(&inner.text) {
                    Some(ident) if is_identifier(&ident) => Ok(Literal::new(ident, false)),
                    _ => Err(EncodeError::Custom(format!(
                        "invalid script variable name: {}",
                        inner.text
                    ))),
                }
            }
            HOST_PATH => {
                let inner = value.serialize(Encoder)?;
                let path = unquote(&inner.text).unwrap_or(inner.text);
                Err(EncodeError::UnboundSource(path.into()))
            }
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Literal, EncodeError>
    where
        T: ?Sized + Serialize,
    {
        Err(EncodeError::Unsupported("newtype variant"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<ListEncoder, EncodeError> {
        Ok(ListEncoder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<ListEncoder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<ListEncoder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, EncodeError> {
        Err(EncodeError::Unsupported("tuple variant"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, EncodeError> {
        Err(EncodeError::Unsupported("map"))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<RecordEncoder, EncodeError> {
        Ok(RecordEncoder {
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, EncodeError> {
        Err(EncodeError::Unsupported("struct variant"))
    }
}

/// Collects list elements. Elements are emitted even when zero-valued.
struct ListEncoder {
    items: Vec<String>,
}

impl ListEncoder {
    fn push<T>(&mut self, value: &T) -> Result<(), EncodeError>
    where
        T: ?Sized + Serialize,
    {
        self.items.push(value.serialize(Encoder)?.text);
        Ok(())
    }

    fn finish(self) -> Literal {
        let empty = self.items.is_empty();
        Literal::new(format!("{{{}}}", self.items.join(", ")), empty)
    }
}

impl ser::SerializeSeq for ListEncoder {
    type Ok = Literal;
    type Error = EncodeError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), EncodeError>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Literal, EncodeError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for ListEncoder {
    type Ok = Literal;
    type Error = EncodeError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), EncodeError>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Literal, EncodeError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for ListEncoder {
    type Ok = Literal;
    type Error = EncodeError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), EncodeError>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Literal, EncodeError> {
        Ok(self.finish())
    }
}

/// Collects `key: value` pairs, dropping zero-valued fields.
struct RecordEncoder {
    fields: Vec<String>,
}

impl ser::SerializeStruct for RecordEncoder {
    type Ok = Literal;
    type Error = EncodeError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), EncodeError>
    where
        T: ?Sized + Serialize,
    {
        let literal = value.serialize(Encoder)?;
        if !literal.empty {
            self.fields.push(format!("{key}: {}", literal.text));
        }
        Ok(())
    }

    fn end(self) -> Result<Literal, EncodeError> {
        // A record is never treated as empty, even with every field omitted.
        Ok(Literal::new(format!("{{{}}}", self.fields.join(", ")), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DriveConfiguration, DriveInterface, DriveSource, NetworkConfiguration, NetworkMode,
        PortForwardingConfiguration, PortProtocol, QemuConfiguration,
    };
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[test]
    fn test_only_non_zero_fields_are_emitted() {
        let drive = DriveConfiguration {
            id: "123".into(),
            ..Default::default()
        };
        assert_eq!(to_record_string(&drive).unwrap(), r#"{id: "123"}"#);
    }

    #[test]
    fn test_zero_valued_keys_never_appear() {
        let config = QemuConfiguration {
            name: "vm".into(),
            memory: 0,
            cpu_cores: 0,
            uefi: false,
            ..Default::default()
        };
        let out = to_record_string(&config).unwrap();
        assert_eq!(out, r#"{name: "vm"}"#);
        for key in ["notes", "memory", "cpu cores", "uefi", "drives", "network interfaces"] {
            assert!(!out.contains(key), "{key} should be omitted: {out}");
        }
    }

    #[test]
    fn test_nested_list_of_drives() {
        let config = QemuConfiguration {
            name: "boot2docker".into(),
            architecture: "x86_64".into(),
            memory: 1024,
            cpu_cores: 1,
            drives: vec![
                DriveConfiguration {
                    removable: true,
                    source: DriveSource::variable("drive0"),
                    ..Default::default()
                },
                DriveConfiguration {
                    guest_size: 8192,
                    ..Default::default()
                },
            ],
            network_interfaces: vec![NetworkConfiguration {
                mode: Some(NetworkMode::Shared),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(
            to_record_string(&config).unwrap(),
            "{name: \"boot2docker\", architecture: \"x86_64\", memory: 1024, cpu cores: 1, \
             drives: {{removable: true, source: drive0}, {guest size: 8192}}, \
             network interfaces: {{mode: shared}}}"
        );
    }

    #[test]
    fn test_enum_values_are_bare_constants() {
        let drive = DriveConfiguration {
            interface: Some(DriveInterface::Ide),
            raw: true,
            ..Default::default()
        };
        assert_eq!(to_record_string(&drive).unwrap(), "{interface: IDE, raw: true}");

        let forward = PortForwardingConfiguration {
            protocol: Some(PortProtocol::Tcp),
            host_port: 2222,
            guest_port: 22,
            ..Default::default()
        };
        assert_eq!(
            to_record_string(&forward).unwrap(),
            "{protocol: TCP, host port: 2222, guest port: 22}"
        );
    }

    #[test]
    fn test_unbound_host_path_is_rejected() {
        let drive = DriveConfiguration {
            source: DriveSource::path("/tmp/boot2docker.iso"),
            ..Default::default()
        };
        assert_eq!(
            to_record_string(&drive),
            Err(EncodeError::UnboundSource("/tmp/boot2docker.iso".into()))
        );
    }

    #[test]
    fn test_invalid_variable_name_is_rejected() {
        let drive = DriveConfiguration {
            source: DriveSource::variable("not an identifier"),
            ..Default::default()
        };
        assert!(matches!(
            to_record_string(&drive),
            Err(EncodeError::Custom(_))
        ));
    }

    #[test]
    fn test_strings_are_escaped() {
        let config = QemuConfiguration {
            notes: "say \"hi\"\\n".into(),
            ..Default::default()
        };
        assert_eq!(
            to_record_string(&config).unwrap(),
            r#"{notes: "say \"hi\"\\n"}"#
        );
    }

    #[test]
    fn test_unsupported_kinds() {
        let mut map = BTreeMap::new();
        map.insert("a", 1);
        assert_eq!(to_record_string(&map), Err(EncodeError::Unsupported("map")));

        #[derive(Serialize)]
        enum Shape {
            Circle(u32),
        }
        assert_eq!(
            to_record_string(&Shape::Circle(1)),
            Err(EncodeError::Unsupported("newtype variant"))
        );
    }

    #[test]
    fn test_scalars_and_lists() {
        assert_eq!(to_record_string(&42u32).unwrap(), "42");
        assert_eq!(to_record_string(&-7i64).unwrap(), "-7");
        assert_eq!(to_record_string(&1.5f64).unwrap(), "1.500000");
        assert_eq!(to_record_string(&false).unwrap(), "false");
        assert_eq!(to_record_string("").unwrap(), "\"\"");
        // List elements keep their zero values.
        assert_eq!(to_record_string(&vec![0, 1]).unwrap(), "{0, 1}");
        assert_eq!(to_record_string(&Vec::<String>::new()).unwrap(), "{}");
        assert_eq!(to_record_string(&Option::<u8>::None).unwrap(), "missing value");
    }

    #[test]
    fn test_record_with_all_fields_omitted_is_still_emitted_in_list() {
        let list = vec![DriveConfiguration::default()];
        assert_eq!(to_record_string(&list).unwrap(), "{{}}");
    }

    #[test]
    fn test_quote_roundtrip() {
        let raw = "a \"b\" \\ c\nd";
        assert_eq!(unquote(&quote(raw)).as_deref(), Some(raw));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("drive0"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("0drive"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a b"));
    }
}
