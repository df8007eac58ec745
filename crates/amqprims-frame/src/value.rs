//! Typed field values, ordered field tables and the `x-death` header.

use bytes::{BufMut, Bytes, BytesMut};

use crate::buffer::{put_length_prefixed, put_long_bytes, put_short_str, WireCursor};
use crate::error::{FrameError, Result};

/// A typed value inside a field table or array.
///
/// Tags follow the RabbitMQ dialect of AMQP 0.9.1 (`s` is a signed
/// 16-bit integer, `x` is a byte array).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal { scale: u8, value: u32 },
    /// Long string sent with the UTF-8 tag `S`.
    LongString(Bytes),
    /// Long string sent with the plain byte-array tag `x`.
    Bytes(Bytes),
    Array(Vec<FieldValue>),
    Timestamp(u64),
    Table(FieldTable),
    Void,
}

impl FieldValue {
    /// Build a string value for header `key`, choosing its wire tag.
    ///
    /// Keys with the `x-` prefix are always tagged UTF-8; other keys are
    /// tagged UTF-8 only when `utf8` is set and sent as plain bytes otherwise.
    pub fn string(key: &str, value: impl Into<String>, utf8: bool) -> Self {
        let value = Bytes::from(value.into());
        if utf8 || key.starts_with("x-") {
            FieldValue::LongString(value)
        } else {
            FieldValue::Bytes(value)
        }
    }

    /// Wire tag octet.
    pub fn tag(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => b't',
            FieldValue::I8(_) => b'b',
            FieldValue::U8(_) => b'B',
            FieldValue::I16(_) => b's',
            FieldValue::U16(_) => b'u',
            FieldValue::I32(_) => b'I',
            FieldValue::U32(_) => b'i',
            FieldValue::I64(_) => b'l',
            FieldValue::U64(_) => b'L',
            FieldValue::F32(_) => b'f',
            FieldValue::F64(_) => b'd',
            FieldValue::Decimal { .. } => b'D',
            FieldValue::LongString(_) => b'S',
            FieldValue::Bytes(_) => b'x',
            FieldValue::Array(_) => b'A',
            FieldValue::Timestamp(_) => b'T',
            FieldValue::Table(_) => b'F',
            FieldValue::Void => b'V',
        }
    }

    /// String content of `S` or `x` values that hold valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::LongString(raw) | FieldValue::Bytes(raw) => std::str::from_utf8(raw).ok(),
            _ => None,
        }
    }

    /// Integer content widened to i64, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::I8(v) => Some(v.into()),
            FieldValue::U8(v) => Some(v.into()),
            FieldValue::I16(v) => Some(v.into()),
            FieldValue::U16(v) => Some(v.into()),
            FieldValue::I32(v) => Some(v.into()),
            FieldValue::U32(v) => Some(v.into()),
            FieldValue::I64(v) => Some(v),
            FieldValue::U64(v) => i64::try_from(v).ok(),
            FieldValue::Timestamp(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            FieldValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            FieldValue::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.tag());
        match self {
            FieldValue::Bool(v) => dst.put_u8(u8::from(*v)),
            FieldValue::I8(v) => dst.put_i8(*v),
            FieldValue::U8(v) => dst.put_u8(*v),
            FieldValue::I16(v) => dst.put_i16(*v),
            FieldValue::U16(v) => dst.put_u16(*v),
            FieldValue::I32(v) => dst.put_i32(*v),
            FieldValue::U32(v) => dst.put_u32(*v),
            FieldValue::I64(v) => dst.put_i64(*v),
            FieldValue::U64(v) => dst.put_u64(*v),
            FieldValue::F32(v) => dst.put_f32(*v),
            FieldValue::F64(v) => dst.put_f64(*v),
            FieldValue::Decimal { scale, value } => {
                dst.put_u8(*scale);
                dst.put_u32(*value);
            }
            FieldValue::LongString(raw) | FieldValue::Bytes(raw) => put_long_bytes(dst, raw)?,
            FieldValue::Array(items) => put_length_prefixed(dst, |dst| {
                for item in items {
                    item.encode(dst)?;
                }
                Ok(())
            })?,
            FieldValue::Timestamp(v) => dst.put_u64(*v),
            FieldValue::Table(table) => table.encode(dst)?,
            FieldValue::Void => {}
        }
        Ok(())
    }

    pub(crate) fn decode(cursor: &mut WireCursor<'_>) -> Result<Self> {
        const WHAT: &str = "field value";
        let tag = cursor.u8(WHAT)?;
        let value = match tag {
            b't' => FieldValue::Bool(cursor.u8(WHAT)? != 0),
            b'b' => FieldValue::I8(cursor.i8(WHAT)?),
            b'B' => FieldValue::U8(cursor.u8(WHAT)?),
            b's' => FieldValue::I16(cursor.i16(WHAT)?),
            b'u' => FieldValue::U16(cursor.u16(WHAT)?),
            b'I' => FieldValue::I32(cursor.i32(WHAT)?),
            b'i' => FieldValue::U32(cursor.u32(WHAT)?),
            b'l' => FieldValue::I64(cursor.i64(WHAT)?),
            b'L' => FieldValue::U64(cursor.u64(WHAT)?),
            b'f' => FieldValue::F32(cursor.f32(WHAT)?),
            b'd' => FieldValue::F64(cursor.f64(WHAT)?),
            b'D' => FieldValue::Decimal {
                scale: cursor.u8(WHAT)?,
                value: cursor.u32(WHAT)?,
            },
            b'S' => FieldValue::LongString(Bytes::copy_from_slice(cursor.long_bytes(WHAT)?)),
            b'x' => FieldValue::Bytes(Bytes::copy_from_slice(cursor.long_bytes(WHAT)?)),
            b'A' => {
                let mut inner = WireCursor::new(cursor.long_bytes("field array")?);
                let mut items = Vec::new();
                while !inner.is_empty() {
                    items.push(FieldValue::decode(&mut inner)?);
                }
                FieldValue::Array(items)
            }
            b'T' => FieldValue::Timestamp(cursor.u64(WHAT)?),
            b'F' => FieldValue::Table(FieldTable::decode(cursor)?),
            b'V' => FieldValue::Void,
            other => return Err(FrameError::InvalidFieldType(other)),
        };
        Ok(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::U8(value)
    }
}

impl From<i16> for FieldValue {
    fn from(value: i16) -> Self {
        FieldValue::I16(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::U16(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::I32(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::U32(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::I64(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::F64(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(Bytes::from(value))
    }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self {
        FieldValue::Table(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::Array(value)
    }
}

/// An insertion-ordered field table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable {
    entries: Vec<(String, FieldValue)>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`. A replaced entry keeps its position.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every entry of `other` over this table.
    pub fn merge(&mut self, other: &FieldTable) {
        for (key, value) in other.iter() {
            self.insert(key, value.clone());
        }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_length_prefixed(dst, |dst| {
            for (key, value) in &self.entries {
                put_short_str(dst, key)?;
                value.encode(dst)?;
            }
            Ok(())
        })
    }

    pub(crate) fn decode(cursor: &mut WireCursor<'_>) -> Result<Self> {
        let mut inner = WireCursor::new(cursor.long_bytes("field table")?);
        let mut table = FieldTable::new();
        while !inner.is_empty() {
            let key = inner.short_str("field name")?;
            let value = FieldValue::decode(&mut inner)?;
            table.entries.push((key, value));
        }
        Ok(table)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = FieldTable::new();
        for (key, value) in iter {
            table.insert(key, value);
        }
        table
    }
}

impl<'a> IntoIterator for &'a FieldTable {
    type Item = (&'a str, &'a FieldValue);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, FieldValue)>,
        fn(&'a (String, FieldValue)) -> (&'a str, &'a FieldValue),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().map(entry_ref as fn(&'a (String, FieldValue)) -> _)
    }
}

fn entry_ref(entry: &(String, FieldValue)) -> (&str, &FieldValue) {
    (entry.0.as_str(), &entry.1)
}

/// One entry of the `x-death` header a broker adds to dead-lettered messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XDeath {
    pub queue: String,
    pub reason: String,
    pub exchange: String,
    pub routing_keys: Vec<String>,
    pub count: i64,
    pub time: Option<u64>,
}

impl XDeath {
    pub const HEADER: &'static str = "x-death";

    /// Parse every `x-death` entry in `headers`; malformed entries are skipped.
    pub fn from_headers(headers: &FieldTable) -> Vec<XDeath> {
        let Some(entries) = headers.get(Self::HEADER).and_then(FieldValue::as_array) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(FieldValue::as_table)
            .map(|table| {
                let text = |key: &str| {
                    table
                        .get(key)
                        .and_then(FieldValue::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                XDeath {
                    queue: text("queue"),
                    reason: text("reason"),
                    exchange: text("exchange"),
                    routing_keys: table
                        .get("routing-keys")
                        .and_then(FieldValue::as_array)
                        .map(|keys| {
                            keys.iter()
                                .filter_map(FieldValue::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                    count: table.get("count").and_then(FieldValue::as_i64).unwrap_or(0),
                    time: match table.get("time") {
                        Some(FieldValue::Timestamp(ts)) => Some(*ts),
                        _ => None,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(table: &FieldTable) -> FieldTable {
        let mut buf = BytesMut::new();
        table.encode(&mut buf).unwrap();
        let mut cursor = WireCursor::new(&buf);
        let decoded = FieldTable::decode(&mut cursor).unwrap();
        assert!(cursor.is_empty());
        decoded
    }

    #[test]
    fn every_tag_survives_a_roundtrip() {
        let mut nested = FieldTable::new();
        nested.insert("inner", 7i32);

        let table: FieldTable = [
            ("bool", FieldValue::Bool(true)),
            ("i8", FieldValue::I8(-3)),
            ("u8", FieldValue::U8(250)),
            ("i16", FieldValue::I16(-300)),
            ("u16", FieldValue::U16(60_000)),
            ("i32", FieldValue::I32(-70_000)),
            ("u32", FieldValue::U32(4_000_000_000)),
            ("i64", FieldValue::I64(-5_000_000_000)),
            ("u64", FieldValue::U64(u64::MAX)),
            ("f32", FieldValue::F32(1.5)),
            ("f64", FieldValue::F64(-2.25)),
            ("dec", FieldValue::Decimal { scale: 2, value: 1234 }),
            ("utf8", FieldValue::from("héllo")),
            ("bytes", FieldValue::Bytes(Bytes::from_static(&[0, 1, 2]))),
            (
                "array",
                FieldValue::Array(vec![FieldValue::I32(1), FieldValue::from("two")]),
            ),
            ("ts", FieldValue::Timestamp(1_700_000_000)),
            ("table", FieldValue::Table(nested)),
            ("void", FieldValue::Void),
        ]
        .into_iter()
        .collect();

        assert_eq!(roundtrip(&table), table);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut table = FieldTable::new();
        table.insert("zeta", 1i32);
        table.insert("alpha", 2i32);
        table.insert("mid", 3i32);
        table.insert("zeta", 4i32);

        let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
        assert_eq!(table.get("zeta"), Some(&FieldValue::I32(4)));

        let decoded = roundtrip(&table);
        let keys: Vec<_> = decoded.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn x_prefix_forces_utf8_tag() {
        assert_eq!(FieldValue::string("x-match", "all", false).tag(), b'S');
        assert_eq!(FieldValue::string("plain", "v", false).tag(), b'x');
        assert_eq!(FieldValue::string("plain", "v", true).tag(), b'S');
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = [0, 0, 0, 3, 1, b'k', b'?'];
        let mut cursor = WireCursor::new(&raw);
        let err = FieldTable::decode(&mut cursor).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFieldType(b'?')));
    }

    #[test]
    fn truncated_table_is_rejected() {
        let raw = [0, 0, 0, 9, 1, b'k'];
        let mut cursor = WireCursor::new(&raw);
        assert!(matches!(
            FieldTable::decode(&mut cursor),
            Err(FrameError::Truncated(_))
        ));
    }

    #[test]
    fn x_death_entries_are_parsed() {
        let mut death = FieldTable::new();
        death.insert("queue", "orders");
        death.insert("reason", "rejected");
        death.insert("exchange", "");
        death.insert("count", FieldValue::I64(3));
        death.insert("time", FieldValue::Timestamp(1_700_000_000));
        death.insert(
            "routing-keys",
            FieldValue::Array(vec![FieldValue::from("orders")]),
        );

        let mut headers = FieldTable::new();
        headers.insert(
            XDeath::HEADER,
            FieldValue::Array(vec![FieldValue::Table(death), FieldValue::I32(0)]),
        );

        let parsed = XDeath::from_headers(&headers);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].queue, "orders");
        assert_eq!(parsed[0].reason, "rejected");
        assert_eq!(parsed[0].count, 3);
        assert_eq!(parsed[0].time, Some(1_700_000_000));
        assert_eq!(parsed[0].routing_keys, vec!["orders".to_string()]);

        assert!(XDeath::from_headers(&FieldTable::new()).is_empty());
    }
}
