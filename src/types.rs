// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scalar type system shared by the configuration layer and the UADP codec:
//! the 25 OPC UA built-in types, value ranks, node identifiers, status
//! codes, variants and the `DataValue`/`ReadValueId`/`WriteValue` triad used
//! at the boundary with the source-variable provider and target-variable
//! sink (spec.md §6).

use std::fmt;

/// One of the 25 OPC UA built-in scalar types, tagged with its Part 6
/// numeric identifier (used on the wire when a field is encoded as a full
/// `Variant`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BuiltInType {
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    String = 12,
    DateTime = 13,
    Guid = 14,
    ByteString = 15,
    XmlElement = 16,
    NodeId = 17,
    ExpandedNodeId = 18,
    StatusCode = 19,
    QualifiedName = 20,
    LocalizedText = 21,
    ExtensionObject = 22,
    DataValue = 23,
    Variant = 24,
    DiagnosticInfo = 25,
}

impl BuiltInType {
    /// Fixed wire width in bytes for raw (non-Variant) encoding, or `None`
    /// for variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        use BuiltInType::*;
        match self {
            Boolean | SByte | Byte => Some(1),
            Int16 | UInt16 => Some(2),
            Int32 | UInt32 | Float => Some(4),
            Int64 | UInt64 | Double | DateTime | StatusCode => Some(8),
            Guid => Some(16),
            String | ByteString | XmlElement | NodeId | ExpandedNodeId | QualifiedName
            | LocalizedText | ExtensionObject | DataValue | Variant | DiagnosticInfo => None,
        }
    }

    /// Zero/empty value of this type, used to fill a field slot that has
    /// never received real data (spec.md §4.3: a writer with no cached
    /// value yet still needs a populated, if Bad-quality, field).
    pub fn default_variant(self) -> Variant {
        use BuiltInType::*;
        match self {
            Boolean => Variant::Boolean(false),
            SByte => Variant::SByte(0),
            Byte => Variant::Byte(0),
            Int16 => Variant::Int16(0),
            UInt16 => Variant::UInt16(0),
            Int32 => Variant::Int32(0),
            UInt32 => Variant::UInt32(0),
            Int64 => Variant::Int64(0),
            UInt64 => Variant::UInt64(0),
            Float => Variant::Float(0.0),
            Double => Variant::Double(0.0),
            String => Variant::String(std::string::String::new()),
            DateTime => Variant::DateTime(0),
            ByteString => Variant::ByteString(Vec::new()),
            _ => Variant::Boolean(false),
        }
    }

    /// Decode from the Part 6 numeric identifier used on the wire.
    pub fn from_id(id: u8) -> Option<Self> {
        use BuiltInType::*;
        Some(match id {
            1 => Boolean,
            2 => SByte,
            3 => Byte,
            4 => Int16,
            5 => UInt16,
            6 => Int32,
            7 => UInt32,
            8 => Int64,
            9 => UInt64,
            10 => Float,
            11 => Double,
            12 => String,
            13 => DateTime,
            14 => Guid,
            15 => ByteString,
            16 => XmlElement,
            17 => NodeId,
            18 => ExpandedNodeId,
            19 => StatusCode,
            20 => QualifiedName,
            21 => LocalizedText,
            22 => ExtensionObject,
            23 => DataValue,
            24 => Variant,
            25 => DiagnosticInfo,
            _ => return None,
        })
    }
}

/// Value rank of a field, constrained to the variants OPC UA Part 3 allows
/// (spec.md §9 "Boolean/int-coded enumerations" redesign note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRank {
    /// -2: scalar or any-dimension array.
    Any,
    /// -3: scalar or one-dimensional array.
    ScalarOrOneDim,
    /// -1: scalar value.
    Scalar,
    /// 0: array of one or more dimensions, rank unspecified.
    OneOrMoreDim,
    /// 1: exactly one dimension.
    OneDim,
    /// n > 1: exactly `n` dimensions.
    Specific(u32),
}

impl ValueRank {
    pub fn from_i32(rank: i32) -> Option<Self> {
        match rank {
            -2 => Some(ValueRank::Any),
            -3 => Some(ValueRank::ScalarOrOneDim),
            -1 => Some(ValueRank::Scalar),
            0 => Some(ValueRank::OneOrMoreDim),
            1 => Some(ValueRank::OneDim),
            n if n > 1 => Some(ValueRank::Specific(n as u32)),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            ValueRank::Any => -2,
            ValueRank::ScalarOrOneDim => -3,
            ValueRank::Scalar => -1,
            ValueRank::OneOrMoreDim => 0,
            ValueRank::OneDim => 1,
            ValueRank::Specific(n) => n as i32,
        }
    }

    pub fn is_array(self) -> bool {
        !matches!(self, ValueRank::Scalar)
    }
}

/// OPC UA NodeId, carried as its opaque string form (`ns=<n>;<identifier>`)
/// since address-space resolution is an external collaborator (spec.md §1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(text: impl Into<String>) -> Self {
        NodeId(text.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OPC UA attribute id for the Value attribute (the only one the core
/// reads/writes, spec.md §3/§4.2).
pub const ATTRIBUTE_ID_VALUE: u32 = 13;

/// Subset of OPC UA status codes the core produces or inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// Produced when a received field's built-in type contradicts the
    /// reader's declared metadata (spec.md §4.4 step 4).
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8073_0000);

    pub fn is_good(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::GOOD
    }
}

/// A scalar or array value of one `BuiltInType`.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(i64),
    ByteString(Vec<u8>),
    Array(BuiltInType, Vec<Variant>),
}

impl Variant {
    pub fn builtin_type(&self) -> BuiltInType {
        match self {
            Variant::Boolean(_) => BuiltInType::Boolean,
            Variant::SByte(_) => BuiltInType::SByte,
            Variant::Byte(_) => BuiltInType::Byte,
            Variant::Int16(_) => BuiltInType::Int16,
            Variant::UInt16(_) => BuiltInType::UInt16,
            Variant::Int32(_) => BuiltInType::Int32,
            Variant::UInt32(_) => BuiltInType::UInt32,
            Variant::Int64(_) => BuiltInType::Int64,
            Variant::UInt64(_) => BuiltInType::UInt64,
            Variant::Float(_) => BuiltInType::Float,
            Variant::Double(_) => BuiltInType::Double,
            Variant::String(_) => BuiltInType::String,
            Variant::DateTime(_) => BuiltInType::DateTime,
            Variant::ByteString(_) => BuiltInType::ByteString,
            Variant::Array(t, _) => *t,
        }
    }
}

/// A value plus its status and timestamps, as exchanged with the
/// source-variable provider and target-variable sink.
#[derive(Debug, Clone)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    /// Source timestamp, ticks since the OPC UA epoch (1601-01-01), or
    /// `None` if not set.
    pub source_timestamp: Option<i64>,
    pub server_timestamp: Option<i64>,
}

impl DataValue {
    pub fn good(value: Variant) -> Self {
        DataValue {
            value,
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    pub fn bad(status: StatusCode, value: Variant) -> Self {
        DataValue {
            value,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }
}

/// One element of the array passed to `SourceVariableProvider::get`.
#[derive(Debug, Clone)]
pub struct ReadValueId {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub numeric_range: Option<String>,
}

/// One element of the array passed to the target-variable sink.
#[derive(Debug, Clone)]
pub struct WriteValue {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub value: DataValue,
}

/// 100ns ticks between the OPC UA epoch (1601-01-01) and the Unix epoch.
const OPCUA_EPOCH_OFFSET_TICKS: i64 = 116_444_736_000_000_000;

/// Current wall-clock time as OPC UA ticks (100ns units since 1601-01-01),
/// used to stamp a `NetworkMessage`'s timestamp field (spec.md §4.3 step 5).
pub fn now_as_opcua_ticks() -> i64 {
    let since_unix_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    OPCUA_EPOCH_OFFSET_TICKS + since_unix_epoch.as_nanos() as i64 / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_type_roundtrips_through_id() {
        for id in 1..=25u8 {
            let ty = BuiltInType::from_id(id).expect("valid id");
            assert_eq!(ty as u8, id);
        }
        assert!(BuiltInType::from_id(0).is_none());
        assert!(BuiltInType::from_id(26).is_none());
    }

    #[test]
    fn value_rank_roundtrips() {
        for rank in [-3, -2, -1, 0, 1, 2, 42] {
            let vr = ValueRank::from_i32(rank).unwrap();
            assert_eq!(vr.as_i32(), rank);
        }
        assert!(ValueRank::from_i32(-4).is_none());
    }

    #[test]
    fn status_code_good_bad() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::BAD_TYPE_MISMATCH.is_good());
    }
}
