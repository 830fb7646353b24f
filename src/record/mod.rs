//! Ledger record model
//!
//! Typed views over raw ledger records as delivered by the heavy-storage
//! export service. A [`Record`] carries its own [`RecordId`], the object it
//! mutates (if any) and exactly one [`Virtual`] body.
//!
//! Correlation keys:
//! - requests answer to their own ID (`origin`) and point one level up the
//!   call tree through `reason`
//! - results and side effects (activate/amend/deactivate) answer to the
//!   request that produced them

pub mod payload;
pub mod prototype;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub use payload::{CallParams, ResultPayload};

/// Unix time of the genesis pulse (2018-01-01T00:00:00Z)
pub const PULSE_EPOCH: i64 = 1_514_764_800;

/// Monotonic pulse number. One pulse number per second since genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PulseNumber(pub u32);

impl PulseNumber {
    /// Bootstrap pulse holding the ledger's initial state
    pub const GENESIS: PulseNumber = PulseNumber(65_537);

    pub const fn new(number: u32) -> Self {
        PulseNumber(number)
    }

    pub fn next(self) -> Self {
        PulseNumber(self.0.saturating_add(1))
    }

    pub fn is_genesis(self) -> bool {
        self == Self::GENESIS
    }

    /// Approximate wall-clock time of the pulse (unix seconds)
    pub fn unix_timestamp(self) -> i64 {
        if self.0 <= Self::GENESIS.0 {
            return PULSE_EPOCH;
        }
        PULSE_EPOCH + i64::from(self.0 - Self::GENESIS.0)
    }

    pub fn as_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.unix_timestamp(), 0)
            .single()
            .unwrap_or_default()
    }
}

impl fmt::Display for PulseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("record id must be 8 bytes, got {0}")]
    Length(usize),
}

/// Record identity: pulse number plus intra-pulse sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pulse: PulseNumber,
    local: u32,
}

impl RecordId {
    pub const fn new(pulse: PulseNumber, local: u32) -> Self {
        Self { pulse, local }
    }

    pub fn pulse(&self) -> PulseNumber {
        self.pulse
    }

    pub fn local(&self) -> u32 {
        self.local
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.pulse.0.to_be_bytes());
        bytes[4..].copy_from_slice(&self.local.to_be_bytes());
        bytes
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl FromStr for RecordId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 8 {
            return Err(IdParseError::Length(bytes.len()));
        }
        let pulse = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let local = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(RecordId::new(PulseNumber(pulse), local))
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Hex encoding for opaque byte payloads in JSON
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub reference: String,
    pub role: String,
}

/// Finalized pulse as reported by the export service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pulse {
    pub number: PulseNumber,
    #[serde(default, with = "hex_bytes")]
    pub entropy: Vec<u8>,
    pub timestamp: i64,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Pulse {
    /// Pulse with no entropy or nodes, timestamp derived from the number
    pub fn new(number: PulseNumber) -> Self {
        Self {
            number,
            entropy: Vec::new(),
            timestamp: number.unix_timestamp(),
            nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    #[default]
    Method,
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(default)]
    pub object: Option<RecordId>,
    #[serde(default)]
    pub prototype: Option<RecordId>,
    #[serde(default)]
    pub caller: Option<RecordId>,
    pub method: String,
    #[serde(default, with = "hex_bytes")]
    pub arguments: Vec<u8>,
    pub reason: RecordId,
    #[serde(default)]
    pub api_request_id: Option<String>,
    #[serde(default)]
    pub call_type: CallType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBody {
    #[serde(default)]
    pub object: Option<RecordId>,
    pub request: RecordId,
    #[serde(default, with = "hex_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateBody {
    pub request: RecordId,
    pub image: RecordId,
    #[serde(default, with = "hex_bytes")]
    pub memory: Vec<u8>,
    #[serde(default)]
    pub parent: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendBody {
    pub request: RecordId,
    pub image: RecordId,
    #[serde(default, with = "hex_bytes")]
    pub memory: Vec<u8>,
    pub prev_state: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateBody {
    pub request: RecordId,
    pub image: RecordId,
    pub prev_state: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Virtual {
    IncomingRequest(RequestBody),
    OutgoingRequest(RequestBody),
    Result(ResultBody),
    Activate(ActivateBody),
    Amend(AmendBody),
    Deactivate(DeactivateBody),
}

/// One immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub object_id: Option<RecordId>,
    #[serde(rename = "virtual")]
    pub body: Virtual,
}

impl Record {
    pub fn new(id: RecordId, object_id: Option<RecordId>, body: Virtual) -> Self {
        Self { id, object_id, body }
    }

    pub fn is_request(&self) -> bool {
        self.request_body().is_some()
    }

    pub fn is_incoming_request(&self) -> bool {
        matches!(self.body, Virtual::IncomingRequest(_))
    }

    pub fn is_outgoing_request(&self) -> bool {
        matches!(self.body, Virtual::OutgoingRequest(_))
    }

    pub fn is_result(&self) -> bool {
        matches!(self.body, Virtual::Result(_))
    }

    pub fn is_activate(&self) -> bool {
        matches!(self.body, Virtual::Activate(_))
    }

    pub fn is_amend(&self) -> bool {
        matches!(self.body, Virtual::Amend(_))
    }

    pub fn is_deactivate(&self) -> bool {
        matches!(self.body, Virtual::Deactivate(_))
    }

    pub fn is_side_effect(&self) -> bool {
        self.is_activate() || self.is_amend() || self.is_deactivate()
    }

    pub fn request_body(&self) -> Option<&RequestBody> {
        match &self.body {
            Virtual::IncomingRequest(body) | Virtual::OutgoingRequest(body) => Some(body),
            _ => None,
        }
    }

    /// Correlation key: own ID for requests, the answered request otherwise
    pub fn origin(&self) -> RecordId {
        match &self.body {
            Virtual::IncomingRequest(_) | Virtual::OutgoingRequest(_) => self.id,
            Virtual::Result(body) => body.request,
            Virtual::Activate(body) => body.request,
            Virtual::Amend(body) => body.request,
            Virtual::Deactivate(body) => body.request,
        }
    }

    /// The request that caused this one (requests only)
    pub fn reason(&self) -> Option<RecordId> {
        self.request_body().map(|body| body.reason)
    }

    /// Prototype of the object a side effect writes
    pub fn image(&self) -> Option<RecordId> {
        match &self.body {
            Virtual::Activate(body) => Some(body.image),
            Virtual::Amend(body) => Some(body.image),
            Virtual::Deactivate(body) => Some(body.image),
            _ => None,
        }
    }
}

/// Request view: incoming or outgoing call
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RecordId,
    pub object_id: Option<RecordId>,
    pub incoming: bool,
    pub body: RequestBody,
}

impl Request {
    pub fn from_record(record: &Record) -> Option<Self> {
        let (incoming, body) = match &record.body {
            Virtual::IncomingRequest(body) => (true, body),
            Virtual::OutgoingRequest(body) => (false, body),
            _ => return None,
        };
        Some(Self {
            id: record.id,
            object_id: record.object_id,
            incoming,
            body: body.clone(),
        })
    }

    pub fn reason(&self) -> RecordId {
        self.body.reason
    }

    pub fn method(&self) -> &str {
        &self.body.method
    }

    pub fn prototype(&self) -> Option<RecordId> {
        self.body.prototype
    }

    pub fn is_constructor(&self) -> bool {
        self.body.call_type == CallType::Constructor
    }

    /// Incoming `Call` issued through the public API
    pub fn is_api_call(&self) -> bool {
        self.incoming && self.body.method == payload::API_CALL_METHOD
    }

    /// Decoded API call parameters; `None` unless this is an API call
    pub fn call_params(&self) -> Option<CallParams> {
        if !self.is_api_call() {
            return None;
        }
        match payload::decode::<CallParams>(&self.body.arguments) {
            Ok(params) => Some(params),
            Err(e) => {
                log::warn!("⚠️  Malformed call params in request {}: {}", self.id, e);
                None
            }
        }
    }

    /// Call site (`member.transfer`, ...) of an API call
    pub fn call_site(&self) -> Option<String> {
        self.call_params().map(|params| params.call_site)
    }
}

/// Result view
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub id: RecordId,
    pub object_id: Option<RecordId>,
    pub body: ResultBody,
}

impl ResultRecord {
    pub fn from_record(record: &Record) -> Option<Self> {
        match &record.body {
            Virtual::Result(body) => Some(Self {
                id: record.id,
                object_id: record.object_id,
                body: body.clone(),
            }),
            _ => None,
        }
    }

    pub fn request(&self) -> RecordId {
        self.body.request
    }

    pub fn payload(&self) -> Option<ResultPayload> {
        payload::decode::<ResultPayload>(&self.body.payload).ok()
    }

    /// Decodes and carries no error
    pub fn is_success(&self) -> bool {
        self.payload().map(|p| p.error.is_none()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectKind {
    Activate,
    Amend,
    Deactivate,
}

/// Side effect view: the state mutation produced by executing a request
#[derive(Debug, Clone, PartialEq)]
pub struct SideEffect {
    pub id: RecordId,
    pub object_id: Option<RecordId>,
    pub kind: SideEffectKind,
    pub request: RecordId,
    pub image: RecordId,
    pub memory: Vec<u8>,
    pub prev_state: Option<RecordId>,
    pub parent: Option<RecordId>,
}

impl SideEffect {
    pub fn from_record(record: &Record) -> Option<Self> {
        let (kind, request, image, memory, prev_state, parent) = match &record.body {
            Virtual::Activate(b) => (SideEffectKind::Activate, b.request, b.image, b.memory.clone(), None, b.parent),
            Virtual::Amend(b) => (SideEffectKind::Amend, b.request, b.image, b.memory.clone(), Some(b.prev_state), None),
            Virtual::Deactivate(b) => (SideEffectKind::Deactivate, b.request, b.image, Vec::new(), Some(b.prev_state), None),
            _ => return None,
        };
        Some(Self {
            id: record.id,
            object_id: record.object_id,
            kind,
            request,
            image,
            memory,
            prev_state,
            parent,
        })
    }

    pub fn is_activate(&self) -> bool {
        self.kind == SideEffectKind::Activate
    }

    pub fn is_amend(&self) -> bool {
        self.kind == SideEffectKind::Amend
    }

    /// Object this effect writes; activations without an object ID name themselves
    pub fn object(&self) -> RecordId {
        self.object_id.unwrap_or(self.id)
    }

    /// Decoded object memory, zero-valued when malformed
    pub fn state<T: serde::de::DeserializeOwned + Default>(&self, what: &str) -> T {
        payload::decode_or_default(&self.memory, what, self.id)
    }
}
