//! Interaction Model payload codec.
//!
//! Every IM payload is a TLV struct carrying context tag `0xFF`
//! (`InteractionModelRevision`, 11); decode rejects payloads without it.

use crate::core::{CodecError, IM_REVISION};
use crate::tlv::{decode as tlv_decode, encode as tlv_encode, TlvValue};

use super::path::{AttributePath, CommandPath, ConcretePath};
use super::status::ImStatus;

/// Interaction Model opcodes (protocol id 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImOpcode {
    /// Status response.
    StatusResponse = 0x01,
    /// Read request.
    ReadRequest = 0x02,
    /// Subscribe request.
    SubscribeRequest = 0x03,
    /// Subscribe response.
    SubscribeResponse = 0x04,
    /// Report data.
    ReportData = 0x05,
    /// Write request.
    WriteRequest = 0x06,
    /// Write response.
    WriteResponse = 0x07,
    /// Invoke request.
    InvokeRequest = 0x08,
    /// Invoke response.
    InvokeResponse = 0x09,
    /// Timed request.
    TimedRequest = 0x0A,
}

impl ImOpcode {
    /// Parse a wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::StatusResponse),
            0x02 => Some(Self::ReadRequest),
            0x03 => Some(Self::SubscribeRequest),
            0x04 => Some(Self::SubscribeResponse),
            0x05 => Some(Self::ReportData),
            0x06 => Some(Self::WriteRequest),
            0x07 => Some(Self::WriteResponse),
            0x08 => Some(Self::InvokeRequest),
            0x09 => Some(Self::InvokeResponse),
            0x0A => Some(Self::TimedRequest),
            _ => None,
        }
    }

    /// Wire byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

const TAG_IM_REVISION: u8 = 0xFF;

/// Serialize an IM struct, appending the revision tag.
fn encode_im(mut fields: Vec<(u8, TlvValue)>) -> Vec<u8> {
    fields.push((TAG_IM_REVISION, TlvValue::Unsigned(u64::from(IM_REVISION))));
    tlv_encode(&TlvValue::Struct(fields))
}

/// Decode an IM payload, checking shape and revision tag.
fn decode_im(bytes: &[u8]) -> Result<TlvValue, CodecError> {
    let value = tlv_decode(bytes)?;
    if !matches!(value, TlvValue::Struct(_)) {
        return Err(CodecError::InvalidMessage);
    }
    if value.field(TAG_IM_REVISION).and_then(TlvValue::as_u64).is_none() {
        return Err(CodecError::InvalidMessage);
    }
    Ok(value)
}

// ReadRequestMessage tags.
const TAG_READ_PATHS: u8 = 0;
const TAG_READ_FABRIC_FILTERED: u8 = 3;

/// ReadRequest payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Requested attribute paths (wildcards allowed).
    pub paths: Vec<AttributePath>,
    /// Restrict fabric-scoped data to the accessing fabric.
    pub fabric_filtered: bool,
}

impl ReadRequest {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![
            (
                TAG_READ_PATHS,
                TlvValue::Array(self.paths.iter().map(AttributePath::to_tlv).collect()),
            ),
            (TAG_READ_FABRIC_FILTERED, TlvValue::Bool(self.fabric_filtered)),
        ])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let paths = match value.field(TAG_READ_PATHS) {
            Some(TlvValue::Array(items)) => items
                .iter()
                .map(AttributePath::from_tlv)
                .collect::<Option<Vec<_>>>()
                .ok_or(CodecError::InvalidMessage)?,
            _ => return Err(CodecError::InvalidMessage),
        };
        let fabric_filtered = value
            .field(TAG_READ_FABRIC_FILTERED)
            .and_then(TlvValue::as_bool)
            .unwrap_or(false);
        Ok(Self { paths, fabric_filtered })
    }
}

// SubscribeRequestMessage tags.
const TAG_SUB_KEEP: u8 = 0;
const TAG_SUB_MIN_INTERVAL: u8 = 1;
const TAG_SUB_MAX_INTERVAL: u8 = 2;
const TAG_SUB_PATHS: u8 = 3;
const TAG_SUB_FABRIC_FILTERED: u8 = 7;

/// SubscribeRequest payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Keep other subscriptions from this peer alive.
    pub keep_subscriptions: bool,
    /// Minimum seconds between reports.
    pub min_interval: u16,
    /// Maximum seconds between reports (keep-alive bound).
    pub max_interval: u16,
    /// Subscribed paths.
    pub paths: Vec<AttributePath>,
    /// Restrict fabric-scoped data to the accessing fabric.
    pub fabric_filtered: bool,
}

impl SubscribeRequest {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![
            (TAG_SUB_KEEP, TlvValue::Bool(self.keep_subscriptions)),
            (TAG_SUB_MIN_INTERVAL, TlvValue::Unsigned(u64::from(self.min_interval))),
            (TAG_SUB_MAX_INTERVAL, TlvValue::Unsigned(u64::from(self.max_interval))),
            (
                TAG_SUB_PATHS,
                TlvValue::Array(self.paths.iter().map(AttributePath::to_tlv).collect()),
            ),
            (TAG_SUB_FABRIC_FILTERED, TlvValue::Bool(self.fabric_filtered)),
        ])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let paths = match value.field(TAG_SUB_PATHS) {
            Some(TlvValue::Array(items)) => items
                .iter()
                .map(AttributePath::from_tlv)
                .collect::<Option<Vec<_>>>()
                .ok_or(CodecError::InvalidMessage)?,
            _ => return Err(CodecError::InvalidMessage),
        };
        let min_interval = value
            .field(TAG_SUB_MIN_INTERVAL)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(CodecError::InvalidMessage)?;
        let max_interval = value
            .field(TAG_SUB_MAX_INTERVAL)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(CodecError::InvalidMessage)?;
        Ok(Self {
            keep_subscriptions: value
                .field(TAG_SUB_KEEP)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
            min_interval,
            max_interval,
            paths,
            fabric_filtered: value
                .field(TAG_SUB_FABRIC_FILTERED)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
        })
    }
}

// SubscribeResponseMessage tags.
const TAG_SUBRSP_ID: u8 = 0;
const TAG_SUBRSP_MAX_INTERVAL: u8 = 2;

/// SubscribeResponse payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeResponse {
    /// Allocated subscription id.
    pub subscription_id: u32,
    /// Granted maximum interval.
    pub max_interval: u16,
}

impl SubscribeResponse {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![
            (TAG_SUBRSP_ID, TlvValue::Unsigned(u64::from(self.subscription_id))),
            (TAG_SUBRSP_MAX_INTERVAL, TlvValue::Unsigned(u64::from(self.max_interval))),
        ])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        Ok(Self {
            subscription_id: value
                .field(TAG_SUBRSP_ID)
                .and_then(TlvValue::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or(CodecError::InvalidMessage)?,
            max_interval: value
                .field(TAG_SUBRSP_MAX_INTERVAL)
                .and_then(TlvValue::as_u64)
                .and_then(|v| u16::try_from(v).ok())
                .ok_or(CodecError::InvalidMessage)?,
        })
    }
}

// ReportDataMessage tags.
const TAG_REPORT_SUB_ID: u8 = 0;
const TAG_REPORT_ATTRIBUTES: u8 = 1;
const TAG_REPORT_MORE_CHUNKS: u8 = 2;
const TAG_REPORT_SUPPRESS: u8 = 4;

// AttributeReportIB tags.
const TAG_REPORT_STATUS: u8 = 0;
const TAG_REPORT_DATA: u8 = 1;
// AttributeDataIB tags.
const TAG_DATA_PATH: u8 = 1;
const TAG_DATA_VALUE: u8 = 2;
// AttributeStatusIB tags.
const TAG_STATUS_PATH: u8 = 0;
const TAG_STATUS_IB: u8 = 1;
const TAG_STATUS_CODE: u8 = 0;

/// One attribute report: a value or a path-level status.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeReport {
    /// Successful read: path + value.
    Data {
        /// Reported path.
        path: ConcretePath,
        /// Attribute value.
        value: TlvValue,
    },
    /// Failed path: path + status.
    Status {
        /// Reported path.
        path: ConcretePath,
        /// Path-level status.
        status: ImStatus,
    },
}

impl AttributeReport {
    fn to_tlv(&self) -> TlvValue {
        match self {
            AttributeReport::Data { path, value } => TlvValue::Struct(vec![(
                TAG_REPORT_DATA,
                TlvValue::Struct(vec![
                    (TAG_DATA_PATH, path.to_tlv()),
                    (TAG_DATA_VALUE, value.clone()),
                ]),
            )]),
            AttributeReport::Status { path, status } => TlvValue::Struct(vec![(
                TAG_REPORT_STATUS,
                TlvValue::Struct(vec![
                    (TAG_STATUS_PATH, path.to_tlv()),
                    (
                        TAG_STATUS_IB,
                        TlvValue::Struct(vec![(
                            TAG_STATUS_CODE,
                            TlvValue::Unsigned(u64::from(status.code())),
                        )]),
                    ),
                ]),
            )]),
        }
    }

    fn from_tlv(value: &TlvValue) -> Option<Self> {
        if let Some(data) = value.field(TAG_REPORT_DATA) {
            let path = ConcretePath::from_tlv(data.field(TAG_DATA_PATH)?)?;
            let value = data.field(TAG_DATA_VALUE)?.clone();
            return Some(AttributeReport::Data { path, value });
        }
        let status_ib = value.field(TAG_REPORT_STATUS)?;
        let path = ConcretePath::from_tlv(status_ib.field(TAG_STATUS_PATH)?)?;
        let code = status_ib
            .field(TAG_STATUS_IB)?
            .field(TAG_STATUS_CODE)?
            .as_u64()?;
        let status = ImStatus::from_code(u8::try_from(code).ok()?)?;
        Some(AttributeReport::Status { path, status })
    }
}

/// ReportData payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportData {
    /// Subscription id for subscription reports; absent for plain reads.
    pub subscription_id: Option<u32>,
    /// Attribute reports in this chunk.
    pub reports: Vec<AttributeReport>,
    /// More chunks follow.
    pub more_chunks: bool,
    /// Peer need not send a StatusResponse.
    pub suppress_response: bool,
}

impl ReportData {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = Vec::new();
        if let Some(id) = self.subscription_id {
            fields.push((TAG_REPORT_SUB_ID, TlvValue::Unsigned(u64::from(id))));
        }
        fields.push((
            TAG_REPORT_ATTRIBUTES,
            TlvValue::Array(self.reports.iter().map(AttributeReport::to_tlv).collect()),
        ));
        if self.more_chunks {
            fields.push((TAG_REPORT_MORE_CHUNKS, TlvValue::Bool(true)));
        }
        if self.suppress_response {
            fields.push((TAG_REPORT_SUPPRESS, TlvValue::Bool(true)));
        }
        encode_im(fields)
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let reports = match value.field(TAG_REPORT_ATTRIBUTES) {
            Some(TlvValue::Array(items)) => items
                .iter()
                .map(AttributeReport::from_tlv)
                .collect::<Option<Vec<_>>>()
                .ok_or(CodecError::InvalidMessage)?,
            None => Vec::new(),
            Some(_) => return Err(CodecError::InvalidMessage),
        };
        Ok(Self {
            subscription_id: value
                .field(TAG_REPORT_SUB_ID)
                .and_then(TlvValue::as_u64)
                .and_then(|v| u32::try_from(v).ok()),
            reports,
            more_chunks: value
                .field(TAG_REPORT_MORE_CHUNKS)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
            suppress_response: value
                .field(TAG_REPORT_SUPPRESS)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
        })
    }
}

// WriteRequestMessage tags.
const TAG_WRITE_TIMED: u8 = 1;
const TAG_WRITE_REQUESTS: u8 = 2;

/// WriteRequest payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    /// Sender claims a timed window is armed.
    pub timed: bool,
    /// Writes: concrete path + new value.
    pub writes: Vec<(ConcretePath, TlvValue)>,
}

impl WriteRequest {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![
            (TAG_WRITE_TIMED, TlvValue::Bool(self.timed)),
            (
                TAG_WRITE_REQUESTS,
                TlvValue::Array(
                    self.writes
                        .iter()
                        .map(|(path, value)| {
                            TlvValue::Struct(vec![
                                (TAG_DATA_PATH, path.to_tlv()),
                                (TAG_DATA_VALUE, value.clone()),
                            ])
                        })
                        .collect(),
                ),
            ),
        ])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let writes = match value.field(TAG_WRITE_REQUESTS) {
            Some(TlvValue::Array(items)) => {
                let mut writes = Vec::with_capacity(items.len());
                for item in items {
                    let path = item
                        .field(TAG_DATA_PATH)
                        .and_then(ConcretePath::from_tlv)
                        .ok_or(CodecError::InvalidMessage)?;
                    let data =
                        item.field(TAG_DATA_VALUE).ok_or(CodecError::InvalidMessage)?;
                    writes.push((path, data.clone()));
                }
                writes
            }
            _ => return Err(CodecError::InvalidMessage),
        };
        Ok(Self {
            timed: value
                .field(TAG_WRITE_TIMED)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
            writes,
        })
    }
}

// WriteResponseMessage tags.
const TAG_WRITE_RESPONSES: u8 = 0;

/// WriteResponse payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    /// Per-path outcomes.
    pub responses: Vec<(ConcretePath, ImStatus)>,
}

impl WriteResponse {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![(
            TAG_WRITE_RESPONSES,
            TlvValue::Array(
                self.responses
                    .iter()
                    .map(|(path, status)| {
                        TlvValue::Struct(vec![
                            (TAG_STATUS_PATH, path.to_tlv()),
                            (
                                TAG_STATUS_IB,
                                TlvValue::Struct(vec![(
                                    TAG_STATUS_CODE,
                                    TlvValue::Unsigned(u64::from(status.code())),
                                )]),
                            ),
                        ])
                    })
                    .collect(),
            ),
        )])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let responses = match value.field(TAG_WRITE_RESPONSES) {
            Some(TlvValue::Array(items)) => {
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    let path = item
                        .field(TAG_STATUS_PATH)
                        .and_then(ConcretePath::from_tlv)
                        .ok_or(CodecError::InvalidMessage)?;
                    let status = item
                        .field(TAG_STATUS_IB)
                        .and_then(|ib| ib.field(TAG_STATUS_CODE))
                        .and_then(TlvValue::as_u64)
                        .and_then(|code| u8::try_from(code).ok())
                        .and_then(ImStatus::from_code)
                        .ok_or(CodecError::InvalidMessage)?;
                    responses.push((path, status));
                }
                responses
            }
            _ => return Err(CodecError::InvalidMessage),
        };
        Ok(Self { responses })
    }
}

// InvokeRequestMessage tags.
const TAG_INVOKE_SUPPRESS: u8 = 0;
const TAG_INVOKE_TIMED: u8 = 1;
const TAG_INVOKE_REQUESTS: u8 = 2;
// CommandDataIB tags.
const TAG_CMD_PATH: u8 = 0;
const TAG_CMD_FIELDS: u8 = 1;

/// InvokeRequest payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    /// Suppress the response message.
    pub suppress_response: bool,
    /// Sender claims a timed window is armed.
    pub timed: bool,
    /// Invokes: command path + fields.
    pub invokes: Vec<(CommandPath, TlvValue)>,
}

impl InvokeRequest {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![
            (TAG_INVOKE_SUPPRESS, TlvValue::Bool(self.suppress_response)),
            (TAG_INVOKE_TIMED, TlvValue::Bool(self.timed)),
            (
                TAG_INVOKE_REQUESTS,
                TlvValue::Array(
                    self.invokes
                        .iter()
                        .map(|(path, fields)| {
                            TlvValue::Struct(vec![
                                (TAG_CMD_PATH, path.to_tlv()),
                                (TAG_CMD_FIELDS, fields.clone()),
                            ])
                        })
                        .collect(),
                ),
            ),
        ])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let invokes = match value.field(TAG_INVOKE_REQUESTS) {
            Some(TlvValue::Array(items)) => {
                let mut invokes = Vec::with_capacity(items.len());
                for item in items {
                    let path = item
                        .field(TAG_CMD_PATH)
                        .and_then(CommandPath::from_tlv)
                        .ok_or(CodecError::InvalidMessage)?;
                    let fields = item
                        .field(TAG_CMD_FIELDS)
                        .cloned()
                        .unwrap_or(TlvValue::Struct(vec![]));
                    invokes.push((path, fields));
                }
                invokes
            }
            _ => return Err(CodecError::InvalidMessage),
        };
        Ok(Self {
            suppress_response: value
                .field(TAG_INVOKE_SUPPRESS)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
            timed: value
                .field(TAG_INVOKE_TIMED)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
            invokes,
        })
    }
}

// InvokeResponseMessage tags.
const TAG_INVOKE_RESPONSES: u8 = 1;
// InvokeResponseIB tags.
const TAG_IRSP_COMMAND: u8 = 0;
const TAG_IRSP_STATUS: u8 = 1;

/// One invoke response element.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeResponseIb {
    /// Typed response command.
    Command {
        /// Response path.
        path: CommandPath,
        /// Response fields.
        fields: TlvValue,
    },
    /// Status for the request path.
    Status {
        /// Request path.
        path: CommandPath,
        /// Outcome.
        status: ImStatus,
    },
}

/// InvokeResponse payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvokeResponse {
    /// Responses, mirroring request order.
    pub responses: Vec<InvokeResponseIb>,
}

impl InvokeResponse {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![(
            TAG_INVOKE_RESPONSES,
            TlvValue::Array(
                self.responses
                    .iter()
                    .map(|response| match response {
                        InvokeResponseIb::Command { path, fields } => TlvValue::Struct(vec![(
                            TAG_IRSP_COMMAND,
                            TlvValue::Struct(vec![
                                (TAG_CMD_PATH, path.to_tlv()),
                                (TAG_CMD_FIELDS, fields.clone()),
                            ]),
                        )]),
                        InvokeResponseIb::Status { path, status } => TlvValue::Struct(vec![(
                            TAG_IRSP_STATUS,
                            TlvValue::Struct(vec![
                                (TAG_STATUS_PATH, path.to_tlv()),
                                (
                                    TAG_STATUS_IB,
                                    TlvValue::Struct(vec![(
                                        TAG_STATUS_CODE,
                                        TlvValue::Unsigned(u64::from(status.code())),
                                    )]),
                                ),
                            ]),
                        )]),
                    })
                    .collect(),
            ),
        )])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let mut responses = Vec::new();
        if let Some(TlvValue::Array(items)) = value.field(TAG_INVOKE_RESPONSES) {
            for item in items {
                if let Some(command) = item.field(TAG_IRSP_COMMAND) {
                    let path = command
                        .field(TAG_CMD_PATH)
                        .and_then(CommandPath::from_tlv)
                        .ok_or(CodecError::InvalidMessage)?;
                    let fields = command
                        .field(TAG_CMD_FIELDS)
                        .cloned()
                        .unwrap_or(TlvValue::Struct(vec![]));
                    responses.push(InvokeResponseIb::Command { path, fields });
                } else if let Some(status_ib) = item.field(TAG_IRSP_STATUS) {
                    let path = status_ib
                        .field(TAG_STATUS_PATH)
                        .and_then(CommandPath::from_tlv)
                        .ok_or(CodecError::InvalidMessage)?;
                    let status = status_ib
                        .field(TAG_STATUS_IB)
                        .and_then(|ib| ib.field(TAG_STATUS_CODE))
                        .and_then(TlvValue::as_u64)
                        .and_then(|code| u8::try_from(code).ok())
                        .and_then(ImStatus::from_code)
                        .ok_or(CodecError::InvalidMessage)?;
                    responses.push(InvokeResponseIb::Status { path, status });
                } else {
                    return Err(CodecError::InvalidMessage);
                }
            }
        }
        Ok(Self { responses })
    }
}

// StatusResponseMessage tags.
const TAG_STATUS_RESPONSE_CODE: u8 = 0;

/// StatusResponse payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    /// Message-level status.
    pub status: ImStatus,
}

impl StatusResponse {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![(
            TAG_STATUS_RESPONSE_CODE,
            TlvValue::Unsigned(u64::from(self.status.code())),
        )])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let status = value
            .field(TAG_STATUS_RESPONSE_CODE)
            .and_then(TlvValue::as_u64)
            .and_then(|code| u8::try_from(code).ok())
            .and_then(ImStatus::from_code)
            .ok_or(CodecError::InvalidMessage)?;
        Ok(Self { status })
    }
}

// TimedRequestMessage tags.
const TAG_TIMED_TIMEOUT: u8 = 0;

/// TimedRequest payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedRequest {
    /// Window length in milliseconds.
    pub timeout_ms: u16,
}

impl TimedRequest {
    /// Encode to payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_im(vec![(
            TAG_TIMED_TIMEOUT,
            TlvValue::Unsigned(u64::from(self.timeout_ms)),
        )])
    }

    /// Decode from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value = decode_im(bytes)?;
        let timeout_ms = value
            .field(TAG_TIMED_TIMEOUT)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(CodecError::InvalidMessage)?;
        Ok(Self { timeout_ms })
    }
}
