//! Interaction Model status codes (Matter spec 8.10 wire values).

/// Path- or message-level IM status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImStatus {
    /// Operation succeeded.
    Success = 0x00,
    /// Generic failure.
    Failure = 0x01,
    /// Subscription id is not active on this session.
    InvalidSubscription = 0x7D,
    /// ACL denied the operation.
    UnsupportedAccess = 0x7E,
    /// Endpoint does not exist.
    UnsupportedEndpoint = 0x7F,
    /// Action is malformed.
    InvalidAction = 0x80,
    /// Command not supported by the cluster.
    UnsupportedCommand = 0x81,
    /// Command payload is invalid.
    InvalidCommand = 0x85,
    /// Attribute not supported by the cluster.
    UnsupportedAttribute = 0x86,
    /// Written value violates a constraint.
    ConstraintError = 0x87,
    /// Attribute is not writable.
    UnsupportedWrite = 0x88,
    /// Out of resources to process the request.
    ResourceExhausted = 0x89,
    /// Data version mismatch on a conditional write.
    DataVersionMismatch = 0x92,
    /// Timed interaction window expired.
    Timeout = 0x94,
    /// Responder busy.
    Busy = 0x9C,
    /// Cluster not present on the endpoint.
    UnsupportedCluster = 0xC3,
    /// Write or invoke requires a preceding TimedRequest.
    NeedsTimedInteraction = 0xC6,
    /// Path expansion exceeded the per-request budget.
    PathsExhausted = 0xC8,
}

impl ImStatus {
    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::Failure),
            0x7D => Some(Self::InvalidSubscription),
            0x7E => Some(Self::UnsupportedAccess),
            0x7F => Some(Self::UnsupportedEndpoint),
            0x80 => Some(Self::InvalidAction),
            0x81 => Some(Self::UnsupportedCommand),
            0x85 => Some(Self::InvalidCommand),
            0x86 => Some(Self::UnsupportedAttribute),
            0x87 => Some(Self::ConstraintError),
            0x88 => Some(Self::UnsupportedWrite),
            0x89 => Some(Self::ResourceExhausted),
            0x92 => Some(Self::DataVersionMismatch),
            0x94 => Some(Self::Timeout),
            0x9C => Some(Self::Busy),
            0xC3 => Some(Self::UnsupportedCluster),
            0xC6 => Some(Self::NeedsTimedInteraction),
            0xC8 => Some(Self::PathsExhausted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_roundtrip() {
        for status in [
            ImStatus::Success,
            ImStatus::InvalidSubscription,
            ImStatus::UnsupportedAccess,
            ImStatus::UnsupportedEndpoint,
            ImStatus::UnsupportedCommand,
            ImStatus::UnsupportedAttribute,
            ImStatus::ConstraintError,
            ImStatus::UnsupportedWrite,
            ImStatus::ResourceExhausted,
            ImStatus::DataVersionMismatch,
            ImStatus::Busy,
            ImStatus::UnsupportedCluster,
            ImStatus::NeedsTimedInteraction,
            ImStatus::PathsExhausted,
        ] {
            assert_eq!(ImStatus::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn test_key_codes_match_spec() {
        assert_eq!(ImStatus::UnsupportedEndpoint.code(), 0x7F);
        assert_eq!(ImStatus::UnsupportedCluster.code(), 0xC3);
        assert_eq!(ImStatus::UnsupportedAttribute.code(), 0x86);
        assert_eq!(ImStatus::NeedsTimedInteraction.code(), 0xC6);
    }
}
