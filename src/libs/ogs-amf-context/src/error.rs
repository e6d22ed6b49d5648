//! AMF Context Error Types

use thiserror::Error;

/// Errors returned by the AMF context pools and the UE/RAN lifecycle operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    /// RanUe has no owning AmfRan (or it can no longer be resolved)
    #[error("RanUe[AMF-UE-NGAP-ID:{amf_ue_ngap_id}] has no Ran reference")]
    MissingRan { amf_ue_ngap_id: u64 },

    /// RanUe is not (or no longer) registered in the RanUe pool
    #[error("RanUe not found (AMF-UE-NGAP-ID:{0})")]
    RanUeNotFound(u64),

    /// AmfRan is not registered in the AmfRan pool
    #[error("AmfRan not found: {0}")]
    AmfRanNotFound(String),

    /// Connection handle is invalid and cannot be used as a pool key
    #[error("Invalid connection handle")]
    InvalidConnHandle,

    /// AmfRan pool is full
    #[error("Maximum number of RANs [{0}] reached")]
    RanLimitReached(usize),

    /// AmfRan cannot accept more RanUe
    #[error("Maximum number of RAN UEs [{max}] reached on {ran}")]
    RanUeLimitReached { ran: String, max: usize },

    /// No AMF UE NGAP ID left to allocate
    #[error("AMF UE NGAP ID space exhausted")]
    AmfUeNgapIdExhausted,

    /// Event subscription is not registered
    #[error("Event subscription not found: {0}")]
    EventSubscriptionNotFound(String),
}

/// Result type for AMF context operations
pub type AmfResult<T> = Result<T, AmfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ran_names_reference() {
        let err = AmfError::MissingRan { amf_ue_ngap_id: 7 };
        let msg = err.to_string();
        assert!(msg.contains("Ran"));
        assert!(msg.contains("7"));
    }

    #[test]
    fn test_ran_ue_not_found_message() {
        let err = AmfError::RanUeNotFound(42);
        assert!(err.to_string().contains("RanUe not found"));
    }
}
