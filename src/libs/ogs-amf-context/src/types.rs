//! AMF context data model
//!
//! Display-form identifiers (digit/hex strings) as exchanged over the SBI,
//! plus the small enums shared by the UE, RAN and RAN UE contexts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

// ============================================================================
// Constants
// ============================================================================

/// Invalid pool ID
pub const OGS_INVALID_POOL_ID: u64 = 0;
/// Invalid UE NGAP ID (unset association slot)
pub const INVALID_UE_NGAP_ID: u64 = 0xffffffffffffffff;
/// TMSI allocation failure sentinel
pub const INVALID_TMSI: i32 = -1;
/// Maximum AMF UE NGAP ID (40 bits)
pub const MAX_VALUE_OF_AMF_UE_NGAP_ID: i64 = 1_099_511_627_775;

// ============================================================================
// Access / state enums
// ============================================================================

/// Access type under which a UE holds independent CM and GMM state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessType {
    #[default]
    #[serde(rename = "3GPP_ACCESS")]
    ThreeGpp,
    #[serde(rename = "NON_3GPP_ACCESS")]
    NonThreeGpp,
}

impl AccessType {
    /// All access types, for per-access iteration
    pub const ALL: [AccessType; 2] = [AccessType::ThreeGpp, AccessType::NonThreeGpp];
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::ThreeGpp => write!(f, "3GPP_ACCESS"),
            AccessType::NonThreeGpp => write!(f, "NON_3GPP_ACCESS"),
        }
    }
}

/// Kind of RAN node behind an NG connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RanPresent {
    #[default]
    GnbId,
    NgeNbId,
    N3iwfId,
}

/// 5GMM state per access type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GmmState {
    #[default]
    Deregistered,
    Authentication,
    SecurityMode,
    ContextSetup,
    Registered,
    DeregistrationInitiated,
}

/// Connection-management state, derived from the RanUe association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmState {
    Idle,
    Connected,
}

// ============================================================================
// Connection handle
// ============================================================================

/// Opaque handle of the transport association (SCTP assoc) of one RAN node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(u64);

impl ConnHandle {
    /// Handle that never identifies a connection
    pub const INVALID: ConnHandle = ConnHandle(0);

    /// Wrap a transport association identifier
    pub fn new(assoc_id: u64) -> Self {
        Self(assoc_id)
    }

    /// Raw association identifier
    pub fn assoc_id(&self) -> u64 {
        self.0
    }

    /// Check if the handle can be used as a pool key
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Default for ConnHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "assoc:{}", self.0)
    }
}

// ============================================================================
// Identities
// ============================================================================

/// PLMN identity in display form
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlmnId {
    pub mcc: String,
    pub mnc: String,
}

impl PlmnId {
    /// Create a new PLMN ID
    pub fn new(mcc: &str, mnc: &str) -> Self {
        Self {
            mcc: mcc.to_string(),
            mnc: mnc.to_string(),
        }
    }
}

impl fmt::Display for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.mcc, self.mnc)
    }
}

/// GUAMI (Globally Unique AMF Identifier)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guami {
    pub plmn_id: PlmnId,
    /// AMF Region + Set + Pointer, 6 hex digits
    pub amf_id: String,
}

/// Tracking Area Identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tai {
    pub plmn_id: PlmnId,
    /// TAC, 6 hex digits
    pub tac: String,
}

impl Tai {
    pub fn new(plmn_id: PlmnId, tac: &str) -> Self {
        Self {
            plmn_id,
            tac: tac.to_string(),
        }
    }
}

/// S-NSSAI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snssai {
    pub sst: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd: Option<String>,
}

/// PLMN with its supported slices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlmnSnssai {
    pub plmn_id: PlmnId,
    #[serde(default)]
    pub s_nssai_list: Vec<Snssai>,
}

/// Global RAN node identity, as received in NG Setup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRanNodeId {
    pub plmn_id: PlmnId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ng_enb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n3iwf_id: Option<String>,
}

// ============================================================================
// Location
// ============================================================================

/// NR Cell Global Identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ncgi {
    pub plmn_id: PlmnId,
    pub nr_cell_id: String,
}

/// E-UTRA Cell Global Identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ecgi {
    pub plmn_id: PlmnId,
    pub eutra_cell_id: String,
}

/// NR user location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NrLocation {
    pub tai: Tai,
    pub ncgi: Ncgi,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_of_location_information: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ue_location_timestamp: Option<SystemTime>,
}

/// E-UTRA user location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EutraLocation {
    pub tai: Tai,
    pub ecgi: Ecgi,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_of_location_information: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ue_location_timestamp: Option<SystemTime>,
}

/// Non-3GPP (N3IWF) user location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N3gaLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n3gpp_tai: Option<Tai>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ue_ipv4_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ue_ipv6_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_number: Option<u16>,
}

/// User location; each variant keeps the last update of its kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr_location: Option<NrLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eutra_location: Option<EutraLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n3ga_location: Option<N3gaLocation>,
}

// ============================================================================
// Policy
// ============================================================================

/// AM policy request trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestTrigger {
    LocCh,
    PraCh,
    ServAreaCh,
    RfspCh,
    AllowedNssaiCh,
    UeAmbrCh,
}

/// AM policy association, as returned by the PCF
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAssociation {
    #[serde(default)]
    pub triggers: Vec<RequestTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfsp: Option<i32>,
    #[serde(default)]
    pub serv_area_res: bool,
    #[serde(default)]
    pub supp_feat: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_handle_validity() {
        assert!(!ConnHandle::INVALID.is_valid());
        assert!(!ConnHandle::default().is_valid());
        assert!(ConnHandle::new(3).is_valid());
        assert_eq!(ConnHandle::new(3).assoc_id(), 3);
    }

    #[test]
    fn test_access_type_serde() {
        let s = serde_json::to_string(&AccessType::ThreeGpp).unwrap();
        assert_eq!(s, "\"3GPP_ACCESS\"");
        let at: AccessType = serde_json::from_str("\"NON_3GPP_ACCESS\"").unwrap();
        assert_eq!(at, AccessType::NonThreeGpp);
    }

    #[test]
    fn test_tai_camel_case() {
        let tai = Tai::new(PlmnId::new("208", "93"), "000001");
        let v = serde_json::to_value(&tai).unwrap();
        assert_eq!(v["plmnId"]["mcc"], "208");
        assert_eq!(v["tac"], "000001");
    }

    #[test]
    fn test_user_location_default_empty() {
        let loc = UserLocation::default();
        assert!(loc.nr_location.is_none());
        assert!(loc.eutra_location.is_none());
        assert!(loc.n3ga_location.is_none());
    }
}
