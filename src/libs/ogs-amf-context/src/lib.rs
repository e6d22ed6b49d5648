//! NextGCore AMF UE/RAN Context Library
//!
//! The connection-management core of the AMF: the AmfUe, RanUe and AmfRan
//! pools, attach/detach of RanUe to AmfUe with the derived CM-IDLE and
//! CM-CONNECTED state, 5G-TMSI allocation, User Location Information merging
//! and the event subscription registry.
//!
//! All state lives in an explicit [`AmfContext`]; every operation is a method
//! on it and is safe to call from any number of threads.

pub mod error;
pub mod idgen;
pub mod types;
pub mod ngap;
pub mod conv;
pub mod config;
pub mod context;
pub mod amf_ran;
pub mod ran_ue;
pub mod amf_ue;
pub mod location;
pub mod event_subscription;


// Re-export commonly used types
pub use error::{AmfError, AmfResult};
pub use idgen::IdGenerator;
pub use types::{
    AccessType, CmState, ConnHandle, Ecgi, EutraLocation, GlobalRanNodeId, GmmState, Guami,
    N3gaLocation, Ncgi, NrLocation, PlmnId, PlmnSnssai, PolicyAssociation, RanPresent,
    RequestTrigger, Snssai, Tai, UserLocation, INVALID_TMSI, INVALID_UE_NGAP_ID,
    MAX_VALUE_OF_AMF_UE_NGAP_ID, OGS_INVALID_POOL_ID,
};
pub use ngap::{
    BitString, NgapEutraCgi, NgapNrCgi, NgapTai, UserLocationInformation,
    UserLocationInformationEutra, UserLocationInformationN3iwf, UserLocationInformationNr,
};
pub use config::{AmfConfig, ConfigError, IdRange, MaxConf};
pub use context::{AmfContext, ServedIdentities};
pub use amf_ran::AmfRan;
pub use ran_ue::RanUe;
pub use amf_ue::AmfUe;
pub use location::tai_from_ngap;
pub use event_subscription::{
    AmfContextEventSubscription, AmfEvent, AmfEventMode, AmfEventSubscription, AmfEventTrigger,
    AmfEventType, AmfUeEventSubscription,
};
