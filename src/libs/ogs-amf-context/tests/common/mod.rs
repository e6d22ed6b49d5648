//! Common test utilities

#![allow(dead_code)]

use ogs_amf_context::{
    AmfContext, BitString, ConnHandle, NgapNrCgi, NgapTai, UserLocationInformation,
    UserLocationInformationNr,
};

/// Install a test logger once per test binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Context with default configuration and logging enabled
pub fn test_context() -> AmfContext {
    init_logging();
    AmfContext::default()
}

pub fn conn(assoc_id: u64) -> ConnHandle {
    ConnHandle::new(assoc_id)
}

/// NR User Location Information for PLMN 208/93 with the given TAC octets
pub fn nr_location(tac: &[u8]) -> UserLocationInformation {
    UserLocationInformation::Nr(UserLocationInformationNr {
        nr_cgi: NgapNrCgi {
            plmn_identity: vec![0x02, 0xf8, 0x39],
            nr_cell_identity: BitString::new(vec![0x00, 0x00, 0x00, 0x00, 0x10], 36),
        },
        tai: NgapTai {
            plmn_identity: vec![0x02, 0xf8, 0x39],
            tac: tac.to_vec(),
        },
        time_stamp: None,
    })
}
