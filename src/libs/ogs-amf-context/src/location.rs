//! User Location Information handling
//!
//! Decodes NGAP User Location Information into the SBI location model and
//! merges it into the RanUe and, when attached, the AmfUe. Each location kind
//! is overwritten only by an update of the same kind.

use crate::context::AmfContext;
use crate::conv::{
    bit_string_to_hex, ip_address_to_string, plmn_id_from_bytes, port_number_from_bytes,
    tac_from_bytes, time_stamp_to_system_time,
};
use crate::ngap::{NgapTai, UserLocationInformation};
use crate::ran_ue::RanUe;
use crate::types::{Ecgi, EutraLocation, N3gaLocation, Ncgi, NrLocation, Tai};
use std::sync::PoisonError;
use std::time::SystemTime;

/// Decode an NGAP TAI IE
pub fn tai_from_ngap(tai: &NgapTai) -> Tai {
    Tai {
        plmn_id: plmn_id_from_bytes(&tai.plmn_identity),
        tac: tac_from_bytes(&tai.tac),
    }
}

/// Timestamp and age of location information of an NR/E-UTRA update
fn location_time(time_stamp: Option<&[u8]>) -> (Option<i32>, SystemTime) {
    match time_stamp.and_then(time_stamp_to_system_time) {
        Some(t) => (Some(0), t),
        None => {
            if let Some(raw) = time_stamp {
                log::debug!("Invalid TimeStamp [{}]", hex::encode(raw));
            }
            (None, SystemTime::now())
        }
    }
}

impl AmfContext {
    /// Merge a User Location Information IE into a RanUe.
    ///
    /// `None` leaves all location state untouched. The decoded TAC is mirrored
    /// onto the RanUe. If an AmfUe is attached it takes over the whole
    /// location and TAI, and its location-changed flag is raised when the TAC
    /// differs from the one it had.
    pub fn ran_ue_update_location(&self, ran_ue: &RanUe, info: Option<&UserLocationInformation>) {
        let Some(info) = info else {
            return;
        };

        let (location, tai) = {
            let mut current = ran_ue
                .location
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            let tai = match info {
                UserLocationInformation::Nr(nr) => {
                    let tai = tai_from_ngap(&nr.tai);
                    let (age, timestamp) = location_time(nr.time_stamp.as_deref());
                    current.location.nr_location = Some(NrLocation {
                        tai: tai.clone(),
                        ncgi: Ncgi {
                            plmn_id: plmn_id_from_bytes(&nr.nr_cgi.plmn_identity),
                            nr_cell_id: bit_string_to_hex(&nr.nr_cgi.nr_cell_identity),
                        },
                        age_of_location_information: age,
                        ue_location_timestamp: Some(timestamp),
                    });
                    tai
                }
                UserLocationInformation::Eutra(eutra) => {
                    let tai = tai_from_ngap(&eutra.tai);
                    let (age, timestamp) = location_time(eutra.time_stamp.as_deref());
                    current.location.eutra_location = Some(EutraLocation {
                        tai: tai.clone(),
                        ecgi: Ecgi {
                            plmn_id: plmn_id_from_bytes(&eutra.eutra_cgi.plmn_identity),
                            eutra_cell_id: bit_string_to_hex(&eutra.eutra_cgi.eutra_cell_identity),
                        },
                        age_of_location_information: age,
                        ue_location_timestamp: Some(timestamp),
                    });
                    tai
                }
                UserLocationInformation::N3iwf(n3iwf) => {
                    let (ue_ipv4_addr, ue_ipv6_addr) = ip_address_to_string(&n3iwf.ip_address);
                    let n3gpp_tai = self.n3gpp_tai();
                    if n3gpp_tai.is_none() {
                        log::warn!("No served TAI for N3IWF user location");
                    }
                    current.location.n3ga_location = Some(N3gaLocation {
                        n3gpp_tai: n3gpp_tai.clone(),
                        ue_ipv4_addr,
                        ue_ipv6_addr,
                        port_number: port_number_from_bytes(&n3iwf.port_number),
                    });
                    n3gpp_tai.unwrap_or_default()
                }
            };

            current.tai = tai.clone();
            (current.location.clone(), tai)
        };

        log::debug!(
            "RanUe[AMF_UE_NGAP_ID:{}] location [{}:{}]",
            ran_ue.amf_ue_ngap_id(),
            tai.plmn_id,
            tai.tac
        );

        if let Some(ue) = self.ran_ue_amf_ue(ran_ue) {
            ue.update_location(&location, &tai);
        }
    }
}
