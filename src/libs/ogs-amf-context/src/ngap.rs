//! Decoded NGAP information elements consumed by the context
//!
//! These are the already-decoded values handed over by the NGAP codec. Byte
//! fields are raw octets as carried on the wire and are not trusted to have the
//! lengths mandated by TS 38.413.

/// ASN.1 BIT STRING
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitString {
    pub bytes: Vec<u8>,
    pub bit_length: u64,
}

impl BitString {
    pub fn new(bytes: Vec<u8>, bit_length: u64) -> Self {
        Self { bytes, bit_length }
    }
}

/// TAI IE (PLMN Identity + TAC)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NgapTai {
    /// PLMN Identity (3 octets, TBCD)
    pub plmn_identity: Vec<u8>,
    /// TAC (3 octets)
    pub tac: Vec<u8>,
}

/// NR-CGI IE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NgapNrCgi {
    pub plmn_identity: Vec<u8>,
    /// NR Cell Identity (36 bits)
    pub nr_cell_identity: BitString,
}

/// EUTRA-CGI IE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NgapEutraCgi {
    pub plmn_identity: Vec<u8>,
    /// E-UTRA Cell Identity (28 bits)
    pub eutra_cell_identity: BitString,
}

/// UserLocationInformationNR
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserLocationInformationNr {
    pub nr_cgi: NgapNrCgi,
    pub tai: NgapTai,
    /// TimeStamp (4 octets, NTP seconds)
    pub time_stamp: Option<Vec<u8>>,
}

/// UserLocationInformationEUTRA
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserLocationInformationEutra {
    pub eutra_cgi: NgapEutraCgi,
    pub tai: NgapTai,
    /// TimeStamp (4 octets, NTP seconds)
    pub time_stamp: Option<Vec<u8>>,
}

/// UserLocationInformationN3IWF
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserLocationInformationN3iwf {
    /// Transport Layer Address (32, 128 or 160 bits)
    pub ip_address: BitString,
    /// Port number (2 octets)
    pub port_number: Vec<u8>,
}

/// User Location Information CHOICE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLocationInformation {
    /// NR (New Radio) user location
    Nr(UserLocationInformationNr),
    /// E-UTRA user location
    Eutra(UserLocationInformationEutra),
    /// Non-3GPP user location behind an N3IWF
    N3iwf(UserLocationInformationN3iwf),
}
