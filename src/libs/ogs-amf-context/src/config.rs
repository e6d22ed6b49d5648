//! AMF Context Configuration
//!
//! Served network identities and pool limits, read from the `amf:` YAML
//! section the same way the other NextGCore configuration sections are.

use crate::types::{Guami, PlmnId, PlmnSnssai, Tai};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Default maximum number of gNBs
pub const MAX_NUM_OF_GNB: usize = 64;
/// Default maximum number of UEs
pub const MAX_NUM_OF_UE: usize = 1024;
/// Default maximum number of RAN UEs on one NG connection
pub const MAX_NUM_OF_RAN_UE_PER_RAN: usize = 65536;

/// Pool limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxConf {
    pub gnb: usize,
    pub ue: usize,
    pub ran_ue_per_ran: usize,
}

impl Default for MaxConf {
    fn default() -> Self {
        MaxConf {
            gnb: MAX_NUM_OF_GNB,
            ue: MAX_NUM_OF_UE,
            ran_ue_per_ran: MAX_NUM_OF_RAN_UE_PER_RAN,
        }
    }
}

/// Closed identifier range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub min: i64,
    pub max: i64,
}

impl IdRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

/// AMF context configuration (`amf:` section)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmfConfig {
    pub amf_name: Option<String>,
    pub served_guami: Vec<Guami>,
    pub support_tai_list: Vec<Tai>,
    pub plmn_support_list: Vec<PlmnSnssai>,
    pub max: MaxConf,
    /// 5G-TMSI allocation range
    pub tmsi: IdRange,
    /// AMF UE NGAP ID allocation range
    pub amf_ue_ngap_id: IdRange,
}

impl Default for AmfConfig {
    fn default() -> Self {
        let plmn_id = PlmnId::new("001", "01");
        AmfConfig {
            amf_name: None,
            served_guami: vec![Guami {
                plmn_id: plmn_id.clone(),
                amf_id: "cafe00".to_string(),
            }],
            support_tai_list: vec![Tai::new(plmn_id.clone(), "000001")],
            plmn_support_list: vec![PlmnSnssai {
                plmn_id,
                s_nssai_list: Vec::new(),
            }],
            max: MaxConf::default(),
            tmsi: IdRange::new(1, i32::MAX as i64),
            amf_ue_ngap_id: IdRange::new(1, crate::types::MAX_VALUE_OF_AMF_UE_NGAP_ID),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    amf: AmfConfig,
}

impl AmfConfig {
    /// Parse the `amf:` section of a YAML document and validate it
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        file.amf.validate()?;
        Ok(file.amf)
    }

    /// Read and parse a YAML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.served_guami.is_empty() {
            return Err(ConfigError::Validation("No served GUAMI".to_string()));
        }
        for guami in &self.served_guami {
            validate_plmn_id(&guami.plmn_id)?;
            if guami.amf_id.len() != 6 || hex::decode(&guami.amf_id).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid AMF ID [{}]",
                    guami.amf_id
                )));
            }
        }
        for tai in &self.support_tai_list {
            validate_plmn_id(&tai.plmn_id)?;
        }
        for (name, range) in [("tmsi", self.tmsi), ("amf_ue_ngap_id", self.amf_ue_ngap_id)] {
            if range.min > range.max || range.min < 0 {
                return Err(ConfigError::Validation(format!(
                    "Invalid {} range [{}..{}]",
                    name, range.min, range.max
                )));
            }
        }
        if self.tmsi.max > i32::MAX as i64 {
            return Err(ConfigError::Validation(format!(
                "TMSI range upper bound {} exceeds {}",
                self.tmsi.max,
                i32::MAX
            )));
        }
        if self.max.gnb == 0 || self.max.ran_ue_per_ran == 0 {
            return Err(ConfigError::Validation("Pool limits must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn validate_plmn_id(plmn_id: &PlmnId) -> Result<(), ConfigError> {
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if plmn_id.mcc.len() != 3 || !digits(&plmn_id.mcc) {
        return Err(ConfigError::Validation(format!("Invalid MCC [{}]", plmn_id.mcc)));
    }
    if !(2..=3).contains(&plmn_id.mnc.len()) || !digits(&plmn_id.mnc) {
        return Err(ConfigError::Validation(format!("Invalid MNC [{}]", plmn_id.mnc)));
    }
    Ok(())
}
