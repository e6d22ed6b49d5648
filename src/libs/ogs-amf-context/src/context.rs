//! AMF Context
//!
//! The registry shared by every procedure of one AMF instance. It owns the
//! AmfUe, RanUe and AmfRan pools, the identity allocators and the served
//! network identities. Entities refer to each other by pool ID only, and every
//! cross reference is resolved through the pools at use time.
//!
//! Operations are split by entity: this module covers identities and load,
//! `amf_ue`, `ran_ue`, `amf_ran`, `location` and `event_subscription` add
//! their own `impl AmfContext` blocks.

use crate::amf_ran::AmfRan;
use crate::amf_ue::AmfUe;
use crate::config::{AmfConfig, MaxConf};
use crate::event_subscription::AmfContextEventSubscription;
use crate::idgen::IdGenerator;
use crate::ran_ue::RanUe;
use crate::types::{ConnHandle, Guami, PlmnSnssai, Tai, INVALID_TMSI};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Event subscription IDs are handed out from a 31-bit range
const MAX_EVENT_SUBSCRIPTION_ID: i64 = i32::MAX as i64;

/// Network identities served by this AMF (read mostly)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServedIdentities {
    pub served_guami: Vec<Guami>,
    pub support_tai_list: Vec<Tai>,
    pub plmn_support_list: Vec<PlmnSnssai>,
}

impl From<&AmfConfig> for ServedIdentities {
    fn from(conf: &AmfConfig) -> Self {
        Self {
            served_guami: conf.served_guami.clone(),
            support_tai_list: conf.support_tai_list.clone(),
            plmn_support_list: conf.plmn_support_list.clone(),
        }
    }
}

// ============================================================================
// AMF Context
// ============================================================================

/// AMF UE/RAN context registry
pub struct AmfContext {
    amf_name: Option<String>,
    pub(crate) max: MaxConf,
    served: RwLock<ServedIdentities>,

    /// AmfRan arena (pool ID -> AmfRan)
    pub(crate) amf_ran_list: DashMap<u64, Arc<AmfRan>>,
    /// Transport connection -> AmfRan pool ID
    pub(crate) ran_conn_hash: DashMap<ConnHandle, u64>,
    /// RanUe pool (AMF UE NGAP ID -> RanUe)
    pub(crate) ran_ue_list: DashMap<u64, Arc<RanUe>>,
    /// AmfUe arena (pool ID -> AmfUe)
    pub(crate) amf_ue_list: DashMap<u64, Arc<AmfUe>>,
    /// SUPI -> AmfUe pool ID
    pub(crate) supi_hash: DashMap<String, u64>,
    /// Subscription ID -> registry entry
    pub(crate) event_subscription_list: DashMap<String, AmfContextEventSubscription>,

    pub(crate) tmsi_pool: IdGenerator,
    pub(crate) amf_ue_ngap_id_pool: IdGenerator,
    pub(crate) event_subscription_id_pool: IdGenerator,

    next_amf_ue_id: AtomicU64,
    next_amf_ran_id: AtomicU64,
}

impl AmfContext {
    /// Create a context from a validated configuration
    pub fn new(conf: AmfConfig) -> Self {
        log::info!(
            "AMF context [{}]: {} GUAMI, {} TAI, max gNB {}, max UE {}",
            conf.amf_name.as_deref().unwrap_or("amf"),
            conf.served_guami.len(),
            conf.support_tai_list.len(),
            conf.max.gnb,
            conf.max.ue
        );
        if let Err(e) = conf.validate() {
            log::warn!("AMF context configuration: {}", e);
        }
        // 5G-TMSI values must fit the i32 carried in the GUTI
        let tmsi_max = conf.tmsi.max.min(i32::MAX as i64);

        Self {
            served: RwLock::new(ServedIdentities::from(&conf)),
            amf_ran_list: DashMap::new(),
            ran_conn_hash: DashMap::new(),
            ran_ue_list: DashMap::new(),
            amf_ue_list: DashMap::new(),
            supi_hash: DashMap::new(),
            event_subscription_list: DashMap::new(),
            tmsi_pool: IdGenerator::new(conf.tmsi.min, tmsi_max),
            amf_ue_ngap_id_pool: IdGenerator::new(
                conf.amf_ue_ngap_id.min,
                conf.amf_ue_ngap_id.max,
            ),
            event_subscription_id_pool: IdGenerator::new(1, MAX_EVENT_SUBSCRIPTION_ID),
            next_amf_ue_id: AtomicU64::new(1),
            next_amf_ran_id: AtomicU64::new(1),
            max: conf.max,
            amf_name: conf.amf_name,
        }
    }

    pub fn amf_name(&self) -> Option<&str> {
        self.amf_name.as_deref()
    }

    pub(crate) fn next_amf_ue_id(&self) -> u64 {
        self.next_amf_ue_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_amf_ran_id(&self) -> u64 {
        self.next_amf_ran_id.fetch_add(1, Ordering::SeqCst)
    }

    // ========================================================================
    // Served identities
    // ========================================================================

    /// Snapshot of the served identities
    pub fn served_identities(&self) -> ServedIdentities {
        self.served
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the served identities (e.g. on configuration reload)
    pub fn set_served_identities(&self, served: ServedIdentities) {
        log::info!(
            "Served identities updated: {} GUAMI, {} TAI",
            served.served_guami.len(),
            served.support_tai_list.len()
        );
        *self.served.write().unwrap_or_else(PoisonError::into_inner) = served;
    }

    pub fn served_guami(&self) -> Vec<Guami> {
        self.served
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .served_guami
            .clone()
    }

    pub fn support_tai_list(&self) -> Vec<Tai> {
        self.served
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .support_tai_list
            .clone()
    }

    pub fn plmn_support_list(&self) -> Vec<PlmnSnssai> {
        self.served
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .plmn_support_list
            .clone()
    }

    /// First served TAI, used as the operator-defined N3GPP TAI
    pub(crate) fn n3gpp_tai(&self) -> Option<Tai> {
        self.served
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .support_tai_list
            .first()
            .cloned()
    }

    /// Check if a TAI is in the served TAI list
    pub fn in_tai_list(&self, tai: &Tai) -> bool {
        self.served
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .support_tai_list
            .iter()
            .any(|served| served == tai)
    }

    // ========================================================================
    // 5G-TMSI / 5G-GUTI
    // ========================================================================

    /// Allocate a 5G-TMSI, or `INVALID_TMSI` when the range is exhausted
    pub fn tmsi_allocate(&self) -> i32 {
        match self.tmsi_pool.allocate().map(i32::try_from) {
            Some(Ok(tmsi)) => tmsi,
            Some(Err(_)) => {
                log::error!("5G-TMSI out of range");
                INVALID_TMSI
            }
            None => {
                log::warn!(
                    "5G-TMSI range [{}..{}] exhausted",
                    self.tmsi_pool.min(),
                    self.tmsi_pool.max()
                );
                INVALID_TMSI
            }
        }
    }

    /// Return a 5G-TMSI to the allocator
    pub fn free_tmsi(&self, tmsi: i32) {
        if tmsi != INVALID_TMSI {
            self.tmsi_pool.free(tmsi as i64);
        }
    }

    /// Build a 5G-GUTI string from the first served GUAMI.
    ///
    /// Empty when no GUAMI is served or the TMSI is invalid.
    pub(crate) fn build_guti(&self, tmsi: i32) -> String {
        if tmsi == INVALID_TMSI {
            return String::new();
        }
        let served = self.served.read().unwrap_or_else(PoisonError::into_inner);
        match served.served_guami.first() {
            Some(guami) => format!(
                "{}{}{}{:08x}",
                guami.plmn_id.mcc, guami.plmn_id.mnc, guami.amf_id, tmsi
            ),
            None => String::new(),
        }
    }

    /// Give a UE a new 5G-TMSI/5G-GUTI, keeping the previous GUTI as old GUTI.
    ///
    /// Returns the new TMSI. On exhaustion the UE keeps its identity and
    /// `INVALID_TMSI` is returned.
    pub fn reallocate_guti(&self, ue: &AmfUe) -> i32 {
        let tmsi = self.tmsi_allocate();
        if tmsi == INVALID_TMSI {
            return INVALID_TMSI;
        }
        let guti = self.build_guti(tmsi);
        let old_tmsi = ue.replace_identity(tmsi, guti);
        self.free_tmsi(old_tmsi);

        log::debug!("[{}] 5G-GUTI reallocated [{}]", ue.supi(), ue.guti());
        tmsi
    }

    // ========================================================================
    // Utility
    // ========================================================================

    pub fn amf_ue_count(&self) -> usize {
        self.amf_ue_list.len()
    }

    pub fn ran_ue_count(&self) -> usize {
        self.ran_ue_list.len()
    }

    pub fn amf_ran_count(&self) -> usize {
        self.amf_ran_list.len()
    }

    /// UE load percentage
    pub fn ue_load(&self) -> i32 {
        if self.max.ue == 0 {
            return 0;
        }
        ((self.amf_ue_list.len() * 100) / self.max.ue) as i32
    }

    /// Clone the AmfUe arena so callers never hold a shard lock while
    /// touching a UE.
    pub(crate) fn amf_ue_snapshot(&self) -> Vec<Arc<AmfUe>> {
        self.amf_ue_list.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl Default for AmfContext {
    fn default() -> Self {
        Self::new(AmfConfig::default())
    }
}

impl std::fmt::Debug for AmfContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmfContext")
            .field("amf_name", &self.amf_name)
            .field("amf_ran", &self.amf_ran_list.len())
            .field("ran_ue", &self.ran_ue_list.len())
            .field("amf_ue", &self.amf_ue_list.len())
            .field("event_subscription", &self.event_subscription_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdRange;
    use crate::types::PlmnId;

    #[test]
    fn test_context_new() {
        let ctx = AmfContext::default();
        assert_eq!(ctx.amf_ue_count(), 0);
        assert_eq!(ctx.ran_ue_count(), 0);
        assert_eq!(ctx.amf_ran_count(), 0);
        assert_eq!(ctx.served_guami().len(), 1);
        assert_eq!(ctx.ue_load(), 0);
    }

    #[test]
    fn test_tmsi_allocate_and_free() {
        let conf = AmfConfig {
            tmsi: IdRange::new(1, 2),
            ..Default::default()
        };
        let ctx = AmfContext::new(conf);

        let a = ctx.tmsi_allocate();
        let b = ctx.tmsi_allocate();
        assert_ne!(a, INVALID_TMSI);
        assert_ne!(b, INVALID_TMSI);
        assert_ne!(a, b);
        assert_eq!(ctx.tmsi_allocate(), INVALID_TMSI);

        ctx.free_tmsi(a);
        assert_eq!(ctx.tmsi_allocate(), a);

        // sentinel is never handed to the allocator
        ctx.free_tmsi(INVALID_TMSI);
    }

    #[test]
    fn test_tmsi_range_clamped() {
        let conf = AmfConfig {
            tmsi: IdRange::new(i32::MAX as i64, i32::MAX as i64 + 10),
            ..Default::default()
        };
        let ctx = AmfContext::new(conf);
        assert_eq!(ctx.tmsi_pool.max(), i32::MAX as i64);

        assert_eq!(ctx.tmsi_allocate(), i32::MAX);
        assert_eq!(ctx.tmsi_allocate(), INVALID_TMSI);
        assert_eq!(ctx.tmsi_pool.allocated(), 1);

        ctx.free_tmsi(i32::MAX);
        assert_eq!(ctx.tmsi_allocate(), i32::MAX);
    }

    #[test]
    fn test_build_guti() {
        let ctx = AmfContext::default();
        assert_eq!(ctx.build_guti(0x1234), "00101cafe0000001234");
        assert_eq!(ctx.build_guti(INVALID_TMSI), "");

        ctx.set_served_identities(ServedIdentities::default());
        assert_eq!(ctx.build_guti(0x1234), "");
    }

    #[test]
    fn test_in_tai_list() {
        let ctx = AmfContext::default();
        assert!(ctx.in_tai_list(&Tai::new(PlmnId::new("001", "01"), "000001")));
        assert!(!ctx.in_tai_list(&Tai::new(PlmnId::new("001", "01"), "000002")));
    }

    #[test]
    fn test_ue_load() {
        let conf = AmfConfig {
            max: MaxConf {
                ue: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = AmfContext::new(conf);
        ctx.new_amf_ue("imsi-001010000000001");
        assert_eq!(ctx.ue_load(), 25);
    }
}
