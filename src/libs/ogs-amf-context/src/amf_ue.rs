//! AMF UE Context
//!
//! One AmfUe per subscriber. It outlives any single radio connection: RanUe
//! detachment leaves the AmfUe in the pool, only `amf_ue_remove` deletes it.

use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::event_subscription::AmfUeEventSubscription;
use crate::ran_ue::RanUe;
use crate::types::{
    AccessType, CmState, GmmState, PolicyAssociation, Tai, UserLocation, INVALID_TMSI,
    INVALID_UE_NGAP_ID, OGS_INVALID_POOL_ID,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct UeIdentity {
    tmsi: i32,
    guti: String,
    old_guti: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct UeLocation {
    location: UserLocation,
    tai: Tai,
    location_changed: bool,
}

#[derive(Debug, Clone, Default)]
struct UePolicy {
    policy_association_id: Option<String>,
    am_policy_association: Option<PolicyAssociation>,
}

// ============================================================================
// AMF UE
// ============================================================================

/// AMF UE context
#[derive(Debug)]
pub struct AmfUe {
    /// Pool ID
    id: u64,
    /// SUPI (may be empty)
    supi: String,
    identity: RwLock<UeIdentity>,
    /// Access type -> AMF UE NGAP ID of the attached RanUe
    ran_ue: RwLock<HashMap<AccessType, u64>>,
    gmm_state: RwLock<HashMap<AccessType, GmmState>>,
    location: RwLock<UeLocation>,
    policy: RwLock<UePolicy>,
    /// Per-UE mirror of the event subscriptions naming this UE
    event_subscriptions: RwLock<HashMap<String, AmfUeEventSubscription>>,
}

impl AmfUe {
    pub(crate) fn new(id: u64, supi: &str, tmsi: i32, guti: String) -> Self {
        Self {
            id,
            supi: supi.to_string(),
            identity: RwLock::new(UeIdentity {
                tmsi,
                guti,
                old_guti: None,
            }),
            ran_ue: RwLock::new(HashMap::new()),
            gmm_state: RwLock::new(HashMap::new()),
            location: RwLock::new(UeLocation::default()),
            policy: RwLock::new(UePolicy::default()),
            event_subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn supi(&self) -> &str {
        &self.supi
    }

    pub fn tmsi(&self) -> i32 {
        self.identity.read().unwrap_or_else(PoisonError::into_inner).tmsi
    }

    pub fn guti(&self) -> String {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .guti
            .clone()
    }

    pub fn old_guti(&self) -> Option<String> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .old_guti
            .clone()
    }

    /// Install a new TMSI/GUTI and return the previous TMSI
    pub(crate) fn replace_identity(&self, tmsi: i32, guti: String) -> i32 {
        let mut identity = self.identity.write().unwrap_or_else(PoisonError::into_inner);
        let old_tmsi = identity.tmsi;
        let old_guti = std::mem::replace(&mut identity.guti, guti);
        if !old_guti.is_empty() {
            identity.old_guti = Some(old_guti);
        }
        identity.tmsi = tmsi;
        old_tmsi
    }

    /// Invalidate the TMSI and return the value held before
    pub(crate) fn take_tmsi(&self) -> i32 {
        let mut identity = self.identity.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut identity.tmsi, INVALID_TMSI)
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    fn ran_ue_slot(&self, access_type: AccessType) -> Option<u64> {
        let ran_ue = self.ran_ue.read().unwrap_or_else(PoisonError::into_inner);
        ran_ue
            .get(&access_type)
            .copied()
            .filter(|id| *id != INVALID_UE_NGAP_ID)
    }

    /// AMF UE NGAP ID of the RanUe attached for an access type
    pub fn ran_ue_id(&self, access_type: AccessType) -> Option<u64> {
        self.ran_ue_slot(access_type)
    }

    /// CM-IDLE: no RanUe attached for the access type
    pub fn cm_idle(&self, access_type: AccessType) -> bool {
        self.ran_ue_slot(access_type).is_none()
    }

    /// CM-CONNECTED: a RanUe is attached for the access type
    pub fn cm_connect(&self, access_type: AccessType) -> bool {
        self.ran_ue_slot(access_type).is_some()
    }

    pub fn cm_state(&self, access_type: AccessType) -> CmState {
        match self.ran_ue_slot(access_type) {
            Some(_) => CmState::Connected,
            None => CmState::Idle,
        }
    }

    /// Store a RanUe for an access type, returning the one it replaced
    fn link(&self, access_type: AccessType, amf_ue_ngap_id: u64) -> Option<u64> {
        let mut ran_ue = self.ran_ue.write().unwrap_or_else(PoisonError::into_inner);
        ran_ue
            .insert(access_type, amf_ue_ngap_id)
            .filter(|id| *id != INVALID_UE_NGAP_ID)
    }

    /// Remove the association of an access type
    fn unlink(&self, access_type: AccessType) -> Option<u64> {
        let mut ran_ue = self.ran_ue.write().unwrap_or_else(PoisonError::into_inner);
        ran_ue
            .remove(&access_type)
            .filter(|id| *id != INVALID_UE_NGAP_ID)
    }

    /// Remove every association that still names the given RanUe.
    ///
    /// Check and delete happen under one lock, so a newer RanUe attached in
    /// the meantime is never touched.
    pub(crate) fn unlink_if(&self, amf_ue_ngap_id: u64) -> Vec<AccessType> {
        let mut ran_ue = self.ran_ue.write().unwrap_or_else(PoisonError::into_inner);
        let matched: Vec<AccessType> = ran_ue
            .iter()
            .filter(|(_, id)| **id == amf_ue_ngap_id)
            .map(|(at, _)| *at)
            .collect();
        for at in &matched {
            ran_ue.remove(at);
        }
        matched
    }

    // ========================================================================
    // 5GMM state
    // ========================================================================

    pub fn state(&self, access_type: AccessType) -> GmmState {
        self.gmm_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&access_type)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_state(&self, access_type: AccessType, state: GmmState) {
        let mut gmm_state = self.gmm_state.write().unwrap_or_else(PoisonError::into_inner);
        let old = gmm_state.insert(access_type, state).unwrap_or_default();
        if old != state {
            log::debug!("[{}] {} GMM state {:?} -> {:?}", self.supi, access_type, old, state);
        }
    }

    pub fn is_registered(&self, access_type: AccessType) -> bool {
        self.state(access_type) == GmmState::Registered
    }

    // ========================================================================
    // Location
    // ========================================================================

    pub fn location(&self) -> UserLocation {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .location
            .clone()
    }

    pub fn tai(&self) -> Tai {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tai
            .clone()
    }

    pub fn location_changed(&self) -> bool {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .location_changed
    }

    /// Acknowledge a location change (after it has been reported)
    pub fn clear_location_changed(&self) {
        self.location
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .location_changed = false;
    }

    /// Take over the location decoded on the serving RanUe
    pub(crate) fn update_location(&self, location: &UserLocation, tai: &Tai) {
        let mut current = self.location.write().unwrap_or_else(PoisonError::into_inner);
        if current.tai.tac != tai.tac {
            log::debug!(
                "[{}] TAC changed [{}] -> [{}]",
                self.supi,
                current.tai.tac,
                tai.tac
            );
            current.location_changed = true;
        }
        current.location = location.clone();
        current.tai = tai.clone();
    }

    // ========================================================================
    // AM policy association
    // ========================================================================

    pub fn policy_association_id(&self) -> Option<String> {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .policy_association_id
            .clone()
    }

    pub fn am_policy_association(&self) -> Option<PolicyAssociation> {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .am_policy_association
            .clone()
    }

    pub fn set_policy_association(&self, id: &str, association: PolicyAssociation) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        policy.policy_association_id = Some(id.to_string());
        policy.am_policy_association = Some(association);
    }

    pub fn clear_policy_association(&self) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        policy.policy_association_id = None;
        policy.am_policy_association = None;
    }

    // ========================================================================
    // Event subscription mirror
    // ========================================================================

    pub fn add_event_subscription(&self, id: &str, subscription: AmfUeEventSubscription) {
        self.event_subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), subscription);
    }

    pub fn find_event_subscription(&self, id: &str) -> Option<AmfUeEventSubscription> {
        self.event_subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove_event_subscription(&self, id: &str) -> Option<AmfUeEventSubscription> {
        self.event_subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn event_subscription_ids(&self) -> Vec<String> {
        self.event_subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub(crate) fn clear_event_subscriptions(&self) {
        self.event_subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ============================================================================
// AMF UE Management
// ============================================================================

impl AmfContext {
    /// Create an AmfUe and index it by SUPI.
    ///
    /// An existing AmfUe under the same SUPI is replaced, not merged. An empty
    /// SUPI is accepted but never indexed.
    pub fn new_amf_ue(&self, supi: &str) -> Arc<AmfUe> {
        let id = self.next_amf_ue_id();
        let tmsi = self.tmsi_allocate();
        let guti = self.build_guti(tmsi);
        let ue = Arc::new(AmfUe::new(id, supi, tmsi, guti));

        self.amf_ue_list.insert(id, Arc::clone(&ue));

        if supi.is_empty() {
            log::debug!("AmfUe[{}] added without SUPI, not indexed", id);
            return ue;
        }

        if let Some(old_id) = self.supi_hash.insert(supi.to_string(), id) {
            if let Some((_, old)) = self.amf_ue_list.remove(&old_id) {
                log::warn!("[{}] AmfUe replaced (old id={}, new id={})", supi, old_id, id);
                for access_type in AccessType::ALL {
                    self.detach_ran_ue(&old, access_type);
                }
                self.free_tmsi(old.take_tmsi());
            }
        }

        log::debug!("[{}] AmfUe added (id={}, guti={})", supi, id, ue.guti());
        ue
    }

    /// Find AmfUe by SUPI
    pub fn amf_ue_find_by_supi(&self, supi: &str) -> Option<Arc<AmfUe>> {
        if supi.is_empty() {
            return None;
        }
        let id = *self.supi_hash.get(supi)?;
        self.amf_ue_find_by_id(id)
    }

    /// Find AmfUe by pool ID
    pub fn amf_ue_find_by_id(&self, id: u64) -> Option<Arc<AmfUe>> {
        if id == OGS_INVALID_POOL_ID {
            return None;
        }
        self.amf_ue_list.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Find AmfUe by 5G-GUTI
    pub fn amf_ue_find_by_guti(&self, guti: &str) -> Option<Arc<AmfUe>> {
        if guti.is_empty() {
            return None;
        }
        self.amf_ue_snapshot().into_iter().find(|ue| ue.guti() == guti)
    }

    /// Find AmfUe by AM policy association ID
    pub fn amf_ue_find_by_policy_association_id(&self, id: &str) -> Option<Arc<AmfUe>> {
        self.amf_ue_snapshot()
            .into_iter()
            .find(|ue| ue.policy_association_id().as_deref() == Some(id))
    }

    /// Deregister an AmfUe.
    ///
    /// Every RanUe still attached is removed, the TMSI is freed and the UE
    /// leaves the SUPI index (if the index still names it) and the arena.
    pub fn amf_ue_remove(&self, ue: &AmfUe) {
        for access_type in AccessType::ALL {
            let Some(amf_ue_ngap_id) = ue.ran_ue_id(access_type) else {
                continue;
            };
            match self.ran_ue_find_by_amf_ue_ngap_id(amf_ue_ngap_id) {
                Some(ran_ue) => {
                    if let Err(e) = self.ran_ue_remove(&ran_ue) {
                        log::warn!("[{}] {}", ue.supi, e);
                        self.detach_ran_ue(ue, access_type);
                    }
                }
                None => self.detach_ran_ue(ue, access_type),
            }
        }

        self.free_tmsi(ue.take_tmsi());
        ue.clear_event_subscriptions();

        if !ue.supi.is_empty() {
            self.supi_hash.remove_if(&ue.supi, |_, id| *id == ue.id);
        }
        if self.amf_ue_list.remove(&ue.id).is_some() {
            log::debug!("[{}] AmfUe removed (id={})", ue.supi, ue.id);
        }
    }

    // ========================================================================
    // Attach / Detach
    // ========================================================================

    /// Attach a RanUe to an AmfUe (CM-IDLE -> CM-CONNECTED).
    ///
    /// The access type comes from the RanUe's AmfRan. Attaching the same
    /// RanUe again is a no-op. A different RanUe attached for the same access
    /// type is replaced and loses its back reference.
    pub fn attach_ran_ue(&self, ue: &AmfUe, ran_ue: &RanUe) -> AmfResult<()> {
        let amf_ue_ngap_id = ran_ue.amf_ue_ngap_id();
        if ran_ue.is_removed() {
            return Err(AmfError::RanUeNotFound(amf_ue_ngap_id));
        }
        let ran = self
            .amf_ran_find_by_id(ran_ue.ran_id())
            .ok_or(AmfError::MissingRan { amf_ue_ngap_id })?;
        let access_type = ran.an_type();

        let replaced = ue.link(access_type, amf_ue_ngap_id);
        let previous_ue = ran_ue.set_amf_ue_id(ue.id);

        // A concurrent Remove may have started after the check above
        if ran_ue.is_removed() {
            ue.unlink_if(amf_ue_ngap_id);
            ran_ue.clear_amf_ue_id_if(ue.id);
            return Err(AmfError::RanUeNotFound(amf_ue_ngap_id));
        }

        if let Some(old) = replaced.filter(|old| *old != amf_ue_ngap_id) {
            if let Some(old_ran_ue) = self.ran_ue_find_by_amf_ue_ngap_id(old) {
                old_ran_ue.clear_amf_ue_id_if(ue.id);
            }
            log::debug!(
                "[{}] {} RanUe[AMF_UE_NGAP_ID:{}] replaced by [AMF_UE_NGAP_ID:{}]",
                ue.supi,
                access_type,
                old,
                amf_ue_ngap_id
            );
        }

        if previous_ue != OGS_INVALID_POOL_ID && previous_ue != ue.id {
            if let Some(previous) = self.amf_ue_find_by_id(previous_ue) {
                previous.unlink_if(amf_ue_ngap_id);
            }
        }

        log::debug!(
            "[{}] {} attached RanUe[RAN_UE_NGAP_ID:{} AMF_UE_NGAP_ID:{}]",
            ue.supi,
            access_type,
            ran_ue.ran_ue_ngap_id(),
            amf_ue_ngap_id
        );
        Ok(())
    }

    /// Detach the RanUe of an access type (CM-CONNECTED -> CM-IDLE).
    ///
    /// No-op when nothing is attached. The RanUe back reference is cleared
    /// only if it still points at this UE.
    pub fn detach_ran_ue(&self, ue: &AmfUe, access_type: AccessType) {
        let Some(amf_ue_ngap_id) = ue.unlink(access_type) else {
            return;
        };
        if let Some(ran_ue) = self.ran_ue_find_by_amf_ue_ngap_id(amf_ue_ngap_id) {
            ran_ue.clear_amf_ue_id_if(ue.id);
        }
        log::debug!(
            "[{}] {} detached RanUe[AMF_UE_NGAP_ID:{}]",
            ue.supi,
            access_type,
            amf_ue_ngap_id
        );
    }

    /// AmfUe a RanUe is attached to, if any
    pub fn ran_ue_amf_ue(&self, ran_ue: &RanUe) -> Option<Arc<AmfUe>> {
        self.amf_ue_find_by_id(ran_ue.amf_ue_id())
    }
}
