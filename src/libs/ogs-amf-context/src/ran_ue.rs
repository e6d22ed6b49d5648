//! RAN UE Context
//!
//! One RanUe per UE-associated logical NG connection. It is keyed by its
//! AMF UE NGAP ID in the context pool and by its RAN UE NGAP ID in the
//! collection of the AmfRan it belongs to.

use crate::amf_ran::AmfRan;
use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::types::{Tai, UserLocation, OGS_INVALID_POOL_ID};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy)]
struct RanBinding {
    /// Pool ID of the owning AmfRan
    ran_id: u64,
    ran_ue_ngap_id: i64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RanUeLocation {
    pub(crate) location: UserLocation,
    pub(crate) tai: Tai,
}

// ============================================================================
// RAN UE
// ============================================================================

/// RAN UE context
#[derive(Debug)]
pub struct RanUe {
    amf_ue_ngap_id: u64,
    binding: RwLock<RanBinding>,
    /// Pool ID of the attached AmfUe (`OGS_INVALID_POOL_ID` when detached)
    amf_ue_id: AtomicU64,
    removed: AtomicBool,
    pub(crate) location: RwLock<RanUeLocation>,
}

impl RanUe {
    pub(crate) fn new(amf_ue_ngap_id: u64, ran_id: u64, ran_ue_ngap_id: i64) -> Self {
        Self {
            amf_ue_ngap_id,
            binding: RwLock::new(RanBinding {
                ran_id,
                ran_ue_ngap_id,
            }),
            amf_ue_id: AtomicU64::new(OGS_INVALID_POOL_ID),
            removed: AtomicBool::new(false),
            location: RwLock::new(RanUeLocation::default()),
        }
    }

    pub fn amf_ue_ngap_id(&self) -> u64 {
        self.amf_ue_ngap_id
    }

    pub fn ran_ue_ngap_id(&self) -> i64 {
        self.binding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ran_ue_ngap_id
    }

    /// Pool ID of the owning AmfRan
    pub fn ran_id(&self) -> u64 {
        self.binding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ran_id
    }

    #[cfg(test)]
    pub(crate) fn set_ran_binding(&self, ran_id: u64, ran_ue_ngap_id: i64) {
        *self.binding.write().unwrap_or_else(PoisonError::into_inner) = RanBinding {
            ran_id,
            ran_ue_ngap_id,
        };
    }

    /// Pool ID of the attached AmfUe
    pub fn amf_ue_id(&self) -> u64 {
        self.amf_ue_id.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.amf_ue_id() != OGS_INVALID_POOL_ID
    }

    pub(crate) fn set_amf_ue_id(&self, amf_ue_id: u64) -> u64 {
        self.amf_ue_id.swap(amf_ue_id, Ordering::SeqCst)
    }

    /// Clear the back reference only if it still names `amf_ue_id`
    pub(crate) fn clear_amf_ue_id_if(&self, amf_ue_id: u64) -> bool {
        self.amf_ue_id
            .compare_exchange(
                amf_ue_id,
                OGS_INVALID_POOL_ID,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Set once `Remove` has started on this RanUe
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

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

    /// TAC of the last location update
    pub fn tac(&self) -> String {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tai
            .tac
            .clone()
    }
}

// ============================================================================
// RAN UE Management
// ============================================================================

impl AmfContext {
    /// Create a RanUe on an AmfRan.
    ///
    /// Allocates the AMF UE NGAP ID and registers the RanUe in the context
    /// pool and in the AmfRan collection under `ran_ue_ngap_id`. Fails with
    /// `AmfRanNotFound` when the AmfRan has been torn down.
    pub fn new_ran_ue(&self, ran: &Arc<AmfRan>, ran_ue_ngap_id: i64) -> AmfResult<Arc<RanUe>> {
        if !self.amf_ran_is_registered(ran) {
            log::error!("[{}] AmfRan already removed (id={})", ran.conn(), ran.id());
            return Err(AmfError::AmfRanNotFound(ran.conn().to_string()));
        }
        // A reused RAN UE NGAP ID replaces its RanUe and does not count
        if !ran.ran_ue_list.contains_key(&ran_ue_ngap_id) && ran.ran_ue_count() >= ran.max_ran_ue()
        {
            log::error!(
                "[{}] Maximum number of RAN UEs [{}] reached",
                ran.name(),
                ran.max_ran_ue()
            );
            return Err(AmfError::RanUeLimitReached {
                ran: ran.name(),
                max: ran.max_ran_ue(),
            });
        }

        let amf_ue_ngap_id = match self.amf_ue_ngap_id_pool.allocate() {
            Some(id) => id as u64,
            None => {
                log::error!("AMF_UE_NGAP_ID space exhausted");
                return Err(AmfError::AmfUeNgapIdExhausted);
            }
        };

        let ran_ue = Arc::new(RanUe::new(amf_ue_ngap_id, ran.id(), ran_ue_ngap_id));
        self.ran_ue_list.insert(amf_ue_ngap_id, Arc::clone(&ran_ue));

        if let Some(old) = ran.ran_ue_list.insert(ran_ue_ngap_id, Arc::clone(&ran_ue)) {
            log::warn!(
                "[{}] RAN_UE_NGAP_ID:{} reused, removing RanUe[AMF_UE_NGAP_ID:{}]",
                ran.name(),
                ran_ue_ngap_id,
                old.amf_ue_ngap_id
            );
            if let Err(e) = self.ran_ue_release(&old) {
                log::warn!("{}", e);
            }
        }

        // Torn down in between: the teardown may not have seen this RanUe
        if !self.amf_ran_is_registered(ran) {
            log::warn!(
                "[{}] AmfRan removed while adding RanUe[AMF_UE_NGAP_ID:{}]",
                ran.conn(),
                amf_ue_ngap_id
            );
            if let Err(e) = self.ran_ue_release(&ran_ue) {
                log::debug!("{}", e);
            }
            ran.ran_ue_list
                .remove_if(&ran_ue_ngap_id, |_, v| Arc::ptr_eq(v, &ran_ue));
            return Err(AmfError::AmfRanNotFound(ran.conn().to_string()));
        }

        log::debug!(
            "[{}] RanUe added [RAN_UE_NGAP_ID:{} AMF_UE_NGAP_ID:{}]",
            ran.name(),
            ran_ue_ngap_id,
            amf_ue_ngap_id
        );
        Ok(ran_ue)
    }

    /// Find RanUe by AMF UE NGAP ID
    pub fn ran_ue_find_by_amf_ue_ngap_id(&self, amf_ue_ngap_id: u64) -> Option<Arc<RanUe>> {
        self.ran_ue_list
            .get(&amf_ue_ngap_id)
            .map(|e| Arc::clone(e.value()))
    }

    /// Remove a RanUe.
    ///
    /// Detaches it from its AmfUe (only if the UE still names this RanUe),
    /// then deregisters it from its AmfRan and from the context pool. Fails
    /// with `MissingRan` when the owning AmfRan cannot be resolved, and with
    /// `RanUeNotFound` when the RanUe was already removed.
    pub fn ran_ue_remove(&self, ran_ue: &Arc<RanUe>) -> AmfResult<()> {
        let ran_id = ran_ue.ran_id();
        if ran_id == OGS_INVALID_POOL_ID || self.amf_ran_find_by_id(ran_id).is_none() {
            log::error!(
                "RanUe[AMF_UE_NGAP_ID:{}] has no AmfRan",
                ran_ue.amf_ue_ngap_id
            );
            return Err(AmfError::MissingRan {
                amf_ue_ngap_id: ran_ue.amf_ue_ngap_id,
            });
        }
        self.ran_ue_release(ran_ue)
    }

    /// Steps of `ran_ue_remove` after the AmfRan check
    pub(crate) fn ran_ue_release(&self, ran_ue: &Arc<RanUe>) -> AmfResult<()> {
        let amf_ue_ngap_id = ran_ue.amf_ue_ngap_id;
        if ran_ue.removed.swap(true, Ordering::SeqCst) {
            return Err(AmfError::RanUeNotFound(amf_ue_ngap_id));
        }

        let amf_ue_id = ran_ue.set_amf_ue_id(OGS_INVALID_POOL_ID);
        if let Some(ue) = self.amf_ue_find_by_id(amf_ue_id) {
            for access_type in ue.unlink_if(amf_ue_ngap_id) {
                log::debug!(
                    "[{}] {} detached RanUe[AMF_UE_NGAP_ID:{}]",
                    ue.supi(),
                    access_type,
                    amf_ue_ngap_id
                );
            }
        }

        {
            // Held against a concurrent switch moving the RanUe
            let binding = ran_ue.binding.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(ran) = self.amf_ran_find_by_id(binding.ran_id) {
                ran.ran_ue_list
                    .remove_if(&binding.ran_ue_ngap_id, |_, v| Arc::ptr_eq(v, ran_ue));
            }
        }

        if self
            .ran_ue_list
            .remove_if(&amf_ue_ngap_id, |_, v| Arc::ptr_eq(v, ran_ue))
            .is_some()
        {
            self.amf_ue_ngap_id_pool.free(amf_ue_ngap_id as i64);
        }

        log::debug!(
            "RanUe removed [RAN_UE_NGAP_ID:{} AMF_UE_NGAP_ID:{}]",
            ran_ue.ran_ue_ngap_id(),
            amf_ue_ngap_id
        );
        Ok(())
    }

    /// Move a RanUe to another AmfRan under a new RAN UE NGAP ID.
    ///
    /// The AMF UE NGAP ID and the AmfUe association are kept. A different
    /// RanUe holding the new key on the target AmfRan is removed, as with a
    /// reused RAN UE NGAP ID in `new_ran_ue`.
    pub fn ran_ue_switch_to_ran(
        &self,
        ran_ue: &Arc<RanUe>,
        new_ran: &Arc<AmfRan>,
        new_ran_ue_ngap_id: i64,
    ) -> AmfResult<()> {
        let amf_ue_ngap_id = ran_ue.amf_ue_ngap_id;
        let mut binding = ran_ue.binding.write().unwrap_or_else(PoisonError::into_inner);

        if ran_ue.is_removed() {
            return Err(AmfError::RanUeNotFound(amf_ue_ngap_id));
        }
        let old_ran = self
            .amf_ran_find_by_id(binding.ran_id)
            .ok_or(AmfError::MissingRan { amf_ue_ngap_id })?;
        if !self.amf_ran_is_registered(new_ran) {
            return Err(AmfError::AmfRanNotFound(new_ran.conn().to_string()));
        }

        let old_ran_ue_ngap_id = binding.ran_ue_ngap_id;
        let displaced = new_ran
            .ran_ue_list
            .insert(new_ran_ue_ngap_id, Arc::clone(ran_ue))
            .filter(|v| !Arc::ptr_eq(v, ran_ue));

        if !self.amf_ran_is_registered(new_ran) {
            // Target torn down in between: stay on the old AmfRan
            new_ran
                .ran_ue_list
                .remove_if(&new_ran_ue_ngap_id, |_, v| Arc::ptr_eq(v, ran_ue));
            drop(binding);
            if let Some(displaced) = displaced {
                self.ran_ue_release_displaced(new_ran, new_ran_ue_ngap_id, &displaced);
            }
            return Err(AmfError::AmfRanNotFound(new_ran.conn().to_string()));
        }

        if old_ran.id() != new_ran.id() || old_ran_ue_ngap_id != new_ran_ue_ngap_id {
            old_ran
                .ran_ue_list
                .remove_if(&old_ran_ue_ngap_id, |_, v| Arc::ptr_eq(v, ran_ue));
        }
        *binding = RanBinding {
            ran_id: new_ran.id(),
            ran_ue_ngap_id: new_ran_ue_ngap_id,
        };
        // Released without the binding lock, the displaced RanUe may be switching too
        drop(binding);
        if let Some(displaced) = displaced {
            self.ran_ue_release_displaced(new_ran, new_ran_ue_ngap_id, &displaced);
        }

        log::info!(
            "RanUe[AMF_UE_NGAP_ID:{}] switched [{}] RAN_UE_NGAP_ID:{} -> [{}] RAN_UE_NGAP_ID:{}",
            amf_ue_ngap_id,
            old_ran.name(),
            old_ran_ue_ngap_id,
            new_ran.name(),
            new_ran_ue_ngap_id
        );
        Ok(())
    }

    fn ran_ue_release_displaced(&self, ran: &AmfRan, ran_ue_ngap_id: i64, displaced: &Arc<RanUe>) {
        log::warn!(
            "[{}] RAN_UE_NGAP_ID:{} taken over, removing RanUe[AMF_UE_NGAP_ID:{}]",
            ran.name(),
            ran_ue_ngap_id,
            displaced.amf_ue_ngap_id
        );
        if let Err(e) = self.ran_ue_release(displaced) {
            log::warn!("{}", e);
        }
    }
}
