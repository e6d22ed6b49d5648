//! AMF RAN Context
//!
//! One AmfRan per NG transport connection (gNB, ng-eNB or N3IWF).

use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::ran_ue::RanUe;
use crate::types::{AccessType, ConnHandle, GlobalRanNodeId, RanPresent, OGS_INVALID_POOL_ID};
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default)]
struct RanInfo {
    name: String,
    an_type: AccessType,
    ran_present: RanPresent,
    global_ran_node_id: Option<GlobalRanNodeId>,
}

// ============================================================================
// AMF RAN
// ============================================================================

/// AMF RAN context
#[derive(Debug)]
pub struct AmfRan {
    /// Pool ID
    id: u64,
    conn: ConnHandle,
    info: RwLock<RanInfo>,
    max_ran_ue: usize,
    /// RAN UE NGAP ID -> RanUe
    pub(crate) ran_ue_list: DashMap<i64, Arc<RanUe>>,
}

impl AmfRan {
    pub(crate) fn new(id: u64, conn: ConnHandle, max_ran_ue: usize) -> Self {
        Self {
            id,
            conn,
            info: RwLock::new(RanInfo {
                name: conn.to_string(),
                ..Default::default()
            }),
            max_ran_ue,
            ran_ue_list: DashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn conn(&self) -> ConnHandle {
        self.conn
    }

    pub fn max_ran_ue(&self) -> usize {
        self.max_ran_ue
    }

    /// RAN node name (the connection until NG Setup names it)
    pub fn name(&self) -> String {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name
            .clone()
    }

    pub fn set_name(&self, name: &str) {
        self.info.write().unwrap_or_else(PoisonError::into_inner).name = name.to_string();
    }

    /// Access type of the UEs served through this RAN node
    pub fn an_type(&self) -> AccessType {
        self.info.read().unwrap_or_else(PoisonError::into_inner).an_type
    }

    pub fn set_an_type(&self, an_type: AccessType) {
        self.info.write().unwrap_or_else(PoisonError::into_inner).an_type = an_type;
    }

    pub fn ran_present(&self) -> RanPresent {
        self.info.read().unwrap_or_else(PoisonError::into_inner).ran_present
    }

    pub fn global_ran_node_id(&self) -> Option<GlobalRanNodeId> {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .global_ran_node_id
            .clone()
    }

    /// Record the Global RAN Node ID received in NG Setup.
    ///
    /// An N3IWF serves non-3GPP access, every other node type 3GPP access.
    pub fn set_global_ran_node_id(&self, ran_id: GlobalRanNodeId) {
        let (ran_present, an_type) = if ran_id.n3iwf_id.is_some() {
            (RanPresent::N3iwfId, AccessType::NonThreeGpp)
        } else if ran_id.ng_enb_id.is_some() {
            (RanPresent::NgeNbId, AccessType::ThreeGpp)
        } else {
            (RanPresent::GnbId, AccessType::ThreeGpp)
        };

        let mut info = self.info.write().unwrap_or_else(PoisonError::into_inner);
        info.ran_present = ran_present;
        info.an_type = an_type;
        info.global_ran_node_id = Some(ran_id);
    }

    pub fn ran_ue_count(&self) -> usize {
        self.ran_ue_list.len()
    }

    /// Find RanUe by RAN UE NGAP ID
    pub fn ran_ue_find_by_ran_ue_ngap_id(&self, ran_ue_ngap_id: i64) -> Option<Arc<RanUe>> {
        self.ran_ue_list
            .get(&ran_ue_ngap_id)
            .map(|e| Arc::clone(e.value()))
    }

    /// Snapshot of the RanUe collection
    pub fn ran_ues(&self) -> Vec<Arc<RanUe>> {
        self.ran_ue_list.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

// ============================================================================
// AMF RAN Management
// ============================================================================

impl AmfContext {
    /// Create an AmfRan for a new NG connection.
    ///
    /// A previous AmfRan on the same connection is torn down and replaced.
    pub fn new_amf_ran(&self, conn: ConnHandle) -> AmfResult<Arc<AmfRan>> {
        if !conn.is_valid() {
            return Err(AmfError::InvalidConnHandle);
        }
        if self.amf_ran_list.len() >= self.max.gnb && !self.ran_conn_hash.contains_key(&conn) {
            log::error!("Maximum number of gNBs [{}] reached", self.max.gnb);
            return Err(AmfError::RanLimitReached(self.max.gnb));
        }

        let id = self.next_amf_ran_id();
        let ran = Arc::new(AmfRan::new(id, conn, self.max.ran_ue_per_ran));
        self.amf_ran_list.insert(id, Arc::clone(&ran));

        if let Some(old_id) = self.ran_conn_hash.insert(conn, id) {
            if let Some((_, old)) = self.amf_ran_list.remove(&old_id) {
                log::warn!("[{}] AmfRan replaced (old id={}, new id={})", conn, old_id, id);
                self.amf_ran_remove_all_ran_ue(&old, false);
            }
        }

        log::info!("[{}] AmfRan added (id={})", conn, id);
        Ok(ran)
    }

    /// Find AmfRan by transport connection
    pub fn amf_ran_find_by_conn(&self, conn: ConnHandle) -> Option<Arc<AmfRan>> {
        if !conn.is_valid() {
            return None;
        }
        let id = *self.ran_conn_hash.get(&conn)?;
        self.amf_ran_find_by_id(id)
    }

    /// Find AmfRan by pool ID
    pub fn amf_ran_find_by_id(&self, id: u64) -> Option<Arc<AmfRan>> {
        if id == OGS_INVALID_POOL_ID {
            return None;
        }
        self.amf_ran_list.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Whether `ran` is still the registered AmfRan under its pool ID
    pub(crate) fn amf_ran_is_registered(&self, ran: &Arc<AmfRan>) -> bool {
        self.amf_ran_list
            .get(&ran.id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), ran))
    }

    /// Find AmfRan by Global RAN Node ID
    pub fn amf_ran_find_by_ran_id(&self, ran_id: &GlobalRanNodeId) -> Option<Arc<AmfRan>> {
        let rans: Vec<Arc<AmfRan>> = self
            .amf_ran_list
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        rans.into_iter()
            .find(|ran| ran.global_ran_node_id().as_ref() == Some(ran_id))
    }

    /// Tear down the AmfRan of a closed connection.
    ///
    /// The AmfRan leaves the pool before its RanUe are removed, so a RanUe
    /// created on it concurrently is either seen by the teardown or rolled
    /// back by `new_ran_ue`.
    pub fn amf_ran_remove(&self, conn: ConnHandle) -> AmfResult<Arc<AmfRan>> {
        let ran = self
            .amf_ran_find_by_conn(conn)
            .ok_or_else(|| AmfError::AmfRanNotFound(conn.to_string()))?;

        self.ran_conn_hash.remove_if(&conn, |_, id| *id == ran.id);
        if self
            .amf_ran_list
            .remove_if(&ran.id, |_, v| Arc::ptr_eq(v, &ran))
            .is_none()
        {
            return Err(AmfError::AmfRanNotFound(conn.to_string()));
        }
        self.amf_ran_remove_all_ran_ue(&ran, false);

        log::info!("[{}] AmfRan removed (id={})", ran.name(), ran.id);
        Ok(ran)
    }

    /// Remove every RanUe of an AmfRan.
    ///
    /// Safe against concurrent individual removals: entries already removed
    /// elsewhere are skipped. With `remove_amf_ue`, every AmfUe attached to a
    /// removed RanUe is deregistered as well.
    pub fn amf_ran_remove_all_ran_ue(&self, ran: &AmfRan, remove_amf_ue: bool) {
        let snapshot: Vec<(i64, Arc<RanUe>)> = ran
            .ran_ue_list
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        log::debug!(
            "[{}] Removing {} RanUe (remove_amf_ue={})",
            ran.name(),
            snapshot.len(),
            remove_amf_ue
        );

        for (ran_ue_ngap_id, ran_ue) in snapshot {
            let ue = if remove_amf_ue {
                self.ran_ue_amf_ue(&ran_ue)
            } else {
                None
            };

            match self.ran_ue_release(&ran_ue) {
                Ok(()) | Err(AmfError::RanUeNotFound(_)) => {}
                Err(e) => log::warn!("[{}] {}", ran.name(), e),
            }
            // The RanUe may still point at this AmfRan after it left the pool
            ran.ran_ue_list
                .remove_if(&ran_ue_ngap_id, |_, v| Arc::ptr_eq(v, &ran_ue));

            if let Some(ue) = ue {
                self.amf_ue_remove(&ue);
            }
        }

        let remaining = ran.ran_ue_count();
        if remaining > 0 {
            log::debug!("[{}] {} RanUe added during removal", ran.name(), remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AmfConfig, MaxConf};
    use crate::types::PlmnId;

    #[test]
    fn test_new_amf_ran() {
        let ctx = AmfContext::default();
        let ran = ctx.new_amf_ran(ConnHandle::new(10)).unwrap();
        assert_eq!(ran.conn(), ConnHandle::new(10));
        assert_eq!(ran.an_type(), AccessType::ThreeGpp);
        assert_eq!(ran.ran_ue_count(), 0);

        let found = ctx.amf_ran_find_by_conn(ConnHandle::new(10)).unwrap();
        assert!(Arc::ptr_eq(&found, &ran));
    }

    #[test]
    fn test_invalid_conn() {
        let ctx = AmfContext::default();
        assert_eq!(
            ctx.new_amf_ran(ConnHandle::INVALID).unwrap_err(),
            AmfError::InvalidConnHandle
        );
        assert!(ctx.amf_ran_find_by_conn(ConnHandle::INVALID).is_none());
        assert!(ctx.amf_ran_find_by_conn(ConnHandle::new(99)).is_none());
    }

    #[test]
    fn test_duplicate_conn_replaces() {
        let ctx = AmfContext::default();
        let conn = ConnHandle::new(1);
        let first = ctx.new_amf_ran(conn).unwrap();
        let ran_ue = ctx.new_ran_ue(&first, 1).unwrap();

        let second = ctx.new_amf_ran(conn).unwrap();
        let found = ctx.amf_ran_find_by_conn(conn).unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(ctx.amf_ran_count(), 1);
        assert!(ran_ue.is_removed());
        assert_eq!(ctx.ran_ue_count(), 0);
    }

    #[test]
    fn test_ran_limit() {
        let conf = AmfConfig {
            max: MaxConf {
                gnb: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = AmfContext::new(conf);
        ctx.new_amf_ran(ConnHandle::new(1)).unwrap();
        assert_eq!(
            ctx.new_amf_ran(ConnHandle::new(2)).unwrap_err(),
            AmfError::RanLimitReached(1)
        );
        // same connection is a replacement, not a new RAN
        assert!(ctx.new_amf_ran(ConnHandle::new(1)).is_ok());
    }

    #[test]
    fn test_global_ran_node_id() {
        let ctx = AmfContext::default();
        let ran = ctx.new_amf_ran(ConnHandle::new(1)).unwrap();
        let ran_id = GlobalRanNodeId {
            plmn_id: PlmnId::new("001", "01"),
            n3iwf_id: Some("0001".to_string()),
            ..Default::default()
        };
        ran.set_global_ran_node_id(ran_id.clone());
        assert_eq!(ran.ran_present(), RanPresent::N3iwfId);
        assert_eq!(ran.an_type(), AccessType::NonThreeGpp);

        let found = ctx.amf_ran_find_by_ran_id(&ran_id).unwrap();
        assert_eq!(found.id(), ran.id());
    }

    #[test]
    fn test_remove_all_ran_ue() {
        let ctx = AmfContext::default();
        let ran = ctx.new_amf_ran(ConnHandle::new(1)).unwrap();
        let ue = ctx.new_amf_ue("imsi-001010000000001");
        let attached = ctx.new_ran_ue(&ran, 1).unwrap();
        ctx.attach_ran_ue(&ue, &attached).unwrap();
        for id in 2..=10 {
            ctx.new_ran_ue(&ran, id).unwrap();
        }

        ctx.amf_ran_remove_all_ran_ue(&ran, false);
        assert_eq!(ran.ran_ue_count(), 0);
        assert_eq!(ctx.ran_ue_count(), 0);
        assert!(ue.cm_idle(AccessType::ThreeGpp));
        assert!(ctx.amf_ue_find_by_supi(ue.supi()).is_some());
    }

    #[test]
    fn test_remove_all_ran_ue_with_amf_ue() {
        let ctx = AmfContext::default();
        let ran = ctx.new_amf_ran(ConnHandle::new(1)).unwrap();
        let ue = ctx.new_amf_ue("imsi-001010000000001");
        let ran_ue = ctx.new_ran_ue(&ran, 1).unwrap();
        ctx.attach_ran_ue(&ue, &ran_ue).unwrap();

        ctx.amf_ran_remove_all_ran_ue(&ran, true);
        assert_eq!(ran.ran_ue_count(), 0);
        assert!(ctx.amf_ue_find_by_supi(ue.supi()).is_none());
    }

    #[test]
    fn test_amf_ran_remove() {
        let ctx = AmfContext::default();
        let conn = ConnHandle::new(1);
        let ran = ctx.new_amf_ran(conn).unwrap();
        ctx.new_ran_ue(&ran, 1).unwrap();

        ctx.amf_ran_remove(conn).unwrap();
        assert!(ctx.amf_ran_find_by_conn(conn).is_none());
        assert_eq!(ctx.ran_ue_count(), 0);
        assert!(matches!(
            ctx.amf_ran_remove(conn),
            Err(AmfError::AmfRanNotFound(_))
        ));
    }
}
