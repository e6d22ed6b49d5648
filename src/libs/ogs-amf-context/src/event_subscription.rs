//! Namf_EventExposure subscriptions
//!
//! The context keeps the registry (subscription ID -> entry). Each UE named by
//! a subscription keeps its own mirror so per-UE teardown does not scan the
//! registry. Deleting a registry entry does not touch the mirrors; use
//! `event_subscription_remove_with_mirrors` for that.

use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// AMF event type (TS 29.518)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmfEventType {
    LocationReport,
    PresenceInAoiReport,
    TimezoneReport,
    AccessTypeReport,
    RegistrationStateReport,
    ConnectivityStateReport,
    ReachabilityReport,
    CommunicationFailureReport,
    UesInAreaReport,
    SubscriptionIdChange,
    SubscriptionIdAddition,
    LossOfConnectivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmfEvent {
    #[serde(rename = "type")]
    pub event_type: AmfEventType,
    #[serde(default)]
    pub immediate_flag: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmfEventTrigger {
    OneTime,
    Continuous,
    Periodic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmfEventMode {
    pub trigger: AmfEventTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reports: Option<i32>,
}

/// AmfEventSubscription as received from the consumer NF
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmfEventSubscription {
    pub event_list: Vec<AmfEvent>,
    pub event_notify_uri: String,
    pub notify_correlation_id: String,
    pub nf_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(rename = "anyUE", default)]
    pub any_ue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<AmfEventMode>,
}

/// Registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmfContextEventSubscription {
    pub is_any_ue: bool,
    pub is_group_ue: bool,
    /// UEs the subscription applies to
    pub ue_supi_list: Vec<String>,
    /// Advisory, not enforced by the registry
    pub expiry: Option<SystemTime>,
    pub event_subscription: AmfEventSubscription,
}

impl AmfContextEventSubscription {
    /// Build a registry entry; the UE list starts with the subscription's SUPI
    pub fn new(event_subscription: AmfEventSubscription, expiry: Option<SystemTime>) -> Self {
        Self {
            is_any_ue: event_subscription.any_ue,
            is_group_ue: event_subscription.group_id.is_some(),
            ue_supi_list: event_subscription.supi.iter().cloned().collect(),
            expiry,
            event_subscription,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|expiry| now >= expiry)
    }
}

/// Per-UE mirror of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmfUeEventSubscription {
    pub timestamp: SystemTime,
    pub any_ue: bool,
    /// Reports left before the subscription is exhausted (None = unlimited)
    pub remain_reports: Option<i32>,
    pub event_subscription: AmfEventSubscription,
}

impl AmfUeEventSubscription {
    pub fn new(event_subscription: &AmfEventSubscription) -> Self {
        Self {
            timestamp: SystemTime::now(),
            any_ue: event_subscription.any_ue,
            remain_reports: event_subscription
                .options
                .as_ref()
                .and_then(|mode| mode.max_reports),
            event_subscription: event_subscription.clone(),
        }
    }
}

// ============================================================================
// Event Subscription Management
// ============================================================================

impl AmfContext {
    /// Hand out a fresh subscription ID, or `None` when exhausted
    pub fn new_event_subscription_id(&self) -> Option<String> {
        match self.event_subscription_id_pool.allocate() {
            Some(id) => Some(id.to_string()),
            None => {
                log::warn!("Event subscription ID space exhausted");
                None
            }
        }
    }

    /// Store a subscription under `id`, replacing any previous entry
    pub fn new_event_subscription(&self, id: &str, subscription: AmfContextEventSubscription) {
        log::debug!(
            "Event subscription [{}] added ({} UE, any_ue={})",
            id,
            subscription.ue_supi_list.len(),
            subscription.is_any_ue
        );
        self.event_subscription_list
            .insert(id.to_string(), subscription);
    }

    pub fn find_event_subscription(&self, id: &str) -> Option<AmfContextEventSubscription> {
        self.event_subscription_list
            .get(id)
            .map(|e| e.value().clone())
    }

    /// Delete a registry entry. The per-UE mirrors are left to the caller.
    pub fn delete_event_subscription(&self, id: &str) -> AmfResult<AmfContextEventSubscription> {
        let (_, subscription) = self
            .event_subscription_list
            .remove(id)
            .ok_or_else(|| AmfError::EventSubscriptionNotFound(id.to_string()))?;

        if let Ok(numeric) = id.parse::<i64>() {
            self.event_subscription_id_pool.free(numeric);
        }
        log::debug!("Event subscription [{}] deleted", id);
        Ok(subscription)
    }

    /// Delete a registry entry and the mirror on every listed UE
    pub fn event_subscription_remove_with_mirrors(
        &self,
        id: &str,
    ) -> AmfResult<AmfContextEventSubscription> {
        let subscription = self.delete_event_subscription(id)?;
        for supi in &subscription.ue_supi_list {
            if let Some(ue) = self.amf_ue_find_by_supi(supi) {
                ue.remove_event_subscription(id);
            }
        }
        Ok(subscription)
    }

    pub fn event_subscription_count(&self) -> usize {
        self.event_subscription_list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn subscription(supi: &str) -> AmfEventSubscription {
        AmfEventSubscription {
            event_list: vec![AmfEvent {
                event_type: AmfEventType::LocationReport,
                immediate_flag: false,
            }],
            event_notify_uri: "http://nef.example/notify".to_string(),
            notify_correlation_id: "corr-1".to_string(),
            nf_id: "nef-1".to_string(),
            supi: Some(supi.to_string()),
            options: Some(AmfEventMode {
                trigger: AmfEventTrigger::Continuous,
                max_reports: Some(3),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_serde_field_names() {
        let json = serde_json::to_value(subscription("imsi-001010000000001")).unwrap();
        assert_eq!(json["eventList"][0]["type"], "LOCATION_REPORT");
        assert_eq!(json["eventNotifyUri"], "http://nef.example/notify");
        assert_eq!(json["anyUE"], false);
        assert_eq!(json["options"]["trigger"], "CONTINUOUS");
        assert_eq!(json["options"]["maxReports"], 3);

        let parsed: AmfEventSubscription = serde_json::from_value(serde_json::json!({
            "eventList": [{"type": "REACHABILITY_REPORT", "immediateFlag": true}],
            "eventNotifyUri": "http://x",
            "notifyCorrelationId": "c",
            "nfId": "n",
            "anyUE": true
        }))
        .unwrap();
        assert!(parsed.any_ue);
        assert!(parsed.event_list[0].immediate_flag);
        assert_eq!(parsed.event_list[0].event_type, AmfEventType::ReachabilityReport);
    }

    #[test]
    fn test_new_find_delete() {
        let ctx = AmfContext::default();
        let id = ctx.new_event_subscription_id().unwrap();
        let entry = AmfContextEventSubscription::new(subscription("imsi-001010000000001"), None);
        assert_eq!(entry.ue_supi_list, vec!["imsi-001010000000001".to_string()]);

        ctx.new_event_subscription(&id, entry.clone());
        assert_eq!(ctx.find_event_subscription(&id), Some(entry));

        ctx.delete_event_subscription(&id).unwrap();
        assert!(ctx.find_event_subscription(&id).is_none());
        assert_eq!(
            ctx.delete_event_subscription(&id).unwrap_err(),
            AmfError::EventSubscriptionNotFound(id.clone())
        );

        // numeric IDs go back to the allocator
        assert_eq!(ctx.new_event_subscription_id(), Some(id));
    }

    #[test]
    fn test_delete_does_not_cascade() {
        let ctx = AmfContext::default();
        let supi = "imsi-001010000000001";
        let ue = ctx.new_amf_ue(supi);
        let sub = subscription(supi);

        ctx.new_event_subscription("sub-1", AmfContextEventSubscription::new(sub.clone(), None));
        ue.add_event_subscription("sub-1", AmfUeEventSubscription::new(&sub));

        ctx.delete_event_subscription("sub-1").unwrap();
        assert!(ue.find_event_subscription("sub-1").is_some());
    }

    #[test]
    fn test_remove_with_mirrors() {
        let ctx = AmfContext::default();
        let supi = "imsi-001010000000001";
        let ue = ctx.new_amf_ue(supi);
        let sub = subscription(supi);

        ctx.new_event_subscription("sub-1", AmfContextEventSubscription::new(sub.clone(), None));
        let mirror = AmfUeEventSubscription::new(&sub);
        assert_eq!(mirror.remain_reports, Some(3));
        ue.add_event_subscription("sub-1", mirror);

        ctx.event_subscription_remove_with_mirrors("sub-1").unwrap();
        assert!(ue.find_event_subscription("sub-1").is_none());
        assert_eq!(ctx.event_subscription_count(), 0);
    }

    #[test]
    fn test_expiry_is_advisory() {
        let ctx = AmfContext::default();
        let past = SystemTime::now() - Duration::from_secs(60);
        let entry = AmfContextEventSubscription::new(subscription("imsi-1"), Some(past));
        assert!(entry.is_expired(SystemTime::now()));

        ctx.new_event_subscription("sub-1", entry);
        assert!(ctx.find_event_subscription("sub-1").is_some());

        let open = AmfContextEventSubscription::new(subscription("imsi-1"), None);
        assert!(!open.is_expired(SystemTime::now()));
    }
}
