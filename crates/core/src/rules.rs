//! Catalog maintenance for pricing rules.
//!
//! All writes pass through shape validation so the evaluation engine only
//! ever loads rules that satisfy the catalog invariants.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::rule::{PricingRule, RuleDraft, RuleId, RuleUpdate};
use crate::errors::ServiceError;
use crate::stores::RuleStore;

pub struct RuleCatalog {
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditSink>,
}

impl RuleCatalog {
    pub fn new(rules: Arc<dyn RuleStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { rules, audit }
    }

    pub async fn create(
        &self,
        draft: RuleDraft,
        actor: &str,
    ) -> Result<PricingRule, ServiceError> {
        draft.validate()?;

        let rule = PricingRule {
            id: RuleId(Uuid::new_v4().to_string()),
            name: draft.name,
            rule_type: draft.rule_type,
            conditions: draft.conditions,
            actions: draft.actions,
            priority: draft.priority,
            is_active: draft.is_active,
            created_at: Utc::now(),
        };
        self.rules.save(rule.clone()).await?;

        info!(
            event_name = "rules.created",
            rule_id = %rule.id.0,
            priority = rule.priority,
            is_active = rule.is_active
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                None,
                rule.id.0.clone(),
                "rules.created",
                AuditCategory::System,
                actor,
                AuditOutcome::Success,
            )
            .with_metadata("name", rule.name.clone()),
        );

        Ok(rule)
    }

    pub async fn get(&self, id: &RuleId) -> Result<PricingRule, ServiceError> {
        let Some(rule) = self.rules.find_by_id(id).await? else {
            return Err(ServiceError::NotFound { entity: "rule", id: id.0.clone() });
        };
        Ok(rule)
    }

    pub async fn list(&self, only_active: bool) -> Result<Vec<PricingRule>, ServiceError> {
        Ok(self.rules.list(only_active).await?)
    }

    pub async fn update(
        &self,
        id: &RuleId,
        update: RuleUpdate,
        actor: &str,
    ) -> Result<PricingRule, ServiceError> {
        let mut rule = self.get(id).await?;
        rule.apply_update(update);
        rule.validate()?;
        self.rules.save(rule.clone()).await?;

        info!(event_name = "rules.updated", rule_id = %rule.id.0, priority = rule.priority);
        self.audit.emit(
            AuditEvent::new(
                None,
                None,
                rule.id.0.clone(),
                "rules.updated",
                AuditCategory::System,
                actor,
                AuditOutcome::Success,
            )
            .with_metadata("name", rule.name.clone()),
        );

        Ok(rule)
    }

    /// Idempotent toggle: flipping to the stored state is a no-op.
    pub async fn set_active(
        &self,
        id: &RuleId,
        active: bool,
        actor: &str,
    ) -> Result<PricingRule, ServiceError> {
        let mut rule = self.get(id).await?;
        if rule.is_active == active {
            return Ok(rule);
        }

        rule.is_active = active;
        self.rules.save(rule.clone()).await?;

        let event_type = if active { "rules.activated" } else { "rules.deactivated" };
        info!(event_name = event_type, rule_id = %rule.id.0);
        self.audit.emit(AuditEvent::new(
            None,
            None,
            rule.id.0.clone(),
            event_type,
            AuditCategory::System,
            actor,
            AuditOutcome::Success,
        ));

        Ok(rule)
    }

    pub async fn delete(&self, id: &RuleId, actor: &str) -> Result<(), ServiceError> {
        if !self.rules.delete(id).await? {
            return Err(ServiceError::NotFound { entity: "rule", id: id.0.clone() });
        }

        info!(event_name = "rules.deleted", rule_id = %id.0);
        self.audit.emit(AuditEvent::new(
            None,
            None,
            id.0.clone(),
            "rules.deleted",
            AuditCategory::System,
            actor,
            AuditOutcome::Success,
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::rule::{Action, Condition, RuleDraft, RuleId, RuleUpdate};
    use crate::errors::ServiceError;
    use crate::stores::InMemoryRuleStore;

    use super::RuleCatalog;

    fn catalog() -> (RuleCatalog, Arc<InMemoryRuleStore>, InMemoryAuditSink) {
        let store = Arc::new(InMemoryRuleStore::default());
        let sink = InMemoryAuditSink::default();
        let catalog = RuleCatalog::new(store.clone(), Arc::new(sink.clone()));
        (catalog, store, sink)
    }

    fn draft(name: &str) -> RuleDraft {
        RuleDraft {
            name: name.to_string(),
            rule_type: "COMPETITOR_BASED".to_string(),
            conditions: vec![Condition::CompetitorLower { threshold: Decimal::new(5, 0) }],
            actions: vec![Action::AdjustPercent { value: Decimal::new(-3, 0) }],
            priority: 10,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_persists() {
        let (catalog, _, sink) = catalog();

        let rule = catalog.create(draft("undercut"), "ops").await.expect("create should succeed");
        assert!(!rule.id.0.is_empty());

        let loaded = catalog.get(&rule.id).await.expect("rule should load");
        assert_eq!(loaded, rule);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "rules.created");
        assert_eq!(events[0].actor, "ops");
    }

    #[tokio::test]
    async fn create_rejects_draft_without_actions() {
        let (catalog, _, _) = catalog();
        let mut empty = draft("no actions");
        empty.actions.clear();

        let error = catalog.create(empty, "ops").await.expect_err("validation should fail");
        assert!(matches!(error, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn update_is_partial_and_revalidates() {
        let (catalog, _, _) = catalog();
        let rule = catalog.create(draft("undercut"), "ops").await.unwrap();

        let updated = catalog
            .update(
                &rule.id,
                RuleUpdate { priority: Some(1), ..RuleUpdate::default() },
                "ops",
            )
            .await
            .expect("update should succeed");
        assert_eq!(updated.priority, 1);
        assert_eq!(updated.name, "undercut");

        let error = catalog
            .update(
                &rule.id,
                RuleUpdate { actions: Some(Vec::new()), ..RuleUpdate::default() },
                "ops",
            )
            .await
            .expect_err("empty actions should fail");
        assert!(matches!(error, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn set_active_toggles_once_per_state_change() {
        let (catalog, _, sink) = catalog();
        let rule = catalog.create(draft("undercut"), "ops").await.unwrap();

        let disabled = catalog.set_active(&rule.id, false, "ops").await.unwrap();
        assert!(!disabled.is_active);

        // Repeating the same state does not write or audit again.
        catalog.set_active(&rule.id, false, "ops").await.unwrap();

        let toggles: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|event| event.event_type == "rules.deactivated")
            .collect();
        assert_eq!(toggles.len(), 1);
    }

    #[tokio::test]
    async fn delete_missing_rule_is_not_found() {
        let (catalog, _, _) = catalog();

        let error = catalog
            .delete(&RuleId("rule-404".to_string()), "ops")
            .await
            .expect_err("missing rule should fail");
        assert!(matches!(error, ServiceError::NotFound { entity: "rule", .. }));
    }

    #[tokio::test]
    async fn list_respects_active_filter() {
        let (catalog, _, _) = catalog();
        let keep = catalog.create(draft("keep"), "ops").await.unwrap();
        let off = catalog.create(draft("off"), "ops").await.unwrap();
        catalog.set_active(&off.id, false, "ops").await.unwrap();

        let active = catalog.list(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep.id);

        let all = catalog.list(false).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
