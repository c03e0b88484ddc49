//! Save sequence for an editing session.
//!
//! Writes happen in dependency order: the flag, then its variants (building
//! the local -> persisted id remap), then rules and queued deletions, then
//! the flag's own fields. Writes within one step run concurrently. A failure
//! stops the sequence after the current step; earlier writes are not undone,
//! but the session is rebased onto everything the store accepted so a retry
//! only sends what is still missing.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::logic::changes::{EntityKind, EntityRef, FlagSession, SegmentSession, Tombstone};
use crate::logic::format::{
    format_flag, format_new_flag, format_rule, format_segment, format_segment_rule,
    format_variant, validate_flag, validate_segment, ValidationPolicy, VariantIdRemap,
};
use crate::model::{Id, ReturnVariant, VariantRef};
use crate::store::traits::Store;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveReport {
    pub id: Id,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

enum Written {
    Created { local: Id, persisted: Id },
    Updated,
    Deleted(Tombstone),
}

/// Writes the store has accepted during one save attempt.
#[derive(Default)]
struct Progress {
    created_parent: Option<Id>,
    variant_ids: Vec<(Id, Id)>,
    rule_ids: Vec<(Id, Id)>,
    buried: Vec<Tombstone>,
}

impl Progress {
    fn remap(&self) -> VariantIdRemap {
        let mut remap = VariantIdRemap::new();
        for (local, persisted) in &self.variant_ids {
            remap.insert(local.clone(), persisted.clone());
        }
        remap
    }

    fn persisted_rule_id(&self, local: &str) -> Option<&Id> {
        self.rule_ids
            .iter()
            .find(|(l, _)| l == local)
            .map(|(_, persisted)| persisted)
    }
}

/// Waits for every write of a step. Successful writes are counted and
/// recorded even when another write of the same step failed.
async fn drain(
    mut set: JoinSet<Result<Written>>,
    report: &mut SaveReport,
    created: &mut Vec<(Id, Id)>,
    buried: &mut Vec<Tombstone>,
) -> Result<()> {
    let mut failure = None;
    while let Some(joined) = set.join_next().await {
        match joined.map_err(anyhow::Error::from).and_then(|r| r) {
            Ok(Written::Created { local, persisted }) => {
                report.created += 1;
                created.push((local, persisted));
            }
            Ok(Written::Updated) => report.updated += 1,
            Ok(Written::Deleted(tombstone)) => {
                report.deleted += 1;
                buried.push(tombstone);
            }
            Err(e) => {
                log::error!("save step write failed: {:#}", e);
                failure.get_or_insert(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn spawn_deletion<S: Store + 'static>(
    set: &mut JoinSet<Result<Written>>,
    store: &Arc<S>,
    tombstone: Tombstone,
) {
    let store = Arc::clone(store);
    set.spawn(async move {
        let removed = match tombstone.kind {
            EntityKind::Variant => {
                store
                    .delete_variant(&tombstone.parent_id, &tombstone.id)
                    .await?
            }
            EntityKind::Rule => {
                store
                    .delete_flag_rule(&tombstone.parent_id, &tombstone.id)
                    .await?
            }
            EntityKind::SegmentRule => {
                store
                    .delete_segment_rule(&tombstone.parent_id, &tombstone.id)
                    .await?
            }
            other => {
                return Err(anyhow!(
                    "cannot delete {:?} '{}' on its own",
                    other,
                    tombstone.id
                ))
            }
        };
        if !removed {
            log::warn!(
                "{:?} '{}' was already gone from '{}'",
                tombstone.kind,
                tombstone.id,
                tombstone.parent_id
            );
        }
        Ok(Written::Deleted(tombstone))
    });
}

/// Persists a flag session and rebases it on the persisted ids.
pub async fn save_flag<S: Store + 'static>(
    store: Arc<S>,
    session: &mut FlagSession,
    policy: &ValidationPolicy,
) -> Result<SaveReport> {
    validate_flag(&session.flag, policy)?;
    log::info!(
        "saving flag '{}' ({}, {} pending changes)",
        session.flag.key,
        if session.flag.is_new { "new" } else { "existing" },
        session.changes.patches.len() + session.changes.tombstones.len()
    );

    let mut report = SaveReport::default();
    let mut progress = Progress::default();
    let outcome = write_flag(&store, session, policy, &mut report, &mut progress).await;
    rebase_flag(session, &progress, outcome.is_ok());
    outcome?;

    report.id = session.flag.id.clone();
    log::info!(
        "flag '{}' saved: {} created, {} updated, {} deleted",
        session.flag.key,
        report.created,
        report.updated,
        report.deleted
    );
    Ok(report)
}

async fn write_flag<S: Store + 'static>(
    store: &Arc<S>,
    session: &FlagSession,
    policy: &ValidationPolicy,
    report: &mut SaveReport,
    progress: &mut Progress,
) -> Result<()> {
    let flag = &session.flag;
    let changes = &session.changes;
    let flag_dirty = flag.is_new || changes.is_dirty(EntityKind::Flag, &flag.id);

    // 1. flag
    let flag_id = if flag.is_new {
        let id = store.create_flag(format_new_flag(flag)).await?;
        report.created += 1;
        progress.created_parent = Some(id.clone());
        id
    } else {
        flag.id.clone()
    };

    // 2. variants
    let mut set: JoinSet<Result<Written>> = JoinSet::new();
    for variant in &flag.variants {
        if !variant.is_new && !changes.is_dirty(EntityKind::Variant, &variant.id) {
            continue;
        }
        let store = Arc::clone(store);
        let flag_id = flag_id.clone();
        let local = variant.id.clone();
        let is_new = variant.is_new;
        let input = format_variant(variant);
        set.spawn(async move {
            if is_new {
                let persisted = store.create_variant(&flag_id, input).await?;
                Ok(Written::Created { local, persisted })
            } else {
                store.update_variant(&flag_id, &local, input).await?;
                Ok(Written::Updated)
            }
        });
    }
    drain(set, report, &mut progress.variant_ids, &mut progress.buried).await?;
    let remap = progress.remap();

    // 3. rules and deletions
    let mut set: JoinSet<Result<Written>> = JoinSet::new();
    for rule in &flag.rules {
        if !rule.is_new && !changes.is_dirty(EntityKind::Rule, &rule.id) {
            continue;
        }
        let store = Arc::clone(store);
        let flag_id = flag_id.clone();
        let local = rule.id.clone();
        let is_new = rule.is_new;
        let input = format_rule(rule, &remap, policy)?;
        set.spawn(async move {
            if is_new {
                let persisted = store.create_flag_rule(&flag_id, input).await?;
                Ok(Written::Created { local, persisted })
            } else {
                store.update_flag_rule(&flag_id, &local, input).await?;
                Ok(Written::Updated)
            }
        });
    }
    for tombstone in &changes.tombstones {
        spawn_deletion(&mut set, store, tombstone.clone());
    }
    drain(set, report, &mut progress.rule_ids, &mut progress.buried).await?;

    // 4. flag fields
    if flag_dirty {
        store
            .update_flag(&flag_id, format_flag(flag, &remap, policy)?)
            .await?;
        if !flag.is_new {
            report.updated += 1;
        }
    }
    Ok(())
}

/// Points the session at the persisted ids so it can keep being edited.
/// After a failed attempt only the accepted writes are applied and the
/// remaining changes stay queued.
fn rebase_flag(session: &mut FlagSession, progress: &Progress, completed: bool) {
    let remap = progress.remap();
    let flag = &mut session.flag;
    if let Some(id) = &progress.created_parent {
        flag.id = id.clone();
        flag.is_new = false;
    }

    let rebase_ref = |r: &mut VariantRef| r.id = remap.resolve(&r.id).to_string();
    for variant in &mut flag.variants {
        let persisted = remap.resolve(&variant.id).to_string();
        if persisted != variant.id {
            variant.id = persisted;
            variant.is_new = false;
        }
    }
    if let Some(r) = flag.default_variant_when_on.as_mut() {
        rebase_ref(r);
    }
    if let Some(r) = flag.default_variant_when_off.as_mut() {
        rebase_ref(r);
    }
    for rule in &mut flag.rules {
        let created = match progress.persisted_rule_id(&rule.id) {
            Some(persisted) => {
                rule.id = persisted.clone();
                rule.is_new = false;
                true
            }
            None => false,
        };
        for d in &mut rule.distributions {
            rebase_ref(&mut d.variant);
            if completed || created {
                d.is_new = false;
            }
        }
        if completed || created {
            for c in &mut rule.constraints {
                c.is_new = false;
            }
        }
        if let ReturnVariant::Variant(id) = &rule.return_variant {
            rule.return_variant = ReturnVariant::Variant(remap.resolve(id).to_string());
        }
    }

    if completed {
        session.changes.clear();
        return;
    }
    let changes = &mut session.changes;
    changes.tombstones.retain(|t| !progress.buried.contains(t));
    // creation only sent key/name/description; the rest still has to go out
    if let Some(id) = &progress.created_parent {
        changes.record(
            EntityRef::new(EntityKind::Flag, id),
            None,
            "created",
            json!(true),
        );
    }
}

/// Persists a segment session. New segments are created with their name and
/// description, so the final update only runs for edited existing segments.
pub async fn save_segment<S: Store + 'static>(
    store: Arc<S>,
    session: &mut SegmentSession,
    policy: &ValidationPolicy,
) -> Result<SaveReport> {
    validate_segment(&session.segment, policy)?;
    log::info!("saving segment '{}'", session.segment.name);

    let mut report = SaveReport::default();
    let mut progress = Progress::default();
    let outcome = write_segment(&store, session, policy, &mut report, &mut progress).await;
    rebase_segment(session, &progress, outcome.is_ok());
    outcome?;

    report.id = session.segment.id.clone();
    Ok(report)
}

async fn write_segment<S: Store + 'static>(
    store: &Arc<S>,
    session: &SegmentSession,
    policy: &ValidationPolicy,
    report: &mut SaveReport,
    progress: &mut Progress,
) -> Result<()> {
    let segment = &session.segment;
    let changes = &session.changes;

    let segment_id = if segment.is_new {
        let id = store.create_segment(format_segment(segment)).await?;
        report.created += 1;
        progress.created_parent = Some(id.clone());
        id
    } else {
        segment.id.clone()
    };

    let mut set: JoinSet<Result<Written>> = JoinSet::new();
    for rule in &segment.rules {
        if !rule.is_new && !changes.is_dirty(EntityKind::SegmentRule, &rule.id) {
            continue;
        }
        let store = Arc::clone(store);
        let segment_id = segment_id.clone();
        let local = rule.id.clone();
        let is_new = rule.is_new;
        let input = format_segment_rule(rule, policy)?;
        set.spawn(async move {
            if is_new {
                let persisted = store.create_segment_rule(&segment_id, input).await?;
                Ok(Written::Created { local, persisted })
            } else {
                store.update_segment_rule(&segment_id, &local, input).await?;
                Ok(Written::Updated)
            }
        });
    }
    for tombstone in &changes.tombstones {
        spawn_deletion(&mut set, store, tombstone.clone());
    }
    drain(set, report, &mut progress.rule_ids, &mut progress.buried).await?;

    if !segment.is_new && changes.is_dirty(EntityKind::Segment, &segment.id) {
        store
            .update_segment(&segment_id, format_segment(segment))
            .await?;
        report.updated += 1;
    }
    Ok(())
}

fn rebase_segment(session: &mut SegmentSession, progress: &Progress, completed: bool) {
    let segment = &mut session.segment;
    if let Some(id) = &progress.created_parent {
        segment.id = id.clone();
        segment.is_new = false;
    }
    for rule in &mut segment.rules {
        let created = match progress.persisted_rule_id(&rule.id) {
            Some(persisted) => {
                rule.id = persisted.clone();
                rule.is_new = false;
                true
            }
            None => false,
        };
        if completed || created {
            for c in &mut rule.constraints {
                c.is_new = false;
            }
        }
    }

    if completed {
        session.changes.clear();
    } else {
        session
            .changes
            .tombstones
            .retain(|t| !progress.buried.contains(t));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::logic::builder::FlagDefaults;
    use crate::logic::changes::ConstraintUpdate;
    use crate::model::{
        ConstraintRecord, DistributionRecord, FlagRecord, Operation, RuleRecord, Scalar,
        SegmentRecord, VariantRecord,
    };
    use crate::store::{FlagStore, MemoryStore, RuleStore, SegmentStore};

    #[tokio::test]
    async fn test_new_flag_save_remaps_variant_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut session = FlagSession::draft(&FlagDefaults::default());
        session.set_name("Dark mode");
        session.derive_key_from_name();
        let local_on = session.flag.variants[0].id.clone();
        let rule_id = session.add_rule();
        session
            .set_return_variant(&rule_id, ReturnVariant::Variant(local_on.clone()))
            .unwrap();
        let cid = session.flag.rules[0].constraints[0].id.clone();
        session
            .update_constraint(
                &rule_id,
                &cid,
                ConstraintUpdate {
                    property: Some("plan".to_string()),
                    values: Some(vec![Scalar::from("pro")]),
                    ..ConstraintUpdate::default()
                },
            )
            .unwrap();

        let report = save_flag(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap();
        // flag + 2 variants + 1 rule
        assert_eq!(report.created, 4);
        assert!(session.changes.is_empty());
        assert!(!session.flag.is_new);

        let record = store.get_flag(&report.id).await.unwrap().unwrap();
        assert_eq!(record.key.as_deref(), Some("dark.mode"));
        let variants = record.variants.unwrap();
        let persisted_on = variants[0].id.clone().unwrap();
        assert_ne!(persisted_on, local_on);
        assert_eq!(
            record.default_variant_when_on,
            Some(VariantRef::new(persisted_on.clone()))
        );

        let rules = record.rules.unwrap();
        let distributions = rules[0].distributions.as_ref().unwrap();
        assert_eq!(distributions[0].variant, Some(VariantRef::new(persisted_on.clone())));
        assert_eq!(distributions[0].percentage, Some(100));
        assert_eq!(distributions[1].percentage, Some(0));

        // the session now mirrors the store
        assert_eq!(session.flag.variants[0].id, persisted_on);
        assert_eq!(
            session.flag.rules[0].return_variant,
            ReturnVariant::Variant(persisted_on)
        );
        assert_eq!(session.flag.rules[0].id, rules[0].id.clone().unwrap());
    }

    #[tokio::test]
    async fn test_existing_flag_only_sends_dirty_entities() {
        let store = Arc::new(MemoryStore::new());
        let mut draft = FlagSession::draft(&FlagDefaults::default());
        draft.set_name("Beta");
        draft.set_key("beta");
        let rule_id = draft.add_rule();
        let on = draft.flag.variants[0].id.clone();
        draft
            .set_return_variant(&rule_id, ReturnVariant::Variant(on))
            .unwrap();
        let cid = draft.flag.rules[0].constraints[0].id.clone();
        draft
            .update_constraint(
                &rule_id,
                &cid,
                ConstraintUpdate {
                    property: Some("country".to_string()),
                    values: Some(vec![Scalar::from("NL")]),
                    ..ConstraintUpdate::default()
                },
            )
            .unwrap();
        let saved = save_flag(store.clone(), &mut draft, &ValidationPolicy::strict())
            .await
            .unwrap();

        let record = store.get_flag(&saved.id).await.unwrap().unwrap();
        let mut session = FlagSession::open(&record, &FlagDefaults::default());
        assert_eq!(session.flag.rules.len(), 1);
        let rule_id = session.flag.rules[0].id.clone();
        let cid = session.flag.rules[0].constraints[0].id.clone();
        session
            .update_constraint(
                &rule_id,
                &cid,
                ConstraintUpdate {
                    operation: Some(Operation::Exists),
                    property: Some("email".to_string()),
                    ..ConstraintUpdate::default()
                },
            )
            .unwrap();

        let report = save_flag(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_deletions_are_issued() {
        let store = Arc::new(MemoryStore::new());
        let mut draft = FlagSession::draft(&FlagDefaults::default());
        draft.set_key("cleanup");
        let saved = save_flag(store.clone(), &mut draft, &ValidationPolicy::strict())
            .await
            .unwrap();

        let record = store.get_flag(&saved.id).await.unwrap().unwrap();
        let mut session = FlagSession::open(&record, &FlagDefaults::default());
        let off = session.flag.variants[1].id.clone();
        let on = session.flag.variants[0].id.clone();
        session.delete_variant(&off).unwrap();
        session.set_default_variant_when_off(&on).unwrap();

        let report = save_flag(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        let record = store.get_flag(&saved.id).await.unwrap().unwrap();
        assert_eq!(record.variants.unwrap().len(), 1);
        assert_eq!(record.default_variant_when_off, Some(VariantRef::new(on)));
    }

    #[tokio::test]
    async fn test_invalid_session_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut session = FlagSession::draft(&FlagDefaults::default());
        session.set_key("unbalanced");
        let rule_id = session.add_rule();
        session.set_return_variant(&rule_id, ReturnVariant::Rollout).unwrap();
        let on = session.flag.variants[0].id.clone();
        session.set_distribution_percentage(&rule_id, &on, 50).unwrap();

        let err = save_flag(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::UnbalancedRollout { total: 50, .. })
        ));
        assert!(store.list_flags(None).await.unwrap().is_empty());
        assert!(session.flag.is_new);

        save_flag(store.clone(), &mut session, &ValidationPolicy::lenient())
            .await
            .unwrap();
        assert_eq!(store.list_flags(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_default_is_rejected_at_save() {
        let store = Arc::new(MemoryStore::new());
        let mut draft = FlagSession::draft(&FlagDefaults::default());
        draft.set_key("stale");
        let saved = save_flag(store.clone(), &mut draft, &ValidationPolicy::strict())
            .await
            .unwrap();
        let record = store.get_flag(&saved.id).await.unwrap().unwrap();
        let mut session = FlagSession::open(&record, &FlagDefaults::default());
        let on = session.flag.variants[0].id.clone();
        session.delete_variant(&on).unwrap();

        let err = save_flag(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::DanglingDefaultVariant { .. })
        ));
        // nothing was deleted
        let record = store.get_flag(&saved.id).await.unwrap().unwrap();
        assert_eq!(record.variants.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_save_segment() {
        let store = Arc::new(MemoryStore::new());
        let mut session = SegmentSession::draft();
        session.set_name("internal");
        let rule_id = session.add_rule();
        let cid = session.segment.rules[0].constraints[0].id.clone();
        session
            .update_constraint(
                &rule_id,
                &cid,
                ConstraintUpdate {
                    property: Some("email".to_string()),
                    operation: Some(Operation::EndsWith),
                    values: Some(vec![Scalar::from("@example.com")]),
                    ..ConstraintUpdate::default()
                },
            )
            .unwrap();
        let report = save_segment(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap();
        assert_eq!(report.created, 2);

        let record = store.get_segment(&report.id).await.unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("internal"));
        let rules = record.rules.clone().unwrap();
        assert_eq!(rules.len(), 1);

        let mut session = SegmentSession::open(&record);
        session.set_description("staff only");
        let rule_id = session.segment.rules[0].id.clone();
        session.delete_rule(&rule_id).unwrap();
        let report = save_segment(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 1);
        let record: SegmentRecord = store.get_segment(&report.id).await.unwrap().unwrap();
        assert!(record.rules.unwrap().is_empty());
        assert_eq!(record.description.as_deref(), Some("staff only"));
    }

    #[tokio::test]
    async fn test_missing_parent_surfaces_store_error() {
        let store = Arc::new(MemoryStore::new());
        let record = FlagRecord {
            id: Some("not-in-store".to_string()),
            variants: Some(vec![VariantRecord {
                id: Some("v1".to_string()),
                value: Some(Scalar::Bool(true)),
                ..VariantRecord::default()
            }]),
            ..FlagRecord::default()
        };
        let mut session = FlagSession::open(&record, &FlagDefaults::default());
        session
            .update_variant(
                "v1",
                crate::logic::changes::VariantUpdate {
                    description: Some("on".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let err = save_flag(store, &mut session, &ValidationPolicy::strict())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    fn seeded_flag() -> FlagRecord {
        FlagRecord {
            id: Some("f1".to_string()),
            key: Some("checkout".to_string()),
            enabled: Some(true),
            variants: Some(vec![
                VariantRecord {
                    id: Some("t".to_string()),
                    value: Some(Scalar::Bool(true)),
                    ..VariantRecord::default()
                },
                VariantRecord {
                    id: Some("f".to_string()),
                    value: Some(Scalar::Bool(false)),
                    ..VariantRecord::default()
                },
            ]),
            rules: Some(vec![RuleRecord {
                id: Some("r1".to_string()),
                constraints: Some(vec![ConstraintRecord {
                    id: Some("c1".to_string()),
                    property: Some("country".to_string()),
                    operation: Some(Operation::OneOf),
                    values: Some(vec![Scalar::from("NL")]),
                    ..ConstraintRecord::default()
                }]),
                distributions: Some(vec![
                    DistributionRecord {
                        id: Some("d1".to_string()),
                        variant: Some(VariantRef::new("t")),
                        percentage: Some(100),
                        ..DistributionRecord::default()
                    },
                    DistributionRecord {
                        id: Some("d2".to_string()),
                        variant: Some(VariantRef::new("f")),
                        percentage: Some(0),
                        ..DistributionRecord::default()
                    },
                ]),
                ..RuleRecord::default()
            }]),
            default_variant_when_on: Some(VariantRef::new("t")),
            default_variant_when_off: Some(VariantRef::new("f")),
            ..FlagRecord::default()
        }
    }

    #[tokio::test]
    async fn test_retry_after_failed_step_does_not_duplicate_writes() {
        let store = Arc::new(MemoryStore::new());
        let flag_id = store.insert_flag(seeded_flag());
        let record = store.get_flag(&flag_id).await.unwrap().unwrap();
        let mut session = FlagSession::open(&record, &FlagDefaults::default());
        session
            .update_constraint(
                "r1",
                "c1",
                ConstraintUpdate {
                    values: Some(vec![Scalar::from("BE")]),
                    ..ConstraintUpdate::default()
                },
            )
            .unwrap();
        let local = session.add_variant(&VariantRecord {
            value: Some(Scalar::Bool(true)),
            ..VariantRecord::default()
        });

        // the rule update in step 3 fails after the variant was created in step 2
        store.delete_flag_rule(&flag_id, &"r1".to_string()).await.unwrap();

        let policy = ValidationPolicy::strict();
        let err = save_flag(store.clone(), &mut session, &policy)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        let created = session.flag.variants.last().unwrap();
        assert!(!created.is_new);
        assert_ne!(created.id, local);
        let persisted = created.id.clone();
        // the rule edit is still queued
        assert!(session.changes.is_dirty(EntityKind::Rule, "r1"));
        let distribution = session.flag.rules[0]
            .distributions
            .iter()
            .find(|d| d.variant.id == persisted);
        assert!(distribution.is_some());

        let err = save_flag(store.clone(), &mut session, &policy)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        let record = store.get_flag(&flag_id).await.unwrap().unwrap();
        assert_eq!(record.variants.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_new_flag_is_not_created_twice() {
        let store = Arc::new(MemoryStore::new());
        let mut session = FlagSession::draft(&FlagDefaults::default());
        session.set_key("twice");
        session.set_enabled(true);
        // step 3 cannot delete a whole flag
        session.changes.bury(EntityKind::Flag, "other", "other");

        let err = save_flag(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("on its own"));
        assert!(!session.flag.is_new);
        assert!(session.flag.variants.iter().all(|v| !v.is_new));
        assert!(session.changes.is_dirty(EntityKind::Flag, &session.flag.id));
        assert_eq!(session.changes.tombstones.len(), 1);

        session.changes.tombstones.clear();
        let report = save_flag(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 1);

        let flags = store.list_flags(None).await.unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].enabled, Some(true));
        assert_eq!(flags[0].variants.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_incomplete_segment_constraint_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut session = SegmentSession::draft();
        session.set_name("empty");
        session.add_rule();

        let err = save_segment(store.clone(), &mut session, &ValidationPolicy::strict())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::IncompleteConstraint { .. })
        ));
        assert!(store.list_segments().await.unwrap().is_empty());
        assert!(session.segment.is_new);
    }
}
