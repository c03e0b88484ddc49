//! Change tracking for an editing session.
//!
//! Every edit goes through a session method that mutates the canonical model
//! and appends a [`Patch`] to the session's [`ChangeLog`]. Deletions of
//! persisted entities append a [`Tombstone`]. The save sequence reads the log
//! to decide which entities to send.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ModelError, ModelResult};
use crate::logic::builder::{
    new_constraint, new_flag, new_rule, new_segment, new_segment_rule, new_variant,
    sync_distributions, FlagDefaults,
};
use crate::model::{
    Constraint, ConstraintRecord, Flag, FlagRecord, Id, Operation, ReturnVariant, RuleRecord,
    Scalar, Segment, SegmentRecord, SegmentRuleRecord, VariantRecord, VariantRef, VariantType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Flag,
    Variant,
    Rule,
    Constraint,
    Distribution,
    Segment,
    SegmentRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Id,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<Id>) -> Self {
        Self { kind, id: id.into() }
    }
}

/// One field edit. `owner` names the entity that is persisted together with
/// this one (a rule for its constraints and distributions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub entity: EntityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityRef>,
    pub field: String,
    pub new_value: Value,
}

/// Deletion queued for save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: Id,
    pub parent_id: Id,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub patches: Vec<Patch>,
    pub tombstones: Vec<Tombstone>,
}

impl ChangeLog {
    pub fn record(&mut self, entity: EntityRef, owner: Option<EntityRef>, field: &str, new_value: Value) {
        log::debug!("{:?} {} changed {}", entity.kind, entity.id, field);
        self.patches.push(Patch {
            entity,
            owner,
            field: field.to_string(),
            new_value,
        });
    }

    pub fn bury(&mut self, kind: EntityKind, id: impl Into<Id>, parent_id: impl Into<Id>) {
        self.tombstones.push(Tombstone {
            kind,
            id: id.into(),
            parent_id: parent_id.into(),
        });
    }

    /// True when the entity was edited directly or through one of its parts.
    pub fn is_dirty(&self, kind: EntityKind, id: &str) -> bool {
        let hit = |r: &EntityRef| r.kind == kind && r.id == id;
        self.patches
            .iter()
            .any(|p| hit(&p.entity) || p.owner.as_ref().is_some_and(hit))
    }

    /// Latest value recorded for one field of an entity.
    pub fn latest(&self, kind: EntityKind, id: &str, field: &str) -> Option<&Value> {
        self.patches
            .iter()
            .rev()
            .find(|p| p.entity.kind == kind && p.entity.id == id && p.field == field)
            .map(|p| &p.new_value)
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.tombstones.is_empty()
    }

    pub fn clear(&mut self) {
        self.patches.clear();
        self.tombstones.clear();
    }
}

/// Partial edit of a variant; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantUpdate {
    pub description: Option<String>,
    pub value: Option<Scalar>,
    #[serde(rename = "type")]
    pub kind: Option<VariantType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintUpdate {
    pub property: Option<String>,
    pub operation: Option<Operation>,
    pub values: Option<Vec<Scalar>>,
    #[serde(rename = "type")]
    pub kind: Option<VariantType>,
}

fn apply_constraint_update(
    constraint: &mut Constraint,
    update: ConstraintUpdate,
    owner: &EntityRef,
    changes: &mut ChangeLog,
) {
    let entity = EntityRef::new(EntityKind::Constraint, &constraint.id);
    if let Some(property) = update.property {
        changes.record(entity.clone(), Some(owner.clone()), "property", json!(property));
        constraint.property = property;
    }
    if let Some(operation) = update.operation {
        changes.record(entity.clone(), Some(owner.clone()), "operation", json!(operation));
        constraint.operation = operation;
    }
    if let Some(values) = update.values {
        changes.record(entity.clone(), Some(owner.clone()), "values", json!(values));
        constraint.values = values;
    }
    if let Some(kind) = update.kind {
        changes.record(entity.clone(), Some(owner.clone()), "type", json!(kind));
        constraint.kind = kind;
    }
    // segment ids are never coerced
    if constraint.operation.is_segment_membership() && constraint.kind != VariantType::String {
        changes.record(entity, Some(owner.clone()), "type", json!(VariantType::String));
        constraint.kind = VariantType::String;
    }
}

/// Single-owner editing session over a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSession {
    pub flag: Flag,
    #[serde(default)]
    pub changes: ChangeLog,
}

impl FlagSession {
    /// Hydrates a persisted (or partial) record for editing.
    pub fn open(record: &FlagRecord, defaults: &FlagDefaults) -> Self {
        Self {
            flag: new_flag(record, defaults),
            changes: ChangeLog::default(),
        }
    }

    /// Starts a brand-new flag.
    pub fn draft(defaults: &FlagDefaults) -> Self {
        Self::open(&FlagRecord::default(), defaults)
    }

    fn flag_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Flag, &self.flag.id)
    }

    fn rule_index(&self, rule_id: &str) -> ModelResult<usize> {
        self.flag
            .rules
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or_else(|| ModelError::UnknownRule(rule_id.to_string()))
    }

    fn variant_index(&self, variant_id: &str) -> ModelResult<usize> {
        self.flag
            .variants
            .iter()
            .position(|v| v.id == variant_id)
            .ok_or_else(|| ModelError::UnknownVariant(variant_id.to_string()))
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        let entity = self.flag_ref();
        self.changes.record(entity, None, "name", json!(name));
        self.flag.name = name;
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        let entity = self.flag_ref();
        self.changes.record(entity, None, "key", json!(key));
        self.flag.key = key;
    }

    /// Fills an empty key from the name, e.g. "New Checkout" -> "new.checkout".
    pub fn derive_key_from_name(&mut self) -> bool {
        if !self.flag.key.is_empty() {
            return false;
        }
        let slug = slugify(&self.flag.name, '.');
        if slug.is_empty() {
            return false;
        }
        self.set_key(slug);
        true
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        let description = description.into();
        let entity = self.flag_ref();
        self.changes
            .record(entity, None, "description", json!(description));
        self.flag.description = description;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        let entity = self.flag_ref();
        self.changes.record(entity, None, "enabled", json!(enabled));
        self.flag.enabled = enabled;
    }

    pub fn set_default_variant_when_on(&mut self, variant_id: &str) -> ModelResult<()> {
        self.variant_index(variant_id)?;
        let entity = self.flag_ref();
        self.changes
            .record(entity, None, "defaultVariantWhenOn", json!(variant_id));
        self.flag.default_variant_when_on = Some(VariantRef::new(variant_id));
        Ok(())
    }

    pub fn set_default_variant_when_off(&mut self, variant_id: &str) -> ModelResult<()> {
        self.variant_index(variant_id)?;
        let entity = self.flag_ref();
        self.changes
            .record(entity, None, "defaultVariantWhenOff", json!(variant_id));
        self.flag.default_variant_when_off = Some(VariantRef::new(variant_id));
        Ok(())
    }

    /// Adds a variant and extends every rule with a 0% distribution for it.
    pub fn add_variant(&mut self, draft: &VariantRecord) -> Id {
        let variant = new_variant(draft);
        let id = variant.id.clone();
        self.flag.variants.push(variant);
        self.resync_rules();
        id
    }

    pub fn update_variant(&mut self, variant_id: &str, update: VariantUpdate) -> ModelResult<()> {
        let idx = self.variant_index(variant_id)?;
        let entity = EntityRef::new(EntityKind::Variant, variant_id);
        let variant = &mut self.flag.variants[idx];
        if let Some(description) = update.description {
            self.changes
                .record(entity.clone(), None, "description", json!(description));
            variant.description = description;
        }
        if let Some(value) = update.value {
            self.changes.record(entity.clone(), None, "value", json!(value));
            variant.value = value;
        }
        if let Some(kind) = update.kind {
            self.changes.record(entity, None, "type", json!(kind));
            variant.kind = kind;
        }
        Ok(())
    }

    /// Removes a variant. The flag keeps at least one variant, and rules that
    /// lose a distribution are marked for update.
    pub fn delete_variant(&mut self, variant_id: &str) -> ModelResult<()> {
        let idx = self.variant_index(variant_id)?;
        let variant = self.flag.variants.remove(idx);
        if !variant.is_new {
            self.changes
                .bury(EntityKind::Variant, &variant.id, &self.flag.id);
        }
        if self.flag.variants.is_empty() {
            self.flag.variants.push(new_variant(&VariantRecord::default()));
        }
        log::info!("variant {} removed from flag {}", variant.id, self.flag.id);
        self.resync_rules();
        Ok(())
    }

    /// Re-applies the one-distribution-per-variant invariant to every rule.
    pub fn resync_rules(&mut self) {
        let variants = self.flag.variants.clone();
        for rule in &mut self.flag.rules {
            if sync_distributions(rule, &variants) && !rule.is_new {
                self.changes.record(
                    EntityRef::new(EntityKind::Rule, &rule.id),
                    None,
                    "distributions",
                    json!(rule.distributions.len()),
                );
            }
        }
    }

    pub fn add_rule(&mut self) -> Id {
        let rule = new_rule(&RuleRecord::default(), &self.flag.variants);
        let id = rule.id.clone();
        self.flag.rules.push(rule);
        id
    }

    pub fn delete_rule(&mut self, rule_id: &str) -> ModelResult<()> {
        let idx = self.rule_index(rule_id)?;
        let rule = self.flag.rules.remove(idx);
        if !rule.is_new {
            self.changes.bury(EntityKind::Rule, &rule.id, &self.flag.id);
        }
        Ok(())
    }

    pub fn set_return_variant(&mut self, rule_id: &str, outcome: ReturnVariant) -> ModelResult<()> {
        if let ReturnVariant::Variant(id) = &outcome {
            self.variant_index(id)?;
        }
        let idx = self.rule_index(rule_id)?;
        self.changes.record(
            EntityRef::new(EntityKind::Rule, rule_id),
            None,
            "returnVariant",
            json!(outcome),
        );
        self.flag.rules[idx].return_variant = outcome;
        Ok(())
    }

    pub fn set_distribution_percentage(
        &mut self,
        rule_id: &str,
        variant_id: &str,
        percentage: u32,
    ) -> ModelResult<()> {
        let idx = self.rule_index(rule_id)?;
        let rule = &mut self.flag.rules[idx];
        let distribution = rule
            .distributions
            .iter_mut()
            .find(|d| d.variant.id == variant_id)
            .ok_or_else(|| ModelError::UnknownVariant(variant_id.to_string()))?;
        distribution.percentage = percentage;
        self.changes.record(
            EntityRef::new(EntityKind::Distribution, &distribution.id),
            Some(EntityRef::new(EntityKind::Rule, rule_id)),
            "percentage",
            json!(percentage),
        );
        Ok(())
    }

    pub fn add_constraint(&mut self, rule_id: &str) -> ModelResult<Id> {
        let idx = self.rule_index(rule_id)?;
        let constraint = new_constraint(&ConstraintRecord::default());
        let id = constraint.id.clone();
        self.flag.rules[idx].constraints.push(constraint);
        self.changes.record(
            EntityRef::new(EntityKind::Constraint, &id),
            Some(EntityRef::new(EntityKind::Rule, rule_id)),
            "created",
            json!(true),
        );
        Ok(id)
    }

    pub fn update_constraint(
        &mut self,
        rule_id: &str,
        constraint_id: &str,
        update: ConstraintUpdate,
    ) -> ModelResult<()> {
        let idx = self.rule_index(rule_id)?;
        let owner = EntityRef::new(EntityKind::Rule, rule_id);
        let constraint = self.flag.rules[idx]
            .constraints
            .iter_mut()
            .find(|c| c.id == constraint_id)
            .ok_or_else(|| ModelError::UnknownConstraint {
                rule_id: rule_id.to_string(),
                constraint_id: constraint_id.to_string(),
            })?;
        apply_constraint_update(constraint, update, &owner, &mut self.changes);
        Ok(())
    }

    /// Removes a constraint; a rule left without constraints gets a fresh empty one.
    pub fn delete_constraint(&mut self, rule_id: &str, constraint_id: &str) -> ModelResult<()> {
        let idx = self.rule_index(rule_id)?;
        let constraints = &mut self.flag.rules[idx].constraints;
        remove_constraint(constraints, rule_id, constraint_id)?;
        self.changes.record(
            EntityRef::new(EntityKind::Constraint, constraint_id),
            Some(EntityRef::new(EntityKind::Rule, rule_id)),
            "deleted",
            json!(true),
        );
        Ok(())
    }
}

fn remove_constraint(
    constraints: &mut Vec<Constraint>,
    rule_id: &str,
    constraint_id: &str,
) -> ModelResult<()> {
    let pos = constraints
        .iter()
        .position(|c| c.id == constraint_id)
        .ok_or_else(|| ModelError::UnknownConstraint {
            rule_id: rule_id.to_string(),
            constraint_id: constraint_id.to_string(),
        })?;
    constraints.remove(pos);
    if constraints.is_empty() {
        constraints.push(new_constraint(&ConstraintRecord::default()));
    }
    Ok(())
}

/// Lowercases and joins alphanumeric runs with `separator`.
pub fn slugify(text: &str, separator: char) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

/// Single-owner editing session over a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSession {
    pub segment: Segment,
    #[serde(default)]
    pub changes: ChangeLog,
}

impl SegmentSession {
    pub fn open(record: &SegmentRecord) -> Self {
        Self {
            segment: new_segment(record),
            changes: ChangeLog::default(),
        }
    }

    pub fn draft() -> Self {
        Self::open(&SegmentRecord::default())
    }

    fn segment_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Segment, &self.segment.id)
    }

    fn rule_index(&self, rule_id: &str) -> ModelResult<usize> {
        self.segment
            .rules
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or_else(|| ModelError::UnknownRule(rule_id.to_string()))
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        let entity = self.segment_ref();
        self.changes.record(entity, None, "name", json!(name));
        self.segment.name = name;
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        let description = description.into();
        let entity = self.segment_ref();
        self.changes
            .record(entity, None, "description", json!(description));
        self.segment.description = description;
    }

    pub fn add_rule(&mut self) -> Id {
        let rule = new_segment_rule(&SegmentRuleRecord::default());
        let id = rule.id.clone();
        self.segment.rules.push(rule);
        id
    }

    pub fn delete_rule(&mut self, rule_id: &str) -> ModelResult<()> {
        let idx = self.rule_index(rule_id)?;
        let rule = self.segment.rules.remove(idx);
        if !rule.is_new {
            self.changes
                .bury(EntityKind::SegmentRule, &rule.id, &self.segment.id);
        }
        Ok(())
    }

    pub fn add_constraint(&mut self, rule_id: &str) -> ModelResult<Id> {
        let idx = self.rule_index(rule_id)?;
        let constraint = new_constraint(&ConstraintRecord::default());
        let id = constraint.id.clone();
        self.segment.rules[idx].constraints.push(constraint);
        self.changes.record(
            EntityRef::new(EntityKind::Constraint, &id),
            Some(EntityRef::new(EntityKind::SegmentRule, rule_id)),
            "created",
            json!(true),
        );
        Ok(id)
    }

    pub fn update_constraint(
        &mut self,
        rule_id: &str,
        constraint_id: &str,
        update: ConstraintUpdate,
    ) -> ModelResult<()> {
        let idx = self.rule_index(rule_id)?;
        let owner = EntityRef::new(EntityKind::SegmentRule, rule_id);
        let constraint = self.segment.rules[idx]
            .constraints
            .iter_mut()
            .find(|c| c.id == constraint_id)
            .ok_or_else(|| ModelError::UnknownConstraint {
                rule_id: rule_id.to_string(),
                constraint_id: constraint_id.to_string(),
            })?;
        apply_constraint_update(constraint, update, &owner, &mut self.changes);
        Ok(())
    }

    pub fn delete_constraint(&mut self, rule_id: &str, constraint_id: &str) -> ModelResult<()> {
        let idx = self.rule_index(rule_id)?;
        remove_constraint(&mut self.segment.rules[idx].constraints, rule_id, constraint_id)?;
        self.changes.record(
            EntityRef::new(EntityKind::Constraint, constraint_id),
            Some(EntityRef::new(EntityKind::SegmentRule, rule_id)),
            "deleted",
            json!(true),
        );
        Ok(())
    }
}
