use anyhow::{anyhow, Result};
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::model::{
    generate_id, ConstraintInput, ConstraintRecord, DistributionRecord, FlagInput, FlagRecord, Id,
    NewFlagInput, RuleInput, RuleRecord, SegmentInput, SegmentRecord, SegmentRuleInput,
    SegmentRuleRecord, VariantInput, VariantRecord, VariantRef,
};
use crate::store::traits::{FlagStore, RuleStore, SegmentStore, VariantStore};

#[derive(Debug, Default)]
struct MemoryState {
    flags: HashMap<Id, FlagRecord>,
    segments: HashMap<Id, SegmentRecord>,
}

/// Process-local store. Assigns fresh ids on every create, the way a real
/// persistence layer would, so local ids never leak into stored records.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim, keeping its ids. Used for seeding.
    pub fn insert_flag(&self, record: FlagRecord) -> Id {
        let id = record.id.clone().unwrap_or_else(generate_id);
        let mut record = record;
        record.id = Some(id.clone());
        record.is_new = None;
        self.state.write().flags.insert(id.clone(), record);
        id
    }

    fn with_flag<T>(&self, flag_id: &Id, f: impl FnOnce(&mut FlagRecord) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let flag = state
            .flags
            .get_mut(flag_id)
            .ok_or_else(|| anyhow!("Flag '{}' not found", flag_id))?;
        f(flag)
    }

    fn with_segment<T>(
        &self,
        segment_id: &Id,
        f: impl FnOnce(&mut SegmentRecord) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.write();
        let segment = state
            .segments
            .get_mut(segment_id)
            .ok_or_else(|| anyhow!("Segment '{}' not found", segment_id))?;
        f(segment)
    }
}

fn constraint_records(inputs: Vec<ConstraintInput>) -> Vec<ConstraintRecord> {
    inputs
        .into_iter()
        .map(|c| ConstraintRecord {
            id: Some(generate_id()),
            property: Some(c.property),
            operation: Some(c.operation),
            values: Some(c.values),
            kind: None,
            is_new: None,
        })
        .collect()
}

fn rule_record(id: Id, input: RuleInput) -> RuleRecord {
    RuleRecord {
        id: Some(id),
        constraints: Some(constraint_records(input.constraints)),
        distributions: Some(
            input
                .distributions
                .into_iter()
                .map(|d| DistributionRecord {
                    id: Some(generate_id()),
                    variant: Some(VariantRef::new(d.variant_id)),
                    percentage: Some(d.percentage),
                    is_new: None,
                })
                .collect(),
        ),
        is_new: None,
    }
}

fn matches_search(record: &FlagRecord, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    [record.key.as_deref(), record.name.as_deref()]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

#[async_trait::async_trait]
impl FlagStore for MemoryStore {
    async fn get_flag(&self, id: &Id) -> Result<Option<FlagRecord>> {
        Ok(self.state.read().flags.get(id).cloned())
    }

    async fn list_flags(&self, search: Option<&str>) -> Result<Vec<FlagRecord>> {
        let state = self.state.read();
        Ok(state
            .flags
            .values()
            .filter(|f| search.map_or(true, |s| matches_search(f, s)))
            .cloned()
            .sorted_by(|a, b| a.key.cmp(&b.key))
            .collect())
    }

    async fn create_flag(&self, input: NewFlagInput) -> Result<Id> {
        let mut state = self.state.write();
        if state
            .flags
            .values()
            .any(|f| f.key.as_deref() == Some(input.key.as_str()))
        {
            return Err(anyhow!("Flag with key '{}' already exists", input.key));
        }
        let id = generate_id();
        state.flags.insert(
            id.clone(),
            FlagRecord {
                id: Some(id.clone()),
                key: Some(input.key),
                name: Some(input.name),
                description: Some(input.description),
                enabled: Some(false),
                variants: Some(Vec::new()),
                rules: Some(Vec::new()),
                ..FlagRecord::default()
            },
        );
        Ok(id)
    }

    async fn update_flag(&self, id: &Id, input: FlagInput) -> Result<()> {
        self.with_flag(id, |flag| {
            flag.key = Some(input.key);
            flag.name = Some(input.name);
            flag.description = Some(input.description);
            flag.enabled = Some(input.enabled);
            flag.default_variant_when_on = input.default_variant_when_on.map(VariantRef::new);
            flag.default_variant_when_off = input.default_variant_when_off.map(VariantRef::new);
            Ok(())
        })
    }

    async fn delete_flag(&self, id: &Id) -> Result<bool> {
        Ok(self.state.write().flags.remove(id).is_some())
    }
}

#[async_trait::async_trait]
impl VariantStore for MemoryStore {
    async fn create_variant(&self, flag_id: &Id, input: VariantInput) -> Result<Id> {
        self.with_flag(flag_id, |flag| {
            let id = generate_id();
            flag.variants.get_or_insert_with(Vec::new).push(VariantRecord {
                id: Some(id.clone()),
                description: Some(input.description),
                value: Some(input.value),
                ..VariantRecord::default()
            });
            Ok(id)
        })
    }

    async fn update_variant(&self, flag_id: &Id, id: &Id, input: VariantInput) -> Result<()> {
        self.with_flag(flag_id, |flag| {
            let variant = flag
                .variants
                .iter_mut()
                .flatten()
                .find(|v| v.id.as_ref() == Some(id))
                .ok_or_else(|| anyhow!("Variant '{}' not found on flag '{}'", id, flag_id))?;
            variant.description = Some(input.description);
            variant.kind = Some(input.value.kind());
            variant.value = Some(input.value);
            Ok(())
        })
    }

    async fn delete_variant(&self, flag_id: &Id, id: &Id) -> Result<bool> {
        self.with_flag(flag_id, |flag| {
            let variants = flag.variants.get_or_insert_with(Vec::new);
            let before = variants.len();
            variants.retain(|v| v.id.as_ref() != Some(id));
            Ok(variants.len() != before)
        })
    }
}

#[async_trait::async_trait]
impl RuleStore for MemoryStore {
    async fn create_flag_rule(&self, flag_id: &Id, input: RuleInput) -> Result<Id> {
        self.with_flag(flag_id, |flag| {
            let id = generate_id();
            flag.rules
                .get_or_insert_with(Vec::new)
                .push(rule_record(id.clone(), input));
            Ok(id)
        })
    }

    async fn update_flag_rule(&self, flag_id: &Id, id: &Id, input: RuleInput) -> Result<()> {
        self.with_flag(flag_id, |flag| {
            let rule = flag
                .rules
                .iter_mut()
                .flatten()
                .find(|r| r.id.as_ref() == Some(id))
                .ok_or_else(|| anyhow!("Rule '{}' not found on flag '{}'", id, flag_id))?;
            *rule = rule_record(id.clone(), input);
            Ok(())
        })
    }

    async fn delete_flag_rule(&self, flag_id: &Id, id: &Id) -> Result<bool> {
        self.with_flag(flag_id, |flag| {
            let rules = flag.rules.get_or_insert_with(Vec::new);
            let before = rules.len();
            rules.retain(|r| r.id.as_ref() != Some(id));
            Ok(rules.len() != before)
        })
    }

    async fn create_segment_rule(&self, segment_id: &Id, input: SegmentRuleInput) -> Result<Id> {
        self.with_segment(segment_id, |segment| {
            let id = generate_id();
            segment
                .rules
                .get_or_insert_with(Vec::new)
                .push(SegmentRuleRecord {
                    id: Some(id.clone()),
                    constraints: Some(constraint_records(input.constraints)),
                    is_new: None,
                });
            Ok(id)
        })
    }

    async fn update_segment_rule(
        &self,
        segment_id: &Id,
        id: &Id,
        input: SegmentRuleInput,
    ) -> Result<()> {
        self.with_segment(segment_id, |segment| {
            let rule = segment
                .rules
                .iter_mut()
                .flatten()
                .find(|r| r.id.as_ref() == Some(id))
                .ok_or_else(|| anyhow!("Rule '{}' not found on segment '{}'", id, segment_id))?;
            rule.constraints = Some(constraint_records(input.constraints));
            Ok(())
        })
    }

    async fn delete_segment_rule(&self, segment_id: &Id, id: &Id) -> Result<bool> {
        self.with_segment(segment_id, |segment| {
            let rules = segment.rules.get_or_insert_with(Vec::new);
            let before = rules.len();
            rules.retain(|r| r.id.as_ref() != Some(id));
            Ok(rules.len() != before)
        })
    }
}

#[async_trait::async_trait]
impl SegmentStore for MemoryStore {
    async fn get_segment(&self, id: &Id) -> Result<Option<SegmentRecord>> {
        Ok(self.state.read().segments.get(id).cloned())
    }

    async fn list_segments(&self) -> Result<Vec<SegmentRecord>> {
        let state = self.state.read();
        Ok(state
            .segments
            .values()
            .cloned()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect())
    }

    async fn create_segment(&self, input: SegmentInput) -> Result<Id> {
        let id = generate_id();
        self.state.write().segments.insert(
            id.clone(),
            SegmentRecord {
                id: Some(id.clone()),
                name: Some(input.name),
                description: Some(input.description),
                rules: Some(Vec::new()),
                is_new: None,
            },
        );
        Ok(id)
    }

    async fn update_segment(&self, id: &Id, input: SegmentInput) -> Result<()> {
        self.with_segment(id, |segment| {
            segment.name = Some(input.name);
            segment.description = Some(input.description);
            Ok(())
        })
    }

    async fn delete_segment(&self, id: &Id) -> Result<bool> {
        Ok(self.state.write().segments.remove(id).is_some())
    }
}
