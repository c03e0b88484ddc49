use crate::model::{
    FlagInput, FlagRecord, Id, NewFlagInput, RuleInput, SegmentInput, SegmentRecord,
    SegmentRuleInput, VariantInput,
};
use anyhow::Result;

#[async_trait::async_trait]
pub trait FlagStore: Send + Sync {
    async fn get_flag(&self, id: &Id) -> Result<Option<FlagRecord>>;
    /// List flags, optionally filtered by a case-insensitive search on key and name
    async fn list_flags(&self, search: Option<&str>) -> Result<Vec<FlagRecord>>;
    /// Create a flag and return its persisted id
    async fn create_flag(&self, input: NewFlagInput) -> Result<Id>;
    async fn update_flag(&self, id: &Id, input: FlagInput) -> Result<()>;
    async fn delete_flag(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait VariantStore: Send + Sync {
    /// Create a variant under a flag and return its persisted id
    async fn create_variant(&self, flag_id: &Id, input: VariantInput) -> Result<Id>;
    async fn update_variant(&self, flag_id: &Id, id: &Id, input: VariantInput) -> Result<()>;
    async fn delete_variant(&self, flag_id: &Id, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait RuleStore: Send + Sync {
    async fn create_flag_rule(&self, flag_id: &Id, input: RuleInput) -> Result<Id>;
    async fn update_flag_rule(&self, flag_id: &Id, id: &Id, input: RuleInput) -> Result<()>;
    async fn delete_flag_rule(&self, flag_id: &Id, id: &Id) -> Result<bool>;
    async fn create_segment_rule(&self, segment_id: &Id, input: SegmentRuleInput) -> Result<Id>;
    async fn update_segment_rule(
        &self,
        segment_id: &Id,
        id: &Id,
        input: SegmentRuleInput,
    ) -> Result<()>;
    async fn delete_segment_rule(&self, segment_id: &Id, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait SegmentStore: Send + Sync {
    async fn get_segment(&self, id: &Id) -> Result<Option<SegmentRecord>>;
    async fn list_segments(&self) -> Result<Vec<SegmentRecord>>;
    async fn create_segment(&self, input: SegmentInput) -> Result<Id>;
    async fn update_segment(&self, id: &Id, input: SegmentInput) -> Result<()>;
    async fn delete_segment(&self, id: &Id) -> Result<bool>;
}

pub trait Store: FlagStore + VariantStore + RuleStore + SegmentStore + Send + Sync {}
impl<T: FlagStore + VariantStore + RuleStore + SegmentStore + Send + Sync> Store for T {}
