//! 單據關聯（有向邊）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::downstream::CreatedDocument;
use crate::{RecordId, TenantId};

pub const DEMAND: &str = "demand";
pub const DEMAND_COMPUTATION: &str = "demand_computation";
pub const RELATION_SOURCE: &str = "source";
pub const MODE_PUSH: &str = "push";

/// 單據關聯記錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRelation {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub source_type: String,
    pub source_id: RecordId,
    pub source_code: Option<String>,
    pub target_type: String,
    pub target_id: RecordId,
    pub target_code: Option<String>,
    pub target_name: Option<String>,
    pub relation_type: String,
    pub relation_mode: String,
    pub relation_desc: Option<String>,
    pub business_mode: Option<String>,
    pub demand_id: Option<RecordId>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRelation {
    pub fn key(&self) -> RelationKey {
        RelationKey {
            source_type: self.source_type.clone(),
            source_id: self.source_id,
            target_type: self.target_type.clone(),
            target_id: self.target_id,
            relation_type: self.relation_type.clone(),
        }
    }

    /// 關聯是否觸及指定單據（任一端）
    pub fn touches(&self, doc_type: &str, doc_id: RecordId) -> bool {
        (self.source_type == doc_type && self.source_id == doc_id)
            || (self.target_type == doc_type && self.target_id == doc_id)
    }
}

/// 關聯唯一鍵
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub source_type: String,
    pub source_id: RecordId,
    pub target_type: String,
    pub target_id: RecordId,
    pub relation_type: String,
}

/// 新建關聯
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelation {
    pub source_type: String,
    pub source_id: RecordId,
    pub source_code: Option<String>,
    pub target_type: String,
    pub target_id: RecordId,
    pub target_code: Option<String>,
    pub target_name: Option<String>,
    pub relation_type: String,
    pub relation_mode: String,
    pub relation_desc: Option<String>,
    pub business_mode: Option<String>,
    pub demand_id: Option<RecordId>,
}

impl NewRelation {
    /// 需求計算下推下游單據
    pub fn pushed_document(
        computation_id: RecordId,
        computation_code: &str,
        document: &CreatedDocument,
    ) -> Self {
        Self {
            source_type: DEMAND_COMPUTATION.to_string(),
            source_id: computation_id,
            source_code: Some(computation_code.to_string()),
            target_type: document.kind.as_str().to_string(),
            target_id: document.id,
            target_code: Some(document.code.clone()),
            target_name: document.name.clone(),
            relation_type: RELATION_SOURCE.to_string(),
            relation_mode: MODE_PUSH.to_string(),
            relation_desc: Some(document.relation_desc()),
            business_mode: None,
            demand_id: None,
        }
    }

    /// 需求下推至需求計算
    pub fn demand_to_computation(
        demand_id: RecordId,
        demand_code: &str,
        computation_id: RecordId,
        computation_code: &str,
    ) -> Self {
        Self {
            source_type: DEMAND.to_string(),
            source_id: demand_id,
            source_code: Some(demand_code.to_string()),
            target_type: DEMAND_COMPUTATION.to_string(),
            target_id: computation_id,
            target_code: Some(computation_code.to_string()),
            target_name: None,
            relation_type: RELATION_SOURCE.to_string(),
            relation_mode: MODE_PUSH.to_string(),
            relation_desc: Some("需求下推需求计算".to_string()),
            business_mode: None,
            demand_id: Some(demand_id),
        }
    }

    /// 建構器模式：設置業務模式與來源需求
    pub fn with_business(mut self, business_mode: impl Into<String>, demand_id: Option<RecordId>) -> Self {
        self.business_mode = Some(business_mode.into());
        if demand_id.is_some() {
            self.demand_id = demand_id;
        }
        self
    }

    pub fn key(&self) -> RelationKey {
        RelationKey {
            source_type: self.source_type.clone(),
            source_id: self.source_id,
            target_type: self.target_type.clone(),
            target_id: self.target_id,
            relation_type: self.relation_type.clone(),
        }
    }

    /// 補上 ID 與時間戳成為完整記錄
    pub fn into_relation(self, id: RecordId, tenant_id: TenantId, created_at: DateTime<Utc>) -> DocumentRelation {
        DocumentRelation {
            id,
            tenant_id,
            source_type: self.source_type,
            source_id: self.source_id,
            source_code: self.source_code,
            target_type: self.target_type,
            target_id: self.target_id,
            target_code: self.target_code,
            target_name: self.target_name,
            relation_type: self.relation_type,
            relation_mode: self.relation_mode,
            relation_desc: self.relation_desc,
            business_mode: self.business_mode,
            demand_id: self.demand_id,
            created_at,
        }
    }
}

/// 寫入關聯的結果；重複邊不是錯誤
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationOutcome {
    Created(DocumentRelation),
    /// 关联关系已存在
    AlreadyExists(DocumentRelation),
}

impl RelationOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn relation(&self) -> &DocumentRelation {
        match self {
            Self::Created(relation) | Self::AlreadyExists(relation) => relation,
        }
    }
}
