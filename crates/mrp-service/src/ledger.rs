//! 單據關聯帳本
//!
//! 記錄下推產生的關聯邊，回答「推過什麼、是否還存在、是否已執行」。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mrp_core::relation::DEMAND_COMPUTATION;
use mrp_core::{
    DocumentKind, DocumentRelation, DownstreamDocuments, MrpError, NewRelation, RecordId,
    RelationOutcome, Result, TenantId,
};
use mrp_store::StoreTx;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 寫入關聯；重複邊返回 `AlreadyExists`
pub async fn create_relation<Tx: StoreTx>(
    tx: &mut Tx,
    tenant_id: TenantId,
    relation: NewRelation,
) -> Result<RelationOutcome> {
    let key = relation.key();
    if let Some(existing) = tx.find_relation(tenant_id, &key).await? {
        warn!(?key, "关联关系已存在");
        return Ok(RelationOutcome::AlreadyExists(existing));
    }

    match tx.insert_relation(tenant_id, relation).await {
        Ok(created) => Ok(RelationOutcome::Created(created)),
        Err(MrpError::Conflict(msg)) => {
            let existing = tx
                .find_relation(tenant_id, &key)
                .await?
                .ok_or(MrpError::Conflict(msg))?;
            warn!(?key, "关联关系已存在");
            Ok(RelationOutcome::AlreadyExists(existing))
        }
        Err(err) => Err(err),
    }
}

/// 關聯圖讀取
pub async fn outgoing<Tx: StoreTx>(
    tx: &mut Tx,
    tenant_id: TenantId,
    source_type: &str,
    source_id: RecordId,
) -> Result<Vec<DocumentRelation>> {
    tx.outgoing_relations(tenant_id, source_type, source_id).await
}

pub async fn incoming<Tx: StoreTx>(
    tx: &mut Tx,
    tenant_id: TenantId,
    target_type: &str,
    target_id: RecordId,
) -> Result<Vec<DocumentRelation>> {
    tx.incoming_relations(tenant_id, target_type, target_id).await
}

/// 單據是否出現在關聯圖中（任一端）
pub async fn exists<Tx: StoreTx>(
    tx: &mut Tx,
    tenant_id: TenantId,
    doc_type: &str,
    doc_id: RecordId,
) -> Result<bool> {
    if !tx.outgoing_relations(tenant_id, doc_type, doc_id).await?.is_empty() {
        return Ok(true);
    }
    Ok(!tx.incoming_relations(tenant_id, doc_type, doc_id).await?.is_empty())
}

/// 下推記錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRecord {
    pub target_type: String,
    pub target_id: RecordId,
    pub target_code: Option<String>,
    pub target_name: Option<String>,
    pub relation_desc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub target_exists: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRecords {
    pub records: Vec<PushRecord>,
}

/// 列出計算的下推記錄並探測目標單據是否仍存在
pub async fn push_records<Tx: StoreTx>(
    tx: &mut Tx,
    downstream: &dyn DownstreamDocuments,
    tenant_id: TenantId,
    computation_id: RecordId,
) -> Result<PushRecords> {
    let relations = tx
        .outgoing_relations(tenant_id, DEMAND_COMPUTATION, computation_id)
        .await?;

    let mut records = Vec::with_capacity(relations.len());
    for relation in relations {
        let target_exists = match DocumentKind::parse(&relation.target_type) {
            Some(kind) => downstream.document_exists(tenant_id, kind, relation.target_id).await?,
            None => false,
        };
        records.push(PushRecord {
            target_type: relation.target_type,
            target_id: relation.target_id,
            target_code: relation.target_code,
            target_name: relation.target_name,
            relation_desc: relation.relation_desc,
            created_at: relation.created_at,
            target_exists,
        });
    }
    Ok(PushRecords { records })
}

/// 已下推且仍存在的單據所涵蓋的物料
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushExclusions {
    pub work_order_materials: HashSet<RecordId>,
    pub outsource_materials: HashSet<RecordId>,
    pub purchase_order_materials: HashSet<RecordId>,
    pub production_plan_exists: bool,
    pub purchase_requisition_exists: bool,
}

impl PushExclusions {
    /// 記錄新建單據，使同一輪後續處理也能看到
    pub fn absorb(&mut self, kind: DocumentKind, material_ids: &[RecordId]) {
        let ids = material_ids.iter().copied();
        match kind {
            DocumentKind::WorkOrder => self.work_order_materials.extend(ids),
            DocumentKind::OutsourceWorkOrder => self.outsource_materials.extend(ids),
            DocumentKind::PurchaseOrder => self.purchase_order_materials.extend(ids),
            DocumentKind::ProductionPlan => self.production_plan_exists = true,
            DocumentKind::PurchaseRequisition => self.purchase_requisition_exists = true,
        }
    }
}

/// 已下推排除集；已刪除的下游單據不阻擋重新下推
pub async fn already_pushed_exclusions<Tx: StoreTx>(
    tx: &mut Tx,
    downstream: &dyn DownstreamDocuments,
    tenant_id: TenantId,
    computation_id: RecordId,
) -> Result<PushExclusions> {
    let relations = tx
        .outgoing_relations(tenant_id, DEMAND_COMPUTATION, computation_id)
        .await?;

    let mut exclusions = PushExclusions::default();
    for relation in relations {
        let Some(kind) = DocumentKind::parse(&relation.target_type) else {
            continue;
        };
        if !downstream.document_exists(tenant_id, kind, relation.target_id).await? {
            continue;
        }
        let materials = downstream
            .covered_materials(tenant_id, kind, relation.target_id)
            .await?;
        exclusions.absorb(kind, &materials);
    }
    Ok(exclusions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrp_core::CreatedDocument;
    use mrp_store::{MemoryStore, Store};

    fn document(id: RecordId) -> CreatedDocument {
        CreatedDocument {
            kind: DocumentKind::WorkOrder,
            id,
            code: format!("WO-{id:04}"),
            name: Some("整车".to_string()),
            status: "pending".to_string(),
            material_ids: vec![1],
        }
    }

    #[tokio::test]
    async fn test_duplicate_relation_is_noop() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let first = create_relation(&mut tx, 1, NewRelation::pushed_document(7, "MRP-1", &document(3)))
            .await
            .unwrap();
        let second = create_relation(&mut tx, 1, NewRelation::pushed_document(7, "MRP-1", &document(3)))
            .await
            .unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.relation().id, second.relation().id);
        assert_eq!(outgoing(&mut tx, 1, DEMAND_COMPUTATION, 7).await.unwrap().len(), 1);
        assert!(exists(&mut tx, 1, "work_order", 3).await.unwrap());
        assert!(!exists(&mut tx, 1, "work_order", 4).await.unwrap());
        assert_eq!(incoming(&mut tx, 1, "work_order", 3).await.unwrap().len(), 1);
    }

    #[test]
    fn test_absorb_tracks_kinds() {
        let mut exclusions = PushExclusions::default();
        exclusions.absorb(DocumentKind::WorkOrder, &[1, 2]);
        exclusions.absorb(DocumentKind::PurchaseRequisition, &[3]);

        assert!(exclusions.work_order_materials.contains(&2));
        assert!(exclusions.purchase_requisition_exists);
        assert!(!exclusions.production_plan_exists);
        assert!(exclusions.purchase_order_materials.is_empty());
    }
}
