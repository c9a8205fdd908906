//! 計算參數解析
//!
//! 配置表查詢走環境連線池，租戶未啟用配置表時得到空參數，不影響主交易。

use mrp_calc::merge_scoped;
use mrp_core::{ComputationParams, RecordId, Result, TenantId};
use mrp_store::Store;
use tracing::debug;

pub struct ConfigResolver<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> ConfigResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// 合併 global → warehouse → material → material_warehouse 的配置參數
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        material_id: Option<RecordId>,
        warehouse_id: Option<RecordId>,
    ) -> Result<ComputationParams> {
        let configs = self
            .store
            .load_computation_configs(tenant_id, material_id, warehouse_id)
            .await?;
        let merged = merge_scoped(&configs, material_id, warehouse_id);
        debug!(
            tenant_id,
            ?material_id,
            ?warehouse_id,
            records = configs.len(),
            "解析計算參數配置"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrp_core::{ComputationConfig, ConfigScope};
    use mrp_store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_material_scope_overrides_global() {
        let store = MemoryStore::new();
        store
            .seed_config(ComputationConfig::global(1, 1, json!({"safety_stock": 5, "keep": true})))
            .await;
        store
            .seed_config(
                ComputationConfig::global(2, 1, json!({"safety_stock": 8}))
                    .with_scope(ConfigScope::Material, Some(7), None),
            )
            .await;

        let resolver = ConfigResolver::new(&store);
        let params = resolver.resolve(1, Some(7), None).await.unwrap();
        assert_eq!(params.decimal("safety_stock"), Some(8.into()));
        assert!(params.flag("keep", false));

        let other = resolver.resolve(1, Some(9), None).await.unwrap();
        assert_eq!(other.decimal("safety_stock"), Some(5.into()));
    }

    #[tokio::test]
    async fn test_missing_table_yields_empty_params() {
        let store = MemoryStore::new();
        store.set_config_table_present(false).await;

        let params = ConfigResolver::new(&store).resolve(1, Some(7), None).await.unwrap();
        assert!(params.as_map().is_empty());
    }
}
