//! 物料來源驗證
//!
//! 錯誤會阻擋自製件工單建議與下推；警告只提示。

use mrp_core::{
    BomSource, Material, MaterialCatalog, RecordId, Result, SourceConfig, SourceType,
    SourceValidation, TenantId,
};
use serde_json::Value;

pub struct SourceValidator<'a> {
    materials: &'a dyn MaterialCatalog,
    boms: &'a dyn BomSource,
}

impl<'a> SourceValidator<'a> {
    pub fn new(materials: &'a dyn MaterialCatalog, boms: &'a dyn BomSource) -> Self {
        Self { materials, boms }
    }

    /// 依物料 ID 驗證；物料不存在為驗證錯誤而非異常
    pub async fn validate(
        &self,
        tenant_id: TenantId,
        material_id: RecordId,
        source_type: SourceType,
    ) -> Result<SourceValidation> {
        match self.materials.get_material(tenant_id, material_id).await? {
            Some(material) => self.validate_material(tenant_id, &material, source_type).await,
            None => {
                let mut validation = SourceValidation::default();
                validation.error(format!("物料不存在: {material_id}"));
                Ok(validation)
            }
        }
    }

    pub async fn validate_material(
        &self,
        tenant_id: TenantId,
        material: &Material,
        source_type: SourceType,
    ) -> Result<SourceValidation> {
        let mut validation = SourceValidation::default();
        let config = material.source_config_for(source_type);

        match &config {
            SourceConfig::Make { process_route_id, .. } => {
                if !self.has_approved_bom(tenant_id, material.id).await? {
                    validation.error(format!("自制件[{}]缺少已审核的BOM", material.main_code));
                }
                if process_route_id.or(material.process_route_id).is_none() {
                    validation.error(format!("自制件[{}]缺少工艺路线", material.main_code));
                }
            }
            SourceConfig::Buy { .. } => {
                if config.default_supplier().is_none() {
                    validation.warn(format!(
                        "采购件[{}]未设置默认供应商，需通过采购申请处理",
                        material.main_code
                    ));
                }
            }
            SourceConfig::Phantom => self.validate_phantom(tenant_id, material, &mut validation).await?,
            SourceConfig::Outsource {
                supplier_id, operation, ..
            } => {
                if supplier_id.is_none() {
                    validation.error(format!("委外件[{}]缺少委外供应商", material.main_code));
                }
                if operation.is_none() {
                    validation.error(format!("委外件[{}]缺少委外工序", material.main_code));
                }
            }
            SourceConfig::Configure { variant_rules, .. } => {
                let has_variants = material
                    .variant_attributes
                    .as_ref()
                    .is_some_and(|v| !is_empty_json(v));
                if !has_variants {
                    validation.error(format!("配置件[{}]缺少变体属性", material.main_code));
                }
                if variant_rules.as_ref().map_or(true, is_empty_json) {
                    validation.error(format!("配置件[{}]缺少BOM变体配置", material.main_code));
                }
            }
        }

        Ok(validation)
    }

    async fn validate_phantom(
        &self,
        tenant_id: TenantId,
        material: &Material,
        validation: &mut SourceValidation,
    ) -> Result<()> {
        let Some(bom) = self.boms.find_bom(tenant_id, material.id, None, true).await? else {
            validation.error(format!("虚拟件[{}]缺少已审核的BOM", material.main_code));
            return Ok(());
        };

        for line in bom.lines.iter().filter(|l| !l.is_alternative) {
            let Some(child) = self.materials.get_material(tenant_id, line.component_id).await? else {
                continue;
            };
            if child.resolved_source_type() == Some(SourceType::Phantom)
                && !self.has_approved_bom(tenant_id, child.id).await?
            {
                validation.error(format!(
                    "虚拟件[{}]的子件[{}]为虚拟件但缺少BOM",
                    material.main_code, child.main_code
                ));
            }
        }
        Ok(())
    }

    async fn has_approved_bom(&self, tenant_id: TenantId, material_id: RecordId) -> Result<bool> {
        Ok(self
            .boms
            .find_bom(tenant_id, material_id, None, true)
            .await?
            .is_some())
    }
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(list) => list.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMasterData;
    use mrp_core::{Bom, BomLine};
    use rstest::rstest;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn bom(id: RecordId, material_id: RecordId, children: &[RecordId]) -> Bom {
        Bom {
            id,
            material_id,
            bom_code: format!("BOM-{material_id}"),
            version: "V1".to_string(),
            approved: true,
            is_default: true,
            lines: children.iter().map(|&c| BomLine::new(c, Decimal::ONE)).collect(),
        }
    }

    fn master() -> InMemoryMasterData {
        InMemoryMasterData::new()
            .with_material(
                1,
                Material::new(1, "MAKE-OK", "整车")
                    .with_source_type(SourceType::Make)
                    .with_process_route(9),
            )
            .with_bom(1, bom(100, 1, &[2]))
            .with_material(1, Material::new(2, "MAKE-NO", "车架").with_source_type(SourceType::Make))
            .with_material(1, Material::new(3, "BUY", "螺丝").with_source_type(SourceType::Buy))
            .with_material(
                1,
                Material::new(4, "OUT", "电镀件")
                    .with_source_type(SourceType::Outsource)
                    .with_source_config(json!({"outsource_supplier_id": 5})),
            )
            .with_material(1, Material::new(5, "PH", "虚拟组件").with_source_type(SourceType::Phantom))
            .with_bom(1, bom(101, 5, &[6]))
            .with_material(1, Material::new(6, "PH-CHILD", "子虚拟件").with_source_type(SourceType::Phantom))
            .with_material(1, Material::new(7, "CFG", "配置件").with_source_type(SourceType::Configure))
    }

    #[rstest]
    #[case(1, SourceType::Make, true, 0)]
    #[case(2, SourceType::Make, false, 2)]
    #[case(3, SourceType::Buy, true, 0)]
    #[case(4, SourceType::Outsource, false, 1)]
    #[case(5, SourceType::Phantom, false, 1)]
    #[case(7, SourceType::Configure, false, 2)]
    #[case(99, SourceType::Buy, false, 1)]
    #[tokio::test]
    async fn test_source_rules(
        #[case] material_id: RecordId,
        #[case] source_type: SourceType,
        #[case] passed: bool,
        #[case] errors: usize,
    ) {
        let master = master();
        let validator = SourceValidator::new(&master, &master);

        let result = validator.validate(1, material_id, source_type).await.unwrap();
        assert_eq!(result.passed(), passed, "{:?}", result);
        assert_eq!(result.errors.len(), errors, "{:?}", result);
    }

    #[tokio::test]
    async fn test_buy_without_supplier_only_warns() {
        let master = master();
        let validator = SourceValidator::new(&master, &master);

        let result = validator.validate(1, 3, SourceType::Buy).await.unwrap();
        assert!(result.passed());
        assert_eq!(result.warnings.len(), 1);
    }
}
