//! BOM 展開（含來源控制）
//!
//! 依物料來源類型決定節點是否輸出為需求、是否繼續展開子件：
//! 自製件輸出自身，採購/委外件為葉子，虛擬件只穿透不輸出，配置件按標準 BOM 展開。

use std::collections::HashMap;

use mrp_core::{
    Bom, BomSource, ComputationParams, Material, MaterialCatalog, MrpError, PolicyFlags, RecordId,
    Result, SourceType, TenantId,
};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// 預設最大展開層數
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// 展開選項
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionOptions {
    pub only_approved: bool,
    pub bom_version: Option<String>,
    pub use_default_bom: bool,
    pub material_bom_versions: HashMap<RecordId, String>,
    /// 租戶是否允許多版本 BOM
    pub allow_multi_version: bool,
    /// 嵌套自製件是否繼續展開
    pub expand_make_children: bool,
    pub max_depth: usize,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            only_approved: true,
            bom_version: None,
            use_default_bom: false,
            material_bom_versions: HashMap::new(),
            allow_multi_version: false,
            expand_make_children: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ExpansionOptions {
    pub fn from_params(params: &ComputationParams, policy: &PolicyFlags, max_depth: usize) -> Self {
        Self {
            only_approved: params.only_approved(),
            bom_version: params.bom_version(),
            use_default_bom: params.use_default_bom(),
            material_bom_versions: params.material_bom_versions(),
            allow_multi_version: policy.allow_multi_version_bom,
            expand_make_children: params.expand_make_children(),
            max_depth,
        }
    }

    /// 指定物料要求的 BOM 版本；未開啟多版本或要求使用預設時為 `None`
    pub fn requested_version(&self, material_id: RecordId) -> Option<&str> {
        if self.use_default_bom || !self.allow_multi_version {
            return None;
        }
        self.material_bom_versions
            .get(&material_id)
            .or(self.bom_version.as_ref())
            .map(String::as_str)
    }
}

/// 展開產生的需求
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRequirement {
    pub material: Material,
    pub source_type: SourceType,
    pub required_quantity: Decimal,
    /// 0 為需求物料本身
    pub level: usize,
}

struct Frame {
    material_id: RecordId,
    quantity: Decimal,
    depth: usize,
    path: Vec<RecordId>,
}

/// BOM 展開器
pub struct BomExpander<'a> {
    materials: &'a dyn MaterialCatalog,
    boms: &'a dyn BomSource,
    options: &'a ExpansionOptions,
}

impl<'a> BomExpander<'a> {
    pub fn new(
        materials: &'a dyn MaterialCatalog,
        boms: &'a dyn BomSource,
        options: &'a ExpansionOptions,
    ) -> Self {
        Self {
            materials,
            boms,
            options,
        }
    }

    /// 展開單一需求物料
    ///
    /// 以顯式堆疊做深度優先展開；同一路徑重複出現的物料視為循環引用。
    pub async fn expand(
        &self,
        tenant_id: TenantId,
        material_id: RecordId,
        quantity: Decimal,
    ) -> Result<Vec<LeafRequirement>> {
        let root = self
            .materials
            .get_material(tenant_id, material_id)
            .await?
            .ok_or_else(|| MrpError::not_found(format!("物料不存在: {material_id}")))?;
        let root_type = self.source_type_of(tenant_id, &root).await?;

        let mut leaves = Vec::new();
        let expand_root = matches!(
            root_type,
            SourceType::Make | SourceType::Configure | SourceType::Phantom
        );
        if root_type != SourceType::Phantom {
            leaves.push(LeafRequirement {
                material: root,
                source_type: root_type,
                required_quantity: quantity,
                level: 0,
            });
        }
        if !expand_root {
            return Ok(leaves);
        }

        let mut stack = vec![Frame {
            material_id,
            quantity,
            depth: 0,
            path: vec![material_id],
        }];

        while let Some(frame) = stack.pop() {
            if frame.depth >= self.options.max_depth {
                warn!(
                    material_id = frame.material_id,
                    max_depth = self.options.max_depth,
                    "BOM 展開達到最大層數，停止展開"
                );
                continue;
            }

            let Some(bom) = self.resolve_bom(tenant_id, frame.material_id).await? else {
                debug!(material_id = frame.material_id, "物料無可用 BOM");
                continue;
            };

            for line in bom.lines.iter().filter(|l| !l.is_alternative) {
                if frame.path.contains(&line.component_id) {
                    return Err(MrpError::BomExplosion(format!(
                        "检测到BOM循环引用: {} -> {}",
                        path_text(&frame.path),
                        line.component_id
                    )));
                }

                let Some(component) = self.materials.get_material(tenant_id, line.component_id).await? else {
                    warn!(component_id = line.component_id, bom = %bom.bom_code, "子件物料不存在，略過");
                    continue;
                };

                let component_quantity = line.component_quantity(frame.quantity);
                let component_type = self.source_type_of(tenant_id, &component).await?;
                let level = frame.depth + 1;

                let expand_child = match component_type {
                    SourceType::Phantom | SourceType::Configure => true,
                    SourceType::Make => self.options.expand_make_children,
                    SourceType::Buy | SourceType::Outsource => false,
                };

                if expand_child {
                    let mut path = frame.path.clone();
                    path.push(component.id);
                    stack.push(Frame {
                        material_id: component.id,
                        quantity: component_quantity,
                        depth: level,
                        path,
                    });
                }

                if component_type != SourceType::Phantom {
                    leaves.push(LeafRequirement {
                        material: component,
                        source_type: component_type,
                        required_quantity: component_quantity,
                        level,
                    });
                }
            }
        }

        Ok(leaves)
    }

    /// 解析 BOM：指定版本不存在時退回預設 BOM
    pub async fn resolve_bom(&self, tenant_id: TenantId, material_id: RecordId) -> Result<Option<Bom>> {
        if let Some(version) = self.options.requested_version(material_id) {
            let bom = self
                .boms
                .find_bom(tenant_id, material_id, Some(version), self.options.only_approved)
                .await?;
            if bom.is_some() {
                return Ok(bom);
            }
            debug!(material_id, version, "指定 BOM 版本不存在，使用預設 BOM");
        }
        self.boms
            .find_bom(tenant_id, material_id, None, self.options.only_approved)
            .await
    }

    /// 未設置來源類型時：有 BOM 為自製件，否則為採購件
    async fn source_type_of(&self, tenant_id: TenantId, material: &Material) -> Result<SourceType> {
        if let Some(source_type) = material.resolved_source_type() {
            return Ok(source_type);
        }
        let has_bom = self.resolve_bom(tenant_id, material.id).await?.is_some();
        Ok(if has_bom { SourceType::Make } else { SourceType::Buy })
    }
}

fn path_text(path: &[RecordId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mrp_core::BomLine;
    use serde_json::json;

    #[derive(Default)]
    struct Fixture {
        materials: HashMap<RecordId, Material>,
        boms: Vec<Bom>,
    }

    impl Fixture {
        fn material(mut self, id: RecordId, source_type: Option<SourceType>) -> Self {
            let mut material = Material::new(id, format!("M{id}"), format!("物料{id}"));
            material.source_type = source_type;
            self.materials.insert(id, material);
            self
        }

        fn bom(mut self, material_id: RecordId, version: &str, is_default: bool, lines: Vec<BomLine>) -> Self {
            self.boms.push(Bom {
                id: self.boms.len() as RecordId + 1,
                material_id,
                bom_code: format!("BOM-{material_id}-{version}"),
                version: version.to_string(),
                approved: true,
                is_default,
                lines,
            });
            self
        }
    }

    #[async_trait]
    impl MaterialCatalog for Fixture {
        async fn get_material(&self, _tenant_id: TenantId, material_id: RecordId) -> Result<Option<Material>> {
            Ok(self.materials.get(&material_id).cloned())
        }
    }

    #[async_trait]
    impl BomSource for Fixture {
        async fn find_bom(
            &self,
            _tenant_id: TenantId,
            material_id: RecordId,
            version: Option<&str>,
            only_approved: bool,
        ) -> Result<Option<Bom>> {
            Ok(self
                .boms
                .iter()
                .filter(|b| b.material_id == material_id && (!only_approved || b.approved))
                .find(|b| match version {
                    Some(v) => b.version == v,
                    None => b.is_default,
                })
                .cloned())
        }
    }

    fn qty(leaves: &[LeafRequirement], material_id: RecordId) -> Option<Decimal> {
        leaves
            .iter()
            .filter(|l| l.material.id == material_id)
            .map(|l| l.required_quantity)
            .reduce(|a, b| a + b)
    }

    #[tokio::test]
    async fn test_make_root_expands_one_level() {
        let fixture = Fixture::default()
            .material(1, Some(SourceType::Make))
            .material(2, Some(SourceType::Buy))
            .material(3, Some(SourceType::Make))
            .material(4, Some(SourceType::Buy))
            .bom(1, "V1", true, vec![BomLine::new(2, Decimal::from(2)), BomLine::new(3, Decimal::from(3))])
            .bom(3, "V1", true, vec![BomLine::new(4, Decimal::from(5))]);
        let options = ExpansionOptions::default();
        let expander = BomExpander::new(&fixture, &fixture, &options);

        let leaves = expander.expand(1, 1, Decimal::from(10)).await.unwrap();

        assert_eq!(qty(&leaves, 1), Some(Decimal::from(10)));
        assert_eq!(qty(&leaves, 2), Some(Decimal::from(20)));
        assert_eq!(qty(&leaves, 3), Some(Decimal::from(30)));
        assert_eq!(qty(&leaves, 4), None);
    }

    #[tokio::test]
    async fn test_expand_make_children_goes_deeper() {
        let fixture = Fixture::default()
            .material(1, Some(SourceType::Make))
            .material(3, Some(SourceType::Make))
            .material(4, Some(SourceType::Buy))
            .bom(1, "V1", true, vec![BomLine::new(3, Decimal::from(3))])
            .bom(3, "V1", true, vec![BomLine::new(4, Decimal::from(5))]);
        let options = ExpansionOptions {
            expand_make_children: true,
            ..ExpansionOptions::default()
        };
        let expander = BomExpander::new(&fixture, &fixture, &options);

        let leaves = expander.expand(1, 1, Decimal::from(2)).await.unwrap();
        assert_eq!(qty(&leaves, 4), Some(Decimal::from(30)));
    }

    #[tokio::test]
    async fn test_phantom_passes_through() {
        let fixture = Fixture::default()
            .material(1, Some(SourceType::Make))
            .material(10, Some(SourceType::Phantom))
            .material(11, Some(SourceType::Buy))
            .bom(1, "V1", true, vec![BomLine::new(10, Decimal::ONE)])
            .bom(10, "V1", true, vec![BomLine::new(11, Decimal::from(4))]);
        let options = ExpansionOptions::default();
        let expander = BomExpander::new(&fixture, &fixture, &options);

        let leaves = expander.expand(1, 1, Decimal::from(5)).await.unwrap();

        assert_eq!(qty(&leaves, 1), Some(Decimal::from(5)));
        assert_eq!(qty(&leaves, 10), None);
        assert_eq!(qty(&leaves, 11), Some(Decimal::from(20)));
    }

    #[tokio::test]
    async fn test_alternatives_skipped_and_waste_applied() {
        let fixture = Fixture::default()
            .material(1, Some(SourceType::Make))
            .material(2, Some(SourceType::Buy))
            .material(3, Some(SourceType::Buy))
            .bom(
                1,
                "V1",
                true,
                vec![
                    BomLine::new(2, Decimal::ONE).with_waste_rate(Decimal::from(10)),
                    BomLine::new(3, Decimal::ONE).as_alternative(),
                ],
            );
        let options = ExpansionOptions::default();
        let expander = BomExpander::new(&fixture, &fixture, &options);

        let leaves = expander.expand(1, 1, Decimal::from(10)).await.unwrap();
        assert_eq!(qty(&leaves, 2), Some(Decimal::from(11)));
        assert_eq!(qty(&leaves, 3), None);
    }

    #[tokio::test]
    async fn test_phantom_cycle_is_an_error() {
        let fixture = Fixture::default()
            .material(1, Some(SourceType::Make))
            .material(10, Some(SourceType::Phantom))
            .material(11, Some(SourceType::Phantom))
            .bom(1, "V1", true, vec![BomLine::new(10, Decimal::ONE)])
            .bom(10, "V1", true, vec![BomLine::new(11, Decimal::ONE)])
            .bom(11, "V1", true, vec![BomLine::new(10, Decimal::ONE)]);
        let options = ExpansionOptions::default();
        let expander = BomExpander::new(&fixture, &fixture, &options);

        let err = expander.expand(1, 1, Decimal::ONE).await.unwrap_err();
        assert!(matches!(err, MrpError::BomExplosion(_)));
    }

    #[tokio::test]
    async fn test_version_selection_requires_multi_version_policy() {
        let fixture = Fixture::default()
            .material(1, Some(SourceType::Make))
            .material(2, Some(SourceType::Buy))
            .material(3, Some(SourceType::Buy))
            .bom(1, "V1", true, vec![BomLine::new(2, Decimal::ONE)])
            .bom(1, "V2", false, vec![BomLine::new(3, Decimal::ONE)]);
        let params = ComputationParams::from_value(&json!({"bom_version": "V2"}));

        let gated = ExpansionOptions::from_params(&params, &PolicyFlags::default(), DEFAULT_MAX_DEPTH);
        let leaves = BomExpander::new(&fixture, &fixture, &gated)
            .expand(1, 1, Decimal::ONE)
            .await
            .unwrap();
        assert!(qty(&leaves, 2).is_some());

        let policy = PolicyFlags {
            allow_multi_version_bom: true,
            ..PolicyFlags::default()
        };
        let allowed = ExpansionOptions::from_params(&params, &policy, DEFAULT_MAX_DEPTH);
        let leaves = BomExpander::new(&fixture, &fixture, &allowed)
            .expand(1, 1, Decimal::ONE)
            .await
            .unwrap();
        assert!(qty(&leaves, 3).is_some());
        assert!(qty(&leaves, 2).is_none());
    }

    #[tokio::test]
    async fn test_untyped_material_inferred_from_bom() {
        let fixture = Fixture::default()
            .material(1, None)
            .material(2, None)
            .bom(1, "V1", true, vec![BomLine::new(2, Decimal::from(2))]);
        let options = ExpansionOptions::default();
        let leaves = BomExpander::new(&fixture, &fixture, &options)
            .expand(1, 1, Decimal::ONE)
            .await
            .unwrap();

        assert_eq!(leaves[0].source_type, SourceType::Make);
        assert_eq!(leaves[1].source_type, SourceType::Buy);
    }
}
