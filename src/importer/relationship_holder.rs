// ==========================================
// 商品导入系统 - 关系暂存
// ==========================================
// 职责: 按商品外部编号暂存一个块内的 主实体 + 从属实体, 直到主实体获得存储 id
// 约束: 从属实体在 product_ref 解析前不得落库
// 生命周期: 每个块一个实例, 块处理完毕即丢弃
// ==========================================

use crate::domain::entity::ImportableEntity;
use crate::domain::types::EntityType;
use std::collections::HashMap;

// ==========================================
// AssembledRow - 一行组装结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledRow {
    pub line: usize,
    /// 商品外部编号（主实体或从属实体引用的编号）
    pub external_id: String,
    /// 单从属实体导入时为 None
    pub primary: Option<ImportableEntity>,
    pub dependents: Vec<ImportableEntity>,
    /// 被丢弃的从属实体的错误描述
    pub errors: Vec<String>,
}

// ==========================================
// RelationshipHolder
// ==========================================
#[derive(Debug, Default)]
pub struct RelationshipHolder {
    rows: Vec<AssembledRow>,
    /// 外部编号 → 最后一次出现的行序号（OVERRIDE 语义）
    last_occurrence: HashMap<String, usize>,
}

impl RelationshipHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一行; 同一外部编号再次出现时更新“最后出现”记录, 所有出现仍保留在队列中
    pub fn add(&mut self, row: AssembledRow) {
        self.last_occurrence
            .insert(row.external_id.clone(), self.rows.len());
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[AssembledRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 是否为该外部编号在本块内的最后一次出现
    pub fn is_last_occurrence(&self, index: usize) -> bool {
        self.rows
            .get(index)
            .and_then(|row| self.last_occurrence.get(&row.external_id))
            .is_some_and(|last| *last == index)
    }

    /// 去重后的外部编号（按首次出现顺序）
    pub fn external_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.external_id.as_str()))
            .map(|row| row.external_id.clone())
            .collect()
    }

    /// 单实体导入: 取出指定类型的实体及其行号
    pub fn flat_entities(&self, entity_type: EntityType) -> Vec<(usize, ImportableEntity)> {
        self.rows
            .iter()
            .flat_map(|row| {
                let primary = row.primary.iter();
                let dependents = row.dependents.iter();
                primary
                    .chain(dependents)
                    .filter(move |e| e.entity_type() == entity_type)
                    .map(move |e| (row.line, e.clone()))
            })
            .collect()
    }

    /// 把指定行的从属实体关联到主实体存储 id
    ///
    /// # 参数
    /// - indices: 参与关联的行序号
    /// - storage_ids: 外部编号 → 商品存储 id
    ///
    /// # 返回
    /// - (已关联的从属实体, 无法关联的错误描述)
    pub fn link_dependents(
        &self,
        indices: &[usize],
        storage_ids: &HashMap<String, i64>,
    ) -> (Vec<ImportableEntity>, Vec<String>) {
        let mut linked = Vec::new();
        let mut errors = Vec::new();

        for &idx in indices {
            let Some(row) = self.rows.get(idx) else {
                continue;
            };
            if row.dependents.is_empty() {
                continue;
            }
            match storage_ids.get(&row.external_id) {
                Some(id) => {
                    for dependent in &row.dependents {
                        let mut dependent = dependent.clone();
                        set_product_ref(&mut dependent, *id);
                        linked.push(dependent);
                    }
                }
                None => errors.push(format!(
                    "行 {}: 商品 {} 未获得存储 id, {} 条从属记录未写入",
                    row.line,
                    row.external_id,
                    row.dependents.len()
                )),
            }
        }
        (linked, errors)
    }
}

/// 写入从属实体的商品存储 id
pub fn set_product_ref(entity: &mut ImportableEntity, product_ref: i64) {
    match entity {
        ImportableEntity::Product(_) => {}
        ImportableEntity::Region(r) => r.product_ref = Some(product_ref),
        ImportableEntity::Competitor(c) => c.product_ref = Some(product_ref),
    }
}
