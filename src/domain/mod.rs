// ==========================================
// 商品导入系统 - 领域模型层
// ==========================================
// 职责: 定义可导入实体、类型、导入操作结果
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod competitor;
pub mod entity;
pub mod operation;
pub mod product;
pub mod region;
pub mod types;

// 重导出核心类型
pub use competitor::Competitor;
pub use entity::{normalize_field_key, EntityRecord, FieldSpec, ImportableEntity};
pub use operation::{
    truncate_error_message, BatchSaveResult, ErrorLog, ImportSummary, OperationDescriptor,
    OperationRecord,
};
pub use product::Product;
pub use region::Region;
pub use types::{
    DuplicateStrategyKind, EntityType, ErrorHandling, ImportState, ImportTarget, OperationStatus,
};
