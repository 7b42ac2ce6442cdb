// ==========================================
// 商品导入系统 - 导入层
// ==========================================
// 职责: 外部文件 → 类型化实体 → 落库
// 支持: CSV（自动识别方言）, XLS/XLSX
// 流程: 方言识别 → 字段映射 → 复合行组装 → 重复处理策略 → 进度跟踪
// ==========================================

// 模块声明
pub mod assembler;
pub mod dialect;
pub mod error;
pub mod field_mapping;
pub mod orchestrator;
pub mod progress;
pub mod relationship_holder;
pub mod row_source;
pub mod strategy;
pub mod transformer;

// 重导出核心类型
pub use assembler::CompositeRowAssembler;
pub use dialect::{Dialect, DialectAnalyzer};
pub use error::{ImportError, ImportResult};
pub use field_mapping::{suggest_mapping, FieldMapping, MappingTarget};
pub use orchestrator::{ImportOrchestrator, ImportRequest};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use relationship_holder::{AssembledRow, RelationshipHolder};
pub use row_source::{open_row_source, validate_file, FileInfo, FileKind, RowSource, SourceRow};
pub use strategy::{create_strategy, DuplicateStrategy, StrategyContext};
pub use transformer::{TransformParams, TransformerRegistry, TypedValue, ValueTransformer, ValueType};
