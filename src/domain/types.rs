// ==========================================
// 商品导入系统 - 领域类型定义
// ==========================================
// 职责: 实体类型、导入目标、重复策略、错误处理模式、状态机状态
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 实体类型 (Entity Type)
// ==========================================
// Product 为主实体, Region / Competitor 为从属实体
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Product,    // 商品(主实体)
    Region,     // 区域价格(从属)
    Competitor, // 竞品价格(从属)
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Product, EntityType::Region, EntityType::Competitor];

    /// 映射字符串 `<prefix>.<field>` 中使用的前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Region => "region",
            EntityType::Competitor => "competitor",
        }
    }

    /// 按前缀解析实体类型（忽略大小写）
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_lowercase().as_str() {
            "product" => Some(EntityType::Product),
            "region" => Some(EntityType::Region),
            "competitor" => Some(EntityType::Competitor),
            _ => None,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, EntityType::Product)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Product => write!(f, "PRODUCT"),
            EntityType::Region => write!(f, "REGION"),
            EntityType::Competitor => write!(f, "COMPETITOR"),
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::from_prefix(s).ok_or_else(|| format!("不支持的实体类型: {}", s))
    }
}

// ==========================================
// 导入目标 (Import Target)
// ==========================================
// 单实体导入或复合导入(一行 = 主实体 + N 个从属实体)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportTarget {
    Product,
    Region,
    Competitor,
    Composite,
}

impl ImportTarget {
    /// 该导入目标涉及的实体类型
    pub fn entity_types(&self) -> Vec<EntityType> {
        match self {
            ImportTarget::Product => vec![EntityType::Product],
            ImportTarget::Region => vec![EntityType::Region],
            ImportTarget::Competitor => vec![EntityType::Competitor],
            ImportTarget::Composite => EntityType::ALL.to_vec(),
        }
    }

    pub fn accepts(&self, entity_type: EntityType) -> bool {
        self.entity_types().contains(&entity_type)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, ImportTarget::Composite)
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportTarget::Product => write!(f, "PRODUCT"),
            ImportTarget::Region => write!(f, "REGION"),
            ImportTarget::Competitor => write!(f, "COMPETITOR"),
            ImportTarget::Composite => write!(f, "COMPOSITE"),
        }
    }
}

impl FromStr for ImportTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PRODUCT" => Ok(ImportTarget::Product),
            "REGION" => Ok(ImportTarget::Region),
            "COMPETITOR" => Ok(ImportTarget::Competitor),
            "COMPOSITE" | "COMBINED" => Ok(ImportTarget::Composite),
            other => Err(format!("不支持的导入目标: {}", other)),
        }
    }
}

// ==========================================
// 重复处理策略 (Duplicate Strategy)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateStrategyKind {
    #[default]
    Ignore,   // 全部作为新记录写入
    Skip,     // 已存在的外部编号整行跳过
    Override, // 已存在的记录覆盖, 从属记录重建
}

impl fmt::Display for DuplicateStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateStrategyKind::Ignore => write!(f, "IGNORE"),
            DuplicateStrategyKind::Skip => write!(f, "SKIP"),
            DuplicateStrategyKind::Override => write!(f, "OVERRIDE"),
        }
    }
}

impl FromStr for DuplicateStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IGNORE" => Ok(DuplicateStrategyKind::Ignore),
            "SKIP" => Ok(DuplicateStrategyKind::Skip),
            "OVERRIDE" => Ok(DuplicateStrategyKind::Override),
            other => Err(format!("未知的重复处理策略: {}", other)),
        }
    }
}

// ==========================================
// 错误处理模式 (Error Handling)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandling {
    Stop,     // 首个错误即终止
    #[default]
    Continue, // 记录错误并继续
    Report,   // 继续, 结束时持久化完整错误清单
}

impl fmt::Display for ErrorHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorHandling::Stop => write!(f, "stop"),
            ErrorHandling::Continue => write!(f, "continue"),
            ErrorHandling::Report => write!(f, "report"),
        }
    }
}

impl FromStr for ErrorHandling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop" => Ok(ErrorHandling::Stop),
            "continue" => Ok(ErrorHandling::Continue),
            "report" => Ok(ErrorHandling::Report),
            other => Err(format!("未知的错误处理模式: {}", other)),
        }
    }
}

// ==========================================
// 持久化的操作状态 (Operation Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "PENDING"),
            OperationStatus::Processing => write!(f, "PROCESSING"),
            OperationStatus::Completed => write!(f, "COMPLETED"),
            OperationStatus::Failed => write!(f, "FAILED"),
            OperationStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PENDING" => Ok(OperationStatus::Pending),
            "PROCESSING" => Ok(OperationStatus::Processing),
            "COMPLETED" => Ok(OperationStatus::Completed),
            "FAILED" => Ok(OperationStatus::Failed),
            "CANCELLED" => Ok(OperationStatus::Cancelled),
            other => Err(format!("未知的操作状态: {}", other)),
        }
    }
}

// ==========================================
// 导入状态机 (Import State)
// ==========================================
// INIT → ANALYZING → MAPPING → VALIDATING_HEADERS → PROCESSING → FINALIZING
//      → {COMPLETED | FAILED | CANCELLED}
// repr(u8) 便于放入 AtomicU8 做 CAS 迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ImportState {
    Init = 0,
    Analyzing = 1,
    Mapping = 2,
    ValidatingHeaders = 3,
    Processing = 4,
    Finalizing = 5,
    Completed = 6,
    Failed = 7,
    Cancelled = 8,
}

impl ImportState {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ImportState::Init),
            1 => Some(ImportState::Analyzing),
            2 => Some(ImportState::Mapping),
            3 => Some(ImportState::ValidatingHeaders),
            4 => Some(ImportState::Processing),
            5 => Some(ImportState::Finalizing),
            6 => Some(ImportState::Completed),
            7 => Some(ImportState::Failed),
            8 => Some(ImportState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportState::Completed | ImportState::Failed | ImportState::Cancelled
        )
    }

    /// 取消只允许发生在 FINALIZING 之前
    pub fn is_cancellable(&self) -> bool {
        (*self as u8) < (ImportState::Finalizing as u8)
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportState::Init => "INIT",
            ImportState::Analyzing => "ANALYZING",
            ImportState::Mapping => "MAPPING",
            ImportState::ValidatingHeaders => "VALIDATING_HEADERS",
            ImportState::Processing => "PROCESSING",
            ImportState::Finalizing => "FINALIZING",
            ImportState::Completed => "COMPLETED",
            ImportState::Failed => "FAILED",
            ImportState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_prefix_roundtrip() {
        for ty in EntityType::ALL {
            assert_eq!(EntityType::from_prefix(ty.prefix()), Some(ty));
        }
        assert_eq!(EntityType::from_prefix("Region"), Some(EntityType::Region));
        assert_eq!(EntityType::from_prefix("warehouse"), None);
    }

    #[test]
    fn test_import_target_entity_types() {
        assert_eq!(ImportTarget::Region.entity_types(), vec![EntityType::Region]);
        assert!(ImportTarget::Composite.accepts(EntityType::Competitor));
        assert!(!ImportTarget::Product.accepts(EntityType::Region));
        assert_eq!("combined".parse::<ImportTarget>(), Ok(ImportTarget::Composite));
    }

    #[test]
    fn test_strategy_and_error_handling_parse() {
        assert_eq!("skip".parse::<DuplicateStrategyKind>(), Ok(DuplicateStrategyKind::Skip));
        assert!("MERGE".parse::<DuplicateStrategyKind>().is_err());
        assert_eq!("Report".parse::<ErrorHandling>(), Ok(ErrorHandling::Report));
    }

    #[test]
    fn test_import_state_u8_roundtrip() {
        for raw in 0u8..=8 {
            let state = ImportState::from_u8(raw).unwrap();
            assert_eq!(state as u8, raw);
        }
        assert!(ImportState::from_u8(9).is_none());
        assert!(ImportState::Processing.is_cancellable());
        assert!(!ImportState::Finalizing.is_cancellable());
        assert!(ImportState::Cancelled.is_terminal());
    }

    #[test]
    fn test_serde_format() {
        let json = serde_json::to_string(&ImportState::ValidatingHeaders).unwrap();
        assert_eq!(json, "\"VALIDATING_HEADERS\"");
        let json = serde_json::to_string(&ErrorHandling::Stop).unwrap();
        assert_eq!(json, "\"stop\"");
    }
}
