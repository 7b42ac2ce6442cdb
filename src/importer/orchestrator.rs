// ==========================================
// 商品导入系统 - 导入编排器
// ==========================================
// 状态机: INIT → ANALYZING → MAPPING → VALIDATING_HEADERS → PROCESSING → FINALIZING
//         → {COMPLETED | FAILED | CANCELLED}
// 流程: 文件校验 → 方言识别 → 字段映射 → 表头校验 → 分块(组装 → 策略落库 → 进度) → 汇总
// 并发: 单个操作顺序处理各块; 多个操作可并发（run_many）
// 取消: 块边界检查标志; FINALIZING 与 CANCELLED 通过同一次 CAS 互斥
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::ImportSettings;
use crate::domain::operation::{
    BatchSaveResult, ErrorLog, ImportSummary, OperationDescriptor, OperationRecord,
};
use crate::domain::types::{
    DuplicateStrategyKind, EntityType, ErrorHandling, ImportState, ImportTarget, OperationStatus,
};
use crate::importer::assembler::CompositeRowAssembler;
use crate::importer::dialect::Dialect;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapping::{suggest_mapping, FieldMapping};
use crate::importer::progress::{ProgressSnapshot, ProgressState, ProgressTracker};
use crate::importer::relationship_holder::RelationshipHolder;
use crate::importer::row_source::{
    compute_sha256, open_row_source, validate_file, FileInfo, FileKind,
};
use crate::importer::strategy::{create_strategy, DuplicateStrategy, StrategyContext};
use crate::importer::transformer::TransformerRegistry;
use crate::repository::import_repo::ImportRepository;
use crate::repository::status_store::StatusStore;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// ImportRequest - 一次导入请求
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub path: PathBuf,
    pub target: ImportTarget,
    /// None = 使用配置中的默认客户
    pub client_id: Option<i64>,
    /// (表头, "prefix.field[|params]"); 为空时按表头自动推荐
    pub mapping: Vec<(String, String)>,
    /// None = 从配置读取
    pub settings: Option<ImportSettings>,
    /// 覆盖 settings.duplicate_handling
    pub strategy: Option<DuplicateStrategyKind>,
}

impl ImportRequest {
    pub fn new(path: impl Into<PathBuf>, target: ImportTarget) -> Self {
        Self {
            path: path.into(),
            target,
            client_id: None,
            mapping: Vec::new(),
            settings: None,
            strategy: None,
        }
    }

    pub fn with_client(mut self, client_id: i64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_mapping<H: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (H, V)>,
    ) -> Self {
        self.mapping = pairs
            .into_iter()
            .map(|(h, v)| (h.into(), v.into()))
            .collect();
        self
    }

    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_strategy(mut self, strategy: DuplicateStrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

// ==========================================
// OperationControl - 单个操作的状态机与取消标志
// ==========================================
#[derive(Debug)]
pub struct OperationControl {
    operation_id: i64,
    state: AtomicU8,
    cancel_reason: Mutex<Option<String>>,
}

impl OperationControl {
    fn new(operation_id: i64) -> Self {
        Self {
            operation_id,
            state: AtomicU8::new(ImportState::Init as u8),
            cancel_reason: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ImportState {
        ImportState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(ImportState::Failed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ImportState::Cancelled
    }

    fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.lock().ok().and_then(|r| r.clone())
    }

    /// CAS 迁移; 已被取消时返回 Cancelled
    fn transition(&self, from: ImportState, to: ImportState) -> ImportResult<()> {
        match self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(operation_id = self.operation_id, from = %from, to = %to, "状态迁移");
                Ok(())
            }
            Err(current) => match ImportState::from_u8(current) {
                Some(ImportState::Cancelled) => Err(self.cancelled_error()),
                other => Err(ImportError::InvalidStateTransition {
                    from: other.map(|s| s.to_string()).unwrap_or_default(),
                    to: to.to_string(),
                }),
            },
        }
    }

    /// 请求取消; FINALIZING 及之后返回 false
    fn request_cancel(&self, reason: Option<String>) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        if !ImportState::from_u8(current).is_some_and(|s| s.is_cancellable()) {
            return false;
        }
        // 持锁完成 CAS 与原因写入; 落败的请求不改写原因
        let mut slot = self.cancel_reason.lock().ok();
        loop {
            let cancellable = ImportState::from_u8(current).is_some_and(|s| s.is_cancellable());
            if !cancellable {
                return false;
            }
            match self.state.compare_exchange(
                current,
                ImportState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if let Some(slot) = slot.as_mut() {
                        **slot = reason;
                    }
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// 迁移到终态（非终态 → to）
    ///
    /// # 返回
    /// - false: 已处于其他终态（如已被取消）
    fn terminate(&self, to: ImportState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            match ImportState::from_u8(current) {
                Some(s) if s == to => return true,
                Some(s) if s.is_terminal() => return false,
                _ => {}
            }
            match self
                .state
                .compare_exchange(current, to as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn cancelled_error(&self) -> ImportError {
        ImportError::Cancelled(self.cancel_reason().unwrap_or_else(|| "用户取消".to_string()))
    }
}

// ==========================================
// RunContext - 单个操作的运行期状态
// ==========================================
// 每次 run 创建, 操作结束即丢弃
struct RunContext {
    operation_id: i64,
    client_id: i64,
    target: ImportTarget,
    settings: ImportSettings,
    control: Arc<OperationControl>,
    progress: Arc<ProgressState>,
    strategy: Box<dyn DuplicateStrategy>,
    totals: BatchSaveResult,
    errors: ErrorLog,
    warnings: Vec<String>,
    file_name: String,
    file_hash: Option<String>,
    started: Instant,
}

impl RunContext {
    fn strategy_context(&self, repository: Arc<dyn ImportRepository>) -> StrategyContext {
        StrategyContext {
            repository,
            client_id: self.client_id,
            file_id: self.operation_id,
            target: self.target,
        }
    }

    fn summary(&self, status: OperationStatus, message: Option<String>) -> ImportSummary {
        let mut summary = ImportSummary::new(self.operation_id, self.target, self.strategy.kind());
        summary.status = status;
        summary.file_name = Some(self.file_name.clone());
        summary.file_hash = self.file_hash.clone();
        summary.apply_totals(&self.totals);
        summary.total_records = self.progress.total().max(summary.processed_records);
        summary.apply_errors(&self.errors);
        summary.warnings = self.warnings.clone();
        summary.message = message;
        summary.elapsed_ms = self.started.elapsed().as_millis() as u64;
        summary
    }
}

// ==========================================
// ImportOrchestrator
// ==========================================
pub struct ImportOrchestrator {
    repository: Arc<dyn ImportRepository>,
    status_store: Arc<dyn StatusStore>,
    config: Arc<dyn ImportConfigReader>,
    registry: Arc<TransformerRegistry>,
    progress: ProgressTracker,
    controls: Mutex<HashMap<i64, Arc<OperationControl>>>,
}

impl ImportOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - repository: 实体落库
    /// - status_store: 操作状态与进度
    /// - config: 请求未携带参数时的配置来源
    pub fn new(
        repository: Arc<dyn ImportRepository>,
        status_store: Arc<dyn StatusStore>,
        config: Arc<dyn ImportConfigReader>,
    ) -> Self {
        Self::with_registry(
            repository,
            status_store,
            config,
            Arc::new(TransformerRegistry::with_defaults()),
        )
    }

    /// 使用自定义转换器注册表（如注册了额外枚举类型）
    pub fn with_registry(
        repository: Arc<dyn ImportRepository>,
        status_store: Arc<dyn StatusStore>,
        config: Arc<dyn ImportConfigReader>,
        registry: Arc<TransformerRegistry>,
    ) -> Self {
        Self {
            repository,
            progress: ProgressTracker::new(status_store.clone()),
            status_store,
            config,
            registry,
            controls: Mutex::new(HashMap::new()),
        }
    }

    // ==========================================
    // 对外接口
    // ==========================================

    /// 执行一次导入
    ///
    /// # 返回
    /// - Ok(ImportSummary): 操作已到达终态（COMPLETED / FAILED / CANCELLED 见 summary.status）
    /// - Err: 操作记录无法创建（参数非法或状态存储不可用）
    #[instrument(skip(self, request), fields(file = %request.path.display(), target = %request.target))]
    pub async fn run(&self, request: ImportRequest) -> ImportResult<ImportSummary> {
        let mut settings = match request.settings.clone() {
            Some(s) => s,
            None => self.config.get_import_settings().await?,
        };
        if let Some(strategy) = request.strategy {
            settings.duplicate_handling = strategy;
        }
        settings.validate()?;
        let client_id = match request.client_id {
            Some(id) => id,
            None => self.config.get_default_client_id().await?,
        };

        let file_name = request
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| request.path.display().to_string());
        let file_size = std::fs::metadata(&request.path).map(|m| m.len()).unwrap_or(0);

        let operation_id = self
            .status_store
            .create_operation(OperationDescriptor {
                client_id,
                file_name: file_name.clone(),
                file_size,
                target: request.target,
                strategy: settings.duplicate_handling,
                total_hint: 0,
            })
            .await?;
        info!(operation_id, client_id, strategy = %settings.duplicate_handling, "导入操作已创建");

        let control = Arc::new(OperationControl::new(operation_id));
        self.register(control.clone());
        let progress = self.progress.start(
            operation_id,
            0,
            Duration::from_millis(settings.progress_persist_interval_ms),
        );

        let mut ctx = RunContext {
            operation_id,
            client_id,
            target: request.target,
            strategy: create_strategy(settings.duplicate_handling),
            errors: match settings.error_handling {
                ErrorHandling::Report => ErrorLog::with_full_report(settings.max_reported_errors),
                _ => ErrorLog::new(settings.max_reported_errors),
            },
            settings,
            control,
            progress,
            totals: BatchSaveResult::new(),
            warnings: Vec::new(),
            file_name,
            file_hash: None,
            started: Instant::now(),
        };

        let outcome = self.execute(&mut ctx, &request).await;
        let summary = self.conclude(&mut ctx, outcome).await;

        self.unregister(operation_id);
        self.progress.remove(operation_id);
        Ok(summary)
    }

    /// 并发执行多个互不相关的导入
    pub async fn run_many(&self, requests: Vec<ImportRequest>) -> Vec<ImportResult<ImportSummary>> {
        info!(count = requests.len(), "开始并发导入");
        let results = join_all(requests.into_iter().map(|r| self.run(r))).await;
        info!(
            total = results.len(),
            completed = results
                .iter()
                .filter(|r| matches!(r, Ok(s) if s.status == OperationStatus::Completed))
                .count(),
            "并发导入结束"
        );
        results
    }

    /// 请求取消
    ///
    /// # 返回
    /// - true: 已接受, 工作协程将在下一个块边界停止并回滚
    /// - false: 操作不存在或已进入 FINALIZING
    pub fn cancel(&self, operation_id: i64, reason: Option<String>) -> bool {
        let Some(control) = self.control(operation_id) else {
            return false;
        };
        let accepted = control.request_cancel(reason);
        if accepted {
            info!(operation_id, "已请求取消导入");
        } else {
            warn!(operation_id, state = %control.state(), "当前状态不可取消");
        }
        accepted
    }

    /// 运行中操作的内存状态
    pub fn state(&self, operation_id: i64) -> Option<ImportState> {
        self.control(operation_id).map(|c| c.state())
    }

    /// 运行中操作的进度快照
    pub fn progress(&self, operation_id: i64) -> Option<ProgressSnapshot> {
        self.progress.snapshot(operation_id)
    }

    pub fn active_operations(&self) -> Vec<i64> {
        self.controls
            .lock()
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default()
    }

    /// 查询持久化的操作记录
    pub async fn get_status(&self, operation_id: i64) -> ImportResult<Option<OperationRecord>> {
        Ok(self.status_store.get_operation(operation_id).await?)
    }

    // ==========================================
    // 内部流程
    // ==========================================

    fn register(&self, control: Arc<OperationControl>) {
        if let Ok(mut controls) = self.controls.lock() {
            controls.insert(control.operation_id, control);
        }
    }

    fn unregister(&self, operation_id: i64) {
        if let Ok(mut controls) = self.controls.lock() {
            controls.remove(&operation_id);
        }
    }

    fn control(&self, operation_id: i64) -> Option<Arc<OperationControl>> {
        self.controls
            .lock()
            .ok()
            .and_then(|c| c.get(&operation_id).cloned())
    }

    async fn execute(&self, ctx: &mut RunContext, request: &ImportRequest) -> ImportResult<()> {
        // === ANALYZING: 文件校验 + 摘要 + 方言 ===
        ctx.control.transition(ImportState::Init, ImportState::Analyzing)?;
        let info = validate_file(&request.path, ctx.settings.max_file_size_bytes)?;
        ctx.file_hash = Some(hash_file(&info.path).await?);
        let (dialect, mut source) = open_row_source(&info, &ctx.settings)?;
        ctx.warnings.extend(dialect.warnings.iter().cloned());
        let total_hint = total_hint(&info, &dialect, &ctx.settings);
        ctx.progress.set_total(total_hint);
        info!(
            operation_id = ctx.operation_id,
            encoding = %dialect.encoding,
            columns = dialect.headers.len(),
            total_hint,
            "方言识别完成"
        );

        // === MAPPING ===
        ctx.control.transition(ImportState::Analyzing, ImportState::Mapping)?;
        let mapping = if request.mapping.is_empty() {
            let suggested = suggest_mapping(&dialect.headers, ctx.target);
            info!(operation_id = ctx.operation_id, fields = suggested.len(), "使用自动推荐的字段映射");
            suggested
        } else {
            FieldMapping::from_pairs(request.mapping.iter().map(|(h, v)| (h.as_str(), v.as_str())))?
        };
        mapping.check_target(ctx.target)?;

        // === VALIDATING_HEADERS: 未读任何数据行 ===
        ctx.control
            .transition(ImportState::Mapping, ImportState::ValidatingHeaders)?;
        mapping.validate_required(ctx.target, &dialect.headers)?;

        // === PROCESSING ===
        ctx.control
            .transition(ImportState::ValidatingHeaders, ImportState::Processing)?;
        let assembler = CompositeRowAssembler::new(
            &mapping,
            &self.registry,
            ctx.target,
            ctx.client_id,
            ctx.operation_id,
        );
        let strategy_ctx = ctx.strategy_context(self.repository.clone());

        let mut chunk = 0usize;
        loop {
            if ctx.control.is_cancelled() {
                return Err(ctx.control.cancelled_error());
            }
            let rows = source.next_chunk(ctx.settings.batch_size)?;
            if rows.is_empty() {
                break;
            }
            chunk += 1;
            let row_count = rows.len();

            // 组装
            let mut chunk_result = BatchSaveResult::new();
            let mut holder = RelationshipHolder::new();
            let mut dropped = Vec::new();
            for row in &rows {
                match assembler.assemble(row) {
                    Ok(assembled) => {
                        dropped.extend(assembled.errors.iter().cloned());
                        holder.add(assembled);
                    }
                    Err(message) => chunk_result.record_failure(1, message),
                }
            }
            drop(rows);

            // stop 模式: 行级错误出现时不再写入本块
            if ctx.settings.error_handling == ErrorHandling::Stop
                && (chunk_result.failed > 0 || !dropped.is_empty())
            {
                let first = chunk_result
                    .errors
                    .first()
                    .or(dropped.first())
                    .cloned()
                    .unwrap_or_default();
                ctx.errors.extend(chunk_result.errors.drain(..));
                ctx.errors.extend(dropped);
                let accounted = chunk_result.accounted() as u64;
                ctx.totals.merge(chunk_result);
                self.progress.advance(&ctx.progress, accounted).await;
                return Err(ImportError::StoppedOnError(first));
            }
            chunk_result.errors.extend(dropped);

            // 落库
            let outcome = if ctx.target.is_composite() {
                ctx.strategy.process_combined(&strategy_ctx, &holder).await
            } else {
                let entity_type = primary_entity_type(ctx.target);
                ctx.strategy
                    .process(&strategy_ctx, holder.flat_entities(entity_type), entity_type)
                    .await
            };
            match outcome {
                Ok(result) => chunk_result.merge(result),
                Err(e) => {
                    error!(operation_id = ctx.operation_id, chunk, rows = holder.len(), error = %e, "块落库失败");
                    chunk_result.record_failure(holder.len(), format!("块 {}: {}", chunk, e));
                }
            }
            drop(holder);

            let first_error = chunk_result.errors.first().cloned();
            ctx.errors.extend(chunk_result.errors.drain(..));
            ctx.totals.merge(chunk_result);
            let snapshot = self.progress.advance(&ctx.progress, row_count as u64).await;
            debug!(
                operation_id = ctx.operation_id,
                chunk,
                rows = row_count,
                processed = snapshot.processed,
                percent = snapshot.percent,
                "块处理完成"
            );

            if ctx.settings.error_handling == ErrorHandling::Stop {
                if let Some(first) = first_error {
                    return Err(ImportError::StoppedOnError(first));
                }
            }
        }

        // === FINALIZING: 与取消互斥 ===
        ctx.control
            .transition(ImportState::Processing, ImportState::Finalizing)?;
        self.progress.finalize(&ctx.progress).await;
        Ok(())
    }

    /// 按执行结果写入终态
    async fn conclude(&self, ctx: &mut RunContext, outcome: ImportResult<()>) -> ImportSummary {
        let operation_id = ctx.operation_id;
        // 失败先占住 FAILED; 取消已生效时按取消收尾（含回滚）
        let outcome = match outcome {
            Err(e) if !matches!(e, ImportError::Cancelled(_)) => {
                if ctx.control.terminate(ImportState::Failed) {
                    Err(e)
                } else {
                    warn!(operation_id, error = %e, "失败处理前已收到取消");
                    Err(ctx.control.cancelled_error())
                }
            }
            other => other,
        };
        match outcome {
            Ok(()) => {
                let summary = ctx.summary(OperationStatus::Completed, None);
                if let Some(full) = ctx.errors.full_report() {
                    if let Err(e) = self.status_store.save_error_report(operation_id, full).await {
                        warn!(operation_id, error = %e, "完整错误清单保存失败");
                    }
                }
                if let Err(e) = self.status_store.mark_completed(operation_id, &summary).await {
                    error!(operation_id, error = %e, "完成状态写入失败");
                }
                ctx.control.terminate(ImportState::Completed);
                info!(
                    operation_id,
                    processed = summary.processed_records,
                    success = summary.success_records,
                    failed = summary.failed_records,
                    skipped = summary.skipped_records,
                    elapsed_ms = summary.elapsed_ms,
                    "导入完成"
                );
                summary
            }
            Err(ImportError::Cancelled(reason)) => {
                let strategy_ctx = ctx.strategy_context(self.repository.clone());
                let message = match ctx.strategy.rollback(&strategy_ctx).await {
                    Ok(deleted) => format!("{}; 已回滚 {} 条记录", reason, deleted),
                    Err(e) => {
                        error!(operation_id, error = %e, "取消回滚失败");
                        format!("{}; 回滚失败: {}", reason, e)
                    }
                };
                let summary = ctx.summary(OperationStatus::Cancelled, Some(message));
                if let Err(e) = self
                    .status_store
                    .mark_cancelled(operation_id, Some(&reason), &summary)
                    .await
                {
                    error!(operation_id, error = %e, "取消状态写入失败");
                }
                ctx.control.terminate(ImportState::Cancelled);
                info!(operation_id, reason = %reason, "导入已取消");
                summary
            }
            Err(e) => {
                let message = e.to_string();
                if e.is_setup_error() {
                    error!(operation_id, error = %message, "导入初始化失败");
                } else {
                    error!(operation_id, error = %message, "导入失败");
                }
                // stop 模式触发的错误已在清单中
                if !matches!(e, ImportError::StoppedOnError(_)) {
                    ctx.errors.push(message.clone());
                }
                let summary = ctx.summary(OperationStatus::Failed, Some(message.clone()));
                if let Some(full) = ctx.errors.full_report() {
                    if let Err(e) = self.status_store.save_error_report(operation_id, full).await {
                        warn!(operation_id, error = %e, "完整错误清单保存失败");
                    }
                }
                if let Err(e) = self
                    .status_store
                    .mark_failed(operation_id, &message, &summary)
                    .await
                {
                    error!(operation_id, error = %e, "失败状态写入失败");
                }
                summary
            }
        }
    }
}

/// 单实体导入的实体类型
fn primary_entity_type(target: ImportTarget) -> EntityType {
    match target {
        ImportTarget::Region => EntityType::Region,
        ImportTarget::Competitor => EntityType::Competitor,
        ImportTarget::Product | ImportTarget::Composite => EntityType::Product,
    }
}

/// 预估数据行数（用于进度百分比）
fn total_hint(info: &FileInfo, dialect: &Dialect, settings: &ImportSettings) -> u64 {
    match info.kind {
        FileKind::Excel => dialect.estimated_lines,
        FileKind::Csv => {
            let skipped = if dialect.has_header {
                settings.effective_data_start_row()
            } else {
                settings.header_row
            };
            dialect.estimated_lines.saturating_sub(skipped as u64)
        }
    }
}

/// 在阻塞线程池中计算文件摘要
async fn hash_file(path: &Path) -> ImportResult<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_sha256(&path))
        .await
        .map_err(|e| ImportError::InternalError(format!("摘要计算任务失败: {}", e)))?
}
