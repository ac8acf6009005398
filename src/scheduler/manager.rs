//! # 调度管理器
//!
//! 维护调度配置单例与唯一的 cron 任务：配置变更时旧任务被停止、
//! 按新配置重建。另持有日志保留清理任务。

use super::cron::CronExpr;
use crate::config::DetectionConfig;
use crate::detection::service::DetectionService;
use crate::detection::DetectionSettings;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo, lwarn};
use chrono::{Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use entity::scheduler_configs;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// 清理任务固定的 cron
const CLEANUP_CRON: &str = "0 2 * * *";

/// 调度管理器
pub struct SchedulerManager {
    db: DatabaseConnection,
    service: Arc<DetectionService>,
    settings: Arc<RwLock<DetectionSettings>>,
    defaults: DetectionConfig,
    cron_task: Mutex<Option<JoinHandle<()>>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerManager {
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        service: Arc<DetectionService>,
        settings: Arc<RwLock<DetectionSettings>>,
        defaults: DetectionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            service,
            settings,
            defaults,
            cron_task: Mutex::new(None),
            cleanup_task: Mutex::new(None),
        })
    }

    /// 读取调度配置单例；缺失时用进程默认值播种
    pub async fn load_or_seed_config(&self) -> Result<scheduler_configs::Model> {
        if let Some(config) = scheduler_configs::Entity::find().one(&self.db).await? {
            return Ok(config);
        }

        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Scheduler,
            "seed_config",
            "调度配置不存在，使用进程默认值播种"
        );
        let seeded = scheduler_configs::ActiveModel {
            enabled: Set(self.defaults.auto_detect_enabled),
            cron_expr: Set(self.defaults.cron_schedule.clone()),
            timezone: Set(self.defaults.cron_timezone.clone()),
            channel_concurrency: Set(self.defaults.channel_concurrency),
            global_concurrency: Set(self.defaults.max_global_concurrency),
            min_delay_ms: Set(self.defaults.min_delay_ms),
            max_delay_ms: Set(self.defaults.max_delay_ms),
            probe_all: Set(true),
            selected_channel_ids: Set(serde_json::json!([])),
            selected_model_ids: Set(serde_json::json!({})),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        Ok(seeded.insert(&self.db).await?)
    }

    /// 校验配置更新（非法 cron 或倒置延迟区间直接拒绝，不落库）
    pub fn validate_config(config: &scheduler_configs::Model) -> Result<()> {
        CronExpr::validate(&config.cron_expr)?;
        config
            .timezone
            .parse::<Tz>()
            .map_err(|_| GatewayError::config(format!("未知时区: {}", config.timezone)))?;
        if config.min_delay_ms < 0 || config.min_delay_ms > config.max_delay_ms {
            return Err(GatewayError::config(format!(
                "延迟区间非法: min={} max={}",
                config.min_delay_ms, config.max_delay_ms
            )));
        }
        if config.channel_concurrency < 1 || config.global_concurrency < 1 {
            return Err(GatewayError::config("并发上限必须大于 0"));
        }
        Ok(())
    }

    /// 启动调度：加载配置、同步工作池参数、建立 cron 与清理任务
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let config = self.load_or_seed_config().await?;
        self.apply_settings(&config).await;
        self.rebuild_cron_task(&config).await;
        self.rebuild_cleanup_task(&config).await;
        Ok(())
    }

    /// 配置更新后重建 cron 任务（原任务先停止）
    pub async fn reload(self: &Arc<Self>) -> Result<()> {
        let config = self.load_or_seed_config().await?;
        self.apply_settings(&config).await;
        self.rebuild_cron_task(&config).await;
        self.rebuild_cleanup_task(&config).await;
        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Scheduler,
            "scheduler_reloaded",
            &format!(
                "调度已重建: enabled={} cron=\"{}\" tz={}",
                config.enabled, config.cron_expr, config.timezone
            )
        );
        Ok(())
    }

    /// 把配置中的并发/抖动参数同步给工作池
    async fn apply_settings(&self, config: &scheduler_configs::Model) {
        let mut settings = self.settings.write().await;
        *settings = DetectionSettings {
            channel_concurrency: config.channel_concurrency,
            global_concurrency: config.global_concurrency,
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
        };
    }

    async fn rebuild_cron_task(self: &Arc<Self>, config: &scheduler_configs::Model) {
        let mut guard = self.cron_task.lock().await;
        if let Some(task) = guard.take() {
            task.abort();
        }
        if !config.enabled {
            ldebug!(
                "system",
                LogStage::Scheduling,
                LogComponent::Scheduler,
                "cron_disabled",
                "定时探测未启用"
            );
            return;
        }

        let cron = match CronExpr::parse(&config.cron_expr) {
            Ok(cron) => cron,
            Err(e) => {
                lerror!(
                    "system",
                    LogStage::Scheduling,
                    LogComponent::Scheduler,
                    "cron_invalid",
                    &format!("cron 表达式非法，定时探测停用: {e}")
                );
                return;
            }
        };
        let tz: Tz = config.timezone.parse().unwrap_or(chrono_tz::UTC);
        let manager = Arc::clone(self);
        let snapshot = config.clone();

        *guard = Some(tokio::spawn(async move {
            manager.cron_loop(cron, tz, snapshot).await;
        }));
    }

    async fn cron_loop(&self, cron: CronExpr, tz: Tz, config: scheduler_configs::Model) {
        loop {
            let now = Utc::now().with_timezone(&tz);
            let Some(next) = cron.next_after(now) else {
                lwarn!(
                    "system",
                    LogStage::Scheduling,
                    LogComponent::Scheduler,
                    "cron_no_next",
                    "cron 表达式在一年内没有下一次触发，定时探测停用"
                );
                return;
            };
            let wait = (next - now).max(ChronoDuration::zero());
            ldebug!(
                "system",
                LogStage::Scheduling,
                LogComponent::Scheduler,
                "cron_sleep",
                &format!("下一次定时探测: {next}")
            );
            tokio::time::sleep(wait.to_std().unwrap_or_default()).await;

            self.fire_scheduled_detection(&config).await;
        }
    }

    async fn fire_scheduled_detection(&self, config: &scheduler_configs::Model) {
        let result = if config.probe_all {
            self.service.trigger_full_detection(true).await
        } else {
            let channel_ids: Vec<i32> =
                serde_json::from_value(config.selected_channel_ids.clone()).unwrap_or_default();
            let model_ids: HashMap<i32, Vec<i32>> =
                parse_selected_model_ids(&config.selected_model_ids);
            self.service
                .trigger_selective_detection(&channel_ids, &model_ids)
                .await
        };

        match result {
            Ok(summary) => {
                linfo!(
                    "system",
                    LogStage::Scheduling,
                    LogComponent::Scheduler,
                    "scheduled_detection",
                    &format!(
                        "定时探测已触发: {} 渠道 / {} 模型 / {} 任务",
                        summary.channel_count, summary.model_count, summary.job_count
                    )
                );
            }
            Err(GatewayError::ConflictDetectionRunning { .. }) => {
                lwarn!(
                    "system",
                    LogStage::Scheduling,
                    LogComponent::Scheduler,
                    "scheduled_skipped",
                    "上一轮探测尚未结束，本次定时触发跳过"
                );
            }
            Err(e) => {
                lerror!(
                    "system",
                    LogStage::Scheduling,
                    LogComponent::Scheduler,
                    "scheduled_failed",
                    &format!("定时探测触发失败: {e}")
                );
            }
        }
    }

    async fn rebuild_cleanup_task(self: &Arc<Self>, config: &scheduler_configs::Model) {
        let mut guard = self.cleanup_task.lock().await;
        if let Some(task) = guard.take() {
            task.abort();
        }

        let cron = CronExpr::parse(CLEANUP_CRON).expect("内置清理 cron 必定合法");
        let tz: Tz = config.timezone.parse().unwrap_or(chrono_tz::UTC);
        let db = self.db.clone();
        let retention_days = self.defaults.log_retention_days;

        *guard = Some(tokio::spawn(async move {
            loop {
                let now = Utc::now().with_timezone(&tz);
                let Some(next) = cron.next_after(now) else {
                    return;
                };
                let wait = (next - now).max(ChronoDuration::zero());
                tokio::time::sleep(wait.to_std().unwrap_or_default()).await;

                match purge_expired_logs(&db, retention_days).await {
                    Ok(purged) => {
                        linfo!(
                            "system",
                            LogStage::BackgroundTask,
                            LogComponent::Scheduler,
                            "logs_purged",
                            &format!("清理 {purged} 条过期探测日志（保留 {retention_days} 天）")
                        );
                    }
                    Err(e) => {
                        lerror!(
                            "system",
                            LogStage::BackgroundTask,
                            LogComponent::Scheduler,
                            "log_purge_failed",
                            &format!("探测日志清理失败: {e}")
                        );
                    }
                }
            }
        }));
    }

    /// 停止全部后台任务
    pub async fn shutdown(&self) {
        if let Some(task) = self.cron_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.cleanup_task.lock().await.take() {
            task.abort();
        }
    }
}

/// 删除超过保留期的探测日志，返回删除行数
pub async fn purge_expired_logs(db: &DatabaseConnection, retention_days: i64) -> Result<u64> {
    let cutoff = Utc::now() - ChronoDuration::days(retention_days);
    let result = entity::probe_logs::Entity::delete_many()
        .filter(entity::probe_logs::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// 解析选择集：JSON 对象 `{"<channel_id>": [model_id, ...]}`
fn parse_selected_model_ids(value: &serde_json::Value) -> HashMap<i32, Vec<i32>> {
    let mut result = HashMap::new();
    if let Some(map) = value.as_object() {
        for (key, ids) in map {
            if let (Ok(channel_id), Ok(model_ids)) =
                (key.parse::<i32>(), serde_json::from_value::<Vec<i32>>(ids.clone()))
            {
                result.insert(channel_id, model_ids);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config() -> scheduler_configs::Model {
        scheduler_configs::Model {
            id: 1,
            enabled: true,
            cron_expr: "0 3 * * *".into(),
            timezone: "Asia/Shanghai".into(),
            channel_concurrency: 5,
            global_concurrency: 30,
            min_delay_ms: 3000,
            max_delay_ms: 5000,
            probe_all: true,
            selected_channel_ids: json!([]),
            selected_model_ids: json!({}),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_config_accepts_defaults() {
        assert!(SchedulerManager::validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_config_rejects_bad_cron() {
        let mut config = base_config();
        config.cron_expr = "every day".into();
        assert!(SchedulerManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_rejects_reversed_delays() {
        let mut config = base_config();
        config.min_delay_ms = 6000;
        config.max_delay_ms = 3000;
        assert!(SchedulerManager::validate_config(&config).is_err());

        config.min_delay_ms = -1;
        config.max_delay_ms = 1000;
        assert!(SchedulerManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_rejects_unknown_timezone() {
        let mut config = base_config();
        config.timezone = "Mars/Olympus".into();
        assert!(SchedulerManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_parse_selected_model_ids() {
        let parsed = parse_selected_model_ids(&json!({"1": [10, 11], "2": []}));
        assert_eq!(parsed.get(&1), Some(&vec![10, 11]));
        assert_eq!(parsed.get(&2), Some(&vec![]));
        assert!(parse_selected_model_ids(&json!(null)).is_empty());
    }
}
