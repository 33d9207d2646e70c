use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::attendance::LivePolicy;
use crate::utils::time::parse_tz;

/// 服务器配置 - 签到引擎的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/studio/checkin | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | VENUE_TZ | Asia/Seoul | 场馆时区 (IANA) |
/// | CHECKIN_TIMEOUT_MS | 3000 | 在线签到超时(毫秒) |
/// | CHECKIN_MAX_ATTEMPTS | 2 | 转入离线队列前的尝试次数 |
/// | RECONCILE_INTERVAL_SECS | 60 | 离线队列同步间隔(秒) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (unset) | 日志文件目录，未设置时只输出到终端 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/studio VENUE_TZ=America/New_York cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 场馆时区，所有日期/时段比较都在此时区进行
    pub venue_tz: Tz,
    /// 单次在线签到超时 (毫秒)
    pub checkin_timeout_ms: u64,
    /// 在线签到最大尝试次数
    pub checkin_max_attempts: u32,
    /// 离线队列定时同步间隔 (秒)
    pub reconcile_interval_secs: u64,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let venue_tz = match std::env::var("VENUE_TZ") {
            Ok(name) => parse_tz(&name).unwrap_or_else(|e| {
                tracing::warn!("{}, falling back to Asia/Seoul", e);
                chrono_tz::Asia::Seoul
            }),
            Err(_) => chrono_tz::Asia::Seoul,
        };

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/studio/checkin".into()),
            http_port: env_parse("HTTP_PORT", 3000),
            venue_tz,
            checkin_timeout_ms: env_parse("CHECKIN_TIMEOUT_MS", 3000),
            checkin_max_attempts: env_parse("CHECKIN_MAX_ATTEMPTS", 2),
            reconcile_interval_secs: env_parse("RECONCILE_INTERVAL_SECS", 60),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 数据库目录 (work_dir/database)
    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())
    }

    pub fn live_policy(&self) -> LivePolicy {
        LivePolicy {
            timeout: Duration::from_millis(self.checkin_timeout_ms),
            max_attempts: self.checkin_max_attempts.max(1),
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
