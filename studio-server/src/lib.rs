//! Studio Check-In Server - 场馆签到引擎
//!
//! # 架构概述
//!
//! - **签到** (`attendance`): 时段解析、会员次数扣减、离线队列与同步
//! - **核心** (`core`): 配置、状态、事件分发、后台任务
//! - **HTTP API** (`api`): 终端与后台使用的 REST 接口
//!
//! # 模块结构
//!
//! ```text
//! studio-server/src/
//! ├── core/          # 配置、状态、错误、后台任务
//! ├── attendance/    # 签到引擎、存储、离线队列、同步
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 错误响应、日志、时区
//! ```

pub mod api;
pub mod attendance;
pub mod core;
pub mod utils;

// Re-export 公共类型
pub use attendance::{AttendanceStorage, CheckInEngine, CheckInService, OfflineQueue, Reconciler};
pub use core::{Config, Server, ServerState};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境: dotenv、工作目录、日志
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    config.ensure_work_dir_structure()?;

    let json_logs = config.is_production();
    init_logger_with_file(&config.log_level, json_logs, config.log_dir.as_deref())?;
    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
   _____ __            ___
  / ___// /___  ______/ (_)___
  \__ \/ __/ / / / __  / / __ \
 ___/ / /_/ /_/ / /_/ / / /_/ /
/____/\__/\__,_/\__,_/_/\____/
   ________              __      ____
  / ____/ /_  ___  _____/ /__   /  _/___
 / /   / __ \/ _ \/ ___/ //_/   / // __ \
/ /___/ / / /  __/ /__/ ,<    _/ // / / /
\____/_/ /_/\___/\___/_/|_|  /___/_/ /_/
    "#
    );
}
