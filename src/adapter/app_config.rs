use crate::adapter::config_error::{env_or, parse_env, ConfigError};
use std::net::SocketAddr;
use std::time::Duration;

/// 予約データの保存先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// MySQL（本番）
    MySql,
    /// プロセス内メモリ（開発・テスト用、再起動で消える）
    Memory,
}

impl StoreKind {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(StoreKind::MySql),
            "memory" => Ok(StoreKind::Memory),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid RESERVATION_STORE: {} (expected mysql or memory)",
                other
            ))),
        }
    }
}

/// アプリケーション設定
/// サーバー、ホールド期限、スイーパー、レート制限の設定をまとめて保持する
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_addr: SocketAddr,
    pub store: StoreKind,
    /// 新規ホールドの既定の有効期間
    pub hold_duration: Duration,
    /// 利用者が指定できる有効期間の上限
    pub max_hold_duration: Duration,
    pub sweep_interval: Duration,
    pub sweep_batch_size: u32,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            store: StoreKind::MySql,
            hold_duration: Duration::from_secs(1800),
            max_hold_duration: Duration::from_secs(86_400),
            sweep_interval: Duration::from_secs(60),
            sweep_batch_size: 500,
            rate_limit_max_requests: 20,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// 環境変数から設定を読み取る
    /// 環境変数が設定されていない場合はデフォルト値を使用
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_addr = env_or("SERVER_ADDR", "0.0.0.0:3000")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid SERVER_ADDR: {}", e)))?;
        let store = StoreKind::from_string(&env_or("RESERVATION_STORE", "mysql"))?;

        let hold_secs = positive("HOLD_DURATION_SECS", defaults.hold_duration.as_secs())?;
        let max_hold_secs =
            positive("MAX_HOLD_DURATION_SECS", defaults.max_hold_duration.as_secs())?;
        if hold_secs > max_hold_secs {
            return Err(ConfigError::InvalidValue(format!(
                "HOLD_DURATION_SECS ({}) must not exceed MAX_HOLD_DURATION_SECS ({})",
                hold_secs, max_hold_secs
            )));
        }

        let sweep_secs = positive("SWEEP_INTERVAL_SECS", defaults.sweep_interval.as_secs())?;
        let sweep_batch_size = parse_env::<u32>("SWEEP_BATCH_SIZE", defaults.sweep_batch_size)?;
        if sweep_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "SWEEP_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        let rate_limit_max_requests =
            parse_env::<u32>("RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit_max_requests)?;
        if rate_limit_max_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_MAX_REQUESTS must be at least 1".to_string(),
            ));
        }
        let window_secs = positive(
            "RATE_LIMIT_WINDOW_SECS",
            defaults.rate_limit_window.as_secs(),
        )?;

        Ok(Self {
            server_addr,
            store,
            hold_duration: Duration::from_secs(hold_secs),
            max_hold_duration: Duration::from_secs(max_hold_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            sweep_batch_size,
            rate_limit_max_requests,
            rate_limit_window: Duration::from_secs(window_secs),
        })
    }
}

fn positive(name: &str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_env::<u64>(name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be greater than zero",
            name
        )));
    }
    Ok(value)
}
