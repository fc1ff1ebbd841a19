//! # Conversion Service 設定
//!
//! 環境変数から Conversion Service サーバーの設定を読み込む。
//!
//! 不正な値は起動時に [`ConfigError`] として報告する。

use std::{env, time::Duration};

use thiserror::Error;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("環境変数 {0} が設定されていません")]
    Missing(&'static str),

    /// 値を解釈できない
    #[error("環境変数 {key} の値が不正です: {value}（{reason}）")]
    Invalid {
        key:    &'static str,
        value:  String,
        reason: String,
    },
}

/// Conversion Service サーバーの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    /// バインドアドレス
    pub host:         String,
    /// ポート番号
    pub port:         u16,
    /// 永続化バックエンド
    pub storage:      StorageConfig,
    /// ステップ実行の設定
    pub execution:    ExecutionConfig,
    /// 通知設定
    pub notification: NotificationConfig,
}

/// 永続化バックエンド
///
/// `STORAGE_BACKEND` 環境変数で切り替える:
/// - `memory`: プロセス内に保持（既定）
/// - `postgres`: PostgreSQL に保存（`DATABASE_URL` 必須）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Postgres { database_url: String },
}

/// ステップ実行の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionConfig {
    /// 各ステップの前に挟む擬似的な待ち時間
    pub step_delay:   Duration,
    /// ステップのタイムアウト。未設定ならカタログの所要時間を使う
    pub step_timeout: Option<Duration>,
}

/// 通知バックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationBackend {
    /// 送信しない（ログ出力のみ）
    Noop,
    /// SMTP サーバー経由で送信
    Smtp,
}

/// 通知機能の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub backend:      NotificationBackend,
    /// SMTP ホスト（backend=smtp の場合に使用）
    pub smtp_host:    String,
    /// SMTP ポート（backend=smtp の場合に使用）
    pub smtp_port:    u16,
    /// 送信元メールアドレス
    pub from_address: String,
    /// notify-team ステップの送信先
    pub team_address: String,
    /// フロントエンド URL（メール内リンク用）
    pub base_url:     String,
}

impl ConversionConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意のキー検索関数から設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage = match var("STORAGE_BACKEND", "memory").as_str() {
            "memory" => StorageConfig::Memory,
            "postgres" => StorageConfig::Postgres {
                database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key:    "STORAGE_BACKEND",
                    value:  other.to_string(),
                    reason: "memory または postgres を指定してください".to_string(),
                });
            }
        };

        let backend = match var("NOTIFICATION_BACKEND", "noop").as_str() {
            "noop" => NotificationBackend::Noop,
            "smtp" => NotificationBackend::Smtp,
            other => {
                return Err(ConfigError::Invalid {
                    key:    "NOTIFICATION_BACKEND",
                    value:  other.to_string(),
                    reason: "noop または smtp を指定してください".to_string(),
                });
            }
        };

        let step_timeout = match lookup("CONVERSION_STEP_TIMEOUT_SECS") {
            Some(value) => {
                let secs: u64 = parse("CONVERSION_STEP_TIMEOUT_SECS", &value)?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key:    "CONVERSION_STEP_TIMEOUT_SECS",
                        value,
                        reason: "1 以上を指定してください".to_string(),
                    });
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            host: var("CONVERSION_HOST", "0.0.0.0"),
            port: parse("CONVERSION_PORT", &var("CONVERSION_PORT", "3100"))?,
            storage,
            execution: ExecutionConfig {
                step_delay: Duration::from_millis(parse(
                    "CONVERSION_STEP_DELAY_MS",
                    &var("CONVERSION_STEP_DELAY_MS", "0"),
                )?),
                step_timeout,
            },
            notification: NotificationConfig {
                backend,
                smtp_host: var("SMTP_HOST", "localhost"),
                smtp_port: parse("SMTP_PORT", &var("SMTP_PORT", "1025"))?,
                from_address: var("NOTIFICATION_FROM_ADDRESS", "noreply@leadconv.example.com"),
                team_address: var(
                    "NOTIFICATION_TEAM_ADDRESS",
                    "sales-team@leadconv.example.com",
                ),
                base_url: var("NOTIFICATION_BASE_URL", "http://localhost:5173"),
            },
        })
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ConversionConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ConversionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_未設定ならすべて既定値になる() {
        let config = load(&[]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3100);
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.execution, ExecutionConfig::default());
        assert_eq!(config.notification.backend, NotificationBackend::Noop);
        assert_eq!(config.notification.smtp_port, 1025);
        assert_eq!(
            config.notification.team_address,
            "sales-team@leadconv.example.com"
        );
    }

    #[test]
    fn test_postgresバックエンドはdatabase_urlを読む() {
        let config = load(&[
            ("STORAGE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/leadconv"),
        ])
        .unwrap();

        assert_eq!(
            config.storage,
            StorageConfig::Postgres {
                database_url: "postgres://localhost/leadconv".to_string(),
            }
        );
    }

    #[test]
    fn test_postgresバックエンドでdatabase_url未設定はエラー() {
        let result = load(&[("STORAGE_BACKEND", "postgres")]);

        assert_eq!(result, Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_ステップ実行の設定を読み込む() {
        let config = load(&[
            ("CONVERSION_STEP_DELAY_MS", "250"),
            ("CONVERSION_STEP_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(
            config.execution,
            ExecutionConfig {
                step_delay:   Duration::from_millis(250),
                step_timeout: Some(Duration::from_secs(30)),
            }
        );
    }

    #[rstest]
    #[case("CONVERSION_PORT", "http")]
    #[case("CONVERSION_STEP_DELAY_MS", "-1")]
    #[case("CONVERSION_STEP_TIMEOUT_SECS", "0")]
    #[case("STORAGE_BACKEND", "redis")]
    #[case("NOTIFICATION_BACKEND", "ses")]
    #[case("SMTP_PORT", "70000")]
    fn test_不正な値はエラー(#[case] key: &str, #[case] value: &str) {
        let result = load(&[(key, value)]);

        assert!(
            matches!(result, Err(ConfigError::Invalid { key: k, .. }) if k == key),
            "{key}={value} が受理された: {result:?}"
        );
    }
}
