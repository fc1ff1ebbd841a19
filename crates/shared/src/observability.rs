//! # Observability 基盤
//!
//! トレーシングの初期化とログ出力の設定を提供する。
//!
//! | 変数名 | 説明 |
//! |--------|------|
//! | `LOG_FORMAT` | `pretty`（デフォルト）または `json` |
//! | `LOG_FILTER_DEFAULT` | `RUST_LOG` 未設定時のフィルタ（デフォルト: `info,leadconv=debug`） |
//!
//! `RUST_LOG` が設定されていればそちらが優先される。

/// `RUST_LOG` も `LOG_FILTER_DEFAULT` もない場合のフィルタ
pub const DEFAULT_FILTER: &str = "info,leadconv=debug";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 1 行 1 JSON（ログ収集基盤向け）
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// ログ形式を解釈する（大文字小文字は区別しない）
    ///
    /// 不明な値は [`Pretty`](LogFormat::Pretty) にフォールバックし、stderr に警告を出す。
    /// この時点ではトレーシングがまだ使えない。
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" | "" => Self::Pretty,
            other => {
                eprintln!("WARNING: unknown LOG_FORMAT={other:?}, falling back to pretty");
                Self::Pretty
            }
        }
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// サービス名（初期化時のログに出力する）
    pub service_name:   String,
    pub log_format:     LogFormat,
    /// `RUST_LOG` 未設定時に使う EnvFilter 文字列
    pub default_filter: String,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    /// 環境変数から設定を読み取る
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から設定を読み取る
    pub fn from_lookup(
        service_name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let log_format = lookup("LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        let mut config = Self::new(service_name, log_format);
        if let Some(filter) = lookup("LOG_FILTER_DEFAULT").filter(|f| !f.trim().is_empty()) {
            config.default_filter = filter;
        }
        config
    }
}

/// グローバルなトレーシングサブスクライバを登録する
///
/// `ErrorLayer` を含むため、`SpanTrace::capture()` がスパン情報を取得できる。
/// JSON モードではイベントフィールドをトップレベルに展開する。
#[cfg(feature = "observability")]
pub fn init_tracing(config: &TracingConfig) {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_filter));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    tracing::info!(
        service = %config.service_name,
        log.format = ?config.log_format,
        "トレーシングを初期化しました"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parseは大文字小文字を区別しない() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    }

    #[test]
    fn test_parse_不明な値はprettyにフォールバックする() {
        assert_eq!(LogFormat::parse("yaml"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }

    #[test]
    fn test_環境変数がなければデフォルト設定になる() {
        let config = TracingConfig::from_lookup("conversion-service", lookup(&[]));

        assert_eq!(
            config,
            TracingConfig {
                service_name:   "conversion-service".to_string(),
                log_format:     LogFormat::Pretty,
                default_filter: DEFAULT_FILTER.to_string(),
            }
        );
    }

    #[test]
    fn test_環境変数からログ形式とフィルタを読み取る() {
        let config = TracingConfig::from_lookup(
            "conversion-service",
            lookup(&[
                ("LOG_FORMAT", "json"),
                ("LOG_FILTER_DEFAULT", "warn,leadconv_conversion_service=info"),
            ]),
        );

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_filter, "warn,leadconv_conversion_service=info");
    }

    #[test]
    fn test_空のフィルタは無視される() {
        let config =
            TracingConfig::from_lookup("conversion-service", lookup(&[("LOG_FILTER_DEFAULT", "  ")]));

        assert_eq!(config.default_filter, DEFAULT_FILTER);
    }
}
