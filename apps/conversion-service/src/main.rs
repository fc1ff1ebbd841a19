//! # Conversion Service サーバー
//!
//! リードを顧客に変換するコンバージョンワークフローを実行するサービス。
//!
//! ## 役割
//!
//! - **コンバージョン実行**: 6 ステップのパイプラインを順に実行
//! - **レコード管理**: コンバージョンレコードの作成・照会・リトライ
//! - **リード管理**: コンバージョン対象のリードの登録と一覧
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `CONVERSION_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `CONVERSION_PORT` | No | ポート番号（デフォルト: `3100`） |
//! | `STORAGE_BACKEND` | No | `memory`（デフォルト）または `postgres` |
//! | `DATABASE_URL` | postgres 時 | PostgreSQL 接続 URL |
//! | `CONVERSION_STEP_DELAY_MS` | No | 各ステップ前の待ち時間 |
//! | `CONVERSION_STEP_TIMEOUT_SECS` | No | ステップのタイムアウト |
//! | `NOTIFICATION_BACKEND` | No | `noop`（デフォルト）または `smtp` |
//! | `LOG_FORMAT` | No | `pretty`（デフォルト）または `json` |
//! | `LOG_FILTER_DEFAULT` | No | `RUST_LOG` 未設定時のログフィルタ |
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（インメモリ、デモデータ投入）
//! cargo run -p leadconv-conversion-service
//!
//! # PostgreSQL
//! STORAGE_BACKEND=postgres DATABASE_URL=postgres://... cargo run -p leadconv-conversion-service --release
//! ```

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use leadconv_conversion_service::{
    config::{ConversionConfig, NotificationBackend, StorageConfig},
    handler::{ConversionAppState, LeadAppState, router},
    seed,
    usecase::{
        ConversionUseCaseImpl,
        LeadUseCaseImpl,
        NotificationService,
        StepDependencies,
        StepPipeline,
        TemplateRenderer,
    },
};
use leadconv_domain::clock::{Clock, SystemClock};
use leadconv_infra::{
    InMemoryOnboardingInitializer,
    InMemoryTerritoryDirectory,
    NoopNotificationSender,
    NotificationSender,
    SmtpNotificationSender,
    db,
    repository::{
        ConversionRepository,
        CustomerRepository,
        InMemoryConversionRepository,
        InMemoryCustomerRepository,
        InMemoryLeadRepository,
        LeadRepository,
        PostgresConversionRepository,
        PostgresCustomerRepository,
        PostgresLeadRepository,
    },
};
use leadconv_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// 永続化の実装一式
struct Repositories {
    conversions: Arc<dyn ConversionRepository>,
    leads:       Arc<dyn LeadRepository>,
    customers:   Arc<dyn CustomerRepository>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(&TracingConfig::from_env("conversion-service"));

    let config = ConversionConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        "Conversion Service サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repositories = match &config.storage {
        StorageConfig::Memory => {
            let leads = seed::demo_leads(clock.now()).context("デモデータの作成に失敗しました")?;
            tracing::info!("インメモリストレージを使用します（デモリード {} 件）", leads.len());
            Repositories {
                conversions: Arc::new(InMemoryConversionRepository::new()),
                leads:       Arc::new(InMemoryLeadRepository::with_leads(leads)),
                customers:   Arc::new(InMemoryCustomerRepository::new()),
            }
        }
        StorageConfig::Postgres { database_url } => {
            let pool = db::create_pool(database_url)
                .await
                .context("データベース接続に失敗しました")?;
            db::run_migrations(&pool)
                .await
                .context("マイグレーションに失敗しました")?;
            tracing::info!("データベースに接続しました");
            Repositories {
                conversions: Arc::new(PostgresConversionRepository::new(pool.clone())),
                leads:       Arc::new(PostgresLeadRepository::new(pool.clone())),
                customers:   Arc::new(PostgresCustomerRepository::new(pool)),
            }
        }
    };

    let sender: Arc<dyn NotificationSender> = match config.notification.backend {
        NotificationBackend::Smtp => {
            tracing::info!(
                "SMTP 通知を使用します: {}:{}",
                config.notification.smtp_host,
                config.notification.smtp_port
            );
            Arc::new(SmtpNotificationSender::new(
                &config.notification.smtp_host,
                config.notification.smtp_port,
                config.notification.from_address.clone(),
            ))
        }
        NotificationBackend::Noop => Arc::new(NoopNotificationSender),
    };
    let notifications = Arc::new(NotificationService::new(
        sender,
        TemplateRenderer::new().context("通知テンプレートの読み込みに失敗しました")?,
        config.notification.base_url.clone(),
        config.notification.team_address.clone(),
    ));

    let pipeline = StepPipeline::standard(StepDependencies {
        customers: repositories.customers.clone(),
        territories: Arc::new(
            InMemoryTerritoryDirectory::seeded().context("テリトリーの読み込みに失敗しました")?,
        ),
        onboarding: Arc::new(InMemoryOnboardingInitializer::new()),
        notifications,
        clock: clock.clone(),
    });

    let conversion_state = Arc::new(ConversionAppState {
        usecase: ConversionUseCaseImpl::new(
            repositories.conversions,
            repositories.leads.clone(),
            pipeline,
            clock.clone(),
            config.execution,
        ),
    });
    let lead_state = Arc::new(LeadAppState {
        usecase: LeadUseCaseImpl::new(repositories.leads, clock),
    });

    let app = router(conversion_state, lead_state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("バインドアドレスが不正です")?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Conversion Service サーバーが起動しました: {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
