//! # LeadConv インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プールとマイグレーション
//! - **リポジトリ**: コンバージョンレコード・リード・顧客の永続化（インメモリ / PostgreSQL）
//! - **外部連携**: テリトリーディレクトリ、オンボーディング、メール通知
//!
//! ## 依存関係
//!
//! ```text
//! conversion-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`error`] - インフラ層エラー定義
//! - [`repository`] - リポジトリ実装
//! - [`territory_directory`] - 地域コードからテリトリーを引くディレクトリ
//! - [`onboarding`] - オンボーディング開始
//! - [`notification`] - メール送信

pub mod db;
pub mod error;
pub mod notification;
pub mod onboarding;
pub mod repository;
pub mod territory_directory;

pub use error::{InfraError, InfraErrorKind};
pub use notification::{NoopNotificationSender, NotificationSender, SmtpNotificationSender};
pub use onboarding::{InMemoryOnboardingInitializer, OnboardingInitializer};
pub use territory_directory::{InMemoryTerritoryDirectory, TerritoryDirectory};
