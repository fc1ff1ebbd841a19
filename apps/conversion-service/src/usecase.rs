//! # ユースケース層
//!
//! Conversion Service のビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリと外部連携を `Arc<dyn Trait>` で外部から注入
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//!
//! ## モジュール構成
//!
//! - `conversion`: コンバージョンの作成・実行・リトライ
//! - `lead`: リードの登録と一覧
//! - `notification`: 営業チームへのメール通知

pub mod conversion;
pub mod lead;
pub mod notification;

pub use conversion::{ConversionUseCaseImpl, StepDependencies, StepPipeline};
pub use lead::{LeadUseCaseImpl, RegisterLeadInput};
pub use notification::{NotificationService, TemplateRenderer};
