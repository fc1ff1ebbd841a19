//! # LeadConv ドメイン層
//!
//! リードから顧客へのコンバージョンを扱うドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（例: ConversionRecord, Lead）
//! - **値オブジェクト**: 識別子を持たない不変オブジェクト（例: Version, LeadId）
//! - **ADT ステートマシン**: 状態ごとに有効なフィールドだけを持たせ、不正な状態を型で排除
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! ## 依存関係の方向
//!
//! ```text
//! conversion-service → infra → domain
//! ```
//!
//! ドメイン層はインフラ層（DB、外部サービス）には一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`conversion`] - ステップカタログ、ステップインスタンス、コンバージョンレコード
//! - [`lead`] - 変換元となるリード
//! - [`customer`] - 変換結果として作成される顧客
//! - [`territory`] - テリトリーとテリトリーマネージャー
//! - [`notification`] - 営業チームへのメール通知
//! - [`clock`] - 時刻プロバイダ
//! - [`error`] - ドメイン層で発生するエラーの定義
//!
//! ## 使用例
//!
//! ```rust
//! use leadconv_domain::{DomainError, conversion::CONVERSION_STEPS};
//!
//! assert_eq!(CONVERSION_STEPS.len(), 6);
//!
//! let error = DomainError::NotFound {
//!     entity_type: "ConversionRecord",
//!     id:          "cv-123".to_string(),
//! };
//! assert!(error.to_string().contains("cv-123"));
//! ```

#[macro_use]
mod macros;

pub mod clock;
pub mod conversion;
pub mod customer;
pub mod error;
pub mod lead;
pub mod notification;
pub mod territory;
pub mod value_objects;

pub use error::DomainError;
