//! # Conversion Service ライブラリ
//!
//! Conversion Service の設定・ユースケース・ハンドラを公開する。
//! 統合テスト用に内部モジュールへのアクセスを提供する。

pub mod config;
pub mod error;
pub mod handler;
pub mod seed;
pub mod usecase;
