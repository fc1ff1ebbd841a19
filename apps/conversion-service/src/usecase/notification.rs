//! # 通知ユースケース
//!
//! `notify-team` ステップが送るメールの組み立てと送信。

mod service;
mod template_renderer;

pub use service::NotificationService;
pub use template_renderer::TemplateRenderer;
