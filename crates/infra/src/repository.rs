//! # リポジトリ実装
//!
//! 永続化を担うトレイトと、そのインメモリ実装・PostgreSQL 実装を提供する。
//!
//! | トレイト | インメモリ | PostgreSQL |
//! |---------|-----------|------------|
//! | [`ConversionRepository`] | [`InMemoryConversionRepository`] | [`PostgresConversionRepository`] |
//! | [`LeadRepository`] | [`InMemoryLeadRepository`] | [`PostgresLeadRepository`] |
//! | [`CustomerRepository`] | [`InMemoryCustomerRepository`] | [`PostgresCustomerRepository`] |

pub mod conversion_repository;
pub mod customer_repository;
pub mod lead_repository;

pub use conversion_repository::{
    ConversionRepository,
    InMemoryConversionRepository,
    PostgresConversionRepository,
};
pub use customer_repository::{
    CustomerRepository,
    InMemoryCustomerRepository,
    PostgresCustomerRepository,
};
pub use lead_repository::{InMemoryLeadRepository, LeadRepository, PostgresLeadRepository};
