//! Data Transfer Objects for REST request/response serialization.
//!
//! All monetary amounts are serialized as JSON strings to prevent
//! precision loss on decimal values.

pub mod common_dto;
pub mod deal_dto;
pub mod wallet_dto;

pub use common_dto::*;
pub use deal_dto::*;
pub use wallet_dto::*;
