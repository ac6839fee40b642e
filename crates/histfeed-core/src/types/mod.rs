//! 수집 시스템 전반에서 사용되는 공통 타입.

mod asset_class;
mod bar_size;
mod data_type;
mod span;

pub use asset_class::*;
pub use bar_size::*;
pub use data_type::*;
pub use span::*;
