//! 과거 시세 수집을 위한 도메인 모델.

mod bar;
mod raw;
mod request;

pub use bar::*;
pub use raw::*;
pub use request::*;
