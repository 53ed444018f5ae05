//! 업스트림 응답 본문을 수정하는 응답 필터

pub mod label_filter;

pub use label_filter::LabelFilter;
