pub mod fonts;
pub mod storage;
