pub mod charts;
pub mod dataset;
pub mod render;
pub mod report_service;
pub mod storage;
