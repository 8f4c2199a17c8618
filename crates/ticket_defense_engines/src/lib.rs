#![forbid(unsafe_code)]

pub mod analysis;
pub mod calendar;
pub mod case_pdf;
pub mod device_vault;
pub mod gemini;
pub mod provider_http;
pub mod strategy;
pub mod ticket_parse;
pub mod tracking;
pub mod vision;
