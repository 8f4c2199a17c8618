#![forbid(unsafe_code)]

pub mod cases;
pub mod repo;
pub mod supabase;
