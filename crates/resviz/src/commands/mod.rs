pub mod cache;
pub mod collect;
pub mod show;
pub mod status;
