//! Record storage collaborators

pub mod records;
pub mod supabase;

pub use records::{GameRecord, InMemoryRecordStore, RecordStore, SupabaseRecordStore};
pub use supabase::SupabaseClient;
