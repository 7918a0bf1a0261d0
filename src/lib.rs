// UserView - live filtered, sorted and exportable view over a user document store

pub mod config;
pub mod export;
pub mod filter;
pub mod jsonl;
pub mod normalize;
pub mod record;
pub mod sort;
pub mod store;
pub mod subscription;
pub mod timestamp;
pub mod users;
pub mod view;

// Re-export main types for convenience
pub use config::Config;
pub use filter::{DateRange, FilterSpec, GenderFilter, ProfileFilter};
pub use record::{Gender, RawDocument, Record};
pub use sort::{SortDir, SortKey, SortSpec};
pub use store::{DocumentStore, Store};
pub use subscription::{Snapshot, Subscription};
pub use timestamp::{IsoCanonicalizer, TimestampCanonicalizer, now_ms};
pub use users::{USERS_COLLECTION, UserInput, UserPatch, add_user, delete_user, update_user};
pub use view::View;
