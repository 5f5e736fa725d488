mod models;
mod store;

pub(crate) use models::ip_diff;
pub use models::RouteEntry;
pub use store::{check_ip_changes, EntryStore, ReconcileReport, RouteChange, SharedStore, Upsert};
