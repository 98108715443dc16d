// linksync state managers
// Managers own stateful workflows over the local store: bookmark CRUD and sync membership.

pub mod bookmark_manager;
pub mod sync_session;
