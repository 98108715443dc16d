// linksync services
// Stateless or self-contained building blocks: normalization, merging, storage,
// the publish queue, relay transports and settings.

pub mod kv_backends;
pub mod local_store;
pub mod merge_engine;
pub mod normalizer;
#[cfg(feature = "network")]
pub mod pusher_relay;
pub mod relay;
pub mod remote_store;
pub mod settings_engine;
pub mod sync_queue;
