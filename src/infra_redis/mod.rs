mod refresh_store_redis;

pub use refresh_store_redis::*;
