/// Memoises an async computation in the Redis cache.
///
/// Checks the cache for `$key`. On a hit the cached value is returned. On a
/// miss, or when the cache cannot be read, the block is awaited, the result is
/// queued for a background write with `$ttl` seconds to live, and returned.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::db::Cache) (needs `get_from_cache` and
///   `set_in_background`).
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) to read and write.
/// * `$ttl`: time-to-live in seconds.
/// * `$block`: future producing an `AppResult` of the value.
///
/// # Example
/// ```rust,ignore
/// let films = cached!(cache, key, 60, async move {
///     compute_ranking().await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let hit = match $cache.get_from_cache(&$key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, key = %$key, "Cache read failed, computing directly");
                None
            }
        };

        if let Some(cached) = hit {
            tracing::debug!(key = %$key, "Cache hit");
            Ok(cached)
        } else {
            tracing::debug!(key = %$key, "Cache miss");
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
