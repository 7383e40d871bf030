//! Cache command implementation.

use super::Context;
use crate::cli::args::{CacheCommands, OutputFormat};
use crate::error::SyncError;
use crate::output::{format_cache_entry_pretty, format_keys_pretty, to_json};

/// Execute cache subcommands.
///
/// # Errors
///
/// Returns an error if the store fails or the arguments are invalid.
pub fn cache(ctx: &Context, cmd: CacheCommands) -> Result<String, SyncError> {
    let cache = ctx.cache();
    let format = ctx.format;

    match cmd {
        CacheCommands::Get { key } => {
            let entry = cache
                .get_entry(&key)?
                .ok_or_else(|| SyncError::NotFound(format!("Cache entry '{key}'")))?;
            match format {
                OutputFormat::Json => to_json(&entry),
                OutputFormat::Pretty => Ok(format_cache_entry_pretty(&entry, chrono::Utc::now())),
            }
        },
        CacheCommands::Set {
            key,
            value,
            ttl,
            sticky,
        } => {
            let data: serde_json::Value = serde_json::from_str(&value)
                .map_err(|e| SyncError::InvalidInput(format!("Value is not valid JSON: {e}")))?;
            let ttl = if sticky {
                None
            } else {
                ttl.or(ctx.config.cache.default_ttl_minutes)
            };
            ctx.require_durable()?;
            cache.set_data(&key, &data, ttl)?;
            ctx.require_durable()?;

            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"key": key, "ttl_minutes": ttl})),
                OutputFormat::Pretty => Ok(match ttl {
                    Some(minutes) => format!("Cached '{key}' for {minutes} minutes"),
                    None => format!("Cached '{key}' until removed"),
                }),
            }
        },
        CacheCommands::Remove { key } => {
            let removed = cache.remove_data(&key)?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"key": key, "removed": removed})),
                OutputFormat::Pretty if removed => Ok(format!("Removed '{key}'")),
                OutputFormat::Pretty => Ok(format!("No cache entry '{key}'")),
            }
        },
        CacheCommands::Keys => {
            let keys = cache.get_all_keys()?;
            match format {
                OutputFormat::Json => to_json(&keys),
                OutputFormat::Pretty => Ok(format_keys_pretty(&keys)),
            }
        },
        CacheCommands::Size => {
            let bytes = cache.get_cache_size()?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"bytes": bytes})),
                OutputFormat::Pretty => Ok(format!("Cache size: {bytes} bytes")),
            }
        },
        CacheCommands::Sweep => {
            let removed = cache.clear_expired_data()?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"removed": removed})),
                OutputFormat::Pretty => Ok(format!("Removed {removed} expired entries")),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Paths, StorageBackend};
    use tempfile::TempDir;

    fn create_test_context() -> (Context, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        let mut config = Config::default();
        config.storage.backend = StorageBackend::File;
        (Context::new(config, paths, OutputFormat::Pretty), temp_dir)
    }

    #[test]
    fn test_set_get_remove() {
        let (ctx, _dir) = create_test_context();

        let output = cache(
            &ctx,
            CacheCommands::Set {
                key: "products".to_string(),
                value: "[1,2,3]".to_string(),
                ttl: Some(10),
                sticky: false,
            },
        )
        .unwrap();
        assert_eq!(output, "Cached 'products' for 10 minutes");

        let output = cache(&ctx, CacheCommands::Get { key: "products".to_string() }).unwrap();
        assert!(output.contains("products"));

        let output = cache(&ctx, CacheCommands::Remove { key: "products".to_string() }).unwrap();
        assert_eq!(output, "Removed 'products'");

        let result = cache(&ctx, CacheCommands::Get { key: "products".to_string() });
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }

    #[test]
    fn test_set_uses_configured_ttl_unless_sticky() {
        let (ctx, _dir) = create_test_context();

        let output = cache(
            &ctx,
            CacheCommands::Set {
                key: "a".to_string(),
                value: "1".to_string(),
                ttl: None,
                sticky: false,
            },
        )
        .unwrap();
        assert_eq!(output, "Cached 'a' for 60 minutes");

        let output = cache(
            &ctx,
            CacheCommands::Set {
                key: "b".to_string(),
                value: "2".to_string(),
                ttl: None,
                sticky: true,
            },
        )
        .unwrap();
        assert_eq!(output, "Cached 'b' until removed");
    }

    #[test]
    fn test_set_rejects_invalid_json() {
        let (ctx, _dir) = create_test_context();
        let result = cache(
            &ctx,
            CacheCommands::Set {
                key: "a".to_string(),
                value: "{oops".to_string(),
                ttl: None,
                sticky: false,
            },
        );
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn test_set_fails_when_store_is_degraded() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let paths = Paths::with_root(temp_dir.path().to_path_buf());
        let mut config = Config::default();
        config.storage.backend = StorageBackend::File;
        config.storage.path = Some(blocker.join("store"));
        let ctx = Context::new(config, paths, OutputFormat::Pretty);

        let result = cache(
            &ctx,
            CacheCommands::Set {
                key: "a".to_string(),
                value: "1".to_string(),
                ttl: None,
                sticky: false,
            },
        );
        assert!(matches!(result, Err(SyncError::Storage(_))));
    }

    #[test]
    fn test_keys_size_sweep() {
        let (ctx, _dir) = create_test_context();
        for key in ["x", "y"] {
            cache(
                &ctx,
                CacheCommands::Set {
                    key: key.to_string(),
                    value: "\"v\"".to_string(),
                    ttl: Some(5),
                    sticky: false,
                },
            )
            .unwrap();
        }

        let keys = cache(&ctx, CacheCommands::Keys).unwrap();
        assert!(keys.contains("Cached keys (2)"));

        let size = cache(&ctx, CacheCommands::Size).unwrap();
        assert!(size.starts_with("Cache size: "));

        let swept = cache(&ctx, CacheCommands::Sweep).unwrap();
        assert_eq!(swept, "Removed 0 expired entries");
    }
}
