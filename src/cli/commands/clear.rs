//! Clear command - remove every cache entry outside a protocol session

use crate::backend::{create_backend, BackendKind};
use crate::cli::args::ClearArgs;
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use console::style;
use std::io::{self, Write};

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config) -> CacheResult<()> {
    let target = describe_target(config);
    println!("This will remove every cache entry in {}", target);

    if !args.yes && !confirm()? {
        println!("Aborted.");
        return Ok(());
    }

    let backend = create_backend(config, None).await?;
    backend.clear().await?;
    backend.close().await?;

    println!("{} cleared {}", style("✓").green(), target);
    Ok(())
}

/// Human-readable description of what a clear removes
fn describe_target(config: &Config) -> String {
    let local = config.cache_dir().display().to_string();
    match config.cache.backend {
        BackendKind::Disk => local,
        BackendKind::S3 => format!(
            "{} and s3://{}/{}",
            local,
            config.s3.bucket.as_deref().unwrap_or_default(),
            config.s3.prefix.trim_matches('/')
        ),
    }
}

fn confirm() -> CacheResult<bool> {
    print!("Are you sure? [y/N] ");
    io::stdout()
        .flush()
        .map_err(|e| CacheError::io("flushing prompt", e))?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| CacheError::io("reading confirmation", e))?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn disk_target_is_cache_dir() {
        let mut config = Config::default();
        config.cache.dir = Some(PathBuf::from("/var/cache/builds"));
        assert_eq!(describe_target(&config), "/var/cache/builds");
    }

    #[test]
    fn s3_target_names_bucket_and_prefix() {
        let mut config = Config::default();
        config.cache.dir = Some(PathBuf::from("/c"));
        config.cache.backend = BackendKind::S3;
        config.s3.bucket = Some("builds".to_string());
        config.s3.prefix = "team/".to_string();
        assert_eq!(describe_target(&config), "/c and s3://builds/team");
    }

    #[tokio::test]
    async fn clear_with_yes_empties_disk_cache() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp.path().to_path_buf());

        let backend = create_backend(&config, None).await.unwrap();
        let path = backend.put(&[0x41; 32], b"o", b"x".to_vec(), 1).await.unwrap();

        execute(ClearArgs { yes: true }, &config).await.unwrap();
        assert!(!path.exists());
        assert!(backend.get(&[0x41; 32]).await.unwrap().is_none());
    }
}
