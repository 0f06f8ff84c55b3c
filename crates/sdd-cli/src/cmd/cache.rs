use crate::output::print_json;
use clap::Subcommand;
use sdd_core::{cache::SpecCache, paths, spec};
use std::path::Path;

#[derive(Subcommand)]
pub enum CacheSubcommand {
    /// Refresh the cache from the spec files and print hit/miss counts
    Stats,
    /// Delete the persisted cache
    Clear,
}

pub fn run(root: &Path, subcmd: CacheSubcommand, json: bool) -> anyhow::Result<()> {
    paths::ensure_initialized(root)?;
    match subcmd {
        CacheSubcommand::Stats => stats(root, json),
        CacheSubcommand::Clear => clear(root, json),
    }
}

fn stats(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut cache = SpecCache::load(root);
    for path in spec::spec_files(root) {
        if let Err(e) = cache.get(root, &path) {
            tracing::warn!(path = %path.display(), "skipping unparsable spec: {e}");
        }
    }
    cache.save(root)?;
    let stats = cache.stats();

    if json {
        return print_json(&serde_json::json!({
            "entries": cache.len(),
            "capacity": cache.capacity(),
            "stats": stats,
            "hit_rate": stats.hit_rate(),
        }));
    }
    println!("entries:   {}/{}", cache.len(), cache.capacity());
    println!("hits:      {}", stats.hits);
    println!("misses:    {}", stats.misses);
    println!("evictions: {}", stats.evictions);
    println!("hit rate:  {:.0}%", stats.hit_rate() * 100.0);
    Ok(())
}

fn clear(root: &Path, json: bool) -> anyhow::Result<()> {
    let path = paths::cache_path(root);
    let existed = path.exists();
    if existed {
        std::fs::remove_file(&path)?;
    }
    if json {
        print_json(&serde_json::json!({ "cleared": existed }))?;
    } else if existed {
        println!("Cache cleared.");
    } else {
        println!("No cache to clear.");
    }
    Ok(())
}
