//! `imgfetch config` – show where configuration lives and what is in effect.

use anyhow::Result;
use imgfetch_core::config::{self, ExecutionOrder, FetcherConfig};
use imgfetch_core::logging;

pub fn run_config(cfg: &FetcherConfig) -> Result<()> {
    println!("config file: {}", config::config_path()?.display());
    match logging::log_path() {
        Ok(path) => println!("log file:    {}", path.display()),
        Err(_) => println!("log file:    - (stderr)"),
    }
    println!();
    println!("max_concurrent_downloads = {}", cfg.max_concurrent_downloads.max(1));
    println!("download_timeout         = {:?}", cfg.download_timeout());
    println!(
        "execution_order          = {}",
        match cfg.execution_order {
            ExecutionOrder::Fifo => "fifo",
            ExecutionOrder::Lifo => "lifo",
        }
    );
    println!(
        "username                 = {}",
        cfg.username.as_deref().unwrap_or("-")
    );
    println!(
        "password                 = {}",
        if cfg.password.is_some() { "<set>" } else { "-" }
    );
    if cfg.headers.is_empty() {
        println!("headers                  = (none)");
    } else {
        println!("headers:");
        for (name, value) in &cfg.headers {
            println!("  {name}: {value}");
        }
    }
    Ok(())
}
