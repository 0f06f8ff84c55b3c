use crate::output::print_json;
use clap::Subcommand;
use sdd_core::context::{self, Context};
use std::path::Path;

#[derive(Subcommand)]
pub enum ContextSubcommand {
    /// Scope commands to a domain (a directory under specs/)
    Set {
        domain: String,
        /// Create the domain directory if it does not exist
        #[arg(long)]
        create: bool,
    },
    /// Show the active domain
    Show,
    /// Clear the active domain
    Clear,
}

pub fn run(root: &Path, subcmd: ContextSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ContextSubcommand::Set { domain, create } => {
            let ctx = context::set_domain(root, &domain, create)?;
            if json {
                return print_json(&ctx);
            }
            println!(
                "Active domain: {}",
                ctx.active_domain.as_deref().unwrap_or_default()
            );
        }
        ContextSubcommand::Show => {
            let ctx = Context::load(root)?;
            if json {
                return print_json(&ctx);
            }
            match &ctx.active_domain {
                Some(d) => println!("Active domain: {d}"),
                None => println!("No active domain; commands see all specs."),
            }
        }
        ContextSubcommand::Clear => {
            context::clear(root)?;
            if json {
                return print_json(&serde_json::json!({ "active_domain": null }));
            }
            println!("Context cleared.");
        }
    }
    Ok(())
}
