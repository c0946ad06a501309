//! `extmgr check` - report available upgrades without applying them.

use anyhow::{bail, Result};
use extmgr_proto::{methods, CheckParams, CheckReply};
use std::process::ExitCode;

use crate::cli::{CheckArgs, Cli};
use crate::client;
use crate::commands::{exit_no_data, exit_no_medium};

pub async fn run(cli: &Cli, args: &CheckArgs) -> Result<ExitCode> {
    let params = CheckParams {
        url: args.url.clone(),
        verbose: cli.verbose.then_some(true),
        prefix: args.prefix.clone(),
    };

    let reply: CheckReply = client::call(&cli.socket, methods::CHECK, params).await?;
    if !reply.success {
        bail!(
            "Failed to call Check method: {}",
            reply.error_msg.unwrap_or_else(|| "unknown error".into())
        );
    }

    let updates = reply.images.unwrap_or_default();
    let broken = reply.broken_images.unwrap_or_default();

    if updates.is_empty() && broken.is_empty() {
        if !cli.quiet {
            println!("No updates found");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut update_available = false;
    if !cli.quiet && updates.iter().any(|u| u.new_name.is_some()) {
        println!("Old image -> New Image");
    }
    for update in &updates {
        match &update.new_name {
            Some(new_name) => {
                update_available = true;
                if !cli.quiet {
                    println!("{} -> {}", update.old_name, new_name);
                }
            }
            None => {
                if !cli.quiet && cli.verbose {
                    println!("{} -> No compatible newer version found", update.old_name);
                }
            }
        }
    }

    if !broken.is_empty() && !cli.quiet {
        println!("Incompatible installed images without update:");
        for image in &broken {
            println!("{}", image.image_name);
        }
    }

    if cli.quiet {
        if !broken.is_empty() {
            return Ok(exit_no_medium());
        }
        if !update_available {
            return Ok(exit_no_data());
        }
    }

    Ok(ExitCode::SUCCESS)
}
