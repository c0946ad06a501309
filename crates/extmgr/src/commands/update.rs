//! `extmgr update` - apply every available upgrade.

use anyhow::{bail, Result};
use extmgr_proto::{methods, CheckParams, UpdateReply};
use std::process::ExitCode;

use crate::cli::{Cli, UpdateArgs};
use crate::client;
use crate::commands::exit_no_data;

pub async fn run(cli: &Cli, args: &UpdateArgs) -> Result<ExitCode> {
    let params = CheckParams {
        url: args.url.clone(),
        verbose: cli.verbose.then_some(true),
        prefix: args.prefix.clone(),
    };

    let reply: UpdateReply = client::call(&cli.socket, methods::UPDATE, params).await?;
    if !reply.success {
        bail!(
            "Failed to call Update method: {}",
            reply.error_msg.unwrap_or_else(|| "unknown error".into())
        );
    }

    let updated = reply.updated.unwrap_or_default();
    if updated.is_empty() {
        if !cli.quiet {
            println!("No updates found");
        }
        return Ok(if cli.quiet { exit_no_data() } else { ExitCode::SUCCESS });
    }

    let mut any_applied = false;
    if !cli.quiet {
        println!("Old image -> New Image");
    }
    for update in &updated {
        if update.new_name.is_some() {
            any_applied = true;
        }
        if !cli.quiet {
            println!(
                "{} -> {}",
                update.old_name,
                update
                    .new_name
                    .as_deref()
                    .unwrap_or("No compatible newer version found")
            );
        }
    }

    if cli.quiet && !any_applied {
        return Ok(exit_no_data());
    }

    Ok(ExitCode::SUCCESS)
}
