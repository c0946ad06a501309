//! `extmgr cleanup` - drop images nothing references anymore.

use anyhow::{bail, Result};
use extmgr_proto::{methods, CleanupParams, CleanupReply};
use std::process::ExitCode;

use crate::cli::{CleanupArgs, Cli};
use crate::client;
use crate::commands::exit_no_data;

pub async fn run(cli: &Cli, _args: &CleanupArgs) -> Result<ExitCode> {
    let params = CleanupParams {
        verbose: cli.verbose.then_some(true),
    };

    let reply: CleanupReply = client::call(&cli.socket, methods::CLEANUP, params).await?;
    if !reply.success {
        bail!(
            "Failed to call Cleanup method: {}",
            reply.error_msg.unwrap_or_else(|| "unknown error".into())
        );
    }

    let Some(removed) = reply.images else {
        if !cli.quiet {
            println!("No sysext images removed.");
        }
        return Ok(if cli.quiet { exit_no_data() } else { ExitCode::SUCCESS });
    };

    if !cli.quiet {
        println!("Removed sysext images:");
        for image in &removed {
            println!("{}", image.image_name);
        }
    }

    Ok(ExitCode::SUCCESS)
}
