//! `extmgr list` - the merged image inventory.

use anyhow::{bail, Result};
use extmgr_proto::{methods, ListImagesReply, ListParams};
use std::process::ExitCode;

use crate::cli::{Cli, ListArgs};
use crate::client;

pub async fn run(cli: &Cli, args: &ListArgs) -> Result<ExitCode> {
    let params = ListParams {
        url: args.url.clone(),
        verbose: cli.verbose.then_some(true),
    };

    let reply: ListImagesReply = client::call(&cli.socket, methods::LIST_IMAGES, params).await?;
    if !reply.success {
        bail!(
            "Failed to call ListImages method: {}",
            reply.error_msg.unwrap_or_else(|| "unknown error".into())
        );
    }

    let Some(images) = reply.images else {
        println!("No images found");
        return Ok(ExitCode::SUCCESS);
    };

    println!(" R L I C  # Name");
    for image in &images {
        let flag = |set: bool| if set { " x" } else { "  " };
        print!(
            "{}{}{}{}",
            flag(image.remote),
            flag(image.local),
            flag(image.installed),
            flag(image.compatible)
        );
        if image.refcount > 0 {
            print!(" {:2}", image.refcount);
        } else {
            print!("  -");
        }
        println!(" {}", image.image_name);
    }
    println!("R = remote, L = local, I = installed, C = compatible, # = used in snapshots");

    Ok(ExitCode::SUCCESS)
}
