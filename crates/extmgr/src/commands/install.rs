//! `extmgr install` - install the newest compatible version of images.

use anyhow::{anyhow, Result};
use extmgr_proto::{methods, InstallParams, InstallReply};
use owo_colors::OwoColorize;
use std::process::ExitCode;

use crate::cli::{Cli, InstallArgs};
use crate::client;

pub async fn run(cli: &Cli, args: &InstallArgs) -> Result<ExitCode> {
    let mut failed = false;

    if !cli.quiet {
        println!("Installed:");
    }
    for name in &args.names {
        let params = InstallParams {
            install: name.clone(),
            url: args.url.clone(),
            verbose: cli.verbose.then_some(true),
        };

        let reply: Result<InstallReply> =
            client::call(&cli.socket, methods::INSTALL, params).await;
        match reply {
            Ok(reply) if reply.success => {
                if !cli.quiet {
                    println!("{}", reply.installed.as_deref().unwrap_or(name));
                }
            }
            Ok(reply) => {
                failed = true;
                eprintln!(
                    "{} {}",
                    "✗".red().bold(),
                    reply
                        .error_msg
                        .unwrap_or_else(|| format!("Installing '{name}' failed"))
                );
            }
            Err(err) => {
                // The daemon being gone will not get better for the next
                // image either.
                return Err(err);
            }
        }
    }

    if failed {
        return Err(anyhow!("Not all requested images could be installed"));
    }
    Ok(ExitCode::SUCCESS)
}
