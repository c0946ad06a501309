//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// extmgr - manage sysext images
#[derive(Parser, Debug)]
#[command(name = "extmgr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Don't print results, use exit codes instead
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Socket of the management daemon
    #[arg(long, global = true, default_value = extmgr_proto::SOCKET_PATH)]
    pub socket: Utf8PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all images and whether they are compatible
    List(ListArgs),

    /// Check whether updates are available and all installed images are compatible
    Check(CheckArgs),

    /// Replace installed images with newer compatible versions
    Update(UpdateArgs),

    /// Install the newest compatible version of an image
    Install(InstallArgs),

    /// Remove images no longer referenced anywhere
    Cleanup(CleanupArgs),

    /// Create a catalog json file from a release file
    CreateJson(CreateJsonArgs),

    /// Merge several catalog json files into one json array
    MergeJson(MergeJsonArgs),

    /// Print the content of catalog json files
    DumpJson(DumpJsonArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Remote directory with sysext images
    #[arg(short, long)]
    pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Remote directory with sysext images
    #[arg(short, long)]
    pub url: Option<String>,

    /// Prefix to a different root directory
    #[arg(short, long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Remote directory with sysext images
    #[arg(short, long)]
    pub url: Option<String>,

    /// Prefix to a different root directory
    #[arg(short, long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Remote directory with sysext images
    #[arg(short, long)]
    pub url: Option<String>,

    /// Names of the images to install
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {}

#[derive(Args, Debug)]
pub struct CreateJsonArgs {
    /// Input file in KEY=VALUE format
    #[arg(short, long)]
    pub input: Utf8PathBuf,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Name of the image the release file belongs to
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct MergeJsonArgs {
    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Input files in json format
    #[arg(required = true)]
    pub inputs: Vec<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct DumpJsonArgs {
    /// Input files in json format
    #[arg(required = true)]
    pub inputs: Vec<Utf8PathBuf>,
}
