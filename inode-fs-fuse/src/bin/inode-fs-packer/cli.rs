use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Host directory whose regular files are packed
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output directory
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,

    /// Image size in MiB
    #[arg(long, default_value_t = 16)]
    pub size_mib: u64,

    /// Directory inside the image that receives the files, created when missing
    #[arg(long, short, default_value = "/")]
    pub mount: String,
}
