//! Command-line tool for inspecting Device Tree Blob (DTB) files.
//!
//! Reads a DTB file, parses it with the `dtb_tree` library and prints a
//! DTS-style text rendering of the tree, either to stdout or to a file.

use clap::Parser;
use dtb_tree::DeviceTree;
use std::io::Write;

/// Command-line arguments for the DTB dump tool.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the input DTB file
    #[arg(short, long)]
    input: String,

    /// Path to the output text file; stdout when omitted
    #[arg(short, long)]
    output: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let data = match std::fs::read(&args.input) {
        Ok(data) => data,
        Err(err) => {
            log::error!("cannot read {}: {}", args.input, err);
            std::process::exit(1);
        }
    };

    let tree = match DeviceTree::from_bytes(&data) {
        Ok(tree) => tree,
        Err(err) => {
            log::error!("cannot parse {}: {}", args.input, err);
            std::process::exit(1);
        }
    };

    let rendered = tree.to_string();
    match &args.output {
        Some(path) => {
            if let Err(err) = std::fs::write(path, rendered) {
                log::error!("cannot write {}: {}", path, err);
                std::process::exit(1);
            }
        }
        None => {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(rendered.as_bytes());
        }
    }
}
