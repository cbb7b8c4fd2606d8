// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("prism")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Prism Contributors")
        .about("Private package index over a directory of archives")
        .subcommand_required(false)
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .global(true)
                .help("Repository root"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("link_farm")
                .long("link-farm")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Keep leaves as symlink farms instead of rendering HTML"),
        )
        .arg(
            Arg::new("workers")
                .short('j')
                .long("workers")
                .value_name("N")
                .global(true)
                .help("Worker threads for hashing and metadata extraction"),
        )
        .subcommand(
            Command::new("reconcile")
                .about("Catalogue new archives and rebuild the listings they affect"),
        )
        .subcommand(
            Command::new("register")
                .about("Register archives and add them to their leaves")
                .arg(
                    Arg::new("paths")
                        .required(true)
                        .num_args(1..)
                        .help("Archive files inside the repository root"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Forget archives that were deleted from the repository root")
                .arg(
                    Arg::new("paths")
                        .required(true)
                        .num_args(1..)
                        .help("Paths of the deleted archives"),
                ),
        )
        .subcommand(Command::new("list").about("List indexed packages"))
        .subcommand(
            Command::new("leaf")
                .about("Show the versions listed for a package")
                .arg(Arg::new("name").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("cleanup").about("Drop records and links of archives that no longer exist"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("prism.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
