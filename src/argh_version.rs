//! `argh` entry point that also answers `--version`.

use std::{env, path::Path};

use argh::TopLevelCommand;

fn cmd_name(path: &str) -> &str {
    Path::new(path).file_name().and_then(|name| name.to_str()).unwrap_or(path)
}

/// Parses the process arguments into `T`, exiting on `--help`, `--version` or a usage error.
pub fn from_env<T: TopLevelCommand>() -> T {
    let strings: Vec<String> = env::args_os()
        .map(|s| s.into_string())
        .collect::<Result<_, _>>()
        .unwrap_or_else(|arg| {
            eprintln!("Invalid utf8: {}", arg.to_string_lossy());
            std::process::exit(1)
        });
    let Some((program, rest)) = strings.split_first() else {
        eprintln!("No program name, arguments passed");
        std::process::exit(1)
    };
    let cmd = cmd_name(program);
    if rest.len() == 1 && rest[0] == "--version" {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }
    let args: Vec<&str> = rest.iter().map(String::as_str).collect();
    T::from_args(&[cmd], &args).unwrap_or_else(|early_exit| {
        std::process::exit(match early_exit.status {
            Ok(()) => {
                println!("{}", early_exit.output);
                0
            }
            Err(()) => {
                eprintln!("{}\nRun {cmd} --help for more information.", early_exit.output);
                1
            }
        })
    })
}
