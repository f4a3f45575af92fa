//! Flag parsing and logging setup shared by the binaries.
//!
//! Flags take either `--name value` or `--name=value`.

use std::path::PathBuf;

use env_logger::Env;

pub fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}

pub fn arg_value(name: &str) -> Option<String> {
    find_value(&std::env::args().skip(1).collect::<Vec<_>>(), name)
}

pub fn path_arg(name: &str) -> Option<PathBuf> {
    arg_value(name).map(PathBuf::from)
}

pub fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}

fn find_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
