//! Terminal color/status helpers for driver-level progress messages —
//! distinct from the per-statement/per-constraint [`crate::diagnostics`]
//! records, which carry a source [`crate::ir::Location`] and compiler-style
//! formatting. These are the coarser "building main.c", "linked 4
//! functions" lines a human watching the run benefits from.

use std::io::IsTerminal;

pub const RED: &str = "\x1b[0;31m";
pub const GREEN: &str = "\x1b[0;32m";
pub const YELLOW: &str = "\x1b[1;33m";
pub const CYAN: &str = "\x1b[0;36m";
pub const BOLD: &str = "\x1b[1m";
pub const NC: &str = "\x1b[0m";

#[inline]
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

pub fn info(msg: &str) {
    let (color, reset) = if is_terminal() { (GREEN, NC) } else { ("", "") };
    println!("{color}[INFO]{reset} {msg}");
}

pub fn warn(msg: &str) {
    let (color, reset) = if is_terminal() { (YELLOW, NC) } else { ("", "") };
    eprintln!("{color}[WARN]{reset} {msg}");
}

pub fn error(msg: &str) {
    let (color, reset) = if is_terminal() { (RED, NC) } else { ("", "") };
    eprintln!("{color}[ERROR]{reset} {msg}");
}

pub fn header(msg: &str) {
    let (bold, reset) = if is_terminal() { (BOLD, NC) } else { ("", "") };
    println!("{bold}==>{reset} {msg}");
}

pub fn cmd(cmd: &str) {
    let (color, reset) = if is_terminal() { (CYAN, NC) } else { ("", "") };
    eprintln!("{color}[CMD]{reset} {cmd}");
}

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

pub fn exit_usage(msg: &str) -> ! {
    error(msg);
    std::process::exit(EXIT_USAGE);
}
