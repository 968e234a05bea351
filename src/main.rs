// coflo: whole-program control-flow-graph and reachability analyzer.
//
// Reconstructs per-function CFGs from a front-end's statement dump, links
// inter-procedural call sites, and evaluates `name1() -x name2()`
// reachability constraints against the resulting program graph.

#![allow(dead_code)]

use clap::Parser;

mod analyze;
mod build;
mod cli;
mod diagnostics;
mod frontend;
mod graph;
mod ir;
mod link;
mod output;
mod render;
mod subprocess;
mod traverse;

use cli::Cli;

fn main() -> anyhow::Result<()> {
    let raw_args: Vec<String> = std::env::args().collect();
    let expanded = cli::expand_response_files(raw_args)?;
    let cli = Cli::parse_from(expanded);

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let exit_code = cli::run(&cli)?;
    std::process::exit(exit_code);
}
