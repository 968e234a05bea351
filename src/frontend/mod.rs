//! The front-end adapter: invokes the external IR-dumping subprocess (or
//! reads an already-produced dump) and parses its textual records into the
//! per-function [`ParsedStatement`](crate::build::ParsedStatement) lists the
//! [function builder](crate::build) consumes.
//!
//! The front-end itself — a C/C++ parser lowering source to three-address
//! IR — is out of scope (§1); what lives here is the thin adapter §1 asks
//! for: a parser for the front-end's *dump format*, and the subprocess
//! invocation that produces one. §6 pins the dump to a file ending in
//! `.coflo.gimple`; the exact grammar inside that file isn't specified, so
//! (per `DESIGN.md`'s Open Question resolution) this module defines a
//! minimal line-oriented one: one statement per line, `kind args... @loc`.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::build::ParsedStatement;
use crate::ir::{CaseArm, Location, Statement};
use crate::subprocess::{self, SubprocessError};

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("front-end subprocess failed")]
    Subprocess(#[from] SubprocessError),
    #[error("no `.coflo.gimple` dump found in {0}")]
    NoDumpProduced(PathBuf),
    #[error("failed to read dump file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("{path}:{line}: unparseable record: {message}")]
    Malformed { path: String, line: usize, message: String },
}

/// One function as the dump described it: its name, defining file, and
/// ordered statement list, ready for [`crate::build::build_function`].
pub struct ParsedFunction {
    pub name: String,
    pub file: String,
    pub statements: Vec<ParsedStatement>,
}

/// Compose and run the front-end subprocess, then parse whatever
/// `.coflo.gimple` dumps it leaves in `work_dir`. `-D`/`-I` flags are
/// appended in the order given, matching the preserved-order requirement in
/// §6; the IR-dump-requesting flag is fixed at `--dump-coflo-gimple`.
#[instrument(skip(sources, defines, includes))]
pub fn invoke_and_parse(
    frontend_program: &str,
    sources: &[String],
    defines: &[String],
    includes: &[String],
    work_dir: &Path,
) -> Result<Vec<ParsedFunction>, FrontendError> {
    let mut args = vec!["--dump-coflo-gimple".to_string()];
    for d in defines {
        args.push(format!("-D{d}"));
    }
    for i in includes {
        args.push(format!("-I{i}"));
    }
    args.extend(sources.iter().cloned());

    subprocess::run(frontend_program, &args)?;

    let mut dumps: Vec<PathBuf> = fs::read_dir(work_dir)
        .map_err(|source| FrontendError::Read { path: work_dir.to_path_buf(), source })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().ends_with(".coflo.gimple"))
        .collect();
    dumps.sort();

    if dumps.is_empty() {
        return Err(FrontendError::NoDumpProduced(work_dir.to_path_buf()));
    }

    let mut functions = Vec::new();
    for dump in dumps {
        functions.extend(parse_dump_file(&dump)?);
    }
    Ok(functions)
}

/// Parse one `.coflo.gimple`-style dump file on disk.
pub fn parse_dump_file(path: &Path) -> Result<Vec<ParsedFunction>, FrontendError> {
    let text = fs::read_to_string(path).map_err(|source| FrontendError::Read { path: path.to_path_buf(), source })?;
    let display_path = path.display().to_string();
    let functions = parse_dump(&text, &display_path)?;
    debug!(path = %display_path, functions = functions.len(), "parsed front-end dump");
    Ok(functions)
}

/// Parse an in-memory dump. Exposed separately from [`parse_dump_file`] so
/// tests (and callers embedding a dump, e.g. from a response file) don't
/// need a real file on disk.
pub fn parse_dump(text: &str, source_name: &str) -> Result<Vec<ParsedFunction>, FrontendError> {
    let mut functions = Vec::new();
    let mut current: Option<(String, String, Vec<ParsedStatement>)> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("function ") {
            let mut parts = rest.splitn(2, ' ');
            let name = parts.next().unwrap_or_default().to_string();
            let file = parts.next().unwrap_or_default().trim().to_string();
            if name.is_empty() || file.is_empty() {
                return Err(FrontendError::Malformed {
                    path: source_name.to_string(),
                    line: line_no,
                    message: "expected `function <name> <file>`".to_string(),
                });
            }
            current = Some((name, file, Vec::new()));
            continue;
        }

        if line == "endfunction" {
            if let Some((name, file, statements)) = current.take() {
                functions.push(ParsedFunction { name, file, statements });
            } else {
                return Err(FrontendError::Malformed {
                    path: source_name.to_string(),
                    line: line_no,
                    message: "`endfunction` without a matching `function`".to_string(),
                });
            }
            continue;
        }

        let Some((_, _, statements)) = current.as_mut() else {
            return Err(FrontendError::Malformed {
                path: source_name.to_string(),
                line: line_no,
                message: "statement record outside of a `function ... endfunction` block".to_string(),
            });
        };
        let parsed = parse_statement_line(line, source_name, line_no)?;
        statements.push(parsed);
    }

    if current.is_some() {
        return Err(FrontendError::Malformed {
            path: source_name.to_string(),
            line: text.lines().count(),
            message: "unterminated `function` block (missing `endfunction`)".to_string(),
        });
    }

    Ok(functions)
}

/// One record: `kind args... @file:line[:col]`.
fn parse_statement_line(line: &str, source_name: &str, line_no: usize) -> Result<ParsedStatement, FrontendError> {
    let (body, loc_part) = line.rsplit_once('@').ok_or_else(|| FrontendError::Malformed {
        path: source_name.to_string(),
        line: line_no,
        message: "missing `@file:line` location suffix".to_string(),
    })?;
    let location = parse_location(loc_part.trim(), source_name, line_no)?;

    let mut tokens = body.split_whitespace();
    let kind = tokens.next().ok_or_else(|| FrontendError::Malformed {
        path: source_name.to_string(),
        line: line_no,
        message: "empty statement record".to_string(),
    })?;
    let rest: Vec<&str> = tokens.collect();

    let statement = match kind {
        "noop" => Statement::NoOp,
        "label" => {
            let name = expect_one(&rest, source_name, line_no, "label")?;
            Statement::Label(name.to_string())
        }
        "goto" => {
            let target = expect_one(&rest, source_name, line_no, "goto")?;
            Statement::GotoUnlinked { target_label: target.to_string() }
        }
        "return" => Statement::ReturnUnlinked,
        "if" => {
            if rest.len() != 3 {
                return Err(FrontendError::Malformed {
                    path: source_name.to_string(),
                    line: line_no,
                    message: "expected `if <condition> <true-label> <false-label>`".to_string(),
                });
            }
            Statement::IfUnlinked {
                condition: rest[0].to_string(),
                true_target: rest[1].to_string(),
                false_target: rest[2].to_string(),
            }
        }
        "switch" => {
            let mut arms = Vec::new();
            for tok in rest {
                let Some((value, target)) = tok.split_once(':') else {
                    return Err(FrontendError::Malformed {
                        path: source_name.to_string(),
                        line: line_no,
                        message: format!("switch arm `{tok}` is not `value:label` or `default:label`"),
                    });
                };
                let value = if value == "default" { None } else { Some(value.to_string()) };
                arms.push(CaseArm { value, target_label: target.to_string() });
            }
            if arms.is_empty() {
                return Err(FrontendError::Malformed {
                    path: source_name.to_string(),
                    line: line_no,
                    message: "switch with no arms".to_string(),
                });
            }
            Statement::SwitchUnlinked { arms }
        }
        "call" => {
            let Some((&callee, args)) = rest.split_first() else {
                return Err(FrontendError::Malformed {
                    path: source_name.to_string(),
                    line: line_no,
                    message: "expected `call <callee> [args...]`".to_string(),
                });
            };
            Statement::FunctionCallUnresolved {
                callee_name: callee.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                location: location.clone(),
            }
        }
        other => {
            return Err(FrontendError::Malformed {
                path: source_name.to_string(),
                line: line_no,
                message: format!("unknown statement kind `{other}`"),
            })
        }
    };

    Ok(ParsedStatement::new(statement, location))
}

fn expect_one<'a>(rest: &'a [&str], path: &str, line: usize, kind: &str) -> Result<&'a str, FrontendError> {
    match rest {
        [one] => Ok(one),
        _ => Err(FrontendError::Malformed {
            path: path.to_string(),
            line,
            message: format!("expected `{kind} <name>`"),
        }),
    }
}

fn parse_location(text: &str, path: &str, line: usize) -> Result<Location, FrontendError> {
    let mut parts = text.splitn(3, ':');
    let file = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| FrontendError::Malformed {
        path: path.to_string(),
        line,
        message: "empty location file".to_string(),
    })?;
    let line_no: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| FrontendError::Malformed { path: path.to_string(), line, message: "missing location line".to_string() })?;
    let column = parts.next().and_then(|s| s.parse().ok());
    let mut loc = Location::new(file, line_no);
    if let Some(col) = column {
        loc = loc.with_column(col);
    }
    Ok(loc)
}
