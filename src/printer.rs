//! Print the reason tree for a trace.
use std::collections::HashSet;
use std::io::{self, Write};

use indexmap::IndexMap;

use crate::trace::{ReasonKind, TraceResult};

const TREE_BAR: &str = "│";
const TREE_BRANCH: &str = "├──";
const TREE_CORNER: &str = "└──";

#[derive(Debug, Default)]
pub struct PrintOptions {
    /// Print how each file was reached.
    pub include_kind: bool,
}

#[derive(Debug)]
struct PrintBranchState {
    last: bool,
}

#[derive(Debug, Default)]
struct PrintState<'a> {
    open: Vec<PrintBranchState>,
    parents: Vec<&'a str>,
    printed: HashSet<&'a str>,
}

/// Prints traced files as a tree below the entry files.
pub struct Printer<'a> {
    result: &'a TraceResult,
    children: IndexMap<&'a str, Vec<&'a str>>,
}

impl<'a> Printer<'a> {
    pub fn new(result: &'a TraceResult) -> Self {
        let mut children: IndexMap<&'a str, Vec<&'a str>> = IndexMap::new();
        for (path, reason) in result.reasons.iter() {
            for parent in reason.parents.iter() {
                children
                    .entry(parent.as_str())
                    .or_insert_with(Vec::new)
                    .push(path.as_str());
            }
        }
        Self { result, children }
    }

    /// Write the tree for every entry file.
    pub fn print<W: Write>(
        &self,
        out: &mut W,
        options: &PrintOptions,
    ) -> io::Result<()> {
        let mut state: PrintState<'a> = Default::default();
        for (path, reason) in self.result.reasons.iter() {
            if reason.kind != ReasonKind::Entry {
                continue;
            }
            writeln!(out, "{}", path)?;
            state.printed.insert(path.as_str());
            state.parents.push(path.as_str());
            self.print_children(out, options, path.as_str(), &mut state)?;
            state.parents.pop();
        }
        Ok(())
    }

    fn print_children<W: Write>(
        &self,
        out: &mut W,
        options: &PrintOptions,
        path: &'a str,
        state: &mut PrintState<'a>,
    ) -> io::Result<()> {
        let children = match self.children.get(path) {
            Some(children) => children,
            None => return Ok(()),
        };

        state.open.push(PrintBranchState { last: false });
        for (i, &child) in children.iter().enumerate() {
            let last = i == children.len() - 1;
            if let Some(branch) = state.open.last_mut() {
                branch.last = last;
            }

            let mark = if last { TREE_CORNER } else { TREE_BRANCH };
            for (j, branch) in state.open.iter().enumerate() {
                if j < state.open.len() - 1 {
                    if branch.last {
                        write!(out, "    ")?;
                    } else {
                        write!(out, "{}   ", TREE_BAR)?;
                    }
                } else {
                    write!(out, "{} ", mark)?;
                }
            }
            write!(out, "{}", child)?;

            if options.include_kind {
                if let Some(reason) = self.result.reasons.get(child) {
                    write!(out, " ({:?})", reason.kind)?;
                }
            }

            let cycle = state.parents.contains(&child);
            let repeated = !state.printed.insert(child);
            if cycle {
                writeln!(out, " (∞)")?;
                continue;
            }
            if repeated {
                writeln!(out, " (*)")?;
                continue;
            }
            writeln!(out)?;

            state.parents.push(child);
            self.print_children(out, options, child, state)?;
            state.parents.pop();
        }
        state.open.pop();
        Ok(())
    }
}
