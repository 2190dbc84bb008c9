//! Gantry core library.
//!
//! Gantry models a software build as a graph of files, phony targets and
//! build steps, and writes that graph out as a Makefile, a `build.ninja`
//! file or a Visual Studio solution with MSBuild projects. A front-end
//! describes the build in a [`description::BuildDescription`]; the
//! [`runner`] turns it into a [`graph::BuildGraph`] and hands the graph to
//! the chosen [`backend`].

pub mod backend;
pub mod cli;
pub mod description;
pub mod environment;
pub mod graph;
pub mod path;
pub mod runner;
pub mod safe_str;
pub mod shell;
pub mod tools;
pub mod version;
