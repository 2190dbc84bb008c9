//! Unit tests for graph registration and aggregate state.

use super::*;
use rstest::{fixture, rstest};

fn path(raw: &str, root: Root) -> Path {
    Path::new(raw, root).expect("valid path")
}

fn compile(graph: &mut BuildGraph, src: &str, obj: &str) -> NodeId {
    let source = graph.source_file(path(src, Root::SrcDir), Some("c"));
    let output = graph.file(path(obj, Root::BuildDir), FileType::Object);
    let step = Compile::new(source, "c");
    graph
        .add_edge(Edge::new(EdgeKind::Compile(step), vec![output]))
        .expect("compile edge");
    output
}

fn link(mode: LinkMode, files: Vec<NodeId>) -> EdgeKind {
    EdgeKind::Link(Link {
        mode,
        files,
        libs: Vec::new(),
        whole_archive: Vec::new(),
        options: Vec::new(),
        lib_options: Vec::new(),
        project_name: None,
    })
}

fn precompile(graph: &mut BuildGraph, header: &str, outputs: &[&str]) -> NodeId {
    let source = graph.file(path(header, Root::SrcDir), FileType::Header);
    let mut ids = Vec::new();
    for (i, out) in outputs.iter().enumerate() {
        let file_type = if i == 0 {
            FileType::PrecompiledHeader
        } else {
            FileType::Object
        };
        ids.push(graph.file(path(out, Root::BuildDir), file_type));
    }
    let step = Compile {
        mode: CompileMode::PrecompiledHeader { pch_source: None },
        ..Compile::new(source, "c++")
    };
    graph
        .add_edge(Edge::new(EdgeKind::Compile(step), ids.clone()))
        .expect("precompile edge");
    ids.first().copied().expect("pch output")
}

#[fixture]
fn graph() -> BuildGraph {
    BuildGraph::new("demo")
}

#[rstest]
fn files_are_interned_by_path(mut graph: BuildGraph) {
    let a = graph.file(path("a.o", Root::BuildDir), FileType::Object);
    let b = graph.file(path("./a.o", Root::BuildDir), FileType::Object);
    let c = graph.file(path("a.o", Root::SrcDir), FileType::Object);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[rstest]
fn duplicate_output_is_rejected(mut graph: BuildGraph) {
    let obj = compile(&mut graph, "a.c", "a.o");
    let other = graph.source_file(path("b.c", Root::SrcDir), Some("c"));
    let step = Compile::new(other, "c");
    let err = graph
        .add_edge(Edge::new(EdgeKind::Compile(step), vec![obj]))
        .expect_err("second producer");
    assert_eq!(
        err,
        GraphError::DuplicateOutput {
            output: "a.o".to_owned()
        }
    );
}

#[rstest]
fn repeated_output_in_one_edge_is_rejected(mut graph: BuildGraph) {
    let obj = compile(&mut graph, "a.c", "a.o");
    let out = graph.file(path("lib.so", Root::BuildDir), FileType::SharedLibrary);
    let err = graph
        .add_edge(Edge::new(link(LinkMode::SharedLibrary, vec![obj]), vec![out, out]))
        .expect_err("repeated output");
    assert!(matches!(err, GraphError::DuplicateOutput { .. }));
}

#[rstest]
fn link_without_inputs_is_rejected(mut graph: BuildGraph) {
    let out = graph.file(path("prog", Root::BuildDir), FileType::Executable);
    let err = graph
        .add_edge(Edge::new(link(LinkMode::Executable, Vec::new()), vec![out]))
        .expect_err("no inputs");
    assert_eq!(
        err,
        GraphError::MissingInputs {
            output: "prog".to_owned()
        }
    );
}

#[rstest]
fn static_library_rejects_lib_options(mut graph: BuildGraph) {
    let obj = compile(&mut graph, "a.c", "a.o");
    let out = graph.file(path("liba.a", Root::BuildDir), FileType::StaticLibrary);
    let EdgeKind::Link(mut step) = link(LinkMode::StaticLibrary, vec![obj]) else {
        panic!("link kind");
    };
    step.lib_options.push(SafeStr::text("-lm"));
    let err = graph
        .add_edge(Edge::new(EdgeKind::Link(step), vec![out]))
        .expect_err("incompatible");
    assert!(matches!(err, GraphError::IncompatibleOptions { .. }));
}

#[rstest]
fn default_falls_back_to_last_link(mut graph: BuildGraph) {
    let obj = compile(&mut graph, "a.c", "a.o");
    assert!(graph.default_targets().is_empty());

    let first = graph.file(path("one", Root::BuildDir), FileType::Executable);
    graph
        .add_edge(Edge::new(link(LinkMode::Executable, vec![obj]), vec![first]))
        .expect("link one");
    let second = graph.file(path("two", Root::BuildDir), FileType::Executable);
    graph
        .add_edge(Edge::new(link(LinkMode::Executable, vec![obj]), vec![second]))
        .expect("link two");
    assert_eq!(graph.default_targets(), vec![second]);

    graph.mark_default(first).expect("mark");
    assert_eq!(graph.default_targets(), vec![first]);
}

#[rstest]
fn extra_dep_names_resolve_to_source_files(mut graph: BuildGraph) {
    let id = graph.extra_dep("data/input.txt").expect("dep");
    let node = graph.node(id).expect("node");
    assert_eq!(node.path(), Some(&path("data/input.txt", Root::SrcDir)));
    assert!(node.creator.is_none());

    let explicit = graph
        .extra_dep(path("gen.txt", Root::BuildDir))
        .expect("path dep");
    assert_eq!(
        graph.path_of(explicit).expect("path").root(),
        Root::SrcDir
    );
}

#[rstest]
fn alias_requires_phony_output(mut graph: BuildGraph) {
    let file = graph.file(path("x", Root::BuildDir), FileType::Generic);
    assert!(graph.add_edge(Edge::new(EdgeKind::Alias, vec![file])).is_err());
    let phony = graph.phony("everything");
    assert!(graph.add_edge(Edge::new(EdgeKind::Alias, vec![phony])).is_ok());
}

#[rstest]
fn tests_are_removed_from_defaults(mut graph: BuildGraph) {
    let obj = compile(&mut graph, "t.c", "t.o");
    let prog = graph.file(path("t", Root::BuildDir), FileType::Executable);
    graph
        .add_edge(Edge::new(link(LinkMode::Executable, vec![obj]), vec![prog]))
        .expect("link");
    graph
        .add_test(
            TestCase {
                target: Some(prog),
                ..TestCase::default()
            },
            None,
        )
        .expect("test");
    assert!(graph.default_targets().is_empty());
    assert!(graph.tests().targets.contains(&prog));
}

#[rstest]
fn driver_children_cannot_set_environment(mut graph: BuildGraph) {
    let driver = graph
        .add_test_driver(TestDriver::default(), None)
        .expect("driver");
    let mut env = IndexMap::new();
    env.insert("X".to_owned(), SafeStr::text("1"));
    let err = graph
        .add_test(
            TestCase {
                env,
                ..TestCase::default()
            },
            Some(driver),
        )
        .expect_err("env under driver");
    assert!(matches!(err, GraphError::InvalidTest(_)));
}

#[rstest]
fn install_uses_type_default_root(mut graph: BuildGraph) {
    let header = graph.file(path("foo.h", Root::SrcDir), FileType::Header);
    graph.add_install(header, None).expect("install");
    graph.add_install(header, None).expect("install twice");
    assert_eq!(
        graph.install().files,
        vec![InstallEntry {
            node: header,
            root: Root::IncludeDir,
            kind: InstallKind::Data,
        }]
    );
    let phony = graph.phony("p");
    assert!(graph.add_install(phony, None).is_err());
}

#[rstest]
fn install_pulls_in_install_deps(mut graph: BuildGraph) {
    let real = graph.file(path("libfoo.so.1", Root::BuildDir), FileType::SharedLibrary);
    let link = graph.file(path("libfoo.so", Root::BuildDir), FileType::SharedLibrary);
    graph.add_install_deps(link, [real, link]).expect("deps");
    assert_eq!(graph.node(link).expect("node").install_deps, vec![real]);

    graph.add_install(link, Some(Root::DataDir)).expect("install");
    let installed: Vec<(NodeId, Root)> = graph
        .install()
        .files
        .iter()
        .map(|entry| (entry.node, entry.root))
        .collect();
    assert_eq!(installed, vec![(link, Root::DataDir), (real, Root::LibDir)]);
}

#[rstest]
fn foreign_nodes_are_rejected() {
    let mut other = BuildGraph::new("other");
    for i in 0..3 {
        other.phony(&format!("p{i}"));
    }
    let foreign = other.phony("p2");
    let mut graph = BuildGraph::new("demo");
    assert_eq!(graph.mark_default(foreign), Err(GraphError::UnknownNode(2)));
}

#[rstest]
fn compile_can_use_precompiled_header(mut graph: BuildGraph) {
    let pch = precompile(&mut graph, "pch.hpp", &["pch.hpp.gch"]);
    let source = graph.source_file(path("main.cpp", Root::SrcDir), Some("c++"));
    let obj = graph.file(path("main.o", Root::BuildDir), FileType::Object);
    let step = Compile {
        pch: Some(pch),
        ..Compile::new(source, "c++")
    };
    let kind = EdgeKind::Compile(step);
    assert_eq!(kind.inputs(), vec![source, pch]);
    graph
        .add_edge(Edge::new(kind, vec![obj]))
        .expect("compile against pch");
}

#[rstest]
fn precompile_cannot_use_precompiled_header(mut graph: BuildGraph) {
    let pch = precompile(&mut graph, "a.hpp", &["a.pch", "a.obj"]);
    let header = graph.file(path("b.hpp", Root::SrcDir), FileType::Header);
    let out = graph.file(path("b.pch", Root::BuildDir), FileType::PrecompiledHeader);
    let step = Compile {
        pch: Some(pch),
        mode: CompileMode::PrecompiledHeader { pch_source: None },
        ..Compile::new(header, "c++")
    };
    let err = graph
        .add_edge(Edge::new(EdgeKind::Compile(step), vec![out]))
        .expect_err("nested pch");
    assert!(matches!(err, GraphError::IncompatibleOptions { .. }));
}

#[rstest]
fn object_is_not_a_precompiled_header(mut graph: BuildGraph) {
    let obj = compile(&mut graph, "a.c", "a.o");
    let source = graph.source_file(path("b.c", Root::SrcDir), Some("c"));
    let out = graph.file(path("b.o", Root::BuildDir), FileType::Object);
    let step = Compile {
        pch: Some(obj),
        ..Compile::new(source, "c")
    };
    let err = graph
        .add_edge(Edge::new(EdgeKind::Compile(step), vec![out]))
        .expect_err("object used as pch");
    assert_eq!(
        err,
        GraphError::WrongNodeKind {
            node: "a.o".to_owned(),
            expected: "a precompiled header",
        }
    );
}

#[rstest]
fn pch_source_replaces_the_compiled_input(mut graph: BuildGraph) {
    let header = graph.file(path("pch.hpp", Root::SrcDir), FileType::Header);
    let stub = graph.source_file(path("pch.cpp", Root::SrcDir), Some("c++"));
    let step = Compile {
        mode: CompileMode::PrecompiledHeader {
            pch_source: Some(stub),
        },
        ..Compile::new(header, "c++")
    };
    assert_eq!(step.input(), stub);
    assert_eq!(EdgeKind::Compile(step).inputs(), vec![header, stub]);
}
