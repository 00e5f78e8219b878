//! End-to-end generation scenarios driven through the public pipeline
//! against real temp trees.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;

use ngen::core::shell::{Shell, Verbosity};
use ngen::ops::{self, GenOptions};
use ngen::{ErrorKind, GenError};

struct Project {
    dir: tempfile::TempDir,
}

const DEFAULT_TOOLCHAIN: &str = r#"
toolchain("gcc") {
  tool("cc") {
    command = "gcc {{defines}} {{include_dirs}} {{cflags}} {{cflags_c}} -c {{source}} -o {{output}}"
    depfile = "{{output}}.d"
    description = "CC {{output}}"
    outputs = [ "{{source_out_dir}}/{{target_output_name}}.{{source_name_part}}.o" ]
  }
  tool("cxx") {
    command = "g++ {{defines}} {{include_dirs}} {{cflags}} {{cflags_cc}} -c {{source}} -o {{output}}"
    depfile = "{{output}}.d"
    description = "CXX {{output}}"
    outputs = [ "{{source_out_dir}}/{{target_output_name}}.{{source_name_part}}.o" ]
  }
  tool("alink") {
    command = "ar rcs {{output}} {{inputs}}"
    description = "AR {{output}}"
    outputs = [ "{{target_out_dir}}/{{target_output_name}}.a" ]
    output_prefix = "lib"
  }
  tool("solink") {
    command = "gcc -shared -o {{output}} {{inputs}} {{libs}}"
    description = "SOLINK {{output}}"
    outputs = [ "{{output_dir}}/{{target_output_name}}{{output_extension}}" ]
    default_output_dir = "{{target_out_dir}}"
    default_output_extension = ".so"
    output_prefix = "lib"
  }
  tool("link") {
    command = "gcc -o {{output}} {{inputs}} {{libs}} {{ldflags}}"
    description = "LINK {{output}}"
    outputs = [ "{{output_dir}}/{{target_output_name}}{{output_extension}}" ]
    default_output_dir = "{{target_out_dir}}"
  }
  tool("stamp") {
    command = "touch {{output}}"
    description = "STAMP {{output}}"
  }
  tool("copy") {
    command = "cp -af {{source}} {{output}}"
    description = "COPY {{source}} {{output}}"
  }
}
"#;

impl Project {
    fn new() -> Project {
        let project = Project {
            dir: tempfile::TempDir::new().unwrap(),
        };
        project.file(".gn", "buildconfig = \"//build/BUILDCONFIG.gn\"\n");
        project.file(
            "build/BUILDCONFIG.gn",
            "set_default_toolchain(\"//build/toolchain:gcc\")\n",
        );
        project.file("build/toolchain/BUILD.gn", DEFAULT_TOOLCHAIN);
        project
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn file(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn options(&self) -> GenOptions {
        GenOptions {
            out_dir: self.root().join("out").to_string_lossy().to_string(),
            root: Some(self.root().to_path_buf()),
            quiet: true,
            num_workers: Some(4),
            ..GenOptions::default()
        }
    }

    fn gen(&self) -> anyhow::Result<ops::GenStats> {
        let mut shell = Shell::new(Verbosity::Quiet);
        ops::gen(&self.options(), &mut shell)
    }

    fn gen_err_kind(&self) -> ErrorKind {
        let err = self.gen().expect_err("generation should fail");
        err.downcast_ref::<GenError>()
            .unwrap_or_else(|| panic!("not a GenError: {:#}", err))
            .kind
    }

    fn read_out(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join("out").join(rel)).unwrap()
    }
}

#[test]
fn minimal_group() {
    let project = Project::new();
    project.file("BUILD.gn", "group(\"root\") {\n  deps = []\n}\n");
    project.gen().unwrap();

    let build_ninja = project.read_out("build.ninja");
    assert!(build_ninja.contains("ninja_required_version = 1.7.2"));
    assert!(build_ninja.contains("build all: phony"));
    assert!(build_ninja.contains("obj/root.stamp"));
    assert!(build_ninja.contains("\ndefault all\n"));

    let toolchain_ninja = project.read_out("toolchain.ninja");
    assert!(toolchain_ninja.contains("build obj/root.stamp: stamp"));

    let stamp = project.read_out("build.ninja.stamp");
    assert_eq!(stamp, "");

    let depfile = project.read_out("build.ninja.d");
    assert!(depfile.starts_with("build.ninja.stamp:"));
    assert!(depfile.contains("../.gn"));
    assert!(depfile.contains("../BUILD.gn"));
    assert!(depfile.contains("../build/BUILDCONFIG.gn"));
}

#[test]
fn phony_rule_priorities() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ ":alpha", "//tools:alpha" ]
        }
        executable("alpha") {
          sources = [ "alpha.cc" ]
        }
        "#,
    );
    project.file(
        "tools/BUILD.gn",
        "executable(\"alpha\") {\n  sources = [ \"alpha.cc\" ]\n}\n",
    );
    project.gen().unwrap();

    let build_ninja = project.read_out("build.ninja");
    // The root-file target wins the short name.
    assert!(build_ninja.contains("build alpha: phony obj/alpha\n"));
    // The other target is reachable through its full label (ninja-escaped
    // colon).
    assert!(build_ninja.contains("build tools$:alpha: phony obj/tools/alpha\n"));
    // No second phony named "alpha".
    assert_eq!(build_ninja.matches("build alpha: phony").count(), 1);
}

#[test]
fn testonly_violation() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ "//b" ]
        }
        "#,
    );
    project.file("a/BUILD.gn", "group(\"a\") {\n  testonly = true\n}\n");
    project.file(
        "b/BUILD.gn",
        "group(\"b\") {\n  deps = [ \"//a\" ]\n}\n",
    );
    assert_eq!(project.gen_err_kind(), ErrorKind::TestonlyViolation);
    // Emission is skipped on error.
    assert!(!project.root().join("out/build.ninja").exists());
}

#[test]
fn duplicate_output() {
    let project = Project::new();
    project.file("make.py", "");
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ ":one", ":two" ]
        }
        action("one") {
          script = "//make.py"
          outputs = [ "{{root_gen_dir}}/x.txt" ]
        }
        action("two") {
          script = "//make.py"
          outputs = [ "{{root_gen_dir}}/x.txt" ]
        }
        "#,
    );
    assert_eq!(project.gen_err_kind(), ErrorKind::DuplicateOutput);
}

#[test]
fn assert_no_deps_triangle() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ "//a" ]
        }
        "#,
    );
    project.file(
        "a/BUILD.gn",
        r#"
        group("a") {
          assert_no_deps = [ "//forbidden/*" ]
          deps = [ "//b" ]
        }
        "#,
    );
    project.file("b/BUILD.gn", "group(\"b\") {\n  deps = [ \"//forbidden:x\" ]\n}\n");
    project.file("forbidden/BUILD.gn", "group(\"x\") {\n}\n");

    let err = project.gen().expect_err("generation should fail");
    let gen_err = err.downcast_ref::<GenError>().unwrap();
    assert_eq!(gen_err.kind, ErrorKind::AssertNoDepsViolation);
    let message = gen_err.to_string();
    assert!(message.contains("//forbidden/*"), "{}", message);
    assert!(message.contains("//b:b"), "{}", message);
    assert!(message.contains("//forbidden:x"), "{}", message);
}

fn cross_toolchain_project(propagates: bool) -> Project {
    let project = Project::new();
    let other_toolchain = format!(
        r#"
        toolchain("other") {{
          tool("stamp") {{
            command = "touch {{{{output}}}}"
          }}
          propagates_configs = {}
        }}
        "#,
        propagates
    );
    project.file(
        "build/toolchain/BUILD.gn",
        &format!("{}\n{}", DEFAULT_TOOLCHAIN, other_toolchain),
    );
    project.file(
        "BUILD.gn",
        r#"
        executable("root") {
          sources = [ "main.c" ]
          deps = [ "//b(//build/toolchain:other)" ]
        }
        "#,
    );
    project.file(
        "b/BUILD.gn",
        r#"
        group("b") {
          public_configs = [ ":conf" ]
        }
        config("conf") {
          defines = [ "FOO=1" ]
        }
        "#,
    );
    project
}

#[test]
fn cross_toolchain_configs_respect_propagates_flag() {
    let blocked = cross_toolchain_project(false);
    blocked.gen().unwrap();
    let toolchain_ninja = blocked.read_out("toolchain.ninja");
    assert!(
        !toolchain_ninja.contains("-DFOO=1"),
        "config leaked across a non-propagating toolchain"
    );

    let propagating = cross_toolchain_project(true);
    propagating.gen().unwrap();
    let toolchain_ninja = propagating.read_out("toolchain.ninja");
    assert!(
        toolchain_ninja.contains("defines = -DFOO=1"),
        "config failed to propagate:\n{}",
        toolchain_ninja
    );
}

#[test]
fn c_binary_statements() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        executable("app") {
          sources = [ "main.cc", "extra.cc" ]
          deps = [ "//util" ]
          defines = [ "APP=1" ]
        }
        "#,
    );
    project.file(
        "util/BUILD.gn",
        r#"
        static_library("util") {
          sources = [ "impl.cc" ]
        }
        "#,
    );
    project.gen().unwrap();

    let toolchain_ninja = project.read_out("toolchain.ninja");
    // Rules come from the toolchain definition.
    assert!(toolchain_ninja.contains("rule cxx\n"));
    assert!(toolchain_ninja
        .contains("  command = g++ ${defines} ${include_dirs} ${cflags} ${cflags_cc} -c ${in} -o ${out}\n"));
    // Per-source compile with the per-statement defines binding.
    assert!(toolchain_ninja.contains("build obj/app.main.o: cxx ../main.cc"));
    assert!(toolchain_ninja.contains("  defines = -DAPP=1\n"));
    // The static library archives (with the tool's "lib" prefix applied)
    // and the executable links against it.
    assert!(toolchain_ninja.contains("build obj/util/libutil.a: alink obj/util/libutil.impl.o"));
    assert!(toolchain_ninja
        .contains("build obj/app: link obj/app.main.o obj/app.extra.o obj/util/libutil.a"));
}

#[test]
fn copy_and_foreach_outputs() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ ":copies" ]
        }
        copy("copies") {
          sources = [ "one.txt", "two.txt" ]
          outputs = [ "{{target_gen_dir}}/{{source_file_part}}" ]
        }
        "#,
    );
    project.gen().unwrap();

    let toolchain_ninja = project.read_out("toolchain.ninja");
    assert!(toolchain_ninja.contains("build gen/one.txt: copy ../one.txt"));
    assert!(toolchain_ninja.contains("build gen/two.txt: copy ../two.txt"));
    assert!(toolchain_ninja.contains("build obj/copies.stamp: stamp gen/one.txt gen/two.txt"));
}

#[test]
fn generated_file_is_written_at_gen_time() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ ":listing" ]
        }
        generated_file("listing") {
          outputs = [ "{{root_gen_dir}}/listing.txt" ]
          contents = [ "alpha", "beta" ]
        }
        "#,
    );
    project.gen().unwrap();
    assert_eq!(project.read_out("gen/listing.txt"), "alpha\nbeta\n");
}

#[test]
fn output_is_stable_across_runs() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ ":app" ]
        }
        executable("app") {
          sources = [ "main.cc" ]
        }
        "#,
    );
    project.gen().unwrap();
    let first = project.read_out("build.ninja");
    let first_toolchain = project.read_out("toolchain.ninja");
    project.gen().unwrap();
    assert_eq!(first, project.read_out("build.ninja"));
    assert_eq!(first_toolchain, project.read_out("toolchain.ninja"));
}

#[test]
fn unresolved_reference_is_reported() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        "group(\"root\") {\n  deps = [ \"//b:nonexistent\" ]\n}\n",
    );
    project.file("b/BUILD.gn", "group(\"b\") {\n}\n");
    assert_eq!(project.gen_err_kind(), ErrorKind::UnresolvedReference);
}

#[test]
fn dependency_cycle_is_reported() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("root") {
          deps = [ ":a" ]
        }
        group("a") {
          deps = [ ":b" ]
        }
        group("b") {
          deps = [ ":a" ]
        }
        "#,
    );
    assert_eq!(project.gen_err_kind(), ErrorKind::DepCycle);
}

#[test]
fn default_target_is_honored() {
    let project = Project::new();
    project.file(
        "BUILD.gn",
        r#"
        group("default") {
          deps = [ ":app" ]
        }
        executable("app") {
          sources = [ "main.cc" ]
        }
        "#,
    );
    project.gen().unwrap();
    let build_ninja = project.read_out("build.ninja");
    assert!(build_ninja.contains("build default: phony obj/default.stamp"));
    assert!(build_ninja.contains("\ndefault default\n"));
}

#[test]
fn regeneration_rules_precede_fourth_blank_line() {
    let project = Project::new();
    project.file("BUILD.gn", "group(\"root\") {\n}\n");
    project.gen().unwrap();
    let build_ninja = project.read_out("build.ninja");
    let extracted = ngen::emit::build_writer::extract_regeneration_commands(&build_ninja);
    assert!(extracted.contains("rule gn\n"));
    assert!(extracted.contains("build build.ninja.stamp: gn\n"));
    assert!(extracted.contains("build build.ninja: phony build.ninja.stamp\n"));
    assert!(extracted.contains("--regeneration"));
    assert!(!extracted.contains("subninja"));
    // The contract: the regeneration section ends at the fourth blank line.
    assert_eq!(
        extracted.lines().filter(|l| l.is_empty()).count(),
        4,
        "{}",
        extracted
    );
}

#[test]
fn args_gn_round_trip_and_unused_reporting() {
    let project = Project::new();
    project.file(
        "build/BUILDCONFIG.gn",
        r#"
        declare_args() {
          enable_fancy = false
        }
        set_default_toolchain("//build/toolchain:gcc")
        "#,
    );
    project.file("BUILD.gn", "group(\"root\") {\n}\n");

    let mut options = project.options();
    options.args = Some("enable_fancy = true".to_string());
    let mut shell = Shell::new(Verbosity::Quiet);
    ops::gen(&options, &mut shell).unwrap();

    // --args persists canonically and is used on the next run implicitly.
    assert_eq!(project.read_out("args.gn"), "enable_fancy = true\n");
    project.gen().unwrap();

    // An override nothing declares trips --fail-on-unused-args.
    let mut options = project.options();
    options.args = Some("bogus_arg = 1".to_string());
    options.fail_on_unused_args = true;
    let err = ops::gen(&options, &mut shell).expect_err("unused args should fail");
    assert!(err.to_string().contains("unused build argument"));
}
