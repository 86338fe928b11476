//! End-to-end runs of the `brepweb` binary on small STEP files.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use brepweb_gltf::{is_glb, GlbSummary};

/// One planar triangle, closed into a solid, coloured blue.
const TRIANGLE_SOLID: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('triangle'),'2;1');
FILE_NAME('triangle.step','2024-05-01',(''),(''),'','','');
FILE_SCHEMA(('AUTOMOTIVE_DESIGN'));
ENDSEC;
DATA;
#1=CARTESIAN_POINT('',(0.,0.,0.));
#2=CARTESIAN_POINT('',(10.,0.,0.));
#3=CARTESIAN_POINT('',(5.,10.,0.));
#4=DIRECTION('',(0.,0.,1.));
#5=DIRECTION('',(1.,0.,0.));
#6=AXIS2_PLACEMENT_3D('',#1,#4,#5);
#7=PLANE('',#6);
#8=VERTEX_POINT('',#1);
#9=VERTEX_POINT('',#2);
#10=VERTEX_POINT('',#3);
#11=LINE('',#1,#20);
#12=LINE('',#2,#21);
#13=LINE('',#3,#22);
#20=VECTOR('',#5,1.);
#21=VECTOR('',#4,1.);
#22=VECTOR('',#4,1.);
#14=EDGE_CURVE('',#8,#9,#11,.T.);
#15=EDGE_CURVE('',#9,#10,#12,.T.);
#16=EDGE_CURVE('',#10,#8,#13,.T.);
#17=ORIENTED_EDGE('',*,*,#14,.T.);
#18=ORIENTED_EDGE('',*,*,#15,.T.);
#19=ORIENTED_EDGE('',*,*,#16,.T.);
#30=EDGE_LOOP('',(#17,#18,#19));
#31=FACE_OUTER_BOUND('',#30,.T.);
#32=ADVANCED_FACE('',(#31),#7,.T.);
#33=CLOSED_SHELL('',(#32));
#34=MANIFOLD_SOLID_BREP('plate',#33);
#40=COLOUR_RGB('',0.,0.,1.);
#41=FILL_AREA_STYLE_COLOUR('',#40);
#42=STYLED_ITEM('',(#41),#34);
ENDSEC;
END-ISO-10303-21;
"#;

fn brepweb(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_brepweb"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn run_convert(input: &Path, output: &Path, extra: &[&str]) -> Output {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    let mut args = vec!["-q", "convert", input.as_ref(), output.as_ref()];
    args.extend_from_slice(extra);
    brepweb(&args)
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Writes `text` as `name` in a fresh input directory.
fn fixture(name: &str, text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    (dir, path)
}

#[test]
fn converts_a_solid_without_compression() {
    let (_inputs, input) = fixture("plate.step", TRIANGLE_SOLID);
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("plate.glb");

    let result = run_convert(&input, &target, &["--no-compress"]);
    assert_eq!(result.status.code(), Some(0), "{}", stderr(&result));

    let bytes = fs::read(&target).unwrap();
    assert!(is_glb(&bytes));
    let summary = GlbSummary::parse(&bytes).unwrap();
    assert_eq!(summary.node_names, ["Solid_0"]);
    assert_eq!(summary.triangle_count(), 1);
    assert_eq!(entries(out.path()), vec!["plate.glb"]);
}

#[cfg(unix)]
#[test]
fn failing_compressor_still_exits_zero() {
    let (_inputs, input) = fixture("plate.step", TRIANGLE_SOLID);
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("a.glb");

    let result = run_convert(&input, &target, &["--compressor", "false"]);
    assert_eq!(result.status.code(), Some(0), "{}", stderr(&result));
    assert!(is_glb(&fs::read(&target).unwrap()));
    assert_eq!(entries(out.path()), vec!["a.glb"]);
}

#[test]
fn writes_a_job_report() {
    let (inputs, input) = fixture("plate.step", TRIANGLE_SOLID);
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("plate.glb");
    let report = inputs.path().join("report.json");
    let report_arg = report.to_string_lossy().into_owned();

    let result = run_convert(&input, &target, &["--no-compress", "--report", &report_arg]);
    assert_eq!(result.status.code(), Some(0), "{}", stderr(&result));

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&report).unwrap()).unwrap();
    assert_eq!(json["total_parts"], 1);
    assert_eq!(json["meshed"], 1);
    assert_eq!(json["failed"].as_array().map(Vec::len), Some(0));
}

#[test]
fn shell_with_missing_face_fails_without_artifact() {
    let broken = TRIANGLE_SOLID.replace("#33=CLOSED_SHELL('',(#32));", "#33=CLOSED_SHELL('',(#99));");
    let (_inputs, input) = fixture("broken.step", &broken);
    let out = tempfile::tempdir().unwrap();

    let result = run_convert(&input, &out.path().join("broken.glb"), &["--no-compress"]);
    assert_eq!(result.status.code(), Some(1));
    assert!(entries(out.path()).is_empty(), "{:?}", entries(out.path()));
}

#[test]
fn missing_input_fails() {
    let inputs = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let result = run_convert(&inputs.path().join("nowhere.step"), &out.path().join("o.glb"), &["--no-compress"]);
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("nowhere.step"), "{}", stderr(&result));
    assert!(entries(out.path()).is_empty());
}

#[test]
fn non_step_input_fails() {
    let (_inputs, input) = fixture("notes.step", "just some text\n");
    let out = tempfile::tempdir().unwrap();

    let result = run_convert(&input, &out.path().join("o.glb"), &[]);
    assert_eq!(result.status.code(), Some(1));
    assert!(entries(out.path()).is_empty());
}
