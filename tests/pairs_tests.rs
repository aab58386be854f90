use std::io::Write;
use std::process::{Command, Stdio};

const SAM: &str = "@HD\tVN:1.6\n\
@SQ\tSN:chr1\tLN:24\n\
p1\t99\tchr1\t1\t60\t4M\t=\t9\t12\tACGT\tIIII\n\
p1\t147\tchr1\t9\t60\t4M\t=\t1\t-12\tACGT\tIIII\n\
orphan\t99\tchr1\t5\t60\t4M\t=\t900\t899\tACGT\tIIII\n\
p1\t2147\tchr1\t13\t60\t4M\t=\t1\t-12\tACGT\tIIII\n";

#[test]
fn test_filter_pairs_subcommand() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_kml-commontools"))
        .arg("filter-pairs")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(SAM.as_bytes()).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "@HD\tVN:1.6\n\
@SQ\tSN:chr1\tLN:24\n\
p1\t99\tchr1\t1\t60\t4M\t=\t9\t12\tACGT\tIIII\n\
p1\t147\tchr1\t9\t60\t4M\t=\t1\t-12\tACGT\tIIII\n"
    );
}
