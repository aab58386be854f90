#![cfg(unix)]

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use kml_commontools::io::open_reader;
use kml_commontools::simulate::{simulate, SimulationConfig, SimulationJob, SimulationOutcome, ToolPaths};
use tempfile::TempDir;

const SAM: &str = "@HD\tVN:1.6\n\
@SQ\tSN:chr1\tLN:24\n\
p1\t99\tchr1\t1\t60\t4M\t=\t9\t12\tACGT\tIIII\n\
p1\t147\tchr1\t9\t60\t4M\t=\t1\t-12\tACGT\tIIII\n\
orphan\t99\tchr1\t5\t60\t4M\t=\t900\t899\tACGT\tIIII\n\
p1\t2147\tchr1\t13\t60\t4M\t=\t1\t-12\tACGT\tIIII\n";

/// Stand-ins for the external tools. bwa prints a fixed SAM, samtools copies
/// it around, `samtools fastq` writes the number of records that survived the
/// pair filter, seqkit copies files and seqtk prints its input plus filler so
/// the gzip outputs pass the completeness check.
const FAKE_TOOLS: [(&str, &str); 4] = [
    ("dwgsim", "#!/bin/sh\necho \"dwgsim $*\" >&2\n"),
    (
        "samtools",
        r#"#!/bin/sh
case "$1" in
  view)
    if [ "$2" = "-h" ]; then cat "$3"; else cat; fi ;;
  sort)
    while [ "$1" != "-o" ]; do shift; done
    cat > "$2" ;;
  index) ;;
  fastq)
    grep -vc '^@' "$6" > "$3"
    grep -vc '^@' "$6" > "$5" ;;
esac
"#,
    ),
    (
        "seqkit",
        r#"#!/bin/sh
prev=""
for arg in "$@"; do
  if [ "$prev" = "--out-file" ]; then dst="$arg"; fi
  if [ "$arg" = "--out-file" ]; then src="$prev"; fi
  prev="$arg"
done
cp "$src" "$dst"
"#,
    ),
    (
        "seqtk",
        r#"#!/bin/sh
cat "$2"
i=0
while [ $i -lt 300 ]; do echo "@r$i/$3"; i=$((i+1)); done
"#,
    ),
];

/// Written once per test binary so no thread forks while a script is still
/// open for writing.
fn fake_tools() -> ToolPaths {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    let dir = DIR.get_or_init(|| {
        let dir = TempDir::new().unwrap();
        let bwa = format!("#!/bin/sh\ncat <<'EOF'\n{}EOF\n", SAM);
        for (name, body) in FAKE_TOOLS.into_iter().chain([("bwa", bwa.as_str())]) {
            let path = dir.path().join(name);
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    });
    let tool = |name: &str| dir.path().join(name);
    ToolPaths {
        dwgsim: tool("dwgsim"),
        bwa: tool("bwa"),
        samtools: tool("samtools"),
        seqkit: tool("seqkit"),
        seqtk: tool("seqtk"),
    }
}

fn read_gz(path: &Path) -> String {
    let mut text = String::new();
    open_reader(path).unwrap().read_to_string(&mut text).unwrap();
    text
}

fn config(dir: &Path) -> SimulationConfig {
    let reference: PathBuf = dir.join("ref.fa");
    fs::write(&reference, ">chr1\nACGTACGTACGTACGTACGTACGT\n").unwrap();
    SimulationConfig {
        reference,
        variants: None,
        output_prefix: dir.join("out").join("sample"),
        wild_type: true,
        variant_allele_freq: 0.05,
        region: "chr1:1-24".to_string(),
        data_volume: 3000,
        read_length: 150,
        threads: 1,
        dup_times: 2,
    }
}

#[test]
fn test_simulation_runs_plan_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let job = SimulationJob::new(config(tmp.path())).unwrap();

    let outcome = simulate(&job, &fake_tools()).unwrap();
    assert_eq!(
        outcome,
        SimulationOutcome::Completed {
            read1: job.read1.clone(),
            read2: job.read2.clone(),
            work_dir_removed: true,
        }
    );
    assert!(!job.work_dir.exists());

    // 只剩成对的 p1 两条记录, seqtk 收到 10 条 reads 的目标
    for output in [&job.read1, &job.read2] {
        let text = read_gz(output);
        assert!(text.starts_with("2\n@r0/10\n"), "unexpected output: {:?}", text.lines().next());
        assert_eq!(text.lines().count(), 301);
    }
}
