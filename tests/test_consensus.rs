use flate2::Compression;
use flate2::write::GzEncoder;
use rust_python_tree_consensus::io::{
    TreeFile, WriteOptions, load_table, read_first_tree, registry_from_file, save_table,
    write_trees,
};
use rust_python_tree_consensus::options::{
    AggregateOptions, AnnotateOptions, ConsensusOptions, EdgeSummary, MalformedTreePolicy,
    SupportFormat, TableOptions,
};
use rust_python_tree_consensus::{
    Bitset, ConsensusError, SplitEncoder, SplitMode, SplitTable, TreeGraph, aggregate_sources,
    annotate, build_consensus,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_file(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn write_gz(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

fn bits(idx: &[usize]) -> Bitset {
    let mut bs = Bitset::zeros(1);
    idx.iter().for_each(|&i| bs.set(i));
    bs
}

fn informative(tree: &TreeGraph, n: usize) -> Vec<Bitset> {
    let encoded = SplitEncoder::new(n, SplitMode::of(tree)).encode(tree).unwrap();
    let mut splits: Vec<Bitset> = encoded.informative_edges().map(|e| e.split.clone()).collect();
    splits.sort();
    splits.dedup();
    splits
}

const RUN1: &str = "[&U] ((A:1,B:1):0.5,C:1,D:1);
[&U] ((A:1,B:1):1.5,C:1,D:1);
";
const RUN2: &str = "[&U] ((A:1,C:1):1,B:1,D:1);\n";

/// Rooted ultrametric NEXUS run; the first tree has another topology and is burn-in.
const DATED: &str = "#NEXUS
Begin trees;
\tTranslate
\t\t1 A,
\t\t2 B,
\t\t3 C,
\t\t4 D
\t\t;
tree STATE_0 [&lnP=-12.5] = [&R] ((1:1,3:1):1,(2:1,4:1):1);
tree STATE_1000 [&lnP=-10.1] = [&R] ((1:1,2:1):1,(3:1.5,4:1.5):0.5);
tree STATE_2000 [&lnP=-10.4] = [&R] ((1:2,2:2):1,(3:2.5,4:2.5):0.5);
End;
";

#[test]
fn test_majority_rule_consensus_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        TreeFile::new(write_file(dir.path(), "run1.nwk", RUN1)),
        TreeFile::new(write_file(dir.path(), "run2.nwk", RUN2)),
    ];
    let registry = registry_from_file(&files[0]).unwrap();
    assert_eq!(registry.labels(), ["A", "B", "C", "D"]);

    let table = aggregate_sources(&files, &registry, &AggregateOptions::default()).unwrap();
    assert_eq!(table.trees(), 3);
    assert_eq!(table.mode(), Some(SplitMode::Unrooted));

    let options = ConsensusOptions {
        support: SupportFormat { as_percentage: false, precision: Some(2) },
        ..Default::default()
    };
    let consensus = build_consensus(&table, &options).unwrap();
    assert_eq!(informative(&consensus, 4), vec![bits(&[2, 3])]);

    // written trees can be read back with the same topology
    let out = dir.path().join("consensus.nwk");
    write_trees(&out, &[consensus], &registry, &WriteOptions::default()).unwrap();
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("[&U] "));
    assert!(text.contains("support=0.67"));

    let reread = read_first_tree(&out, &registry).unwrap();
    assert!(!reread.is_rooted());
    assert_eq!(informative(&reread, 4), vec![bits(&[2, 3])]);
}

#[test]
fn test_dated_nexus_with_burnin_and_age_lengths() {
    let dir = tempfile::tempdir().unwrap();
    let file = TreeFile::new(write_gz(dir.path(), "dated.trees.gz", DATED)).with_burnin(1);
    let registry = registry_from_file(&file).unwrap();

    let options = AggregateOptions {
        table: TableOptions { track_ages: true, ..Default::default() },
        ..Default::default()
    };
    let table = aggregate_sources(&[file], &registry, &options).unwrap();
    assert_eq!(table.trees(), 2);
    assert_eq!(table.mode(), Some(SplitMode::Rooted));
    assert_eq!(table.frequency(&bits(&[0, 2])), 0.0);

    let options = ConsensusOptions { edge_summary: EdgeSummary::MeanAge, ..Default::default() };
    let consensus = build_consensus(&table, &options).unwrap();
    let encoded = SplitEncoder::new(4, SplitMode::Rooted).encode(&consensus).unwrap();
    let node = |clade: &[usize]| encoded.clades.iter().position(|c| *c == bits(clade)).unwrap();

    // root age 2.5, {A,B} at 1.5 and {C,D} at 2.0
    assert_eq!(consensus[node(&[0, 1])].edge_length(), Some(1.0));
    assert_eq!(consensus[node(&[2, 3])].edge_length(), Some(0.5));
}

#[test]
fn test_saved_tables_merge_like_one_run() {
    let dir = tempfile::tempdir().unwrap();
    let run1 = TreeFile::new(write_file(dir.path(), "run1.nwk", RUN1));
    let run2 = TreeFile::new(write_file(dir.path(), "run2.nwk", RUN2));
    let registry = registry_from_file(&run1).unwrap();
    let options = AggregateOptions::default();

    let together = aggregate_sources(&[run1.clone(), run2.clone()], &registry, &options).unwrap();

    let mut merged: Option<SplitTable> = None;
    for (i, file) in [run1, run2].into_iter().enumerate() {
        let table = aggregate_sources(&[file], &registry, &options).unwrap();
        let path = dir.path().join(format!("part{i}.json.gz"));
        save_table(&path, &registry, &table).unwrap();

        let saved = load_table(&path).unwrap();
        assert_eq!(saved.taxa, registry);
        merged = Some(match merged {
            None => saved.table,
            Some(acc) => acc.merged(saved.table).unwrap(),
        });
    }
    assert_eq!(merged.unwrap(), together);
}

#[test]
fn test_annotate_target_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        TreeFile::new(write_file(dir.path(), "run1.nwk", RUN1)),
        TreeFile::new(write_file(dir.path(), "run2.nwk", RUN2)),
    ];
    let target = write_file(dir.path(), "target.nwk", "[&U] ((A:1,C:1):2,B:1,D:1);\n");
    let registry = registry_from_file(&files[0]).unwrap();
    let table = aggregate_sources(&files, &registry, &AggregateOptions::default()).unwrap();

    let mut tree = read_first_tree(&target, &registry).unwrap();
    let options = AnnotateOptions {
        support: SupportFormat { as_percentage: true, precision: Some(1) },
        summarize: false,
        edge_lengths: None,
    };
    annotate(&mut tree, &table, &options).unwrap();

    let out = dir.path().join("annotated.nwk");
    write_trees(&out, &[tree], &registry, &WriteOptions::default()).unwrap();
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains(")33.3[&support=33.3]:2"), "{text}");
}

#[test]
fn test_unknown_taxon_in_later_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        TreeFile::new(write_file(dir.path(), "run1.nwk", RUN1)),
        TreeFile::new(write_file(dir.path(), "run2.nwk", "[&U] ((A:1,E:1):1,B:1,D:1);\n")),
    ];
    let registry = registry_from_file(&files[0]).unwrap();
    let skip = AggregateOptions { on_malformed: MalformedTreePolicy::Skip, ..Default::default() };
    assert!(matches!(
        aggregate_sources(&files, &registry, &skip),
        Err(ConsensusError::RegistryMismatch(_))
    ));
}

#[test]
fn test_unlabelled_leaf_is_skipped_or_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let text = "[&U] ((A:1,B:1):1,C:1,D:1);
[&U] ((A:1,:1):1,C:1,D:1);
[&U] ((A:1,B:1):1,C:1,D:1);
";
    let file = TreeFile::new(write_file(dir.path(), "broken.nwk", text));
    let registry = registry_from_file(&file).unwrap();

    let abort = AggregateOptions::default();
    assert!(matches!(
        aggregate_sources(std::slice::from_ref(&file), &registry, &abort),
        Err(ConsensusError::MalformedTree { index: 1, .. })
    ));

    let skip = AggregateOptions { on_malformed: MalformedTreePolicy::Skip, ..Default::default() };
    let table = aggregate_sources(&[file], &registry, &skip).unwrap();
    assert_eq!(table.trees(), 2);
    assert_eq!(table.frequency(&bits(&[2, 3])), 1.0);
}
