//! Reading tree files, writing annotated trees, saving split tables.
//!
//! Input is either NEXUS (a `TREES` block, optionally with `TRANSLATE`) or plain Newick
//! with one tree per `;`. Both may be gzip-compressed (`.gz`). BEAST-style comments such
//! as `[&rate=0.12]` are stripped before parsing; a leading `[&R]` / `[&U]` marks the
//! rooting of a tree.

use crate::aggregate::{TreeIter, TreeSource};
use crate::consensus::SUPPORT_KEY;
use crate::error::{ConsensusError, Result};
use crate::table::SplitTable;
use crate::taxa::TaxonRegistry;
use crate::tree::{AnnotationValue, NodeId, TreeGraph};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use itertools::Itertools;
use phylotree::tree::Tree as PhyloTree;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Reads a whole file into memory, decompressing it if the name ends in `.gz`.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let read_error = |source: std::io::Error| ConsensusError::Read { path: path.to_path_buf(), source };
    let file = File::open(path).map_err(read_error)?;
    let mut text = String::new();
    if is_gz(path) {
        MultiGzDecoder::new(file).read_to_string(&mut text).map_err(read_error)?;
    } else {
        BufReader::new(file).read_to_string(&mut text).map_err(read_error)?;
    }
    Ok(text)
}

/// Opens `path` for writing; the output is gzip-compressed if the name ends in `.gz`.
pub fn create_output<P: AsRef<Path>>(path: P) -> Result<Box<dyn Write>> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let out: Box<dyn Write> = if is_gz(path) {
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
    } else {
        Box::new(BufWriter::new(file))
    };
    Ok(out)
}

// ============================================================================
// Reading
// ============================================================================

/// One tree statement, cleaned of comments and whitespace but not yet parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStatement {
    pub name: Option<String>,
    /// Rooting given by a `[&R]` / `[&U]` marker, if any.
    pub rooted: Option<bool>,
    /// Newick string terminated with `;`.
    pub newick: String,
}

/// The trees of one file, in file order, plus its `TRANSLATE` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeDocument {
    pub translate: HashMap<String, String>,
    pub statements: Vec<TreeStatement>,
}

impl TreeDocument {
    /// Splits a NEXUS or Newick text into tree statements.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim_start();
        match trimmed.get(..6) {
            Some(header) if header.eq_ignore_ascii_case("#nexus") => parse_nexus(&trimmed[6..]),
            _ => TreeDocument {
                translate: HashMap::new(),
                statements: split_statements(text)
                    .into_iter()
                    .map(|s| clean_newick(s, None))
                    .filter(|s| s.newick != ";")
                    .collect(),
            },
        }
    }

    /// Labels of the taxa of this document: the `TRANSLATE` labels if there are any,
    /// otherwise the leaf labels of the first tree. Sorted alphabetically.
    pub fn taxa(&self) -> Result<Vec<String>> {
        let mut labels: Vec<String> = if self.translate.is_empty() {
            let first = self.statements.first().ok_or_else(|| {
                ConsensusError::InvalidTree("no trees found to take taxa from".to_string())
            })?;
            let phylo = parse_phylo(&first.newick)?;
            let mut labels = Vec::new();
            for leaf in phylo.get_leaves() {
                let raw = phylo.get(&leaf)?.name.clone().unwrap_or_default();
                labels.push(resolve_label(&raw, &self.translate));
            }
            labels
        } else {
            self.translate.values().cloned().collect()
        };
        labels.sort();
        Ok(labels)
    }
}

/// Parses one statement into a [`TreeGraph`] over `registry`.
///
/// # Errors
/// - [`ConsensusError::InvalidTree`] if the Newick string cannot be parsed or a leaf has
///   no label
/// - [`ConsensusError::RegistryMismatch`] if a leaf label is not in the registry
pub fn parse_tree(
    statement: &TreeStatement,
    translate: &HashMap<String, String>,
    registry: &TaxonRegistry,
) -> Result<TreeGraph> {
    let phylo = parse_phylo(&statement.newick)?;
    // unmarked trees are unrooted whatever the degree of their root
    let rooted = statement.rooted.unwrap_or(false);
    let mut tree = from_phylo(&phylo, rooted, translate, registry)?;
    if let Some(name) = &statement.name {
        tree = tree.with_name(name.clone());
    }
    Ok(tree)
}

fn parse_phylo(newick: &str) -> Result<PhyloTree> {
    PhyloTree::from_newick(newick)
        .map_err(|e| ConsensusError::InvalidTree(format!("cannot parse Newick: {e}")))
}

/// Copies a parsed tree into the arena representation, mapping leaf labels to taxa.
fn from_phylo(
    phylo: &PhyloTree,
    rooted: bool,
    translate: &HashMap<String, String>,
    registry: &TaxonRegistry,
) -> Result<TreeGraph> {
    let mut tree = TreeGraph::new(rooted);
    let root = phylo.get_root()?;
    tree[TreeGraph::ROOT].set_edge_length(phylo.get(&root)?.parent_edge);

    let mut stack = vec![(root, TreeGraph::ROOT)];
    while let Some((phylo_id, parent)) = stack.pop() {
        for &child in &phylo.get(&phylo_id)?.children {
            let node = phylo.get(&child)?;
            if node.children.is_empty() {
                let raw = node.name.as_deref().filter(|n| !n.is_empty()).ok_or_else(|| {
                    ConsensusError::InvalidTree("leaf without a label".to_string())
                })?;
                let taxon = registry.require(&resolve_label(raw, translate))?;
                tree.add_leaf(parent, taxon, node.parent_edge)?;
            } else {
                let id = tree.add_child(parent, node.parent_edge)?;
                if let Some(label) = node.name.as_deref().filter(|n| !n.is_empty()) {
                    tree[id].set_label(Some(unquote(label)));
                }
                stack.push((child, id));
            }
        }
    }
    Ok(tree)
}

fn resolve_label(raw: &str, translate: &HashMap<String, String>) -> String {
    translate.get(raw).cloned().unwrap_or_else(|| unquote(raw))
}

fn unquote(label: &str) -> String {
    match label.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => label.to_string(),
    }
}

/// Splits on `;` outside quotes and comments. Returned slices exclude the `;`.
fn split_statements(text: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let (mut start, mut in_quote, mut depth) = (0, false, 0usize);
    for (i, ch) in text.char_indices() {
        match ch {
            '\'' if depth == 0 => in_quote = !in_quote,
            '[' if !in_quote => depth += 1,
            ']' if !in_quote => depth = depth.saturating_sub(1),
            ';' if !in_quote && depth == 0 => {
                statements.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !text[start..].trim().is_empty() {
        statements.push(&text[start..]);
    }
    statements
}

/// Position of the first `target` outside quotes and comments.
fn find_unbracketed(text: &str, target: char) -> Option<usize> {
    let (mut in_quote, mut depth) = (false, 0usize);
    for (i, ch) in text.char_indices() {
        match ch {
            '\'' if depth == 0 => in_quote = !in_quote,
            '[' if !in_quote => depth += 1,
            ']' if !in_quote => depth = depth.saturating_sub(1),
            c if c == target && !in_quote && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Drops comments and whitespace outside quotes and terminates with `;`.
///
/// BEAST writes annotations like `:[&rate=0.123]2.45`; only the branch length survives.
/// A `[&R]` or `[&U]` comment before the tree sets the rooting.
fn clean_newick(body: &str, name: Option<String>) -> TreeStatement {
    let mut newick = String::with_capacity(body.len() + 1);
    let mut rooted = None;
    let mut in_quote = false;
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_quote = !in_quote;
                newick.push(ch);
            }
            _ if in_quote => newick.push(ch),
            '[' => {
                let comment: String = chars.by_ref().take_while(|&c| c != ']').collect();
                if newick.is_empty() {
                    match comment.trim().to_ascii_uppercase().as_str() {
                        "&R" => rooted = Some(true),
                        "&U" => rooted = Some(false),
                        _ => {}
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => newick.push(c),
        }
    }
    newick.push(';');
    TreeStatement { name, rooted, newick }
}

fn strip_leading_comments(mut s: &str) -> &str {
    loop {
        s = s.trim_start();
        match s.strip_prefix('[').and_then(|rest| rest.split_once(']')) {
            Some((_, rest)) => s = rest,
            None => return s,
        }
    }
}

fn parse_nexus(text: &str) -> TreeDocument {
    let mut document = TreeDocument::default();
    let mut in_trees = false;
    for statement in split_statements(text) {
        let statement = strip_leading_comments(statement);
        let keyword = statement.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
        let rest = &statement[keyword.len().min(statement.len())..];
        match keyword.as_str() {
            "BEGIN" => in_trees = rest.trim().eq_ignore_ascii_case("trees"),
            "END" | "ENDBLOCK" => in_trees = false,
            "TRANSLATE" if in_trees => document.translate.extend(parse_translate(rest)),
            "TREE" | "UTREE" if in_trees => {
                let Some(eq) = find_unbracketed(rest, '=') else {
                    debug!("ignoring tree statement without '='");
                    continue;
                };
                let name = strip_comments(&rest[..eq]);
                let name = name.trim().trim_start_matches('*').trim();
                let name = (!name.is_empty()).then(|| unquote(name));
                document.statements.push(clean_newick(&rest[eq + 1..], name));
            }
            _ => {}
        }
    }
    document
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// `TRANSLATE` entries look like `1 'Homo sapiens',` and are separated by commas.
fn parse_translate(body: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut rest = body;
    loop {
        let end = find_unbracketed(rest, ',').unwrap_or(rest.len());
        let entry = strip_comments(&rest[..end]);
        if let Some((key, label)) = entry.trim().split_once(char::is_whitespace) {
            entries.push((key.to_string(), unquote(label.trim())));
        }
        if end >= rest.len() {
            return entries;
        }
        rest = &rest[end + 1..];
    }
}

/// A NEXUS or Newick tree file read as one aggregation source.
#[derive(Debug, Clone)]
pub struct TreeFile {
    path: PathBuf,
    name: String,
    burnin: usize,
}

impl TreeFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        TreeFile { path, name, burnin: 0 }
    }

    /// Skips the first `burnin` trees of the file.
    pub fn with_burnin(mut self, burnin: usize) -> Self {
        self.burnin = burnin;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> Result<TreeDocument> {
        Ok(TreeDocument::parse(&read_text(&self.path)?))
    }
}

impl TreeSource for TreeFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn trees<'a>(&'a self, registry: &'a TaxonRegistry) -> Result<TreeIter<'a>> {
        let TreeDocument { translate, statements } = self.document()?;
        debug!(source = %self.name, trees = statements.len(), burnin = self.burnin, "opened tree file");
        let trees = statements
            .into_iter()
            .enumerate()
            .skip(self.burnin)
            .map(move |(index, statement)| {
                parse_tree(&statement, &translate, registry).map_err(|err| match err {
                    ConsensusError::InvalidTree(message) => ConsensusError::MalformedTree {
                        source_name: self.name.clone(),
                        index,
                        message,
                    },
                    ConsensusError::Phylo(e) => ConsensusError::MalformedTree {
                        source_name: self.name.clone(),
                        index,
                        message: e.to_string(),
                    },
                    other => other,
                })
            });
        Ok(Box::new(trees))
    }
}

/// Builds the session registry from the first file.
pub fn registry_from_file(file: &TreeFile) -> Result<TaxonRegistry> {
    TaxonRegistry::from_labels(file.document()?.taxa()?)
}

/// Reads the first tree of a file, e.g. the target of support mapping.
pub fn read_first_tree<P: AsRef<Path>>(path: P, registry: &TaxonRegistry) -> Result<TreeGraph> {
    let document = TreeDocument::parse(&read_text(path.as_ref())?);
    let statement = document.statements.first().ok_or_else(|| {
        ConsensusError::InvalidTree(format!("no tree in {}", path.as_ref().display()))
    })?;
    parse_tree(statement, &document.translate, registry)
}

// ============================================================================
// Writing
// ============================================================================

/// Options of the annotated tree writer.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Write annotations as `[&key=value,...]` comments.
    pub annotations: bool,
    /// Wrap the trees in a NEXUS `TREES` block.
    pub nexus: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { annotations: true, nexus: false }
    }
}

/// Quotes labels containing Newick punctuation or whitespace.
fn escape_label(label: &str) -> String {
    if label
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | ':' | '[' | ']' | '\''))
    {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

fn format_value(value: &AnnotationValue) -> String {
    match value {
        AnnotationValue::Float(v) => v.to_string(),
        AnnotationValue::Interval(lo, hi) => format!("{{{lo},{hi}}}"),
    }
}

/// Returns the Newick representation of `tree`, prefixed with its rooting marker and
/// terminated with `;`.
///
/// Internal nodes are labelled with their support value (or their own label), and all
/// annotations go into a BEAST-style comment after the label, e.g.
/// `[&R] ((A:1,B:1)1[&support=1]:0.5,C:1.5);`
///
/// # Errors
/// [`ConsensusError::RegistryMismatch`] if a leaf refers to a taxon the registry lacks.
pub fn to_newick(tree: &TreeGraph, registry: &TaxonRegistry, options: &WriteOptions) -> Result<String> {
    fn build(
        tree: &TreeGraph,
        id: NodeId,
        registry: &TaxonRegistry,
        options: &WriteOptions,
        out: &mut String,
    ) -> Result<()> {
        let node = &tree[id];
        if let Some(taxon) = node.taxon() {
            let label = registry.label(taxon).ok_or_else(|| {
                ConsensusError::RegistryMismatch(format!("no label for taxon {taxon}"))
            })?;
            out.push_str(&escape_label(label));
        } else {
            out.push('(');
            for (i, &child) in node.children().iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                build(tree, child, registry, options, out)?;
            }
            out.push(')');
            match node.annotation(SUPPORT_KEY) {
                Some(support) => out.push_str(&format_value(support)),
                None => {
                    if let Some(label) = node.label() {
                        out.push_str(&escape_label(label));
                    }
                }
            }
        }
        if options.annotations && !node.annotations().is_empty() {
            let annotations = node
                .annotations()
                .iter()
                .map(|(key, value)| format!("{key}={}", format_value(value)))
                .join(",");
            out.push_str("[&");
            out.push_str(&annotations);
            out.push(']');
        }
        if let Some(length) = node.edge_length() {
            out.push(':');
            out.push_str(&length.to_string());
        }
        Ok(())
    }

    let mut out = String::from(if tree.is_rooted() { "[&R] " } else { "[&U] " });
    build(tree, tree.root(), registry, options, &mut out)?;
    out.push(';');
    Ok(out)
}

/// Writes `trees` to `out` as Newick lines or as a NEXUS document.
pub fn write_trees_to<W: Write + ?Sized>(
    out: &mut W,
    trees: &[TreeGraph],
    registry: &TaxonRegistry,
    options: &WriteOptions,
) -> Result<()> {
    if options.nexus {
        writeln!(out, "#NEXUS")?;
        writeln!(out, "Begin taxa;")?;
        writeln!(out, "\tDimensions ntax={};", registry.len())?;
        let labels = registry.labels().iter().map(|l| escape_label(l)).join(" ");
        writeln!(out, "\tTaxlabels {labels};")?;
        writeln!(out, "End;")?;
        writeln!(out, "Begin trees;")?;
    }
    for (i, tree) in trees.iter().enumerate() {
        let newick = to_newick(tree, registry, options)?;
        if options.nexus {
            let name = tree.name().map(escape_label).unwrap_or_else(|| format!("tree_{}", i + 1));
            writeln!(out, "\ttree {name} = {newick}")?;
        } else {
            writeln!(out, "{newick}")?;
        }
    }
    if options.nexus {
        writeln!(out, "End;")?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `trees` to a file (gzip-compressed if the name ends in `.gz`).
pub fn write_trees<P: AsRef<Path>>(
    path: P,
    trees: &[TreeGraph],
    registry: &TaxonRegistry,
    options: &WriteOptions,
) -> Result<()> {
    let mut out = create_output(path)?;
    write_trees_to(&mut out, trees, registry, options)
}

// ============================================================================
// Split tables
// ============================================================================

/// A split table together with the labels its bits refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTable {
    pub taxa: TaxonRegistry,
    pub table: SplitTable,
}

/// Saves a partial table as JSON (gzip-compressed if the name ends in `.gz`).
pub fn save_table<P: AsRef<Path>>(path: P, taxa: &TaxonRegistry, table: &SplitTable) -> Result<()> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        taxa: &'a TaxonRegistry,
        table: &'a SplitTable,
    }
    let mut out = create_output(path)?;
    serde_json::to_writer(&mut out, &Borrowed { taxa, table })?;
    out.flush()?;
    Ok(())
}

/// Loads a table written by [`save_table`].
///
/// # Errors
/// [`ConsensusError::RegistryMismatch`] if the stored labels do not match the table width.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<SavedTable> {
    let saved: SavedTable = serde_json::from_str(&read_text(path)?)?;
    if saved.taxa.len() != saved.table.num_taxa() {
        return Err(ConsensusError::RegistryMismatch(format!(
            "saved table has {} taxa but lists {} labels",
            saved.table.num_taxa(),
            saved.taxa.len()
        )));
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TableOptions;
    use crate::splits::{SplitEncoder, SplitMode};
    use crate::table::SplitTable;

    const BEAST: &str = "#NEXUS

Begin taxa;
\tDimensions ntax=4;
\tTaxlabels Kea Kaka Kakapo Kiwi;
End;

Begin trees;
\tTranslate
\t\t1 Kiwi,
\t\t2 Kea,
\t\t3 'Kaka',
\t\t4 Kakapo
\t\t;
tree STATE_0 [&lnP=-3000.5] = [&R] ((2:[&rate=0.1]1.0,3:1.0):1.0,(1:1.5,4:1.5):0.5);
tree STATE_1000 = [&R] ((1:1.0,2:1.0):1.0,(3:1.5,4:1.5):0.5);
End;
";

    fn bits(idx: &[usize]) -> crate::bitset::Bitset {
        let mut bs = crate::bitset::Bitset::zeros(1);
        idx.iter().for_each(|&i| bs.set(i));
        bs
    }

    #[test]
    fn test_clean_newick_strips_comments() {
        let statement = clean_newick(" [&R] ((A:[&rate=0.1]1.0, B:1.0)[&posterior=1]:2,C:3)", None);
        assert_eq!(statement.rooted, Some(true));
        assert_eq!(statement.newick, "((A:1.0,B:1.0):2,C:3);");

        let quoted = clean_newick("('Homo sapiens':1,B:2)", None);
        assert_eq!(quoted.rooted, None);
        assert_eq!(quoted.newick, "('Homo sapiens':1,B:2);");
    }

    #[test]
    fn test_nexus_document() {
        let document = TreeDocument::parse(BEAST);
        assert_eq!(document.statements.len(), 2);
        assert_eq!(document.statements[0].name.as_deref(), Some("STATE_0"));
        assert_eq!(document.translate.get("3").map(String::as_str), Some("Kaka"));
        assert_eq!(document.taxa().unwrap(), vec!["Kaka", "Kakapo", "Kea", "Kiwi"]);
    }

    #[test]
    fn test_parse_tree_maps_translated_labels() {
        let document = TreeDocument::parse(BEAST);
        let registry = TaxonRegistry::from_labels(document.taxa().unwrap()).unwrap();
        let tree = parse_tree(&document.statements[0], &document.translate, &registry).unwrap();
        assert!(tree.is_rooted());
        assert_eq!(tree.name(), Some("STATE_0"));
        assert_eq!(tree.num_leaves(), 4);

        // Kea (2) and Kaka (3) form a clade: registry indices 2 and 0
        let encoded = SplitEncoder::new(4, SplitMode::Rooted).encode(&tree).unwrap();
        let mut clades: Vec<_> = encoded.informative_edges().map(|e| e.split.clone()).collect();
        clades.sort();
        assert_eq!(clades, vec![bits(&[0, 2]), bits(&[1, 3])]);
    }

    #[test]
    fn test_plain_newick_and_unknown_taxa() {
        let document = TreeDocument::parse("(A:1,B:1,(C:1,D:1):1);\n[&U] ((A,C),B,D);\n");
        assert_eq!(document.statements.len(), 2);
        assert_eq!(document.statements[1].rooted, Some(false));

        let registry = TaxonRegistry::from_labels(["A", "B", "C"]).unwrap();
        let err = parse_tree(&document.statements[0], &document.translate, &registry).unwrap_err();
        assert!(matches!(err, ConsensusError::RegistryMismatch(_)));
    }

    #[test]
    fn test_unmarked_trees_are_unrooted_at_any_root_degree() {
        let document = TreeDocument::parse("(A:1,B:1,(C:1,D:1):1);\n((A:1,B:1):1,(C:1,D:1):1);\n");
        let registry = TaxonRegistry::from_labels(document.taxa().unwrap()).unwrap();
        let trees: Vec<TreeGraph> = document
            .statements
            .iter()
            .map(|s| parse_tree(s, &document.translate, &registry).unwrap())
            .collect();
        assert!(trees.iter().all(|t| !t.is_rooted()));

        let table = SplitTable::from_trees(4, TableOptions::default(), trees.iter()).unwrap();
        assert_eq!(table.trees(), 2);
        assert_eq!(table.mode(), Some(SplitMode::Unrooted));
        assert_eq!(table.frequency(&bits(&[2, 3])), 1.0);
        assert_eq!(table.get(&bits(&[2, 3])).unwrap().lengths().mean(), Some(1.5));
    }

    #[test]
    fn test_newick_writer() {
        let registry = TaxonRegistry::from_labels(["A", "B", "Homo sapiens"]).unwrap();
        let mut tree = TreeGraph::new(true);
        let ab = tree.add_child(TreeGraph::ROOT, Some(0.5)).unwrap();
        tree.add_leaf(ab, 0, Some(1.0)).unwrap();
        tree.add_leaf(ab, 1, Some(1.0)).unwrap();
        tree.add_leaf(TreeGraph::ROOT, 2, Some(1.5)).unwrap();
        tree[ab].annotate(SUPPORT_KEY, 0.75);
        tree[ab].annotate("length_range", (0.25, 0.75));

        let newick = to_newick(&tree, &registry, &WriteOptions::default()).unwrap();
        assert_eq!(
            newick,
            "[&R] ((A:1,B:1)0.75[&length_range={0.25,0.75},support=0.75]:0.5,'Homo sapiens':1.5);"
        );

        let plain = WriteOptions { annotations: false, ..Default::default() };
        assert_eq!(
            to_newick(&tree, &registry, &plain).unwrap(),
            "[&R] ((A:1,B:1)0.75:0.5,'Homo sapiens':1.5);"
        );
    }
}
