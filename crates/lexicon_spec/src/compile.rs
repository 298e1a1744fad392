//! Build-time infrastructure for compiling the TOML lexicon.
//!
//! Gated behind the `compile` feature. The consuming crate's build script
//! reads the lexicon source, expands it, and emits two files into `OUT_DIR`:
//! a postcard blob holding the [`ExpandedLexicon`] and a Rust source file of
//! nested modules exposing one `ID` constant per tag.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use crate::{DeclSpec, ExpandedLexicon, LexiconSpec, expand, lexicon_header};

/// Table key holding the types of the enclosing tag.
pub const TYPE_KEY: &str = "@type";

/// Errors raised while reading lexicon source.
#[derive(Debug, Error)]
pub enum SourceError {
	/// Error parsing TOML syntax.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A key other than `@type` held a non-table value.
	#[error("'{id}' must be a table")]
	NotATable {
		/// Dotted path of the offending key.
		id: String,
	},

	/// `@type` was neither a string nor an array of strings.
	#[error("'{id}' has a malformed {TYPE_KEY}")]
	MalformedType {
		/// Dotted path of the declaring tag.
		id: String,
	},
}

/// Paths a lexicon build script reads from and writes to, taken from the
/// environment cargo gives build scripts.
pub struct LexiconBuild {
	pub manifest_dir: PathBuf,
	pub out_dir: PathBuf,
}

impl LexiconBuild {
	pub fn from_env() -> Self {
		let var = |name: &str| PathBuf::from(std::env::var_os(name).unwrap_or_else(|| panic!("{name} is set by cargo")));
		Self {
			manifest_dir: var("CARGO_MANIFEST_DIR"),
			out_dir: var("OUT_DIR"),
		}
	}

	/// Compiles the lexicon source at `rel`, relative to the manifest, into
	/// `lexicon.bin` and `lexicon.rs` in `OUT_DIR`.
	pub fn compile(&self, rel: &str) {
		let path = self.manifest_dir.join(rel);
		println!("cargo:rerun-if-changed={}", path.display());

		let content = fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
		let spec = parse_lexicon(&content).unwrap_or_else(|e| panic!("failed to parse lexicon {}: {e}", path.display()));
		let lexicon = expand(&spec).unwrap_or_else(|e| panic!("invalid lexicon {}: {e}", path.display()));

		self.write_lexicon("lexicon.bin", &lexicon);
		self.write_out("lexicon.rs", generate_constants(&lexicon).as_bytes());
	}

	/// Writes `lexicon` framed by [`lexicon_header`].
	fn write_lexicon(&self, filename: &str, lexicon: &ExpandedLexicon) {
		let blob = postcard::to_extend(lexicon, lexicon_header().to_vec()).expect("failed to encode lexicon");
		self.write_out(filename, &blob);
	}

	fn write_out(&self, filename: &str, contents: &[u8]) {
		let path = self.out_dir.join(filename);
		fs::write(&path, contents).unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
	}
}

/// Parses lexicon TOML. Every table is a tag and nesting is the dotted path.
pub fn parse_lexicon(source: &str) -> Result<LexiconSpec, SourceError> {
	let table: toml::Table = toml::from_str(source)?;
	let mut spec = LexiconSpec::new();
	collect("", &table, &mut spec.tags)?;
	Ok(spec)
}

fn collect(prefix: &str, table: &toml::Table, out: &mut Vec<DeclSpec>) -> Result<(), SourceError> {
	for (key, value) in table {
		if key == TYPE_KEY {
			continue;
		}
		let id = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
		let toml::Value::Table(child) = value else {
			return Err(SourceError::NotATable { id });
		};
		let types = match child.get(TYPE_KEY) {
			None => Vec::new(),
			Some(toml::Value::String(ty)) => vec![ty.clone()],
			Some(toml::Value::Array(items)) => items
				.iter()
				.map(|item| item.as_str().map(str::to_owned))
				.collect::<Option<Vec<_>>>()
				.ok_or_else(|| SourceError::MalformedType { id: id.clone() })?,
			Some(_) => return Err(SourceError::MalformedType { id }),
		};
		out.push(DeclSpec { id: id.clone(), types });
		collect(&id, child, out)?;
	}
	Ok(())
}

const KEYWORDS: &[&str] = &[
	"abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if",
	"impl", "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return", "static", "struct", "trait", "true", "try", "type",
	"typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

const RESERVED: &[&str] = &["self", "super", "crate", "_"];

/// Rust identifier for a tag segment; keywords become raw identifiers.
pub fn module_ident(name: &str) -> Option<String> {
	if RESERVED.contains(&name) {
		return None;
	}
	Some(if KEYWORDS.contains(&name) { format!("r#{name}") } else { name.to_owned() })
}

/// Renders one nested module per tag with an `ID` constant naming its index.
pub fn generate_constants(lexicon: &ExpandedLexicon) -> String {
	let mut children = vec![Vec::new(); lexicon.len()];
	let mut roots = Vec::new();
	for (index, node) in lexicon.nodes.iter().enumerate() {
		match node.parent {
			Some(parent) => children[parent as usize].push(index),
			None => roots.push(index),
		}
	}

	let mut out = String::from("// @generated by namespace-lexicon-spec from the lexicon source.\n");
	for root in roots {
		emit(lexicon, &children, root, 0, &mut out);
	}
	out
}

fn emit(lexicon: &ExpandedLexicon, children: &[Vec<usize>], index: usize, depth: usize, out: &mut String) {
	let node = &lexicon.nodes[index];
	let ident = module_ident(&node.name).unwrap_or_else(|| panic!("tag '{}' uses a reserved segment", node.id));
	let indent = "\t".repeat(depth);

	let _ = writeln!(out, "{indent}/// `{}`", node.id);
	let _ = writeln!(out, "{indent}pub mod {ident} {{");
	let _ = writeln!(out, "{indent}\tpub const ID: crate::TagId = crate::TagId::new({index});");
	for &child in &children[index] {
		emit(lexicon, children, child, depth + 1, out);
	}
	let _ = writeln!(out, "{indent}}}");
}
