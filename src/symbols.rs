//! Replace Ensembl gene identifiers of an expression matrix with gene symbols
//! taken from a BioMart export.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::info;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::io::{create_writer, open_reader};

pub const GENE_ID_COLUMN: &str = "Geneid";
pub const SYMBOL_COLUMN: &str = "Symbol";
pub const MART_ID_COLUMN: &str = "Gene stable ID";
pub const MART_NAME_COLUMN: &str = "Gene name";

fn column_index(headers: &StringRecord, column: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == column).ok_or_else(|| {
        Error::Config(format!("{} has no \"{}\" column", path.display(), column))
    })
}

/// Gene identifier to symbols, deduplicated, in first-seen order.
#[derive(Debug, Default)]
pub struct SymbolMap {
    symbols: FxHashMap<String, Vec<String>>,
}

impl SymbolMap {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seen = FxHashSet::default();
        let mut symbols: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (id, name) in pairs {
            if seen.insert((id.clone(), name.clone())) {
                symbols.entry(id).or_default().push(name);
            }
        }
        SymbolMap { symbols }
    }

    /// Load the `Gene stable ID` / `Gene name` columns of a BioMart table.
    pub fn from_mart(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(open_reader(path)?);
        let headers = reader.headers()?.clone();
        let id_col = column_index(&headers, MART_ID_COLUMN, path)?;
        let name_col = column_index(&headers, MART_NAME_COLUMN, path)?;

        let mut pairs = Vec::new();
        for row in reader.records() {
            let row = row?;
            let id = row.get(id_col).unwrap_or("").to_string();
            let name = row.get(name_col).unwrap_or("").to_string();
            pairs.push((id, name));
        }
        Ok(SymbolMap::from_pairs(pairs))
    }

    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.symbols.get(id).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Left-join an expression matrix with the symbol map. Writes `Symbol` in
/// front of the original columns and returns the number of rows written.
/// Unmapped genes get an empty symbol; a gene with several symbols is written
/// once per symbol.
pub fn convert_symbols(input: &Path, map: &SymbolMap, output: &Path) -> Result<usize> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(open_reader(input)?);
    let headers = reader.headers()?.clone();
    let id_col = column_index(&headers, GENE_ID_COLUMN, input)?;

    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(create_writer(output)?);

    let mut out_headers = StringRecord::new();
    out_headers.push_field(SYMBOL_COLUMN);
    out_headers.extend(headers.iter());
    writer.write_record(&out_headers)?;

    let unmapped = [String::new()];
    let mut rows = 0usize;
    let mut out_row = StringRecord::new();
    for row in reader.records() {
        let row = row?;
        let id = row.get(id_col).unwrap_or("");
        let symbols = map.get(id).unwrap_or(&unmapped[..]);
        for symbol in symbols {
            out_row.clear();
            out_row.push_field(symbol);
            out_row.extend(row.iter());
            writer.write_record(&out_row)?;
            rows += 1;
        }
    }
    writer
        .into_inner()
        .map_err(|e| Error::file_io(output, e.into_error()))?
        .finish()
        .map_err(|e| Error::file_io(output, e))?;
    Ok(rows)
}

/// Read the BioMart table, convert the matrix and log progress.
pub fn run(input: &Path, mart: &Path, output: &Path) -> Result<usize> {
    info!("Reading BioMart mapping from {}", mart.display());
    let map = SymbolMap::from_mart(mart)?;
    info!("Loaded symbols for {} gene identifiers", map.len());

    info!("Converting expression matrix {}", input.display());
    let rows = convert_symbols(input, &map, output)?;
    info!("Done, {} genes written to {}", rows, output.display());
    Ok(rows)
}
