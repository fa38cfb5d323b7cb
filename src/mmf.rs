//! Matrix Market file parsing: the on-disk input format, read into a
//! [`CsrMatrix`] before partitioning.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::csr::CsrMatrix;
use crate::error::Error;
use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Real,
    Double,
    Integer,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symmetry {
    General,
    Symmetric,
}

/// Whether entry coordinates in the body are 0- or 1-based. The banner's
/// trailing `0-base`/`1-base` token overrides the Matrix Market default of
/// 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Indexing {
    ZeroBase,
    OneBase,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    field: Field,
    symmetry: Symmetry,
    indexing: Indexing,
}

pub fn read_file(path: &Path) -> Result<CsrMatrix, Error> {
    let file = std::fs::File::open(path).map_err(|e| Error::FileOpen { path: path.display().to_string(), source: e })?;
    read(BufReader::new(file), path)
}

fn read<R: Read>(reader: BufReader<R>, path: &Path) -> Result<CsrMatrix, Error> {
    let path_str = path.display().to_string();
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| Error::BadArchive("empty Matrix Market file".into()))?
        .map_err(|e| Error::FileRead { path: path_str.clone(), source: e })?;
    let header = parse_header(&header)?;
    let Header { field, symmetry, indexing } = header;

    let mut dims: Option<(usize, usize, usize)> = None;
    let mut triples = Vec::new();

    for line in lines {
        let line = line.map_err(|e| Error::FileRead { path: path_str.clone(), source: e })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        if dims.is_none() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(Error::BadArchive(format!("malformed dimension line {line:?}")));
            }
            let parse = |s: &str| -> Result<usize, Error> {
                s.parse().map_err(|_| Error::BadArchive(format!("bad dimension {s:?}")))
            };
            dims = Some((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?));
            triples.reserve(dims.unwrap().2);
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let expected = if field == Field::Pattern { 2 } else { 3 };
        if parts.len() != expected {
            return Err(Error::BadArchive(format!("malformed entry line {line:?}")));
        }
        let mut row: usize = parts[0].parse().map_err(|_| Error::BadArchive(format!("bad row in {line:?}")))?;
        let mut col: usize = parts[1].parse().map_err(|_| Error::BadArchive(format!("bad col in {line:?}")))?;
        if indexing == Indexing::ZeroBase {
            row += 1;
            col += 1;
        }
        let value: Value = match field {
            Field::Pattern => 1.0,
            Field::Real | Field::Double | Field::Integer => {
                parts[2].parse().map_err(|_| Error::BadArchive(format!("bad value in {line:?}")))?
            }
        };
        triples.push((row, col, value));
        if symmetry == Symmetry::Symmetric && row != col {
            triples.push((col, row, value));
        }
    }

    let (nr_rows, nr_cols, _nnz) = dims.ok_or_else(|| Error::BadArchive("missing dimension line".into()))?;
    CsrMatrix::from_triples(nr_rows, nr_cols, triples)
}

fn parse_header(line: &str) -> Result<Header, Error> {
    let tokens: Vec<&str> = line.split_whitespace().map(|t| t.trim_start_matches('%')).collect();
    if tokens.first().map(|t| t.to_lowercase()) != Some("matrixmarket".into()) {
        return Err(Error::BadArchive("missing %%MatrixMarket banner".into()));
    }
    if tokens.get(1).map(|t| t.to_lowercase()) != Some("matrix".into()) {
        return Err(Error::BadArchive("only the \"matrix\" object type is supported".into()));
    }
    if tokens.get(2).map(|t| t.to_lowercase()) != Some("coordinate".into()) {
        return Err(Error::BadArchive("only the \"coordinate\" format is supported".into()));
    }
    let field = match tokens.get(3).map(|t| t.to_lowercase()).as_deref() {
        Some("real") | None => Field::Real,
        Some("double") => Field::Double,
        Some("integer") => Field::Integer,
        Some("pattern") => Field::Pattern,
        Some(other) => return Err(Error::BadArchive(format!("unsupported field type {other:?}"))),
    };
    let symmetry = match tokens.get(4).map(|t| t.to_lowercase()).as_deref() {
        Some("general") | None => Symmetry::General,
        Some("symmetric") => Symmetry::Symmetric,
        Some(other) => return Err(Error::BadArchive(format!("unsupported symmetry {other:?}"))),
    };
    // Trailing tokens beyond the symmetry field are an unordered mix of an
    // indexing-base marker and a row/column traversal-order marker. The
    // traversal-order marker doesn't affect parsing here (every entry line
    // is read the same way regardless), so only the indexing base is kept.
    let mut indexing = Indexing::OneBase;
    for tok in tokens.iter().skip(5) {
        match tok.to_lowercase().as_str() {
            "0-base" => indexing = Indexing::ZeroBase,
            "1-base" => indexing = Indexing::OneBase,
            "row" | "column" => {}
            other => return Err(Error::BadArchive(format!("unsupported header token {other:?}"))),
        }
    }
    Ok(Header { field, symmetry, indexing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_str(s: &str) -> Result<CsrMatrix, Error> {
        read(BufReader::new(Cursor::new(s.as_bytes().to_vec())), Path::new("<mem>"))
    }

    #[test]
    fn parses_general_real_matrix() {
        let mmf = "%%MatrixMarket matrix coordinate real general\n\
                   % comment\n\
                   2 2 2\n\
                   1 1 2.0\n\
                   2 2 3.0\n";
        let csr = parse_str(mmf).unwrap();
        assert_eq!(csr.nnz(), 2);
        assert_eq!(csr.nr_rows(), 2);
    }

    #[test]
    fn mirrors_symmetric_off_diagonal_entries() {
        let mmf = "%%MatrixMarket matrix coordinate real symmetric\n\
                   3 3 2\n\
                   1 2 5.0\n\
                   3 3 1.0\n";
        let csr = parse_str(mmf).unwrap();
        assert_eq!(csr.nnz(), 3);
        let (cols, vals) = csr.row(1);
        assert_eq!(cols, &[1]);
        assert_eq!(vals, &[5.0]);
    }

    #[test]
    fn pattern_entries_default_to_one() {
        let mmf = "%%MatrixMarket matrix coordinate pattern general\n\
                   2 2 1\n\
                   1 1\n";
        let csr = parse_str(mmf).unwrap();
        let (_, vals) = csr.row(0);
        assert_eq!(vals, &[1.0]);
    }

    #[test]
    fn rejects_missing_banner() {
        assert!(parse_str("not a matrix market file\n1 1 1\n1 1 1.0\n").is_err());
    }

    #[test]
    fn double_field_parses_like_real() {
        let mmf = "%%MatrixMarket matrix coordinate double general\n\
                   2 2 1\n\
                   1 1 4.5\n";
        let csr = parse_str(mmf).unwrap();
        let (_, vals) = csr.row(0);
        assert_eq!(vals, &[4.5]);
    }

    #[test]
    fn zero_base_token_shifts_coordinates_to_one_based() {
        let mmf = "%%MatrixMarket matrix coordinate real general 0-base\n\
                   2 2 1\n\
                   0 0 4.5\n";
        let csr = parse_str(mmf).unwrap();
        let (cols, vals) = csr.row(0);
        assert_eq!(cols, &[1]);
        assert_eq!(vals, &[4.5]);
    }

    #[test]
    fn row_column_token_is_accepted_without_effect() {
        let mmf = "%%MatrixMarket matrix coordinate real general 1-base row\n\
                   2 2 1\n\
                   1 1 2.0\n";
        assert!(parse_str(mmf).is_ok());
    }
}
