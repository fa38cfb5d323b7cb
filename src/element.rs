//! Generic element and encoding model.
//!
//! An [`Element`] is either a singleton nonzero or an instance of a
//! geometric pattern (a run of nonzeros following a fixed coordinate rule).
//! [`Encoding`] names the rule; [`Encoding::id`]/[`pattern_id`] give the
//! dense small-integer naming used by the CSX byte stream and the
//! kernel-specialization table.

use crate::error::Error;
use crate::Value;

/// Offset applied when packing `(encoding_tag, delta_or_size)` into a
/// single dense pattern id: `id = enc_tag * PATT_OFFSET + second`.
pub const PATT_OFFSET: u64 = 1 << 32;

/// Smallest / largest variable dimension accepted for a block encoding.
pub const BLOCK_MIN: u8 = 2;
pub const BLOCK_MAX: u8 = 8;

/// The coordinate-transform family a run of nonzeros follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
    /// No pattern: a run of unrelated singletons ("delta unit"). Reserved
    /// pattern id 0.
    None,
    Horiz,
    Vert,
    Diag,
    AntiDiag,
    BlockRow(u8),
    BlockCol(u8),
}

impl Encoding {
    /// Ordinal used as the high bits of a dense pattern id, and as the
    /// tie-break order in C5 step 3 ("smaller enc ordinal").
    fn tag(self) -> u64 {
        match self {
            Encoding::None => 0,
            Encoding::Horiz => 1,
            Encoding::Vert => 2,
            Encoding::Diag => 3,
            Encoding::AntiDiag => 4,
            Encoding::BlockRow(_) => 5,
            Encoding::BlockCol(_) => 6,
        }
    }

    /// Second component of the pattern-id pair: `delta` for the 1-D
    /// encodings, block width for the block encodings, 0 otherwise.
    fn second(self) -> u64 {
        match self {
            Encoding::BlockRow(k) | Encoding::BlockCol(k) => k as u64,
            _ => 0,
        }
    }

    /// Whether this encoding stores a fixed geometric stride (1-D) rather
    /// than a variable block dimension.
    pub fn is_block(self) -> bool {
        matches!(self, Encoding::BlockRow(_) | Encoding::BlockCol(_))
    }

    /// True delta-based (1-D, non-block, non-`None`) encodings.
    pub fn is_delta_1d(self) -> bool {
        matches!(
            self,
            Encoding::Horiz | Encoding::Vert | Encoding::Diag | Encoding::AntiDiag
        )
    }

    /// Parses one short name token (`h`, `v`, `d`, `ad`, `brK`, `bcK`) into
    /// a concrete encoding. Wildcards (`br`, `bc`, `all`) are handled by
    /// [`EncodingSeq::parse`], not here, since they expand to multiple
    /// concrete encodings.
    fn parse_atom(name: &str) -> Result<Encoding, Error> {
        match name {
            "h" => Ok(Encoding::Horiz),
            "v" => Ok(Encoding::Vert),
            "d" => Ok(Encoding::Diag),
            "ad" => Ok(Encoding::AntiDiag),
            _ if name.starts_with("br") => {
                let k: u8 = name[2..]
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("bad block-row name {name:?}")))?;
                if !(BLOCK_MIN..=BLOCK_MAX).contains(&k) {
                    return Err(Error::InvalidConfig(format!(
                        "block-row width {k} out of range [{BLOCK_MIN}, {BLOCK_MAX}]"
                    )));
                }
                Ok(Encoding::BlockRow(k))
            }
            _ if name.starts_with("bc") => {
                let k: u8 = name[2..]
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("bad block-col name {name:?}")))?;
                if !(BLOCK_MIN..=BLOCK_MAX).contains(&k) {
                    return Err(Error::InvalidConfig(format!(
                        "block-col width {k} out of range [{BLOCK_MIN}, {BLOCK_MAX}]"
                    )));
                }
                Ok(Encoding::BlockCol(k))
            }
            other => Err(Error::InvalidConfig(format!("unknown encoding name {other:?}"))),
        }
    }

    /// Every atom, used to expand the `all` wildcard.
    pub fn all_atoms() -> Vec<Encoding> {
        let mut v = vec![Encoding::Horiz, Encoding::Vert, Encoding::Diag, Encoding::AntiDiag];
        for k in BLOCK_MIN..=BLOCK_MAX {
            v.push(Encoding::BlockRow(k));
        }
        for k in BLOCK_MIN..=BLOCK_MAX {
            v.push(Encoding::BlockCol(k));
        }
        v
    }
}

/// Pairs an [`Encoding`] with its delta (1-D) or implicit in `Encoding`
/// (block), and gives the dense, per-build small integer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId {
    pub encoding: Encoding,
    pub delta: u64,
}

impl PatternId {
    pub fn new(encoding: Encoding, delta: u64) -> Self {
        Self { encoding, delta }
    }

    pub fn none() -> Self {
        Self { encoding: Encoding::None, delta: 0 }
    }

    /// `enc_tag * PATT_OFFSET + second`. For block encodings `second` is
    /// folded into `Encoding::tag`'s associated width already, so `delta`
    /// is ignored there.
    pub fn dense_id(self) -> u64 {
        let second = if self.encoding.is_block() {
            self.encoding.second()
        } else {
            self.delta
        };
        self.encoding.tag() * PATT_OFFSET + second
    }

    pub fn is_none(self) -> bool {
        self.encoding == Encoding::None
    }
}

/// The "name" half of a parsed sequence item: either a concrete encoding
/// or one of the three wildcards, which stay unexpanded until the
/// encoding manager consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqName {
    Atom(Encoding),
    /// `br` wildcard; `params` (if any) are the block widths to use,
    /// otherwise the full `br2..br8` range (the automatic-search default).
    BlockRows,
    /// `bc` wildcard, symmetric to `BlockRows`.
    BlockCols,
    /// `all` wildcard: every atom in [`Encoding::all_atoms`].
    All,
}

/// One item of an encoding sequence: a name/wildcard plus its bracketed
/// parameter list (deltas for atoms, block widths for `br`/`bc`, ignored
/// for `all`) — e.g. `"h,br{2,3},all"` parses to
/// `(H, []), (BR, [2,3]), (All, [])`. Wildcards are *not* expanded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqItem {
    pub name: SeqName,
    pub params: Vec<u64>,
}

impl SeqItem {
    /// Expands this item to concrete `(Encoding, deltas)` candidates for
    /// the encoding manager's explicit-sequence mode (§4.5).
    pub fn expand(&self) -> Vec<(Encoding, Vec<u64>)> {
        match self.name {
            SeqName::Atom(enc) => vec![(enc, self.params.clone())],
            SeqName::BlockRows => {
                if self.params.is_empty() {
                    (BLOCK_MIN..=BLOCK_MAX).map(|k| (Encoding::BlockRow(k), Vec::new())).collect()
                } else {
                    self.params
                        .iter()
                        .filter(|&&k| (BLOCK_MIN as u64..=BLOCK_MAX as u64).contains(&k))
                        .map(|&k| (Encoding::BlockRow(k as u8), Vec::new()))
                        .collect()
                }
            }
            SeqName::BlockCols => {
                if self.params.is_empty() {
                    (BLOCK_MIN..=BLOCK_MAX).map(|k| (Encoding::BlockCol(k), Vec::new())).collect()
                } else {
                    self.params
                        .iter()
                        .filter(|&&k| (BLOCK_MIN as u64..=BLOCK_MAX as u64).contains(&k))
                        .map(|&k| (Encoding::BlockCol(k as u8), Vec::new()))
                        .collect()
                }
            }
            SeqName::All => Encoding::all_atoms().into_iter().map(|e| (e, Vec::new())).collect(),
        }
    }
}

/// A parsed `preproc.xform`-style sequence, e.g. `"h,br{2,3},all"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodingSeq {
    pub items: Vec<SeqItem>,
}

impl EncodingSeq {
    /// Parses a comma-separated sequence string. Wildcards are kept as
    /// such (not expanded) so the parsed structure matches the sequence
    /// the caller wrote; expansion happens when the encoding manager
    /// consumes an item.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let mut items = Vec::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (name, params) = split_braces(token)?;
            let seq_name = match name {
                "br" => SeqName::BlockRows,
                "bc" => SeqName::BlockCols,
                "all" => SeqName::All,
                other => SeqName::Atom(Encoding::parse_atom(other)?),
            };
            items.push(SeqItem { name: seq_name, params });
        }
        Ok(Self { items })
    }
}

/// Splits `"name{1,2,3}"` into `("name", [1,2,3])`; `"name"` alone yields
/// an empty delta list.
fn split_braces(token: &str) -> Result<(&str, Vec<u64>), Error> {
    match token.find('{') {
        None => Ok((token, Vec::new())),
        Some(open) => {
            if !token.ends_with('}') {
                return Err(Error::InvalidConfig(format!("malformed sequence token {token:?}")));
            }
            let name = &token[..open];
            let inner = &token[open + 1..token.len() - 1];
            let deltas = inner
                .split(',')
                .map(|d| {
                    d.trim()
                        .parse::<u64>()
                        .map_err(|_| Error::InvalidConfig(format!("bad delta in {token:?}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((name, deltas))
        }
    }
}

/// Marks whether an element participates in a pattern, used transiently
/// during encoding and not persisted in CSX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Not part of any pattern (a plain singleton / delta-unit member).
    None,
    /// First element of a pattern run.
    PatternStart,
    /// Non-first element of a pattern run.
    PatternInterior,
}

/// A single matrix entry: a singleton nonzero, or an instance of a
/// pattern run.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub row: usize,
    pub col: usize,
    values: Vec<Value>,
    encoding: Encoding,
    delta: u64,
    pub marker: Marker,
}

impl Element {
    pub fn new_singleton(row: usize, col: usize, value: Value) -> Self {
        Self {
            row,
            col,
            values: vec![value],
            encoding: Encoding::None,
            delta: 0,
            marker: Marker::None,
        }
    }

    /// `values.len() == size >= 2` is enforced.
    pub fn new_pattern(row: usize, col: usize, values: Vec<Value>, encoding: Encoding, delta: u64) -> Self {
        debug_assert!(values.len() >= 2, "pattern element must have size >= 2");
        debug_assert!(encoding != Encoding::None, "pattern element needs a real encoding");
        Self { row, col, values, encoding, delta, marker: Marker::None }
    }

    pub fn is_pattern(&self) -> bool {
        self.encoding != Encoding::None
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn delta(&self) -> u64 {
        self.delta
    }

    pub fn pattern_id(&self) -> PatternId {
        if self.is_pattern() {
            PatternId::new(self.encoding, self.delta)
        } else {
            PatternId::none()
        }
    }

    /// Only changes `(row, col)`; the payload (values/encoding/delta) is
    /// untouched.
    pub fn transform(&mut self, new_coords: (usize, usize)) {
        self.row = new_coords.0;
        self.col = new_coords.1;
    }
}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Element {}

impl Ord for Element {
    /// Lex order by `(row, col)`; singletons and pattern-starts compare by
    /// starting coordinate.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_id_none_is_zero() {
        assert_eq!(PatternId::none().dense_id(), 0);
    }

    #[test]
    fn parses_simple_sequence() {
        // "h,br{2,3},all" -> [(H, []), (BR, [2,3]), (All, [])]
        let seq = EncodingSeq::parse("h,br{2,3},all").unwrap();
        assert_eq!(seq.items.len(), 3);
        assert_eq!(seq.items[0].name, SeqName::Atom(Encoding::Horiz));
        assert!(seq.items[0].params.is_empty());
        assert_eq!(seq.items[1].name, SeqName::BlockRows);
        assert_eq!(seq.items[1].params, vec![2, 3]);
        assert_eq!(seq.items[2].name, SeqName::All);
        assert!(seq.items[2].params.is_empty());
    }

    #[test]
    fn block_rows_wildcard_expands_to_requested_widths() {
        let seq = EncodingSeq::parse("br{2,3}").unwrap();
        let expanded = seq.items[0].expand();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].0, Encoding::BlockRow(2));
        assert_eq!(expanded[1].0, Encoding::BlockRow(3));
    }

    #[test]
    fn unknown_name_is_invalid_config() {
        assert!(matches!(EncodingSeq::parse("zz"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn block_width_out_of_range_rejected() {
        assert!(EncodingSeq::parse("br9").is_err());
        assert!(EncodingSeq::parse("br1").is_err());
    }

    #[test]
    fn lex_order_by_row_then_col() {
        let a = Element::new_singleton(0, 5, 1.0);
        let b = Element::new_singleton(1, 0, 2.0);
        assert!(a < b);
    }
}
