use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the listing table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring the common spreadsheet dtypes.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Coerce the cell to a finite `f64`.
    ///
    /// Text is parsed after trimming; anything unparsable, empty or
    /// non-finite yields `None`. Booleans are not numbers here.
    pub fn to_number(&self) -> Option<f64> {
        let v = match self {
            CellValue::Integer(i) => *i as f64,
            CellValue::Float(v) => *v,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Bool(_) | CellValue::Null => return None,
        };
        v.is_finite().then_some(v)
    }

    /// The textual label of the cell, used for categorical lookups.
    pub fn label(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Text(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

// ---------------------------------------------------------------------------
// ListingTable – the complete loaded table
// ---------------------------------------------------------------------------

/// One row of the source table: column name → value.
pub type Row = BTreeMap<String, CellValue>;

/// A loaded table of listings, one row per listing.
#[derive(Debug, Clone, Default)]
pub struct ListingTable {
    /// Column names in file order.
    pub column_names: Vec<String>,
    /// All rows.
    pub rows: Vec<Row>,
}

impl ListingTable {
    pub fn new(column_names: Vec<String>, rows: Vec<Row>) -> Self {
        ListingTable { column_names, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_names.iter().any(|c| c == name)
    }

    /// Iterate one column; rows lacking the column yield `Null`.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CellValue> + 'a {
        static NULL: CellValue = CellValue::Null;
        self.rows.iter().map(move |r| r.get(name).unwrap_or(&NULL))
    }
}

// ---------------------------------------------------------------------------
// Observations – the cleaned, fully numeric pair of columns
// ---------------------------------------------------------------------------

/// Predictor/outcome pairs ready for model fitting.
///
/// Invariant: `predictor` and `outcome` have equal length and hold only
/// finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    pub predictor_name: String,
    pub outcome_name: String,
    pub predictor: Vec<f64>,
    pub outcome: Vec<f64>,
}

impl Observations {
    pub fn len(&self) -> usize {
        self.predictor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictor.is_empty()
    }

    /// Arithmetic mean of the outcome.
    pub fn outcome_mean(&self) -> f64 {
        if self.outcome.is_empty() {
            return f64::NAN;
        }
        self.outcome.iter().sum::<f64>() / self.outcome.len() as f64
    }

    /// Sample variance of the outcome (n - 1 denominator).
    pub fn outcome_variance(&self) -> f64 {
        let n = self.outcome.len();
        if n < 2 {
            return f64::NAN;
        }
        let mean = self.outcome_mean();
        self.outcome.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    }

    /// Largest predictor value, `None` when empty.
    pub fn predictor_max(&self) -> Option<f64> {
        self.predictor.iter().copied().reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_text_and_rejects_junk() {
        assert_eq!(CellValue::Text(" 12 ".into()).to_number(), Some(12.0));
        assert_eq!(CellValue::Text("n/a".into()).to_number(), None);
        assert_eq!(CellValue::Text("inf".into()).to_number(), None);
        assert_eq!(CellValue::Float(f64::NAN).to_number(), None);
        assert_eq!(CellValue::Integer(3).to_number(), Some(3.0));
        assert_eq!(CellValue::Null.to_number(), None);
    }

    #[test]
    fn variance_uses_sample_denominator() {
        let obs = Observations {
            predictor_name: "x".into(),
            outcome_name: "y".into(),
            predictor: vec![0.0, 1.0, 2.0, 3.0],
            outcome: vec![1.0, 2.0, 3.0, 4.0],
        };
        assert!((obs.outcome_mean() - 2.5).abs() < 1e-12);
        assert!((obs.outcome_variance() - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(obs.predictor_max(), Some(3.0));
    }
}
