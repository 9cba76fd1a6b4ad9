use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single scalar value carried through routing (sharding values, parameters)
/// and merging (shard result cells).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// Days since 1970-01-01.
    Date(i32),
    /// `mantissa * 10^-scale`, so `Decimal(12345, 2)` is 123.45.
    Decimal(i128, u8),
    Bytea(Vec<u8>),
}

/// Numeric view shared by comparison, hashing and addition. Integers and
/// decimals stay exact; floats do not.
#[derive(Clone, Copy)]
enum Numeric {
    Exact(i128, u8),
    Approx(f64),
}

impl Numeric {
    fn to_f64(self) -> f64 {
        match self {
            Numeric::Exact(m, s) => m as f64 / 10f64.powi(s as i32),
            Numeric::Approx(v) => v,
        }
    }

    fn partial_cmp(self, other: Numeric) -> Option<Ordering> {
        if let (Numeric::Exact(a, sa), Numeric::Exact(b, sb)) = (self, other) {
            if let Some((a, b)) = align_scales(a, sa, b, sb) {
                return Some(a.cmp(&b));
            }
        }
        self.to_f64().partial_cmp(&other.to_f64())
    }
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            Datum::Int32(v) => Some(Numeric::Exact(i128::from(*v), 0)),
            Datum::Int64(v) => Some(Numeric::Exact(i128::from(*v), 0)),
            Datum::Decimal(m, s) => Some(Numeric::Exact(*m, *s)),
            Datum::Float64(v) => Some(Numeric::Approx(*v)),
            _ => None,
        }
    }

    /// Ordering class for values that cannot be compared directly.
    fn rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Boolean(_) => 1,
            Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _) => 2,
            Datum::Text(_) => 3,
            Datum::Date(_) => 4,
            Datum::Timestamp(_) => 5,
            Datum::Bytea(_) => 6,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.numeric()? {
            Numeric::Exact(m, 0) => i64::try_from(m).ok(),
            _ => None,
        }
    }

    /// Integer view used by sharding algorithms: integers as-is, text that
    /// parses as an integer, integral decimals.
    pub fn as_sharding_int(&self) -> Option<i128> {
        match self {
            Datum::Int32(_) | Datum::Int64(_) | Datum::Decimal(_, _) => match self.numeric()? {
                Numeric::Exact(m, s) => {
                    let (m, s) = decimal_trim(m, s);
                    (s == 0).then_some(m)
                }
                Numeric::Approx(_) => None,
            },
            Datum::Text(s) => s.trim().parse::<i128>().ok(),
            Datum::Timestamp(v) => Some(i128::from(*v)),
            Datum::Date(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.numeric().map(Numeric::to_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Datum::Text(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Render as a SQL literal, used when a value has to be spliced into SQL text.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Datum::Boolean(true) => "TRUE".into(),
            Datum::Boolean(false) => "FALSE".into(),
            Datum::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Datum::Timestamp(_) | Datum::Date(_) => format!("'{self}'"),
            Datum::Bytea(bytes) => format!("X'{}'", hex(bytes)),
            _ => self.to_string(),
        }
    }

    /// Sum two partial results. NULL is the identity, integer sums that
    /// overflow 64 bits widen to a decimal, and anything touching a float
    /// becomes a float. `None` for non-numeric operands.
    pub fn add(&self, other: &Datum) -> Option<Datum> {
        if self.is_null() {
            return Some(other.clone());
        }
        if other.is_null() {
            return Some(self.clone());
        }
        let both_integers =
            !matches!(self, Datum::Decimal(..)) && !matches!(other, Datum::Decimal(..));
        match (self.numeric()?, other.numeric()?) {
            (Numeric::Exact(a, sa), Numeric::Exact(b, sb)) => {
                let (a, b) = align_scales(a, sa, b, sb)?;
                let sum = a.checked_add(b)?;
                let scale = sa.max(sb);
                match i64::try_from(sum) {
                    Ok(v) if both_integers => Some(Datum::Int64(v)),
                    _ => Some(Datum::Decimal(sum, scale)),
                }
            }
            (a, b) => Some(Datum::Float64(a.to_f64() + b.to_f64())),
        }
    }

    /// Divide for AVG recombination. Integer and decimal sums yield a decimal
    /// with four extra digits of scale; floats stay floats.
    pub fn divide(&self, count: &Datum) -> Option<Datum> {
        let divisor = count.as_sharding_int()?;
        if divisor == 0 || self.is_null() {
            return Some(Datum::Null);
        }
        match self.numeric()? {
            Numeric::Approx(v) => Some(Datum::Float64(v / divisor as f64)),
            Numeric::Exact(m, s) => {
                let scale = s.saturating_add(4).min(30).max(s);
                let widened = m.checked_mul(10i128.checked_pow(u32::from(scale - s))?)?;
                Some(Datum::Decimal(widened / divisor, scale))
            }
        }
    }

    /// Short type label for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Boolean(_) => "boolean",
            Datum::Int32(_) => "int32",
            Datum::Int64(_) => "int64",
            Datum::Float64(_) => "float64",
            Datum::Text(_) => "text",
            Datum::Timestamp(_) => "timestamp",
            Datum::Date(_) => "date",
            Datum::Decimal(_, _) => "decimal",
            Datum::Bytea(_) => "bytea",
        }
    }
}

/// Total order used when sorting merged rows. NULL sorts lowest, numeric
/// types compare across representations and other mismatched types order by
/// type class.
pub fn compare_datum(a: &Datum, b: &Datum) -> Ordering {
    a.partial_cmp(b).unwrap_or_else(|| a.rank().cmp(&b.rank()))
}

/// True when both datums have the same class (numeric, text, temporal...) and
/// can be ordered against each other. NULL is comparable with anything.
pub fn comparable(a: &Datum, b: &Datum) -> bool {
    a.is_null() || b.is_null() || a.partial_cmp(b).is_some()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Boolean(v) => write!(f, "{v}"),
            Datum::Int32(v) => write!(f, "{v}"),
            Datum::Int64(v) => write!(f, "{v}"),
            Datum::Float64(v) => write!(f, "{v}"),
            Datum::Text(v) => f.write_str(v),
            Datum::Decimal(m, s) => f.write_str(&decimal_to_string(*m, *s)),
            Datum::Bytea(bytes) => write!(f, "\\x{}", hex(bytes)),
            Datum::Timestamp(us) => {
                let nanos = (us.rem_euclid(1_000_000) * 1_000) as u32;
                match chrono::DateTime::from_timestamp(us.div_euclid(1_000_000), nanos) {
                    Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
                    None => write!(f, "{us}"),
                }
            }
            Datum::Date(days) => {
                // 719_163 days separate 0001-01-01 from the Unix epoch.
                match days
                    .checked_add(719_163)
                    .and_then(chrono::NaiveDate::from_num_days_from_ce_opt)
                {
                    Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                    None => write!(f, "{days}"),
                }
            }
        }
    }
}

/// Value equality: NULL equals NULL, numerics are equal across widths and
/// scales.
impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_null(), other.is_null()) {
            (true, true) => true,
            (false, false) => self.partial_cmp(other) == Some(Ordering::Equal),
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Datum::Null => {}
            Datum::Boolean(v) => v.hash(state),
            Datum::Text(v) => v.hash(state),
            Datum::Timestamp(v) => v.hash(state),
            Datum::Date(v) => v.hash(state),
            Datum::Bytea(v) => v.hash(state),
            _ => {
                // Hash numerics by their canonical float so every
                // representation that compares equal hashes equal.
                let canonical = match self.numeric() {
                    Some(Numeric::Exact(m, s)) => {
                        let (m, s) = decimal_trim(m, s);
                        Numeric::Exact(m, s).to_f64()
                    }
                    Some(Numeric::Approx(v)) => v,
                    None => 0.0,
                };
                // Fold -0.0 into 0.0.
                (canonical + 0.0).to_bits().hash(state);
            }
        }
    }
}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.numeric(), other.numeric()) {
            return a.partial_cmp(b);
        }
        match (self, other) {
            (Datum::Null, Datum::Null) => Some(Ordering::Equal),
            (Datum::Null, _) => Some(Ordering::Less),
            (_, Datum::Null) => Some(Ordering::Greater),
            (Datum::Boolean(a), Datum::Boolean(b)) => Some(a.cmp(b)),
            (Datum::Text(a), Datum::Text(b)) => Some(a.cmp(b)),
            (Datum::Date(a), Datum::Date(b)) => Some(a.cmp(b)),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => Some(a.cmp(b)),
            (Datum::Bytea(a), Datum::Bytea(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_datum(self, other)
    }
}

/// One result row, in projection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedRow {
    pub values: Vec<Datum>,
}

impl OwnedRow {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Datum> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Datum>> for OwnedRow {
    fn from(values: Vec<Datum>) -> Self {
        Self::new(values)
    }
}

/// `(12345, 2)` renders as `123.45`, `(-1, 3)` as `-0.001`.
pub fn decimal_to_string(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let Some(unit) = 10u128.checked_pow(u32::from(scale)) else {
        return format!("{mantissa}e-{scale}");
    };
    let sign = if mantissa < 0 { "-" } else { "" };
    let abs = mantissa.unsigned_abs();
    format!(
        "{sign}{}.{:0width$}",
        abs / unit,
        abs % unit,
        width = usize::from(scale)
    )
}

/// Bring two decimals to the larger scale. `None` when that overflows.
fn align_scales(a: i128, sa: u8, b: i128, sb: u8) -> Option<(i128, i128)> {
    let widen = |m: i128, by: u8| m.checked_mul(10i128.checked_pow(u32::from(by))?);
    match sa.cmp(&sb) {
        Ordering::Equal => Some((a, b)),
        Ordering::Greater => Some((a, widen(b, sa - sb)?)),
        Ordering::Less => Some((widen(a, sb - sa)?, b)),
    }
}

/// Strip trailing fractional zeros: (12300, 3) becomes (123, 1).
fn decimal_trim(mut m: i128, mut s: u8) -> (i128, u8) {
    while s > 0 && m % 10 == 0 {
        m /= 10;
        s -= 1;
    }
    (m, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_widens_integers() {
        assert!(matches!(
            Datum::Int32(3).add(&Datum::Int32(4)),
            Some(Datum::Int64(7))
        ));
        let big = Datum::Int64(i64::MAX).add(&Datum::Int64(1)).unwrap();
        assert_eq!(big.to_string(), "9223372036854775808");
        assert_eq!(Datum::Null.add(&Datum::Int64(5)), Some(Datum::Int64(5)));
        assert!(Datum::Text("a".into()).add(&Datum::Int64(1)).is_none());
        assert!(matches!(
            Datum::Float64(0.5).add(&Datum::Int64(1)),
            Some(Datum::Float64(v)) if v == 1.5
        ));
    }

    #[test]
    fn test_add_decimals_aligns_scale() {
        let sum = Datum::Decimal(150, 2).add(&Datum::Decimal(5, 1)).unwrap();
        assert_eq!(sum.to_string(), "2.00");
        let mixed = Datum::Decimal(5, 1).add(&Datum::Int64(2)).unwrap();
        assert_eq!(mixed.to_string(), "2.5");
    }

    #[test]
    fn test_divide_integer_sum_gives_decimal() {
        let avg = Datum::Int64(10).divide(&Datum::Int64(4)).unwrap();
        assert_eq!(avg.to_string(), "2.5000");
        assert!(Datum::Int64(10).divide(&Datum::Int64(0)).unwrap().is_null());
        let favg = Datum::Float64(9.0).divide(&Datum::Int64(3)).unwrap();
        assert_eq!(favg.as_f64(), Some(3.0));
    }

    #[test]
    fn test_compare_null_lowest() {
        assert_eq!(compare_datum(&Datum::Null, &Datum::Int64(0)), Ordering::Less);
        assert_eq!(compare_datum(&Datum::Null, &Datum::Null), Ordering::Equal);
        assert_eq!(
            compare_datum(&Datum::Int32(2), &Datum::Float64(1.5)),
            Ordering::Greater
        );
        assert_eq!(
            compare_datum(&Datum::Decimal(250, 2), &Datum::Int64(2)),
            Ordering::Greater
        );
        assert_eq!(
            compare_datum(&Datum::Text("a".into()), &Datum::Int64(9)),
            Ordering::Greater
        );
        assert!(!comparable(&Datum::Text("a".into()), &Datum::Int64(9)));
    }

    #[test]
    fn test_equal_values_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Datum::Int32(7));
        assert!(set.contains(&Datum::Int64(7)));
        assert!(set.contains(&Datum::Decimal(700, 2)));
        assert!(set.contains(&Datum::Float64(7.0)));
        assert!(!set.contains(&Datum::Text("7".into())));
        set.insert(Datum::Null);
        assert!(set.contains(&Datum::Null));
    }

    #[test]
    fn test_sharding_int_view() {
        assert_eq!(Datum::Text(" 42 ".into()).as_sharding_int(), Some(42));
        assert_eq!(Datum::Decimal(1300, 2).as_sharding_int(), Some(13));
        assert_eq!(Datum::Decimal(1310, 2).as_sharding_int(), None);
        assert_eq!(Datum::Float64(1.0).as_sharding_int(), None);
    }

    #[test]
    fn test_rendering() {
        assert_eq!(Datum::Text("o'neil".into()).to_sql_literal(), "'o''neil'");
        assert_eq!(Datum::Int64(-5).to_sql_literal(), "-5");
        assert_eq!(Datum::Null.to_sql_literal(), "NULL");
        assert_eq!(Datum::Bytea(vec![0xab, 0x01]).to_sql_literal(), "X'ab01'");
        assert_eq!(Datum::Decimal(-1, 3).to_string(), "-0.001");
        assert_eq!(Datum::Date(0).to_string(), "1970-01-01");
        assert_eq!(Datum::Timestamp(86_400_000_000).to_sql_literal(), "'1970-01-02 00:00:00'");
    }
}
