//! Query vocabulary: indexed fields and comparison operators
//!
//! Callers pass field names and operators as text. Unrecognized names parse
//! to `None`, which the store resolves to an empty result rather than an
//! error.

use std::fmt;

use crate::storage::Record;

/// Record fields that can be searched, filtered or updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    Quantity,
    Price,
    Supplier,
}

impl Field {
    /// Parse a field name, ignoring ASCII case and surrounding whitespace
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "id" => Some(Field::Id),
            "name" => Some(Field::Name),
            "quantity" => Some(Field::Quantity),
            "price" => Some(Field::Price),
            "supplier" => Some(Field::Supplier),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::Quantity => "quantity",
            Field::Price => "price",
            Field::Supplier => "supplier",
        }
    }

    /// Check if this field has a sorted index supporting range queries
    pub fn is_ranged(&self) -> bool {
        matches!(self, Field::Quantity | Field::Price)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators for search predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `=`
    Equal,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl Comparison {
    /// Parse an operator symbol, ignoring surrounding whitespace
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim() {
            "=" => Some(Comparison::Equal),
            "<" => Some(Comparison::Less),
            "<=" => Some(Comparison::LessOrEqual),
            ">" => Some(Comparison::Greater),
            ">=" => Some(Comparison::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Parse an integer field value; `None` on malformed input
pub fn parse_int(value: &str) -> Option<i32> {
    value.trim().parse().ok()
}

/// Parse a floating-point field value; `None` on malformed input
pub fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}

/// A parsed `field = value` assignment for updates
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Id(i32),
    Name(String),
    Quantity(i32),
    Price(f64),
    Supplier(String),
}

impl Assignment {
    /// Parse the new value for `field`.
    ///
    /// Returns `None` for malformed numbers and for a blank name, which no
    /// stored record may have.
    pub fn parse(field: Field, value: &str) -> Option<Self> {
        match field {
            Field::Id => parse_int(value).map(Assignment::Id),
            Field::Name if value.trim().is_empty() => None,
            Field::Name => Some(Assignment::Name(value.to_string())),
            Field::Quantity => parse_int(value).map(Assignment::Quantity),
            Field::Price => parse_float(value).map(Assignment::Price),
            Field::Supplier => Some(Assignment::Supplier(value.to_string())),
        }
    }

    /// Return a copy of `record` with this assignment applied
    pub fn apply(&self, record: &Record) -> Record {
        let mut updated = record.clone();
        match self {
            Assignment::Id(id) => updated.id = *id,
            Assignment::Name(name) => updated.name = name.clone(),
            Assignment::Quantity(quantity) => updated.quantity = *quantity,
            Assignment::Price(price) => updated.price = *price,
            Assignment::Supplier(supplier) => updated.supplier = supplier.clone(),
        }
        updated.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parse() {
        assert_eq!(Field::parse("ID"), Some(Field::Id));
        assert_eq!(Field::parse(" Supplier "), Some(Field::Supplier));
        assert_eq!(Field::parse("colour"), None);
        assert!(Field::Price.is_ranged());
        assert!(!Field::Name.is_ranged());
    }

    #[test]
    fn test_comparison_parse() {
        for op in ["=", "<", "<=", ">", ">="] {
            assert_eq!(Comparison::parse(op).unwrap().symbol(), op);
        }
        assert_eq!(Comparison::parse(" >= "), Some(Comparison::GreaterOrEqual));
        assert_eq!(Comparison::parse("!="), None);
        assert_eq!(Comparison::parse("=>"), None);
    }

    #[test]
    fn test_numeric_parse() {
        assert_eq!(parse_int(" 42"), Some(42));
        assert_eq!(parse_int("4.2"), None);
        assert_eq!(parse_float("4.25"), Some(4.25));
        assert_eq!(parse_float("abc"), None);
    }

    #[test]
    fn test_assignment_parse_and_apply() {
        let record = Record::new(1, "TV", 10, 49990.0, "DNS");

        let change = Assignment::parse(Field::Quantity, "12").unwrap();
        assert_eq!(change.apply(&record).quantity, 12);

        let change = Assignment::parse(Field::Supplier, &"s".repeat(80)).unwrap();
        assert_eq!(change.apply(&record).supplier.len(), 50);

        assert!(Assignment::parse(Field::Price, "cheap").is_none());
        assert!(Assignment::parse(Field::Id, "1.5").is_none());
        assert!(Assignment::parse(Field::Name, "  ").is_none());
    }
}
