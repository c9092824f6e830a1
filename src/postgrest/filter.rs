//! Filter operations for PostgrestClient

/// Operator for filter expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to
    Eq,

    /// Not equal to
    Neq,

    /// Greater than
    Gt,

    /// Greater than or equal to
    Gte,

    /// Less than
    Lt,

    /// Less than or equal to
    Lte,

    /// Is (null, true, false)
    Is,

    /// In a list of values
    In,
}

impl FilterOperator {
    /// Convert the operator to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
        }
    }

    /// Render a `column=op.value` query pair
    pub fn pair(&self, column: &str, value: &str) -> (String, String) {
        (column.to_string(), format!("{}.{}", self.as_str(), value))
    }
}

/// Render a PostgREST `in.(...)` list
pub(crate) fn in_list_value<T: ToString>(values: &[T]) -> String {
    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("({})", values.join(","))
}
