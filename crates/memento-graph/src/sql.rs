//! Read-only statement classification and dynamic filter assembly.

use tokio_postgres::types::ToSql;

/// Keywords that disqualify a statement from read-only classification
/// when present as a bare token.
const WRITE_KEYWORDS: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE",
];

/// Classify a statement as read-only.
///
/// Comment lines are stripped, the text is upper-cased, and the statement
/// must start with SELECT and contain no write keyword as a bare token.
/// This is a textual heuristic, not a parser: a SELECT carrying a write
/// keyword inside a string literal is misclassified. It is a pre-execution
/// guard against accidents, not a security boundary; real isolation
/// belongs at the backend role level.
pub fn is_read_only(sql: &str) -> bool {
    let upper = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .to_uppercase();

    let mut tokens = upper
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty());

    if tokens.next() != Some("SELECT") {
        return false;
    }
    !tokens.any(|t| WRITE_KEYWORDS.contains(&t))
}

/// Assembles WHERE/SET fragments from optional named predicates, always
/// emitting numbered bind parameters, never interpolating values.
///
/// ```
/// use memento_graph::sql::FilterBuilder;
///
/// let mut f = FilterBuilder::new();
/// f.eq("source_id", 7_i64);
/// f.eq("type", "knows".to_string());
/// assert_eq!(f.where_clause(), "source_id = $1 AND type = $2");
/// assert_eq!(f.params().len(), 2);
/// ```
#[derive(Default)]
pub struct FilterBuilder {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql + Send + Sync>>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value, returning its `$n` placeholder.
    pub fn bind<T>(&mut self, value: T) -> String
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    /// Add a completed clause, built with placeholders from [`Self::bind`].
    pub fn clause(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    /// Shorthand for `column = $n`.
    pub fn eq<T>(&mut self, column: &str, value: T)
    where
        T: ToSql + Send + Sync + 'static,
    {
        let placeholder = self.bind(value);
        self.clause(format!("{column} = {placeholder}"));
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// AND-joined clause set, defaulting to an always-true predicate when
    /// no filters were given.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            "TRUE".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    /// Comma-joined clause set, for `UPDATE … SET` lists.
    pub fn set_clause(&self) -> String {
        self.clauses.join(", ")
    }

    /// Bound parameters in placeholder order.
    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}
